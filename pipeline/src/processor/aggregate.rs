use crate::schema::{COMPLEX_CALC, GROUP, RANDOM, ROW_NUMBER};
use common::Result;
use datafusion::functions_aggregate::approx_percentile_cont::approx_percentile_cont_udaf;
use datafusion::functions_aggregate::expr_fn::{avg, count, max, stddev, sum};
use datafusion::logical_expr::Partitioning;
use datafusion::prelude::{DataFrame, col, lit};

pub const COUNT: &str = "count";
pub const SUM: &str = "sum";
pub const AVG: &str = "avg";
pub const MEDIAN: &str = "median";

pub const SUM_CALC: &str = "sum_calc";
pub const AVG_RANDOM: &str = "avg_random";
pub const MAX_ROW_NUM: &str = "max_row_num";
pub const STD_DEV: &str = "std_dev";

/// Per-group member count, sum of `complex_calc`, mean and approximate median of `random`.
pub fn group_statistics(df: DataFrame) -> Result<DataFrame> {
    Ok(df.aggregate(
        vec![col(GROUP)],
        vec![
            count(lit(1)).alias(COUNT),
            sum(col(COMPLEX_CALC)).alias(SUM),
            avg(col(RANDOM)).alias(AVG),
            approx_percentile_cont_udaf()
                .call(vec![col(RANDOM), lit(0.5_f64)])
                .alias(MEDIAN),
        ],
    )?)
}

/// Second, independent aggregation over the ranked rows, after a round-robin
/// shuffle into `partitions` partitions.
pub fn final_statistics(ranked: DataFrame, partitions: usize) -> Result<DataFrame> {
    Ok(ranked
        .repartition(Partitioning::RoundRobinBatch(partitions))?
        .aggregate(
            vec![col(GROUP)],
            vec![
                count(lit(1)).alias(COUNT),
                sum(col(COMPLEX_CALC)).alias(SUM_CALC),
                avg(col(RANDOM)).alias(AVG_RANDOM),
                max(col(ROW_NUMBER)).alias(MAX_ROW_NUM),
                stddev(col(COMPLEX_CALC)).alias(STD_DEV),
            ],
        )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ID;
    use arrow::array::{AsArray, Float64Array, Int64Array, UInt64Array};
    use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, UInt64Type};
    use arrow::record_batch::RecordBatch;
    use datafusion::execution::context::SessionContext;
    use std::sync::Arc;

    fn ranked_rows(ctx: &SessionContext) -> DataFrame {
        let schema = Arc::new(Schema::new(vec![
            Field::new(ID, DataType::Int64, false),
            Field::new(GROUP, DataType::Int64, false),
            Field::new(RANDOM, DataType::Float64, false),
            Field::new(COMPLEX_CALC, DataType::Float64, false),
            Field::new(ROW_NUMBER, DataType::UInt64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![0, 2, 4, 1, 3])),
                Arc::new(Int64Array::from(vec![0, 0, 0, 1, 1])),
                Arc::new(Float64Array::from(vec![0.1, 0.5, 0.9, 0.2, 0.4])),
                Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0, 4.0])),
                Arc::new(UInt64Array::from(vec![1, 2, 3, 1, 2])),
            ],
        )
        .unwrap();
        ctx.read_batch(batch).unwrap()
    }

    #[tokio::test]
    async fn test_group_statistics() {
        let ctx = SessionContext::new();
        let batches = group_statistics(ranked_rows(&ctx))
            .unwrap()
            .sort(vec![col(GROUP).sort(true, false)])
            .unwrap()
            .collect()
            .await
            .unwrap();
        let batch = arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap();

        assert_eq!(batch.num_rows(), 2);
        let counts = batch.column_by_name(COUNT).unwrap().as_primitive::<Int64Type>();
        let sums = batch.column_by_name(SUM).unwrap().as_primitive::<Float64Type>();
        let avgs = batch.column_by_name(AVG).unwrap().as_primitive::<Float64Type>();
        let medians = batch.column_by_name(MEDIAN).unwrap().as_primitive::<Float64Type>();

        assert_eq!(counts.values().to_vec(), vec![3, 2]);
        assert_eq!(sums.values().to_vec(), vec![6.0, 8.0]);
        assert!((avgs.value(0) - 0.5).abs() < 1e-9);
        assert!((0.1..=0.9).contains(&medians.value(0)));
        assert!((0.2..=0.4).contains(&medians.value(1)));
    }

    #[tokio::test]
    async fn test_final_statistics() {
        let ctx = SessionContext::new();
        let batches = final_statistics(ranked_rows(&ctx), 3)
            .unwrap()
            .sort(vec![col(GROUP).sort(true, false)])
            .unwrap()
            .collect()
            .await
            .unwrap();
        let batch = arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap();

        let names: Vec<String> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec![GROUP, COUNT, SUM_CALC, AVG_RANDOM, MAX_ROW_NUM, STD_DEV]);

        let max_rows = batch.column_by_name(MAX_ROW_NUM).unwrap().as_primitive::<UInt64Type>();
        assert_eq!(max_rows.values().to_vec(), vec![3, 2]);

        // Sample standard deviation: {1,2,3} -> 1.0, {4,4} -> 0.0
        let std_devs = batch.column_by_name(STD_DEV).unwrap().as_primitive::<Float64Type>();
        assert!((std_devs.value(0) - 1.0).abs() < 1e-9);
        assert!(std_devs.value(1).abs() < 1e-9);
    }
}
