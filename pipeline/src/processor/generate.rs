use crate::schema::{GROUP, ID, VALUE, id_schema};
use arrow::array::Int64Array;
use arrow::record_batch::RecordBatch;
use common::config::JobConfig;
use common::{Error, Result};
use datafusion::datasource::MemTable;
use datafusion::execution::context::SessionContext;
use datafusion::functions::expr_fn::random;
use datafusion::prelude::{DataFrame, col, lit};
use std::ops::Range;
use std::sync::Arc;

/// Splits `0..row_count` into `partitions` contiguous, near-equal id ranges.
pub fn partition_ranges(row_count: u64, partitions: usize) -> Vec<Range<i64>> {
    let partitions = partitions.max(1) as u64;
    let base = row_count / partitions;
    let remainder = row_count % partitions;

    let mut start = 0u64;
    (0..partitions)
        .map(|p| {
            let len = base + u64::from(p < remainder);
            let range = start as i64..(start + len) as i64;
            start += len;
            range
        })
        .collect()
}

fn id_batches(range: Range<i64>, batch_size: usize) -> Result<Vec<RecordBatch>> {
    let schema = Arc::new(id_schema());
    let mut batches = Vec::new();
    let mut start = range.start;

    while start < range.end {
        let end = range.end.min(start + batch_size as i64);
        let ids = Int64Array::from_iter_values(start..end);
        batches.push(RecordBatch::try_new(schema.clone(), vec![Arc::new(ids)])?);
        start = end;
    }

    Ok(batches)
}

/// In-memory frame holding the ids `0..row_count`.
pub fn id_range(
    ctx: &SessionContext,
    row_count: u64,
    partitions: usize,
    batch_size: usize,
) -> Result<DataFrame> {
    if row_count > i64::MAX as u64 {
        return Err(Error::Configuration(format!(
            "row_count {} does not fit the id column",
            row_count
        )));
    }

    let partitions = partition_ranges(row_count, partitions)
        .into_iter()
        .map(|range| id_batches(range, batch_size))
        .collect::<Result<Vec<_>>>()?;

    let table = MemTable::try_new(Arc::new(id_schema()), partitions)?;
    Ok(ctx.read_table(Arc::new(table))?)
}

/// The raw dataset: `id`, a uniformly random `value` and `group = id % group_modulus`.
///
/// `value` is drawn again every time the plan runs; the row count and the
/// `group` distribution are the same on every run.
pub fn synthetic_dataset(ctx: &SessionContext, job: &JobConfig) -> Result<DataFrame> {
    let df = id_range(
        ctx,
        job.row_count,
        job.generation_partitions,
        job.generation_batch_size,
    )?;

    Ok(df
        .with_column(VALUE, random())?
        .with_column(GROUP, col(ID) % lit(job.group_modulus))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::{Float64Type, Int64Type};
    use datafusion::functions_aggregate::expr_fn::{count, max, min};

    #[test]
    fn test_partition_ranges_cover_all_ids() {
        let ranges = partition_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

        let ranges = partition_ranges(2, 4);
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);

        assert_eq!(partition_ranges(0, 2), vec![0..0, 0..0]);
    }

    #[test]
    fn test_id_batches_respect_batch_size() {
        let batches = id_batches(5..15, 4).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_synthetic_dataset_shape() {
        let ctx = SessionContext::new();
        let job = JobConfig {
            row_count: 2_500,
            group_modulus: 1000,
            generation_partitions: 3,
            generation_batch_size: 512,
            ..JobConfig::default()
        };

        let df = synthetic_dataset(&ctx, &job).unwrap();
        let names: Vec<String> = df.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec![ID, VALUE, GROUP]);

        let stats = df
            .aggregate(
                vec![],
                vec![
                    count(col(ID)).alias("rows"),
                    min(col(VALUE)).alias("min_value"),
                    max(col(VALUE)).alias("max_value"),
                    max(col(GROUP)).alias("max_group"),
                ],
            )
            .unwrap()
            .collect()
            .await
            .unwrap();

        let batch = &stats[0];
        assert_eq!(batch.column(0).as_primitive::<Int64Type>().value(0), 2_500);
        assert!(batch.column(1).as_primitive::<Float64Type>().value(0) >= 0.0);
        assert!(batch.column(2).as_primitive::<Float64Type>().value(0) < 1.0);
        assert_eq!(batch.column(3).as_primitive::<Int64Type>().value(0), 999);
    }
}
