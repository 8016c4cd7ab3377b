use crate::schema::{COMPLEX_CALC, GROUP, ID, RANDOM};
use arrow::datatypes::DataType;
use common::Result;
use datafusion::functions::expr_fn::{power, random, sin};
use datafusion::logical_expr::Partitioning;
use datafusion::prelude::{DataFrame, Expr, cast, col, lit};

/// `random^2 + sin(id)`
pub fn complex_calc() -> Expr {
    power(col(RANDOM), lit(2.0_f64)) + sin(cast(col(ID), DataType::Float64))
}

/// Adds `random`, recomputes `group` and adds `complex_calc`, then shuffles
/// the result round-robin into `partitions` partitions.
pub fn derive_columns(df: DataFrame, group_modulus: i64, partitions: usize) -> Result<DataFrame> {
    Ok(df
        .with_column(RANDOM, random())?
        .with_column(GROUP, col(ID) % lit(group_modulus))?
        .with_column(COMPLEX_CALC, complex_calc())?
        .repartition(Partitioning::RoundRobinBatch(partitions))?)
}
