use crate::schema::{DENSE_RANK, GROUP, RANDOM, RANK, ROW_NUMBER};
use common::Result;
use datafusion::functions_window::expr_fn::{dense_rank, rank, row_number};
use datafusion::logical_expr::ExprFunctionExt;
use datafusion::logical_expr::expr::Sort;
use datafusion::prelude::{DataFrame, Expr, col};

fn over_group(function: Expr, order_by: &[Sort], name: &str) -> Result<Expr> {
    Ok(function
        .partition_by(vec![col(GROUP)])
        .order_by(order_by.to_vec())
        .build()?
        .alias(name))
}

/// Adds `row_number`, `rank` and `dense_rank` over `PARTITION BY group ORDER BY random`.
///
/// All three share one window specification, so the engine plans a single
/// window operator and sorts each partition once.
pub fn rank_within_groups(df: DataFrame) -> Result<DataFrame> {
    let order_by = vec![col(RANDOM).sort(true, false)];

    let mut exprs: Vec<Expr> = df.schema().columns().into_iter().map(Expr::Column).collect();
    exprs.push(over_group(row_number(), &order_by, ROW_NUMBER)?);
    exprs.push(over_group(rank(), &order_by, RANK)?);
    exprs.push(over_group(dense_rank(), &order_by, DENSE_RANK)?);

    Ok(df.select(exprs)?)
}
