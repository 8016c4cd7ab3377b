use crate::schema::GROUP;
use common::Result;
use datafusion::prelude::{DataFrame, JoinType};

const BROADCAST_KEY: &str = "broadcast_group";

/// Inner-joins the per-group summary onto every row of `rows` by `group`.
///
/// `summary` is the left (build) input. It should already be materialized
/// (see `EngineSession::broadcast`) so the planner collects it once and
/// streams every partition of `rows` past it. The output keeps the columns
/// of `rows` first, followed by the summary measures, with a single `group`.
pub fn broadcast_join(rows: DataFrame, summary: DataFrame) -> Result<DataFrame> {
    let summary = summary.with_column_renamed(GROUP, BROADCAST_KEY)?;

    let mut columns: Vec<String> = rows.schema().fields().iter().map(|f| f.name().clone()).collect();
    columns.extend(
        summary
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| name != BROADCAST_KEY),
    );
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();

    Ok(summary
        .join(rows, JoinType::Inner, &[BROADCAST_KEY], &[GROUP], None)?
        .select_columns(&columns)?)
}
