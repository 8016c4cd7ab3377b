use crate::schema::{COMPLEX_CALC, GROUP, ID, RANDOM};
use common::Result;
use datafusion::execution::context::SessionContext;
use datafusion::functions_aggregate::expr_fn::{approx_distinct, avg, count, max, min, stddev, sum};
use datafusion::prelude::{DataFrame, Expr, col, lit};
use std::fmt::Write;

// Hidden measure backing the HAVING clause
const MEMBER_COUNT: &str = "__member_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    Max,
    Min,
    Sum,
    Count,
    StdDev,
    ApproxDistinct,
}

impl Aggregate {
    fn expr(self, column: Expr) -> Expr {
        match self {
            Aggregate::Avg => avg(column),
            Aggregate::Max => max(column),
            Aggregate::Min => min(column),
            Aggregate::Sum => sum(column),
            Aggregate::Count => count(column),
            Aggregate::StdDev => stddev(column),
            Aggregate::ApproxDistinct => approx_distinct(column),
        }
    }

    fn sql_name(self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::StdDev => "stddev",
            Aggregate::ApproxDistinct => "approx_distinct",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub aggregate: Aggregate,
    pub column: String,
    pub alias: String,
}

/// A grouped aggregation over a registered view, built without SQL text:
/// `SELECT group_by, measures.. FROM view GROUP BY group_by
///  [HAVING count(*) > n] [ORDER BY group_by]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    view: String,
    group_by: String,
    measures: Vec<Measure>,
    min_count_exclusive: Option<i64>,
    order_by_group: bool,
}

impl ViewQuery {
    pub fn new(view: &str, group_by: &str) -> Self {
        Self {
            view: view.to_string(),
            group_by: group_by.to_string(),
            measures: Vec::new(),
            min_count_exclusive: None,
            order_by_group: false,
        }
    }

    /// Per-group summary of the ranked rows, keeping only groups with more
    /// than `min_group_size` members.
    pub fn group_summary(view: &str, min_group_size: i64) -> Self {
        Self::new(view, GROUP)
            .measure(Aggregate::Avg, COMPLEX_CALC, "avg_calc")
            .measure(Aggregate::Max, RANDOM, "max_random")
            .measure(Aggregate::Min, RANDOM, "min_random")
            .measure(Aggregate::ApproxDistinct, ID, "distinct_ids")
            .having_count_greater_than(min_group_size)
            .order_by_group()
    }

    pub fn measure(mut self, aggregate: Aggregate, column: &str, alias: &str) -> Self {
        self.measures.push(Measure {
            aggregate,
            column: column.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn having_count_greater_than(mut self, count: i64) -> Self {
        self.min_count_exclusive = Some(count);
        self
    }

    pub fn order_by_group(mut self) -> Self {
        self.order_by_group = true;
        self
    }

    pub fn output_columns(&self) -> Vec<&str> {
        std::iter::once(self.group_by.as_str())
            .chain(self.measures.iter().map(|m| m.alias.as_str()))
            .collect()
    }

    pub async fn execute(&self, ctx: &SessionContext) -> Result<DataFrame> {
        let df = ctx.table(self.view.as_str()).await?;

        let mut aggregates: Vec<Expr> = self
            .measures
            .iter()
            .map(|m| m.aggregate.expr(col(m.column.as_str())).alias(m.alias.as_str()))
            .collect();
        if self.min_count_exclusive.is_some() {
            aggregates.push(count(lit(1)).alias(MEMBER_COUNT));
        }

        let mut df = df.aggregate(vec![col(self.group_by.as_str())], aggregates)?;

        if let Some(min_count) = self.min_count_exclusive {
            df = df
                .filter(col(MEMBER_COUNT).gt(lit(min_count)))?
                .select_columns(&self.output_columns())?;
        }

        if self.order_by_group {
            df = df.sort(vec![col(self.group_by.as_str()).sort(true, false)])?;
        }

        Ok(df)
    }

    /// Equivalent SQL text, for logs and plan comparison.
    pub fn to_sql(&self) -> String {
        let group_by = quote_ident(&self.group_by);
        let mut sql = format!("SELECT {}", group_by);

        for m in &self.measures {
            let _ = write!(
                sql,
                ", {}({}) AS {}",
                m.aggregate.sql_name(),
                quote_ident(&m.column),
                quote_ident(&m.alias)
            );
        }

        let _ = write!(sql, " FROM {} GROUP BY {}", quote_ident(&self.view), group_by);

        if let Some(min_count) = self.min_count_exclusive {
            let _ = write!(sql, " HAVING count(*) > {}", min_count);
        }
        if self.order_by_group {
            let _ = write!(sql, " ORDER BY {}", group_by);
        }

        sql
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
