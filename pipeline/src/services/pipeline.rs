use crate::models::{PipelineReport, Stage};
use crate::processor::{EngineSession, ViewQuery, aggregate, generate, join, transform, validation, window};
use crate::schema::{GROUP, raw_data_schema_ref};
use crate::utils::arrow::batches_to_json;
use crate::utils::paths::PipelinePaths;
use arrow::util::pretty::pretty_format_batches;
use common::Result;
use common::config::Settings;
use datafusion::prelude::col;
use std::future::Future;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

/// Runs the demo workload end to end against one engine session.
pub struct PipelineRunner {
    settings: Settings,
}

impl PipelineRunner {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Validates the paths, then runs every stage on a fresh engine session.
    pub async fn run(&self, input_path: &str, output_path: &str) -> Result<PipelineReport> {
        info!(input_path, output_path, "Starting history demo job");

        let paths = PipelinePaths::new(input_path, output_path)?;
        let session = EngineSession::start(&self.settings)?;
        self.run_with_session(&session, &paths).await
    }

    /// Runs every stage on `session` and stops it afterwards, whether the
    /// run succeeded or not.
    pub async fn run_with_session(
        &self,
        session: &EngineSession,
        paths: &PipelinePaths,
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(paths.input.base(), paths.output.base());

        let result = self.execute(session, paths, &mut report).await;
        session.stop();

        match result {
            Ok(()) => {
                report.finish();
                info!(
                    run_id = %report.run_id,
                    final_count = report.final_count,
                    output_path = paths.output.base(),
                    "Job completed successfully"
                );
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Job failed");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        session: &EngineSession,
        paths: &PipelinePaths,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let job = &self.settings.job;
        let ctx = session.context();
        let schema = raw_data_schema_ref();

        session.register_paths(paths).await?;

        let raw_uri = paths.raw_data();
        let sql_uri = paths.sql_results();
        let final_uri = paths.final_results();

        let raw = run_stage(report, Stage::GenerateDataset, async {
            generate::synthetic_dataset(ctx, job)
        })
        .await?;

        let (written, initial_count) = run_stage(report, Stage::WriteRawData, async {
            let written = session.write_parquet(raw.clone(), &raw_uri).await?;
            // Re-runs the generation plan; the count is not served from the written files
            let initial_count = raw.clone().count().await?;
            info!(initial_count, "Initial dataset count");
            Ok((written, initial_count))
        })
        .await?;
        report.written_count = written;
        report.initial_count = initial_count as u64;
        report.record_artifact(&raw_uri);

        let (df, read_count) = run_stage(report, Stage::ReadRawData, async {
            // An empty write may leave no files at all
            if session.datasets().list_files(&raw_uri).await?.is_empty() {
                validation::ensure_rows(0, &raw_uri)?;
            }

            let df = session.read_parquet(&raw_uri, &schema).await?;
            let read_count = df.clone().count().await?;
            info!(read_count, uri = %raw_uri, "Read records from storage");
            validation::ensure_rows(read_count, &raw_uri)?;
            validation::validate_schema(ctx, &raw_uri, &schema).await?;
            Ok((df, read_count))
        })
        .await?;
        report.read_count = read_count as u64;

        report.footer_count = session.datasets().footer_row_count(&raw_uri).await?;
        if report.footer_count != report.read_count || report.written_count != report.read_count {
            warn!(
                written = report.written_count,
                footers = report.footer_count,
                read = report.read_count,
                "Row counts differ across the storage round trip"
            );
        }

        let df = run_stage(report, Stage::CacheDataset, async {
            let cached = session.cache(df).await?;
            cached.clone().count().await?;
            Ok(cached)
        })
        .await?;

        let transformed = run_stage(report, Stage::Transform, async {
            transform::derive_columns(df, job.group_modulus, job.transform_partitions)
        })
        .await?;

        let summary = run_stage(report, Stage::Aggregate, async {
            aggregate::group_statistics(transformed.clone())
        })
        .await?;

        let joined = run_stage(report, Stage::BroadcastJoin, async {
            let summary = session.broadcast(summary).await?;
            join::broadcast_join(transformed, summary)
        })
        .await?;

        let (ranked, processed_count) = run_stage(report, Stage::WindowFunctions, async {
            let ranked = window::rank_within_groups(joined)?;
            let processed_count = ranked.clone().count().await?;
            info!(processed_count, "Total processed records");
            Ok((ranked, processed_count))
        })
        .await?;
        report.processed_count = processed_count as u64;

        let sql_result = run_stage(report, Stage::SqlQuery, async {
            session.register_view(&job.view_name, ranked.clone())?;
            let query = ViewQuery::group_summary(&job.view_name, job.min_group_size);
            info!(sql = %query.to_sql(), "Running view query");
            let df = query.execute(ctx).await?;
            session.log_plan("sql_results", &df).await?;
            Ok(df)
        })
        .await?;

        let sql_result_count = run_stage(report, Stage::WriteSqlResults, async {
            session.write_parquet(sql_result, &sql_uri).await
        })
        .await?;
        report.sql_result_count = sql_result_count;
        report.record_artifact(&sql_uri);

        let final_result = run_stage(report, Stage::FinalAggregation, async {
            let df = aggregate::final_statistics(ranked, job.final_partitions)?;
            session.log_plan("final_results", &df).await?;
            Ok(df)
        })
        .await?;

        run_stage(report, Stage::WriteFinalResults, async {
            session.write_parquet(final_result.clone(), &final_uri).await
        })
        .await?;
        report.record_artifact(&final_uri);

        let (sample, final_count) = run_stage(report, Stage::Summary, async {
            let sample = final_result
                .clone()
                .sort(vec![col(GROUP).sort(true, false)])?
                .limit(0, Some(job.sample_rows))?
                .collect()
                .await?;
            println!("\nSample of final results:\n{}", pretty_format_batches(&sample)?);

            let final_count = final_result.count().await?;
            info!(final_count, "Final result count");
            Ok((batches_to_json(&sample)?, final_count))
        })
        .await?;
        report.sample = sample;
        report.final_count = final_count as u64;

        info!(report = %serde_json::to_string(report)?, "Run summary");
        Ok(())
    }
}

async fn run_stage<T, Fut>(report: &mut PipelineReport, stage: Stage, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let span = info_span!("stage", name = ?stage);
    info!(parent: &span, "{}...", stage.description());

    let started = Instant::now();
    let result = fut.instrument(span.clone()).await;
    let elapsed = started.elapsed();

    report.record_stage(stage, elapsed, result.is_ok());
    info!(
        parent: &span,
        elapsed_ms = elapsed.as_millis() as u64,
        succeeded = result.is_ok(),
        "Stage finished"
    );
    result
}
