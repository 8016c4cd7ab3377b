use crate::storage::S3Manager;
use crate::storage::datasets::{DatasetStore, SessionDatasetStore};
use crate::utils::paths::PipelinePaths;
use arrow::array::AsArray;
use arrow::datatypes::{Schema, UInt64Type};
use arrow::record_batch::RecordBatch;
use common::Result;
use common::config::Settings;
use dashmap::DashSet;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::execution::context::SessionContext;
use datafusion::physical_plan::displayable;
use datafusion::prelude::{DataFrame, ParquetReadOptions, SessionConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Owns the engine context for one run. Views registered through the session
/// are dropped again by [`EngineSession::stop`], which also runs on drop.
pub struct EngineSession {
    ctx: SessionContext,
    s3_manager: Arc<S3Manager>,
    datasets: Arc<dyn DatasetStore>,
    verify_buckets: bool,
    log_plans: bool,
    views: DashSet<String>,
    released: AtomicBool,
}

impl EngineSession {
    pub fn start(settings: &Settings) -> Result<Self> {
        let engine = &settings.engine;

        let mut config = SessionConfig::new()
            .with_batch_size(engine.batch_size)
            .with_information_schema(true);
        if let Some(target_partitions) = engine.target_partitions {
            config = config.with_target_partitions(target_partitions);
        }
        // Hash joins collect their left input once instead of hash-partitioning both sides
        config.options_mut().optimizer.repartition_joins = !engine.broadcast_joins;

        let ctx = SessionContext::new_with_config(config);
        let datasets = Arc::new(SessionDatasetStore::new(ctx.runtime_env()));

        info!(
            session_id = %ctx.session_id(),
            target_partitions = ctx.copied_config().target_partitions(),
            "Engine session started"
        );

        Ok(Self {
            ctx,
            s3_manager: Arc::new(S3Manager::new(settings.storage.clone())),
            datasets,
            verify_buckets: settings.storage.verify_buckets,
            log_plans: engine.log_plans,
            views: DashSet::new(),
            released: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn datasets(&self) -> &dyn DatasetStore {
        self.datasets.as_ref()
    }

    /// Registers an object store for every bucket the run reads or writes.
    pub async fn register_paths(&self, paths: &PipelinePaths) -> Result<()> {
        for bucket in paths.buckets() {
            self.s3_manager.register_object_store(&self.ctx, &bucket)?;
            if self.verify_buckets {
                self.s3_manager.verify_bucket_exists(&bucket).await?;
            }
        }
        Ok(())
    }

    /// Writes `df` as a directory of Parquet files, replacing whatever was there.
    /// Returns the number of rows the engine reports as written.
    pub async fn write_parquet(&self, df: DataFrame, uri: &str) -> Result<u64> {
        let removed = self.datasets.clear(uri).await?;
        if removed > 0 {
            info!(uri, removed, "Overwriting existing dataset");
        }

        let batches = df
            .write_parquet(uri, DataFrameWriteOptions::new(), None)
            .await?;

        let written = written_rows(&batches);
        info!(uri, rows = written, "Dataset written");
        Ok(written)
    }

    /// Reads a Parquet directory against a declared schema; no inference.
    pub async fn read_parquet(&self, uri: &str, schema: &Schema) -> Result<DataFrame> {
        let options = ParquetReadOptions::default().schema(schema);
        Ok(self.ctx.read_parquet(uri, options).await?)
    }

    /// Materializes `df` in memory and returns a frame over the cached batches.
    pub async fn cache(&self, df: DataFrame) -> Result<DataFrame> {
        Ok(df.cache().await?)
    }

    /// Materializes a small frame so the planner sees its exact size and
    /// collects it once for every partition of the other join side.
    pub async fn broadcast(&self, df: DataFrame) -> Result<DataFrame> {
        let cached = df.cache().await?;
        debug!(rows = cached.clone().count().await?, "Broadcast side materialized");
        Ok(cached)
    }

    /// Registers (or replaces) a named view over `df`.
    pub fn register_view(&self, name: &str, df: DataFrame) -> Result<()> {
        if self.ctx.deregister_table(name)?.is_some() {
            warn!(view = name, "Replacing existing view");
        }
        self.ctx.register_table(name, df.into_view())?;
        self.views.insert(name.to_string());
        Ok(())
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.contains(name)
    }

    /// Logs the physical plan of `df` at debug level when plan logging is enabled.
    pub async fn log_plan(&self, label: &str, df: &DataFrame) -> Result<()> {
        if !self.log_plans {
            return Ok(());
        }

        let plan = df.clone().create_physical_plan().await?;
        debug!(
            plan = label,
            "Physical plan:\n{}",
            displayable(plan.as_ref()).indent(true)
        );
        Ok(())
    }

    /// Releases the session. Safe to call more than once.
    pub fn stop(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        for view in self.views.iter() {
            if let Err(e) = self.ctx.deregister_table(view.as_str()) {
                warn!(view = view.as_str(), error = %e, "Failed to deregister view");
            }
        }
        self.views.clear();

        info!(session_id = %self.ctx.session_id(), "Engine session stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn written_rows(batches: &[RecordBatch]) -> u64 {
    batches
        .iter()
        .filter(|b| b.num_columns() > 0)
        .filter_map(|b| b.column(0).as_primitive_opt::<UInt64Type>())
        .flat_map(|counts| counts.iter().flatten())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ID, id_schema};
    use arrow::array::Int64Array;
    use datafusion::prelude::col;

    fn local_settings() -> Settings {
        let mut settings = Settings::default();
        settings.engine.target_partitions = Some(2);
        settings
    }

    fn ids(ctx: &SessionContext, values: Vec<i64>) -> DataFrame {
        let batch = RecordBatch::try_new(
            Arc::new(id_schema()),
            vec![Arc::new(Int64Array::from(values))],
        )
        .unwrap();
        ctx.read_batch(batch).unwrap()
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_output() {
        let tmp = tempfile::tempdir().unwrap();
        let uri = format!("{}/ids/", tmp.path().display());
        let session = EngineSession::start(&local_settings()).unwrap();

        let first = session
            .write_parquet(ids(session.context(), vec![1, 2, 3, 4]), &uri)
            .await
            .unwrap();
        assert_eq!(first, 4);

        let second = session
            .write_parquet(ids(session.context(), vec![7, 8]), &uri)
            .await
            .unwrap();
        assert_eq!(second, 2);

        let df = session.read_parquet(&uri, &id_schema()).await.unwrap();
        assert_eq!(df.clone().count().await.unwrap(), 2);
        assert_eq!(session.datasets().footer_row_count(&uri).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_read_of_empty_directory_has_no_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("raw_data");
        std::fs::create_dir_all(&dir).unwrap();
        let session = EngineSession::start(&local_settings()).unwrap();

        let df = session
            .read_parquet(&format!("{}/", dir.display()), &id_schema())
            .await
            .unwrap();
        assert_eq!(df.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_views_are_released_on_stop() {
        let session = EngineSession::start(&local_settings()).unwrap();
        let df = ids(session.context(), vec![1, 2, 3]);

        session.register_view("complex_data", df.clone()).unwrap();
        session.register_view("complex_data", df.filter(col(ID).gt(datafusion::prelude::lit(1i64))).unwrap()).unwrap();
        assert!(session.has_view("complex_data"));

        let view = session.context().table("complex_data").await.unwrap();
        assert_eq!(view.count().await.unwrap(), 2);

        session.stop();
        assert!(session.is_stopped());
        assert!(!session.has_view("complex_data"));
        assert!(session.context().table("complex_data").await.is_err());

        // Second stop is a no-op
        session.stop();
    }
}
