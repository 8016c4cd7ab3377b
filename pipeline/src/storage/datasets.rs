use async_trait::async_trait;
use common::Result;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::execution::runtime_env::RuntimeEnv;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use parquet::arrow::async_reader::ParquetObjectReader;
use std::sync::Arc;
use tracing::debug;

pub const PARQUET_EXTENSION: &str = ".parquet";

/// Directory-level operations on a dataset written by the engine.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Removes every object under the dataset prefix, returning how many were deleted.
    async fn clear(&self, uri: &str) -> Result<usize>;
    /// Parquet data files under the dataset prefix, sorted by location.
    async fn list_files(&self, uri: &str) -> Result<Vec<ObjectMeta>>;
    /// Row count summed from the Parquet footers, without scanning any pages.
    async fn footer_row_count(&self, uri: &str) -> Result<u64>;
}

/// Resolves dataset URIs through the session's object store registry, so
/// S3 buckets registered on the session and the local filesystem behave alike.
pub struct SessionDatasetStore {
    runtime: Arc<RuntimeEnv>,
}

impl SessionDatasetStore {
    pub fn new(runtime: Arc<RuntimeEnv>) -> Self {
        Self { runtime }
    }

    fn resolve(&self, uri: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        let url = ListingTableUrl::parse(uri)?;
        let store = self.runtime.object_store(url.object_store())?;
        Ok((store, url.prefix().clone()))
    }

    async fn list_all(&self, uri: &str) -> Result<(Arc<dyn ObjectStore>, Vec<ObjectMeta>)> {
        let (store, prefix) = self.resolve(uri)?;
        let mut objects: Vec<ObjectMeta> = store.list(Some(&prefix)).try_collect().await?;
        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok((store, objects))
    }
}

#[async_trait]
impl DatasetStore for SessionDatasetStore {
    async fn clear(&self, uri: &str) -> Result<usize> {
        let (store, objects) = self.list_all(uri).await?;

        for object in &objects {
            store.delete(&object.location).await?;
        }

        debug!(uri, removed = objects.len(), "Cleared dataset prefix");
        Ok(objects.len())
    }

    async fn list_files(&self, uri: &str) -> Result<Vec<ObjectMeta>> {
        let (_, objects) = self.list_all(uri).await?;

        Ok(objects
            .into_iter()
            .filter(|o| o.location.as_ref().ends_with(PARQUET_EXTENSION))
            .collect())
    }

    async fn footer_row_count(&self, uri: &str) -> Result<u64> {
        let (store, _) = self.resolve(uri)?;
        let mut total = 0u64;

        for meta in self.list_files(uri).await? {
            let reader = ParquetObjectReader::new(store.clone(), meta);
            let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;
            total += builder.metadata().file_metadata().num_rows() as u64;
        }

        Ok(total)
    }
}
