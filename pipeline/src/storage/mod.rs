pub mod datasets;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use common::Result;
use common::config::StorageConfig;
use datafusion::execution::context::SessionContext;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

#[derive(Clone)]
pub struct S3Manager {
    pub config: StorageConfig,
    client_cache: Arc<dashmap::DashMap<String, Arc<S3Client>>>,
    object_store_cache: Arc<dashmap::DashMap<String, Arc<AmazonS3>>>,
}

impl S3Manager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            client_cache: Arc::new(dashmap::DashMap::new()),
            object_store_cache: Arc::new(dashmap::DashMap::new()),
        }
    }

    pub async fn get_client(&self, bucket: &str) -> Result<Arc<S3Client>> {
        if let Some(client) = self.client_cache.get(bucket) {
            return Ok(client.clone());
        }

        let mut builder = match (&self.config.access_key, &self.config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(access_key, secret_key, None, None, "static");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()))
                    .credentials_provider(credentials)
            }
            // Fall back to the default chain (env, profile, instance metadata)
            _ => {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&sdk_config)
            }
        };

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Arc::new(S3Client::from_conf(builder.build()));
        self.client_cache.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    pub fn get_object_store(&self, bucket: &str) -> Result<Arc<AmazonS3>> {
        if let Some(store) = self.object_store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&self.config.region)
            .with_allow_http(self.config.allow_http);

        if let (Some(access_key), Some(secret_key)) = (&self.config.access_key, &self.config.secret_key) {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let store = Arc::new(builder.build()?);
        self.object_store_cache
            .insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    /// Makes `s3://{bucket}` resolvable by the session's reads and writes.
    pub fn register_object_store(&self, ctx: &SessionContext, bucket: &str) -> Result<()> {
        let store = self.get_object_store(bucket)?;
        let url = Url::parse(&format!("s3://{}", bucket))?;
        ctx.runtime_env().register_object_store(&url, store);
        debug!(bucket, "Registered S3 object store");
        Ok(())
    }

    /// Verifies that a bucket exists and is accessible
    pub async fn verify_bucket_exists(&self, bucket: &str) -> Result<()> {
        let client = self.get_client(bucket).await?;

        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(bucket, "Bucket is accessible");
                Ok(())
            }
            Err(e) => Err(common::Error::Storage(format!(
                "Cannot access bucket '{}': {}",
                bucket, e
            ))),
        }
    }
}
