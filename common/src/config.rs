use config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_CONFIG_NAME: &str = "config/pipeline";
pub const ENV_PREFIX: &str = "PIPELINE";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shape of the synthetic workload.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JobConfig {
    #[serde(default = "default_row_count")]
    pub row_count: u64,
    #[serde(default = "default_group_modulus")]
    pub group_modulus: i64,
    #[serde(default = "default_generation_partitions")]
    pub generation_partitions: usize,
    #[serde(default = "default_generation_batch_size")]
    pub generation_batch_size: usize,
    #[serde(default = "default_transform_partitions")]
    pub transform_partitions: usize,
    #[serde(default = "default_final_partitions")]
    pub final_partitions: usize,
    #[serde(default = "default_min_group_size")]
    pub min_group_size: i64,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_view_name")]
    pub view_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Falls back to the engine default (number of cores) when unset.
    #[serde(default)]
    pub target_partitions: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Plan hash joins with a collected build side instead of hash-partitioning both inputs.
    #[serde(default = "default_broadcast_joins")]
    pub broadcast_joins: bool,
    #[serde(default)]
    pub log_plans: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default = "default_verify_buckets")]
    pub verify_buckets: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_row_count() -> u64 {
    10_000_000
}

fn default_group_modulus() -> i64 {
    1000
}

fn default_generation_partitions() -> usize {
    8
}

fn default_generation_batch_size() -> usize {
    65_536
}

fn default_transform_partitions() -> usize {
    200
}

fn default_final_partitions() -> usize {
    100
}

fn default_min_group_size() -> i64 {
    100
}

fn default_sample_rows() -> usize {
    5
}

fn default_view_name() -> String {
    "complex_data".to_string()
}

fn default_batch_size() -> usize {
    8192
}

fn default_broadcast_joins() -> bool {
    true
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_verify_buckets() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            row_count: default_row_count(),
            group_modulus: default_group_modulus(),
            generation_partitions: default_generation_partitions(),
            generation_batch_size: default_generation_batch_size(),
            transform_partitions: default_transform_partitions(),
            final_partitions: default_final_partitions(),
            min_group_size: default_min_group_size(),
            sample_rows: default_sample_rows(),
            view_name: default_view_name(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_partitions: None,
            batch_size: default_batch_size(),
            broadcast_joins: default_broadcast_joins(),
            log_plans: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_s3_region(),
            access_key: None,
            secret_key: None,
            allow_http: false,
            verify_buckets: default_verify_buckets(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads `config/pipeline.{toml,yaml,json}` if present, then `PIPELINE_*` overrides.
    pub fn new() -> Result<Self> {
        let builder = Config::builder()
            .add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false))
            .add_source(environment());

        Self::build(builder)
    }

    /// Loads an explicit settings file; it must exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let builder = Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment());

        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(settings = ?settings, "Loaded pipeline settings");

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let job = &self.job;
        let checks = [
            (job.group_modulus <= 0, "job.group_modulus must be positive"),
            (job.generation_partitions == 0, "job.generation_partitions must be at least 1"),
            (job.generation_batch_size == 0, "job.generation_batch_size must be at least 1"),
            (job.transform_partitions == 0, "job.transform_partitions must be at least 1"),
            (job.final_partitions == 0, "job.final_partitions must be at least 1"),
            (job.view_name.trim().is_empty(), "job.view_name must not be empty"),
            (self.engine.batch_size == 0, "engine.batch_size must be at least 1"),
            (
                self.engine.target_partitions == Some(0),
                "engine.target_partitions must be at least 1",
            ),
        ];

        for (failed, message) in checks {
            if failed {
                return Err(Error::Configuration(message.to_string()));
            }
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(Error::Configuration(
                "storage.access_key and storage.secret_key must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
