use common::{Error, Result};
use url::Url;

pub const RAW_DATA: &str = "raw_data";
pub const SQL_RESULTS: &str = "sql_results";
pub const FINAL_RESULTS: &str = "final_results";

/// Where a base location lives, as far as store registration is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String },
    Local,
}

/// Validated `--input-path` / `--output-path` pair.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub input: PathBuilder,
    pub output: PathBuilder,
}

impl PipelinePaths {
    pub fn new(input_path: &str, output_path: &str) -> Result<Self> {
        Ok(Self {
            input: PathBuilder::new("input path", input_path)?,
            output: PathBuilder::new("output path", output_path)?,
        })
    }

    pub fn raw_data(&self) -> String {
        self.input.with_dataset(RAW_DATA).build_uri()
    }

    pub fn sql_results(&self) -> String {
        self.output.with_dataset(SQL_RESULTS).build_uri()
    }

    pub fn final_results(&self) -> String {
        self.output.with_dataset(FINAL_RESULTS).build_uri()
    }

    /// Buckets touched by the run, deduplicated, in input/output order.
    pub fn buckets(&self) -> Vec<String> {
        let mut buckets = Vec::new();
        for location in [&self.input.location, &self.output.location] {
            if let Location::S3 { bucket } = location {
                if !buckets.contains(bucket) {
                    buckets.push(bucket.clone());
                }
            }
        }
        buckets
    }
}

#[derive(Debug, Clone)]
pub struct PathBuilder {
    base: String,
    location: Location,
    dataset: Option<String>,
}

impl PathBuilder {
    pub fn new(label: &str, base: &str) -> Result<Self> {
        let base = base.trim();
        if base.is_empty() {
            return Err(Error::Configuration(format!("{} must be set", label)));
        }

        let location = if base.contains("://") {
            let url = Url::parse(base)
                .map_err(|e| Error::Configuration(format!("{} '{}' is not a valid URI: {}", label, base, e)))?;
            match url.scheme() {
                "s3" => {
                    let bucket = url.host_str().filter(|b| !b.is_empty()).ok_or_else(|| {
                        Error::Configuration(format!("{} '{}' has no bucket", label, base))
                    })?;
                    Location::S3 { bucket: bucket.to_string() }
                }
                "file" => Location::Local,
                other => {
                    return Err(Error::Configuration(format!(
                        "{} '{}' uses unsupported scheme '{}'",
                        label, base, other
                    )));
                }
            }
        } else {
            Location::Local
        };

        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            location,
            dataset: None,
        })
    }

    pub fn with_dataset(&self, dataset: &str) -> Self {
        let mut builder = self.clone();
        builder.dataset = Some(dataset.to_string());
        builder
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Dataset directory URI. The trailing slash makes the engine treat it as a
    /// directory of files on both read and write.
    pub fn build_uri(&self) -> String {
        match &self.dataset {
            Some(dataset) => format!("{}/{}/", self.base, dataset),
            None => format!("{}/", self.base),
        }
    }
}
