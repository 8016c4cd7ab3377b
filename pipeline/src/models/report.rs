use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// The job descriptions a run moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GenerateDataset,
    WriteRawData,
    ReadRawData,
    CacheDataset,
    Transform,
    Aggregate,
    BroadcastJoin,
    WindowFunctions,
    SqlQuery,
    WriteSqlResults,
    FinalAggregation,
    WriteFinalResults,
    Summary,
}

impl Stage {
    pub fn description(self) -> &'static str {
        match self {
            Stage::GenerateDataset => "Creating initial dataset",
            Stage::WriteRawData => "Writing initial dataset",
            Stage::ReadRawData => "Reading dataset with explicit schema",
            Stage::CacheDataset => "Caching dataset",
            Stage::Transform => "Performing complex transformations",
            Stage::Aggregate => "Performing aggregations",
            Stage::BroadcastJoin => "Performing joins",
            Stage::WindowFunctions => "Calculating window functions",
            Stage::SqlQuery => "Performing SQL operations",
            Stage::WriteSqlResults => "Writing SQL results",
            Stage::FinalAggregation => "Performing final aggregations",
            Stage::WriteFinalResults => "Writing final results",
            Stage::Summary => "Collecting result sample",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub stage: Stage,
    pub elapsed_ms: u64,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input_path: String,
    pub output_path: String,
    pub initial_count: u64,
    pub written_count: u64,
    pub read_count: u64,
    pub footer_count: u64,
    pub processed_count: u64,
    pub sql_result_count: u64,
    pub final_count: u64,
    pub artifacts: Vec<String>,
    pub stages: Vec<StageMetrics>,
    pub sample: Vec<Value>,
}

impl PipelineReport {
    pub fn new(input_path: &str, output_path: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            input_path: input_path.to_string(),
            output_path: output_path.to_string(),
            initial_count: 0,
            written_count: 0,
            read_count: 0,
            footer_count: 0,
            processed_count: 0,
            sql_result_count: 0,
            final_count: 0,
            artifacts: Vec::new(),
            stages: Vec::new(),
            sample: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, stage: Stage, elapsed: Duration, succeeded: bool) {
        self.stages.push(StageMetrics {
            stage,
            elapsed_ms: elapsed.as_millis() as u64,
            succeeded,
        });
    }

    pub fn record_artifact(&mut self, uri: &str) {
        self.artifacts.push(uri.to_string());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageMetrics> {
        self.stages.iter().find(|m| m.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_stage_names() {
        let mut report = PipelineReport::new("s3://bucket/in", "s3://bucket/out");
        report.record_stage(Stage::WriteRawData, Duration::from_millis(1500), true);
        report.record_artifact("s3://bucket/in/raw_data/");
        report.finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stages"][0]["stage"], "write_raw_data");
        assert_eq!(json["stages"][0]["elapsed_ms"], 1500);
        assert_eq!(json["artifacts"][0], "s3://bucket/in/raw_data/");
        assert!(json["finished_at"].is_string());
        assert!(report.stage(Stage::WriteRawData).unwrap().succeeded);
        assert!(report.stage(Stage::SqlQuery).is_none());
    }
}
