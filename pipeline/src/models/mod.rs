pub mod report;

pub use report::{PipelineReport, Stage, StageMetrics};
