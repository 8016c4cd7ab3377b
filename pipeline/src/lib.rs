pub mod models;
pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

use common::Result;
use common::config::Settings;
use models::PipelineReport;
use services::PipelineRunner;

/// Runs the history demo job once, reading and writing under the given locations.
pub async fn run_demo_pipeline(
    settings: Settings,
    input_path: &str,
    output_path: &str,
) -> Result<PipelineReport> {
    PipelineRunner::new(settings).run(input_path, output_path).await
}
