use arrow::array::AsArray;
use arrow::datatypes::Int64Type;
use common::config::Settings;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use pipeline::models::Stage;
use pipeline::run_demo_pipeline;
use std::path::Path;

// 1005 ids over 10 groups: groups 0-4 get 101 members, groups 5-9 get 100
fn small_settings() -> Settings {
    let mut settings = Settings::default();
    settings.job.row_count = 1005;
    settings.job.group_modulus = 10;
    settings.job.generation_partitions = 3;
    settings.job.generation_batch_size = 128;
    settings.job.transform_partitions = 4;
    settings.job.final_partitions = 3;
    settings.job.sample_rows = 3;
    settings.engine.target_partitions = Some(2);
    settings.engine.log_plans = true;
    settings.storage.verify_buckets = false;
    settings
}

fn dir_uri(path: &Path) -> String {
    format!("{}/", path.display())
}

async fn read_groups(ctx: &SessionContext, path: &Path) -> Vec<i64> {
    let batches = ctx
        .read_parquet(dir_uri(path), ParquetReadOptions::default())
        .await
        .unwrap()
        .sort(vec![datafusion::prelude::col("group").sort(true, false)])
        .unwrap()
        .collect()
        .await
        .unwrap();

    batches
        .iter()
        .flat_map(|b| {
            b.column_by_name("group")
                .unwrap()
                .as_primitive::<Int64Type>()
                .values()
                .to_vec()
        })
        .collect()
}

#[tokio::test]
async fn test_full_run_on_local_storage() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");

    let report = run_demo_pipeline(
        small_settings(),
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(report.initial_count, 1005);
    assert_eq!(report.written_count, 1005);
    assert_eq!(report.read_count, 1005);
    assert_eq!(report.footer_count, 1005);
    assert_eq!(report.processed_count, 1005);
    assert_eq!(report.sql_result_count, 5);
    assert_eq!(report.final_count, 10);
    assert_eq!(report.sample.len(), 3);
    assert_eq!(report.sample[0]["group"], 0);
    assert!(report.finished_at.is_some());

    assert_eq!(report.artifacts.len(), 3);
    for dataset in ["input/raw_data", "output/sql_results", "output/final_results"] {
        assert!(tmp.path().join(dataset).is_dir(), "{} missing", dataset);
    }

    assert!(report.stages.iter().all(|s| s.succeeded));
    assert!(report.stage(Stage::BroadcastJoin).is_some());
    assert_eq!(report.stages.last().unwrap().stage, Stage::Summary);

    let ctx = SessionContext::new();
    assert_eq!(read_groups(&ctx, &output.join("sql_results")).await, vec![0, 1, 2, 3, 4]);
    assert_eq!(
        read_groups(&ctx, &output.join("final_results")).await,
        (0..10).collect::<Vec<i64>>()
    );
}

#[tokio::test]
async fn test_rerun_overwrites_previous_results() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");

    for _ in 0..2 {
        run_demo_pipeline(
            small_settings(),
            input.to_str().unwrap(),
            output.to_str().unwrap(),
        )
        .await
        .unwrap();
    }

    let ctx = SessionContext::new();
    let raw = ctx
        .read_parquet(dir_uri(&input.join("raw_data")), ParquetReadOptions::default())
        .await
        .unwrap();
    assert_eq!(raw.count().await.unwrap(), 1005);
    assert_eq!(read_groups(&ctx, &output.join("final_results")).await.len(), 10);
}

#[tokio::test]
async fn test_empty_output_path_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");

    let err = run_demo_pipeline(small_settings(), input.to_str().unwrap(), "")
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(!input.exists());
}

#[tokio::test]
async fn test_empty_dataset_fails_before_results() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");

    let mut settings = small_settings();
    settings.job.row_count = 0;

    let err = run_demo_pipeline(settings, input.to_str().unwrap(), output.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_data_integrity());
    assert!(!output.join("sql_results").exists());
    assert!(!output.join("final_results").exists());
}
