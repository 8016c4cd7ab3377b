use clap::{Arg, Command};
use common::config::Settings;
use pipeline::run_demo_pipeline;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Spark History Demo")
        .version("1.0")
        .about("Generates, reshapes and aggregates a synthetic dataset on object storage")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file; defaults to config/pipeline.toml when present"),
        )
        .arg(
            Arg::new("input-path")
                .long("input-path")
                .value_name("URI")
                .required(true)
                .help("Base location for the raw dataset, e.g. s3://bucket/input"),
        )
        .arg(
            Arg::new("output-path")
                .long("output-path")
                .value_name("URI")
                .required(true)
                .help("Base location for sql_results and final_results"),
        )
        .get_matches();

    let loaded = match matches.get_one::<String>("config") {
        Some(path) => Settings::from_file(path),
        None => Settings::new(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings);

    let input_path = matches
        .get_one::<String>("input-path")
        .map(|s| s.as_str())
        .unwrap_or_default();
    let output_path = matches
        .get_one::<String>("output-path")
        .map(|s| s.as_str())
        .unwrap_or_default();

    match run_demo_pipeline(settings, input_path, output_path).await {
        Ok(report) => {
            println!(
                "Run {} finished: {} rows processed, {} groups in final results",
                report.run_id, report.processed_count, report.final_count
            );
        }
        Err(e) => {
            eprintln!("Pipeline error: {}", e);
            process::exit(1);
        }
    }
}
