use clap::Parser;
use log::{error, info};

use yolo_prep::{process_dataset, SplitArgs};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = SplitArgs::parse();

    let config = match args.to_partition_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    info!("Starting the dataset conversion process...");

    match process_dataset(&config) {
        Ok(report) => info!(
            "Conversion complete: {} label files, {} skipped.",
            report.total_label_files,
            report.skipped.len()
        ),
        Err(e) => error!("Failed to process dataset: {}", e),
    }
}
