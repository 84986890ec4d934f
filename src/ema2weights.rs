use clap::Parser;
use log::{error, info, warn};

use yolo_prep::{clean_ema_weights, EmaArgs, PrefixMode};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = EmaArgs::parse();

    info!("Starting EMA weight extraction...");

    match clean_ema_weights(&args.ckpt_path, &args.output_path, &args.ema_key) {
        Ok(summary) => {
            if summary.mode == PrefixMode::Fallback {
                warn!("Output holds the full mapping, not EMA weights.");
            }
            info!(
                "Saved {} tensors to {}",
                summary.tensors_written,
                summary.output_path.display()
            );
        }
        Err(e) => error!("EMA extraction failed: {}", e),
    }
}
