use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::annotation::{default_categories, Category};
use crate::ema::DEFAULT_EMA_KEY;
use crate::error::DatasetError;
use crate::split::SplitRatios;

pub const DEFAULT_IMAGE_DIR: &str = "Sample/01.원천데이터";
pub const DEFAULT_LABEL_DIR: &str = "Sample/02.라벨링데이터";
pub const DEFAULT_OUTPUT_DIR: &str = "YOLO/data/custom";
pub const DEFAULT_SEED: u64 = 42;

/// Extract EMA weights from a training checkpoint into a plain weights file.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct EmaArgs {
    /// Path of the training checkpoint (safetensors)
    #[arg(long = "ckpt_path")]
    pub ckpt_path: PathBuf,

    /// Where to write the extracted weights
    #[arg(long = "output_path", default_value = "./ema_cleaned.pt")]
    pub output_path: PathBuf,

    /// Name of the EMA entry in the checkpoint
    #[arg(long = "ema_key", default_value = DEFAULT_EMA_KEY)]
    pub ema_key: String,
}

/// Split a per-sample JSON dataset into train/val/test and write one
/// consolidated annotation file per split.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct SplitArgs {
    /// Directory tree holding the source .jpg images
    #[arg(long = "image_dir", default_value = DEFAULT_IMAGE_DIR)]
    pub image_dir: PathBuf,

    /// Directory tree holding one JSON label file per sample
    #[arg(long = "label_dir", default_value = DEFAULT_LABEL_DIR)]
    pub label_dir: PathBuf,

    /// Base directory for images/ and labels/ output
    #[arg(long = "output_dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Proportion of the dataset to use for validation
    #[arg(long = "val_size", default_value_t = 0.1, value_parser = validate_size)]
    pub val_size: f64,

    /// Proportion of the dataset to use for testing
    #[arg(long = "test_size", default_value_t = 0.1, value_parser = validate_size)]
    pub test_size: f64,

    /// Seed for random shuffling
    #[arg(long = "seed", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Keep the annotation record of samples whose image is missing
    #[arg(long = "keep_missing_media")]
    pub keep_missing_media: bool,
}

impl SplitArgs {
    pub fn to_partition_config(&self) -> Result<PartitionConfig, DatasetError> {
        Ok(PartitionConfig {
            image_dir: self.image_dir.clone(),
            label_dir: self.label_dir.clone(),
            output_dir: self.output_dir.clone(),
            ratios: SplitRatios::from_holdout(self.val_size, self.test_size)?,
            seed: self.seed,
            missing_media: if self.keep_missing_media {
                MissingMediaPolicy::KeepRecord
            } else {
                MissingMediaPolicy::SkipSample
            },
            ..PartitionConfig::default()
        })
    }
}

/// What to do with a sample whose image cannot be found
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum MissingMediaPolicy {
    /// Leave the sample out of the subset entirely
    #[default]
    SkipSample,
    /// Keep its annotation record even though no image was copied
    KeepRecord,
}

/// Everything a dataset partitioning run needs
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    pub image_dir: PathBuf,
    pub label_dir: PathBuf,
    pub output_dir: PathBuf,
    pub categories: Vec<Category>,
    pub ratios: SplitRatios,
    pub seed: u64,
    /// Extension (without dot) of the image paired with each label file
    pub image_extension: String,
    pub missing_media: MissingMediaPolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            label_dir: PathBuf::from(DEFAULT_LABEL_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            categories: default_categories(),
            ratios: SplitRatios::default(),
            seed: DEFAULT_SEED,
            image_extension: "jpg".to_string(),
            missing_media: MissingMediaPolicy::SkipSample,
        }
    }
}

// Validate that the size is between 0.0 and 1.0
pub fn validate_size(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_size() {
        assert!(validate_size("0.5").is_ok());
        assert!(validate_size("1.0").is_ok());
        assert!(validate_size("0.0").is_ok());
        assert!(validate_size("-0.1").is_err());
        assert!(validate_size("1.1").is_err());
        assert!(validate_size("abc").is_err());
    }

    #[test]
    fn test_split_args_defaults_match_partition_config() {
        let args = SplitArgs::parse_from(["custom2coco"]);
        let config = args.to_partition_config().unwrap();
        let defaults = PartitionConfig::default();

        assert_eq!(config.image_dir, defaults.image_dir);
        assert_eq!(config.label_dir, defaults.label_dir);
        assert_eq!(config.output_dir, defaults.output_dir);
        assert_eq!(config.seed, 42);
        assert_eq!(config.categories, defaults.categories);
        assert_eq!(config.missing_media, MissingMediaPolicy::SkipSample);
        assert!((config.ratios.train - 0.8).abs() < 1e-9);
        assert_eq!(config.ratios.val, 0.1);
        assert_eq!(config.ratios.test, 0.1);
    }

    #[test]
    fn test_split_args_rejects_oversized_holdout() {
        let args = SplitArgs::parse_from(["custom2coco", "--val_size", "0.6", "--test_size", "0.6"]);
        assert!(matches!(
            args.to_partition_config(),
            Err(DatasetError::InvalidRatios(_))
        ));
    }

    #[test]
    fn test_ema_args() {
        let args = EmaArgs::parse_from(["ema2weights", "--ckpt_path", "run/last.ckpt"]);
        assert_eq!(args.ckpt_path, PathBuf::from("run/last.ckpt"));
        assert_eq!(args.output_path, PathBuf::from("./ema_cleaned.pt"));
        assert_eq!(args.ema_key, "ema");

        assert!(EmaArgs::try_parse_from(["ema2weights"]).is_err());
    }
}
