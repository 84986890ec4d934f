//! Preparation tooling for YOLO training
//!
//! This library extracts EMA weights from training checkpoints and converts a
//! per-sample JSON dataset into train/val/test splits with consolidated
//! annotation files. It also carries the data side of single-image inference.

pub mod annotation;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod ema;
pub mod error;
pub mod io;
pub mod split;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use annotation::{default_categories, AnnotationRecord, Category, CategoryFilter};
pub use checkpoint::{load_checkpoint, load_weights, save_weights, CheckpointValue, Mapping, TensorData};
pub use config::{EmaArgs, MissingMediaPolicy, PartitionConfig, SplitArgs};
pub use dataset::process_dataset;
pub use detection::{resolve_image_size, Detection, DetectionReport, InferenceSettings};
pub use ema::{clean_ema_weights, extract_ema_weights, EmaPrefixPolicy, Extraction, PrefixMode};
pub use error::{DatasetError, DetectionError, ExtractError};
pub use split::{partition, SplitRatios};
pub use types::{PartitionReport, Partitions, SkipReason, SkippedSample, SplitName};
