//! Error types for the weight extractor, the dataset partitioner and the
//! detection report.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while extracting EMA weights from a checkpoint.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Checkpoint file is absent, unreadable, corrupt or in an unsupported format.
    #[error("failed to load checkpoint {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// The checkpoint holds no recognizable parameter mapping.
    #[error("no 'state_dict' key or parameter mapping found: {0}")]
    Format(String),

    /// Neither EMA weights nor plain model weights survived extraction.
    #[error("no EMA or model weights could be extracted")]
    Extraction,

    /// The pruned mapping could not be written.
    #[error("failed to write weights to {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl ExtractError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Run-level errors of the dataset partitioner. Per-sample problems are
/// reported as [`crate::types::SkippedSample`] instead.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no JSON label files found under {0}")]
    NoInput(PathBuf),

    #[error("invalid label file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("invalid split ratios: {0}")]
    InvalidRatios(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DatasetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while turning raw model output into a detection report.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("image_size length must be 1 or 2, got {0}")]
    ImageSizeLength(usize),

    #[error("invalid image_size value: {0}")]
    ImageSizeValue(String),

    #[error("prediction row must hold 5 or 6 values, got {0}")]
    PredictionRow(usize),

    #[error("class id {class_id} out of range for {class_num} classes")]
    UnknownClass { class_id: usize, class_num: usize },

    #[error("failed to write detection report {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}
