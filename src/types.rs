use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// One of the three dataset subsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitName {
    Train,
    Val,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::Val, SplitName::Test];

    /// Directory and file-name fragment for this split
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Val => "val",
            SplitName::Test => "test",
        }
    }

    /// Label shown on the progress bar
    pub fn label(&self) -> &'static str {
        match self {
            SplitName::Train => "Train",
            SplitName::Val => "Val",
            SplitName::Test => "Test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Three disjoint subsets produced by a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Partitions<T> {
    pub fn get(&self, split: SplitName) -> &[T] {
        match split {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }

    /// Total number of items across all subsets
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the subsets in train, val, test order
    pub fn iter(&self) -> impl Iterator<Item = (SplitName, &[T])> {
        SplitName::ALL.into_iter().map(move |split| (split, self.get(split)))
    }
}

// Why a sample was left out of (or only partially written to) its subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No `<stem>.<ext>` image exists anywhere under the image directory
    MissingImage { image_filename: String },
    /// The label file could not be read or is not a JSON object
    UnreadableLabel(String),
    /// The image exists but copying it failed
    CopyFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingImage { image_filename } => {
                write!(f, "image file '{}' not found", image_filename)
            }
            SkipReason::UnreadableLabel(reason) => write!(f, "unreadable label file: {}", reason),
            SkipReason::CopyFailed(reason) => write!(f, "image copy failed: {}", reason),
        }
    }
}

// A per-sample diagnostic collected during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSample {
    pub split: SplitName,
    pub label_path: PathBuf,
    pub reason: SkipReason,
}

// What was written for one subset
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub records: usize,
    pub images_copied: usize,
    pub annotation_file: PathBuf,
}

// Outcome of a dataset partitioning run
#[derive(Debug, Default, Clone)]
pub struct PartitionReport {
    pub total_label_files: usize,
    pub splits: BTreeMap<SplitName, SplitSummary>,
    pub skipped: Vec<SkippedSample>,
}

impl PartitionReport {
    pub fn new(total_label_files: usize) -> Self {
        Self {
            total_label_files,
            ..Self::default()
        }
    }

    pub fn record_skip(&mut self, split: SplitName, label_path: &Path, reason: SkipReason) {
        self.skipped.push(SkippedSample {
            split,
            label_path: label_path.to_path_buf(),
            reason,
        });
    }

    pub fn summary(&self, split: SplitName) -> Option<&SplitSummary> {
        self.splits.get(&split)
    }

    /// Samples whose image could not be located
    pub fn missing_media(&self) -> impl Iterator<Item = &SkippedSample> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::MissingImage { .. }))
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Total label files: {}", self.total_label_files);
        for (split, summary) in &self.splits {
            log::info!(
                "{}: {} records, {} images copied -> {}",
                split.label(),
                summary.records,
                summary.images_copied,
                summary.annotation_file.display()
            );
        }

        let missing = self.missing_media().count();
        if !self.skipped.is_empty() {
            log::warn!(
                "Total skipped samples: {} (missing image file: {}, other: {})",
                self.skipped.len(),
                missing,
                self.skipped.len() - missing
            );
        }
    }
}
