use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fmt::Display;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::annotation::AnnotationRecord;

/// Read and parse a single label file into an annotation record.
///
/// Errors are returned as text so the caller can attach them to the sample.
pub fn read_annotation_record(path: &Path) -> Result<AnnotationRecord, String> {
    let file = fs::File::open(path).map_err(|e| format!("failed to open: {}", e))?;

    // Parse JSON directly from the file stream
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("failed to parse JSON: {}", e)),
    }
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .progress_chars("#>-"),
    );
    pb
}

/// Create a directory (and its parents) if missing; existing content is kept
pub fn ensure_directory(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        log::debug!("Directory {:?} already exists, reusing it.", path);
    }
    fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Keep a walk entry, or log why it is dropped
pub fn ok_or_warn<T, E: Display>(entry: Result<T, E>, context: &str) -> Option<T> {
    match entry {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Skipping unreadable entry under {}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_annotation_record() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"image": {"filename": "a.jpg"}, "annotations": []}"#).unwrap();
        let record = read_annotation_record(&good).unwrap();
        assert!(record.contains_key("image"));

        let array = dir.path().join("array.json");
        fs::write(&array, "[1, 2]").unwrap();
        assert_eq!(
            read_annotation_record(&array).unwrap_err(),
            "expected a JSON object"
        );

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{\"image\":").unwrap();
        assert!(read_annotation_record(&broken)
            .unwrap_err()
            .starts_with("failed to parse JSON"));

        assert!(read_annotation_record(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_ensure_directory_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images/train");
        ensure_directory(&target).unwrap();
        fs::write(target.join("keep.jpg"), b"x").unwrap();

        ensure_directory(&target).unwrap();
        assert!(target.join("keep.jpg").exists());
    }

    #[test]
    fn test_ok_or_warn_drops_errors() {
        let entries: Vec<Result<u32, String>> =
            vec![Ok(1), Err("permission denied".to_string()), Ok(3)];
        let kept: Vec<u32> = entries
            .into_iter()
            .filter_map(|entry| ok_or_warn(entry, "labels"))
            .collect();
        assert_eq!(kept, vec![1, 3]);
    }
}
