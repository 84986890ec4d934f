use glob::{glob, Pattern};
use jwalk::WalkDir;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{copy, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DatasetError;
use crate::types::SplitName;
use crate::utils::{ensure_directory, ok_or_warn};

// Paths of the output directories for the train/val/test splits
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub train_images_dir: PathBuf,
    pub val_images_dir: PathBuf,
    pub test_images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl OutputDirs {
    pub fn images_dir(&self, split: SplitName) -> &Path {
        match split {
            SplitName::Train => &self.train_images_dir,
            SplitName::Val => &self.val_images_dir,
            SplitName::Test => &self.test_images_dir,
        }
    }

    /// `labels/annotations_<split>.json`
    pub fn annotation_file(&self, split: SplitName) -> PathBuf {
        self.labels_dir.join(format!("annotations_{}.json", split))
    }
}

/// Set up `images/{train,val,test}` and `labels` under `base_dir`
pub fn setup_output_directories(base_dir: &Path) -> Result<OutputDirs, DatasetError> {
    let ensure = |path: PathBuf| ensure_directory(&path).map_err(|e| DatasetError::io(&path, e));

    let images_dir = base_dir.join("images");
    let output_dirs = OutputDirs {
        train_images_dir: ensure(images_dir.join("train"))?,
        val_images_dir: ensure(images_dir.join("val"))?,
        test_images_dir: ensure(images_dir.join("test"))?,
        labels_dir: ensure(base_dir.join("labels"))?,
    };
    log::info!(
        "Output layout ready: {}/{{images, labels}}/{{train, val, test}}",
        base_dir.display()
    );
    Ok(output_dirs)
}

/// Recursively find every `.json` file under `label_dir`, sorted by path.
///
/// Fails with [`DatasetError::NoInput`] when there are none.
pub fn discover_label_files(label_dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let json_pattern = format!(
        "{}/**/*.json",
        Pattern::escape(&label_dir.to_string_lossy())
    );
    let context = label_dir.display().to_string();
    let mut label_files: Vec<PathBuf> = glob(&json_pattern)?
        .filter_map(|entry| ok_or_warn(entry, &context))
        .filter(|path| path.is_file())
        .collect();

    if label_files.is_empty() {
        return Err(DatasetError::NoInput(label_dir.to_path_buf()));
    }
    label_files.sort();
    Ok(label_files)
}

/// Index of image files under a directory tree, keyed by file stem
#[derive(Debug, Default)]
pub struct ImageIndex {
    by_stem: HashMap<String, PathBuf>,
}

impl ImageIndex {
    /// Walk `image_dir` once and index every file with extension `extension`.
    /// When several files share a stem the lexicographically smallest path wins.
    pub fn build(image_dir: &Path, extension: &str) -> Self {
        let mut by_stem: HashMap<String, PathBuf> = HashMap::new();
        let context = image_dir.display().to_string();

        let image_entries = WalkDir::new(image_dir)
            .skip_hidden(false)
            .into_iter()
            .filter_map(|entry| ok_or_warn(entry, &context))
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == extension)
            })
            .map(|e| e.path());

        for path in image_entries {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let replace = by_stem
                .get(&stem)
                .map_or(true, |existing| path < *existing);
            if replace {
                by_stem.insert(stem, path);
            }
        }

        log::debug!("Indexed {} images under {}", by_stem.len(), image_dir.display());
        Self { by_stem }
    }

    pub fn find(&self, stem: &str) -> Option<&Path> {
        self.by_stem.get(stem).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_stem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stem.is_empty()
    }
}

/// Copy an image flat into `images_dir` under its unchanged file name
pub fn copy_image(image_path: &Path, images_dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = image_path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no file name", image_path.display()),
        )
    })?;
    let image_output_path = images_dir.join(file_name);
    copy(image_path, &image_output_path)?;
    Ok(image_output_path)
}

/// Write records as one JSON array with 4-space indentation
pub fn write_annotation_file(path: &Path, records: &[Value]) -> Result<(), DatasetError> {
    let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    records
        .serialize(&mut serializer)
        .map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    writer.flush().map_err(|e| DatasetError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_label_files_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("b/nested/2.json"), "{}").unwrap();
        fs::write(root.join("a/1.json"), "{}").unwrap();
        fs::write(root.join("a/notes.txt"), "").unwrap();

        let files = discover_label_files(root).unwrap();
        assert_eq!(
            files,
            vec![root.join("a/1.json"), root.join("b/nested/2.json")]
        );
    }

    #[test]
    fn test_discover_label_files_empty_is_no_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_label_files(dir.path()),
            Err(DatasetError::NoInput(_))
        ));
        assert!(matches!(
            discover_label_files(&dir.path().join("missing")),
            Err(DatasetError::NoInput(_))
        ));
    }

    #[test]
    fn test_image_index_picks_smallest_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("z")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("z/img_1.jpg"), b"z").unwrap();
        fs::write(root.join("a/img_1.jpg"), b"a").unwrap();
        fs::write(root.join("a/img_2.png"), b"p").unwrap();

        let index = ImageIndex::build(root, "jpg");
        assert_eq!(index.len(), 1);
        assert_eq!(index.find("img_1"), Some(root.join("a/img_1.jpg").as_path()));
        assert_eq!(index.find("img_2"), None);
    }

    #[test]
    fn test_copy_image_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cam:01 <night>.jpg");
        let dest = dir.path().join("out");
        fs::write(&src, b"jpg").unwrap();
        fs::create_dir_all(&dest).unwrap();

        let copied = copy_image(&src, &dest).unwrap();
        assert_eq!(copied, dest.join("cam:01 <night>.jpg"));
        assert_eq!(fs::read(&copied).unwrap(), b"jpg");
    }

    #[test]
    fn test_write_annotation_file_uses_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations_train.json");
        let records = vec![serde_json::json!({"image": {"filename": "가.jpg"}})];

        write_annotation_file(&path, &records).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("[\n    {\n        \"image\""));
        assert!(written.contains("가.jpg"));
    }
}
