use log::{info, warn};
use rayon::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::annotation::{image_filename, AnnotationRecord, CategoryFilter};
use crate::config::{MissingMediaPolicy, PartitionConfig};
use crate::error::DatasetError;
use crate::io::{
    copy_image, discover_label_files, setup_output_directories, write_annotation_file,
    ImageIndex, OutputDirs,
};
use crate::split::partition;
use crate::types::{PartitionReport, SkipReason, SplitName, SplitSummary};
use crate::utils::{create_progress_bar, read_annotation_record};

// Shared, read-only state for processing one split
struct SplitContext<'a> {
    config: &'a PartitionConfig,
    output_dirs: &'a OutputDirs,
    image_index: &'a ImageIndex,
    filter: &'a CategoryFilter,
}

/// Main dataset processing pipeline: discover, split, copy, filter, write.
///
/// Per-sample problems never abort the run; they end up in
/// [`PartitionReport::skipped`].
pub fn process_dataset(config: &PartitionConfig) -> Result<PartitionReport, DatasetError> {
    config.ratios.validate()?;

    let label_files = discover_label_files(&config.label_dir)?;
    info!("Found {} label files.", label_files.len());

    let total = label_files.len();
    let partitions = partition(label_files, &config.ratios, config.seed)?;
    info!("Split result:");
    for (split, paths) in partitions.iter() {
        info!("  {}: {}", split.label(), paths.len());
    }

    let output_dirs = setup_output_directories(&config.output_dir)?;
    let image_index = ImageIndex::build(&config.image_dir, &config.image_extension);
    if image_index.is_empty() {
        warn!(
            "No .{} images found under {}",
            config.image_extension,
            config.image_dir.display()
        );
    }
    let filter = CategoryFilter::new(&config.categories);

    let ctx = SplitContext {
        config,
        output_dirs: &output_dirs,
        image_index: &image_index,
        filter: &filter,
    };

    let mut report = PartitionReport::new(total);
    for (split, paths) in partitions.iter() {
        let summary = process_split(&ctx, split, paths, &mut report)?;
        report.splits.insert(split, summary);
    }

    report.print_summary();
    Ok(report)
}

/// Copy the images of one split and write its consolidated annotation file
fn process_split(
    ctx: &SplitContext<'_>,
    split: SplitName,
    label_paths: &[PathBuf],
    report: &mut PartitionReport,
) -> Result<SplitSummary, DatasetError> {
    info!("Processing {} split...", split.label());
    let pb = create_progress_bar(label_paths.len() as u64, split.label());

    // Parsing and filtering are pure; collect keeps input order
    let parsed: Vec<Result<AnnotationRecord, String>> = label_paths
        .par_iter()
        .map(|path| read_annotation_record(path).map(|record| ctx.filter.apply(record)))
        .collect();

    let images_dir = ctx.output_dirs.images_dir(split);
    let mut records = Vec::with_capacity(label_paths.len());
    let mut images_copied = 0;

    for (label_path, parsed) in label_paths.iter().zip(parsed) {
        pb.inc(1);

        let record = match parsed {
            Ok(record) => record,
            Err(reason) => {
                warn!("Skipping {}: {}", label_path.display(), reason);
                report.record_skip(split, label_path, SkipReason::UnreadableLabel(reason));
                continue;
            }
        };

        match locate_and_copy(ctx, label_path, &record, images_dir) {
            Ok(()) => images_copied += 1,
            Err(reason) => {
                let keep = matches!(reason, SkipReason::MissingImage { .. })
                    && ctx.config.missing_media == MissingMediaPolicy::KeepRecord;
                warn!(
                    "{}: {}{}",
                    label_path.display(),
                    reason,
                    if keep { ", keeping its record" } else { ", skipping" }
                );
                report.record_skip(split, label_path, reason);
                if !keep {
                    continue;
                }
            }
        }

        records.push(Value::Object(record));
    }
    pb.finish_with_message(format!("{} processing complete", split.label()));

    let annotation_file = ctx.output_dirs.annotation_file(split);
    write_annotation_file(&annotation_file, &records)?;
    info!("Wrote {}", annotation_file.display());

    Ok(SplitSummary {
        records: records.len(),
        images_copied,
        annotation_file,
    })
}

// Find `<label stem>.<ext>` in the image tree and copy it into the split
fn locate_and_copy(
    ctx: &SplitContext<'_>,
    label_path: &Path,
    record: &AnnotationRecord,
    images_dir: &Path,
) -> Result<(), SkipReason> {
    let stem = label_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let image_path = ctx.image_index.find(&stem).ok_or_else(|| SkipReason::MissingImage {
        image_filename: image_filename(record)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{}", stem, ctx.config.image_extension)),
    })?;

    copy_image(image_path, images_dir)
        .map(|_| ())
        .map_err(|e| SkipReason::CopyFailed(format!("{}: {}", image_path.display(), e)))
}
