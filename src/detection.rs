//! Detection report for single-image inference
//!
//! The model and drawing belong to the detection framework. This module covers
//! the data on either side of it: the input size the model is built for, the
//! selection of boxes from its raw rows, and the JSON report written from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DetectionError;

/// Box selection and report output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub class_names: Vec<String>,
    pub min_confidence: f32,
    /// Same-class boxes overlapping a kept box above this IoU are suppressed
    pub min_iou: f32,
    pub max_bbox: usize,
    pub output_json: PathBuf,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            class_names: vec!["fl".to_string(), "sm".to_string()],
            min_confidence: 0.5,
            min_iou: 0.5,
            max_bbox: 300,
            output_json: PathBuf::from("./output.json"),
        }
    }
}

impl InferenceSettings {
    pub fn class_num(&self) -> usize {
        self.class_names.len()
    }

    /// Turn prediction rows into the detections to report.
    ///
    /// Rows below `min_confidence` are dropped, then boxes are kept greedily by
    /// descending score with per-class suppression at `min_iou`, up to `max_bbox`.
    pub fn select_detections(
        &self,
        predictions: &[Vec<f32>],
    ) -> Result<Vec<Detection>, DetectionError> {
        let mut candidates = Vec::with_capacity(predictions.len());
        for row in predictions {
            let detection = Detection::from_prediction(row)?;
            if detection.class_id >= self.class_num() {
                return Err(DetectionError::UnknownClass {
                    class_id: detection.class_id,
                    class_num: self.class_num(),
                });
            }
            if detection.score >= self.min_confidence {
                candidates.push(detection);
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut kept: Vec<Detection> = Vec::new();
        for candidate in candidates {
            if kept.len() == self.max_bbox {
                break;
            }
            let suppressed = kept
                .iter()
                .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > self.min_iou);
            if !suppressed {
                kept.push(candidate);
            }
        }

        log::debug!("Kept {} of {} predicted boxes", kept.len(), predictions.len());
        Ok(kept)
    }

    /// Select detections from `predictions` and write the report to `output_json`
    pub fn write_report(
        &self,
        image_path: &Path,
        image_size: ImageSize,
        predictions: &[Vec<f32>],
    ) -> Result<DetectionReport, DetectionError> {
        let report = DetectionReport {
            meta: ReportMeta {
                image_path: image_path.display().to_string(),
                image_size,
            },
            detections: self.select_detections(predictions)?,
        };
        report.write(&self.output_json)?;
        Ok(report)
    }
}

fn dimension(value: &Value) -> Result<u32, DetectionError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DetectionError::ImageSizeValue(value.to_string()))
}

/// Resolve a configured image size to `(height, width)`.
///
/// Accepts a scalar, or a list of one or two values.
pub fn resolve_image_size(value: &Value) -> Result<(u32, u32), DetectionError> {
    match value {
        Value::Array(items) => match items.as_slice() {
            [side] => {
                let side = dimension(side)?;
                Ok((side, side))
            }
            [height, width] => Ok((dimension(height)?, dimension(width)?)),
            _ => Err(DetectionError::ImageSizeLength(items.len())),
        },
        scalar => {
            let side = dimension(scalar)?;
            Ok((side, side))
        }
    }
}

/// One detected object, with a COCO-style `[x, y, w, h]` box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: usize,
}

impl Detection {
    /// Build from a post-processed row `[class_id, x_min, y_min, x_max, y_max, conf?]`.
    /// Corners may come in either order; a missing confidence scores 0.
    pub fn from_prediction(row: &[f32]) -> Result<Self, DetectionError> {
        let (head, conf) = match row.len() {
            5 => (row, 0.0),
            6 => (&row[..5], row[5]),
            n => return Err(DetectionError::PredictionRow(n)),
        };

        let (x1, x2) = (head[1].min(head[3]), head[1].max(head[3]));
        let (y1, y2) = (head[2].min(head[4]), head[2].max(head[4]));

        Ok(Self {
            bbox: [x1, y1, x2 - x1, y2 - y1],
            score: conf,
            class_id: head[0].max(0.0) as usize,
        })
    }

    pub fn label<'a>(&self, class_names: &'a [String]) -> Option<&'a str> {
        class_names.get(self.class_id).map(String::as_str)
    }

    /// Intersection over union of two boxes
    pub fn iou(&self, other: &Detection) -> f32 {
        let [ax, ay, aw, ah] = self.bbox;
        let [bx, by, bw, bh] = other.bbox;

        let iw = ((ax + aw).min(bx + bw) - ax.max(bx)).max(0.0);
        let ih = ((ay + ah).min(by + bh) - ay.max(by)).max(0.0);
        let inter = iw * ih;
        let union = aw * ah + bw * bh - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub image_path: String,
    pub image_size: ImageSize,
}

/// The JSON document written next to the annotated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub meta: ReportMeta,
    pub detections: Vec<Detection>,
}

impl DetectionReport {
    /// Build a report from post-processed prediction rows
    pub fn from_predictions(
        image_path: &Path,
        image_size: ImageSize,
        predictions: &[Vec<f32>],
    ) -> Result<Self, DetectionError> {
        let detections = predictions
            .iter()
            .map(|row| Detection::from_prediction(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            meta: ReportMeta {
                image_path: image_path.display().to_string(),
                image_size,
            },
            detections,
        })
    }

    /// Write the report as pretty JSON (2-space indentation)
    pub fn write(&self, path: &Path) -> Result<(), DetectionError> {
        let to_err = |reason: String| DetectionError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::create(path).map_err(|e| to_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| to_err(e.to_string()))?;
        writer.flush().map_err(|e| to_err(e.to_string()))?;

        log::info!("Detections JSON saved at: {}", path.display());
        Ok(())
    }
}
