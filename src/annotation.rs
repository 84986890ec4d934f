//! Per-sample annotation records and category filtering

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A category entry as written to the consolidated annotation files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_index: i64,
    pub category_name: String,
}

impl Category {
    pub fn new(category_index: i64, category_name: impl Into<String>) -> Self {
        Self {
            category_index,
            category_name: category_name.into(),
        }
    }
}

/// The classes kept in the dataset; the 'none' class (3) is dropped
pub fn default_categories() -> Vec<Category> {
    vec![Category::new(1, "fl"), Category::new(2, "sm")]
}

/// A JSON annotation record, kept as an ordered object so unknown fields survive
pub type AnnotationRecord = Map<String, Value>;

/// `image.filename` of a record, if present
pub fn image_filename(record: &AnnotationRecord) -> Option<&str> {
    record
        .get("image")
        .and_then(|image| image.get("filename"))
        .and_then(Value::as_str)
}

// Integral `categories_id` of an annotation entry
fn category_id(annotation: &Value) -> Option<i64> {
    match annotation.get("categories_id")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    }
}

/// Replaces a record's categories with a fixed set and drops annotations
/// whose `categories_id` is outside it.
#[derive(Debug, Clone)]
pub struct CategoryFilter {
    categories: Value,
    allowed: HashSet<i64>,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::new(&default_categories())
    }
}

impl CategoryFilter {
    pub fn new(categories: &[Category]) -> Self {
        let allowed = categories.iter().map(|c| c.category_index).collect();
        let categories = Value::Array(
            categories
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "category_index": c.category_index,
                        "category_name": c.category_name,
                    })
                })
                .collect(),
        );
        Self {
            categories,
            allowed,
        }
    }

    pub fn allows(&self, annotation: &Value) -> bool {
        category_id(annotation).is_some_and(|id| self.allowed.contains(&id))
    }

    /// Filter one record. Every other field is left untouched, and a record
    /// with no surviving annotations is still returned.
    pub fn apply(&self, mut record: AnnotationRecord) -> AnnotationRecord {
        record.insert("categories".to_string(), self.categories.clone());

        // take in place: the key keeps its position in the record
        let annotations = match record.get_mut("annotations").map(Value::take) {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter(|entry| self.allows(entry))
                .collect(),
            _ => Vec::new(),
        };
        record.insert("annotations".to_string(), Value::Array(annotations));

        record
    }
}
