//! Detection source backed by a MegaDetector batch output file.
//!
//! MegaDetector writes one JSON document per batch run with normalized
//! `[x, y, width, height]` boxes. Boxes are converted to pixels of the
//! original image, so image dimensions are read for photos that have
//! detections above the confidence floor.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::DetectionError;

use super::{BoundingBox, DetectionSource, RawDetection};

#[derive(Debug, Deserialize)]
struct BatchOutput {
    images: Vec<ImageEntry>,
    #[serde(default)]
    detection_categories: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageEntry {
    file: String,
    #[serde(default)]
    detections: Option<Vec<EntryDetection>>,
    #[serde(default)]
    failure: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EntryDetection {
    category: String,
    conf: f32,
    bbox: [f64; 4],
}

pub struct MegaDetectorResults {
    base_dir: PathBuf,
    by_file: HashMap<String, ImageEntry>,
    by_name: HashMap<String, String>,
    categories: HashMap<String, String>,
    min_confidence: f32,
}

impl MegaDetectorResults {
    /// Load a results file. Relative `file` entries resolve against its directory.
    pub fn load(path: &Path, min_confidence: f32) -> Result<Self, DetectionError> {
        let content = std::fs::read_to_string(path).map_err(|source| DetectionError::ResultsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&content, base_dir, min_confidence).map_err(|source| {
            DetectionError::ResultsParse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn from_json(
        json: &str,
        base_dir: PathBuf,
        min_confidence: f32,
    ) -> Result<Self, serde_json::Error> {
        let output: BatchOutput = serde_json::from_str(json)?;

        let mut by_file = HashMap::with_capacity(output.images.len());
        let mut by_name = HashMap::new();
        for entry in output.images {
            let key = normalize(&entry.file);
            if let Some(name) = key.rsplit('/').next() {
                by_name.entry(name.to_string()).or_insert_with(|| key.clone());
            }
            by_file.insert(key, entry);
        }

        tracing::debug!(
            images = by_file.len(),
            categories = output.detection_categories.len(),
            "Loaded MegaDetector results"
        );

        Ok(Self {
            base_dir,
            by_file,
            by_name,
            categories: output.detection_categories,
            min_confidence,
        })
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    fn lookup(&self, path: &Path) -> Option<&ImageEntry> {
        let full = normalize(&path.to_string_lossy());
        if let Some(entry) = self.by_file.get(&full) {
            return Some(entry);
        }

        if let Ok(relative) = path.strip_prefix(&self.base_dir) {
            if let Some(entry) = self.by_file.get(&normalize(&relative.to_string_lossy())) {
                return Some(entry);
            }
        }

        let name = path.file_name()?.to_string_lossy();
        self.by_name
            .get(name.as_ref())
            .and_then(|key| self.by_file.get(key))
    }

    fn category_name(&self, category: &str) -> String {
        self.categories
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.to_string())
    }
}

impl DetectionSource for MegaDetectorResults {
    fn detect(&self, path: &Path) -> Result<Vec<RawDetection>, DetectionError> {
        let entry = self.lookup(path).ok_or_else(|| DetectionError::MissingEntry {
            path: path.to_path_buf(),
        })?;

        if let Some(reason) = &entry.failure {
            return Err(DetectionError::Reported {
                path: path.to_path_buf(),
                reason: reason.clone(),
            });
        }

        let kept: Vec<&EntryDetection> = entry
            .detections
            .iter()
            .flatten()
            .filter(|d| d.conf >= self.min_confidence)
            .collect();
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let (width, height) =
            image::image_dimensions(path).map_err(|source| DetectionError::Dimensions {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(kept
            .into_iter()
            .map(|d| RawDetection {
                bbox: to_pixels(d.bbox, width, height),
                class_label: self.category_name(&d.category),
                confidence: d.conf,
            })
            .collect())
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

fn to_pixels(bbox: [f64; 4], width: u32, height: u32) -> BoundingBox {
    let (w, h) = (width as f64, height as f64);
    let [x, y, bw, bh] = bbox;
    BoundingBox::new(
        (x * w).round() as i32,
        (y * h).round() as i32,
        ((x + bw) * w).round() as i32,
        ((y + bh) * h).round() as i32,
    )
}
