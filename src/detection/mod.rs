//! Detector output and the per-photo detection record.

pub mod blob;
pub mod megadetector;

use serde::Serialize;
use std::path::Path;

use crate::error::DetectionError;

pub use blob::{encode_detections, first_class_label, parse_detections, BlobEntry};
pub use megadetector::MegaDetectorResults;

/// Axis-aligned box in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).hypot(ay - by)
    }
}

/// One box as reported by the detector, before tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_label: String,
    pub confidence: f32,
}

/// A detection after identity assignment and label smoothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub raw_class_label: String,
    pub smoothed_class_label: String,
    pub identity_id: u32,
}

/// Anything that can turn a photo into detections.
pub trait DetectionSource {
    fn detect(&self, path: &Path) -> Result<Vec<RawDetection>, DetectionError>;
}
