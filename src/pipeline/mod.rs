//! Scene building: segmentation, identity tracking, label smoothing and
//! per-scene aggregation, driven photo by photo by [`ScenePipeline`].

pub mod aggregator;
pub mod identity;
pub mod processor;
pub mod segmenter;
pub mod smoother;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::path::PathBuf;

use crate::detection::Detection;

pub use aggregator::{FinalizedScene, SceneAggregator, SceneState};
pub use identity::{CenterDistanceMatcher, IdentityMatcher, IdentityTracker};
pub use processor::{process_folder, PipelineProgress, ScenePipeline};
pub use segmenter::{Boundary, SceneSegmenter};
pub use smoother::LabelSmoother;

/// A registered photo waiting to be run through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPhoto {
    pub id: i64,
    pub path: PathBuf,
    pub capture_timestamp: NaiveDateTime,
}

/// One photo after detection, tracking and smoothing.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPhoto {
    pub photo_id: i64,
    pub path: PathBuf,
    pub capture_timestamp: NaiveDateTime,
    pub detections: Vec<Detection>,
    pub detection_count: u32,
    /// Distinct identities in this photo alone.
    pub provisional_unique_count: u32,
    /// Scene maximum once the scene is finalized; provisional before that.
    pub unique_identity_count: u32,
}

impl ProcessedPhoto {
    pub fn new(photo: &PendingPhoto, detections: Vec<Detection>) -> Self {
        let ids: Vec<u32> = detections.iter().map(|d| d.identity_id).collect();
        let provisional = identity::distinct_identities(&ids);
        Self {
            photo_id: photo.id,
            path: photo.path.clone(),
            capture_timestamp: photo.capture_timestamp,
            detection_count: detections.len() as u32,
            detections,
            provisional_unique_count: provisional,
            unique_identity_count: provisional,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub gap_threshold: Duration,
    pub reset_smoothing_per_scene: bool,
    pub flush_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            gap_threshold: Duration::minutes(30),
            reset_smoothing_per_scene: false,
            flush_attempts: 2,
        }
    }
}

/// A scene written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneOutcome {
    pub scene_id: i64,
    pub photo_ids: Vec<i64>,
    pub unique_identity_count: u32,
}

/// A photo skipped because detection failed or it has no capture time.
/// It stays unprocessed.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoFailure {
    pub photo_id: i64,
    pub path: PathBuf,
    pub reason: String,
}

/// A scene whose write was rolled back on every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FailedScene {
    pub photo_ids: Vec<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub photos_processed: usize,
    pub scenes: Vec<SceneOutcome>,
    pub failures: Vec<PhotoFailure>,
    pub failed_scenes: Vec<FailedScene>,
    pub cancelled: bool,
    /// Photos dropped with the in-progress scene on cancellation.
    pub discarded_photos: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.failed_scenes.is_empty() && !self.cancelled
    }
}
