//! Trapcount - scene segmentation and animal counting for camera-trap photos.
//!
//! Photos of one deployment folder are split into scenes by idle gaps,
//! detections are given scene-scoped identities and smoothed class labels,
//! and every photo of a scene is stored with the scene's peak animal count.

pub mod cli;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod scanner;

pub use config::Config;
pub use db::{Database, PhotoStore};
pub use detection::{BoundingBox, Detection, DetectionSource, RawDetection};
pub use pipeline::{
    CenterDistanceMatcher, IdentityMatcher, LabelSmoother, PendingPhoto, PipelineSettings,
    RunSummary, ScenePipeline,
};
