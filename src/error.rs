//! Error types for the counting pipeline.
//!
//! Application plumbing uses `anyhow`; the variants here are the failures
//! callers are expected to match on.

use std::path::PathBuf;

/// Failure of the external detection source for a single photo.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// The results file has no entry for this photo.
    #[error("no detection results for {path}")]
    MissingEntry { path: PathBuf },

    /// The detector itself recorded a failure for this photo.
    #[error("detector failed on {path}: {reason}")]
    Reported { path: PathBuf, reason: String },

    /// Image dimensions are needed to convert normalized boxes to pixels.
    #[error("cannot read image dimensions of {path}")]
    Dimensions {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The results file could not be read.
    #[error("failed to read detection results '{path}'")]
    ResultsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The results file is not valid MegaDetector batch output.
    #[error("failed to parse detection results '{path}'")]
    ResultsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Neither EXIF nor filesystem metadata gave a capture time.
#[derive(Debug, thiserror::Error)]
#[error("no capture timestamp available for {path}")]
pub struct TimestampError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Malformed `detections_blob` text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("detection entry {index} has {found} fields, expected 6")]
    FieldCount { index: usize, found: usize },

    #[error("detection entry {index}: invalid {field} value '{value}'")]
    InvalidNumber {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Illegal use of a buffered scene.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene {key} cannot go from {from} to {to}")]
    InvalidTransition {
        key: u64,
        from: &'static str,
        to: &'static str,
    },

    #[error("scene {0} is not buffered")]
    Unknown(u64),

    #[error("scene {0} closed without photos")]
    Empty(u64),
}
