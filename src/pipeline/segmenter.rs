//! Splits a chronologically sorted photo stream into scenes.

use chrono::{Duration, NaiveDateTime};

/// What a photo's timestamp means for the scene being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// First photo, or the idle gap exceeded the threshold.
    NewScene,
    SameScene,
}

/// Opens a new scene whenever the gap to the previous photo is strictly
/// greater than the threshold. Input must be in ascending time order.
#[derive(Debug, Clone)]
pub struct SceneSegmenter {
    gap_threshold: Duration,
    last_timestamp: Option<NaiveDateTime>,
}

impl SceneSegmenter {
    pub fn new(gap_threshold: Duration) -> Self {
        Self {
            gap_threshold,
            last_timestamp: None,
        }
    }

    pub fn observe(&mut self, timestamp: NaiveDateTime) -> Boundary {
        let boundary = match self.last_timestamp {
            Some(last) if timestamp - last <= self.gap_threshold => Boundary::SameScene,
            _ => Boundary::NewScene,
        };
        self.last_timestamp = Some(timestamp);
        boundary
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }
}
