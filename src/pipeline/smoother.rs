//! Suppresses class flicker between consecutive detections.
//!
//! A detection seen within the window of the previous detection inherits the
//! previous detection's (possibly inherited) class. The state is owned by the
//! caller and spans the whole ingestion run unless explicitly reset.

use chrono::{Duration, NaiveDateTime};

#[derive(Debug, Clone)]
pub struct LabelSmoother {
    window: Duration,
    last_class: Option<String>,
    last_detection_time: Option<NaiveDateTime>,
}

impl LabelSmoother {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_class: None,
            last_detection_time: None,
        }
    }

    /// Smoothed label for a detection captured at `timestamp`.
    pub fn smooth(&mut self, raw_label: &str, timestamp: NaiveDateTime) -> String {
        let label = match (&self.last_class, self.last_detection_time) {
            (Some(last), Some(at)) if timestamp - at < self.window => last.clone(),
            _ => raw_label.to_string(),
        };

        self.last_class = Some(label.clone());
        self.last_detection_time = Some(timestamp);
        label
    }

    pub fn reset(&mut self) {
        self.last_class = None;
        self.last_detection_time = None;
    }

    pub fn last_class(&self) -> Option<&str> {
        self.last_class.as_deref()
    }
}

impl Default for LabelSmoother {
    fn default() -> Self {
        Self::new(Duration::seconds(30))
    }
}
