//! Buffers each scene's photos until the scene closes, then publishes the
//! scene-wide identity peak onto every member photo.
//!
//! Scenes move OPEN -> CLOSED -> FINALIZED and never back. A finalized scene
//! leaves the buffer as a [`FinalizedScene`], which has no way to accept
//! further photos.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SceneError;

use super::ProcessedPhoto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Open,
    Closed,
    Finalized,
}

impl SceneState {
    pub fn name(&self) -> &'static str {
        match self {
            SceneState::Open => "open",
            SceneState::Closed => "closed",
            SceneState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scene still held in memory.
#[derive(Debug)]
pub struct BufferedScene {
    key: u64,
    state: SceneState,
    photos: Vec<ProcessedPhoto>,
}

impl BufferedScene {
    fn new(key: u64) -> Self {
        Self {
            key,
            state: SceneState::Open,
            photos: Vec::new(),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn photos(&self) -> &[ProcessedPhoto] {
        &self.photos
    }

    fn transition_error(&self, to: SceneState) -> SceneError {
        SceneError::InvalidTransition {
            key: self.key,
            from: self.state.name(),
            to: to.name(),
        }
    }

    fn push(&mut self, photo: ProcessedPhoto) -> Result<(), SceneError> {
        if self.state != SceneState::Open {
            return Err(self.transition_error(SceneState::Open));
        }
        self.photos.push(photo);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SceneError> {
        if self.state != SceneState::Open {
            return Err(self.transition_error(SceneState::Closed));
        }
        if self.photos.is_empty() {
            return Err(SceneError::Empty(self.key));
        }
        self.state = SceneState::Closed;
        Ok(())
    }

    /// Caller guarantees the scene is closed and non-empty.
    fn into_finalized(self) -> FinalizedScene {
        let scene_max = self
            .photos
            .iter()
            .map(|p| p.provisional_unique_count)
            .max()
            .unwrap_or(0);

        let mut photos = self.photos;
        for photo in &mut photos {
            photo.unique_identity_count = scene_max;
        }

        FinalizedScene {
            key: self.key,
            photos,
            unique_identity_count: scene_max,
        }
    }
}

/// A scene whose final count has been computed and copied to every photo.
#[derive(Debug, Clone)]
pub struct FinalizedScene {
    key: u64,
    photos: Vec<ProcessedPhoto>,
    unique_identity_count: u32,
}

impl FinalizedScene {
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn state(&self) -> SceneState {
        SceneState::Finalized
    }

    pub fn photos(&self) -> &[ProcessedPhoto] {
        &self.photos
    }

    pub fn photo_ids(&self) -> Vec<i64> {
        self.photos.iter().map(|p| p.photo_id).collect()
    }

    /// Peak single-photo identity count over the scene.
    pub fn unique_identity_count(&self) -> u32 {
        self.unique_identity_count
    }
}

/// In-memory scenes keyed by a run-local key.
#[derive(Debug, Default)]
pub struct SceneAggregator {
    scenes: BTreeMap<u64, BufferedScene>,
    next_key: u64,
}

impl SceneAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start buffering a new scene and return its key.
    pub fn open(&mut self) -> u64 {
        self.next_key += 1;
        let key = self.next_key;
        self.scenes.insert(key, BufferedScene::new(key));
        key
    }

    pub fn push(&mut self, key: u64, photo: ProcessedPhoto) -> Result<(), SceneError> {
        self.scene_mut(key)?.push(photo)
    }

    pub fn close(&mut self, key: u64) -> Result<(), SceneError> {
        self.scene_mut(key)?.close()
    }

    /// Compute the scene maximum and release the scene from the buffer.
    pub fn finalize(&mut self, key: u64) -> Result<FinalizedScene, SceneError> {
        let scene = self.scenes.get(&key).ok_or(SceneError::Unknown(key))?;
        if scene.state != SceneState::Closed {
            return Err(scene.transition_error(SceneState::Finalized));
        }

        let scene = self.scenes.remove(&key).ok_or(SceneError::Unknown(key))?;
        Ok(scene.into_finalized())
    }

    /// Drop every buffered scene without writing it. Returns the dropped scenes.
    pub fn discard_all(&mut self) -> Vec<BufferedScene> {
        std::mem::take(&mut self.scenes).into_values().collect()
    }

    #[cfg(test)]
    pub fn get(&self, key: u64) -> Option<&BufferedScene> {
        self.scenes.get(&key)
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.scenes.len()
    }

    fn scene_mut(&mut self, key: u64) -> Result<&mut BufferedScene, SceneError> {
        self.scenes.get_mut(&key).ok_or(SceneError::Unknown(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn photo(id: i64, provisional: u32) -> ProcessedPhoto {
        ProcessedPhoto {
            photo_id: id,
            path: PathBuf::from(format!("/traps/a/{}.jpg", id)),
            capture_timestamp: NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(6, 0, id as u32)
                .unwrap(),
            detections: Vec::new(),
            detection_count: provisional,
            provisional_unique_count: provisional,
            unique_identity_count: provisional,
        }
    }

    #[test]
    fn test_finalize_publishes_scene_max() {
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();
        for (id, count) in [(1, 1), (2, 2), (3, 1)] {
            aggregator.push(key, photo(id, count)).unwrap();
        }
        aggregator.close(key).unwrap();

        let scene = aggregator.finalize(key).unwrap();
        assert_eq!(scene.unique_identity_count(), 2);
        assert_eq!(scene.state(), SceneState::Finalized);
        assert!(scene.photos().iter().all(|p| p.unique_identity_count == 2));
        // Provisional values are kept for inspection
        let provisional: Vec<u32> = scene.photos().iter().map(|p| p.provisional_unique_count).collect();
        assert_eq!(provisional, vec![1, 2, 1]);
        assert_eq!(scene.photo_ids(), vec![1, 2, 3]);
        assert_eq!(aggregator.buffered(), 0);
    }

    #[test]
    fn test_single_photo_scene() {
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();
        aggregator.push(key, photo(1, 0)).unwrap();
        aggregator.close(key).unwrap();
        assert_eq!(aggregator.finalize(key).unwrap().unique_identity_count(), 0);
    }

    #[test]
    fn test_transitions_are_one_way() {
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();

        assert!(matches!(
            aggregator.finalize(key),
            Err(SceneError::InvalidTransition { from: "open", to: "finalized", .. })
        ));

        aggregator.push(key, photo(1, 1)).unwrap();
        aggregator.close(key).unwrap();
        assert_eq!(aggregator.get(key).unwrap().state(), SceneState::Closed);

        assert!(matches!(
            aggregator.push(key, photo(2, 1)),
            Err(SceneError::InvalidTransition { from: "closed", to: "open", .. })
        ));
        assert!(aggregator.close(key).is_err());

        aggregator.finalize(key).unwrap();
        assert_eq!(aggregator.finalize(key).unwrap_err(), SceneError::Unknown(key));
    }

    #[test]
    fn test_empty_scene_cannot_close() {
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();
        assert_eq!(aggregator.close(key), Err(SceneError::Empty(key)));
    }

    #[test]
    fn test_discard_drops_open_scene() {
        let mut aggregator = SceneAggregator::new();
        let first = aggregator.open();
        let second = aggregator.open();
        assert_ne!(first, second);

        aggregator.push(second, photo(1, 1)).unwrap();
        let dropped = aggregator.discard_all();
        assert_eq!(dropped.len(), 2);
        assert_eq!(aggregator.buffered(), 0);
        assert!(aggregator.get(second).is_none());
    }
}
