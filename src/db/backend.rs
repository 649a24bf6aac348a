//! Storage abstraction used by ingestion and the scene pipeline.
//!
//! The pipeline only ever talks to a [`PhotoStore`]; [`Database`] is the
//! SQLite implementation. Tests may swap in their own store.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;

use super::{Database, PhotoRecord, PhotoSummary};
use crate::pipeline::FinalizedScene;
use crate::scanner::GpsPosition;

pub trait PhotoStore {
    // === Registration ===

    /// Register an unprocessed photo and return its id.
    fn create_photo(&self, path: &Path, capture_timestamp: NaiveDateTime) -> Result<i64>;

    /// Register a photo whose capture time or position may be unknown.
    fn register_photo(
        &self,
        path: &Path,
        capture_timestamp: Option<NaiveDateTime>,
        location: Option<GpsPosition>,
    ) -> Result<i64>;

    fn photo_exists(&self, path: &Path) -> Result<bool>;

    // === Pipeline results ===

    /// Allocate a new scene id.
    fn create_scene(&self) -> Result<i64>;

    fn finalize_photo(
        &self,
        photo_id: i64,
        scene_id: i64,
        detection_count: u32,
        unique_identity_count: u32,
        detections_blob: &str,
        capture_timestamp: NaiveDateTime,
    ) -> Result<()>;

    fn set_scene_unique_count(&self, scene_id: i64, unique_identity_count: u32) -> Result<()>;

    /// Write a whole scene atomically and return its id.
    fn commit_scene(&self, scene: &FinalizedScene) -> Result<i64>;

    // === Queries ===

    fn query_photos_by_folder(&self, folder: &str) -> Result<Vec<PhotoRecord>>;

    fn query_unprocessed_photos(&self, folder: &str) -> Result<Vec<PhotoRecord>>;

    fn query_latest_photo_at_or_before(
        &self,
        folder: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Option<PhotoSummary>>;
}

impl PhotoStore for Database {
    fn create_photo(&self, path: &Path, capture_timestamp: NaiveDateTime) -> Result<i64> {
        Database::create_photo(self, path, capture_timestamp)
    }

    fn register_photo(
        &self,
        path: &Path,
        capture_timestamp: Option<NaiveDateTime>,
        location: Option<GpsPosition>,
    ) -> Result<i64> {
        Database::register_photo(self, path, capture_timestamp, location)
    }

    fn photo_exists(&self, path: &Path) -> Result<bool> {
        Database::photo_exists(self, path)
    }

    fn create_scene(&self) -> Result<i64> {
        Database::create_scene(self)
    }

    fn finalize_photo(
        &self,
        photo_id: i64,
        scene_id: i64,
        detection_count: u32,
        unique_identity_count: u32,
        detections_blob: &str,
        capture_timestamp: NaiveDateTime,
    ) -> Result<()> {
        Database::finalize_photo(
            self,
            photo_id,
            scene_id,
            detection_count,
            unique_identity_count,
            detections_blob,
            capture_timestamp,
        )
    }

    fn set_scene_unique_count(&self, scene_id: i64, unique_identity_count: u32) -> Result<()> {
        Database::set_scene_unique_count(self, scene_id, unique_identity_count)
    }

    fn commit_scene(&self, scene: &FinalizedScene) -> Result<i64> {
        Database::commit_scene(self, scene)
    }

    fn query_photos_by_folder(&self, folder: &str) -> Result<Vec<PhotoRecord>> {
        Database::query_photos_by_folder(self, folder)
    }

    fn query_unprocessed_photos(&self, folder: &str) -> Result<Vec<PhotoRecord>> {
        Database::query_unprocessed_photos(self, folder)
    }

    fn query_latest_photo_at_or_before(
        &self,
        folder: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Option<PhotoSummary>> {
        Database::query_latest_photo_at_or_before(self, folder, timestamp)
    }
}
