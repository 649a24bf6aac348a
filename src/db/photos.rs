//! Photo rows: registration, pipeline results and folder queries.

use anyhow::{bail, Result};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{format_timestamp, parse_timestamp, Database};
use crate::detection::{parse_detections, BlobEntry};
use crate::error::BlobError;
use crate::pipeline::PendingPhoto;
use crate::scanner::GpsPosition;

const PHOTO_COLUMNS: &str = "id, path, folder, capture_timestamp, upload_timestamp, processed, \
                             scene_id, detection_count, unique_identity_count, detections_blob, \
                             gps_latitude, gps_longitude";

/// A stored photo with whatever the pipeline has written so far.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoRecord {
    pub id: i64,
    pub path: String,
    pub folder: String,
    pub capture_timestamp: Option<NaiveDateTime>,
    pub upload_timestamp: String,
    pub processed: bool,
    pub scene_id: Option<i64>,
    pub detection_count: Option<u32>,
    pub unique_identity_count: Option<u32>,
    pub detections_blob: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

impl PhotoRecord {
    pub fn detections(&self) -> Result<Vec<BlobEntry>, BlobError> {
        parse_detections(self.detections_blob.as_deref().unwrap_or(""))
    }

    /// Pipeline input for this photo, if it has a capture time.
    pub fn pending(&self) -> Option<PendingPhoto> {
        Some(PendingPhoto {
            id: self.id,
            path: PathBuf::from(&self.path),
            capture_timestamp: self.capture_timestamp?,
        })
    }
}

/// Short view of a photo for timeline lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSummary {
    pub id: i64,
    pub path: String,
    pub capture_timestamp: NaiveDateTime,
    pub processed: bool,
    pub scene_id: Option<i64>,
    pub detection_count: Option<u32>,
    pub unique_identity_count: Option<u32>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

/// Folder a photo belongs to: its parent directory.
pub fn folder_of(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl Database {
    /// Register a photo as unprocessed. The folder is the path's parent.
    pub fn create_photo(&self, path: &Path, capture_timestamp: NaiveDateTime) -> Result<i64> {
        self.register_photo(path, Some(capture_timestamp), None)
    }

    /// Register a photo with whatever ingestion could resolve. A photo without
    /// a capture time is kept so it shows up as unprocessed.
    pub fn register_photo(
        &self,
        path: &Path,
        capture_timestamp: Option<NaiveDateTime>,
        location: Option<GpsPosition>,
    ) -> Result<i64> {
        let upload_timestamp = format_timestamp(Local::now().naive_local());
        self.conn.execute(
            r#"
            INSERT INTO photos (path, folder, capture_timestamp, upload_timestamp, gps_latitude, gps_longitude)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                path.to_string_lossy(),
                folder_of(path),
                capture_timestamp.map(format_timestamp),
                upload_timestamp,
                location.map(|l| l.latitude),
                location.map(|l| l.longitude)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn photo_exists(&self, path: &Path) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE path = ?",
            [path.to_string_lossy()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Record pipeline results for one photo and mark it processed.
    pub fn finalize_photo(
        &self,
        photo_id: i64,
        scene_id: i64,
        detection_count: u32,
        unique_identity_count: u32,
        detections_blob: &str,
        capture_timestamp: NaiveDateTime,
    ) -> Result<()> {
        let updated = self.conn.execute(
            r#"
            UPDATE photos
            SET processed = 1, scene_id = ?, detection_count = ?, unique_identity_count = ?,
                detections_blob = ?, capture_timestamp = ?
            WHERE id = ?
            "#,
            params![
                scene_id,
                detection_count,
                unique_identity_count,
                detections_blob,
                format_timestamp(capture_timestamp),
                photo_id
            ],
        )?;
        if updated == 0 {
            bail!("photo {} does not exist", photo_id);
        }
        Ok(())
    }

    /// All photos of a folder, oldest capture first.
    pub fn query_photos_by_folder(&self, folder: &str) -> Result<Vec<PhotoRecord>> {
        self.query_photos("WHERE folder = ?", folder)
    }

    /// Photos of a folder still waiting for the pipeline, oldest capture first.
    pub fn query_unprocessed_photos(&self, folder: &str) -> Result<Vec<PhotoRecord>> {
        self.query_photos("WHERE folder = ? AND processed = 0", folder)
    }

    pub fn query_latest_photo_at_or_before(
        &self,
        folder: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Option<PhotoSummary>> {
        let summary = self
            .conn
            .query_row(
                r#"
                SELECT id, path, capture_timestamp, processed, scene_id,
                       detection_count, unique_identity_count, gps_latitude, gps_longitude
                FROM photos
                WHERE folder = ? AND capture_timestamp <= ?
                ORDER BY capture_timestamp DESC, id DESC
                LIMIT 1
                "#,
                params![folder, format_timestamp(timestamp)],
                |row| {
                    Ok(PhotoSummary {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        capture_timestamp: timestamp_column(row, 2)?,
                        processed: row.get(3)?,
                        scene_id: row.get(4)?,
                        detection_count: row.get(5)?,
                        unique_identity_count: row.get(6)?,
                        gps_latitude: row.get(7)?,
                        gps_longitude: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    pub fn list_folders(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT folder FROM photos ORDER BY folder")?;
        let folders = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(folders)
    }

    fn query_photos(&self, filter: &str, folder: &str) -> Result<Vec<PhotoRecord>> {
        let sql = format!(
            "SELECT {} FROM photos {} ORDER BY capture_timestamp ASC, id ASC",
            PHOTO_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let photos = stmt
            .query_map([folder], row_to_photo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{}'", text).into(),
        )
    })
}

fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<PhotoRecord> {
    let capture: Option<String> = row.get(3)?;
    Ok(PhotoRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        folder: row.get(2)?,
        capture_timestamp: capture.as_deref().and_then(parse_timestamp),
        upload_timestamp: row.get(4)?,
        processed: row.get(5)?,
        scene_id: row.get(6)?,
        detection_count: row.get(7)?,
        unique_identity_count: row.get(8)?,
        detections_blob: row.get(9)?,
        gps_latitude: row.get(10)?,
        gps_longitude: row.get(11)?,
    })
}
