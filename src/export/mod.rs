use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::{format_timestamp, Database, PhotoRecord, SceneSummary};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Format named by the output file's extension, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        [ExportFormat::Json, ExportFormat::Csv]
            .into_iter()
            .find(|format| format.extension() == ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }
}

/// One row per scene for downstream analysis.
#[derive(Debug, Serialize)]
pub struct ExportedScene {
    pub scene_id: i64,
    pub folder: String,
    /// First detected class in the scene; a single label per scene.
    pub class_label: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub unique_identity_count: u32,
    pub photo_count: u32,
}

impl From<SceneSummary> for ExportedScene {
    fn from(summary: SceneSummary) -> Self {
        Self {
            scene_id: summary.scene_id,
            folder: summary.folder,
            class_label: summary.class_label,
            start: summary.start.map(format_timestamp),
            end: summary.end.map(format_timestamp),
            unique_identity_count: summary.unique_identity_count,
            photo_count: summary.photo_count,
        }
    }
}

/// Photo data for export
#[derive(Debug, Serialize)]
pub struct ExportedPhoto {
    pub path: String,
    pub filename: String,
    pub folder: String,
    pub capture_timestamp: Option<String>,
    pub upload_timestamp: String,
    pub processed: bool,
    pub scene_id: Option<i64>,
    pub detection_count: Option<u32>,
    pub unique_identity_count: Option<u32>,
    pub detections_blob: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

impl From<PhotoRecord> for ExportedPhoto {
    fn from(photo: PhotoRecord) -> Self {
        let filename = Path::new(&photo.path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            filename,
            path: photo.path,
            folder: photo.folder,
            capture_timestamp: photo.capture_timestamp.map(format_timestamp),
            upload_timestamp: photo.upload_timestamp,
            processed: photo.processed,
            scene_id: photo.scene_id,
            detection_count: photo.detection_count,
            unique_identity_count: photo.unique_identity_count,
            detections_blob: photo.detections_blob,
            gps_latitude: photo.gps_latitude,
            gps_longitude: photo.gps_longitude,
        }
    }
}

/// Export scenes, optionally for one folder, to a file.
pub fn export_scenes(
    db: &Database,
    folder: Option<&str>,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let scenes: Vec<ExportedScene> = db
        .scene_summaries(folder)?
        .into_iter()
        .map(ExportedScene::from)
        .collect();
    let count = scenes.len();

    match format {
        ExportFormat::Json => export_json(&scenes, output_path)?,
        ExportFormat::Csv => export_scenes_csv(&scenes, output_path)?,
    }

    Ok(count)
}

/// Export photos, optionally for one folder, to a file.
pub fn export_photos(
    db: &Database,
    folder: Option<&str>,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let photos = get_photos_for_export(db, folder)?;
    let count = photos.len();

    match format {
        ExportFormat::Json => export_json(&photos, output_path)?,
        ExportFormat::Csv => export_photos_csv(&photos, output_path)?,
    }

    Ok(count)
}

fn get_photos_for_export(db: &Database, folder: Option<&str>) -> Result<Vec<ExportedPhoto>> {
    let folders = match folder {
        Some(folder) => vec![folder.to_string()],
        None => db.list_folders()?,
    };

    let mut photos = Vec::new();
    for folder in &folders {
        photos.extend(
            db.query_photos_by_folder(folder)?
                .into_iter()
                .map(ExportedPhoto::from),
        );
    }
    Ok(photos)
}

fn export_json<T: Serialize>(rows: &[T], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_scenes_csv(scenes: &[ExportedScene], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "scene_id",
        "folder",
        "class",
        "start",
        "end",
        "unique_identity_count",
        "photo_count",
    ])?;

    for scene in scenes {
        let scene_id = scene.scene_id.to_string();
        let unique = scene.unique_identity_count.to_string();
        let photo_count = scene.photo_count.to_string();
        wtr.write_record([
            scene_id.as_str(),
            scene.folder.as_str(),
            scene.class_label.as_deref().unwrap_or(""),
            scene.start.as_deref().unwrap_or(""),
            scene.end.as_deref().unwrap_or(""),
            unique.as_str(),
            photo_count.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn export_photos_csv(photos: &[ExportedPhoto], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "path",
        "filename",
        "folder",
        "capture_timestamp",
        "upload_timestamp",
        "processed",
        "scene_id",
        "detection_count",
        "unique_identity_count",
        "detections_blob",
        "gps_latitude",
        "gps_longitude",
    ])?;

    for photo in photos {
        let scene_id = cell(photo.scene_id);
        let detection_count = cell(photo.detection_count);
        let unique = cell(photo.unique_identity_count);
        let latitude = cell(photo.gps_latitude);
        let longitude = cell(photo.gps_longitude);
        wtr.write_record([
            photo.path.as_str(),
            photo.filename.as_str(),
            photo.folder.as_str(),
            photo.capture_timestamp.as_deref().unwrap_or(""),
            photo.upload_timestamp.as_str(),
            if photo.processed { "1" } else { "0" },
            scene_id.as_str(),
            detection_count.as_str(),
            unique.as_str(),
            photo.detections_blob.as_deref().unwrap_or(""),
            latitude.as_str(),
            longitude.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// CSV cell for an optional value; empty when absent.
fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
