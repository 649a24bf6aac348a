//! Scene rows and the transactional write of a finished scene.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::params;
use serde::Serialize;

use super::{format_timestamp, parse_timestamp, Database};
use crate::detection::{encode_detections, first_class_label};
use crate::pipeline::FinalizedScene;

/// One scene as seen by downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneSummary {
    pub scene_id: i64,
    pub folder: String,
    pub unique_identity_count: u32,
    pub photo_count: u32,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Class of the first detection in the scene's first photo with detections.
    pub class_label: Option<String>,
}

impl Database {
    pub fn create_scene(&self) -> Result<i64> {
        self.conn
            .execute("INSERT INTO scenes (unique_identity_count) VALUES (0)", [])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store the scene's final count, creating the row if it does not exist.
    pub fn set_scene_unique_count(&self, scene_id: i64, unique_identity_count: u32) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO scenes (id, unique_identity_count) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET unique_identity_count = excluded.unique_identity_count
            "#,
            params![scene_id, unique_identity_count],
        )?;
        Ok(())
    }

    /// Write a finalized scene in one transaction and return its new id.
    /// On error nothing is written.
    pub fn commit_scene(&self, scene: &FinalizedScene) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let scene_id = self.create_scene()?;
        for photo in scene.photos() {
            self.finalize_photo(
                photo.photo_id,
                scene_id,
                photo.detection_count,
                photo.unique_identity_count,
                &encode_detections(&photo.detections),
                photo.capture_timestamp,
            )
            .with_context(|| format!("failed to finalize photo {}", photo.photo_id))?;
        }
        self.set_scene_unique_count(scene_id, scene.unique_identity_count())?;

        tx.commit()?;
        Ok(scene_id)
    }

    /// Clear pipeline results for a folder so it can be processed again.
    /// Scenes left without photos are deleted. Returns the number of photos reset.
    pub fn reset_folder(&self, folder: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let reset = self.conn.execute(
            r#"
            UPDATE photos
            SET processed = 0, scene_id = NULL, detection_count = NULL,
                unique_identity_count = NULL, detections_blob = NULL
            WHERE folder = ?
            "#,
            [folder],
        )?;
        self.conn.execute(
            "DELETE FROM scenes WHERE id NOT IN (SELECT scene_id FROM photos WHERE scene_id IS NOT NULL)",
            [],
        )?;

        tx.commit()?;
        Ok(reset)
    }

    /// Scenes in capture order, optionally limited to one folder.
    pub fn scene_summaries(&self, folder: Option<&str>) -> Result<Vec<SceneSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.id, MIN(p.folder), s.unique_identity_count, COUNT(p.id),
                   MIN(p.capture_timestamp), MAX(p.capture_timestamp),
                   (SELECT f.detections_blob FROM photos f
                    WHERE f.scene_id = s.id AND f.detections_blob IS NOT NULL AND f.detections_blob != ''
                    ORDER BY f.capture_timestamp ASC, f.id ASC
                    LIMIT 1)
            FROM scenes s
            JOIN photos p ON p.scene_id = s.id
            WHERE ?1 IS NULL OR p.folder = ?1
            GROUP BY s.id
            ORDER BY MIN(p.capture_timestamp) ASC, s.id ASC
            "#,
        )?;

        let rows = stmt
            .query_map([folder], |row| {
                let start: Option<String> = row.get(4)?;
                let end: Option<String> = row.get(5)?;
                let blob: Option<String> = row.get(6)?;
                Ok(SceneSummary {
                    scene_id: row.get(0)?,
                    folder: row.get(1)?,
                    unique_identity_count: row.get(2)?,
                    photo_count: row.get(3)?,
                    start: start.as_deref().and_then(parse_timestamp),
                    end: end.as_deref().and_then(parse_timestamp),
                    class_label: blob
                        .as_deref()
                        .and_then(first_class_label)
                        .map(str::to_string),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    #[cfg(test)]
    pub fn scene_unique_count(&self, scene_id: i64) -> Result<Option<u32>> {
        use rusqlite::OptionalExtension;

        let count = self
            .conn
            .query_row(
                "SELECT unique_identity_count FROM scenes WHERE id = ?",
                [scene_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }
}

/// Human-readable time span of a scene.
pub fn describe_span(summary: &SceneSummary) -> String {
    match (summary.start, summary.end) {
        (Some(start), Some(end)) if start == end => format_timestamp(start),
        (Some(start), Some(end)) => format!("{} .. {}", format_timestamp(start), format_timestamp(end)),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::detection::{BoundingBox, Detection};
    use crate::pipeline::{PendingPhoto, ProcessedPhoto, SceneAggregator};
    use std::path::Path;

    fn ts(text: &str) -> NaiveDateTime {
        parse_timestamp(text).unwrap()
    }

    fn detection(x: i32, id: u32, label: &str) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, 0, x + 10, 10),
            raw_class_label: label.to_string(),
            smoothed_class_label: label.to_string(),
            identity_id: id,
        }
    }

    fn finalized(db: &Database, photos: &[(&str, &str, Vec<Detection>)]) -> FinalizedScene {
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();
        for (path, at, detections) in photos {
            let id = db.create_photo(Path::new(path), ts(at)).unwrap();
            let pending = PendingPhoto {
                id,
                path: path.into(),
                capture_timestamp: ts(at),
            };
            aggregator
                .push(key, ProcessedPhoto::new(&pending, detections.clone()))
                .unwrap();
        }
        aggregator.close(key).unwrap();
        aggregator.finalize(key).unwrap()
    }

    #[test]
    fn test_set_scene_unique_count_upserts() {
        let db = test_db();
        let id = db.create_scene().unwrap();
        db.set_scene_unique_count(id, 3).unwrap();
        assert_eq!(db.scene_unique_count(id).unwrap(), Some(3));

        db.set_scene_unique_count(99, 1).unwrap();
        assert_eq!(db.scene_unique_count(99).unwrap(), Some(1));
        assert_eq!(db.scene_unique_count(100).unwrap(), None);
    }

    #[test]
    fn test_commit_scene_writes_scene_max_on_every_photo() {
        let db = test_db();
        let scene = finalized(
            &db,
            &[
                ("/traps/a/1.jpg", "2024-05-01 10:00:00", vec![detection(0, 1, "deer")]),
                (
                    "/traps/a/2.jpg",
                    "2024-05-01 10:01:00",
                    vec![detection(0, 1, "deer"), detection(200, 2, "deer")],
                ),
                ("/traps/a/3.jpg", "2024-05-01 10:02:00", vec![detection(0, 1, "deer")]),
            ],
        );

        let scene_id = db.commit_scene(&scene).unwrap();
        assert_eq!(db.scene_unique_count(scene_id).unwrap(), Some(2));

        let photos = db.query_photos_by_folder("/traps/a").unwrap();
        assert!(photos.iter().all(|p| p.processed && p.scene_id == Some(scene_id)));
        assert!(photos.iter().all(|p| p.unique_identity_count == Some(2)));
        assert_eq!(
            photos.iter().map(|p| p.detection_count).collect::<Vec<_>>(),
            vec![Some(1), Some(2), Some(1)]
        );
        assert_eq!(
            photos[1].detections_blob.as_deref(),
            Some("0,0,10,10,1,deer;200,0,210,10,2,deer")
        );
    }

    #[test]
    fn test_commit_scene_rolls_back_on_missing_photo() {
        let db = test_db();
        let mut aggregator = SceneAggregator::new();
        let key = aggregator.open();

        let real = db
            .create_photo(Path::new("/traps/a/1.jpg"), ts("2024-05-01 10:00:00"))
            .unwrap();
        for id in [real, 404] {
            let pending = PendingPhoto {
                id,
                path: format!("/traps/a/{}.jpg", id).into(),
                capture_timestamp: ts("2024-05-01 10:00:00"),
            };
            aggregator.push(key, ProcessedPhoto::new(&pending, Vec::new())).unwrap();
        }
        aggregator.close(key).unwrap();
        let scene = aggregator.finalize(key).unwrap();

        assert!(db.commit_scene(&scene).is_err());

        let photo = &db.query_photos_by_folder("/traps/a").unwrap()[0];
        assert!(!photo.processed);
        assert_eq!(photo.scene_id, None);
        let scenes: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM scenes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(scenes, 0);
    }

    #[test]
    fn test_scene_summaries_per_folder() {
        let db = test_db();
        let first = finalized(
            &db,
            &[
                ("/traps/a/1.jpg", "2024-05-01 10:00:00", Vec::new()),
                ("/traps/a/2.jpg", "2024-05-01 10:05:00", vec![detection(0, 1, "fox")]),
                ("/traps/a/3.jpg", "2024-05-01 10:06:00", vec![detection(0, 1, "badger")]),
            ],
        );
        let second = finalized(
            &db,
            &[("/traps/b/1.jpg", "2024-05-01 09:00:00", Vec::new())],
        );
        let first_id = db.commit_scene(&first).unwrap();
        let second_id = db.commit_scene(&second).unwrap();

        let all = db.scene_summaries(None).unwrap();
        assert_eq!(all.iter().map(|s| s.scene_id).collect::<Vec<_>>(), vec![second_id, first_id]);

        let a = db.scene_summaries(Some("/traps/a")).unwrap();
        assert_eq!(a.len(), 1);
        let summary = &a[0];
        assert_eq!(summary.folder, "/traps/a");
        assert_eq!(summary.photo_count, 3);
        assert_eq!(summary.unique_identity_count, 1);
        assert_eq!(summary.start, Some(ts("2024-05-01 10:00:00")));
        assert_eq!(summary.end, Some(ts("2024-05-01 10:06:00")));
        assert_eq!(summary.class_label.as_deref(), Some("fox"));
        assert_eq!(describe_span(summary), "2024-05-01 10:00:00 .. 2024-05-01 10:06:00");

        let b = &db.scene_summaries(Some("/traps/b")).unwrap()[0];
        assert_eq!(b.class_label, None);
        assert_eq!(describe_span(b), "2024-05-01 09:00:00");
    }

    #[test]
    fn test_reset_folder_clears_results() {
        let db = test_db();
        let a = finalized(&db, &[("/traps/a/1.jpg", "2024-05-01 10:00:00", vec![detection(0, 1, "fox")])]);
        let b = finalized(&db, &[("/traps/b/1.jpg", "2024-05-01 10:00:00", Vec::new())]);
        db.commit_scene(&a).unwrap();
        let b_id = db.commit_scene(&b).unwrap();

        assert_eq!(db.reset_folder("/traps/a").unwrap(), 1);

        let photo = &db.query_photos_by_folder("/traps/a").unwrap()[0];
        assert!(!photo.processed);
        assert_eq!(photo.detections_blob, None);
        assert_eq!(db.query_unprocessed_photos("/traps/a").unwrap().len(), 1);

        let remaining = db.scene_summaries(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scene_id, b_id);
    }
}
