pub mod discovery;
pub mod metadata;

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::mpsc;

use crate::config::Config;
use crate::db::PhotoStore;
use crate::error::TimestampError;

pub use discovery::discover_images;
pub use metadata::{read_gps_position, resolve_capture_time, GpsPosition, TimestampSource};

#[derive(Debug, Clone)]
pub enum IngestProgress {
    Started { total_files: usize },
    Registering { current: usize, total: usize, path: String },
    Completed { registered: usize, skipped: usize, untimed: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterResult {
    pub total_found: usize,
    /// Newly registered photos.
    pub registered: usize,
    /// Already known to the store.
    pub skipped: usize,
    /// Capture time taken from file mtime instead of EXIF.
    pub mtime_fallbacks: usize,
    /// Registered without any capture time; these stay unprocessed.
    pub untimed: usize,
    /// Registered with an EXIF GPS position.
    pub located: usize,
}

/// Register every image directly inside `folder` that the store does not
/// know yet. New photos start unprocessed.
pub fn register_folder<P: PhotoStore>(
    store: &P,
    folder: &Path,
    config: &Config,
    progress_tx: Option<mpsc::Sender<IngestProgress>>,
) -> Result<RegisterResult> {
    let image_paths = discover_images(folder, &config.scanner.image_extensions)?;

    let total = image_paths.len();
    if let Some(ref tx) = progress_tx {
        let _ = tx.send(IngestProgress::Started { total_files: total });
    }

    let mut result = RegisterResult {
        total_found: total,
        ..RegisterResult::default()
    };

    for (index, path) in image_paths.iter().enumerate() {
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(IngestProgress::Registering {
                current: index + 1,
                total,
                path: path.to_string_lossy().to_string(),
            });
        }

        if store.photo_exists(path)? {
            result.skipped += 1;
            continue;
        }

        let resolved = resolve_capture_time(path);
        if let Err(ref e) = resolved {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(IngestProgress::Error {
                    message: format!("Error reading {}: {}", path.display(), e),
                });
            }
        }
        register_photo(store, path, resolved, read_gps_position(path), &mut result)?;
    }

    tracing::info!(
        folder = %folder.display(),
        found = total,
        registered = result.registered,
        skipped = result.skipped,
        mtime_fallbacks = result.mtime_fallbacks,
        "Folder registered"
    );

    if let Some(ref tx) = progress_tx {
        let _ = tx.send(IngestProgress::Completed {
            registered: result.registered,
            skipped: result.skipped,
            untimed: result.untimed,
        });
    }

    Ok(result)
}

fn register_photo<P: PhotoStore>(
    store: &P,
    path: &Path,
    resolved: Result<(NaiveDateTime, TimestampSource), TimestampError>,
    location: Option<GpsPosition>,
    result: &mut RegisterResult,
) -> Result<i64> {
    let capture_timestamp = match resolved {
        Ok((capture_timestamp, TimestampSource::FileModified)) => {
            result.mtime_fallbacks += 1;
            Some(capture_timestamp)
        }
        Ok((capture_timestamp, TimestampSource::Exif)) => Some(capture_timestamp),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "No capture time, photo left unprocessed");
            result.untimed += 1;
            None
        }
    };

    let id = store.register_photo(path, capture_timestamp, location)?;
    result.registered += 1;
    if location.is_some() {
        result.located += 1;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{folder_of, test_db};
    use tempfile::tempdir;

    #[test]
    fn test_register_folder_is_idempotent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("IMG_0001.JPG"), b"not really a jpeg").unwrap();
        std::fs::write(dir.path().join("IMG_0002.png"), b"nor a png").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"field notes").unwrap();

        let db = test_db();
        let config = Config::default();
        let (tx, rx) = mpsc::channel();

        let first = register_folder(&db, dir.path(), &config, Some(tx)).unwrap();
        assert_eq!(first.total_found, 2);
        assert_eq!(first.registered, 2);
        assert_eq!(first.mtime_fallbacks, 2);

        let events: Vec<IngestProgress> = rx.try_iter().collect();
        assert!(matches!(events.first(), Some(IngestProgress::Started { total_files: 2 })));
        assert!(matches!(
            events.last(),
            Some(IngestProgress::Completed { registered: 2, skipped: 0, untimed: 0 })
        ));

        let second = register_folder(&db, dir.path(), &config, None).unwrap();
        assert_eq!(second.registered, 0);
        assert_eq!(second.skipped, 2);

        let folder = folder_of(&dir.path().join("IMG_0001.JPG"));
        let photos = db.query_photos_by_folder(&folder).unwrap();
        assert_eq!(photos.len(), 2);
        assert!(photos.iter().all(|p| !p.processed && p.capture_timestamp.is_some()));
        assert!(photos.iter().all(|p| p.gps_latitude.is_none()));
    }

    #[test]
    fn test_unresolved_capture_time_registers_unprocessed_photo() {
        let db = test_db();
        let path = Path::new("/traps/a/IMG_0009.jpg");
        let mut result = RegisterResult::default();
        let unreadable = Err(TimestampError {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        let location = Some(GpsPosition {
            latitude: 1.5,
            longitude: -2.25,
        });

        let id = register_photo(&db, path, unreadable, location, &mut result).unwrap();

        assert_eq!(result.registered, 1);
        assert_eq!(result.untimed, 1);
        assert_eq!(result.located, 1);
        let photo = &db.query_unprocessed_photos("/traps/a").unwrap()[0];
        assert_eq!(photo.id, id);
        assert_eq!(photo.capture_timestamp, None);
        assert_eq!(photo.gps_longitude, Some(-2.25));
    }
}
