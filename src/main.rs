use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trapcount::cli::{Cli, Command, ConfigAction};
use trapcount::config::Config;
use trapcount::db::scenes::describe_span;
use trapcount::db::{format_timestamp, Database};
use trapcount::detection::MegaDetectorResults;
use trapcount::export::{export_photos, export_scenes, ExportFormat};
use trapcount::logging;
use trapcount::pipeline::{process_folder, LabelSmoother, RunSummary};
use trapcount::scanner::register_folder;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::log_dir()), cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    if let Command::Config { action } = cli.command {
        return handle_config(action, &config_path);
    }

    let config = Config::load_or_create(&config_path)?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database '{}'", config.db_path.display()))?;
    db.initialize()?;

    match cli.command {
        Command::Ingest {
            folder,
            detections,
            reprocess,
        } => ingest(&db, &config, &folder, detections, reprocess),
        Command::Photos { folder } => list_photos(&db, &folder),
        Command::Folders => {
            for folder in db.list_folders()? {
                println!("{}", folder);
            }
            Ok(())
        }
        Command::Scenes { folder } => {
            let folder = folder.map(|f| folder_key(&f)).transpose()?;
            for scene in db.scene_summaries(folder.as_deref())? {
                println!(
                    "scene {:>5}  {}  {}  {} photos  {} animals  {}",
                    scene.scene_id,
                    scene.folder,
                    describe_span(&scene),
                    scene.photo_count,
                    scene.unique_identity_count,
                    scene.class_label.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Command::At { folder, timestamp } => show_at(&db, &folder, &timestamp),
        Command::Export {
            output,
            folder,
            format,
            photos,
        } => {
            let folder = folder.map(|f| folder_key(&f)).transpose()?;
            let format = format
                .or_else(|| ExportFormat::from_path(&output))
                .unwrap_or(ExportFormat::Csv);
            let count = if photos {
                export_photos(&db, folder.as_deref(), &output, format)?
            } else {
                export_scenes(&db, folder.as_deref(), &output, format)?
            };
            println!(
                "Exported {} {} to {} ({})",
                count,
                if photos { "photos" } else { "scenes" },
                output.display(),
                format.name()
            );
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

fn handle_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let config = Config::load_or_create(path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            if path.exists() {
                bail!("config file already exists at {}", path.display());
            }
            Config::default().save_to(path)?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}

/// Folder column value for a user-supplied path.
fn folder_key(folder: &Path) -> Result<String> {
    let canonical = folder
        .canonicalize()
        .with_context(|| format!("folder '{}' not found", folder.display()))?;
    Ok(canonical.to_string_lossy().to_string())
}

fn ingest(
    db: &Database,
    config: &Config,
    folder: &Path,
    detections: Option<PathBuf>,
    reprocess: bool,
) -> Result<()> {
    let folder = folder
        .canonicalize()
        .with_context(|| format!("folder '{}' not found", folder.display()))?;
    let key = folder.to_string_lossy().to_string();

    if reprocess {
        let reset = db.reset_folder(&key)?;
        tracing::info!(folder = %key, photos = reset, "Cleared previous results");
    }

    let registered = register_folder(db, &folder, config, None)?;
    println!(
        "Found {} images: {} new, {} already registered, {} without capture time, {} with GPS",
        registered.total_found,
        registered.registered,
        registered.skipped,
        registered.untimed,
        registered.located
    );

    let results_file = detections.unwrap_or_else(|| config.detector.results_file_for(&folder));
    let source = MegaDetectorResults::load(&results_file, config.detector.min_confidence)?;
    tracing::info!(file = %results_file.display(), images = source.len(), "Loaded detection results");
    if source.is_empty() {
        tracing::warn!(file = %results_file.display(), "Detection results list no images");
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to install Ctrl+C handler: {e}");
    }

    let mut smoother = LabelSmoother::new(config.pipeline.smoothing_window()?);
    let summary = process_folder(&source, db, &key, config, &mut smoother, &cancel, None)?;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Processed {} photos into {} scenes",
        summary.photos_processed,
        summary.scenes.len()
    );
    for scene in &summary.scenes {
        println!(
            "  scene {:>5}: {:>3} photos, {} animals",
            scene.scene_id,
            scene.photo_ids.len(),
            scene.unique_identity_count
        );
    }
    for failure in &summary.failures {
        println!("  skipped {}: {}", failure.path.display(), failure.reason);
    }
    for failed in &summary.failed_scenes {
        println!(
            "  scene with {} photos not saved: {}",
            failed.photo_ids.len(),
            failed.reason
        );
    }
    if summary.cancelled {
        println!(
            "Cancelled; {} photos of the unfinished scene were not saved",
            summary.discarded_photos
        );
    }
}

fn list_photos(db: &Database, folder: &Path) -> Result<()> {
    let key = folder_key(folder)?;
    for photo in db.query_photos_by_folder(&key)? {
        let taken = photo
            .capture_timestamp
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        let location = describe_location(photo.gps_latitude, photo.gps_longitude);
        if photo.processed {
            println!(
                "{}  {}  {}  scene {}  detections {}  animals {}",
                taken,
                location,
                photo.path,
                photo.scene_id.unwrap_or_default(),
                photo.detection_count.unwrap_or_default(),
                photo.unique_identity_count.unwrap_or_default()
            );
        } else {
            println!("{}  {}  {}  (unprocessed)", taken, location, photo.path);
        }
    }
    Ok(())
}

fn show_at(db: &Database, folder: &Path, timestamp: &str) -> Result<()> {
    let key = folder_key(folder)?;
    let at = parse_user_timestamp(timestamp)?;

    match db.query_latest_photo_at_or_before(&key, at)? {
        Some(photo) => {
            println!(
                "{}  {}  {}",
                format_timestamp(photo.capture_timestamp),
                describe_location(photo.gps_latitude, photo.gps_longitude),
                photo.path
            );
            match (photo.scene_id, photo.unique_identity_count) {
                (Some(scene), Some(count)) => println!("scene {}, {} animals", scene, count),
                _ => println!("not processed yet"),
            }
        }
        None => println!("No photos at or before {}", format_timestamp(at)),
    }
    Ok(())
}

fn describe_location(latitude: Option<f64>, longitude: Option<f64>) -> String {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => format!("{:.5},{:.5}", lat, lon),
        _ => "-".to_string(),
    }
}

fn parse_user_timestamp(text: &str) -> Result<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .with_context(|| format!("invalid timestamp '{}'", text))
}
