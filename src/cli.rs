//! Command line definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_ENV;
use crate::export::ExportFormat;

/// Count animals in camera-trap photo bursts.
#[derive(Debug, Parser)]
#[command(name = "trapcount")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file.
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Also print log events to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a folder's photos and run them through the scene pipeline.
    Ingest {
        /// Folder holding one deployment's photos.
        folder: PathBuf,
        /// MegaDetector batch output (default: <FOLDER>/detections.json).
        #[arg(short, long)]
        detections: Option<PathBuf>,
        /// Discard existing results for the folder and process it again.
        #[arg(long)]
        reprocess: bool,
    },
    /// List a folder's photos with their counts.
    Photos {
        folder: PathBuf,
    },
    /// List folders known to the database.
    Folders,
    /// List written scenes with their animal counts.
    Scenes {
        /// Only list scenes of this folder.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Show the latest photo taken at or before a time.
    At {
        folder: PathBuf,
        /// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`.
        timestamp: String,
    },
    /// Export scenes (or photos) to CSV or JSON.
    Export {
        output: PathBuf,
        /// Only export this folder.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Defaults to the output file's extension, else CSV.
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
        /// Export one row per photo instead of per scene.
        #[arg(long)]
        photos: bool,
    },
    /// Manage configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
    /// Create default configuration file.
    Init,
}
