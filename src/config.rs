use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::PipelineSettings;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "TRAPCOUNT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Idle gap that starts a new scene. Gaps equal to this stay in the scene.
    #[serde(default = "default_gap_threshold_minutes")]
    pub gap_threshold_minutes: i64,

    /// Center distance (pixels) below which two boxes are the same animal.
    #[serde(default = "default_match_distance_px")]
    pub match_distance_px: f64,

    /// Window for inheriting the previous detection's class label.
    #[serde(default = "default_smoothing_window_secs")]
    pub smoothing_window_secs: i64,

    /// Clear label smoothing state at every scene boundary.
    /// Off by default: smoothing history spans the whole run.
    #[serde(default)]
    pub reset_smoothing_per_scene: bool,

    /// Attempts for the transactional write of a finished scene.
    #[serde(default = "default_flush_attempts")]
    pub flush_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gap_threshold_minutes: default_gap_threshold_minutes(),
            match_distance_px: default_match_distance_px(),
            smoothing_window_secs: default_smoothing_window_secs(),
            reset_smoothing_per_scene: false,
            flush_attempts: default_flush_attempts(),
        }
    }
}

impl PipelineConfig {
    pub fn settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            gap_threshold: self.gap_threshold()?,
            reset_smoothing_per_scene: self.reset_smoothing_per_scene,
            flush_attempts: self.flush_attempts,
        })
    }

    pub fn gap_threshold(&self) -> Result<Duration> {
        Duration::try_minutes(self.gap_threshold_minutes)
            .with_context(|| format!("pipeline.gap_threshold_minutes {} is out of range", self.gap_threshold_minutes))
    }

    pub fn smoothing_window(&self) -> Result<Duration> {
        Duration::try_seconds(self.smoothing_window_secs)
            .with_context(|| format!("pipeline.smoothing_window_secs {} is out of range", self.smoothing_window_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// MegaDetector batch output. When unset, `<folder>/detections.json` is used.
    #[serde(default)]
    pub results_file: Option<PathBuf>,

    /// Detections below this confidence are dropped before counting.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            results_file: None,
            min_confidence: default_min_confidence(),
        }
    }
}

impl DetectorConfig {
    pub fn results_file_for(&self, folder: &Path) -> PathBuf {
        self.results_file
            .clone()
            .unwrap_or_else(|| folder.join("detections.json"))
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trapcount")
        .join("trapcount.db")
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "bmp".to_string(),
    ]
}

fn default_gap_threshold_minutes() -> i64 {
    30
}

fn default_match_distance_px() -> f64 {
    50.0
}

fn default_smoothing_window_secs() -> i64 {
    30
}

fn default_flush_attempts() -> u32 {
    2
}

fn default_min_confidence() -> f32 {
    0.2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scanner: ScannerConfig::default(),
            pipeline: PipelineConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl Config {
    /// Load `config_path`, creating it with defaults if missing.
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load_from(config_path)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.gap_threshold_minutes <= 0 {
            bail!("pipeline.gap_threshold_minutes must be positive");
        }
        if p.match_distance_px.is_nan() || p.match_distance_px <= 0.0 {
            bail!("pipeline.match_distance_px must be positive");
        }
        if p.smoothing_window_secs < 0 {
            bail!("pipeline.smoothing_window_secs must not be negative");
        }
        p.gap_threshold()?;
        p.smoothing_window()?;
        if p.flush_attempts == 0 {
            bail!("pipeline.flush_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            bail!("detector.min_confidence must be within 0.0..=1.0");
        }
        Ok(())
    }

    /// Config file path, honouring `TRAPCOUNT_CONFIG`.
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"))
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trapcount")
    }

    pub fn log_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trapcount")
            .join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\ngap_threshold_minutes = 45\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.gap_threshold_minutes, 45);
        assert_eq!(config.pipeline.match_distance_px, 50.0);
        assert_eq!(config.pipeline.smoothing_window_secs, 30);
        assert!(!config.pipeline.reset_smoothing_per_scene);
        assert_eq!(config.scanner.image_extensions.len(), 4);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.detector.min_confidence = 0.5;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.detector.min_confidence, 0.5);
    }

    #[test]
    fn test_validation_rejects_zero_gap() {
        let mut config = Config::default();
        config.pipeline.gap_threshold_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.flush_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\ngap_threshold_minutes = 9223372036854775807\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("gap_threshold_minutes"));

        let mut config = Config::default();
        config.pipeline.smoothing_window_secs = i64::MAX;
        assert!(config.validate().is_err());
        assert!(config.pipeline.smoothing_window().is_err());

        let config = Config::default();
        assert_eq!(config.pipeline.settings().unwrap().gap_threshold, Duration::minutes(30));
        assert_eq!(config.pipeline.smoothing_window().unwrap(), Duration::seconds(30));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trapcount").join("config.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pipeline.flush_attempts, 2);
        assert!(Config::load_from(&path).is_ok());
    }

    #[test]
    fn test_default_results_file() {
        let config = DetectorConfig::default();
        assert_eq!(
            config.results_file_for(Path::new("/traps/site-a")),
            PathBuf::from("/traps/site-a/detections.json")
        );
    }
}
