use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Identity of the player running this process. Their match store is
    /// correlated first.
    #[serde(default = "default_owner_id")]
    pub owner_id: String,

    /// Directories scanned for captures.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub correlation: CorrelationConfig,

    #[serde(default)]
    pub owners: OwnersConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// Worker threads used for hashing and probing.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Symmetric margin added to both ends of a match window.
    #[serde(default = "default_tolerance_minutes")]
    pub tolerance_minutes: i64,

    /// Assumed match length when a store has no duration for a match.
    #[serde(default = "default_match_minutes")]
    pub default_match_minutes: i64,
}

/// Upper bound for both correlation settings: one day.
pub const MAX_CORRELATION_MINUTES: i64 = 24 * 60;

fn default_tolerance_minutes() -> i64 {
    5
}

fn default_match_minutes() -> i64 {
    15
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_CORRELATION_MINUTES).contains(&self.tolerance_minutes) {
            bail!(
                "correlation.tolerance_minutes must be between 0 and {}, got {}",
                MAX_CORRELATION_MINUTES,
                self.tolerance_minutes
            );
        }
        if !(1..=MAX_CORRELATION_MINUTES).contains(&self.default_match_minutes) {
            bail!(
                "correlation.default_match_minutes must be between 1 and {}, got {}",
                MAX_CORRELATION_MINUTES,
                self.default_match_minutes
            );
        }
        Ok(())
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            tolerance_minutes: default_tolerance_minutes(),
            default_match_minutes: default_match_minutes(),
        }
    }
}

/// One owner's match-history database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerStoreConfig {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OwnersConfig {
    #[serde(default)]
    pub stores: Vec<OwnerStoreConfig>,

    /// Directory holding one subdirectory per owner. Only consulted by the
    /// command line front-ends.
    #[serde(default)]
    pub discover_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Output width of video previews in pixels.
    #[serde(default = "default_thumb_width")]
    pub width: u32,

    #[serde(default = "default_thumb_fps")]
    pub fps: u32,

    /// Length of the looping video preview.
    #[serde(default = "default_clip_seconds")]
    pub clip_seconds: f64,

    /// Longest side of resized images.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_thumb_width() -> u32 {
    320
}

fn default_thumb_fps() -> u32 {
    10
}

fn default_clip_seconds() -> f64 {
    3.0
}

fn default_max_image_dimension() -> u32 {
    480
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: default_thumb_width(),
            fps: default_thumb_fps(),
            clip_seconds: default_clip_seconds(),
            max_image_dimension: default_max_image_dimension(),
            workers: default_workers(),
        }
    }
}

/// External binaries. Both are optional at runtime: a missing probe only
/// degrades capture times, a missing transcoder only fails video previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Hour of day (0-23) from which passes may run.
    #[serde(default)]
    pub hours_start: Option<u8>,

    /// Hour of day (0-23) after which passes stop.
    #[serde(default)]
    pub hours_end: Option<u8>,
}

fn default_poll_interval_secs() -> u64 {
    300
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            hours_start: None,
            hours_end: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    Config::data_dir().join("media.db")
}

fn default_owner_id() -> String {
    "local".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mkv", "mov", "webm", "avi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            owner_id: default_owner_id(),
            roots: Vec::new(),
            scanner: ScannerConfig::default(),
            correlation: CorrelationConfig::default(),
            owners: OwnersConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            tools: ToolsConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when no file
    /// exists. `HALOREEL_CONFIG` overrides the location.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .correlation
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("HALOREEL_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("haloreel")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("haloreel")
    }

    pub fn tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.correlation
                .tolerance_minutes
                .clamp(0, MAX_CORRELATION_MINUTES),
        )
    }

    pub fn default_match_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.correlation
                .default_match_minutes
                .clamp(1, MAX_CORRELATION_MINUTES),
        )
    }
}
