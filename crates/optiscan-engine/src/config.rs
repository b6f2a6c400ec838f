//! # Scanner Configuration
//!
//! Configuration management for the scan engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OPTISCAN_FACING=user                                               │
//! │     OPTISCAN_MAX_DURATION_MS=30000                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/scanner/scanner.toml (Linux)                             │
//! │     ~/Library/Application Support/com.optiscan.scanner/scanner.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     rear camera, 1280x720, 60% ROI, unbounded poll loop               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # scanner.toml
//! [camera]
//! facing = "environment"   # environment | user
//! min_width = 1280
//! min_height = 720
//!
//! [live]
//! region_width_pct = 60
//! region_height_pct = 60
//! symbologies = ["code128", "code39", "ean13", "ean8", "upc_a", "upc_e"]
//! workers = 2
//!
//! [poll]
//! tick_interval_ms = 16
//! max_ticks = 0            # 0 = unbounded
//! max_duration_ms = 0      # 0 = unbounded
//!
//! [upload]
//! max_bytes = 16777216
//! ```

use std::path::PathBuf;
use std::time::Duration;

use optiscan_core::{
    CameraConstraints, Facing, RegionOfInterest, Symbology, DEFAULT_MIN_HEIGHT,
    DEFAULT_MIN_WIDTH, DEFAULT_REGION_PCT,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::linear::LiveDecodeConfig;
use crate::poll_loop::PollConfig;

// =============================================================================
// Camera Settings
// =============================================================================

/// Which camera to open and the minimum stream resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Facing used when the host does not pass one explicitly.
    #[serde(default)]
    pub facing: Facing,

    /// Minimum stream width in pixels.
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Minimum stream height in pixels.
    #[serde(default = "default_min_height")]
    pub min_height: u32,
}

fn default_min_width() -> u32 {
    DEFAULT_MIN_WIDTH
}

fn default_min_height() -> u32 {
    DEFAULT_MIN_HEIGHT
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            facing: Facing::default(),
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

// =============================================================================
// Live Decode Settings
// =============================================================================

/// Live linear decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    /// Width of the centered region of interest, percent of the frame.
    #[serde(default = "default_region_pct")]
    pub region_width_pct: u8,

    /// Height of the centered region of interest, percent of the frame.
    #[serde(default = "default_region_pct")]
    pub region_height_pct: u8,

    /// Symbologies the live decoder looks for.
    #[serde(default = "default_live_symbologies")]
    pub symbologies: Vec<Symbology>,

    /// Worker hint passed to the linear backend.
    /// Affects throughput only, never which codes are accepted.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_region_pct() -> u8 {
    DEFAULT_REGION_PCT
}

fn default_live_symbologies() -> Vec<Symbology> {
    Symbology::LIVE.to_vec()
}

fn default_workers() -> usize {
    2
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            region_width_pct: default_region_pct(),
            region_height_pct: default_region_pct(),
            symbologies: default_live_symbologies(),
            workers: default_workers(),
        }
    }
}

// =============================================================================
// Poll Loop Settings
// =============================================================================

/// QR poll loop pacing and cutoff.
///
/// ## Cutoff Semantics
/// ```text
/// max_ticks = 0, max_duration_ms = 0   → polls until resolved or cancelled
/// max_ticks = 1800                     → gives up after 1800 ticks
/// max_duration_ms = 30000              → gives up after 30 s
/// both set                             → whichever is hit first
/// ```
/// Giving up tears the whole session down and surfaces `SCAN_TIMEOUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay between ticks (milliseconds). One display frame at 60 Hz.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Tick limit. 0 means unbounded.
    #[serde(default)]
    pub max_ticks: u64,

    /// Wall-clock limit (milliseconds). 0 means unbounded.
    #[serde(default)]
    pub max_duration_ms: u64,
}

fn default_tick_interval() -> u64 {
    16
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            tick_interval_ms: default_tick_interval(),
            max_ticks: 0,
            max_duration_ms: 0,
        }
    }
}

// =============================================================================
// Upload Settings
// =============================================================================

/// Uploaded image limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadSettings {
            max_bytes: default_max_bytes(),
        }
    }
}

// =============================================================================
// Main Scanner Configuration
// =============================================================================

/// Complete scanner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Camera settings.
    #[serde(default)]
    pub camera: CameraSettings,

    /// Live linear decoder settings.
    #[serde(default)]
    pub live: LiveSettings,

    /// QR poll loop settings.
    #[serde(default)]
    pub poll: PollSettings,

    /// Uploaded image settings.
    #[serde(default)]
    pub upload: UploadSettings,
}

impl ScannerConfig {
    /// Creates a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (scanner.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading scanner config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load scanner config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Scanner config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.camera.min_width == 0 || self.camera.min_height == 0 {
            return Err(EngineError::InvalidConfig(
                "camera min_width and min_height must be greater than 0".into(),
            ));
        }

        for (name, pct) in [
            ("region_width_pct", self.live.region_width_pct),
            ("region_height_pct", self.live.region_height_pct),
        ] {
            if !(1..=100).contains(&pct) {
                return Err(EngineError::InvalidConfig(format!(
                    "{} must be between 1 and 100, got: {}",
                    name, pct
                )));
            }
        }

        if self.live.symbologies.is_empty() {
            return Err(EngineError::InvalidConfig(
                "live symbologies must not be empty".into(),
            ));
        }

        if self.live.workers == 0 {
            return Err(EngineError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }

        if self.poll.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }

        if self.upload.max_bytes == 0 {
            return Err(EngineError::InvalidConfig(
                "upload max_bytes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(facing) = std::env::var("OPTISCAN_FACING") {
            match facing.parse() {
                Ok(parsed) => {
                    debug!(facing = %facing, "Overriding facing from environment");
                    self.camera.facing = parsed;
                }
                Err(e) => warn!(facing = %facing, "Ignoring OPTISCAN_FACING: {}", e),
            }
        }

        if let Some(w) = env_number::<u32>("OPTISCAN_MIN_WIDTH") {
            self.camera.min_width = w;
        }

        if let Some(h) = env_number::<u32>("OPTISCAN_MIN_HEIGHT") {
            self.camera.min_height = h;
        }

        if let Some(ms) = env_number::<u64>("OPTISCAN_TICK_INTERVAL_MS") {
            debug!(tick_interval_ms = ms, "Overriding tick interval from environment");
            self.poll.tick_interval_ms = ms;
        }

        if let Some(ticks) = env_number::<u64>("OPTISCAN_MAX_TICKS") {
            self.poll.max_ticks = ticks;
        }

        if let Some(ms) = env_number::<u64>("OPTISCAN_MAX_DURATION_MS") {
            self.poll.max_duration_ms = ms;
        }

        if let Some(workers) = env_number::<usize>("OPTISCAN_WORKERS") {
            self.live.workers = workers;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "optiscan", "scanner")
            .map(|dirs| dirs.config_dir().join("scanner.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Camera constraints for the given facing.
    pub fn constraints(&self, facing: Facing) -> CameraConstraints {
        CameraConstraints::new(facing, self.camera.min_width, self.camera.min_height)
    }

    /// Settings handed to the linear backend when a live scan starts.
    pub fn live_decode(&self) -> LiveDecodeConfig {
        LiveDecodeConfig {
            region: RegionOfInterest::new(
                self.live.region_width_pct,
                self.live.region_height_pct,
            ),
            symbologies: self.live.symbologies.clone(),
            workers: self.live.workers,
        }
    }

    /// Pacing and cutoff for the QR poll loop.
    pub fn poll_loop(&self) -> PollConfig {
        PollConfig {
            tick_interval: Duration::from_millis(self.poll.tick_interval_ms),
            max_ticks: (self.poll.max_ticks > 0).then_some(self.poll.max_ticks),
            max_duration: (self.poll.max_duration_ms > 0)
                .then(|| Duration::from_millis(self.poll.max_duration_ms)),
        }
    }
}

/// Reads a numeric environment variable, logging and ignoring bad values.
fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}
