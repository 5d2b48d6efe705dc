//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the bot's tuning constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Discord bot token
    pub discord_token: String,

    /// Score at or above which an image is treated as a violation
    #[serde(default = "default_nsfw_threshold")]
    pub nsfw_threshold: f32,

    /// Path to the ONNX classification model
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Path to the JSON file holding moderation data
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Prefix for text commands, e.g. `:` for `:mod status`
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Timeout for a single attachment download
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Attachments larger than this are not scanned
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    /// Intra-op threads for the ONNX session
    #[serde(default = "default_inference_threads")]
    pub inference_threads: usize,
}

const fn default_nsfw_threshold() -> f32 {
    0.5
}

fn default_model_path() -> PathBuf {
    PathBuf::from("nsfw_model.onnx")
}

fn default_data_file() -> PathBuf {
    PathBuf::from("moderation_data.json")
}

fn default_command_prefix() -> String {
    ":".to_string()
}

const fn default_fetch_timeout_secs() -> u64 {
    10
}

const fn default_max_image_bytes() -> u64 {
    25 * 1024 * 1024
}

const fn default_inference_threads() -> usize {
    1
}

/// Build the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE env vars map onto snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use image_moderator::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or validation fails.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(ConfigError::Message("DISCORD_TOKEN is empty".into()));
        }
        if !self.nsfw_threshold.is_finite() || !(0.0..=1.0).contains(&self.nsfw_threshold) {
            return Err(ConfigError::Message(format!(
                "NSFW_THRESHOLD must be within [0, 1], got {}",
                self.nsfw_threshold
            )));
        }
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::Message("COMMAND_PREFIX is empty".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message("FETCH_TIMEOUT_SECS must be > 0".into()));
        }

        if !RECOMMENDED_THRESHOLD_RANGE.contains(&self.nsfw_threshold) {
            warn!(
                threshold = self.nsfw_threshold,
                "NSFW threshold is outside the recommended range {:?}",
                RECOMMENDED_THRESHOLD_RANGE
            );
        }
        Ok(())
    }
}

/// Threshold range the bundled model was tuned for.
pub const RECOMMENDED_THRESHOLD_RANGE: std::ops::RangeInclusive<f32> = 0.30..=0.50;

// Model input
/// Width and height the model expects
pub const MODEL_IMAGE_SIZE: u32 = 224;
/// Colour channels the model expects
pub const MODEL_CHANNELS: usize = 3;

// Retry configuration for Discord REST calls and downloads
/// Maximum retry attempts after the first failure
pub const API_MAX_RETRIES: usize = 3;
/// Backoff base; delays grow as `base^n * factor` ms
pub const API_BACKOFF_BASE: u64 = 2;
/// Backoff multiplier (first delay 500ms)
pub const API_BACKOFF_FACTOR_MS: u64 = 250;
/// Upper bound for a single backoff delay
pub const API_MAX_BACKOFF_MS: u64 = 4000;

// Moderation data
/// Maximum number of entries kept in the moderation log
pub const MODERATION_LOG_LIMIT: usize = 1000;
/// Number of users shown in the warnings leaderboard
pub const WARNINGS_LEADERBOARD_SIZE: usize = 10;

// Score cache
/// Maximum number of cached image scores
pub const SCORE_CACHE_MAX_SIZE: u64 = 10_000;
/// Time-to-live for cached image scores (seconds)
pub const SCORE_CACHE_TTL_SECS: u64 = 3600;

/// Cooldown period (seconds) between "Access Denied" replies for same user.
/// Default: 5 minutes.
pub const DENIAL_COOLDOWN_SECS: u64 = 300;
/// Time-to-live (seconds) for cooldown entries.
/// Default: 1 hour.
pub const DENIAL_CACHE_TTL_SECS: u64 = 3600;
/// Maximum cooldown cache capacity (number of entries).
pub const DENIAL_CACHE_MAX_SIZE: u64 = 10_000;

/// Get denial cooldown from env or default.
///
/// Environment variable: `DENIAL_COOLDOWN_SECS`.
#[must_use]
pub fn get_denial_cooldown() -> u64 {
    std::env::var("DENIAL_COOLDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DENIAL_COOLDOWN_SECS)
}

/// Get denial cache TTL from env or default.
///
/// Environment variable: `DENIAL_CACHE_TTL_SECS`.
#[must_use]
pub fn get_denial_cache_ttl() -> u64 {
    std::env::var("DENIAL_CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DENIAL_CACHE_TTL_SECS)
}

/// Get denial cache max size from env or default.
///
/// Environment variable: `DENIAL_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_denial_cache_max_size() -> u64 {
    std::env::var("DENIAL_CACHE_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DENIAL_CACHE_MAX_SIZE)
}
