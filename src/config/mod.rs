//! Configuration management for the display engine
//!
//! Configuration is read from a TOML file or from environment variables
//! (prefix `LUACH_`), validated once at startup, and treated as read-only
//! afterwards. The playlist itself is not configuration; it lives in the
//! durable store and is admin-edited at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend data-access configuration
    pub backend: BackendConfig,

    /// Cache store configuration
    pub cache: CacheSettings,

    /// Sunrise countdown configuration
    pub countdown: CountdownSettings,

    /// Display and transition configuration
    pub display: DisplaySettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backend data-access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the collection API
    pub base_url: String,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Snapshot TTL in seconds; older snapshots trigger a background refresh
    pub refresh_interval_secs: u64,

    /// Delay between per-collection fetches, respecting backend rate limits
    pub fetch_delay_ms: u64,

    /// Floor for re-arming the refresh timer, preventing thrash
    pub min_rearm_delay_secs: u64,

    /// Directory for the durable key-value store
    pub storage_dir: PathBuf,
}

/// Sunrise countdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownSettings {
    /// Countdown window length on weekdays, in minutes
    pub weekday_window_minutes: u32,

    /// Countdown window length around Shabbat, in minutes
    pub shabbat_window_minutes: u32,
}

/// Display and transition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Theme preset name (classic, night, parchment)
    pub theme_preset: String,

    /// Global font scale applied by the renderer
    pub font_scale: f32,

    /// Board transition speed in milliseconds
    pub transition_ms: u64,

    /// Background crossfade duration in milliseconds, independent of board duration
    pub crossfade_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8090/api"),
            request_timeout_secs: 20,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 900,
            fetch_delay_ms: 250,
            min_rearm_delay_secs: 5,
            storage_dir: PathBuf::from("data"),
        }
    }
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            weekday_window_minutes: 40,
            shabbat_window_minutes: 90,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme_preset: String::from("classic"),
            font_scale: 1.0,
            transition_ms: 400,
            crossfade_ms: 1500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            cache: CacheSettings::default(),
            countdown: CountdownSettings::default(),
            display: DisplaySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LUACH_BACKEND_URL") {
            config.backend.base_url = url;
        }
        if let Some(secs) = env_parse::<u64>("LUACH_REQUEST_TIMEOUT") {
            config.backend.request_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("LUACH_REFRESH_INTERVAL") {
            config.cache.refresh_interval_secs = secs;
        }
        if let Some(ms) = env_parse::<u64>("LUACH_FETCH_DELAY_MS") {
            config.cache.fetch_delay_ms = ms;
        }
        if let Ok(dir) = std::env::var("LUACH_STORAGE_DIR") {
            config.cache.storage_dir = dir.into();
        }
        if let Some(mins) = env_parse::<u32>("LUACH_WEEKDAY_WINDOW") {
            config.countdown.weekday_window_minutes = mins;
        }
        if let Some(mins) = env_parse::<u32>("LUACH_SHABBAT_WINDOW") {
            config.countdown.shabbat_window_minutes = mins;
        }
        if let Ok(theme) = std::env::var("LUACH_THEME") {
            config.display.theme_preset = theme;
        }
        if let Some(scale) = env_parse::<f32>("LUACH_FONT_SCALE") {
            config.display.font_scale = scale;
        }
        if let Some(ms) = env_parse::<u64>("LUACH_CROSSFADE_MS") {
            config.display.crossfade_ms = ms;
        }
        if let Ok(level) = std::env::var("LUACH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LUACH_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.is_empty() {
            anyhow::bail!("backend.base_url must not be empty");
        }

        if self.cache.refresh_interval_secs == 0 {
            anyhow::bail!("cache.refresh_interval_secs must be greater than 0");
        }

        if self.cache.fetch_delay_ms >= self.cache.refresh_interval_secs * 1000 {
            anyhow::bail!("cache.fetch_delay_ms must be shorter than the refresh interval");
        }

        if self.countdown.weekday_window_minutes == 0 || self.countdown.shabbat_window_minutes == 0
        {
            anyhow::bail!("countdown window lengths must be greater than 0");
        }

        if self.display.font_scale <= 0.0 {
            anyhow::bail!("display.font_scale must be positive");
        }

        if self.display.crossfade_ms == 0 {
            anyhow::bail!("display.crossfade_ms must be greater than 0");
        }

        Ok(())
    }

    /// Get the cache refresh interval as Duration
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache.refresh_interval_secs)
    }

    /// Get the backend request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Get the crossfade duration as Duration
    #[must_use]
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.display.crossfade_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
