//! Configuration types
//!
//! The live [`Config`] is runtime-mutable through
//! [`crate::MediaDownloader::update_config`]; attempts never read it
//! directly. Instead each attempt captures an immutable [`EngineOptions`]
//! snapshot at its start, so a settings change affects the next retry or the
//! next queued task, never an attempt already in flight.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download and queue settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Extraction/download engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Retry policy settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults, matching first-run behavior.
    /// A present-but-invalid file is an error rather than a silent reset.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Save configuration to a JSON file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Download and queue settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default destination directory (default: "./downloads")
    #[serde(default = "default_destination_dir")]
    pub destination_dir: PathBuf,

    /// Maximum concurrent downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Output filename template, joined onto each task's destination
    /// (default: "%(title)s.%(ext)s")
    #[serde(default = "default_output_template")]
    pub output_template: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            destination_dir: default_destination_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            output_template: default_output_template(),
        }
    }
}

/// Extraction/download engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Preferred format selector passed to the engine (default: "best")
    #[serde(default = "default_preferred_format")]
    pub preferred_format: String,

    /// Proxy URL, if any
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Transfer rate limit in bytes per second (0 = unlimited)
    #[serde(default)]
    pub rate_limit_bps: u64,

    /// Explicit path to the engine binary (takes precedence over PATH search)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Search PATH for the engine binary when no explicit path is set
    /// (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_format: default_preferred_format(),
            proxy_url: None,
            rate_limit_bps: 0,
            binary_path: None,
            search_path: true,
        }
    }
}

/// Retry policy settings
///
/// The delay after a failed attempt `n` (1-based) is
/// `backoff_base * 2^n` — with the default one-second base that is 2 s, 4 s,
/// 8 s. `max_retries` counts retries after the initial attempt, so the
/// default of 3 allows up to four engine calls per dispatch sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base unit for the exponential backoff (default: 1 second)
    #[serde(default = "default_backoff_base", with = "duration_serde")]
    pub backoff_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
        }
    }
}

/// Immutable per-attempt snapshot of the engine options
///
/// Built from the live [`Config`] at the start of every attempt and never
/// mutated afterwards; concurrent settings changes cannot alter an attempt
/// already past its snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Format selector
    pub format: String,

    /// Proxy URL, if any
    pub proxy_url: Option<String>,

    /// Transfer rate limit in bytes per second (0 = unlimited)
    pub rate_limit_bps: u64,

    /// Full output template including the task's destination directory
    pub output_template: String,
}

impl EngineOptions {
    /// Capture a snapshot of the current configuration for one attempt
    /// against the given destination directory
    pub fn snapshot(config: &Config, destination: &Path) -> Self {
        Self {
            format: config.engine.preferred_format.clone(),
            proxy_url: config.engine.proxy_url.clone(),
            rate_limit_bps: config.engine.rate_limit_bps,
            output_template: destination
                .join(&config.download.output_template)
                .to_string_lossy()
                .into_owned(),
        }
    }
}

fn default_destination_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_output_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_preferred_format() -> String {
    "best".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

/// Serialize/deserialize a Duration as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
