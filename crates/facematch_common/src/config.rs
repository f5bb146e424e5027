//! Configuration management for facematch.
//!
//! Loads settings from `$XDG_CONFIG_HOME/facematch/config.toml` or uses defaults.
//! Every field is optional in the file.

use crate::error::Result;
use crate::types::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Versioned key the knowledge snapshot is stored under
pub const DEFAULT_STORE_KEY: &str = "facematch-knowledge-v4";

/// Locator pattern carrying a stable question id
pub const DEFAULT_STRUCTURAL_PATTERN: &str = r"questions/(\d+)/picture";

/// Timers and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Presentation poll interval in learning mode
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often a pending round checks for the revealed answer
    #[serde(default = "default_outcome_check_interval")]
    pub outcome_check_interval_ms: u64,

    /// Pending rounds older than this are discarded without learning
    #[serde(default = "default_outcome_timeout")]
    pub outcome_timeout_ms: u64,

    /// Per-image fetch timeout for content hashing
    #[serde(default = "default_image_load_timeout")]
    pub image_load_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    100
}

fn default_outcome_check_interval() -> u64 {
    10
}

fn default_outcome_timeout() -> u64 {
    5_000
}

fn default_image_load_timeout() -> u64 {
    3_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            outcome_check_interval_ms: default_outcome_check_interval(),
            outcome_timeout_ms: default_outcome_timeout(),
            image_load_timeout_ms: default_image_load_timeout(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn outcome_check_interval(&self) -> Duration {
        Duration::from_millis(self.outcome_check_interval_ms.max(1))
    }

    pub fn outcome_timeout(&self) -> Duration {
        Duration::from_millis(self.outcome_timeout_ms)
    }

    pub fn image_load_timeout(&self) -> Duration {
        Duration::from_millis(self.image_load_timeout_ms)
    }
}

/// Identity hasher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherConfig {
    /// Side of the downsampling grid for content keys
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// Characters of the locator kept for last-resort keys
    #[serde(default = "default_suffix_len")]
    pub suffix_len: usize,

    /// Regex whose first capture group is a stable image id
    #[serde(default = "default_structural_pattern")]
    pub structural_pattern: String,

    /// Prefix prepended to structural ids
    #[serde(default = "default_structural_prefix")]
    pub structural_prefix: String,
}

fn default_grid_size() -> u32 {
    6
}

fn default_suffix_len() -> usize {
    16
}

fn default_structural_pattern() -> String {
    DEFAULT_STRUCTURAL_PATTERN.to_string()
}

fn default_structural_prefix() -> String {
    "q".to_string()
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            suffix_len: default_suffix_len(),
            structural_pattern: default_structural_pattern(),
            structural_prefix: default_structural_prefix(),
        }
    }
}

/// Knowledge persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the snapshot; defaults to `$XDG_DATA_HOME/facematch`
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_store_key")]
    pub key: String,
}

fn default_store_key() -> String {
    DEFAULT_STORE_KEY.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            key: default_store_key(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// Progress reporting cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Learning rounds between detailed progress summaries
    #[serde(default = "default_detail_every")]
    pub detail_every: u64,

    /// Guessing rounds between one-line summaries
    #[serde(default = "default_guessing_every")]
    pub guessing_every: u64,
}

fn default_detail_every() -> u64 {
    10
}

fn default_guessing_every() -> u64 {
    50
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            detail_every: default_detail_every(),
            guessing_every: default_guessing_every(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub hasher: HasherConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Config {
    /// Load config from an explicit path, the user config file, or defaults
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = explicit.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if explicit.is_none() && !path.exists() {
            return Config::default();
        }
        Self::load_from_path(&path).unwrap_or_else(|e| {
            warn!("Config not loaded from {}, using defaults: {}", path.display(), e);
            Config::default()
        })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `$XDG_CONFIG_HOME/facematch/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("facematch")
        .join("config.toml")
}

/// `$XDG_DATA_HOME/facematch`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("facematch")
}
