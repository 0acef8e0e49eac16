use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{rlog_debug, Error, Result};

/// Batch size used when a bulk config does not specify one.
pub const DEFAULT_BATCH_SIZE: usize = 5;

const DEFAULT_BRIDGE_LATENCY_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Items per bulk batch when the run does not set `batchSize`.
    pub batch_size: usize,
    /// Pause between bulk batches when the run does not set one.
    pub delay_between_batches_ms: u64,
    /// Substitute a mock agent when construction or page validation fails.
    pub mock_fallback: bool,
    /// Simulated latency of each bridge call.
    pub bridge_latency_ms: u64,
    /// Upper bound for a single dispatched task without its own timeout.
    pub default_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay_between_batches_ms: 0,
            mock_fallback: true,
            bridge_latency_ms: DEFAULT_BRIDGE_LATENCY_MS,
            default_timeout_secs: None,
            log_level: None,
        }
    }
}

impl Config {
    pub fn relay_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".relay"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::relay_dir()?.join("relay.toml"))
    }

    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }

    pub fn bridge_latency(&self) -> Duration {
        Duration::from_millis(self.bridge_latency_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        rlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            rlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        rlog_debug!(
            "Config loaded: batch_size={}, delay_ms={}, mock_fallback={}",
            config.batch_size,
            config.delay_between_batches_ms,
            config.mock_fallback
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".to_string()));
        }
        if let Some(level) = &self.log_level {
            level.parse::<crate::log::LogLevel>()?;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        Self::ensure_dirs()?;
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        rlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let relay_dir = Self::relay_dir()?;
        if !relay_dir.exists() {
            rlog_debug!("Creating relay directory: {}", relay_dir.display());
            fs::create_dir_all(&relay_dir)?;
        }
        Ok(())
    }
}
