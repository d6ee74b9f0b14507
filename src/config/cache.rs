use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Cache entry lifetime and content location
///
/// ```toml
/// [cache]
/// content_root = "/srv/content"
/// sliding_expiration_ms = 300000  # 5 minutes since last access
/// sweep_interval_ms = 1000        # 0 disables the background sweeper
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CacheConfig {
    /// Directory resource ids are resolved against
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,

    /// Sliding expiration, measured from the last successful lookup
    ///
    /// Default: 300000 (5 minutes)
    #[serde(default = "default_sliding_expiration_ms")]
    pub sliding_expiration_ms: u64,

    /// Background sweep interval in milliseconds
    ///
    /// Expired entries are always evicted lazily on access; the sweeper
    /// additionally reclaims entries nobody asks for anymore.
    ///
    /// Range: 0 (disabled) or 10-3600000
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_content_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_sliding_expiration_ms() -> u64 {
    crate::DEFAULT_TTL.as_millis() as u64
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            sliding_expiration_ms: default_sliding_expiration_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl CacheConfig {
    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_millis(self.sliding_expiration_ms)
    }

    /// `None` when the background sweeper is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sliding_expiration_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sliding_expiration_ms must be greater than 0".into(),
            )));
        }

        if self.sweep_interval_ms != 0 && !(10..=3_600_000).contains(&self.sweep_interval_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "sweep_interval_ms must be 0 or between 10 and 3600000, got {}",
                self.sweep_interval_ms
            ))));
        }

        if self.content_root.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "content_root must not be empty".into(),
            )));
        }

        Ok(())
    }
}
