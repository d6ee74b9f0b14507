use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Change notification configuration
///
/// ```toml
/// [watch]
/// enabled = true
/// poll_interval_ms = 0   # 0 = native OS notifications, otherwise polling
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WatchConfig {
    /// When disabled entries only leave the cache through expiration
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Polling interval for filesystems without native notifications
    /// (network shares, some containers)
    ///
    /// Range: 0 (native backend) or 50-600000
    #[serde(default)]
    pub poll_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: 0,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.poll_interval_ms != 0 && !(50..=600_000).contains(&self.poll_interval_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "watch poll_interval_ms must be 0 or between 50 and 600000, got {}",
                self.poll_interval_ms
            ))));
        }

        Ok(())
    }
}
