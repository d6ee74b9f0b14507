use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Single attempt timeout (unit: milliseconds, 0 disables it)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay before the second attempt; doubled for every further attempt
    /// (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(
        &self,
        attempt: usize,
    ) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}: max_attempts must be at least 1"
            ))));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}: base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }

        Ok(())
    }
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RetryPolicies {
    // Resource population (ResourceReader)
    #[serde(default)]
    pub read: BackoffPolicy,
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.read.validate("retry.read")
    }
}

fn default_max_attempts() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    0
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
