//! Configuration management for the watched cache.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod cache;
mod retry;
mod watch;
pub use cache::*;
pub use retry::*;
pub use watch::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Prefix of environment variables overriding configuration values,
/// e.g. `WCACHE__CACHE__SLIDING_EXPIRATION_MS=60000`.
pub const ENV_PREFIX: &str = "WCACHE";

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CacheNodeConfig {
    /// Content root and expiration parameters
    #[serde(default)]
    pub cache: CacheConfig,
    /// Retry policies for resource reads
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Change notification backend
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Debug for CacheNodeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheNodeConfig")
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("watch", &self.watch)
            .finish()
    }
}

impl CacheNodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `WCACHE__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("WCACHE__CACHE__CONTENT_ROOT", "/srv/content");
    /// let cfg = CacheNodeConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self and performs validation of all subsystems. Must be called
    /// after all configuration overrides.
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.retry.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
