//! In-process cache of watched resources.
//!
//! Content is read on first use through a [`ResourceReader`] (bounded retry
//! with exponential backoff), kept in a [`CacheStore`] with sliding
//! expiration, and evicted as soon as the [`ChangeWatcher`] reports that the
//! underlying resource changed. [`WatchedCache`] ties the pieces together.
//!
//! ```ignore
//! let config = CacheNodeConfig::new()?.validate()?;
//! let root = &config.cache.content_root;
//! let watcher = FsChangeWatcher::new(root, &config.watch)?;
//! let cache = WatchedCache::from_config(FsSource::new(root), watcher, &config);
//! cache.start_sweeper();
//!
//! let content = cache.get("appsettings.toml").await?;
//! ```
mod cache;
mod config;
mod errors;
mod metrics;
mod reader;
mod resource_id;
mod store;
mod watcher;

pub use cache::*;
pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use reader::*;
pub use resource_id::*;
pub use store::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
mod errors_test;
