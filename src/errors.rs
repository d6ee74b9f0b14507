//! Error hierarchy for the watched cache
//!
//! Read failures are kept apart from watcher and configuration failures so that
//! callers of [`crate::WatchedCache::get`] always see the underlying failure kind.

use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;

use crate::ResourceId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Populating an entry from its resource failed
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Change notification setup failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failures of a single resource read, after the retry policy has been applied.
///
/// The I/O sources are shared so that every caller joined to the same
/// population flight receives the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    /// The resource does not exist. Never retried.
    #[error("Resource not found: {id}")]
    NotFound { id: ResourceId },

    /// A transient failure that outlived every retry attempt
    #[error("Transient I/O failure reading {id}: {source}")]
    TransientIo {
        id: ResourceId,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Any other I/O failure. Surfaced on first occurrence.
    #[error("I/O failure reading {id}: {source}")]
    Io {
        id: ResourceId,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Every attempt exceeded the per-attempt timeout
    #[error("Reading {id} timed out after {after:?}")]
    TimedOut { id: ResourceId, after: Duration },

    /// The population task ended without producing a result
    /// (runtime shutdown or a panic inside the source)
    #[error("Population of {id} was aborted")]
    Aborted { id: ResourceId },
}

impl ReadError {
    pub fn id(&self) -> &ResourceId {
        match self {
            ReadError::NotFound { id }
            | ReadError::TransientIo { id, .. }
            | ReadError::Io { id, .. }
            | ReadError::TimedOut { id, .. }
            | ReadError::Aborted { id } => id,
        }
    }

    /// Whether the failure was classified as transient (and therefore retried)
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadError::TransientIo { .. } | ReadError::TimedOut { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification backend refused or lost the watch
    #[error("Watch backend error: {0}")]
    Backend(String),

    /// The watcher has been shut down
    #[error("Watcher is closed")]
    Closed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::Backend(e.to_string())
    }
}
