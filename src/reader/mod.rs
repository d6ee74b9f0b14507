//! Resource population with bounded retry
//!
//! [`ResourceSource`] is the boundary to whatever holds the resources
//! (`exists` / `open`). [`ResourceReader`] drives a source through the
//! configured [`BackoffPolicy`]:
//!
//! - a missing resource fails fast and is never retried
//! - a transient I/O failure is retried with exponential backoff and
//!   surfaced unchanged once the attempts are exhausted
//! - every other I/O failure is surfaced on first occurrence
mod classify;
mod fs_source;
pub use classify::*;
pub use fs_source::*;


use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::metrics::READ_ATTEMPTS;
use crate::BackoffPolicy;
use crate::ReadError;
use crate::ResourceId;

/// Byte stream produced by [`ResourceSource::open`]
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Decides whether an I/O failure is worth retrying
pub type TransientClassifier = Arc<dyn Fn(&io::Error) -> bool + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceSource: Send + Sync + 'static {
    /// Whether the resource currently exists
    async fn exists(
        &self,
        id: &ResourceId,
    ) -> bool;

    /// Opens the resource for reading its full content
    async fn open(
        &self,
        id: &ResourceId,
    ) -> io::Result<ContentStream>;
}

/// Reads resources from a [`ResourceSource`], retrying transient failures.
pub struct ResourceReader<S> {
    source: S,
    policy: BackoffPolicy,
    is_transient: TransientClassifier,
}

impl<S> std::fmt::Debug for ResourceReader<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ResourceReader").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl<S: ResourceSource> ResourceReader<S> {
    pub fn new(
        source: S,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            source,
            policy,
            is_transient: Arc::new(is_transient_io_error),
        }
    }

    /// Replaces the default transient-error predicate
    pub fn with_classifier(
        mut self,
        is_transient: impl Fn(&io::Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_transient = Arc::new(is_transient);
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads the current content of `id`.
    ///
    /// Attempts are numbered from 1; after failed attempt `n` the reader waits
    /// `policy.delay_after(n)` before trying again.
    pub async fn read(
        &self,
        id: &ResourceId,
    ) -> Result<Bytes, ReadError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.policy.attempt_timeout() {
                Some(limit) => match timeout(limit, self.read_once(id)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ReadError::TimedOut {
                        id: id.clone(),
                        after: limit,
                    }),
                },
                None => self.read_once(id).await,
            };

            let error = match outcome {
                Ok(content) => {
                    READ_ATTEMPTS.with_label_values(&["ok"]).inc();
                    trace!(%id, attempt, len = content.len(), "resource read");
                    return Ok(content);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                READ_ATTEMPTS.with_label_values(&["failed"]).inc();
                debug!(%id, attempt, %error, "read failed, not retrying");
                return Err(error);
            }

            READ_ATTEMPTS.with_label_values(&["transient"]).inc();
            if attempt >= max_attempts {
                warn!(%id, attempt, %error, "read failed after {} attempts", max_attempts);
                return Err(error);
            }

            let delay = self.policy.delay_after(attempt);
            warn!(%id, attempt, ?delay, %error, "transient read failure, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn read_once(
        &self,
        id: &ResourceId,
    ) -> Result<Bytes, ReadError> {
        if !self.source.exists(id).await {
            return Err(ReadError::NotFound { id: id.clone() });
        }

        let mut stream = self.source.open(id).await.map_err(|e| self.classify(id, e))?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.map_err(|e| self.classify(id, e))?;

        Ok(Bytes::from(buf))
    }

    fn classify(
        &self,
        id: &ResourceId,
        error: io::Error,
    ) -> ReadError {
        if error.kind() == io::ErrorKind::NotFound {
            // deleted between `exists` and `open`
            return ReadError::NotFound { id: id.clone() };
        }

        if (self.is_transient)(&error) {
            ReadError::TransientIo {
                id: id.clone(),
                source: Arc::new(error),
            }
        } else {
            ReadError::Io {
                id: id.clone(),
                source: Arc::new(error),
            }
        }
    }
}
