//! Change notification for cached resources
//!
//! A [`ChangeWatcher`] hands out one-shot subscriptions: the callback fires
//! at most once, when the resource changes, is renamed or deleted, or can no
//! longer be watched. After firing the subscription is consumed; whoever
//! wants further coverage subscribes again (see [`ChangeLoop`]).
//!
//! Implementations:
//!
//! - [`WatchRegistry`]: in-memory push notifications, the building block of
//!   every other watcher
//! - [`FsChangeWatcher`]: filesystem events through the `notify` crate, with
//!   either the native OS backend or polling
mod change_loop;
mod fs_watcher;
mod registry;
pub use change_loop::*;
pub use fs_watcher::*;
pub use registry::*;

#[cfg(test)]
mod registry_test;

use crate::ResourceId;
use crate::WatchError;

/// Invoked once when the subscribed resource changes
pub type ChangeCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait ChangeWatcher: Send + Sync + 'static {
    /// Subscribes `on_change` to the next change of `resource`
    fn subscribe(
        &self,
        resource: &ResourceId,
        on_change: ChangeCallback,
    ) -> Result<WatchHandle, WatchError>;

    /// Cancels a subscription that has not fired yet
    fn unsubscribe(
        &self,
        handle: WatchHandle,
    ) {
        handle.cancel();
    }
}

impl ChangeWatcher for Box<dyn ChangeWatcher> {
    fn subscribe(
        &self,
        resource: &ResourceId,
        on_change: ChangeCallback,
    ) -> Result<WatchHandle, WatchError> {
        (**self).subscribe(resource, on_change)
    }
}
