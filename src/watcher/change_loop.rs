use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ChangeWatcher;
use crate::ResourceId;

/// Pause before re-arming; one save usually produces a burst of events.
const REARM_DELAY: Duration = Duration::from_millis(50);

/// Continuous change coverage for one resource.
///
/// Subscriptions are one-shot; the loop re-subscribes after every
/// notification and invokes the consumer each time, until stopped or dropped.
///
/// ```ignore
/// let reload = ChangeLoop::start(watcher.clone(), "appsettings.toml".into(), |id| {
///     info!(%id, "configuration changed");
/// });
/// ```
#[derive(Debug)]
pub struct ChangeLoop {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChangeLoop {
    /// Must be called within a tokio runtime
    pub fn start<W, F>(
        watcher: W,
        resource: ResourceId,
        mut consumer: F,
    ) -> Self
    where
        W: ChangeWatcher,
        F: FnMut(&ResourceId) + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();

        let task = tokio::spawn(async move {
            loop {
                let (tx, rx) = oneshot::channel();
                let handle = match watcher.subscribe(
                    &resource,
                    Box::new(move || {
                        let _ = tx.send(());
                    }),
                ) {
                    Ok(handle) => handle,
                    Err(error) => {
                        warn!(%resource, %error, "Change loop cannot subscribe, stopping");
                        break;
                    }
                };

                tokio::select! {
                    _ = stop.cancelled() => {
                        handle.cancel();
                        break;
                    }
                    fired = rx => {
                        if fired.is_err() {
                            // subscription dropped without firing
                            break;
                        }
                        consumer(&resource);
                    }
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(REARM_DELAY) => {}
                }
            }
            debug!(%resource, "Change loop stopped");
        });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Stops the loop and waits for it to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Change loop ended abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for ChangeLoop {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
