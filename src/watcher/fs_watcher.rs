use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use notify::Event;
use notify::EventKind;
use notify::PollWatcher;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ChangeCallback;
use super::ChangeWatcher;
use super::WatchHandle;
use super::WatchRegistry;
use crate::reader::resolve_under;
use crate::ResourceId;
use crate::WatchConfig;
use crate::WatchError;

/// Lookup tables shared with the backend's event thread
#[derive(Debug, Default)]
struct PathIndex {
    /// physical path -> every resource id resolving to it (`a.txt`, `./a.txt`)
    resources: DashMap<PathBuf, HashSet<ResourceId>>,
    /// directories registered with the backend
    watched_dirs: DashMap<PathBuf, ()>,
}

impl PathIndex {
    fn resources_in(
        &self,
        dir: &Path,
    ) -> Vec<ResourceId> {
        self.resources
            .iter()
            .filter(|e| e.key().parent() == Some(dir))
            .flat_map(|e| e.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    fn resources_at(
        &self,
        path: &Path,
    ) -> Vec<ResourceId> {
        self.resources.get(path).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
    }
}

/// Filesystem change watcher
///
/// Resources are watched through their parent directory (non-recursive) so
/// that in-place writes, atomic rename-over saves, deletions and re-creations
/// are all observed. Each directory is registered with the backend once.
#[derive(Clone)]
pub struct FsChangeWatcher {
    root: PathBuf,
    registry: WatchRegistry,
    index: Arc<PathIndex>,
    /// Never locked from the event handler; the native backends block in
    /// `watch()` until their event thread acknowledges.
    backend: Arc<Mutex<Box<dyn Watcher + Send>>>,
}

impl std::fmt::Debug for FsChangeWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FsChangeWatcher")
            .field("root", &self.root)
            .field("registry", &self.registry)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl FsChangeWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        config: &WatchConfig,
    ) -> Result<Self, WatchError> {
        let root: PathBuf = root.into();
        // notify reports canonical paths on some platforms
        let root = root.canonicalize().unwrap_or(root);

        let registry = WatchRegistry::new();
        let index = Arc::new(PathIndex::default());

        let backend: Box<dyn Watcher + Send> = match config.poll_interval() {
            Some(interval) => {
                debug!(?root, ?interval, "Starting polling file watcher");
                Box::new(PollWatcher::new(
                    event_handler(registry.clone(), index.clone()),
                    // mtimes are compared in whole seconds; hashing catches
                    // rewrites within the same second
                    notify::Config::default()
                        .with_poll_interval(interval)
                        .with_compare_contents(true),
                )?)
            }
            None => {
                debug!(?root, "Starting native file watcher");
                Box::new(RecommendedWatcher::new(
                    event_handler(registry.clone(), index.clone()),
                    notify::Config::default(),
                )?)
            }
        };

        Ok(Self {
            root,
            registry,
            index,
            backend: Arc::new(Mutex::new(backend)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The underlying registry; changes can also be pushed manually
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Fires all pending subscriptions and rejects new ones
    pub fn shutdown(&self) -> usize {
        self.registry.close()
    }

    fn ensure_watched(
        &self,
        dir: &Path,
    ) -> Result<(), WatchError> {
        if self.index.watched_dirs.contains_key(dir) {
            return Ok(());
        }

        let mut backend = self.backend.lock();
        if self.index.watched_dirs.contains_key(dir) {
            return Ok(());
        }
        backend.watch(dir, RecursiveMode::NonRecursive)?;
        self.index.watched_dirs.insert(dir.to_path_buf(), ());

        debug!(?dir, "Directory watched");
        Ok(())
    }
}

impl ChangeWatcher for FsChangeWatcher {
    fn subscribe(
        &self,
        resource: &ResourceId,
        on_change: ChangeCallback,
    ) -> Result<WatchHandle, WatchError> {
        let path = resolve_under(&self.root, resource).ok_or_else(|| {
            WatchError::Backend(format!("{resource} is outside the content root"))
        })?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());

        self.index.resources.entry(path).or_default().insert(resource.clone());
        let handle = self.registry.register(resource, on_change)?;

        if let Err(error) = self.ensure_watched(&dir) {
            warn!(%resource, %error, "Resource cannot be watched, treating it as changed");
            self.registry.notify_changed(resource);
        }

        Ok(handle)
    }
}

fn event_handler(
    registry: WatchRegistry,
    index: Arc<PathIndex>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |result| match result {
        Ok(event) => handle_event(&registry, &index, event),
        Err(error) => {
            warn!(%error, paths = ?error.paths, "File watcher error");
            if error.paths.is_empty() {
                registry.notify_all();
            } else {
                for path in &error.paths {
                    notify_path(&registry, &index, path);
                }
            }
        }
    }
}

fn handle_event(
    registry: &WatchRegistry,
    index: &PathIndex,
    event: Event,
) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    trace!(kind = ?event.kind, paths = ?event.paths, "File event");

    for path in &event.paths {
        // the backend drops the watch together with a removed directory
        if matches!(event.kind, EventKind::Remove(_)) && index.watched_dirs.remove(path).is_some() {
            for resource in index.resources_in(path) {
                registry.notify_changed(&resource);
            }
            continue;
        }
        notify_path(registry, index, path);
    }
}

fn notify_path(
    registry: &WatchRegistry,
    index: &PathIndex,
    path: &Path,
) {
    // collected first: callbacks must not run under the index shard lock
    for resource in index.resources_at(path) {
        registry.notify_changed(&resource);
    }
}
