//! Process-wide change watcher multiplexing many listeners per path.

use super::config::WatcherConfig;
use super::debounce;
use super::registry::ListenerSet;
use super::source::{EventSource, NotifySource, Observation, RawEventSink, parent_dir};
use super::Listener;
use crate::error::WatchError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::OnceCell;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static DEFAULT_WATCHER: OnceCell<Watcher> = OnceCell::new();

/// A watched file, identified by its canonical absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    path: PathBuf,
    dir: PathBuf,
}

impl WatchTarget {
    /// Resolve `path` to its canonical form.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Unavailable` if the file does not exist or cannot
    /// be resolved.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|e| WatchError::unavailable(path, format!("failed to resolve path: {}", e)))?;
        Ok(Self::from_canonical(canonical))
    }

    /// Best-effort resolution that tolerates the file being momentarily
    /// absent, as in the middle of a rename-based save.
    pub(crate) fn locate(path: &Path) -> Self {
        if let Ok(target) = Self::resolve(path) {
            return target;
        }
        let dir = parent_dir(path);
        let dir = dir.canonicalize().unwrap_or(dir);
        match path.file_name() {
            Some(name) => Self::from_canonical(dir.join(name)),
            None => Self::from_canonical(path.to_path_buf()),
        }
    }

    pub(crate) fn from_canonical(path: PathBuf) -> Self {
        let dir = parent_dir(&path);
        Self { path, dir }
    }

    /// The canonical path of the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory observed on behalf of this target.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file name within [`dir`](Self::dir).
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Shared machinery for one watched path.
struct PathWatch {
    listeners: Arc<ListenerSet>,
    _observation: Box<dyn Observation>,
    task: JoinHandle<()>,
}

impl Drop for PathWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct WatcherInner {
    config: WatcherConfig,
    source: Arc<dyn EventSource>,
    entries: DashMap<WatchTarget, PathWatch>,
    handle: Handle,
    runtime: parking_lot::Mutex<Option<Runtime>>,
    shut_down: AtomicBool,
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        self.entries.clear();
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// Change watcher that maps paths to listeners.
///
/// Owns exactly one observation per canonical path no matter how many
/// listeners are registered for it, debounces bursts of raw events, and fans
/// each collapsed notification out to every listener on a background thread.
///
/// `Watcher` is a cheap handle; clones share the same registrations.
///
/// # Examples
///
/// ```rust,no_run
/// use credstore_reload::notify::{Listener, Notification, Watcher};
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let watcher = Watcher::get_default()?;
/// let listener: Arc<dyn Listener> =
///     Arc::new(|n: &Notification| println!("store changed: {:?}", n));
///
/// watcher.register("/etc/creds/store.yaml", Arc::clone(&listener))?;
/// // ...
/// watcher.deregister("/etc/creds/store.yaml", &listener);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// The process-wide watcher, created on first use from
    /// [`WatcherConfig::from_env`] and never recreated.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment settings are invalid or the
    /// watcher's runtime cannot be started.
    pub fn get_default() -> Result<Self, WatchError> {
        DEFAULT_WATCHER
            .get_or_try_init(|| Self::new(WatcherConfig::from_env()?))
            .cloned()
    }

    /// Create a private watcher using the `notify` event source.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch runtime cannot be started.
    pub fn new(config: WatcherConfig) -> Result<Self, WatchError> {
        let source = Arc::new(NotifySource::from_config(&config));
        Self::with_source(config, source)
    }

    /// Create a private watcher with a custom event source.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch runtime cannot be started.
    pub fn with_source(
        config: WatcherConfig,
        source: Arc<dyn EventSource>,
    ) -> Result<Self, WatchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("credstore-watch")
            .enable_time()
            .build()
            .map_err(|e| {
                WatchError::unavailable("", format!("failed to start watcher runtime: {}", e))
            })?;

        Ok(Self {
            inner: Arc::new(WatcherInner {
                config,
                source,
                entries: DashMap::new(),
                handle: runtime.handle().clone(),
                runtime: parking_lot::Mutex::new(Some(runtime)),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Register `listener` for changes to `path`.
    ///
    /// Starts an observation if the path is not watched yet. Registering the
    /// same listener twice for a path is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Unavailable` if the path cannot be resolved or
    /// observed, and `WatchError::Shutdown` after [`shutdown`](Self::shutdown).
    pub fn register(
        &self,
        path: impl AsRef<Path>,
        listener: Arc<dyn Listener>,
    ) -> Result<(), WatchError> {
        let target = WatchTarget::resolve(path)?;
        self.register_target(&target, listener)
    }

    /// Register `listener` for an already resolved target.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_target(
        &self,
        target: &WatchTarget,
        listener: Arc<dyn Listener>,
    ) -> Result<(), WatchError> {
        if self.is_shut_down() {
            return Err(WatchError::Shutdown);
        }

        match self.inner.entries.entry(target.clone()) {
            Entry::Occupied(entry) => {
                if entry.get().listeners.insert(listener) {
                    tracing::debug!(
                        path = %target,
                        listeners = entry.get().listeners.len(),
                        "listener added to existing watch"
                    );
                }
            }
            Entry::Vacant(entry) => {
                let watch = self.start_watch(target)?;
                watch.listeners.insert(listener);
                entry.insert(watch);
                tracing::debug!(path = %target, "watch started");
            }
        }

        Ok(())
    }

    /// Remove `listener` from `path`. Removing an unregistered pair is a no-op.
    ///
    /// The observation is released once its last listener is removed.
    pub fn deregister(&self, path: impl AsRef<Path>, listener: &Arc<dyn Listener>) {
        let target = WatchTarget::locate(path.as_ref());
        self.deregister_target(&target, listener);
    }

    /// Remove `listener` from an already resolved target.
    pub fn deregister_target(&self, target: &WatchTarget, listener: &Arc<dyn Listener>) {
        let released = match self.inner.entries.entry(target.clone()) {
            Entry::Occupied(entry) => {
                entry.get().listeners.remove(listener);
                if entry.get().listeners.is_empty() {
                    Some(entry.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        };

        // Release outside the shard lock
        if let Some(watch) = released {
            drop(watch);
            tracing::debug!(path = %target, "watch released");
        }
    }

    fn start_watch(&self, target: &WatchTarget) -> Result<PathWatch, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let observation = self.inner.source.observe(target, RawEventSink::new(tx))?;

        let listeners = Arc::new(ListenerSet::default());
        let task = self.inner.handle.spawn(debounce::run(
            target.clone(),
            rx,
            Arc::clone(&listeners),
            self.inner.config.debounce(),
        ));

        Ok(PathWatch {
            listeners,
            _observation: observation,
            task,
        })
    }

    /// Stop every observation and refuse new registrations.
    ///
    /// In-flight debounce timers are cancelled. Calling this more than once
    /// is harmless.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let targets: Vec<WatchTarget> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for target in targets {
            // Drop outside any iterator guard
            let removed = self.inner.entries.remove(&target);
            drop(removed);
        }

        if let Some(runtime) = self.inner.runtime.lock().take() {
            runtime.shutdown_background();
        }
        tracing::debug!("change watcher shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Canonical paths currently being observed.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner
            .entries
            .iter()
            .map(|e| e.key().path().to_path_buf())
            .collect()
    }

    /// Number of listeners sharing the observation for `path`.
    pub fn listener_count(&self, path: impl AsRef<Path>) -> usize {
        let target = WatchTarget::locate(path.as_ref());
        self.inner
            .entries
            .get(&target)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }

    /// The settings this watcher was created with.
    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.inner.config)
            .field("watched", &self.inner.entries.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
