//! The reloadable credential store handle providing lock-free reads.

use crate::codec::{Codec, Secret, StoreType};
use crate::core::{Credential, CredentialSnapshot};
use crate::error::{LoadCause, Result, StoreError, WatchError};
use crate::notify::{Listener, Notification, WatchTarget, Watcher};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "metrics")]
use crate::metrics::StoreMetrics;

/// Whether the store is tracking its backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    /// Not loaded yet, closed, or watching was disabled.
    Inactive,
    /// Registered with the change watcher; changes are picked up automatically.
    Watching,
    /// The watch could not be established; the store serves a static snapshot.
    Static {
        /// Why watching is unavailable
        reason: WatchError,
    },
    /// The watch was established but later lost; the snapshot may be stale.
    Lost {
        /// Why the watch was lost
        reason: String,
    },
}

/// Counters describing background reload activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadStats {
    /// Reloads that published a new snapshot.
    pub reloads: u64,
    /// Reloads abandoned because the file could not be read or parsed.
    pub failures: u64,
}

/// State shared between the handle and its reload hook.
pub(crate) struct StoreShared {
    path: PathBuf,
    store_type: StoreType,
    secret: Option<Secret>,
    codec: Arc<dyn Codec>,
    current: ArcSwapOption<CredentialSnapshot>,
    closed: AtomicBool,
    generation: AtomicU64,
    reloads: AtomicU64,
    failures: AtomicU64,
    watch_status: ArcSwap<WatchStatus>,
    /// Serializes parse+publish so an older parse never replaces a newer one.
    writer: parking_lot::Mutex<()>,
    #[cfg(feature = "metrics")]
    metrics: Option<StoreMetrics>,
}

impl StoreShared {
    pub(crate) fn new(
        path: PathBuf,
        store_type: StoreType,
        secret: Option<Secret>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            path,
            store_type,
            secret,
            codec,
            current: ArcSwapOption::empty(),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            watch_status: ArcSwap::from_pointee(WatchStatus::Inactive),
            writer: parking_lot::Mutex::new(()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn set_metrics(&mut self, metrics: StoreMetrics) {
        self.metrics = Some(metrics);
    }

    /// Read and parse the backing file, then publish the result.
    ///
    /// Returns the new generation, or `None` if the store closed meanwhile.
    fn refresh(&self) -> std::result::Result<Option<u64>, LoadCause> {
        let _writer = self.writer.lock();

        let bytes = std::fs::read(&self.path)?;
        let snapshot = self
            .codec
            .parse(&bytes, &self.store_type, self.secret.as_ref())?;

        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }

        self.current.store(Some(Arc::new(snapshot)));
        Ok(Some(self.generation.fetch_add(1, Ordering::AcqRel) + 1))
    }

    /// Background reload in response to a change notification.
    ///
    /// Failures are contained here; the previous snapshot stays active.
    fn reload_in_background(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(StoreMetrics::start_reload);

        match self.refresh() {
            Ok(Some(generation)) => {
                self.reloads.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_reload_success(timer, generation);
                }
                tracing::debug!(
                    path = %self.path.display(),
                    generation,
                    "credential store reloaded"
                );
            }
            Ok(None) => {}
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.record_reload_failure(timer);
                }
                let abandoned = StoreError::ReloadAbandoned {
                    path: self.path.clone(),
                    source: error,
                };
                tracing::warn!(
                    path = %self.path.display(),
                    error = %abandoned,
                    "reload abandoned, keeping previous snapshot"
                );
            }
        }
    }

    fn watch_lost(&self, reason: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_watch_lost();
        }
        tracing::error!(
            path = %self.path.display(),
            reason,
            "file watch lost, credential store will no longer refresh"
        );
        self.watch_status.store(Arc::new(WatchStatus::Lost {
            reason: reason.to_string(),
        }));
    }
}

/// Listener the store registers with the watcher.
///
/// Holds the store weakly so a forgotten registration never keeps it alive.
struct ReloadHook {
    shared: Weak<StoreShared>,
}

impl Listener for ReloadHook {
    fn notify(&self, notification: &Notification) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match notification {
            Notification::Modified => shared.reload_in_background(),
            Notification::WatchLost { reason } => shared.watch_lost(reason),
        }
    }
}

/// This store's entry in the watcher.
struct Registration {
    watcher: Watcher,
    target: WatchTarget,
    listener: Arc<dyn Listener>,
}

/// How the store obtains its watcher.
pub(crate) enum WatchMode {
    Disabled,
    Default,
    Using(Watcher),
}

/// A file-backed credential store that refreshes itself when the file changes.
///
/// Reads capture the active [`CredentialSnapshot`] once and never block; a
/// reload only affects which snapshot later calls see. Every read observes
/// exactly one fully parsed snapshot.
///
/// The store starts `Unloaded`, becomes `Loaded` on [`load`](Self::load) and
/// `Closed` on [`close`](Self::close) (or drop).
///
/// # Examples
///
/// ```rust,no_run
/// use credstore_reload::prelude::*;
///
/// # fn example() -> Result<()> {
/// let store = ReloadableStore::open("yaml", "certs/store.yaml", None)?;
///
/// if store.contains("default")? {
///     let credential = store.get("default")?;
///     println!("chain length: {}", credential.certificate_chain().len());
/// }
///
/// store.close();
/// # Ok(())
/// # }
/// ```
pub struct ReloadableStore {
    shared: Arc<StoreShared>,
    watch_mode: WatchMode,
    require_watch: bool,
    registration: parking_lot::Mutex<Option<Registration>>,
}

impl ReloadableStore {
    pub(crate) fn from_parts(
        shared: StoreShared,
        watch_mode: WatchMode,
        require_watch: bool,
    ) -> Self {
        Self {
            shared: Arc::new(shared),
            watch_mode,
            require_watch,
            registration: parking_lot::Mutex::new(None),
        }
    }

    /// Open a store of `store_type` backed by `path`, watched by the default watcher.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` if the file cannot be read or parsed.
    pub fn open(
        store_type: &str,
        path: impl Into<PathBuf>,
        secret: Option<Secret>,
    ) -> Result<Self> {
        let mut builder = Self::builder(path).store_type(store_type);
        if let Some(secret) = secret {
            builder = builder.secret(secret);
        }
        builder.open()
    }

    /// Perform the initial synchronous load and start watching.
    ///
    /// On a store that is already loaded this refreshes the snapshot. If the
    /// watch cannot be established the store still loads and the returned
    /// status is [`WatchStatus::Static`], unless the store was built with
    /// `require_watch(true)`.
    ///
    /// # Errors
    ///
    /// - `StoreClosed` if the store has been closed
    /// - `WatchUnavailable` if watching is required but unavailable
    /// - `LoadFailed` if the file cannot be read or parsed; the store stays
    ///   unloaded and the call may be retried
    pub fn load(&self) -> Result<WatchStatus> {
        if self.is_closed() {
            return Err(StoreError::StoreClosed);
        }

        // Register before parsing so a change racing the first load is not missed
        let newly_registered = self.ensure_watching()?;

        match self.shared.refresh() {
            Ok(Some(generation)) => {
                tracing::debug!(
                    path = %self.shared.path.display(),
                    generation,
                    "credential store loaded"
                );
                Ok(self.watch_status())
            }
            Ok(None) => Err(StoreError::StoreClosed),
            Err(source) => {
                if newly_registered && self.generation() == 0 {
                    self.release_registration();
                }
                Err(StoreError::LoadFailed {
                    path: self.shared.path.clone(),
                    source,
                })
            }
        }
    }

    /// Register the reload hook if not registered yet.
    ///
    /// Returns whether this call created the registration.
    fn ensure_watching(&self) -> Result<bool> {
        let mut registration = self.registration.lock();
        if registration.is_some() {
            return Ok(false);
        }

        let watcher = match &self.watch_mode {
            WatchMode::Disabled => return Ok(false),
            WatchMode::Default => Watcher::get_default(),
            WatchMode::Using(watcher) => Ok(watcher.clone()),
        };

        let attempt = watcher.and_then(|watcher| {
            let target = WatchTarget::resolve(&self.shared.path)?;
            let listener: Arc<dyn Listener> = Arc::new(ReloadHook {
                shared: Arc::downgrade(&self.shared),
            });
            watcher.register_target(&target, Arc::clone(&listener))?;
            Ok(Registration {
                watcher,
                target,
                listener,
            })
        });

        match attempt {
            Ok(entry) => {
                *registration = Some(entry);
                self.shared
                    .watch_status
                    .store(Arc::new(WatchStatus::Watching));
                Ok(true)
            }
            Err(reason) if self.require_watch => Err(StoreError::WatchUnavailable(reason)),
            Err(reason) => {
                tracing::warn!(
                    path = %self.shared.path.display(),
                    error = %reason,
                    "file watch unavailable, serving a static credential store"
                );
                self.shared
                    .watch_status
                    .store(Arc::new(WatchStatus::Static { reason }));
                Ok(false)
            }
        }
    }

    fn release_registration(&self) {
        if let Some(entry) = self.registration.lock().take() {
            entry
                .watcher
                .deregister_target(&entry.target, &entry.listener);
        }
        self.shared
            .watch_status
            .store(Arc::new(WatchStatus::Inactive));
    }

    /// Re-read the backing file now.
    ///
    /// # Errors
    ///
    /// Returns `ReloadAbandoned` if the file cannot be read or parsed; the
    /// previous snapshot remains active. Returns `StoreClosed` after close
    /// and `NotLoaded` before the first load.
    pub fn reload(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::StoreClosed);
        }
        if self.generation() == 0 {
            return Err(StoreError::NotLoaded);
        }

        match self.shared.refresh() {
            Ok(Some(_)) => {
                self.shared.reloads.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(None) => Err(StoreError::StoreClosed),
            Err(source) => {
                self.shared.failures.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::ReloadAbandoned {
                    path: self.shared.path.clone(),
                    source,
                })
            }
        }
    }

    /// The active snapshot, for several reads against one consistent view.
    ///
    /// # Errors
    ///
    /// Returns `StoreClosed` after close and `NotLoaded` before the first load.
    pub fn snapshot(&self) -> Result<Arc<CredentialSnapshot>> {
        let snapshot = self.shared.current.load_full();
        if self.is_closed() {
            return Err(StoreError::StoreClosed);
        }
        snapshot.ok_or(StoreError::NotLoaded)
    }

    /// Whether an entry exists for `alias`.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.snapshot()?.contains(alias))
    }

    /// The entry for `alias`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such alias, otherwise see
    /// [`snapshot`](Self::snapshot).
    pub fn get(&self, alias: &str) -> Result<Credential> {
        self.snapshot()?
            .get(alias)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))
    }

    /// All aliases in the active snapshot, sorted.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub fn aliases(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.aliases().map(str::to_string).collect())
    }

    /// Number of entries in the active snapshot.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Whether `alias` holds key material. Unknown aliases are not key entries.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub fn is_key_entry(&self, alias: &str) -> Result<bool> {
        Ok(self
            .snapshot()?
            .get(alias)
            .is_some_and(Credential::is_key_entry))
    }

    /// Whether `alias` is a trusted certificate.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub fn is_certificate_entry(&self, alias: &str) -> Result<bool> {
        Ok(self
            .snapshot()?
            .get(alias)
            .is_some_and(Credential::is_certificate_entry))
    }

    /// Certificates held under `alias`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such alias, otherwise see
    /// [`snapshot`](Self::snapshot).
    pub fn certificate_chain(&self, alias: &str) -> Result<Vec<String>> {
        self.get(alias).map(|c| c.certificate_chain().to_vec())
    }

    /// Stop watching and release the active snapshot. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.release_registration();
        {
            // An in-flight refresh either publishes before this or sees `closed`
            let _writer = self.shared.writer.lock();
            self.shared.current.store(None);
        }
        tracing::debug!(path = %self.shared.path.display(), "credential store closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of snapshots published so far; 0 until the first load.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Current watch state.
    pub fn watch_status(&self) -> WatchStatus {
        self.shared.watch_status.load_full().as_ref().clone()
    }

    /// Background reload counters.
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            reloads: self.shared.reloads.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// The backing file as configured.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// The store type handed to the codec.
    pub fn store_type(&self) -> &StoreType {
        &self.shared.store_type
    }
}

impl Drop for ReloadableStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ReloadableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadableStore")
            .field("path", &self.shared.path)
            .field("store_type", &self.shared.store_type)
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}
