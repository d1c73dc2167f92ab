//! Builder for constructing ReloadableStore instances.

use crate::codec::{Codec, ConfigCodec, Secret, StoreType};
use crate::core::ReloadableStore;
use crate::core::store::{StoreShared, WatchMode};
use crate::error::{Result, StoreError};
use crate::notify::Watcher;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::Meter;

/// Builder for a [`ReloadableStore`].
///
/// By default the store type is inferred from the file extension, documents
/// are parsed with [`ConfigCodec`] and the process-wide default [`Watcher`]
/// tracks the file.
///
/// # Examples
///
/// ```rust,no_run
/// use credstore_reload::prelude::*;
///
/// # fn example() -> Result<()> {
/// let store = ReloadableStore::builder("certs/store.json")
///     .secret(Secret::new("changeit"))
///     .require_watch(true)
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct ReloadableStoreBuilder {
    path: PathBuf,
    store_type: Option<StoreType>,
    secret: Option<Secret>,
    codec: Option<Arc<dyn Codec>>,
    watcher: Option<Watcher>,
    watch: bool,
    require_watch: bool,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl ReloadableStoreBuilder {
    /// Create a builder for the store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store_type: None,
            secret: None,
            codec: None,
            watcher: None,
            watch: true,
            require_watch: false,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Set the store type explicitly instead of inferring it from the extension.
    pub fn store_type(mut self, store_type: impl Into<StoreType>) -> Self {
        self.store_type = Some(store_type.into());
        self
    }

    /// Secret handed to the codec on every parse.
    pub fn secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Use a custom codec for the store contents.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Use a specific watcher instead of the process-wide default.
    pub fn watcher(mut self, watcher: Watcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Enable or disable file watching. Enabled by default.
    ///
    /// An unwatched store only changes through [`ReloadableStore::reload`].
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Fail the load with `WatchUnavailable` instead of serving a static store
    /// when the file cannot be watched.
    pub fn require_watch(mut self, required: bool) -> Self {
        self.require_watch = required;
        self
    }

    /// Record reload metrics with `meter`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Build an unloaded store.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` if no store type was given and none can be
    /// inferred from the file extension.
    pub fn build(self) -> Result<ReloadableStore> {
        let store_type = match self.store_type {
            Some(store_type) => store_type,
            None => StoreType::from_path(&self.path).ok_or_else(|| {
                StoreError::UnsupportedType(format!(
                    "cannot infer store type of {}",
                    self.path.display()
                ))
            })?,
        };
        let codec = self.codec.unwrap_or_else(|| Arc::new(ConfigCodec));

        #[cfg(feature = "metrics")]
        let metrics = self
            .meter
            .map(|meter| crate::metrics::StoreMetrics::new(meter, self.path.display().to_string()));

        #[cfg_attr(not(feature = "metrics"), allow(unused_mut))]
        let mut shared = StoreShared::new(self.path, store_type, self.secret, codec);

        #[cfg(feature = "metrics")]
        if let Some(metrics) = metrics {
            shared.set_metrics(metrics);
        }

        let watch_mode = match (self.watch, self.watcher) {
            (false, _) => WatchMode::Disabled,
            (true, Some(watcher)) => WatchMode::Using(watcher),
            (true, None) => WatchMode::Default,
        };

        Ok(ReloadableStore::from_parts(
            shared,
            watch_mode,
            self.require_watch,
        ))
    }

    /// Build the store and perform the initial load.
    ///
    /// # Errors
    ///
    /// Everything [`build`](Self::build) and [`ReloadableStore::load`] return.
    pub fn open(self) -> Result<ReloadableStore> {
        let store = self.build()?;
        store.load()?;
        Ok(store)
    }
}

impl ReloadableStore {
    /// Create a builder for the store backed by `path`.
    pub fn builder(path: impl Into<PathBuf>) -> ReloadableStoreBuilder {
        ReloadableStoreBuilder::new(path)
    }
}
