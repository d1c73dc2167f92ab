//! Change watcher settings.

use crate::error::WatchError;
use config::Environment;
use serde::Deserialize;
use std::time::Duration;

/// Environment prefix for watcher settings (e.g. `CREDSTORE_WATCH_DEBOUNCE_MS`).
pub const ENV_PREFIX: &str = "CREDSTORE_WATCH";

/// How raw change events are sourced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserveMode {
    /// Native OS notifications, falling back to polling if unavailable.
    #[default]
    Native,
    /// Periodic polling of file metadata.
    Poll,
}

/// Settings for a [`Watcher`](crate::notify::Watcher).
///
/// # Examples
///
/// ```rust
/// use credstore_reload::notify::{ObserveMode, WatcherConfig};
/// use std::time::Duration;
///
/// let config = WatcherConfig::default()
///     .with_debounce(Duration::from_millis(250))
///     .with_mode(ObserveMode::Poll);
/// assert_eq!(config.debounce(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period that closes a debounce window, in milliseconds.
    pub debounce_ms: u64,
    /// Event sourcing mode.
    pub mode: ObserveMode,
    /// Poll interval when polling, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            mode: ObserveMode::Native,
            poll_interval_ms: 1000,
        }
    }
}

impl WatcherConfig {
    /// Load settings from `CREDSTORE_WATCH_*` environment variables over the defaults.
    ///
    /// `CREDSTORE_WATCH_DEBOUNCE_MS=250` and `CREDSTORE_WATCH_MODE=poll` are
    /// typical overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value of the wrong type.
    pub fn from_env() -> Result<Self, WatchError> {
        let env_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        config::Config::builder()
            .add_source(env_source)
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| {
                WatchError::unavailable(ENV_PREFIX, format!("invalid watcher settings: {}", e))
            })
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    /// Set the observation mode.
    pub fn with_mode(mut self, mode: ObserveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
