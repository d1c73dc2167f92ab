//! Error types for credstore-reload.

use std::path::PathBuf;

/// Result type alias for credential store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a [`ReloadableStore`](crate::core::ReloadableStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The initial load could not produce a usable snapshot.
    #[error("Failed to load credential store {}: {source}", path.display())]
    LoadFailed {
        /// Path of the backing file
        path: PathBuf,
        /// Underlying filesystem or codec failure
        #[source]
        source: LoadCause,
    },

    /// Registration with the change watcher could not be established.
    #[error(transparent)]
    WatchUnavailable(#[from] WatchError),

    /// A reload failed after the store was live; the previous snapshot is kept.
    #[error("Reload of {} abandoned: {source}", path.display())]
    ReloadAbandoned {
        /// Path of the backing file
        path: PathBuf,
        /// Underlying filesystem or codec failure
        #[source]
        source: LoadCause,
    },

    /// The store was used after it had been closed.
    #[error("Credential store has been closed")]
    StoreClosed,

    /// The store was read before its first successful load.
    #[error("Credential store has not been loaded")]
    NotLoaded,

    /// No entry exists for the requested alias.
    #[error("No entry for alias '{0}'")]
    NotFound(String),

    /// The store type could not be determined for the backing file.
    #[error("Unsupported store type: {0}")]
    UnsupportedType(String),
}

/// Why a load or reload could not produce a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LoadCause {
    /// The backing file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The codec rejected the file contents.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Errors produced by a [`Codec`](crate::codec::Codec).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The codec does not understand this store type.
    #[error("Unsupported store type '{0}'")]
    UnsupportedType(String),

    /// The file contents are not in the expected text encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The file contents could not be parsed into credential entries.
    #[error("Malformed credential store: {0}")]
    Malformed(String),
}

/// Errors from the change watcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// No observation could be established for the path.
    #[error("Cannot watch {}: {reason}", path.display())]
    Unavailable {
        /// Path that was requested
        path: PathBuf,
        /// Why the observation failed
        reason: String,
    },

    /// The watcher has been shut down and accepts no new registrations.
    #[error("Change watcher has been shut down")]
    Shutdown,
}

impl WatchError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Unavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
