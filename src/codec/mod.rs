//! Credential store codecs.
//!
//! A codec turns the raw bytes of a backing file into a [`CredentialSnapshot`].
//! The store never interprets credential bytes itself.

mod document;

pub use document::ConfigCodec;

use crate::core::CredentialSnapshot;
use crate::error::ParseError;
use std::fmt;
use std::path::Path;

/// Parses backing-file bytes into a credential snapshot.
///
/// Implementations must be safe to call from the watcher's background
/// dispatch threads.
pub trait Codec: Send + Sync {
    /// Parse `bytes` as a store of the given type.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the type is unsupported or the bytes are malformed.
    fn parse(
        &self,
        bytes: &[u8],
        store_type: &StoreType,
        secret: Option<&Secret>,
    ) -> Result<CredentialSnapshot, ParseError>;
}

/// Type hint passed to the codec (e.g. `yaml`, `json`, `jks`).
///
/// Stored lowercase so that `"YAML"` and `"yaml"` are the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreType(String);

impl StoreType {
    /// Create a store type from a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    /// Infer the store type from a file extension.
    ///
    /// Returns `None` when the path has no extension.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use credstore_reload::codec::StoreType;
    ///
    /// let ty = StoreType::from_path("certs/server.yml").unwrap();
    /// assert_eq!(ty.as_str(), "yml");
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(Self::new)
    }

    /// The normalized type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Store password handed to the codec.
///
/// The `Debug` representation never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
