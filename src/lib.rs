//! # credstore-reload
//!
//! File-backed credential stores that refresh themselves when the file changes.
//!
//! ## Overview
//!
//! `credstore-reload` keeps an in-memory view of a credential store file
//! (keys, certificate chains, trusted certificates) in sync with the file on
//! disk:
//! - Lock-free reads of an immutable snapshot using `arc-swap`
//! - A shared change [`Watcher`](notify::Watcher) that observes each file once
//!   and debounces bursts of raw events
//! - Reloads that never expose a partially parsed store; a failed reload keeps
//!   the previous snapshot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use credstore_reload::prelude::*;
//!
//! # fn example() -> credstore_reload::error::Result<()> {
//! // Initial synchronous load; later edits to the file are picked up automatically
//! let store = ReloadableStore::open("yaml", "certs/server.yaml", None)?;
//!
//! let credential = store.get("default")?;
//! println!("chain length: {}", credential.certificate_chain().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Store documents
//!
//! The built-in [`ConfigCodec`](codec::ConfigCodec) reads YAML, TOML and JSON
//! documents with a top-level `entries` table keyed by alias:
//!
//! ```yaml
//! entries:
//!   default:
//!     kind: private_key
//!     key: "..."
//!     certificate_chain: ["...", "..."]
//!   root-ca:
//!     kind: trusted_certificate
//!     certificate: "..."
//! ```
//!
//! Other formats plug in through the [`Codec`](codec::Codec) trait.
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry reload metrics via
//!   [`ReloadableStoreBuilder::with_metrics`](core::ReloadableStoreBuilder)

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod codec;
pub mod core;
pub mod error;
pub mod notify;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::codec::{Secret, StoreType};
    pub use crate::core::{
        Credential, CredentialSnapshot, ReloadStats, ReloadableStore, ReloadableStoreBuilder,
        WatchStatus,
    };
    pub use crate::error::{Result, StoreError};
    pub use crate::notify::{Listener, Notification, Watcher, WatcherConfig};
}
