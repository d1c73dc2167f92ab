//! Built-in metrics for credential store reloads.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts/success/failures
//! - Reload duration
//! - Watch losses
//! - Snapshot generation
//!
//! # Examples
//!
//! ```rust,no_run
//! use credstore_reload::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let store = ReloadableStore::builder("certs/store.yaml")
//!     .with_metrics(global::meter("my-app"))
//!     .open()?;
//! # Ok(())
//! # }
//! ```

mod store_metrics;

pub use store_metrics::StoreMetrics;
