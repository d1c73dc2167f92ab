//! Credential snapshots and the reloadable store handle.

mod builder;
mod snapshot;
mod store;

pub use builder::ReloadableStoreBuilder;
pub use snapshot::{Credential, CredentialSnapshot};
pub use store::{ReloadStats, ReloadableStore, WatchStatus};
