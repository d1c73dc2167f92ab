//! Change watching and notification fan-out.
//!
//! Provides a process-wide [`Watcher`] that observes backing files, debounces
//! raw events and notifies every registered [`Listener`].

pub mod config;
mod debounce;
mod listener;
mod registry;
pub mod source;
mod watcher;

pub use config::{ObserveMode, WatcherConfig};
pub use listener::{Listener, Notification};
pub use source::{EventSource, NotifySource, Observation, RawEvent, RawEventSink};
pub use watcher::{WatchTarget, Watcher};
