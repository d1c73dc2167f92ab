//! Raw change-event sources.
//!
//! The watcher consumes file events through the minimal [`EventSource`]
//! interface; [`NotifySource`] implements it with the `notify` crate.

use super::WatchTarget;
use super::config::{ObserveMode, WatcherConfig};
use crate::error::WatchError;
use notify::{
    Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher as NotifyWatcher,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// A raw, un-debounced signal for one watch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Something happened to the watched file.
    Changed,
    /// The observation can no longer deliver events.
    Lost(String),
}

/// Sending half handed to an event source for one target.
#[derive(Debug, Clone)]
pub struct RawEventSink {
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl RawEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RawEvent>) -> Self {
        Self { tx }
    }

    /// Report a raw change.
    pub fn changed(&self) {
        let _ = self.tx.send(RawEvent::Changed);
    }

    /// Report that the observation was lost.
    pub fn lost(&self, reason: impl Into<String>) {
        let _ = self.tx.send(RawEvent::Lost(reason.into()));
    }

    /// Whether the receiving watcher has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live observation. Dropping it releases the underlying resources.
pub trait Observation: Send + Sync {}

/// Something that can observe a path and report raw change signals.
pub trait EventSource: Send + Sync {
    /// Start observing `target`, reporting into `sink` until the returned
    /// observation is dropped.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Unavailable` if the path cannot be observed.
    fn observe(
        &self,
        target: &WatchTarget,
        sink: RawEventSink,
    ) -> Result<Box<dyn Observation>, WatchError>;
}

/// Keeps a `notify` watcher alive for as long as the observation is held.
struct NotifyObservation<W>(W);

impl<W: NotifyWatcher + Send + Sync> Observation for NotifyObservation<W> {}

/// Event source built on the `notify` crate.
///
/// Watches the target's parent directory and filters by file name, so that
/// rename-based saves and delete/recreate cycles keep being observed.
#[derive(Debug, Clone)]
pub struct NotifySource {
    mode: ObserveMode,
    poll_interval: Duration,
}

impl NotifySource {
    /// Create a source in the given mode.
    pub fn new(mode: ObserveMode, poll_interval: Duration) -> Self {
        Self {
            mode,
            poll_interval,
        }
    }

    /// Create a source from watcher settings.
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.mode, config.poll_interval())
    }

    fn start_native(
        &self,
        target: &WatchTarget,
        sink: RawEventSink,
    ) -> notify::Result<Box<dyn Observation>> {
        let mut watcher = RecommendedWatcher::new(handler(target, sink), NotifyConfig::default())?;
        watcher.watch(target.dir(), RecursiveMode::NonRecursive)?;
        Ok(Box::new(NotifyObservation(watcher)))
    }

    fn start_poll(
        &self,
        target: &WatchTarget,
        sink: RawEventSink,
    ) -> notify::Result<Box<dyn Observation>> {
        let config = NotifyConfig::default().with_poll_interval(self.poll_interval);
        let mut watcher = PollWatcher::new(handler(target, sink), config)?;
        watcher.watch(target.dir(), RecursiveMode::NonRecursive)?;
        Ok(Box::new(NotifyObservation(watcher)))
    }
}

impl Default for NotifySource {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}

impl EventSource for NotifySource {
    fn observe(
        &self,
        target: &WatchTarget,
        sink: RawEventSink,
    ) -> Result<Box<dyn Observation>, WatchError> {
        let observation = match self.mode {
            ObserveMode::Native => self.start_native(target, sink.clone()).or_else(|e| {
                tracing::warn!(
                    path = %target,
                    error = %e,
                    "native file watching unavailable, falling back to polling"
                );
                self.start_poll(target, sink)
            }),
            ObserveMode::Poll => self.start_poll(target, sink),
        };

        observation.map_err(|e| WatchError::unavailable(target.path(), e))
    }
}

/// Build the `notify` callback that turns events for `target` into raw signals.
fn handler(
    target: &WatchTarget,
    sink: RawEventSink,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    let dir = target.dir().to_path_buf();
    let file_name = target.file_name().map(|n| n.to_os_string());

    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if let Some(raw) = classify(&event, &dir, file_name.as_deref()) {
                match raw {
                    RawEvent::Changed => sink.changed(),
                    RawEvent::Lost(reason) => sink.lost(reason),
                }
            }
        }
        Err(e) => sink.lost(e.to_string()),
    }
}

/// Decide what a `notify` event means for one file in `dir`.
fn classify(event: &Event, dir: &Path, file_name: Option<&std::ffi::OsStr>) -> Option<RawEvent> {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    if !relevant {
        return None;
    }

    if matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| p == dir) {
        return Some(RawEvent::Lost(format!(
            "watched directory {} was removed",
            dir.display()
        )));
    }

    let touches_file = event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == file_name);

    touches_file.then_some(RawEvent::Changed)
}

/// Directory of a path, treating a bare file name as the current directory.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
    use std::ffi::OsStr;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_classify_matching_file() {
        let dir = Path::new("/creds");
        let name = Some(OsStr::new("store.yaml"));

        let modify = event(EventKind::Modify(ModifyKind::Any), "/creds/store.yaml");
        assert_eq!(classify(&modify, dir, name), Some(RawEvent::Changed));

        let create = event(EventKind::Create(CreateKind::File), "/creds/store.yaml");
        assert_eq!(classify(&create, dir, name), Some(RawEvent::Changed));

        let rename = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            "/creds/store.yaml",
        );
        assert_eq!(classify(&rename, dir, name), Some(RawEvent::Changed));
    }

    #[test]
    fn test_classify_ignores_siblings_and_access() {
        let dir = Path::new("/creds");
        let name = Some(OsStr::new("store.yaml"));

        let sibling = event(EventKind::Modify(ModifyKind::Any), "/creds/temp.yaml");
        assert_eq!(classify(&sibling, dir, name), None);

        let access = event(
            EventKind::Access(notify::event::AccessKind::Any),
            "/creds/store.yaml",
        );
        assert_eq!(classify(&access, dir, name), None);
    }

    #[test]
    fn test_classify_directory_removal_is_lost() {
        let dir = Path::new("/creds");
        let name = Some(OsStr::new("store.yaml"));

        let removed = event(EventKind::Remove(RemoveKind::Folder), "/creds");
        assert!(matches!(
            classify(&removed, dir, name),
            Some(RawEvent::Lost(_))
        ));
    }

    #[test]
    fn test_sink_reports_into_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = RawEventSink::new(tx);

        sink.changed();
        sink.lost("gone");

        assert_eq!(rx.try_recv().unwrap(), RawEvent::Changed);
        assert_eq!(rx.try_recv().unwrap(), RawEvent::Lost("gone".to_string()));

        drop(rx);
        assert!(sink.is_closed());
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("/a/b/store.yaml")), PathBuf::from("/a/b"));
        assert_eq!(parent_dir(Path::new("store.yaml")), PathBuf::from("."));
    }
}
