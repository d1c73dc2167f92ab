//! Change listener capability.

/// A logical notification delivered to listeners after debouncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The watched file changed.
    Modified,
    /// The underlying observation was lost; no further changes will be seen.
    WatchLost {
        /// Why the observation was lost
        reason: String,
    },
}

/// Receives change notifications for a watched path.
///
/// Callbacks run on a background dispatch thread. They must not block
/// indefinitely. A panicking listener is logged and does not affect delivery
/// to other listeners.
///
/// Any `Fn(&Notification) + Send + Sync` closure is a listener.
///
/// # Examples
///
/// ```rust
/// use credstore_reload::notify::{Listener, Notification};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// let listener: Arc<dyn Listener> = Arc::new(move |n: &Notification| {
///     if *n == Notification::Modified {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// listener.notify(&Notification::Modified);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub trait Listener: Send + Sync + 'static {
    /// Handle one notification.
    fn notify(&self, notification: &Notification);
}

impl<F> Listener for F
where
    F: Fn(&Notification) + Send + Sync + 'static,
{
    fn notify(&self, notification: &Notification) {
        self(notification)
    }
}
