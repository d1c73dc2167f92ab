//! Listener bookkeeping for a single watched path.

use super::Listener;
use parking_lot::RwLock;
use std::sync::Arc;

/// Identity of a listener: the address of its shared allocation.
fn identity(listener: &Arc<dyn Listener>) -> *const () {
    Arc::as_ptr(listener) as *const ()
}

/// The set of listeners registered for one watch target.
///
/// A listener appears at most once; its length is the target's reference count.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ListenerSet {
    /// Add a listener. Returns `false` if it was already registered.
    pub(crate) fn insert(&self, listener: Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.write();
        let id = identity(&listener);
        if listeners.iter().any(|l| identity(l) == id) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.write();
        let id = identity(listener);
        let before = listeners.len();
        listeners.retain(|l| identity(l) != id);
        listeners.len() != before
    }

    /// Owned copy of the current listeners, for dispatch outside the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}
