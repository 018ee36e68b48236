//! Typed observer registry with explicit subscribe/unsubscribe.
//!
//! Fan-out always happens on a snapshot taken outside the registry lock, so an
//! observer may subscribe or unsubscribe from inside its own callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

pub struct ObserverRegistry<T: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(SubscriptionId, Arc<T>)>>,
}

impl<T: ?Sized> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, observer));
        id
    }

    /// Returns `false` if `id` was not registered (already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Observers in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for observer in self.snapshot() {
            f(&observer);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for ObserverRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
