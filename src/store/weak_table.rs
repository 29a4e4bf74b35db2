use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use tracing::trace;

use crate::target::identity;

use super::AssociationStore;

const MIN_SWEEP_AT: usize = 16;

/// A side table keyed by object address, holding only a [`Weak`] reference to each key.
///
/// An entry whose key has been dropped is treated as absent, even if a new object later
/// occupies the same address. Dead entries are swept when the table grows past a threshold,
/// or explicitly with [`purge`](AssociationStore::purge).
pub struct WeakTable<K: ?Sized, V> {
    entries: HashMap<usize, Entry<K, V>>,
    sweep_at: usize,
}

struct Entry<K: ?Sized, V> {
    key: Weak<K>,
    value: V,
}

impl<K: ?Sized, V> Entry<K, V> {
    fn is_live(&self) -> bool {
        self.key.strong_count() > 0
    }
}

impl<K: ?Sized, V> WeakTable<K, V> {
    /// Creates a new empty table.
    pub fn new() -> Self {
        WeakTable {
            entries: HashMap::new(),
            sweep_at: MIN_SWEEP_AT,
        }
    }

    /// The number of entries whose keys are still alive.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_live()).count()
    }

    /// Returns `true` if no live key has an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &Arc<K>) -> Option<&Entry<K, V>> {
        self.entries
            .get(&identity(key))
            .filter(|entry| entry.is_live())
    }

    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        let swept = before - self.entries.len();
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_AT);
        if swept > 0 {
            trace!(swept, "swept dead weak table entries");
        }
        swept
    }
}

impl<K: ?Sized, V> AssociationStore<K, V> for WeakTable<K, V> {
    fn set(&mut self, key: &Arc<K>, value: V) {
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
        self.entries.insert(
            identity(key),
            Entry {
                key: Arc::downgrade(key),
                value,
            },
        );
    }

    fn delete(&mut self, key: &Arc<K>) -> bool {
        self.entries
            .remove(&identity(key))
            .is_some_and(|entry| entry.is_live())
    }

    fn has(&self, key: &Arc<K>) -> bool {
        self.live(key).is_some()
    }

    fn with<R>(&self, key: &Arc<K>, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.live(key).map(|entry| f(&entry.value))
    }

    fn with_mut<R>(&mut self, key: &Arc<K>, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.entries
            .get_mut(&identity(key))
            .filter(|entry| entry.is_live())
            .map(|entry| f(&mut entry.value))
    }

    fn purge(&mut self) -> usize {
        self.sweep()
    }
}

impl<K: ?Sized, V> Default for WeakTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V> fmt::Debug for WeakTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTable")
            .field("entries", &self.entries.len())
            .field("sweep_at", &self.sweep_at)
            .finish()
    }
}
