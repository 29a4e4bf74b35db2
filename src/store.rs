//! Identity-keyed association stores.
//!
//! An association store maps a shared object to a value without keeping the object alive.
//! The registry keeps each target's registration set in one of these, so dropping a target
//! drops its registrations along with it.
//!
//! Two implementations are provided:
//! - [`WeakTable`]: a side table keyed by object address holding a weak reference to each key.
//!   This is the default.
//! - [`SlotStore`]: stores the value inside the key object itself, in a slot the object exposes
//!   through [`SlotHost`]. Useful when the host objects already carry per-object storage.

mod slot;
mod weak_table;

use std::sync::Arc;

pub use slot::*;
pub use weak_table::*;

/// A key→value table keyed by the identity of an `Arc<K>`, which never owns its keys.
///
/// Each key has at most one entry; a later [`set`](AssociationStore::set) overwrites it.
pub trait AssociationStore<K: ?Sized, V> {
    /// Associates `value` with `key`, replacing any previous value.
    fn set(&mut self, key: &Arc<K>, value: V);

    /// Returns `true` if `key` has an associated value, removing it.
    fn delete(&mut self, key: &Arc<K>) -> bool;

    /// Returns `true` if `key` has an associated value.
    fn has(&self, key: &Arc<K>) -> bool;

    /// Calls `f` with the value associated with `key`, if any.
    fn with<R>(&self, key: &Arc<K>, f: impl FnOnce(&V) -> R) -> Option<R>;

    /// Calls `f` with a mutable reference to the value associated with `key`, if any.
    fn with_mut<R>(&mut self, key: &Arc<K>, f: impl FnOnce(&mut V) -> R) -> Option<R>;

    /// Returns a clone of the value associated with `key`.
    fn get(&self, key: &Arc<K>) -> Option<V>
    where
        V: Clone,
    {
        self.with(key, V::clone)
    }

    /// Drops entries whose keys no longer exist, returning how many were dropped.
    ///
    /// Stores which release entries together with their keys have nothing to do here.
    fn purge(&mut self) -> usize {
        0
    }
}
