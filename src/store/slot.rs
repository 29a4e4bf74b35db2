use std::{
    any::Any,
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use super::AssociationStore;

static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-object storage that [`SlotStore`]s attach their values to.
///
/// Embed one of these in a host type and expose it through [`SlotHost`]. Every store gets its
/// own slot, so several stores can associate values with the same object independently.
#[derive(Default)]
pub struct AssociationSlots {
    slots: Mutex<HashMap<u64, Box<dyn Any + Send>>>,
}

impl AssociationSlots {
    /// Creates an empty set of slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stores holding a value in this object.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no store holds a value in this object.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Box<dyn Any + Send>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AssociationSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationSlots")
            .field("slots", &self.len())
            .finish()
    }
}

/// An object able to carry values on behalf of [`SlotStore`]s.
pub trait SlotHost {
    /// Returns the object's slots.
    fn association_slots(&self) -> &AssociationSlots;
}

/// An association store which keeps each value inside its key object.
///
/// The value lives exactly as long as the key does, without the store holding any reference
/// to the key. Values left behind when a store is dropped are released with their keys.
pub struct SlotStore<V> {
    id: u64,
    phantom: PhantomData<fn() -> V>,
}

impl<V> SlotStore<V> {
    /// Creates a store with a slot id no other store in the process uses.
    pub fn new() -> Self {
        SlotStore {
            id: STORE_COUNTER.fetch_add(1, Ordering::Relaxed),
            phantom: PhantomData,
        }
    }

    /// The id of the slot this store uses in each object.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<V> Default for SlotStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for SlotStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore").field("id", &self.id).finish()
    }
}

impl<K, V> AssociationStore<K, V> for SlotStore<V>
where
    K: SlotHost + ?Sized,
    V: Send + 'static,
{
    fn set(&mut self, key: &Arc<K>, value: V) {
        key.association_slots().lock().insert(self.id, Box::new(value));
    }

    fn delete(&mut self, key: &Arc<K>) -> bool {
        key.association_slots().lock().remove(&self.id).is_some()
    }

    fn has(&self, key: &Arc<K>) -> bool {
        key.association_slots()
            .lock()
            .get(&self.id)
            .is_some_and(|slot| slot.is::<V>())
    }

    fn with<R>(&self, key: &Arc<K>, f: impl FnOnce(&V) -> R) -> Option<R> {
        let slots = key.association_slots().lock();
        slots
            .get(&self.id)
            .and_then(|slot| slot.downcast_ref::<V>())
            .map(f)
    }

    fn with_mut<R>(&mut self, key: &Arc<K>, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut slots = key.association_slots().lock();
        slots
            .get_mut(&self.id)
            .and_then(|slot| slot.downcast_mut::<V>())
            .map(f)
    }
}
