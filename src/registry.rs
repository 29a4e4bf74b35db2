//! Registry of tracked listener registrations.
//!
//! Every registration made through a [`HandlerRegistry`] is recorded against its target under a
//! unique [`Handle`] and forwarded to the target's native [`Subscribe::subscribe`]. The registry
//! can then list, count and query a target's registrations, remove one precisely by handle, and
//! move all of them from one target to another.
//!
//! # Ordering
//!
//! Registry state sits behind a single mutex which is never held while calling into the
//! target. Adds record the registration before subscribing natively, removes forget it before
//! unsubscribing natively, so native code may call back into the registry and will always see
//! a consistent state.
//!
//! ```
//! use std::sync::Arc;
//! use tether::{Callback, HandlerRegistry, Subscribe};
//!
//! struct Button;
//!
//! impl Subscribe for Button {
//!     type Event = ();
//!     type Options = bool;
//!
//!     fn subscribe(&self, _: &str, _: &Callback<()>, _: Option<&bool>) {}
//!     fn unsubscribe(&self, _: &str, _: &Callback<()>, _: Option<&bool>) {}
//! }
//!
//! let registry = HandlerRegistry::new();
//! let button = Arc::new(Button);
//! let handle = registry.add_registration(&button, "click", Callback::new(|_| {}), None)?;
//! assert_eq!(registry.count_registrations(&button), 1);
//!
//! registry.remove_registration(&handle)?;
//! assert!(registry.list_registrations(&button).is_empty());
//! # Ok::<(), tether::RegistryError>(())
//! ```

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use indexmap::IndexMap;
use tracing::{error, trace, warn};

use crate::{
    config::RegistryConfig,
    error::RegistryError,
    handle::{Handle, HandleSource, RandomHandles},
    store::{AssociationStore, WeakTable},
    target::{identity, weak_identity, Callback, Subscribe},
};

const MIN_SWEEP_AT: usize = 64;

/// The name of a signal a callback is registered for.
pub type SignalName = Cow<'static, str>;

/// A target's registrations grouped by signal name, as returned by
/// [`HandlerRegistry::list_registrations`].
pub type Registrations<T> = IndexMap<SignalName, Vec<RegisteredHandler<T>>>;

/// One registration as seen from [`HandlerRegistry::list_registrations`].
pub struct RegisteredHandler<T: Subscribe + ?Sized> {
    /// The handle the registration was assigned.
    pub handle: Handle,
    /// The registered callback.
    pub callback: Callback<T::Event>,
    /// The options the callback was registered with.
    pub options: Option<T::Options>,
}

impl<T: Subscribe + ?Sized> Clone for RegisteredHandler<T> {
    fn clone(&self) -> Self {
        RegisteredHandler {
            handle: self.handle.clone(),
            callback: self.callback.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T: Subscribe + ?Sized> fmt::Debug for RegisteredHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("handle", &self.handle)
            .field("callback", &self.callback)
            .field("options", &self.options)
            .finish()
    }
}

struct Registration<T: Subscribe + ?Sized> {
    name: SignalName,
    callback: Callback<T::Event>,
    options: Option<T::Options>,
}

impl<T: Subscribe + ?Sized> Registration<T> {
    fn matches(
        &self,
        name: &str,
        callback: &Callback<T::Event>,
        options: Option<&T::Options>,
    ) -> bool {
        self.name == name && self.callback == *callback && self.options.as_ref() == options
    }
}

impl<T: Subscribe + ?Sized> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Registration {
            name: self.name.clone(),
            callback: self.callback.clone(),
            options: self.options.clone(),
        }
    }
}

/// The registrations of a single target, in insertion order.
///
/// This is the value type registries keep in their [`AssociationStore`].
pub struct RegistrationSet<T: Subscribe + ?Sized> {
    records: IndexMap<Handle, Registration<T>>,
}

impl<T: Subscribe + ?Sized> RegistrationSet<T> {
    fn new() -> Self {
        RegistrationSet {
            records: IndexMap::new(),
        }
    }

    /// The number of registrations in the set.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the set holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The handles in the set, in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        self.records.keys()
    }

    fn find(
        &self,
        name: &str,
        callback: &Callback<T::Event>,
        options: Option<&T::Options>,
    ) -> Option<Handle> {
        self.records
            .iter()
            .find(|(_, record)| record.matches(name, callback, options))
            .map(|(handle, _)| handle.clone())
    }
}

impl<T: Subscribe + ?Sized> Clone for RegistrationSet<T> {
    fn clone(&self) -> Self {
        RegistrationSet {
            records: self.records.clone(),
        }
    }
}

impl<T: Subscribe + ?Sized> fmt::Debug for RegistrationSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.records
                    .iter()
                    .map(|(handle, record)| (handle, &record.name)),
            )
            .finish()
    }
}

struct IndexEntry<T: ?Sized> {
    name: SignalName,
    owner: Weak<T>,
}

impl<T: ?Sized> IndexEntry<T> {
    fn is_owned_by(&self, target: &Arc<T>) -> bool {
        weak_identity(&self.owner) == identity(target)
    }

    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

struct State<T: Subscribe + ?Sized, S> {
    store: S,
    index: HashMap<Handle, IndexEntry<T>>,
    sweep_at: usize,
    handles: Box<dyn HandleSource>,
}

impl<T, S> State<T, S>
where
    T: Subscribe + ?Sized,
    S: AssociationStore<T, RegistrationSet<T>>,
{
    fn fresh_handle(&mut self) -> Handle {
        loop {
            let handle = self.handles.next_handle();
            if !self.index.contains_key(&handle) {
                return handle;
            }
            trace!(%handle, "handle collision, drawing another");
        }
    }

    fn live_entry(&self, handle: &Handle) -> Option<&IndexEntry<T>> {
        self.index.get(handle).filter(|entry| entry.is_live())
    }

    fn live_len(&self) -> usize {
        self.index.values().filter(|entry| entry.is_live()).count()
    }

    /// Drops index entries whose targets no longer exist.
    fn sweep(&mut self) -> usize {
        let before = self.index.len();
        self.index.retain(|_, entry| entry.is_live());
        let swept = before - self.index.len();
        self.sweep_at = (self.index.len() * 2).max(MIN_SWEEP_AT);
        if swept > 0 {
            trace!(swept, "swept registrations of dropped targets");
        }
        swept
    }

    /// Forgets the registration behind `handle`, returning its owner and record.
    ///
    /// With `expected` set, a handle owned by any other target is [`RegistryError::NotFound`]
    /// and nothing changes.
    fn take(
        &mut self,
        handle: &Handle,
        expected: Option<&Arc<T>>,
    ) -> Result<(Arc<T>, Registration<T>), RegistryError> {
        let entry = self
            .index
            .get(handle)
            .ok_or_else(|| RegistryError::NotFound(handle.clone()))?;
        let Some(owner) = entry.owner.upgrade() else {
            trace!(%handle, "dropping handle whose target no longer exists");
            self.index.remove(handle);
            return Err(RegistryError::NotFound(handle.clone()));
        };
        if expected.is_some_and(|expected| identity(expected) != identity(&owner)) {
            return Err(RegistryError::NotFound(handle.clone()));
        }

        let taken = self.store.with_mut(&owner, |set| {
            set.records
                .shift_remove(handle)
                .map(|record| (record, set.is_empty()))
        });
        let Some((record, now_empty)) = taken.flatten() else {
            error!(%handle, "handle is indexed but missing from its target's registrations");
            return Err(RegistryError::InternalInconsistency {
                handle: handle.clone(),
                reason: "indexed handle missing from its target's registrations",
            });
        };

        self.index.remove(handle);
        if now_empty {
            self.store.delete(&owner);
        }
        Ok((owner, record))
    }

    /// Checks that the index agrees with `target`'s registration set in both directions.
    fn verify(&self, target: &Arc<T>, set: &RegistrationSet<T>) -> Result<(), RegistryError> {
        for handle in set.handles() {
            match self.index.get(handle) {
                Some(entry) if entry.is_owned_by(target) => {}
                Some(_) => {
                    return Err(RegistryError::InternalInconsistency {
                        handle: handle.clone(),
                        reason: "handle index names a different owner",
                    })
                }
                None => {
                    return Err(RegistryError::InternalInconsistency {
                        handle: handle.clone(),
                        reason: "registered handle missing from the handle index",
                    })
                }
            }
        }

        let stray = self
            .index
            .iter()
            .find(|(handle, entry)| entry.is_owned_by(target) && !set.records.contains_key(*handle));
        if let Some((handle, _)) = stray {
            return Err(RegistryError::InternalInconsistency {
                handle: handle.clone(),
                reason: "indexed handle missing from its target's registrations",
            });
        }

        Ok(())
    }
}

/// Tracks listener registrations across targets of type `T`.
///
/// The registry is a cheap handle to shared state; clones refer to the same registrations.
/// Per-target registration sets are kept in an [`AssociationStore`] `S`, which by default is a
/// [`WeakTable`].
pub struct HandlerRegistry<T: Subscribe + ?Sized, S = WeakTable<T, RegistrationSet<T>>> {
    state: Arc<Mutex<State<T, S>>>,
    config: RegistryConfig,
}

impl<T: Subscribe + ?Sized> HandlerRegistry<T> {
    /// Creates an empty registry using the installed configuration.
    ///
    /// See [`install`](crate::config::install).
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::installed())
    }

    /// Creates an empty registry with the given configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::from_parts(config, WeakTable::new(), RandomHandles::new())
    }
}

impl<T: Subscribe + ?Sized> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> HandlerRegistry<T, S>
where
    T: Subscribe + ?Sized,
    S: AssociationStore<T, RegistrationSet<T>> + Send + 'static,
{
    /// Creates an empty registry from a configuration, a store and a handle source.
    pub fn from_parts(config: RegistryConfig, store: S, handles: impl HandleSource) -> Self {
        HandlerRegistry {
            state: Arc::new(Mutex::new(State {
                store,
                index: HashMap::new(),
                sweep_at: MIN_SWEEP_AT,
                handles: Box::new(handles),
            })),
            config,
        }
    }

    /// The configuration the registry was created with.
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Registers `callback` for `name` on `target`, returning the registration's handle.
    ///
    /// The registration is recorded before the target's native `subscribe` is called.
    pub fn add_registration(
        &self,
        target: &Arc<T>,
        name: impl Into<SignalName>,
        callback: Callback<T::Event>,
        options: Option<T::Options>,
    ) -> Result<Handle, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "signal name must not be empty".into(),
            ));
        }

        let handle = {
            let mut state = self.lock();
            if state.index.len() >= state.sweep_at {
                state.sweep();
            }
            let handle = state.fresh_handle();
            state.index.insert(
                handle.clone(),
                IndexEntry {
                    name: name.clone(),
                    owner: Arc::downgrade(target),
                },
            );
            if !state.store.has(target) {
                state.store.set(target, RegistrationSet::new());
            }
            let record = Registration {
                name: name.clone(),
                callback: callback.clone(),
                options: options.clone(),
            };
            state.store.with_mut(target, |set| {
                set.records.insert(handle.clone(), record);
            });
            handle
        };

        trace!(%handle, %name, "added registration");
        target.subscribe(&name, &callback, options.as_ref());
        Ok(handle)
    }

    /// Removes the registration behind `handle`.
    ///
    /// Fails with [`RegistryError::NotFound`] if the handle is not live, in which case nothing
    /// changes. The registration is forgotten before the target's native `unsubscribe` is called.
    pub fn remove_registration(&self, handle: &Handle) -> Result<(), RegistryError> {
        self.remove_taken(handle, None)
    }

    /// Removes the registration behind `handle` if it belongs to `target`.
    ///
    /// Fails with [`RegistryError::NotFound`] if the handle is not live or is owned by another
    /// target. Ownership is checked under the same lock that removes the registration.
    pub fn remove_registration_from(
        &self,
        target: &Arc<T>,
        handle: &Handle,
    ) -> Result<(), RegistryError> {
        self.remove_taken(handle, Some(target))
    }

    fn remove_taken(
        &self,
        handle: &Handle,
        expected: Option<&Arc<T>>,
    ) -> Result<(), RegistryError> {
        let (target, record) = self.lock().take(handle, expected)?;
        trace!(%handle, name = %record.name, "removed registration");
        target.unsubscribe(&record.name, &record.callback, record.options.as_ref());
        Ok(())
    }

    /// Removes the first registration on `target` matching `name`, `callback` and `options`.
    ///
    /// Returns `false` if there was no such registration. With
    /// [`attempt_remove_invalid`](RegistryConfig::attempt_remove_invalid) set, the target is
    /// then asked to unsubscribe the callback natively anyway.
    ///
    /// Fails with [`RegistryError::InternalInconsistency`] if the matched registration is not
    /// indexed to `target`, in which case nothing is unsubscribed.
    pub fn remove_by_match(
        &self,
        target: &Arc<T>,
        name: &str,
        callback: &Callback<T::Event>,
        options: Option<&T::Options>,
    ) -> Result<bool, RegistryError> {
        let taken = {
            let mut state = self.lock();
            match state.store.with(target, |set| set.find(name, callback, options)) {
                None => {
                    self.diagnose("no handlers registered on this target");
                    None
                }
                Some(None) => None,
                Some(Some(handle)) => match state.take(&handle, Some(target)) {
                    Ok(taken) => Some((handle, taken)),
                    Err(RegistryError::NotFound(_)) => {
                        let err = RegistryError::InternalInconsistency {
                            handle,
                            reason: "matched registration is not indexed to its target",
                        };
                        error!(%err, "failed to remove matched registration");
                        return Err(err);
                    }
                    Err(err) => {
                        error!(%err, "failed to remove matched registration");
                        return Err(err);
                    }
                },
            }
        };

        match taken {
            Some((handle, (target, record))) => {
                trace!(%handle, name = %record.name, "removed registration by match");
                target.unsubscribe(&record.name, &record.callback, record.options.as_ref());
                Ok(true)
            }
            None => {
                self.diagnose("cannot remove handler, no match found");
                if self.config.attempt_remove_invalid {
                    self.diagnose("attempting to remove listener not accounted for");
                    target.unsubscribe(name, callback, options);
                }
                Ok(false)
            }
        }
    }

    /// Returns whether `target` has a registration for `name`.
    ///
    /// When `callback` is given, only a registration with exactly that callback and `options`
    /// counts. Passing a callback without a name is an [`InvalidArgument`](RegistryError::InvalidArgument)
    /// error. Passing neither always yields `false`.
    pub fn has_registration(
        &self,
        target: &Arc<T>,
        name: Option<&str>,
        callback: Option<&Callback<T::Event>>,
        options: Option<&T::Options>,
    ) -> Result<bool, RegistryError> {
        let Some(name) = name else {
            if callback.is_some() {
                return Err(RegistryError::InvalidArgument(
                    "signal name must be given along with a callback".into(),
                ));
            }
            return Ok(false);
        };

        let found = self.lock().store.with(target, |set| {
            set.records.values().any(|record| match callback {
                Some(callback) => record.matches(name, callback, options),
                None => record.name == name,
            })
        });
        Ok(found.unwrap_or(false))
    }

    /// Returns whether `target` has any registration for `name`.
    pub fn has_signal(&self, target: &Arc<T>, name: &str) -> bool {
        self.lock()
            .store
            .with(target, |set| set.records.values().any(|record| record.name == name))
            .unwrap_or(false)
    }

    /// Lists `target`'s registrations grouped by signal name.
    ///
    /// Groups appear in the order their first registration was made, and registrations within
    /// a group in insertion order.
    pub fn list_registrations(&self, target: &Arc<T>) -> Registrations<T> {
        let mut grouped: Registrations<T> = IndexMap::new();
        self.lock().store.with(target, |set| {
            for (handle, record) in &set.records {
                grouped
                    .entry(record.name.clone())
                    .or_default()
                    .push(RegisteredHandler {
                        handle: handle.clone(),
                        callback: record.callback.clone(),
                        options: record.options.clone(),
                    });
            }
        });
        grouped
    }

    /// The number of registrations on `target`.
    pub fn count_registrations(&self, target: &Arc<T>) -> usize {
        self.lock()
            .store
            .with(target, RegistrationSet::len)
            .unwrap_or(0)
    }

    /// Returns `true` if `handle` belongs to a live registration on `target`.
    pub fn is_registered_on(&self, target: &Arc<T>, handle: &Handle) -> bool {
        self.lock()
            .live_entry(handle)
            .is_some_and(|entry| entry.is_owned_by(target))
    }

    /// Moves every registration on `source` over to `destination`, in their original order.
    ///
    /// Each registration is added to `destination` and, when `detach_source` is set, then
    /// removed from `source`. Returns `false` if `source` had nothing to migrate.
    ///
    /// Registrations removed from `source` while the migration runs, for instance by native
    /// code reacting to the new subscriptions, are skipped rather than failing the migration.
    ///
    /// Fails with [`RegistryError::InternalInconsistency`] before migrating anything if the
    /// handle index and `source`'s registrations disagree.
    pub fn migrate_registrations(
        &self,
        source: &Arc<T>,
        destination: &Arc<T>,
        detach_source: bool,
    ) -> Result<bool, RegistryError> {
        let snapshot = {
            let state = self.lock();
            let verified = state.store.with(source, |set| {
                state.verify(source, set)?;
                Ok::<_, RegistryError>(set
                    .records
                    .iter()
                    .map(|(handle, record)| (handle.clone(), record.clone()))
                    .collect::<Vec<_>>())
            });
            match verified {
                None => return Ok(false),
                Some(Err(err)) => {
                    error!(%err, "refusing to migrate corrupted registrations");
                    return Err(err);
                }
                Some(Ok(snapshot)) => snapshot,
            }
        };
        if snapshot.is_empty() {
            return Ok(false);
        }

        trace!(
            count = snapshot.len(),
            detach_source,
            "migrating registrations"
        );
        for (handle, record) in snapshot {
            if !self.is_registered_on(source, &handle) {
                trace!(%handle, "registration left the source mid-migration, skipping");
                continue;
            }
            self.add_registration(destination, record.name, record.callback, record.options)?;
            if detach_source {
                match self.remove_registration_from(source, &handle) {
                    Ok(()) => {}
                    Err(RegistryError::NotFound(_)) => {
                        trace!(%handle, "registration already left the source");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(true)
    }

    /// Removes every registration on `target`, returning how many were removed.
    ///
    /// Registrations which native code removes while the target is being cleared are not
    /// counted.
    pub fn clear_registrations(&self, target: &Arc<T>) -> Result<usize, RegistryError> {
        let handles = self
            .lock()
            .store
            .with(target, |set| set.handles().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut removed = 0;
        for handle in &handles {
            match self.remove_registration_from(target, handle) {
                Ok(()) => removed += 1,
                Err(RegistryError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }

    /// Returns `true` if `handle` belongs to a live registration.
    pub fn contains_handle(&self, handle: &Handle) -> bool {
        self.lock().live_entry(handle).is_some()
    }

    /// The signal name `handle` was registered for.
    pub fn signal_name(&self, handle: &Handle) -> Option<SignalName> {
        self.lock().live_entry(handle).map(|entry| entry.name.clone())
    }

    /// The number of live registrations across all targets.
    ///
    /// Registrations of dropped targets are not counted, whether or not they have been swept.
    pub fn len(&self) -> usize {
        self.lock().live_len()
    }

    /// Returns `true` if there are no live registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets registrations whose targets have been dropped, returning how many were forgotten.
    ///
    /// Adding registrations also sweeps dropped targets once the index has grown enough, so
    /// this only needs calling to release memory eagerly.
    pub fn prune(&self) -> usize {
        let mut state = self.lock();
        let pruned = state.sweep();
        state.store.purge();
        pruned
    }

    fn diagnose(&self, message: &str) {
        if self.config.enable_debugging {
            warn!("{message}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Subscribe + ?Sized, S> Clone for HandlerRegistry<T, S> {
    fn clone(&self) -> Self {
        HandlerRegistry {
            state: Arc::clone(&self.state),
            config: self.config,
        }
    }
}

impl<T: Subscribe + ?Sized, S> fmt::Debug for HandlerRegistry<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::store::{AssociationSlots, SlotHost, SlotStore};

    #[derive(Default)]
    struct Node {
        native: Mutex<Vec<(String, Callback<str>, Option<bool>)>>,
        slots: AssociationSlots,
    }

    impl Node {
        fn native_names(&self) -> Vec<String> {
            self.native
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _, _)| name.clone())
                .collect()
        }
    }

    impl Subscribe for Node {
        type Event = str;
        type Options = bool;

        fn subscribe(&self, name: &str, callback: &Callback<str>, options: Option<&bool>) {
            self.native
                .lock()
                .unwrap()
                .push((name.to_string(), callback.clone(), options.copied()));
        }

        fn unsubscribe(&self, name: &str, callback: &Callback<str>, options: Option<&bool>) {
            let mut native = self.native.lock().unwrap();
            if let Some(idx) = native.iter().position(|(n, cb, opts)| {
                n == name && cb == callback && opts.as_ref() == options
            }) {
                native.remove(idx);
            }
        }
    }

    impl SlotHost for Node {
        fn association_slots(&self) -> &AssociationSlots {
            &self.slots
        }
    }

    fn callback() -> Callback<str> {
        Callback::new(|_| {})
    }

    fn scripted(tokens: &[&str]) -> impl HandleSource {
        let mut tokens: VecDeque<Handle> = tokens.iter().map(|t| Handle::from(*t)).collect();
        move || tokens.pop_front().expect("ran out of scripted handles")
    }

    #[test]
    fn add_records_and_subscribes() {
        let registry = HandlerRegistry::<Node>::with_config(RegistryConfig::default());
        let node = Arc::new(Node::default());
        let cb = callback();

        let handle = registry
            .add_registration(&node, "click", cb.clone(), Some(true))
            .unwrap();

        assert!(registry.contains_handle(&handle));
        assert!(registry.is_registered_on(&node, &handle));
        assert_eq!(registry.signal_name(&handle).as_deref(), Some("click"));
        assert_eq!(registry.count_registrations(&node), 1);
        assert_eq!(node.native_names(), ["click"]);
    }

    #[test]
    fn empty_names_are_rejected() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let err = registry
            .add_registration(&node, "", callback(), None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert!(registry.is_empty());
        assert!(node.native_names().is_empty());
    }

    #[test]
    fn colliding_handles_are_redrawn() {
        let registry = HandlerRegistry::<Node>::from_parts(
            RegistryConfig::default(),
            WeakTable::new(),
            scripted(&["Ea", "Ea", "Ea", "Eb"]),
        );
        let node = Arc::new(Node::default());

        let first = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();
        let second = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();

        assert_eq!(first.as_str(), "Ea");
        assert_eq!(second.as_str(), "Eb");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removed_handles_may_be_reused() {
        let registry = HandlerRegistry::<Node>::from_parts(
            RegistryConfig::default(),
            WeakTable::new(),
            scripted(&["Ea", "Ea"]),
        );
        let node = Arc::new(Node::default());
        let first = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();
        registry.remove_registration(&first).unwrap();
        let second = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn remove_unknown_handle_is_not_found() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();

        let err = registry
            .remove_registration(&Handle::from("Enope"))
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound(Handle::from("Enope")));
        assert_eq!(registry.len(), 1);
        assert_eq!(node.native_names(), ["click"]);
    }

    #[test]
    fn removing_the_last_registration_drops_the_set() {
        let node = Arc::new(Node::default());
        let registry = HandlerRegistry::<Node>::with_config(RegistryConfig::default());
        let handle = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();
        assert!(registry.lock().store.has(&node));
        registry.remove_registration(&handle).unwrap();
        assert!(!registry.lock().store.has(&node));
    }

    #[test]
    fn remove_by_match_takes_the_first_duplicate() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let cb = callback();
        let first = registry
            .add_registration(&node, "click", cb.clone(), None)
            .unwrap();
        let second = registry
            .add_registration(&node, "click", cb.clone(), None)
            .unwrap();

        assert!(registry.remove_by_match(&node, "click", &cb, None).unwrap());
        assert!(!registry.contains_handle(&first));
        assert!(registry.contains_handle(&second));
    }

    #[test]
    fn remove_by_match_respects_options() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let cb = callback();
        registry
            .add_registration(&node, "click", cb.clone(), Some(true))
            .unwrap();

        assert!(!registry.remove_by_match(&node, "click", &cb, None).unwrap());
        assert!(!registry.remove_by_match(&node, "click", &cb, Some(&false)).unwrap());
        assert!(registry.remove_by_match(&node, "click", &cb, Some(&true)).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn attempt_remove_invalid_unsubscribes_untracked_listeners() {
        let node = Arc::new(Node::default());
        let cb = callback();
        node.subscribe("click", &cb, None);

        let strict = HandlerRegistry::<Node>::with_config(RegistryConfig::default());
        assert!(!strict.remove_by_match(&node, "click", &cb, None).unwrap());
        assert_eq!(node.native_names(), ["click"]);

        let lenient = HandlerRegistry::<Node>::with_config(
            RegistryConfig::new()
                .enable_debugging(true)
                .attempt_remove_invalid(true),
        );
        assert!(!lenient.remove_by_match(&node, "click", &cb, None).unwrap());
        assert!(node.native_names().is_empty());
    }

    #[test]
    fn has_registration_queries() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let cb = callback();

        assert!(!registry.has_registration(&node, Some("click"), None, None).unwrap());
        registry
            .add_registration(&node, "click", cb.clone(), Some(false))
            .unwrap();

        assert!(registry.has_registration(&node, Some("click"), None, None).unwrap());
        assert!(registry
            .has_registration(&node, Some("click"), Some(&cb), Some(&false))
            .unwrap());
        assert!(!registry
            .has_registration(&node, Some("click"), Some(&cb), None)
            .unwrap());
        assert!(!registry
            .has_registration(&node, Some("click"), Some(&callback()), Some(&false))
            .unwrap());
        assert!(!registry.has_registration(&node, Some("focus"), None, None).unwrap());
        assert!(!registry.has_registration(&node, None, None, None).unwrap());
        assert!(matches!(
            registry.has_registration(&node, None, Some(&cb), None),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn list_groups_by_name_in_insertion_order() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let (a, b, c) = (callback(), callback(), callback());

        let h1 = registry.add_registration(&node, "focus", a.clone(), None).unwrap();
        let h2 = registry.add_registration(&node, "click", b.clone(), None).unwrap();
        let h3 = registry
            .add_registration(&node, "focus", c.clone(), Some(true))
            .unwrap();

        let listed = registry.list_registrations(&node);
        let names: Vec<_> = listed.keys().map(|name| &**name).collect();
        assert_eq!(names, ["focus", "click"]);

        let focus = &listed["focus"];
        assert_eq!(focus.len(), 2);
        assert_eq!(focus[0].handle, h1);
        assert_eq!(focus[0].callback, a);
        assert_eq!(focus[1].handle, h3);
        assert_eq!(focus[1].options, Some(true));
        assert_eq!(listed["click"][0].handle, h2);
        assert_eq!(listed["click"][0].callback, b);
    }

    #[test]
    fn list_of_unknown_target_is_empty() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        assert!(registry.list_registrations(&node).is_empty());
        assert_eq!(registry.count_registrations(&node), 0);
    }

    #[test]
    fn migrate_without_registrations_is_a_no_op() {
        let registry = HandlerRegistry::<Node>::new();
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        assert!(!registry.migrate_registrations(&a, &b, true).unwrap());
        assert!(b.native_names().is_empty());
    }

    #[test]
    fn migrate_detects_corruption_before_moving_anything() {
        let registry = HandlerRegistry::<Node>::new();
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        let handle = registry
            .add_registration(&a, "click", callback(), None)
            .unwrap();
        registry
            .add_registration(&a, "focus", callback(), None)
            .unwrap();

        registry.lock().index.remove(&handle);

        let err = registry.migrate_registrations(&a, &b, true).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(registry.count_registrations(&b), 0);
        assert!(b.native_names().is_empty());
    }

    #[test]
    fn migrate_detects_handles_missing_from_the_set() {
        let registry = HandlerRegistry::<Node>::new();
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        let handle = registry
            .add_registration(&a, "click", callback(), None)
            .unwrap();
        registry
            .add_registration(&a, "focus", callback(), None)
            .unwrap();

        {
            let mut state = registry.lock();
            state.store.with_mut(&a, |set| set.records.shift_remove(&handle));
        }

        assert!(matches!(
            registry.migrate_registrations(&a, &b, false),
            Err(RegistryError::InternalInconsistency { .. })
        ));
        assert!(matches!(
            registry.remove_registration(&handle),
            Err(RegistryError::InternalInconsistency { .. })
        ));
    }

    #[test]
    fn clear_removes_everything_on_a_target() {
        let registry = HandlerRegistry::<Node>::new();
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        registry.add_registration(&a, "click", callback(), None).unwrap();
        registry.add_registration(&a, "focus", callback(), None).unwrap();
        registry.add_registration(&b, "click", callback(), None).unwrap();

        assert_eq!(registry.clear_registrations(&a).unwrap(), 2);
        assert!(a.native_names().is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.clear_registrations(&a).unwrap(), 0);
    }

    #[test]
    fn dropped_targets_are_pruned() {
        let registry = HandlerRegistry::<Node>::new();
        let kept = Arc::new(Node::default());
        let dropped = Arc::new(Node::default());
        registry.add_registration(&kept, "click", callback(), None).unwrap();
        let stale = registry
            .add_registration(&dropped, "click", callback(), None)
            .unwrap();
        drop(dropped);

        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.remove_registration(&stale),
            Err(RegistryError::NotFound(stale))
        );
    }

    #[test]
    fn removing_a_handle_of_a_dropped_target_is_not_found() {
        let registry = HandlerRegistry::<Node>::new();
        let node = Arc::new(Node::default());
        let handle = registry
            .add_registration(&node, "click", callback(), None)
            .unwrap();
        drop(node);

        assert!(matches!(
            registry.remove_registration(&handle),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_targets_do_not_count_without_pruning() {
        let registry = HandlerRegistry::<Node>::new();
        let first = {
            let node = Arc::new(Node::default());
            registry
                .add_registration(&node, "click", callback(), None)
                .unwrap()
        };
        for _ in 1..100 {
            let node = Arc::new(Node::default());
            registry
                .add_registration(&node, "click", callback(), None)
                .unwrap();
        }

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
        assert!(!registry.contains_handle(&first));
        assert_eq!(registry.signal_name(&first), None);
        assert!(registry.lock().index.len() <= MIN_SWEEP_AT);
    }

    #[test]
    fn remove_by_match_surfaces_corruption_instead_of_unsubscribing() {
        let registry = HandlerRegistry::<Node>::with_config(
            RegistryConfig::new().attempt_remove_invalid(true),
        );
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        let cb = callback();
        let handle = registry
            .add_registration(&a, "click", cb.clone(), None)
            .unwrap();

        registry.lock().index.get_mut(&handle).unwrap().owner = Arc::downgrade(&b);

        let err = registry.remove_by_match(&a, "click", &cb, None).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(a.native_names(), ["click"]);
        assert_eq!(registry.count_registrations(&a), 1);
    }

    #[test]
    fn remove_from_checks_the_owner() {
        let registry = HandlerRegistry::<Node>::new();
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        let handle = registry
            .add_registration(&a, "click", callback(), None)
            .unwrap();

        assert_eq!(
            registry.remove_registration_from(&b, &handle),
            Err(RegistryError::NotFound(handle.clone()))
        );
        assert!(registry.is_registered_on(&a, &handle));
        assert_eq!(a.native_names(), ["click"]);

        registry.remove_registration_from(&a, &handle).unwrap();
        assert!(registry.is_empty());
        assert!(a.native_names().is_empty());
    }

    #[test]
    fn migrate_skips_registrations_removed_along_the_way() {
        #[derive(Default)]
        struct Hooked {
            native: Mutex<Vec<String>>,
            on_subscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        }

        impl Subscribe for Hooked {
            type Event = ();
            type Options = ();

            fn subscribe(&self, name: &str, _: &Callback<()>, _: Option<&()>) {
                self.native.lock().unwrap().push(name.to_string());
                let hook = self.on_subscribe.lock().unwrap().take();
                if let Some(hook) = hook {
                    hook();
                }
            }

            fn unsubscribe(&self, name: &str, _: &Callback<()>, _: Option<&()>) {
                let mut native = self.native.lock().unwrap();
                if let Some(idx) = native.iter().position(|n| n == name) {
                    native.remove(idx);
                }
            }
        }

        let registry = HandlerRegistry::<Hooked>::new();
        let a = Arc::new(Hooked::default());
        let b = Arc::new(Hooked::default());
        registry
            .add_registration(&a, "click", Callback::new(|_| {}), None)
            .unwrap();
        registry
            .add_registration(&a, "focus", Callback::new(|_| {}), None)
            .unwrap();

        let (hook_registry, hook_source) = (registry.clone(), Arc::clone(&a));
        *b.on_subscribe.lock().unwrap() = Some(Box::new(move || {
            hook_registry.clear_registrations(&hook_source).unwrap();
        }));

        assert!(registry.migrate_registrations(&a, &b, true).unwrap());
        assert_eq!(*b.native.lock().unwrap(), ["click"]);
        assert!(a.native.lock().unwrap().is_empty());
        assert_eq!(registry.count_registrations(&a), 0);
        assert_eq!(registry.count_registrations(&b), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn slot_store_backs_a_registry() {
        let registry = HandlerRegistry::<Node, SlotStore<RegistrationSet<Node>>>::from_parts(
            RegistryConfig::default(),
            SlotStore::new(),
            RandomHandles::seeded(1),
        );
        let a = Arc::new(Node::default());
        let b = Arc::new(Node::default());
        let cb = callback();

        registry.add_registration(&a, "click", cb.clone(), None).unwrap();
        assert_eq!(a.slots.len(), 1);
        assert!(registry.migrate_registrations(&a, &b, true).unwrap());
        assert!(a.slots.is_empty());
        assert!(registry.has_signal(&b, "click"));
        assert_eq!(b.native_names(), ["click"]);
    }

    #[test]
    fn native_calls_may_reenter_the_registry() {
        struct Reentrant {
            registry: Mutex<Option<HandlerRegistry<Reentrant>>>,
            seen_on_subscribe: AtomicUsize,
            seen_on_unsubscribe: AtomicUsize,
        }

        impl Subscribe for Reentrant {
            type Event = ();
            type Options = ();

            fn subscribe(&self, name: &str, _: &Callback<()>, _: Option<&()>) {
                let registry = self.registry.lock().unwrap().clone().unwrap();
                let me = registry.len();
                assert!(me > 0, "registration recorded before subscribing");
                self.seen_on_subscribe.store(me, Ordering::SeqCst);
                assert!(!name.is_empty());
            }

            fn unsubscribe(&self, _: &str, _: &Callback<()>, _: Option<&()>) {
                let registry = self.registry.lock().unwrap().clone().unwrap();
                self.seen_on_unsubscribe
                    .store(registry.len(), Ordering::SeqCst);
            }
        }

        let registry = HandlerRegistry::<Reentrant>::new();
        let target = Arc::new(Reentrant {
            registry: Mutex::new(Some(registry.clone())),
            seen_on_subscribe: AtomicUsize::new(0),
            seen_on_unsubscribe: AtomicUsize::new(usize::MAX),
        });

        let handle = registry
            .add_registration(&target, "tick", Callback::new(|_| {}), None)
            .unwrap();
        assert_eq!(target.seen_on_subscribe.load(Ordering::SeqCst), 1);

        registry.remove_registration(&handle).unwrap();
        assert_eq!(target.seen_on_unsubscribe.load(Ordering::SeqCst), 0);

        target.registry.lock().unwrap().take();
    }
}
