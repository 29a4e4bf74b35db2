//! A target decorated with its registry.
//!
//! [`Tracked`] pairs a target with a [`HandlerRegistry`] and offers the familiar listener-style
//! surface on top of it. It dereferences to the target, so the target's own interface stays
//! available alongside the tracked one.

use std::{fmt, ops::Deref, sync::Arc};

use crate::{
    error::RegistryError,
    handle::Handle,
    registry::{HandlerRegistry, RegistrationSet, Registrations, SignalName},
    store::{AssociationStore, WeakTable},
    target::{Callback, Subscribe},
};

/// A target whose listeners are tracked by a registry.
///
/// ```
/// use std::sync::Arc;
/// use tether::{Callback, HandlerRegistry, Subscribe, Tracked};
///
/// struct Window;
///
/// impl Subscribe for Window {
///     type Event = str;
///     type Options = ();
///
///     fn subscribe(&self, _: &str, _: &Callback<str>, _: Option<&()>) {}
///     fn unsubscribe(&self, _: &str, _: &Callback<str>, _: Option<&()>) {}
/// }
///
/// let registry = HandlerRegistry::new();
/// let window = Tracked::new(&registry, Arc::new(Window));
///
/// let on_resize = Callback::new(|_: &str| {});
/// window.add_event_listener("resize", on_resize.clone(), None)?;
/// assert!(window.has_event_listener(Some("resize"), None, None)?);
///
/// assert!(window.remove_event_listener("resize", &on_resize, None)?);
/// assert!(window.event_handlers().is_empty());
/// # Ok::<(), tether::RegistryError>(())
/// ```
pub struct Tracked<T: Subscribe + ?Sized, S = WeakTable<T, RegistrationSet<T>>> {
    registry: HandlerRegistry<T, S>,
    target: Arc<T>,
}

impl<T, S> Tracked<T, S>
where
    T: Subscribe + ?Sized,
    S: AssociationStore<T, RegistrationSet<T>> + Send + 'static,
{
    /// Decorates `target` with `registry`.
    pub fn new(registry: &HandlerRegistry<T, S>, target: Arc<T>) -> Self {
        Tracked {
            registry: registry.clone(),
            target,
        }
    }

    /// The decorated target.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// The registry tracking this target.
    pub fn registry(&self) -> &HandlerRegistry<T, S> {
        &self.registry
    }

    /// Adds a listener and returns its handle.
    pub fn add_event_handler(
        &self,
        name: impl Into<SignalName>,
        callback: Callback<T::Event>,
        options: Option<T::Options>,
    ) -> Result<Handle, RegistryError> {
        self.registry
            .add_registration(&self.target, name, callback, options)
    }

    /// Adds a listener, discarding its handle.
    ///
    /// The listener is tracked all the same and can be removed by match.
    pub fn add_event_listener(
        &self,
        name: impl Into<SignalName>,
        callback: Callback<T::Event>,
        options: Option<T::Options>,
    ) -> Result<(), RegistryError> {
        self.add_event_handler(name, callback, options).map(|_| ())
    }

    /// Removes the listener behind `handle`.
    ///
    /// Fails with [`RegistryError::NotFound`] if the handle does not belong to this target.
    pub fn remove_event_handler(&self, handle: &Handle) -> Result<(), RegistryError> {
        self.registry.remove_registration_from(&self.target, handle)
    }

    /// Removes the first listener matching `name`, `callback` and `options`.
    ///
    /// See [`HandlerRegistry::remove_by_match`].
    pub fn remove_event_listener(
        &self,
        name: &str,
        callback: &Callback<T::Event>,
        options: Option<&T::Options>,
    ) -> Result<bool, RegistryError> {
        self.registry
            .remove_by_match(&self.target, name, callback, options)
    }

    /// See [`HandlerRegistry::has_registration`].
    pub fn has_event_listener(
        &self,
        name: Option<&str>,
        callback: Option<&Callback<T::Event>>,
        options: Option<&T::Options>,
    ) -> Result<bool, RegistryError> {
        self.registry
            .has_registration(&self.target, name, callback, options)
    }

    /// The target's listeners grouped by signal name.
    pub fn event_handlers(&self) -> Registrations<T> {
        self.registry.list_registrations(&self.target)
    }

    /// Moves this target's listeners to `new_target`.
    ///
    /// See [`HandlerRegistry::migrate_registrations`].
    pub fn migrate_event_handlers_to(
        &self,
        new_target: &Arc<T>,
        detach_current: bool,
    ) -> Result<bool, RegistryError> {
        self.registry
            .migrate_registrations(&self.target, new_target, detach_current)
    }
}

impl<T: Subscribe + ?Sized, S> Deref for Tracked<T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T: Subscribe + ?Sized, S> Clone for Tracked<T, S> {
    fn clone(&self) -> Self {
        Tracked {
            registry: self.registry.clone(),
            target: Arc::clone(&self.target),
        }
    }
}

impl<T: Subscribe + ?Sized, S> fmt::Debug for Tracked<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("target", &Arc::as_ptr(&self.target))
            .finish_non_exhaustive()
    }
}

impl<T, S> HandlerRegistry<T, S>
where
    T: Subscribe + ?Sized,
    S: AssociationStore<T, RegistrationSet<T>> + Send + 'static,
{
    /// Decorates `target` with this registry.
    pub fn track(&self, target: &Arc<T>) -> Tracked<T, S> {
        Tracked::new(self, Arc::clone(target))
    }
}
