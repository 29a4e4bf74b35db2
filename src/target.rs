//! The native subscription mechanism the registry wraps.
//!
//! A target is any shared object implementing [`Subscribe`]. The registry never dispatches
//! events itself: it records what was registered and forwards every add and remove to the
//! target's own `subscribe`/`unsubscribe`.

use std::{
    fmt,
    sync::{Arc, Weak},
};

/// The native subscribe/unsubscribe primitive of a target.
///
/// # Example
///
/// ```
/// use std::sync::Mutex;
/// use tether::target::{Callback, Subscribe};
///
/// #[derive(Default)]
/// struct Button {
///     listeners: Mutex<Vec<(String, Callback<str>)>>,
/// }
///
/// impl Subscribe for Button {
///     type Event = str;
///     type Options = bool;
///
///     fn subscribe(&self, name: &str, callback: &Callback<str>, _options: Option<&bool>) {
///         self.listeners.lock().unwrap().push((name.to_string(), callback.clone()));
///     }
///
///     fn unsubscribe(&self, name: &str, callback: &Callback<str>, _options: Option<&bool>) {
///         let mut listeners = self.listeners.lock().unwrap();
///         if let Some(idx) = listeners.iter().position(|(n, cb)| n == name && cb == callback) {
///             listeners.remove(idx);
///         }
///     }
/// }
/// ```
pub trait Subscribe: Send + Sync + 'static {
    /// The payload delivered to callbacks.
    type Event: ?Sized + 'static;
    /// Per-registration options. Compared by value when matching registrations.
    type Options: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Registers `callback` for `name` with the native mechanism.
    fn subscribe(
        &self,
        name: &str,
        callback: &Callback<Self::Event>,
        options: Option<&Self::Options>,
    );

    /// Unregisters `callback` for `name` from the native mechanism.
    fn unsubscribe(
        &self,
        name: &str,
        callback: &Callback<Self::Event>,
        options: Option<&Self::Options>,
    );
}

/// A shared callback reference.
///
/// Two callbacks are equal only if they are clones of the same allocation, matching the
/// reference equality native listener mechanisms use.
pub struct Callback<E: ?Sized>(Arc<dyn Fn(&E) + Send + Sync>);

impl<E: ?Sized> Callback<E> {
    /// Wraps a closure as a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        Callback(Arc::new(f))
    }

    /// Invokes the callback. Only hosts dispatching events call this.
    pub fn call(&self, event: &E) {
        (self.0)(event)
    }

    /// Returns `true` if both callbacks point to the same closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<E: ?Sized> Clone for Callback<E> {
    fn clone(&self) -> Self {
        Callback(Arc::clone(&self.0))
    }
}

impl<E: ?Sized> PartialEq for Callback<E> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<E: ?Sized> Eq for Callback<E> {}

impl<E: ?Sized> fmt::Debug for Callback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", self.addr())
    }
}

/// Address of a target allocation, used as its identity.
pub(crate) fn identity<T: ?Sized>(target: &Arc<T>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

pub(crate) fn weak_identity<T: ?Sized>(target: &Weak<T>) -> usize {
    Weak::as_ptr(target) as *const () as usize
}
