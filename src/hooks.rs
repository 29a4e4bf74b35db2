//! Transfer of registrations when objects are moved into a new container.
//!
//! Hosts with fragment-like containers, whose children are handed over wholesale when the
//! fragment is inserted somewhere, also want the fragment's listeners to follow. The insertion
//! itself stays native; these hooks only move the registrations afterwards.

use std::sync::Arc;

use tracing::trace;

use crate::{
    error::RegistryError,
    registry::{HandlerRegistry, RegistrationSet},
    store::AssociationStore,
    target::Subscribe,
    tracked::Tracked,
};

/// A target which can take children.
pub trait Container: Subscribe {
    /// Inserts `child` natively.
    fn insert_child(&self, child: &Arc<Self>);

    /// Returns `true` for transient containers whose listeners belong to whatever they are
    /// inserted into.
    fn is_fragment(&self) -> bool {
        false
    }
}

/// Moves all of `moved`'s registrations onto `new_parent`, detaching them from `moved`.
///
/// Returns `false` if `moved` had no registrations.
pub fn transfer_on_insert<T, S>(
    registry: &HandlerRegistry<T, S>,
    moved: &Arc<T>,
    new_parent: &Arc<T>,
) -> Result<bool, RegistryError>
where
    T: Subscribe + ?Sized,
    S: AssociationStore<T, RegistrationSet<T>> + Send + 'static,
{
    registry.migrate_registrations(moved, new_parent, true)
}

impl<T, S> Tracked<T, S>
where
    T: Container,
    S: AssociationStore<T, RegistrationSet<T>> + Send + 'static,
{
    /// Inserts `child`, transferring its registrations here if it is a fragment.
    ///
    /// Returns `true` if any registrations were transferred.
    pub fn append_child(&self, child: &Arc<T>) -> Result<bool, RegistryError> {
        self.target().insert_child(child);
        if !child.is_fragment() {
            return Ok(false);
        }
        trace!("appended fragment, transferring its registrations");
        transfer_on_insert(self.registry(), child, self.target())
    }

    /// Inserts each child in order, as [`append_child`](Tracked::append_child) does.
    ///
    /// Returns the number of children whose registrations were transferred.
    pub fn append<'a, I>(&self, children: I) -> Result<usize, RegistryError>
    where
        I: IntoIterator<Item = &'a Arc<T>>,
    {
        let mut transferred = 0;
        for child in children {
            if self.append_child(child)? {
                transferred += 1;
            }
        }
        Ok(transferred)
    }
}
