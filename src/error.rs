//! Defines error handling constructs for tether.
//!
//! Only genuine failures surface as a [`RegistryError`]. Best-effort operations such as
//! [`HandlerRegistry::remove_by_match`](crate::registry::HandlerRegistry::remove_by_match)
//! report a miss through their return value instead.

use std::{borrow::Cow, error, fmt};

use crate::handle::Handle;

/// Error that can occur when operating on a [`HandlerRegistry`](crate::registry::HandlerRegistry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The call itself was malformed, such as an empty signal name.
    InvalidArgument(Cow<'static, str>),
    /// The handle is unknown to the registry.
    ///
    /// This is a logic error in the caller and should not be silently ignored.
    NotFound(Handle),
    /// The global handle index and a target's registration set disagree.
    InternalInconsistency {
        /// The handle the disagreement was detected on.
        handle: Handle,
        /// What was found to be inconsistent.
        reason: &'static str,
    },
    /// A process-wide configuration has already been installed.
    AlreadyInstalled,
}

impl RegistryError {
    /// Returns `true` if the error indicates a broken registry invariant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegistryError::InternalInconsistency { .. })
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            RegistryError::NotFound(handle) => {
                write!(f, "handle {handle} not found in the handle index")
            }
            RegistryError::InternalInconsistency { handle, reason } => {
                write!(f, "registry state corrupted at handle {handle}: {reason}")
            }
            RegistryError::AlreadyInstalled => write!(f, "registry config already installed"),
        }
    }
}

impl error::Error for RegistryError {}
