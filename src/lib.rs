#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod error;
pub mod handle;
pub mod hooks;
pub mod registry;
pub mod store;
pub mod target;
pub mod tracked;

pub use config::{install, RegistryConfig};
pub use error::RegistryError;
pub use handle::Handle;
pub use registry::HandlerRegistry;
pub use target::{Callback, Subscribe};
pub use tracked::Tracked;

/// Commonly used types and traits.
pub mod prelude {
    pub use crate::config::{install, RegistryConfig};
    pub use crate::error::RegistryError;
    pub use crate::handle::{Handle, HandleSource, RandomHandles};
    pub use crate::hooks::{transfer_on_insert, Container};
    pub use crate::registry::{HandlerRegistry, RegisteredHandler, Registrations, SignalName};
    pub use crate::store::{AssociationSlots, AssociationStore, SlotHost, SlotStore, WeakTable};
    pub use crate::target::{Callback, Subscribe};
    pub use crate::tracked::Tracked;
}
