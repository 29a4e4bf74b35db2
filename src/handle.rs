//! Registration handles and the sources that draw them.

use std::{borrow::Borrow, fmt, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// An opaque token identifying one active registration.
///
/// Handles are handed out by [`HandlerRegistry::add_registration`](crate::registry::HandlerRegistry::add_registration)
/// and are unique among all live registrations of that registry. Cloning a handle is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(Arc<str>);

impl Handle {
    /// Returns the handle's token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Handle {
    fn from(token: &str) -> Self {
        Handle(Arc::from(token))
    }
}

impl From<String> for Handle {
    fn from(token: String) -> Self {
        Handle(Arc::from(token))
    }
}

impl Borrow<str> for Handle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        if token.is_empty() {
            return Err(serde::de::Error::invalid_length(0, &"a non-empty handle"));
        }
        Ok(Handle::from(token))
    }
}

/// A source of candidate handles.
///
/// Candidates are not required to be unique; the registry keeps drawing until it gets one
/// which is not currently live.
pub trait HandleSource: Send + 'static {
    /// Produces the next candidate handle.
    fn next_handle(&mut self) -> Handle;
}

impl<F> HandleSource for F
where
    F: FnMut() -> Handle + Send + 'static,
{
    fn next_handle(&mut self) -> Handle {
        self()
    }
}

/// Generates handles of the form `E` followed by 16 hex digits drawn from a seeded RNG.
#[derive(Debug)]
pub struct RandomHandles {
    rng: StdRng,
}

impl RandomHandles {
    /// Creates a generator seeded from the operating system's entropy source.
    pub fn new() -> Self {
        RandomHandles {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a deterministic generator, mostly useful in tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        RandomHandles {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomHandles {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleSource for RandomHandles {
    fn next_handle(&mut self) -> Handle {
        Handle::from(format!("E{:016x}", self.rng.gen::<u64>()))
    }
}
