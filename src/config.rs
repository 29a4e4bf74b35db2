//! Registry configuration and the process-wide install.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;

static INSTALLED: OnceCell<RegistryConfig> = OnceCell::new();

/// Behaviour switches for a [`HandlerRegistry`](crate::registry::HandlerRegistry).
///
/// Both switches are off by default.
///
/// ```
/// use tether::RegistryConfig;
///
/// let config: RegistryConfig = serde_json::from_str(r#"{ "enable_debugging": true }"#).unwrap();
/// assert!(config.enable_debugging);
/// assert!(!config.attempt_remove_invalid);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Emit warnings for best-effort operations which found nothing to act on.
    pub enable_debugging: bool,
    /// When a removal by match finds no tracked registration, unsubscribe natively anyway.
    ///
    /// This covers listeners that were subscribed without going through the registry.
    pub attempt_remove_invalid: bool,
}

impl RegistryConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`enable_debugging`](RegistryConfig::enable_debugging).
    pub fn enable_debugging(mut self, enabled: bool) -> Self {
        self.enable_debugging = enabled;
        self
    }

    /// Sets [`attempt_remove_invalid`](RegistryConfig::attempt_remove_invalid).
    pub fn attempt_remove_invalid(mut self, enabled: bool) -> Self {
        self.attempt_remove_invalid = enabled;
        self
    }

    /// Returns the installed process-wide configuration, or the default if none was installed.
    pub fn installed() -> Self {
        INSTALLED.get().copied().unwrap_or_default()
    }
}

/// Installs `config` as the process-wide default used by [`HandlerRegistry::new`](crate::registry::HandlerRegistry::new).
///
/// A configuration can only be installed once per process. Registries created before the
/// install keep the configuration they were created with.
pub fn install(config: RegistryConfig) -> Result<(), RegistryError> {
    INSTALLED
        .set(config)
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    debug!(?config, "installed registry config");
    Ok(())
}
