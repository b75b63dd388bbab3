//! Plugin-based provider registry
//!
//! The registry lets inventory and DNS providers be registered by name at
//! runtime, so the daemon builds whatever backend the configuration names
//! without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust
//! use tagdns_core::config::BackendConfig;
//! use tagdns_core::registry::ProviderRegistry;
//! use tagdns_core::traits::DnsProvider;
//!
//! let registry = ProviderRegistry::with_builtin();
//! let backend = BackendConfig::File { path: "/var/lib/tagdns/zone.json".to_string() };
//! let zone = registry.create_dns(&backend).unwrap();
//! assert_eq!(zone.provider_name(), "file");
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::providers::{FileInventoryFactory, FileZoneFactory};
use crate::traits::{DnsProvider, DnsProviderFactory, InventoryProvider, InventoryProviderFactory};

/// Provider registry for plugin-based provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered inventory provider factories
    inventories: RwLock<HashMap<String, Box<dyn InventoryProviderFactory>>>,

    /// Registered DNS provider factories
    zones: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the file backends registered
    ///
    /// Memory backends hold shared state and are registered explicitly with
    /// a [`MemoryInventoryFactory`](crate::providers::MemoryInventoryFactory)
    /// or [`MemoryZoneFactory`](crate::providers::MemoryZoneFactory).
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_inventory("file", Box::new(FileInventoryFactory));
        registry.register_dns("file", Box::new(FileZoneFactory));
        registry
    }

    /// Register an inventory provider factory under `name`
    pub fn register_inventory(
        &self,
        name: impl Into<String>,
        factory: Box<dyn InventoryProviderFactory>,
    ) {
        self.inventories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a DNS provider factory under `name`
    pub fn register_dns(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create an inventory provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn InventoryProvider>)`: Created provider instance
    /// - `Err(Error)`: If the backend is not registered or creation fails
    pub fn create_inventory(&self, config: &BackendConfig) -> Result<Box<dyn InventoryProvider>> {
        let backend = config.type_name();
        let inventories = self.inventories.read().unwrap_or_else(PoisonError::into_inner);

        let factory = inventories
            .get(backend)
            .ok_or_else(|| Error::config(format!("Unknown inventory backend: {}", backend)))?;

        factory.create(config)
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If the backend is not registered or creation fails
    pub fn create_dns(&self, config: &BackendConfig) -> Result<Box<dyn DnsProvider>> {
        let backend = config.type_name();
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);

        let factory = zones
            .get(backend)
            .ok_or_else(|| Error::config(format!("Unknown DNS backend: {}", backend)))?;

        factory.create(config)
    }

    /// List all registered inventory backends
    pub fn list_inventories(&self) -> Vec<String> {
        let inventories = self.inventories.read().unwrap_or_else(PoisonError::into_inner);
        inventories.keys().cloned().collect()
    }

    /// List all registered DNS backends
    pub fn list_dns(&self) -> Vec<String> {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        zones.keys().cloned().collect()
    }

    /// Check if an inventory backend is registered
    pub fn has_inventory(&self, name: &str) -> bool {
        let inventories = self.inventories.read().unwrap_or_else(PoisonError::into_inner);
        inventories.contains_key(name)
    }

    /// Check if a DNS backend is registered
    pub fn has_dns(&self, name: &str) -> bool {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        zones.contains_key(name)
    }
}
