// # Inventory Provider Trait
//
// Defines the interface to the compute-inventory service.
//
// ## Implementations
//
// - In-memory: `providers::MemoryInventory`
// - JSON file: `providers::FileInventory`
//
// Cloud inventory clients implement the same trait outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::TagSelector;

/// State name of an instance that may be published
pub const RUNNING: &str = "running";

/// A compute instance as reported by the inventory
///
/// Address fields are optional: instances without a public interface are
/// common and must not abort a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider-assigned instance id
    pub id: String,

    /// Lifecycle state ("running", "stopped", ...)
    #[serde(default = "default_state")]
    pub state: String,

    /// Instance tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Private IP address
    #[serde(default)]
    pub private_ip: Option<String>,

    /// Private DNS name
    #[serde(default)]
    pub private_dns: Option<String>,

    /// Public IP address
    #[serde(default)]
    pub public_ip: Option<String>,

    /// Public DNS name
    #[serde(default)]
    pub public_dns: Option<String>,
}

fn default_state() -> String {
    RUNNING.to_string()
}

impl Instance {
    /// Create a running instance with no tags or addresses
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: default_state(),
            tags: BTreeMap::new(),
            private_ip: None,
            private_dns: None,
            public_ip: None,
            public_dns: None,
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set the lifecycle state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Set the private IP and DNS name
    pub fn with_private(mut self, ip: impl Into<String>, dns: impl Into<String>) -> Self {
        self.private_ip = Some(ip.into());
        self.private_dns = Some(dns.into());
        self
    }

    /// Set the public IP and DNS name
    pub fn with_public(mut self, ip: impl Into<String>, dns: impl Into<String>) -> Self {
        self.public_ip = Some(ip.into());
        self.public_dns = Some(dns.into());
        self
    }

    /// True if the instance is running and carries every selector tag
    pub fn is_selected_by(&self, selector: &TagSelector) -> bool {
        self.state == RUNNING && selector.matches(&self.tags)
    }
}

/// Trait for compute-inventory implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// They perform a single query per call; retries and scheduling belong to
/// the reconciler and scheduler.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// List running instances carrying every tag in `selector`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Instance>)`: matching instances, in no particular order
    /// - `Err(Error)`: transport, auth or provider failure
    async fn list_running_instances(
        &self,
        selector: &TagSelector,
    ) -> Result<Vec<Instance>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing inventory providers from configuration
pub trait InventoryProviderFactory: Send + Sync {
    /// Create an InventoryProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::BackendConfig,
    ) -> Result<Box<dyn InventoryProvider>, crate::Error>;
}
