// # DNS Provider Trait
//
// Defines the interface to the authoritative DNS-zone service.
//
// ## Implementations
//
// - In-memory: `providers::MemoryZone`
// - JSON file: `providers::FileZone`
//
// ## Lookup semantics
//
// `find_record_set` mirrors services that list record sets starting at a
// name: when the exact name is absent they return the next record set in
// name order. Callers must compare names before trusting the result; the
// [`ZoneReader`](crate::zone::ZoneReader) does exactly that.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RecordType;

/// A record set as stored in the zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Fully-qualified name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record values; may be empty for alias-style sets
    pub values: Vec<String>,
    /// Time-to-live in seconds
    pub ttl: u32,
}

/// One element of an UPSERT batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChange {
    /// Fully-qualified name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Single value written to the record set
    pub value: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl From<RecordChange> for RecordSet {
    fn from(change: RecordChange) -> Self {
        Self {
            name: change.name,
            record_type: change.record_type,
            values: vec![change.value],
            ttl: change.ttl,
        }
    }
}

/// Trait for DNS-zone implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// Providers are single-shot: one request per call, no retries, no caching,
/// no decisions about whether a write is needed. Those belong to the
/// [`Reconciler`](crate::reconciler::Reconciler).
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Domain name of the hosted zone `zone_id`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: the zone's domain, possibly with a trailing dot
    /// - `Err(Error)`: the zone does not exist or the request failed
    async fn resolve_zone_name(&self, zone_id: &str) -> Result<String, crate::Error>;

    /// First record set whose name is `name` or follows it in name order
    ///
    /// # Returns
    ///
    /// - `Ok(Some(RecordSet))`: the exact match or the nearest following set
    /// - `Ok(None)`: nothing at or after `name`
    /// - `Err(Error)`: the request failed
    async fn find_record_set(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Option<RecordSet>, crate::Error>;

    /// Create or update every record in `changes` as one request
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the provider accepted the batch
    /// - `Err(Error)`: the batch was rejected or the request failed
    async fn upsert_records(
        &self,
        zone_id: &str,
        changes: &[RecordChange],
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::BackendConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
