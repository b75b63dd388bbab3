// # Memory Providers
//
// In-process implementations of InventoryProvider and DnsProvider.
//
// ## Purpose
//
// Embedding tagdns without a cloud account, and exercising the reconciler
// in tests. Clones share state, so a test can keep a handle while the
// reconciler owns another.
//
// ## Lookup semantics
//
// `MemoryZone::find_record_set` answers with the nearest following record
// set when the exact name is absent, like listing APIs that start at a name.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{BackendConfig, TagSelector};
use crate::error::{Error, Result};
use crate::traits::{
    DnsProvider, DnsProviderFactory, Instance, InventoryProvider, InventoryProviderFactory,
    RecordChange, RecordSet,
};

const PROVIDER_NAME: &str = "memory";

#[derive(Debug, Default)]
struct InventoryState {
    instances: Vec<Instance>,
    failure: Option<String>,
    queries: usize,
}

/// In-memory compute inventory
#[derive(Debug, Clone, Default)]
pub struct MemoryInventory {
    inner: Arc<RwLock<InventoryState>>,
}

impl MemoryInventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inventory holding `instances`
    pub fn with_instances(instances: Vec<Instance>) -> Self {
        let inventory = Self::new();
        inventory.set_instances(instances);
        inventory
    }

    /// Replace every instance
    pub fn set_instances(&self, instances: Vec<Instance>) {
        self.write().instances = instances;
    }

    /// Add one instance
    pub fn push(&self, instance: Instance) {
        self.write().instances.push(instance);
    }

    /// Make every following query fail with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        self.write().failure = Some(message.into());
    }

    /// Undo [`MemoryInventory::fail_with`]
    pub fn clear_failure(&self) {
        self.write().failure = None;
    }

    /// Number of queries served so far, failed ones included
    pub fn query_count(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).queries
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InventoryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryProvider for MemoryInventory {
    async fn list_running_instances(&self, selector: &TagSelector) -> Result<Vec<Instance>> {
        let mut state = self.write();
        state.queries += 1;

        if let Some(message) = &state.failure {
            return Err(Error::provider(PROVIDER_NAME, message.clone()));
        }

        Ok(state
            .instances
            .iter()
            .filter(|instance| instance.is_selected_by(selector))
            .cloned()
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Normalized key: lowercase, no trailing root dot
fn record_key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Default)]
struct ZoneState {
    records: BTreeMap<String, RecordSet>,
    failing_lookups: BTreeSet<String>,
    upsert_failure: Option<String>,
    batches: Vec<Vec<RecordChange>>,
}

/// In-memory hosted zone
#[derive(Debug, Clone)]
pub struct MemoryZone {
    zone_id: String,
    domain: String,
    inner: Arc<RwLock<ZoneState>>,
}

impl MemoryZone {
    /// Create an empty zone `zone_id` serving `domain`
    pub fn new(zone_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            domain: domain.into(),
            inner: Arc::new(RwLock::new(ZoneState::default())),
        }
    }

    /// Store a record set directly, bypassing the batch log
    pub fn insert(&self, set: RecordSet) {
        self.write().records.insert(record_key(&set.name), set);
    }

    /// Record set stored under exactly `name`
    pub fn get(&self, name: &str) -> Option<RecordSet> {
        self.read().records.get(&record_key(name)).cloned()
    }

    /// Number of record sets in the zone
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// True if the zone holds no record sets
    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Make lookups of `name` fail
    pub fn fail_lookups_for(&self, name: &str) {
        self.write().failing_lookups.insert(record_key(name));
    }

    /// Make every following upsert fail with `message`
    pub fn fail_upserts_with(&self, message: impl Into<String>) {
        self.write().upsert_failure = Some(message.into());
    }

    /// Every accepted upsert batch, oldest first
    pub fn batches(&self) -> Vec<Vec<RecordChange>> {
        self.read().batches.clone()
    }

    fn check_zone(&self, zone_id: &str) -> Result<()> {
        if zone_id == self.zone_id {
            Ok(())
        } else {
            Err(Error::provider(
                PROVIDER_NAME,
                format!("No hosted zone found with id {}", zone_id),
            ))
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ZoneState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ZoneState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DnsProvider for MemoryZone {
    async fn resolve_zone_name(&self, zone_id: &str) -> Result<String> {
        self.check_zone(zone_id)?;
        Ok(self.domain.clone())
    }

    async fn find_record_set(&self, zone_id: &str, name: &str) -> Result<Option<RecordSet>> {
        self.check_zone(zone_id)?;
        let key = record_key(name);
        let state = self.read();

        if state.failing_lookups.contains(&key) {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("lookup of {} failed", name),
            ));
        }

        Ok(state
            .records
            .range(key..)
            .next()
            .map(|(_, set)| set.clone()))
    }

    async fn upsert_records(&self, zone_id: &str, changes: &[RecordChange]) -> Result<()> {
        self.check_zone(zone_id)?;
        let mut state = self.write();

        if let Some(message) = &state.upsert_failure {
            return Err(Error::provider(PROVIDER_NAME, message.clone()));
        }

        for change in changes {
            state
                .records
                .insert(record_key(&change.name), RecordSet::from(change.clone()));
        }
        state.batches.push(changes.to_vec());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory handing out handles to one shared [`MemoryInventory`]
pub struct MemoryInventoryFactory {
    inventory: MemoryInventory,
}

impl MemoryInventoryFactory {
    /// Create a factory for `inventory`
    pub fn new(inventory: MemoryInventory) -> Self {
        Self { inventory }
    }
}

impl InventoryProviderFactory for MemoryInventoryFactory {
    fn create(&self, _config: &BackendConfig) -> Result<Box<dyn InventoryProvider>> {
        Ok(Box::new(self.inventory.clone()))
    }
}

/// Factory handing out handles to one shared [`MemoryZone`]
pub struct MemoryZoneFactory {
    zone: MemoryZone,
}

impl MemoryZoneFactory {
    /// Create a factory for `zone`
    pub fn new(zone: MemoryZone) -> Self {
        Self { zone }
    }
}

impl DnsProviderFactory for MemoryZoneFactory {
    fn create(&self, _config: &BackendConfig) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(self.zone.clone()))
    }
}
