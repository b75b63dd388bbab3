//! Test doubles and common utilities for contract tests
//!
//! The memory providers from the crate cover most needs; this module adds
//! an inventory that can be held mid-query and small builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tagdns_core::config::TagSelector;
use tagdns_core::error::Result;
use tagdns_core::providers::{MemoryInventory, MemoryZone};
use tagdns_core::traits::{Instance, InventoryProvider};
use tagdns_core::{Config, ReconcileEvent, Reconciler};
use tokio::sync::{Semaphore, mpsc};

pub const ZONE_ID: &str = "Z0TEST";
pub const DOMAIN: &str = "skuid.com.";

/// An inventory whose queries wait for a permit before answering
pub struct GatedInventory {
    inner: MemoryInventory,
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

impl GatedInventory {
    /// Create a closed gate in front of `inner`
    pub fn new(inner: MemoryInventory) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `n` queries through
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Queries entered so far, finished or not
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Create a new GatedInventory that shares gate and counters with an existing one
    pub fn sharing_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            gate: Arc::clone(&other.gate),
            calls: Arc::clone(&other.calls),
        }
    }
}

#[async_trait]
impl InventoryProvider for GatedInventory {
    async fn list_running_instances(&self, selector: &TagSelector) -> Result<Vec<Instance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .expect("gate semaphore is never closed");
        permit.forget();
        self.inner.list_running_instances(selector).await
    }

    fn provider_name(&self) -> &'static str {
        "gated"
    }
}

/// Running instances tagged role=etcd with the given private IPs
pub fn etcd_instances(ips: &[&str]) -> Vec<Instance> {
    ips.iter()
        .enumerate()
        .map(|(i, ip)| {
            Instance::new(format!("i-{:04}", i))
                .with_tag("role", "etcd")
                .with_private(*ip, format!("ip-{}.ec2.internal", ip.replace('.', "-")))
        })
        .collect()
}

/// Baseline config: A records for role=etcd under prefix "etcd"
pub fn etcd_config() -> Config {
    Config::new(ZONE_ID, "etcd").with_tags("role=etcd".parse().expect("valid selector"))
}

/// Empty zone with the test id and domain
pub fn zone() -> MemoryZone {
    MemoryZone::new(ZONE_ID, DOMAIN)
}

/// Build a reconciler over handles to `inventory` and `zone`
pub async fn reconciler(
    inventory: &MemoryInventory,
    zone: &MemoryZone,
    config: Config,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::connect(Box::new(inventory.clone()), Box::new(zone.clone()), config)
        .await
        .expect("reconciler construction succeeds")
}

/// Collect every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
