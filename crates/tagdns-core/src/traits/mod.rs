//! Provider traits consumed by the reconciler
//!
//! - [`InventoryProvider`]: list running instances matching a tag selector
//! - [`DnsProvider`]: resolve the zone, read record sets, upsert batches

pub mod dns_provider;
pub mod inventory;

pub use dns_provider::{DnsProvider, DnsProviderFactory, RecordChange, RecordSet};
pub use inventory::{Instance, InventoryProvider, InventoryProviderFactory};
