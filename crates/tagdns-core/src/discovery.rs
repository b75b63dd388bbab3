//! Target discovery
//!
//! Turns the instances reported by an [`InventoryProvider`] into the list of
//! values that DNS records should point at, one per instance.

use tracing::{debug, warn};

use crate::config::{AddressFamily, RecordType, TagSelector};
use crate::error::{Error, Result};
use crate::traits::{Instance, InventoryProvider};

/// Outcome of one discovery query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// One value per usable instance, in inventory order; duplicates kept
    pub targets: Vec<String>,
    /// Ids of matching instances that had no usable address
    pub skipped: Vec<String>,
}

/// Pick the address of `instance` to publish, if it has one
///
/// Empty strings count as missing.
pub fn select_address(
    instance: &Instance,
    family: AddressFamily,
    record_type: RecordType,
) -> Option<&str> {
    let value = match (family, record_type) {
        (AddressFamily::Private, RecordType::A) => instance.private_ip.as_deref(),
        (AddressFamily::Private, RecordType::Cname) => instance.private_dns.as_deref(),
        (AddressFamily::Public, RecordType::A) => instance.public_ip.as_deref(),
        (AddressFamily::Public, RecordType::Cname) => instance.public_dns.as_deref(),
    };
    value.filter(|v| !v.is_empty())
}

/// Query the inventory and extract one target per instance
///
/// Instances without an address of the requested family are skipped with a
/// warning. A failing inventory query is a [`Error::Discovery`].
pub async fn discover(
    inventory: &dyn InventoryProvider,
    selector: &TagSelector,
    family: AddressFamily,
    record_type: RecordType,
) -> Result<Discovery> {
    let instances = inventory
        .list_running_instances(selector)
        .await
        .map_err(|e| {
            Error::discovery(format!(
                "{} inventory query failed: {}",
                inventory.provider_name(),
                e
            ))
        })?;

    debug!(
        "Inventory {} returned {} instance(s) for selector '{}'",
        inventory.provider_name(),
        instances.len(),
        selector
    );

    let mut discovery = Discovery::default();
    for instance in &instances {
        match select_address(instance, family, record_type) {
            Some(value) => discovery.targets.push(value.to_string()),
            None => {
                match family {
                    AddressFamily::Public => warn!(
                        instance_id = %instance.id,
                        "Public addresses requested, but instance doesn't have one! Skipping instance"
                    ),
                    AddressFamily::Private => warn!(
                        instance_id = %instance.id,
                        "Instance has no private address! Skipping instance"
                    ),
                }
                discovery.skipped.push(instance.id.clone());
            }
        }
    }

    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryInventory;

    fn inventory() -> MemoryInventory {
        MemoryInventory::with_instances(vec![
            Instance::new("i-1")
                .with_tag("role", "etcd")
                .with_private("10.0.0.1", "ip-10-0-0-1.internal")
                .with_public("54.0.0.1", "ec2-54-0-0-1.compute.amazonaws.com"),
            Instance::new("i-2")
                .with_tag("role", "etcd")
                .with_private("10.0.0.2", "ip-10-0-0-2.internal"),
            Instance::new("i-3")
                .with_tag("role", "db")
                .with_private("10.0.0.3", "ip-10-0-0-3.internal"),
        ])
    }

    fn selector() -> TagSelector {
        "role=etcd".parse().unwrap()
    }

    #[tokio::test]
    async fn private_addresses_per_record_type() {
        let inv = inventory();

        let a = discover(&inv, &selector(), AddressFamily::Private, RecordType::A)
            .await
            .unwrap();
        assert_eq!(a.targets, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(a.skipped.is_empty());

        let cname = discover(&inv, &selector(), AddressFamily::Private, RecordType::Cname)
            .await
            .unwrap();
        assert_eq!(cname.targets, vec!["ip-10-0-0-1.internal", "ip-10-0-0-2.internal"]);
    }

    #[tokio::test]
    async fn public_family_skips_instances_without_public_address() {
        let inv = inventory();

        let a = discover(&inv, &selector(), AddressFamily::Public, RecordType::A)
            .await
            .unwrap();
        assert_eq!(a.targets, vec!["54.0.0.1"]);
        assert_eq!(a.skipped, vec!["i-2"]);

        let cname = discover(&inv, &selector(), AddressFamily::Public, RecordType::Cname)
            .await
            .unwrap();
        assert_eq!(cname.targets, vec!["ec2-54-0-0-1.compute.amazonaws.com"]);
    }

    #[test]
    fn empty_public_address_counts_as_missing() {
        let instance = Instance::new("i-9").with_public("", "");
        assert_eq!(
            select_address(&instance, AddressFamily::Public, RecordType::A),
            None
        );
    }

    #[tokio::test]
    async fn duplicate_addresses_are_preserved() {
        let inv = MemoryInventory::with_instances(vec![
            Instance::new("i-1").with_private("10.0.0.1", "a"),
            Instance::new("i-2").with_private("10.0.0.1", "a"),
        ]);
        let found = discover(&inv, &TagSelector::new(), AddressFamily::Private, RecordType::A)
            .await
            .unwrap();
        assert_eq!(found.targets, vec!["10.0.0.1", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn inventory_failure_is_a_discovery_error() {
        let inv = inventory();
        inv.fail_with("access denied");

        let err = discover(&inv, &selector(), AddressFamily::Private, RecordType::A)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery(_)), "got {err}");
        assert!(err.to_string().contains("access denied"));
    }
}
