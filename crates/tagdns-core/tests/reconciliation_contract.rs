//! Contract Test: Reconciliation Pass
//!
//! Constraints verified:
//! - Unchanged inventory converges to zero writes
//! - Missing records are created, differing ones upserted, equal ones left alone
//! - A name whose lookup fails is never written, and the pass still completes
//! - Dry-run logs the update set but never calls the provider
//! - All changes of a pass go out as one batch with the configured type and TTL
//! - Discovery and batch failures end the pass with an error

mod common;

use common::*;
use tagdns_core::config::{AddressFamily, RecordType};
use tagdns_core::traits::{Instance, RecordSet};
use tagdns_core::{Error, PassOutcome, ReconcileEvent};
use tagdns_core::providers::MemoryInventory;
use tokio_test::{assert_err, assert_ok};

fn a_record(name: &str, value: &str) -> RecordSet {
    RecordSet {
        name: name.to_string(),
        record_type: RecordType::A,
        values: vec![value.to_string()],
        ttl: 60,
    }
}

#[tokio::test]
async fn second_pass_over_unchanged_inventory_writes_nothing() {
    let inventory = MemoryInventory::with_instances(etcd_instances(&[
        "10.100.0.1",
        "10.0.100.1",
        "10.101.0.1",
    ]));
    let zone = zone();
    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config()).await;

    let first = assert_ok!(reconciler.run_pass().await);
    assert_eq!(first.outcome, PassOutcome::Applied);
    assert_eq!(first.updates.len(), 3);
    assert_eq!(zone.get("etcd0.skuid.com.").unwrap().values, vec!["10.0.100.1"]);
    assert_eq!(zone.get("etcd1.skuid.com.").unwrap().values, vec!["10.100.0.1"]);
    assert_eq!(zone.get("etcd2.skuid.com.").unwrap().values, vec!["10.101.0.1"]);

    // Same instances, different discovery order
    inventory.set_instances(etcd_instances(&["10.101.0.1", "10.100.0.1", "10.0.100.1"]));

    let second = assert_ok!(reconciler.run_pass().await);
    assert_eq!(second.outcome, PassOutcome::NoChanges);
    assert!(second.updates.is_empty());
    assert_eq!(zone.batches().len(), 1, "second pass must not write");
}

#[tokio::test]
async fn only_missing_and_differing_names_are_updated() {
    let inventory =
        MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
    let zone = zone();
    zone.insert(a_record("etcd0.skuid.com.", "10.0.0.1"));
    zone.insert(a_record("etcd1.skuid.com.", "10.9.9.9"));

    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config()).await;
    let report = assert_ok!(reconciler.run_pass().await);

    let updated: Vec<_> = report.updates.keys().cloned().collect();
    assert_eq!(updated, vec!["etcd1.skuid.com.", "etcd2.skuid.com."]);
    assert_eq!(zone.get("etcd1.skuid.com.").unwrap().values, vec!["10.0.0.2"]);
    assert_eq!(zone.get("etcd2.skuid.com.").unwrap().values, vec!["10.0.0.3"]);
}

#[tokio::test]
async fn nearest_following_record_does_not_count_as_current() {
    // Only etcd1 exists; looking up etcd0 yields etcd1's set, which must be ignored
    let inventory = MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2"]));
    let zone = zone();
    zone.insert(a_record("etcd1.skuid.com.", "10.0.0.1"));

    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config()).await;
    let report = assert_ok!(reconciler.run_pass().await);

    assert_eq!(report.updates.get("etcd0.skuid.com."), Some(&"10.0.0.1".to_string()));
    assert_eq!(report.updates.get("etcd1.skuid.com."), Some(&"10.0.0.2".to_string()));
}

#[tokio::test]
async fn failed_lookup_excludes_name_but_pass_completes() {
    let inventory =
        MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
    let zone = zone();
    zone.insert(a_record("etcd1.skuid.com.", "10.9.9.9"));
    zone.fail_lookups_for("etcd1.skuid.com.");

    let (reconciler, mut rx) = reconciler(&inventory, &zone, etcd_config()).await;
    let report = assert_ok!(reconciler.run_pass().await);

    assert_eq!(report.outcome, PassOutcome::Applied);
    assert_eq!(report.skipped_lookups, vec!["etcd1.skuid.com."]);
    assert!(!report.updates.contains_key("etcd1.skuid.com."));
    assert_eq!(report.updates.len(), 2);

    // The unknown record keeps its old value
    assert_eq!(zone.get("etcd1.skuid.com.").unwrap().values, vec!["10.9.9.9"]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ReconcileEvent::RecordLookupFailed { name, .. } if name == "etcd1.skuid.com."
    )));
}

#[tokio::test]
async fn dry_run_plans_but_never_writes() {
    let inventory = MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2"]));
    let zone = zone();
    let (reconciler, mut rx) =
        reconciler(&inventory, &zone, etcd_config().with_dry_run(true)).await;

    let report = assert_ok!(reconciler.run_pass().await);
    assert_eq!(report.outcome, PassOutcome::DryRun);
    assert_eq!(report.updates.len(), 2);
    assert!(zone.batches().is_empty());
    assert!(zone.is_empty());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ReconcileEvent::UpdatesPlanned { updates } if updates.len() == 2
    )));
    assert!(events.contains(&ReconcileEvent::DryRunSkipped { count: 2 }));
}

#[tokio::test]
async fn changes_go_out_as_one_batch_with_configured_type_and_ttl() {
    let inventory =
        MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
    let zone = zone();
    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config().with_ttl(120)).await;

    assert_ok!(reconciler.run_pass().await);

    let batches = zone.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert!(
        batches[0]
            .iter()
            .all(|c| c.record_type == RecordType::A && c.ttl == 120)
    );
}

#[tokio::test]
async fn empty_inventory_writes_nothing() {
    let inventory = MemoryInventory::new();
    let zone = zone();
    let (reconciler, mut rx) = reconciler(&inventory, &zone, etcd_config()).await;

    let report = assert_ok!(reconciler.run_pass().await);
    assert_eq!(report.outcome, PassOutcome::NoChanges);
    assert!(zone.batches().is_empty());
    assert!(drain(&mut rx).contains(&ReconcileEvent::NoUpdatesRequired));
}

#[tokio::test]
async fn stale_records_are_not_deleted() {
    let inventory = MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2"]));
    let zone = zone();
    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config()).await;
    assert_ok!(reconciler.run_pass().await);

    inventory.set_instances(etcd_instances(&["10.0.0.1"]));
    let report = assert_ok!(reconciler.run_pass().await);

    assert_eq!(report.outcome, PassOutcome::NoChanges);
    assert_eq!(zone.get("etcd1.skuid.com.").unwrap().values, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn public_family_skips_instances_without_public_address() {
    let inventory = MemoryInventory::with_instances(vec![
        Instance::new("i-1")
            .with_tag("role", "etcd")
            .with_private("10.0.0.1", "a.internal")
            .with_public("54.0.0.1", "ec2-54-0-0-1.compute.amazonaws.com"),
        Instance::new("i-2")
            .with_tag("role", "etcd")
            .with_private("10.0.0.2", "b.internal"),
    ]);
    let zone = zone();
    let config = etcd_config().with_address_family(AddressFamily::Public);
    let (reconciler, mut rx) = reconciler(&inventory, &zone, config).await;

    let report = assert_ok!(reconciler.run_pass().await);
    assert_eq!(report.discovered, 1);
    assert_eq!(report.skipped_instances, vec!["i-2"]);
    assert_eq!(zone.get("etcd0.skuid.com.").unwrap().values, vec!["54.0.0.1"]);

    let events = drain(&mut rx);
    assert!(events.contains(&ReconcileEvent::InstanceSkipped {
        instance_id: "i-2".to_string()
    }));
}

#[tokio::test]
async fn discovery_failure_ends_the_pass() {
    let inventory = MemoryInventory::with_instances(etcd_instances(&["10.0.0.1"]));
    inventory.fail_with("request expired");
    let zone = zone();
    let (reconciler, mut rx) = reconciler(&inventory, &zone, etcd_config()).await;

    let err = assert_err!(reconciler.run_pass().await);
    assert!(matches!(err, Error::Discovery(_)), "got {err}");
    assert!(zone.batches().is_empty());
    assert!(matches!(
        drain(&mut rx).last(),
        Some(ReconcileEvent::PassFailed { .. })
    ));

    // The next pass starts from scratch
    inventory.clear_failure();
    assert_ok!(reconciler.run_pass().await);
    assert_eq!(zone.len(), 1);
}

#[tokio::test]
async fn batch_failure_is_a_pass_error() {
    let inventory = MemoryInventory::with_instances(etcd_instances(&["10.0.0.1", "10.0.0.2"]));
    let zone = zone();
    zone.fail_upserts_with("throttled");
    let (reconciler, _rx) = reconciler(&inventory, &zone, etcd_config()).await;

    let err = assert_err!(reconciler.run_pass().await);
    match err {
        Error::BatchApply { count, message } => {
            assert_eq!(count, 2);
            assert!(message.contains("throttled"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
