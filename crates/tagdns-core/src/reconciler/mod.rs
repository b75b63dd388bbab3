//! Reconciler
//!
//! The Reconciler runs one reconciliation pass:
//! - Discovering targets via InventoryProvider
//! - Building the desired routes
//! - Reading the current value of each desired name via ZoneReader
//! - Upserting the names whose value differs, as one batch
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   targets   ┌──────────────┐
//! │ InventoryProvider │────────────▶│  Reconciler  │
//! └───────────────────┘             └──────────────┘
//!                                          │
//!              ┌───────────────────────────┼───────────────────────┐
//!              │                           │                       │
//!              ▼                           ▼                       ▼
//!      ┌──────────────┐           ┌──────────────┐         ┌─────────────┐
//!      │  ZoneReader  │           │ DnsProvider  │         │   Events    │
//!      │  (per name)  │           │  (upsert)    │         │  (notify)   │
//!      └──────────────┘           └──────────────┘         └─────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Discover targets (failure ends the pass)
//! 2. Build desired routes (pure)
//! 3. Look up each desired name; unknown names are skipped
//! 4. Empty update set: done, no write
//! 5. Dry-run: log the update set, no write
//! 6. Otherwise: one UPSERT batch (failure ends the pass)
//!
//! Stale records are never deleted.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RecordType};
use crate::discovery::{self, Discovery};
use crate::error::{Error, Result};
use crate::routes::{self, DesiredRoutes};
use crate::traits::{DnsProvider, InventoryProvider, RecordChange};
use crate::zone::ZoneReader;

/// Names whose value must be written this pass: name -> value
pub type UpdateSet = BTreeMap<String, String>;

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Pass started
    PassStarted,

    /// Inventory answered
    TargetsDiscovered {
        count: usize,
    },

    /// Matching instance without a usable address
    InstanceSkipped {
        instance_id: String,
    },

    /// Current value of a name could not be read; the name is left alone
    RecordLookupFailed {
        name: String,
        error: String,
    },

    /// Zone already matches the desired routes
    NoUpdatesRequired,

    /// Update set computed
    UpdatesPlanned {
        updates: UpdateSet,
    },

    /// Dry-run suppressed the write
    DryRunSkipped {
        count: usize,
    },

    /// Batch accepted by the provider
    UpdatesApplied {
        count: usize,
    },

    /// Pass ended early
    PassFailed {
        error: String,
    },
}

/// Result of diffing desired routes against the zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Names to write
    pub updates: UpdateSet,
    /// Names whose current state could not be determined
    pub unknown: Vec<String>,
}

/// What a pass ended up doing with its update set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing to change
    NoChanges,
    /// Changes logged, not written
    DryRun,
    /// Changes written in one batch
    Applied,
}

/// Summary of a completed pass
#[derive(Debug, Clone)]
pub struct PassReport {
    /// When the pass started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Targets found
    pub discovered: usize,
    /// Instances skipped for lack of an address
    pub skipped_instances: Vec<String>,
    /// Desired routes built
    pub desired: usize,
    /// Names skipped because their lookup failed
    pub skipped_lookups: Vec<String>,
    /// Update set of the pass
    pub updates: UpdateSet,
    /// Outcome
    pub outcome: PassOutcome,
}

/// Reconciliation engine
///
/// Holds the providers and the validated configuration. All pass state is
/// local to [`Reconciler::run_pass`], so one reconciler can serve several
/// passes at once.
pub struct Reconciler {
    /// Compute inventory
    inventory: Box<dyn InventoryProvider>,

    /// Hosted zone
    dns: Box<dyn DnsProvider>,

    /// Validated configuration
    config: Config,

    /// Parsed record type
    record_type: RecordType,

    /// Domain of the hosted zone, resolved at construction
    domain: String,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Validate `config`, resolve the zone domain and build a reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver), or
    /// - `Err(Error::InvalidRecordType)` for a bad record type
    /// - `Err(Error::ProviderInit)` if the zone cannot be resolved
    pub async fn connect(
        inventory: Box<dyn InventoryProvider>,
        dns: Box<dyn DnsProvider>,
        config: Config,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;
        let record_type = config.record_kind()?;

        let domain = dns.resolve_zone_name(&config.zone_id).await.map_err(|e| {
            Error::provider_init(format!(
                "{} could not resolve zone {}: {}",
                dns.provider_name(),
                config.zone_id,
                e
            ))
        })?;
        info!("Managing zone {} ({})", config.zone_id, domain);

        let (tx, rx) = mpsc::channel(config.schedule.event_channel_capacity.max(1));

        let reconciler = Self {
            inventory,
            dns,
            config,
            record_type,
            domain,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Domain of the managed zone
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover the current targets
    pub async fn discover(&self) -> Result<Discovery> {
        let found = discovery::discover(
            self.inventory.as_ref(),
            &self.config.tags,
            self.config.address_family,
            self.record_type,
        )
        .await?;

        info!("Discovered {} target(s)", found.targets.len());
        self.emit_event(ReconcileEvent::TargetsDiscovered {
            count: found.targets.len(),
        });
        for instance_id in &found.skipped {
            self.emit_event(ReconcileEvent::InstanceSkipped {
                instance_id: instance_id.clone(),
            });
        }
        Ok(found)
    }

    /// Desired routes for `targets` in this zone
    pub fn desired_routes(&self, targets: &[String]) -> DesiredRoutes {
        routes::build_routes(targets, &self.config.subdomain_prefix, &self.domain)
    }

    /// Diff `desired` against the zone
    ///
    /// A missing record is written; a failed lookup leaves the name out of
    /// the update set. Lookup failures never fail the pass.
    pub async fn define_updates(&self, desired: &DesiredRoutes) -> Diff {
        let reader = ZoneReader::new(self.dns.as_ref(), &self.config.zone_id);
        let mut diff = Diff::default();

        for (name, value) in desired {
            match reader.get_route(name).await {
                Ok(current) if current == *value => {
                    debug!("Route {} already points at {}", name, value);
                }
                Ok(current) => {
                    debug!("Route {} points at {}, want {}", name, current, value);
                    diff.updates.insert(name.clone(), value.clone());
                }
                Err(e) if e.is_no_record() => {
                    debug!("Route {} has no record yet", name);
                    diff.updates.insert(name.clone(), value.clone());
                }
                Err(e) => {
                    error!(route = %name, "Couldn't determine the status of route: {}", e);
                    self.emit_event(ReconcileEvent::RecordLookupFailed {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                    diff.unknown.push(name.clone());
                }
            }
        }

        diff
    }

    /// Apply `updates`, honoring dry-run
    pub async fn apply(&self, updates: &UpdateSet) -> Result<PassOutcome> {
        if updates.is_empty() {
            info!("No updates required");
            self.emit_event(ReconcileEvent::NoUpdatesRequired);
            return Ok(PassOutcome::NoChanges);
        }

        info!("The following {} route(s) will be assigned", updates.len());
        for (name, value) in updates {
            info!(route = %name, value = %value, "Assigning route");
        }
        self.emit_event(ReconcileEvent::UpdatesPlanned {
            updates: updates.clone(),
        });

        if self.config.dry_run {
            warn!("Dry-run enabled, {} route(s) not written", updates.len());
            self.emit_event(ReconcileEvent::DryRunSkipped {
                count: updates.len(),
            });
            return Ok(PassOutcome::DryRun);
        }

        let changes: Vec<RecordChange> = updates
            .iter()
            .map(|(name, value)| RecordChange {
                name: name.clone(),
                record_type: self.record_type,
                value: value.clone(),
                ttl: self.config.ttl,
            })
            .collect();

        self.dns
            .upsert_records(&self.config.zone_id, &changes)
            .await
            .map_err(|e| Error::BatchApply {
                count: changes.len(),
                message: e.to_string(),
            })?;

        info!("Routes successfully updated ({})", changes.len());
        self.emit_event(ReconcileEvent::UpdatesApplied {
            count: changes.len(),
        });
        Ok(PassOutcome::Applied)
    }

    /// Run one full pass: discover, build, diff, apply
    ///
    /// # Returns
    ///
    /// - `Ok(PassReport)`: the pass completed, possibly skipping some names
    /// - `Err(Error::Discovery)` / `Err(Error::BatchApply)`: the pass ended early
    pub async fn run_pass(&self) -> Result<PassReport> {
        let started_at = chrono::Utc::now();
        self.emit_event(ReconcileEvent::PassStarted);

        let result = self.run_pass_inner(started_at).await;
        if let Err(e) = &result {
            self.emit_event(ReconcileEvent::PassFailed {
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_pass_inner(
        &self,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<PassReport> {
        let found = self.discover().await?;
        let desired = self.desired_routes(&found.targets);
        let diff = self.define_updates(&desired).await;
        let outcome = self.apply(&diff.updates).await?;

        Ok(PassReport {
            started_at,
            discovered: found.targets.len(),
            skipped_instances: found.skipped,
            desired: desired.len(),
            skipped_lookups: diff.unknown,
            updates: diff.updates,
            outcome,
        })
    }

    /// Emit a reconciler event
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MemoryInventory, MemoryZone};
    use crate::traits::Instance;

    async fn reconciler(
        inventory: &MemoryInventory,
        zone: &MemoryZone,
        config: Config,
    ) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
        Reconciler::connect(Box::new(inventory.clone()), Box::new(zone.clone()), config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn connect_rejects_invalid_record_type() {
        let result = Reconciler::connect(
            Box::new(MemoryInventory::new()),
            Box::new(MemoryZone::new("Z1", "example.com.")),
            Config::new("Z1", "etcd").with_record_type("MX"),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidRecordType(_))));
    }

    #[tokio::test]
    async fn connect_fails_when_zone_is_unknown() {
        let result = Reconciler::connect(
            Box::new(MemoryInventory::new()),
            Box::new(MemoryZone::new("Z1", "example.com.")),
            Config::new("Z9", "etcd"),
        )
        .await;
        assert!(matches!(result, Err(Error::ProviderInit(_))));
    }

    #[tokio::test]
    async fn desired_routes_use_zone_domain() {
        let inventory = MemoryInventory::new();
        let zone = MemoryZone::new("Z1", "example.com.");
        let (reconciler, _rx) = reconciler(&inventory, &zone, Config::new("Z1", "etcd")).await;

        let desired = reconciler.desired_routes(&["10.0.0.2".to_string(), "10.0.0.1".to_string()]);
        assert_eq!(desired.get("etcd0.example.com."), Some(&"10.0.0.1".to_string()));
        assert_eq!(desired.get("etcd1.example.com."), Some(&"10.0.0.2".to_string()));
    }

    #[tokio::test]
    async fn run_pass_writes_cname_records_with_ttl() {
        let inventory = MemoryInventory::with_instances(vec![
            Instance::new("i-1").with_private("10.0.0.1", "ip-10-0-0-1.internal"),
        ]);
        let zone = MemoryZone::new("Z1", "example.com.");
        let config = Config::new("Z1", "web").with_record_type("CNAME").with_ttl(300);
        let (reconciler, _rx) = reconciler(&inventory, &zone, config).await;

        let report = reconciler.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Applied);

        let set = zone.get("web0.example.com.").unwrap();
        assert_eq!(set.record_type, RecordType::Cname);
        assert_eq!(set.values, vec!["ip-10-0-0-1.internal"]);
        assert_eq!(set.ttl, 300);
    }

    #[tokio::test]
    async fn events_follow_the_pass() {
        let inventory = MemoryInventory::with_instances(vec![
            Instance::new("i-1").with_private("10.0.0.1", "a"),
        ]);
        let zone = MemoryZone::new("Z1", "example.com.");
        let (reconciler, mut rx) = reconciler(&inventory, &zone, Config::new("Z1", "etcd")).await;

        reconciler.run_pass().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&ReconcileEvent::PassStarted));
        assert!(events.contains(&ReconcileEvent::TargetsDiscovered { count: 1 }));
        assert_eq!(events.last(), Some(&ReconcileEvent::UpdatesApplied { count: 1 }));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_break_passes() {
        let inventory = MemoryInventory::new();
        let zone = MemoryZone::new("Z1", "example.com.");
        let (reconciler, rx) = reconciler(&inventory, &zone, Config::new("Z1", "etcd")).await;
        drop(rx);

        let report = reconciler.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::NoChanges);
    }
}
