// # tagdns-core
//
// Reconciliation engine that keeps DNS records in step with a pool of
// tagged compute instances.
//
// ## Architecture Overview
//
// - **InventoryProvider**: Trait for listing running instances by tag
// - **DnsProvider**: Trait for reading and upserting records in a hosted zone
// - **discovery**: One target address per matching instance
// - **routes**: Deterministic name -> target mapping
// - **ZoneReader**: Exact-name lookup of the current value of a record
// - **Reconciler**: discover -> build -> diff -> apply, one pass at a time
// - **Scheduler**: Runs passes on a fixed period with an overlap policy
// - **ProviderRegistry**: Plugin-based registry for provider backends
//
// ## Design Principles
//
// 1. **Convergence**: Repeated passes over unchanged inventory write nothing
// 2. **Caution**: A name whose current value is unknown is never written
// 3. **Injection**: Providers are passed in, there is no global session
// 4. **Library-First**: The daemon is a thin shell over this crate

pub mod config;
pub mod discovery;
pub mod error;
pub mod providers;
pub mod reconciler;
pub mod registry;
pub mod routes;
pub mod scheduler;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use config::{AddressFamily, BackendConfig, Config, OverlapPolicy, RecordType, TagSelector};
pub use error::{Error, Result};
pub use reconciler::{PassOutcome, PassReport, ReconcileEvent, Reconciler, UpdateSet};
pub use registry::ProviderRegistry;
pub use routes::build_routes;
pub use scheduler::Scheduler;
pub use traits::{DnsProvider, InventoryProvider};
pub use zone::ZoneReader;
