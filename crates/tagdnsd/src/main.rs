// # tagdnsd - tag-driven DNS daemon
//
// Thin integration layer over tagdns-core. All reconciliation logic lives
// in the library; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes tracing and the runtime
// 3. Builds the providers through the registry
// 4. Runs the scheduler until SIGINT/SIGTERM
//
// ## Configuration
//
// ### Zone and records
// - `TAGDNS_ZONE_ID`: Hosted zone id (required)
// - `TAGDNS_PREFIX`: Subdomain prefix, records are `{prefix}{n}.{domain}`
// - `TAGDNS_RECORD_TYPE`: `A` (default) or `CNAME`
// - `TAGDNS_TTL`: Record TTL in seconds (default 60)
//
// ### Discovery
// - `TAGDNS_TAGS`: Tags to match, `k=v,k=v`
// - `TAGDNS_REGION`: Region (falls back to `AWS_DEFAULT_REGION`)
// - `TAGDNS_PRIVATE`: Publish private (`true`, default) or public addresses
//
// ### Behavior
// - `TAGDNS_DRY_RUN`: Log planned changes without writing (default false)
// - `TAGDNS_PERIOD_SECS`: Seconds between passes (default 60, minimum 10)
// - `TAGDNS_OVERLAP`: `skip` (default) or `concurrent`
// - `TAGDNS_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ### Backends
// - `TAGDNS_INVENTORY_BACKEND`: Inventory backend (only `file`)
// - `TAGDNS_INVENTORY_PATH`: Inventory JSON file (required)
// - `TAGDNS_ZONE_BACKEND`: Zone backend (only `file`)
// - `TAGDNS_ZONE_PATH`: Zone JSON file (required, must already exist)
//
// ## Example
//
// ```bash
// export TAGDNS_ZONE_ID=Z0123456789
// export TAGDNS_PREFIX=etcd
// export TAGDNS_TAGS=role=etcd,env=prod
// export TAGDNS_INVENTORY_PATH=/var/lib/tagdns/inventory.json
// export TAGDNS_ZONE_PATH=/var/lib/tagdns/zone.json
//
// tagdnsd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tagdns_core::config::{AddressFamily, BackendConfig, Config, OverlapPolicy, ScheduleConfig};
use tagdns_core::{ProviderRegistry, ReconcileEvent, Reconciler, Scheduler, TagSelector};
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TagDnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or provider initialization failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<TagDnsExitCode> for ExitCode {
    fn from(code: TagDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings read from the environment
struct Settings {
    config: Config,
    inventory: BackendConfig,
    zone: BackendConfig,
    log_level: Level,
}

/// Read an optional variable, treating empty as unset
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(name: &str, default: bool) -> Result<bool> {
    match var(name) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{} must be true or false. Got: {}", name, other),
        },
    }
}

fn parse_number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .with_context(|| format!("{} must be a number. Got: {}", name, v)),
    }
}

fn backend(kind: &str, path_var: &str, backend_var: &str) -> Result<BackendConfig> {
    let name = var(backend_var).unwrap_or_else(|| "file".to_string());
    if name != "file" {
        anyhow::bail!(
            "{} '{}' is not supported. Valid backends: file",
            backend_var,
            name
        );
    }

    let path = var(path_var).with_context(|| {
        format!(
            "{} is required for the file {} backend. \
            Set it via: export {}=/var/lib/tagdns/{}.json",
            path_var, kind, path_var, kind
        )
    })?;
    Ok(BackendConfig::File { path })
}

impl Settings {
    /// Load and validate settings from environment variables
    fn from_env() -> Result<Self> {
        let zone_id = var("TAGDNS_ZONE_ID").context(
            "TAGDNS_ZONE_ID is required. Set it via: export TAGDNS_ZONE_ID=Z0123456789",
        )?;

        let tags: TagSelector = var("TAGDNS_TAGS")
            .unwrap_or_default()
            .parse()
            .context("TAGDNS_TAGS is invalid")?;

        let address_family = if parse_bool("TAGDNS_PRIVATE", true)? {
            AddressFamily::Private
        } else {
            AddressFamily::Public
        };

        let ttl: u32 = parse_number("TAGDNS_TTL", 60)?;
        if ttl == 0 {
            anyhow::bail!("TAGDNS_TTL must be greater than 0");
        }

        let overlap: OverlapPolicy = var("TAGDNS_OVERLAP")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let mut config = Config::new(zone_id, var("TAGDNS_PREFIX").unwrap_or_default())
            .with_tags(tags)
            .with_record_type(var("TAGDNS_RECORD_TYPE").unwrap_or_else(|| "A".to_string()))
            .with_address_family(address_family)
            .with_ttl(ttl)
            .with_dry_run(parse_bool("TAGDNS_DRY_RUN", false)?);
        config.region = var("TAGDNS_REGION")
            .or_else(|| var("AWS_DEFAULT_REGION"))
            .unwrap_or_default();
        config.schedule = ScheduleConfig {
            period_secs: parse_number("TAGDNS_PERIOD_SECS", 60)?,
            overlap,
            ..ScheduleConfig::default()
        };

        config.validate()?;

        let log_level = match var("TAGDNS_LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "TAGDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        Ok(Self {
            config,
            inventory: backend("inventory", "TAGDNS_INVENTORY_PATH", "TAGDNS_INVENTORY_BACKEND")?,
            zone: backend("zone", "TAGDNS_ZONE_PATH", "TAGDNS_ZONE_BACKEND")?,
            log_level,
        })
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return TagDnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TagDnsExitCode::ConfigError.into();
    }

    info!("Starting tagdnsd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TagDnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let scheduler = match start(settings).await {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return TagDnsExitCode::ConfigError;
            }
        };

        match run_until_signal(&scheduler).await {
            Ok(signal) => {
                info!("Received {}, shutting down", signal);
                TagDnsExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                TagDnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Build providers and the reconciler; failures here are fatal
async fn start(settings: Settings) -> Result<Scheduler> {
    let registry = ProviderRegistry::with_builtin();

    let inventory = registry.create_inventory(&settings.inventory)?;
    let dns = registry.create_dns(&settings.zone)?;
    info!(
        "Inventory backend: {}, zone backend: {}",
        inventory.provider_name(),
        dns.provider_name()
    );

    let config = settings.config;
    info!(
        zone = %config.zone_id,
        prefix = %config.subdomain_prefix,
        tags = %config.tags,
        region = %config.region,
        record_type = %config.record_type,
        ttl = config.ttl,
        dry_run = config.dry_run,
        "Configuration loaded"
    );
    let schedule = config.schedule.clone();

    let (reconciler, mut events) = Reconciler::connect(inventory, dns, config).await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    Ok(Scheduler::new(Arc::new(reconciler), &schedule))
}

fn log_event(event: &ReconcileEvent) {
    debug!(?event, "Reconciler event");
}

/// Run the scheduler until SIGTERM or SIGINT
#[cfg(unix)]
async fn run_until_signal(scheduler: &Scheduler) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_run = scheduler.run_with_shutdown(Some(shutdown_rx));
    tokio::pin!(scheduler_run);

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        result = &mut scheduler_run => {
            result?;
            anyhow::bail!("Scheduler stopped unexpectedly");
        }
    };

    let _ = shutdown_tx.send(());
    scheduler_run.await?;
    Ok(received)
}

/// Run the scheduler until Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn run_until_signal(scheduler: &Scheduler) -> Result<&'static str> {
    scheduler.run().await?;
    Ok("SIGINT")
}
