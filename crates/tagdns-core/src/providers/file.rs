// # File Providers
//
// JSON-file implementations of InventoryProvider and DnsProvider.
//
// ## Purpose
//
// Running the daemon against a local inventory snapshot and a local zone,
// e.g. to rehearse a rollout before pointing it at the real services.
// Both providers read the file on every call and keep nothing in memory.
//
// ## Crash Recovery (zone file)
//
// - Atomic writes: write-then-rename
// - Backup: the previous zone file is kept as `.backup`
// - Recovery: a zone file that fails to parse is replaced by its backup
//
// ## File Formats
//
// Inventory:
//
// ```json
// {
//   "instances": [
//     { "id": "i-0abc", "state": "running", "tags": { "role": "etcd" },
//       "private_ip": "10.0.0.1", "private_dns": "ip-10-0-0-1.internal" }
//   ]
// }
// ```
//
// Zone:
//
// ```json
// {
//   "version": "1.0",
//   "zone_id": "Z123",
//   "domain": "example.com.",
//   "records": {
//     "etcd0.example.com": {
//       "name": "etcd0.example.com.",
//       "record_type": "A",
//       "values": ["10.0.0.1"],
//       "ttl": 60,
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::{BackendConfig, TagSelector};
use crate::error::{Error, Result};
use crate::traits::{
    DnsProvider, DnsProviderFactory, Instance, InventoryProvider, InventoryProviderFactory,
    RecordChange, RecordSet,
};

const PROVIDER_NAME: &str = "file";

/// Zone file format version
const ZONE_FILE_VERSION: &str = "1.0";

#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    instances: Vec<Instance>,
}

/// Inventory read from a JSON snapshot
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    /// Create an inventory backed by `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl InventoryProvider for FileInventory {
    async fn list_running_instances(&self, selector: &TagSelector) -> Result<Vec<Instance>> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::provider(
                PROVIDER_NAME,
                format!("Failed to read inventory {}: {}", self.path.display(), e),
            )
        })?;
        let file: InventoryFile = serde_json::from_str(&content)?;

        Ok(file
            .instances
            .into_iter()
            .filter(|instance| instance.is_selected_by(selector))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// A record set plus the time it was last written
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    set: RecordSet,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// Serializable zone file format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneFile {
    version: String,
    zone_id: String,
    domain: String,
    #[serde(default)]
    records: BTreeMap<String, StoredRecord>,
}

fn record_key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Hosted zone persisted as a JSON document
#[derive(Debug)]
pub struct FileZone {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileZone {
    /// Open the zone stored at `path`
    ///
    /// The file is not read until the first call.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Write an empty zone file for `zone_id` and open it
    pub async fn create<P: AsRef<Path>>(
        path: P,
        zone_id: impl Into<String>,
        domain: impl Into<String>,
    ) -> Result<Self> {
        let zone = Self::new(path);

        if let Some(parent) = zone.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }

        zone.write_zone(&ZoneFile {
            version: ZONE_FILE_VERSION.to_string(),
            zone_id: zone_id.into(),
            domain: domain.into(),
            records: BTreeMap::new(),
        })
        .await?;
        Ok(zone)
    }

    /// Load the zone, falling back to the backup if the file is corrupted
    async fn load_with_recovery(&self) -> Result<ZoneFile> {
        match Self::load(&self.path).await {
            Ok(zone) => Ok(zone),
            Err(Error::Json(e)) => {
                let backup_path = Self::backup_path(&self.path);
                tracing::warn!(
                    "Zone file {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );

                let zone = Self::load(&backup_path).await.map_err(|backup_err| {
                    Error::provider(
                        PROVIDER_NAME,
                        format!(
                            "Zone file {} is corrupted and backup is unusable: {}",
                            self.path.display(),
                            backup_err
                        ),
                    )
                })?;

                if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!("Failed to restore zone file from backup: {}", restore_err);
                } else {
                    tracing::info!("Restored zone file from backup");
                }
                Ok(zone)
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<ZoneFile> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::provider(
                PROVIDER_NAME,
                format!("Failed to read zone file {}: {}", path.display(), e),
            )
        })?;

        let zone: ZoneFile = serde_json::from_str(&content)?;
        if zone.version != ZONE_FILE_VERSION {
            tracing::warn!(
                "Zone file version mismatch: expected {}, got {}. Attempting to load anyway.",
                ZONE_FILE_VERSION,
                zone.version
            );
        }
        Ok(zone)
    }

    async fn load_zone(&self, zone_id: &str) -> Result<ZoneFile> {
        let zone = self.load_with_recovery().await?;
        if zone.zone_id != zone_id {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("No hosted zone found with id {}", zone_id),
            ));
        }
        Ok(zone)
    }

    /// Write the zone atomically, keeping the previous file as backup
    async fn write_zone(&self, zone: &ZoneFile) -> Result<()> {
        let json = serde_json::to_string_pretty(zone)?;

        let temp_path = Self::temp_path(&self.path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create zone backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await?;
        tracing::trace!("Zone written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DnsProvider for FileZone {
    async fn resolve_zone_name(&self, zone_id: &str) -> Result<String> {
        Ok(self.load_zone(zone_id).await?.domain)
    }

    async fn find_record_set(&self, zone_id: &str, name: &str) -> Result<Option<RecordSet>> {
        let zone = self.load_zone(zone_id).await?;
        Ok(zone
            .records
            .range(record_key(name)..)
            .next()
            .map(|(_, stored)| stored.set.clone()))
    }

    async fn upsert_records(&self, zone_id: &str, changes: &[RecordChange]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut zone = self.load_zone(zone_id).await?;

        let now = chrono::Utc::now();
        for change in changes {
            zone.records.insert(
                record_key(&change.name),
                StoredRecord {
                    set: RecordSet::from(change.clone()),
                    updated_at: now,
                },
            );
        }

        self.write_zone(&zone).await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

fn file_path(config: &BackendConfig) -> Result<&str> {
    match config {
        BackendConfig::File { path } if !path.is_empty() => Ok(path),
        BackendConfig::File { .. } => Err(Error::config("File backend path cannot be empty")),
        other => Err(Error::config(format!(
            "File backend factory cannot build '{}' backends",
            other.type_name()
        ))),
    }
}

/// Factory for [`FileInventory`]
pub struct FileInventoryFactory;

impl InventoryProviderFactory for FileInventoryFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn InventoryProvider>> {
        Ok(Box::new(FileInventory::new(file_path(config)?)))
    }
}

/// Factory for [`FileZone`]
pub struct FileZoneFactory;

impl DnsProviderFactory for FileZoneFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(FileZone::new(file_path(config)?)))
    }
}
