//! Configuration types for tagdns
//!
//! [`Config`] is built once at process start, validated with
//! [`Config::validate`] and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Main tagdns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hosted zone identifier
    pub zone_id: String,

    /// Prefix of every managed name (`{prefix}{index}.{domain}`)
    #[serde(default)]
    pub subdomain_prefix: String,

    /// Instances must carry every one of these tags
    #[serde(default)]
    pub tags: TagSelector,

    /// Region the providers talk to
    #[serde(default)]
    pub region: String,

    /// Record type as configured ("A" or "CNAME"); see [`Config::record_kind`]
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// Which address of an instance to publish
    #[serde(default)]
    pub address_family: AddressFamily,

    /// TTL applied to every upserted record
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Log the planned changes without writing them
    #[serde(default)]
    pub dry_run: bool,

    /// Scheduling settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Create a configuration for `zone_id` with defaults everywhere else
    pub fn new(zone_id: impl Into<String>, subdomain_prefix: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            subdomain_prefix: subdomain_prefix.into(),
            tags: TagSelector::default(),
            region: String::new(),
            record_type: default_record_type(),
            address_family: AddressFamily::default(),
            ttl: default_ttl(),
            dry_run: false,
            schedule: ScheduleConfig::default(),
        }
    }

    /// Set the tag selector
    pub fn with_tags(mut self, tags: TagSelector) -> Self {
        self.tags = tags;
        self
    }

    /// Set the raw record type
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    /// Set the address family
    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable dry-run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the configuration
    ///
    /// Only the record type is checked. Zone and region problems surface
    /// when the providers are first called.
    pub fn validate(&self) -> Result<()> {
        self.record_kind().map(|_| ())
    }

    /// Parsed record type
    pub fn record_kind(&self) -> Result<RecordType> {
        self.record_type.parse()
    }
}

fn default_record_type() -> String {
    RecordType::A.to_string()
}

fn default_ttl() -> u32 {
    60
}

/// DNS record type managed by tagdns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Address record, targets are IP literals
    #[serde(rename = "A")]
    A,
    /// Canonical name record, targets are hostnames
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(RecordType::A),
            "CNAME" => Ok(RecordType::Cname),
            other => Err(Error::InvalidRecordType(other.to_string())),
        }
    }
}

/// Which address of an instance is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Private IP / private DNS name
    #[default]
    Private,
    /// Public IP / public DNS name; instances without one are skipped
    Public,
}

/// Tag selector: every `key=value` pair must match exactly
///
/// Keys are unique. Parsed from a comma separated list:
///
/// ```
/// use tagdns_core::config::TagSelector;
///
/// let selector: TagSelector = "role=etcd,env=prod".parse().unwrap();
/// assert_eq!(selector.get("role"), Some("etcd"));
/// assert_eq!(selector.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSelector {
    pairs: BTreeMap<String, String>,
}

impl TagSelector {
    /// Create an empty selector (matches every instance)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair, rejecting duplicate keys
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::config("Tag key cannot be empty"));
        }
        if self.pairs.contains_key(&key) {
            return Err(Error::config(format!("Duplicate tag key '{}'", key)));
        }
        self.pairs.insert(key, value.into());
        Ok(())
    }

    /// Builder form of [`TagSelector::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Value required for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Iterate over the pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if the selector has no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Logical AND of exact matches over all pairs
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        self.pairs
            .iter()
            .all(|(key, value)| tags.get(key) == Some(value))
    }
}

impl FromStr for TagSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut selector = TagSelector::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::config(format!(
                    "Invalid tag '{}'. Each tag should have the format \"k=v\"",
                    pair
                ))
            })?;
            selector.insert(key.trim(), value.trim())?;
        }
        Ok(selector)
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// What the scheduler does when a tick arrives while a pass is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Skip the tick
    #[default]
    Skip,
    /// Start another pass anyway; passes may interleave
    Concurrent,
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(OverlapPolicy::Skip),
            "concurrent" => Ok(OverlapPolicy::Concurrent),
            other => Err(Error::config(format!(
                "Unknown overlap policy '{}'. Valid: skip, concurrent",
                other
            ))),
        }
    }
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between passes. Values below the scheduler floor are raised.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Overlapping pass handling
    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// Capacity of the reconciler event channel
    ///
    /// When full, events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            overlap: OverlapPolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_period_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Provider backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process provider
    #[default]
    Memory,

    /// JSON file provider
    File {
        /// Path to the JSON document
        path: String,
    },

    /// Provider registered under a custom name
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl BackendConfig {
    /// Registry key for this backend
    pub fn type_name(&self) -> &str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::File { .. } => "file",
            BackendConfig::Custom { factory, .. } => factory,
        }
    }
}
