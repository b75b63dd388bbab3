//! Error types for tagdns
//!
//! The variants follow how far an error is allowed to travel:
//!
//! - [`Error::Config`], [`Error::InvalidRecordType`], [`Error::ProviderInit`]:
//!   fatal before the scheduler starts
//! - [`Error::Discovery`], [`Error::BatchApply`]: end the current pass only
//! - [`Error::RecordLookup`]: one name is skipped, the pass continues
//! - [`Error::NoRecord`]: not a failure, the zone simply has no record yet

use thiserror::Error;

/// Result type alias for tagdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tagdns
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record type other than A or CNAME
    #[error("Invalid record type '{0}', must be CNAME or A")]
    InvalidRecordType(String),

    /// Provider could not be initialized (e.g. the zone lookup failed)
    #[error("Provider initialization failed: {0}")]
    ProviderInit(String),

    /// Inventory query failed
    #[error("Target discovery failed: {0}")]
    Discovery(String),

    /// The zone holds no record for the name
    #[error("No record for {name}")]
    NoRecord {
        /// Queried DNS name
        name: String,
    },

    /// Current value of a name could not be determined
    #[error("Couldn't determine the status of route {name}: {message}")]
    RecordLookup {
        /// Queried DNS name
        name: String,
        /// Underlying provider message
        message: String,
    },

    /// Batched upsert rejected by the DNS provider
    #[error("Batch upsert of {count} record(s) failed: {message}")]
    BatchApply {
        /// Number of changes in the rejected batch
        count: usize,
        /// Underlying provider message
        message: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Filesystem errors (file backends)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider initialization error
    pub fn provider_init(msg: impl Into<String>) -> Self {
        Self::ProviderInit(msg.into())
    }

    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a "no record" marker for `name`
    pub fn no_record(name: impl Into<String>) -> Self {
        Self::NoRecord { name: name.into() }
    }

    /// Create a per-name lookup error
    pub fn record_lookup(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecordLookup {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this is the "no record" marker rather than a real failure
    pub fn is_no_record(&self) -> bool {
        matches!(self, Self::NoRecord { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_record_type_names_the_value() {
        let err = Error::InvalidRecordType("AAAA".to_string());
        assert_eq!(err.to_string(), "Invalid record type 'AAAA', must be CNAME or A");
    }

    #[test]
    fn no_record_is_distinguishable() {
        assert!(Error::no_record("etcd0.example.com").is_no_record());
        assert!(!Error::record_lookup("etcd0.example.com", "throttled").is_no_record());
    }
}
