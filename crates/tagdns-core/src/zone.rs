//! Zone reader
//!
//! Reads the current value of a single name from the DNS provider. The
//! provider may answer with the nearest following record set, so a result is
//! only accepted when its name equals the queried one.

use tracing::trace;

use crate::error::{Error, Result};
use crate::traits::DnsProvider;

/// Compare DNS names ignoring ASCII case and a trailing root dot
pub fn names_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Per-name view of one hosted zone
pub struct ZoneReader<'a> {
    provider: &'a dyn DnsProvider,
    zone_id: &'a str,
}

impl<'a> ZoneReader<'a> {
    /// Create a reader for `zone_id`
    pub fn new(provider: &'a dyn DnsProvider, zone_id: &'a str) -> Self {
        Self { provider, zone_id }
    }

    /// Current value recorded for `name`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: first value of the record set named `name`
    /// - `Err(Error::NoRecord)`: no record set with that exact name, or one
    ///   without values
    /// - `Err(Error::RecordLookup)`: the provider request failed
    pub async fn get_route(&self, name: &str) -> Result<String> {
        let found = self
            .provider
            .find_record_set(self.zone_id, name)
            .await
            .map_err(|e| Error::record_lookup(name, e.to_string()))?;

        let Some(set) = found else {
            return Err(Error::no_record(name));
        };

        if !names_equal(&set.name, name) {
            trace!("Nearest record set for {} is {}, treating as absent", name, set.name);
            return Err(Error::no_record(name));
        }

        set.values
            .into_iter()
            .next()
            .ok_or_else(|| Error::no_record(name))
    }
}
