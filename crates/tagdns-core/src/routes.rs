//! Desired-state builder
//!
//! Names are assigned after sorting, so an unordered but unchanged
//! discovery result always maps to the same names.

use std::collections::BTreeMap;

/// Desired DNS state: fully-qualified name -> value
pub type DesiredRoutes = BTreeMap<String, String>;

/// Map `targets` to `{prefix}{index}.{domain}` in lexicographic order
///
/// Sorting compares the strings byte-wise, so `10.100.0.1` sorts before
/// `10.2.0.1`. Duplicate targets each get their own name.
pub fn build_routes<S: AsRef<str>>(targets: &[S], prefix: &str, domain: &str) -> DesiredRoutes {
    let mut sorted: Vec<&str> = targets.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, target)| (format!("{}{}.{}", prefix, index, domain), target.to_string()))
        .collect()
}
