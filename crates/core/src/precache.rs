//! Precache manifest types and cache naming.

use serde::{Deserialize, Serialize};

/// Prefix shared by every generation's precache cache.
pub const PRECACHE_PREFIX: &str = "precache-";

/// A URL that is fetched at install time, keyed by content revision.
///
/// The URL may be relative to the application origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    pub revision: String,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self { url: url.into(), revision: revision.into() }
    }
}

/// Name of the precache cache for `generation`.
pub fn precache_cache_name(generation: &str) -> String {
    format!("{PRECACHE_PREFIX}{generation}")
}

/// True when `cache_name` is a precache cache from a generation other than
/// `generation`.
pub fn is_outdated_precache(cache_name: &str, generation: &str) -> bool {
    cache_name.starts_with(PRECACHE_PREFIX) && cache_name != precache_cache_name(generation)
}
