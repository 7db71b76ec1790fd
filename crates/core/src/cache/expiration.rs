//! Count and age limits for a named cache.
//!
//! Count is enforced eagerly after every write; age is enforced lazily on
//! read (a stale entry reads as a miss and is evicted) or by an explicit
//! sweep. There is no timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::CacheStore;
use super::entries::CacheEntry;
use super::key::RequestKey;
use crate::Error;
use crate::http::Response;

pub const MINUTE: u64 = 60;
pub const DAY: u64 = 24 * 60 * MINUTE;
pub const YEAR: u64 = 365 * DAY;

/// Largest age chrono can represent as a `Duration`.
const MAX_AGE_SECONDS_CAP: u64 = (i64::MAX / 1000) as u64;

/// Limits attached to one cache.
///
/// `max_entries = 0` disables storage: every write is evicted immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationRule {
    pub max_entries: usize,
    pub max_age_seconds: u64,
}

impl ExpirationRule {
    pub const fn new(max_entries: usize, max_age_seconds: u64) -> Self {
        Self { max_entries, max_age_seconds }
    }

    pub fn max_age(&self) -> chrono::Duration {
        let seconds = self.max_age_seconds.min(MAX_AGE_SECONDS_CAP);
        chrono::Duration::seconds(seconds as i64)
    }

    pub fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) > self.max_age()
    }
}

impl CacheStore {
    /// Write `response`, then trim the cache to `rule.max_entries`.
    ///
    /// Returns the number of entries evicted by the trim.
    pub async fn put_with_rule(
        &self, cache_name: &str, key: &RequestKey, response: &Response, rule: &ExpirationRule,
    ) -> Result<u64, Error> {
        self.put(cache_name, key, response).await?;
        self.enforce(cache_name, rule).await
    }

    /// Evict oldest-written entries until the count fits `rule.max_entries`.
    pub async fn enforce(&self, cache_name: &str, rule: &ExpirationRule) -> Result<u64, Error> {
        let evicted = self.evict_oldest(cache_name, rule.max_entries).await?;
        if evicted > 0 {
            tracing::debug!(cache = cache_name, evicted, max_entries = rule.max_entries, "trimmed cache");
        }
        Ok(evicted)
    }

    /// Read `key`, treating entries older than `rule.max_age_seconds` as absent.
    ///
    /// A stale entry is deleted before returning the miss. Failure to delete
    /// is logged; the read still reports a miss.
    pub async fn get_fresh(
        &self, cache_name: &str, key: &RequestKey, rule: &ExpirationRule,
    ) -> Result<Option<CacheEntry>, Error> {
        let Some(entry) = self.get(cache_name, key).await? else {
            return Ok(None);
        };

        if rule.is_expired(&entry, Utc::now()) {
            tracing::debug!(cache = cache_name, key = %key, "cache entry expired");
            if let Err(e) = self.delete(cache_name, key).await {
                tracing::warn!(cache = cache_name, key = %key, error = %e, "failed to evict expired entry");
            }
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Delete every entry in `cache_name` older than `rule.max_age_seconds`.
    pub async fn sweep_expired(&self, cache_name: &str, rule: &ExpirationRule) -> Result<u64, Error> {
        let Some(cutoff) = Utc::now().checked_sub_signed(rule.max_age()) else {
            return Ok(0);
        };
        let evicted = self.evict_stored_before(cache_name, cutoff).await?;
        if evicted > 0 {
            tracing::debug!(cache = cache_name, evicted, "swept expired entries");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> RequestKey {
        RequestKey::get(format!("https://app.test/img/{i}.png"))
    }

    #[tokio::test]
    async fn test_count_limit_keeps_most_recent() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let rule = ExpirationRule::new(3, DAY);

        for i in 0..7 {
            store
                .put_with_rule("images-cache", &key(i), &Response::new(200, format!("{i}")), &rule)
                .await
                .unwrap();
            assert!(store.entry_count("images-cache").await.unwrap() <= 3);
        }

        assert_eq!(store.list_keys("images-cache").await.unwrap(), vec![key(4), key(5), key(6)]);
    }

    #[tokio::test]
    async fn test_zero_max_entries_disables_storage() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let rule = ExpirationRule::new(0, DAY);

        let evicted = store
            .put_with_rule("c", &key(1), &Response::new(200, "x"), &rule)
            .await
            .unwrap();

        assert_eq!(evicted, 1);
        assert!(store.get("c", &key(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_reads_as_miss_and_is_evicted() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let rule = ExpirationRule::new(10, 5 * MINUTE);
        let stored_at = Utc::now() - chrono::Duration::minutes(6);
        store
            .put_entry("api-cache", &key(1), &Response::new(200, "old"), stored_at, None)
            .await
            .unwrap();

        // still physically present before the read
        assert!(store.get("api-cache", &key(1)).await.unwrap().is_some());

        assert!(store.get_fresh("api-cache", &key(1), &rule).await.unwrap().is_none());
        assert!(store.get("api-cache", &key(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_entry_returned() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let rule = ExpirationRule::new(10, 5 * MINUTE);
        store.put("api-cache", &key(1), &Response::new(200, "new")).await.unwrap();

        let entry = store.get_fresh("api-cache", &key(1), &rule).await.unwrap().unwrap();
        assert_eq!(entry.response.text(), "new");
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let rule = ExpirationRule::new(10, DAY);
        let now = Utc::now();
        store
            .put_entry("c", &key(1), &Response::new(200, ""), now - chrono::Duration::days(3), None)
            .await
            .unwrap();
        store.put_entry("c", &key(2), &Response::new(200, ""), now, None).await.unwrap();

        assert_eq!(store.sweep_expired("c", &rule).await.unwrap(), 1);
        assert_eq!(store.list_keys("c").await.unwrap(), vec![key(2)]);
    }

    #[test]
    fn test_huge_max_age_does_not_overflow() {
        let rule = ExpirationRule::new(1, u64::MAX);
        assert!(rule.max_age() > chrono::Duration::days(365 * 1000));
    }
}
