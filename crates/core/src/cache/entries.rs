//! Named cache CRUD operations.
//!
//! A cache springs into existence on its first write and disappears with
//! `delete_cache`. Entries are never edited: a write to an existing key
//! removes the old row and inserts a new one, which also moves the key to
//! the most-recently-written end of the eviction order.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheStore;
use super::key::RequestKey;
use crate::Error;
use crate::http::Response;

/// A stored response and its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
    /// Precache manifest revision, if the entry came from the precache.
    pub revision: Option<String>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.stored_at
    }
}

/// Entry count for one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheSummary {
    pub name: String,
    pub entries: u64,
}

/// Row as read from SQLite, before JSON and timestamp decoding.
struct RawEntry {
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
    revision: Option<String>,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            method: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            headers_json: row.get(3)?,
            body: row.get(4)?,
            stored_at: row.get(5)?,
            revision: row.get(6)?,
        })
    }

    fn decode(self) -> Result<CacheEntry, Error> {
        let headers = serde_json::from_str(&self.headers_json)
            .map_err(|e| Error::CorruptEntry(format!("headers of {} {}: {e}", self.method, self.url)))?;
        let stored_at = DateTime::parse_from_rfc3339(&self.stored_at)
            .map_err(|e| Error::CorruptEntry(format!("stored_at of {} {}: {e}", self.method, self.url)))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            key: RequestKey::new(&self.method, self.url),
            response: Response { status: self.status, headers, body: self.body },
            stored_at,
            revision: self.revision,
        })
    }
}

/// Fixed-width UTC timestamp so stored values compare correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl CacheStore {
    /// Look up `key` in `cache_name`.
    ///
    /// Returns None if either the cache or the key doesn't exist.
    pub async fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let cache_name = cache_name.to_string();
        let key_hash = key.hash();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, headers_json, body, stored_at, revision
                     FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                )?;

                match stmt.query_row(params![cache_name, key_hash], RawEntry::from_row) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(RawEntry::decode).transpose()
    }

    /// Store `response` under `key`, stamped with the current time.
    pub async fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<(), Error> {
        self.put_entry(cache_name, key, response, Utc::now(), None).await
    }

    /// Store `response` under `key` with an explicit timestamp and revision.
    ///
    /// The cache row, the removal of any previous entry for the key and the
    /// insert happen in one transaction.
    pub async fn put_entry(
        &self, cache_name: &str, key: &RequestKey, response: &Response, stored_at: DateTime<Utc>,
        revision: Option<&str>,
    ) -> Result<(), Error> {
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::CorruptEntry(format!("headers of {key}: {e}")))?;
        let cache_name = cache_name.to_string();
        let key = key.clone();
        let key_hash = key.hash();
        let status = response.status;
        let body = response.body.clone();
        let stored_at = timestamp(stored_at);
        let revision = revision.map(str::to_string);
        let now = timestamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![cache_name, now],
                )?;
                tx.execute(
                    "DELETE FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                    params![cache_name, key_hash],
                )?;
                tx.execute(
                    "INSERT INTO entries (
                        cache_name, key_hash, method, url, status, headers_json, body, stored_at, revision
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        cache_name,
                        key_hash,
                        key.method,
                        key.url,
                        status,
                        headers_json,
                        body,
                        stored_at,
                        revision,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool, Error> {
        let cache_name = cache_name.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                    params![cache_name, key_hash],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a whole cache and its entries. Returns whether it existed.
    pub async fn delete_cache(&self, cache_name: &str) -> Result<bool, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![cache_name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every cache that currently exists.
    pub async fn list_cache_names(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Keys in `cache_name`, oldest write first.
    pub async fn list_keys(&self, cache_name: &str) -> Result<Vec<RequestKey>, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE cache_name = ?1 ORDER BY seq ASC")?;
                let keys = stmt
                    .query_map(params![cache_name], |row| {
                        Ok(RequestKey::new(&row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in `cache_name` (0 for a missing cache).
    pub async fn entry_count(&self, cache_name: &str) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry counts for every cache, ordered by name.
    pub async fn summaries(&self) -> Result<Vec<CacheSummary>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheSummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT c.name, COUNT(e.seq) FROM caches c
                     LEFT JOIN entries e ON e.cache_name = c.name
                     GROUP BY c.name ORDER BY c.name",
                )?;
                let summaries = stmt
                    .query_map([], |row| {
                        Ok(CacheSummary { name: row.get(0)?, entries: row.get::<_, i64>(1)? as u64 })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(summaries)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete oldest-written entries until at most `keep` remain.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_oldest(&self, cache_name: &str, keep: usize) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE cache_name = ?1",
                    params![cache_name],
                    |row| row.get(0),
                )?;
                if count <= keep {
                    return Ok(0);
                }

                let to_delete = count - keep;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE seq IN (
                        SELECT seq FROM entries WHERE cache_name = ?1 ORDER BY seq ASC LIMIT ?2
                    )",
                    params![cache_name, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries stored strictly before `cutoff`.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_stored_before(&self, cache_name: &str, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let cache_name = cache_name.to_string();
        let cutoff = timestamp(cutoff);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE cache_name = ?1 AND stored_at < ?2",
                    params![cache_name, cutoff],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
