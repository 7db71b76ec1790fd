//! SQLite-backed named caches for intercepted responses.
//!
//! This module provides the persistent store every strategy reads and
//! writes, using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named caches created lazily on first write
//! - Per-key atomic replacement with write-order tracking
//! - Count (on write) and age (on read) expiration
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod expiration;
pub mod key;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheStore;
pub use entries::{CacheEntry, CacheSummary};
pub use expiration::{DAY, ExpirationRule, MINUTE, YEAR};
pub use key::RequestKey;
