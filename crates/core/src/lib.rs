//! Core types and shared functionality for hearth.
//!
//! This crate provides:
//! - Named response caches with SQLite backend and expiration rules
//! - The route table and strategy definitions
//! - The offline fallback page
//! - Control protocol messages
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod messages;
pub mod precache;
pub mod routes;

pub use cache::{CacheEntry, CacheStore, CacheSummary, ExpirationRule, RequestKey};
pub use config::{AppConfig, ConfigError, RoutesConfig};
pub use error::Error;
pub use http::{Destination, Request, RequestMode, Response};
pub use messages::{ClientNotice, ControlMessage};
pub use precache::PrecacheEntry;
pub use routes::{CacheFilter, FailureHandler, ResponseTransform, Route, RouteTable, Strategy};
