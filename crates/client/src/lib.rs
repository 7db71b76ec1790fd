//! Client code for hearth.
//!
//! This crate provides the request-handling side of the offline cache:
//! the network transport, caching strategies, the worker lifecycle and the
//! foreground coordination client.

pub mod coordination;
pub mod fetch;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use coordination::{CoordinationClient, Reaction};
pub use fetch::{FetchClient, FetchConfig, QueryNormalizer, Transport, canonicalize};
pub use strategy::{ResponseSource, Served, StrategyEngine};
pub use worker::{
    CacheDeletion, ClientId, LifecycleState, MessageOutcome, Worker, WorkerHandle, WorkerOptions, WorkerStatus,
};
