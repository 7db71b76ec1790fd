//! MCP tool implementations.
//!
//! This module contains all tools exposed by the hearth server.

pub mod sw_fetch;
pub mod sw_post_message;
pub mod sw_status;

pub use sw_fetch::{SwFetchOutput, SwFetchParams};
pub use sw_post_message::{SwPostMessageOutput, SwPostMessageParams};
pub use sw_status::SwStatusOutput;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use hearth_client::{QueryNormalizer, Transport, Worker, WorkerOptions};
    use hearth_core::{CacheStore, Error, Request, Response, RouteTable, RoutesConfig};

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            Err(Error::NetworkFailed(format!("{}: offline", request.url)))
        }
    }

    /// Active worker with no precache manifest and no network.
    pub async fn offline_worker() -> Arc<Worker> {
        let store = CacheStore::open_in_memory().await.unwrap();
        let options = WorkerOptions {
            origin: url::Url::parse("https://app.test/").unwrap(),
            generation: "v1".into(),
            precache: Vec::new(),
            skip_waiting: true,
        };
        let worker = Worker::new(
            store,
            Arc::new(Offline),
            RouteTable::standard(&RoutesConfig::default()).unwrap(),
            QueryNormalizer::default(),
            options,
        );
        worker.install().await.unwrap();
        Arc::new(worker)
    }
}
