//! Strategy engine: serves a request according to the route it matched.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use hearth_core::fallback::offline_response;
use hearth_core::routes::RouteCache;
use hearth_core::{CacheFilter, CacheStore, Error, FailureHandler, Request, RequestKey, Response, Route, Strategy};

use crate::fetch::{QueryNormalizer, Transport};
use crate::worker::TaskGroup;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    Precache,
    Fallback,
}

/// A response together with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Precache => "precache",
            ResponseSource::Fallback => "fallback",
        }
    }
}

impl Served {
    pub fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

#[derive(Clone)]
pub struct StrategyEngine {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    normalizer: Arc<QueryNormalizer>,
    tasks: TaskGroup,
}

impl StrategyEngine {
    pub fn new(
        store: CacheStore, transport: Arc<dyn Transport>, normalizer: Arc<QueryNormalizer>, tasks: TaskGroup,
    ) -> Self {
        Self { store, transport, normalizer, tasks }
    }

    /// Serve `request` with `route`'s strategy, then apply its transform.
    pub async fn handle(&self, request: &Request, route: &Route) -> Result<Served, Error> {
        let served = match route.strategy {
            Strategy::NetworkOnly => self.network_only(request).await?,
            Strategy::CacheFirst => self.cache_first(request, route, cache_of(route)?).await?,
            Strategy::NetworkFirst { timeout } => {
                self.network_first(request, route, cache_of(route)?, timeout).await?
            }
            Strategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(request, route, cache_of(route)?).await?
            }
        };

        tracing::debug!(
            route = route.name,
            url = %request.url,
            source = ?served.source,
            status = served.response.status,
            "served"
        );

        Ok(Served { response: route.transform.apply(served.response), source: served.source })
    }

    /// Straight to the network, no cache involved.
    pub async fn network_only(&self, request: &Request) -> Result<Served, Error> {
        let response = self.transport.fetch(request).await?;
        Ok(Served::new(response, ResponseSource::Network))
    }

    async fn cache_first(&self, request: &Request, route: &Route, cache: &RouteCache) -> Result<Served, Error> {
        let key = self.normalizer.key_for(request);

        if let Some(response) = self.lookup(cache, &key).await {
            return Ok(Served::new(response, ResponseSource::Cache));
        }

        match self.transport.fetch(request).await {
            Ok(response) => {
                store_response(&self.store, cache, &key, &response, route.filter).await;
                Ok(Served::new(response, ResponseSource::Network))
            }
            Err(e) => self.recover(request, route, e).await,
        }
    }

    /// The fetch and its cache write run on the task group; a response
    /// arriving after the deadline is still stored.
    async fn network_first(
        &self, request: &Request, route: &Route, cache: &RouteCache, timeout: std::time::Duration,
    ) -> Result<Served, Error> {
        let key = self.normalizer.key_for(request);
        let (tx, rx) = oneshot::channel();

        {
            let store = self.store.clone();
            let transport = Arc::clone(&self.transport);
            let request = request.clone();
            let cache = cache.clone();
            let key = key.clone();
            let filter = route.filter;

            self.tasks
                .spawn(async move {
                    let result = transport.fetch(&request).await;
                    let stored = result.as_ref().ok().cloned();
                    // receiver is gone once the deadline has passed
                    let _ = tx.send(result);
                    if let Some(response) = stored {
                        store_response(&store, &cache, &key, &response, filter).await;
                    }
                })
                .await;
        }

        let failure = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(response))) => return Ok(Served::new(response, ResponseSource::Network)),
            Ok(Ok(Err(e))) => e,
            Ok(Err(_)) => Error::NetworkFailed(format!("{}: fetch task ended without a result", request.url)),
            Err(_) => {
                tracing::debug!(url = %request.url, timeout_ms = timeout.as_millis() as u64, "network timed out");
                Error::FetchTimeout(format!("{} did not answer within {}ms", request.url, timeout.as_millis()))
            }
        };

        if !failure.is_network() {
            return Err(failure);
        }

        if let Some(response) = self.lookup(cache, &key).await {
            return Ok(Served::new(response, ResponseSource::Cache));
        }

        self.recover(request, route, failure).await
    }

    async fn stale_while_revalidate(
        &self, request: &Request, route: &Route, cache: &RouteCache,
    ) -> Result<Served, Error> {
        let key = self.normalizer.key_for(request);

        if let Some(response) = self.lookup(cache, &key).await {
            self.revalidate(request, cache, key, route.filter).await;
            return Ok(Served::new(response, ResponseSource::Cache));
        }

        match self.transport.fetch(request).await {
            Ok(response) => {
                store_response(&self.store, cache, &key, &response, route.filter).await;
                Ok(Served::new(response, ResponseSource::Network))
            }
            Err(e) => self.recover(request, route, e).await,
        }
    }

    async fn revalidate(&self, request: &Request, cache: &RouteCache, key: RequestKey, filter: CacheFilter) {
        let store = self.store.clone();
        let transport = Arc::clone(&self.transport);
        let request = request.clone();
        let cache = cache.clone();

        self.tasks
            .spawn(async move {
                match transport.fetch(&request).await {
                    Ok(response) => store_response(&store, &cache, &key, &response, filter).await,
                    Err(e) => tracing::debug!(url = %request.url, error = %e, "revalidation failed"),
                }
            })
            .await;
    }

    /// Fresh entry for `key`. Storage errors count as a miss.
    async fn lookup(&self, cache: &RouteCache, key: &RequestKey) -> Option<Response> {
        match self.store.get_fresh(&cache.name, key, &cache.rule).await {
            Ok(Some(entry)) => {
                tracing::debug!(cache = %cache.name, key = %key, "cache hit");
                Some(entry.response)
            }
            Ok(None) => {
                tracing::debug!(cache = %cache.name, key = %key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(cache = %cache.name, key = %key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Offline page for navigations on routes that ask for it; `err` otherwise.
    async fn recover(&self, request: &Request, route: &Route, err: Error) -> Result<Served, Error> {
        if route.on_failure != FailureHandler::OfflinePage || !request.is_navigation() {
            return Err(err);
        }

        match offline_response(&self.store).await {
            Ok(Some(page)) => {
                tracing::debug!(url = %request.url, error = %err, "serving offline page");
                Ok(Served::new(page, ResponseSource::Fallback))
            }
            Ok(None) => Err(Error::NoResponse(format!("{}: {} (offline page not installed)", request.url, err))),
            Err(e) => {
                tracing::warn!(error = %e, "offline page read failed");
                Err(err)
            }
        }
    }
}

fn cache_of(route: &Route) -> Result<&RouteCache, Error> {
    route
        .cache
        .as_ref()
        .ok_or_else(|| Error::InvalidInput(format!("route {} has no cache for {:?}", route.name, route.strategy)))
}

/// Write `response` if `filter` allows it. Failures are logged only.
async fn store_response(
    store: &CacheStore, cache: &RouteCache, key: &RequestKey, response: &Response, filter: CacheFilter,
) {
    if !filter.allows(response) {
        tracing::debug!(cache = %cache.name, key = %key, status = response.status, "not stored");
        return;
    }

    if let Err(e) = store.put_with_rule(&cache.name, key, response, &cache.rule).await {
        tracing::warn!(cache = %cache.name, key = %key, error = %e, "cache write failed");
    }
}
