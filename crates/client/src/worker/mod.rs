//! Lifecycle controller.
//!
//! ### States
//! - `Parsed → Installing → Installed → Activating → Active`
//! - a failed install leaves the worker `Redundant`
//!
//! ### Events
//! - install: offline page and precache manifest are written
//! - activate: outdated precache generations are dropped and every
//!   connected client is claimed
//! - fetch: precache, then route table, then plain network
//! - message: cache clears and skip-waiting, handled in arrival order by the
//!   loop that [`Worker::start`] spawns

mod clients;
mod tasks;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

pub use clients::{ClientId, ClientRegistry};
pub use tasks::TaskGroup;

use hearth_core::fallback::install_fallback;
use hearth_core::precache::{is_outdated_precache, precache_cache_name};
use hearth_core::routes::{ONBOARDING_CACHE, PAGES_CACHE};
use hearth_core::{
    AppConfig, CacheStore, CacheSummary, ClientNotice, ControlMessage, Error, PrecacheEntry, Request, RequestKey,
    RouteTable,
};

use crate::coordination::CoordinationClient;
use crate::fetch::{QueryNormalizer, Transport};
use crate::strategy::{ResponseSource, Served, StrategyEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

/// Deployment-specific inputs of a worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Base for relative precache URLs.
    pub origin: Url,
    pub generation: String,
    pub precache: Vec<PrecacheEntry>,
    /// Activate straight after install instead of waiting.
    pub skip_waiting: bool,
}

impl WorkerOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        Ok(Self {
            origin,
            generation: config.generation.clone(),
            precache: config.precache.clone(),
            skip_waiting: config.skip_waiting,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub fetched: usize,
    /// Entries whose stored revision already matched.
    pub unchanged: usize,
}

#[derive(Debug, Default)]
pub struct ActivateReport {
    pub deleted_caches: Vec<CacheDeletion>,
    pub removed_entries: u64,
    /// Runtime cache entries past their max age.
    pub expired_entries: u64,
    pub claimed: usize,
}

/// Outcome of deleting one cache.
#[derive(Debug)]
pub struct CacheDeletion {
    pub cache: String,
    /// `Ok(false)` when the cache did not exist.
    pub result: Result<bool, Error>,
}

/// Result of one control message.
#[derive(Debug, Default)]
pub struct MessageOutcome {
    pub deletions: Vec<CacheDeletion>,
    /// Acknowledgement broadcast to clients, if any was sent.
    pub acknowledgement: Option<ClientNotice>,
    pub notified: usize,
}

impl MessageOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.deletions.iter().all(|d| d.result.is_ok())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: LifecycleState,
    pub generation: String,
    pub clients: usize,
    pub caches: Vec<CacheSummary>,
}

/// A message posted by a connected client.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    pub client: ClientId,
    pub message: ControlMessage,
}

pub struct Worker {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    routes: RouteTable,
    normalizer: Arc<QueryNormalizer>,
    engine: StrategyEngine,
    options: WorkerOptions,
    state: RwLock<LifecycleState>,
    clients: ClientRegistry,
    tasks: TaskGroup,
}

impl Worker {
    pub fn new(
        store: CacheStore, transport: Arc<dyn Transport>, routes: RouteTable, normalizer: QueryNormalizer,
        options: WorkerOptions,
    ) -> Self {
        let normalizer = Arc::new(normalizer);
        let tasks = TaskGroup::new();
        let engine = StrategyEngine::new(store.clone(), Arc::clone(&transport), Arc::clone(&normalizer), tasks.clone());

        Self {
            store,
            transport,
            routes,
            normalizer,
            engine,
            options,
            state: RwLock::new(LifecycleState::Parsed),
            clients: ClientRegistry::new(),
            tasks,
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn tasks(&self) -> &TaskGroup {
        &self.tasks
    }

    pub fn precache_cache(&self) -> String {
        precache_cache_name(&self.options.generation)
    }

    async fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !from.contains(&*state) {
            return Err(Error::InvalidState(format!("cannot move from {:?} to {:?}", *state, to)));
        }
        tracing::info!(from = ?*state, to = ?to, generation = %self.options.generation, "lifecycle");
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: LifecycleState) {
        let mut state = self.state.write().await;
        tracing::info!(from = ?*state, to = ?to, generation = %self.options.generation, "lifecycle");
        *state = to;
    }

    /// Register a foreground client. Clients arriving once the worker is
    /// `Active` start out controlled.
    async fn register_client(&self) -> (ClientId, mpsc::UnboundedReceiver<ClientNotice>) {
        let state = self.state.read().await;
        self.clients.register(*state == LifecycleState::Active)
    }

    fn precache_url(&self, entry: &PrecacheEntry) -> Result<Url, Error> {
        self.options
            .origin
            .join(&entry.url)
            .map_err(|e| Error::InvalidUrl(format!("precache {}: {}", entry.url, e)))
    }

    /// Write the offline page and the precache manifest.
    ///
    /// Any failure leaves the worker `Redundant`. With `skip_waiting` the
    /// worker activates immediately afterwards.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(&[LifecycleState::Parsed], LifecycleState::Installing).await?;

        let report = match self.precache().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "install failed");
                self.set_state(LifecycleState::Redundant).await;
                return Err(e);
            }
        };

        tracing::info!(fetched = report.fetched, unchanged = report.unchanged, "precache complete");
        self.set_state(LifecycleState::Installed).await;

        if self.options.skip_waiting {
            self.activate().await?;
        }

        Ok(report)
    }

    async fn precache(&self) -> Result<InstallReport, Error> {
        install_fallback(&self.store).await?;

        let cache = self.precache_cache();
        let mut report = InstallReport::default();

        for entry in &self.options.precache {
            let request = Request::get(self.precache_url(entry)?);
            let key = self.normalizer.key_for(&request);

            if let Some(existing) = self.store.get(&cache, &key).await?
                && existing.revision.as_deref() == Some(entry.revision.as_str())
            {
                report.unchanged += 1;
                continue;
            }

            let response = self
                .transport
                .fetch(&request)
                .await
                .map_err(|e| Error::PrecacheFailed(format!("{}: {}", request.url, e)))?;

            if !response.is_ok() {
                return Err(Error::PrecacheFailed(format!("{}: status {}", request.url, response.status)));
            }

            self.store.put_entry(&cache, &key, &response, Utc::now(), Some(&entry.revision)).await?;
            report.fetched += 1;
        }

        Ok(report)
    }

    /// Drop outdated precache data, claim clients and become `Active`.
    ///
    /// On failure the worker goes back to `Installed` and may be activated
    /// again.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(&[LifecycleState::Installed], LifecycleState::Activating).await?;

        match self.cleanup().await {
            Ok(mut report) => {
                // claiming and becoming Active are atomic with respect to `register_client`
                let mut state = self.state.write().await;
                report.claimed = self.clients.claim_all();
                tracing::info!(from = ?*state, to = ?LifecycleState::Active, generation = %self.options.generation, "lifecycle");
                *state = LifecycleState::Active;
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "activation failed");
                self.set_state(LifecycleState::Installed).await;
                Err(e)
            }
        }
    }

    async fn cleanup(&self) -> Result<ActivateReport, Error> {
        let mut report = ActivateReport::default();

        let outdated: Vec<String> = self
            .store
            .list_cache_names()
            .await?
            .into_iter()
            .filter(|name| is_outdated_precache(name, &self.options.generation))
            .collect();
        report.deleted_caches = self.delete_caches(&outdated).await;

        let cache = self.precache_cache();
        let wanted = self
            .options
            .precache
            .iter()
            .map(|entry| Ok(self.normalizer.key_for(&Request::get(self.precache_url(entry)?))))
            .collect::<Result<HashSet<RequestKey>, Error>>()?;

        for key in self.store.list_keys(&cache).await? {
            if !wanted.contains(&key) && self.store.delete(&cache, &key).await? {
                report.removed_entries += 1;
            }
        }

        if report.removed_entries > 0 {
            tracing::info!(cache = %cache, removed = report.removed_entries, "removed stale precache entries");
        }

        for route in self.routes.routes() {
            if let Some(cache) = &route.cache {
                report.expired_entries += self.store.sweep_expired(&cache.name, &cache.rule).await?;
            }
        }

        Ok(report)
    }

    /// Serve one request.
    ///
    /// Before activation every request goes straight to the network.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        if self.state().await != LifecycleState::Active {
            return self.engine.network_only(&request).await;
        }

        if request.method == "GET"
            && let Some(served) = self.precached(&request).await
        {
            return Ok(served);
        }

        match self.routes.resolve(&request) {
            Some(route) => self.engine.handle(&request, route).await,
            None => {
                tracing::debug!(method = %request.method, url = %request.url, "no route");
                self.engine.network_only(&request).await
            }
        }
    }

    async fn precached(&self, request: &Request) -> Option<Served> {
        let key = self.normalizer.key_for(request);
        match self.store.get(&self.precache_cache(), &key).await {
            Ok(entry) => entry.map(|entry| Served::new(entry.response, ResponseSource::Precache)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "precache read failed");
                None
            }
        }
    }

    /// Handle one control message and acknowledge it to every client when
    /// all of its deletions succeeded.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<MessageOutcome, Error> {
        tracing::info!(message = ?message, "control message");

        let mut outcome = MessageOutcome::default();

        match message {
            ControlMessage::ClearOnboardingCache => {
                let names = [ONBOARDING_CACHE.to_string(), PAGES_CACHE.to_string()];
                outcome.deletions = self.delete_caches(&names).await;
            }
            ControlMessage::ClearAllCaches => {
                let names: Vec<String> = self.store.list_cache_names().await?.into_iter().collect();
                outcome.deletions = self.delete_caches(&names).await;
            }
            ControlMessage::SkipWaiting => {
                if self.state().await == LifecycleState::Installed {
                    self.activate().await?;
                } else {
                    let state = self.state().await;
                    tracing::debug!(state = ?state, "nothing waiting to activate");
                }
            }
        }

        if let Some(ack) = message.acknowledgement() {
            if outcome.all_succeeded() {
                outcome.notified = self.clients.broadcast(ack);
                outcome.acknowledgement = Some(ack);
            } else {
                tracing::warn!(message = ?message, "deletion failed, acknowledgement withheld");
            }
        }

        Ok(outcome)
    }

    /// Delete each cache in turn. A failure is recorded and the remaining
    /// caches are still attempted.
    pub async fn delete_caches(&self, names: &[String]) -> Vec<CacheDeletion> {
        let mut deletions = Vec::with_capacity(names.len());

        for name in names {
            let result = self.store.delete_cache(name).await;
            match &result {
                Ok(true) => tracing::info!(cache = %name, "deleted cache"),
                Ok(false) => tracing::debug!(cache = %name, "cache already absent"),
                Err(e) => tracing::warn!(cache = %name, error = %e, "failed to delete cache"),
            }
            deletions.push(CacheDeletion { cache: name.clone(), result });
        }

        deletions
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        Ok(WorkerStatus {
            state: self.state().await,
            generation: self.options.generation.clone(),
            clients: self.clients.len(),
            caches: self.store.summaries().await?,
        })
    }

    /// Spawn the message loop.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let (inbox, rx) = mpsc::channel(64);
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(&self).run(rx, stopped));
        WorkerHandle { worker: self, inbox, stop, task }
    }

    async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<Envelope>, mut stopped: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                envelope = inbox.recv() => {
                    let Some(envelope) = envelope else { break };
                    if let Err(e) = self.handle_message(envelope.message).await {
                        tracing::warn!(client = envelope.client, error = %e, "control message failed");
                    }
                }
            }
        }
        tracing::debug!("message loop stopped");
    }
}

/// A running worker.
pub struct WorkerHandle {
    worker: Arc<Worker>,
    inbox: mpsc::Sender<Envelope>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Register a new foreground client.
    pub async fn connect(&self) -> CoordinationClient {
        let (id, notices) = self.worker.register_client().await;
        CoordinationClient::new(id, self.inbox.clone(), notices, self.worker.clients.clone())
    }

    /// Stop the message loop, then wait for background tasks (`drain`) or
    /// abort them.
    pub async fn shutdown(self, drain: bool) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "message loop ended abnormally");
        }

        if drain {
            self.worker.tasks.drain().await;
        } else {
            self.worker.tasks.abandon().await;
        }
    }
}
