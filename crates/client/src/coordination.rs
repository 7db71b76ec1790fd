//! Foreground side of the control protocol.

use std::time::Duration;

use tokio::sync::mpsc;

use hearth_core::{ClientNotice, ControlMessage, Error};

use crate::worker::{ClientId, ClientRegistry, Envelope};

/// What the page should do after a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Reload,
    Ignore,
}

/// A connected foreground client. Dropping it unregisters it.
pub struct CoordinationClient {
    id: ClientId,
    outbox: mpsc::Sender<Envelope>,
    notices: mpsc::UnboundedReceiver<ClientNotice>,
    registry: ClientRegistry,
    standalone: bool,
}

impl CoordinationClient {
    pub(crate) fn new(
        id: ClientId, outbox: mpsc::Sender<Envelope>, notices: mpsc::UnboundedReceiver<ClientNotice>,
        registry: ClientRegistry,
    ) -> Self {
        Self { id, outbox, notices, registry, standalone: false }
    }

    /// Mark the client as running as an installed app. Standalone clients
    /// do not reload when control changes.
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn post(&self, message: ControlMessage) -> Result<(), Error> {
        tracing::debug!(client = self.id, message = ?message, "posting");
        self.outbox
            .send(Envelope { client: self.id, message })
            .await
            .map_err(|_| Error::ChannelClosed("worker message loop has stopped".to_string()))
    }

    pub async fn clear_onboarding_cache(&self) -> Result<(), Error> {
        self.post(ControlMessage::ClearOnboardingCache).await
    }

    pub async fn clear_all_caches(&self) -> Result<(), Error> {
        self.post(ControlMessage::ClearAllCaches).await
    }

    pub async fn skip_waiting(&self) -> Result<(), Error> {
        self.post(ControlMessage::SkipWaiting).await
    }

    /// Next notice, or `None` once the worker is gone.
    pub async fn next_notice(&mut self) -> Option<ClientNotice> {
        self.notices.recv().await
    }

    pub fn try_next_notice(&mut self) -> Option<ClientNotice> {
        self.notices.try_recv().ok()
    }

    /// Wait for `expected`, skipping other notices.
    pub async fn wait_for(&mut self, expected: ClientNotice, timeout: Duration) -> Result<ClientNotice, Error> {
        let id = self.id;
        let notices = &mut self.notices;
        let wait = async move {
            while let Some(notice) = notices.recv().await {
                if notice == expected {
                    return Ok(notice);
                }
                tracing::debug!(client = id, notice = ?notice, "skipping notice");
            }
            Err(Error::ChannelClosed("worker dropped the notice channel".to_string()))
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::NoResponse(format!("no {:?} within {}ms", expected, timeout.as_millis())))?
    }

    /// Post `message` and wait for its acknowledgement, if it has one.
    pub async fn request(&mut self, message: ControlMessage, timeout: Duration) -> Result<Option<ClientNotice>, Error> {
        self.post(message).await?;
        match message.acknowledgement() {
            Some(ack) => self.wait_for(ack, timeout).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn react(&self, notice: ClientNotice) -> Reaction {
        match notice {
            ClientNotice::CacheCleared | ClientNotice::AllCachesCleared => Reaction::Reload,
            ClientNotice::ControllerChanged if self.standalone => Reaction::Ignore,
            ClientNotice::ControllerChanged => Reaction::Reload,
        }
    }
}

impl Drop for CoordinationClient {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{QueryNormalizer, Transport};
    use crate::testing::FakeTransport;
    use crate::worker::{LifecycleState, Worker, WorkerOptions};
    use hearth_core::{CacheStore, PrecacheEntry, RequestKey, Response, RouteTable, RoutesConfig};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    async fn running(skip_waiting: bool) -> (crate::worker::WorkerHandle, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new());
        transport.respond("https://app.test/registerSW.js", 200, "register()");
        let dyn_transport: Arc<dyn Transport> = transport.clone();

        let store = CacheStore::open_in_memory().await.unwrap();
        let options = WorkerOptions {
            origin: url::Url::parse("https://app.test/").unwrap(),
            generation: "v1".into(),
            precache: vec![PrecacheEntry::new("registerSW.js", "rev-1")],
            skip_waiting,
        };
        let worker = Worker::new(
            store,
            dyn_transport,
            RouteTable::standard(&RoutesConfig::default()).unwrap(),
            QueryNormalizer::default(),
            options,
        );
        worker.install().await.unwrap();
        (Arc::new(worker).start(), transport)
    }

    #[tokio::test]
    async fn test_clear_all_round_trip() {
        let (handle, _) = running(true).await;
        let mut first = handle.connect().await;
        let mut second = handle.connect().await;
        handle
            .worker()
            .store()
            .put("pages-cache", &RequestKey::get("https://app.test/"), &Response::new(200, "home"))
            .await
            .unwrap();

        let ack = first.request(ControlMessage::ClearAllCaches, WAIT).await.unwrap();

        assert_eq!(ack, Some(ClientNotice::AllCachesCleared));
        assert_eq!(second.wait_for(ClientNotice::AllCachesCleared, WAIT).await.unwrap(), ClientNotice::AllCachesCleared);
        assert!(second.try_next_notice().is_none());
        assert!(handle.worker().store().list_cache_names().await.unwrap().is_empty());

        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_messages_handled_in_order() {
        let (handle, _) = running(true).await;
        let mut client = handle.connect().await;

        client.clear_onboarding_cache().await.unwrap();
        client.clear_all_caches().await.unwrap();

        assert_eq!(client.next_notice().await, Some(ClientNotice::CacheCleared));
        assert_eq!(client.next_notice().await, Some(ClientNotice::AllCachesCleared));
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_skip_waiting_claims_waiting_clients() {
        let (handle, _) = running(false).await;
        let mut client = handle.connect().await;
        assert_eq!(handle.worker().state().await, LifecycleState::Installed);

        client.skip_waiting().await.unwrap();

        let notice = client.wait_for(ClientNotice::ControllerChanged, WAIT).await.unwrap();
        assert_eq!(client.react(notice), Reaction::Reload);
        assert_eq!(handle.worker().state().await, LifecycleState::Active);
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_client_connecting_after_activation_is_controlled() {
        let (handle, _) = running(true).await;
        assert_eq!(handle.worker().state().await, LifecycleState::Active);

        let mut client = handle.connect().await;

        assert!(handle.worker().clients().is_controlled(client.id()));
        assert_eq!(handle.worker().clients().claim_all(), 0);
        assert!(client.try_next_notice().is_none());
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_standalone_ignores_controller_change() {
        let (handle, _) = running(true).await;
        let client = handle.connect().await.standalone(true);

        assert_eq!(client.react(ClientNotice::ControllerChanged), Reaction::Ignore);
        assert_eq!(client.react(ClientNotice::CacheCleared), Reaction::Reload);
        assert_eq!(client.react(ClientNotice::AllCachesCleared), Reaction::Reload);
        handle.shutdown(false).await;
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let (handle, _) = running(true).await;
        let mut client = handle.connect().await;

        let result = client.wait_for(ClientNotice::CacheCleared, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::NoResponse(_))));
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let (handle, _) = running(true).await;
        let client = handle.connect().await;
        assert_eq!(handle.worker().clients().len(), 1);

        drop(client);
        assert_eq!(handle.worker().clients().len(), 0);
        handle.shutdown(true).await;
    }

    #[tokio::test]
    async fn test_post_after_shutdown_fails() {
        let (handle, _) = running(true).await;
        let client = handle.connect().await;
        handle.shutdown(true).await;

        let result = client.clear_all_caches().await;
        assert!(matches!(result, Err(Error::ChannelClosed(_))));
    }
}
