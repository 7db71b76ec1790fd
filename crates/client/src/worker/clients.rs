//! Connected foreground clients.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use hearth_core::ClientNotice;

pub type ClientId = u64;

#[derive(Default)]
struct Registry {
    next_id: ClientId,
    clients: BTreeMap<ClientId, Slot>,
}

struct Slot {
    sender: mpsc::UnboundedSender<ClientNotice>,
    controlled: bool,
}

/// Notice channels of every connected client.
///
/// Never locked across an await; `unregister` is called from `Drop`.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a client and hand back its notice receiver. A `controlled` client
    /// is skipped by `claim_all`.
    pub fn register(&self, controlled: bool) -> (ClientId, mpsc::UnboundedReceiver<ClientNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.clients.insert(id, Slot { sender, controlled });
        tracing::debug!(client = id, "client connected");
        (id, receiver)
    }

    pub fn unregister(&self, id: ClientId) {
        if self.lock().clients.remove(&id).is_some() {
            tracing::debug!(client = id, "client disconnected");
        }
    }

    /// Send `notice` to every client. Clients whose receiver is gone are
    /// dropped. Returns the number reached.
    pub fn broadcast(&self, notice: ClientNotice) -> usize {
        let mut registry = self.lock();
        registry.clients.retain(|_, slot| slot.sender.send(notice).is_ok());
        registry.clients.len()
    }

    /// Take control of every client that is not yet controlled and tell it.
    pub fn claim_all(&self) -> usize {
        let mut registry = self.lock();
        let mut claimed = 0;
        registry.clients.retain(|_, slot| {
            if slot.controlled {
                return true;
            }
            slot.controlled = true;
            claimed += 1;
            slot.sender.send(ClientNotice::ControllerChanged).is_ok()
        });
        claimed
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.lock().clients.get(&id).is_some_and(|slot| slot.controlled)
    }

    /// Connected clients with a live receiver.
    pub fn len(&self) -> usize {
        let mut registry = self.lock();
        registry.clients.retain(|_, slot| !slot.sender.is_closed());
        registry.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_client_once() {
        let registry = ClientRegistry::new();
        let (_, mut a) = registry.register(false);
        let (_, mut b) = registry.register(false);

        assert_eq!(registry.broadcast(ClientNotice::AllCachesCleared), 2);

        assert_eq!(a.try_recv().unwrap(), ClientNotice::AllCachesCleared);
        assert_eq!(b.try_recv().unwrap(), ClientNotice::AllCachesCleared);
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_pruned() {
        let registry = ClientRegistry::new();
        let (_, a) = registry.register(false);
        let (_, _b) = registry.register(false);
        drop(a);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.broadcast(ClientNotice::CacheCleared), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ClientRegistry::new();
        let (id, _rx) = registry.register(false);
        registry.unregister(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_claim_all_only_once() {
        let registry = ClientRegistry::new();
        let (id, mut rx) = registry.register(false);

        assert_eq!(registry.claim_all(), 1);
        assert!(registry.is_controlled(id));
        assert_eq!(rx.try_recv().unwrap(), ClientNotice::ControllerChanged);

        assert_eq!(registry.claim_all(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_registered_controlled_not_reclaimed() {
        let registry = ClientRegistry::new();
        let (id, mut rx) = registry.register(true);

        assert!(registry.is_controlled(id));
        assert_eq!(registry.claim_all(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_unique() {
        let registry = ClientRegistry::new();
        let (a, _ra) = registry.register(false);
        let (b, _rb) = registry.register(false);
        assert_ne!(a, b);
    }
}
