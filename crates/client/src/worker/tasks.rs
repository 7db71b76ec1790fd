//! Background work owned by the worker.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Revalidations and network-first fetches that outlive the request that
/// started them.
#[derive(Clone, Default)]
pub struct TaskGroup {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` into the group. Finished tasks are reaped first.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.inner.lock().await;
        while set.try_join_next().is_some() {}
        set.spawn(task);
    }

    /// Number of tasks spawned and not yet reaped.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait for every task, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.inner.lock().await);
            if set.is_empty() {
                return;
            }
            while let Some(result) = set.join_next().await {
                if let Err(e) = result
                    && e.is_panic()
                {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        }
    }

    /// Abort every outstanding task.
    pub async fn abandon(&self) {
        let mut set = self.inner.lock().await;
        if !set.is_empty() {
            tracing::debug!(tasks = set.len(), "abandoning background tasks");
        }
        set.abort_all();
        while set.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let group = TaskGroup::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            group
                .spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        group.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(group.is_empty().await);
    }

    #[tokio::test]
    async fn test_abandon_aborts_tasks() {
        let group = TaskGroup::new();
        let done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&done);
        group
            .spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        group.abandon().await;
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert!(group.is_empty().await);
    }

    #[tokio::test]
    async fn test_finished_tasks_reaped_on_spawn() {
        let group = TaskGroup::new();
        group.spawn(async {}).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        group.spawn(async { tokio::time::sleep(Duration::from_millis(50)).await }).await;
        assert_eq!(group.len().await, 1);
        group.drain().await;
    }
}
