//! Lifecycle manager: task-group bookkeeping for background writers,
//! with graceful shutdown that drains outstanding work (spec §4.6, C6).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared task-group state. Cloning [`LifecycleManager`] shares the same group.
struct Inner {
    outstanding: AtomicU64,
    shutting_down: AtomicBool,
    drained: Notify,
}

/// Owns the background task-group counter covering cache persistence,
/// history-decision writes, and feedback drain. `shutdown()` blocks until
/// every outstanding task completes; no new task may be launched afterwards.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                outstanding: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                drained: Notify::new(),
            }),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Spawn a tracked background task. Returns `None` (and does not spawn)
    /// if shutdown has already begun — submissions race-checked against the
    /// shutting-down flag.
    pub fn spawn_tracked<F>(&self, name: &'static str, fut: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            debug!(task = name, "lifecycle: rejected task submission after shutdown");
            return None;
        }
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            fut.await;
            let remaining = inner.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
            if remaining == 0 {
                inner.drained.notify_waiters();
            }
        }))
    }

    /// Number of tasks currently tracked by the group.
    pub fn outstanding(&self) -> u64 {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Begin shutdown: reject further submissions and wait for drain.
    ///
    /// The `Notified` future is created before the counter check on every
    /// iteration: `notify_waiters()` stores no permit, so registering the
    /// wait *after* reading `outstanding` would miss a drain that completes
    /// in between, and `shutdown()` would hang.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        loop {
            let drained = self.inner.drained.notified();
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                break;
            }
            drained.await;
        }
        debug!("lifecycle: task group drained, shutdown complete");
    }

    /// Run a fire-and-forget background write with a deadline; failures are
    /// logged at debug level only (spec §4.1, History record).
    pub fn fire_and_forget<F, Fut>(&self, name: &'static str, deadline: std::time::Duration, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let spawned = self.spawn_tracked(name, async move {
            match tokio::time::timeout(deadline, work()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(task = name, error = %e, "background task failed"),
                Err(_) => debug!(task = name, "background task timed out"),
            }
        });
        if spawned.is_none() {
            warn!(task = name, "dropped background task: lifecycle is shutting down");
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_waits_for_outstanding_tasks() {
        let lifecycle = LifecycleManager::new();
        lifecycle
            .spawn_tracked("test", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
            .unwrap();
        assert_eq!(lifecycle.outstanding(), 1);
        lifecycle.shutdown().await;
        assert_eq!(lifecycle.outstanding(), 0);
    }

    #[tokio::test]
    async fn rejects_submissions_after_shutdown() {
        let lifecycle = LifecycleManager::new();
        lifecycle.shutdown().await;
        let handle = lifecycle.spawn_tracked("late", async {});
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn fire_and_forget_does_not_block_caller() {
        let lifecycle = LifecycleManager::new();
        lifecycle.fire_and_forget("history", Duration::from_secs(5), || async { Ok(()) });
        lifecycle.shutdown().await;
    }
}
