//! Registry of in-flight containers, swept on cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Upper bound on a single `kill` during the cancellation sweep.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Concurrency-safe set of running container names.
#[derive(Debug)]
pub struct ContainerTracker {
    engine: String,
    containers: Mutex<HashSet<String>>,
}

impl ContainerTracker {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            containers: Mutex::new(HashSet::new()),
        }
    }

    pub fn add(&self, id: &str) {
        self.lock().insert(id.to_string());
    }

    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Register `id` until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, id: &str) -> Registration {
        self.add(id);
        Registration {
            tracker: Arc::clone(self),
            id: id.to_string(),
        }
    }

    /// Best-effort `kill` of every tracked container.
    ///
    /// Works on a snapshot taken under the lock; the lock is released before
    /// any engine call. Failures and timeouts are logged and ignored.
    pub async fn kill_all(&self) {
        let ids = self.snapshot();
        if ids.is_empty() {
            return;
        }
        debug!(count = ids.len(), "killing tracked containers");

        futures::future::join_all(ids.iter().map(|id| self.kill(id))).await;
    }

    /// Best-effort `kill` of one container, bounded by [`KILL_TIMEOUT`].
    pub async fn kill(&self, id: &str) {
        let mut cmd = Command::new(&self.engine);
        cmd.args(["kill", id]).kill_on_drop(true);
        match tokio::time::timeout(KILL_TIMEOUT, cmd.output()).await {
            Ok(Ok(out)) if out.status.success() => debug!(container = %id, "container killed"),
            Ok(Ok(out)) => debug!(
                container = %id,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "container kill failed"
            ),
            Ok(Err(e)) => debug!(container = %id, error = %e, "container kill failed"),
            Err(_) => debug!(container = %id, "container kill timed out"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.containers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes a container from its tracker when dropped.
#[derive(Debug)]
pub struct Registration {
    tracker: Arc<ContainerTracker>,
    id: String,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tracker.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let tracker = ContainerTracker::new("docker");
        tracker.add("a");
        tracker.add("b");
        tracker.add("a");
        assert_eq!(tracker.len(), 2);
        tracker.remove("a");
        assert_eq!(tracker.snapshot(), vec!["b".to_string()]);
    }

    #[test]
    fn test_registration_guard_deregisters() {
        let tracker = Arc::new(ContainerTracker::new("docker"));
        {
            let reg = tracker.register("agent-eval-1");
            assert_eq!(reg.id(), "agent-eval-1");
            assert_eq!(tracker.len(), 1);
        }
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_kill_all_swallows_engine_errors() {
        let tracker = ContainerTracker::new("definitely-not-a-container-engine");
        tracker.add("agent-eval-1");
        tracker.add("agent-eval-2");

        tracker.kill_all().await;
        assert_eq!(tracker.len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_all_ignores_non_zero_exit() {
        let tracker = ContainerTracker::new("false");
        tracker.add("agent-eval-1");

        tracker.kill_all().await;
        assert_eq!(tracker.snapshot(), vec!["agent-eval-1".to_string()]);
    }
}
