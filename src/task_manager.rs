//! Task management for the daemon's background loops.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bound on how long shutdown waits for any single task to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Tracks named background tasks and shuts them down cooperatively.
///
/// Each task receives a child of the global [`CancellationToken`] and is
/// expected to exit at its next suspension point once the token fires;
/// [`TaskManager::shutdown_all`] then awaits every join handle so no task
/// is left mid-network-call when the process exits.
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    global_token: CancellationToken,
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns a task under the given name and tracks it for shutdown.
    ///
    /// The closure receives the task's cancellation token; the task must
    /// select on it between work cycles.
    pub fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(token).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e}");
                    Err(e)
                }
            }
        });

        self.tasks.insert(name, TaskInfo { handle });
    }

    /// Cancels every task and waits (bounded) for each to finish.
    ///
    /// Returns the first failure encountered; the remaining tasks are
    /// still awaited either way.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        for (name, info) in self.tasks.drain() {
            match tokio::time::timeout(SHUTDOWN_GRACE, info.handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task '{name}' failed during shutdown: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(join_error)) => {
                    let e = anyhow::anyhow!("Task '{name}' panicked: {join_error}");
                    error!("{e}");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    let e = anyhow::anyhow!("Task '{name}' exceeded the shutdown grace period");
                    error!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    /// Number of tracked tasks. Test hook.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether a task with the given name is tracked. Test hook.
    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn spawned_task_is_tracked_until_shutdown() {
        let mut manager = TaskManager::new();

        manager.spawn_task("loop".to_string(), |token| async move {
            token.cancelled().await;
            Ok(())
        });

        assert!(manager.is_running("loop"));
        assert_eq!(manager.active_count(), 1);

        manager.shutdown_all().await.unwrap();
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_a_periodic_task() {
        let mut manager = TaskManager::new();

        manager.spawn_task("ticker".to_string(), |token| async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = sleep(Duration::from_millis(5)) => {}
                }
            }
            Ok(())
        });

        sleep(Duration::from_millis(20)).await;
        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_surfaces_a_task_failure() {
        let mut manager = TaskManager::new();

        manager.spawn_task("broken".to_string(), |_token| async move {
            Err(anyhow::anyhow!("boom"))
        });

        // Give the task a moment to fail before shutting down.
        sleep(Duration::from_millis(20)).await;
        let result = manager.shutdown_all().await;
        assert!(result.is_err());
    }
}
