use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Provider that creates a component asynchronously.
///
/// Lets construction that performs I/O (client setup, state seeding) run
/// in async context while the coordinator stays agnostic of the details.
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service that can be started through the [`TaskManager`].
///
/// Services declare a priority (higher starts first) and whether they are
/// critical: a critical service failing to start aborts startup, a
/// non-critical one is skipped with a warning.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Starts the service in the TaskManager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Service name for logging and management.
    fn name(&self) -> &'static str;

    /// Startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the system can run without this service.
    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct NoopService;

    #[async_trait]
    impl ServiceProvider for NoopService {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            task_manager.spawn_task("noop".to_string(), |_token| async { Ok(()) });
            Ok(())
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    struct FailingService;

    #[async_trait]
    impl ServiceProvider for FailingService {
        async fn start(&self, _task_manager: &mut TaskManager) -> Result<()> {
            Err(anyhow!("refused to start"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn priority(&self) -> i32 {
            7
        }

        fn is_critical(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn default_metadata_is_low_priority_and_non_critical() {
        let service = NoopService;
        assert_eq!(service.priority(), 0);
        assert!(!service.is_critical());
    }

    #[tokio::test]
    async fn start_registers_a_task() {
        let mut task_manager = TaskManager::new();
        NoopService.start(&mut task_manager).await.unwrap();
        assert!(task_manager.is_running("noop"));
        task_manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn failing_start_propagates_the_error() {
        let mut task_manager = TaskManager::new();
        let result = FailingService.start(&mut task_manager).await;
        assert!(result.is_err());
        assert_eq!(task_manager.active_count(), 0);
    }

    #[test]
    fn providers_sort_by_descending_priority() {
        let services: Vec<Box<dyn ServiceProvider>> =
            vec![Box::new(NoopService), Box::new(FailingService)];
        let mut names: Vec<(&str, i32)> = services
            .iter()
            .map(|s| (s.name(), s.priority()))
            .collect();
        names.sort_by_key(|(_, priority)| std::cmp::Reverse(*priority));
        assert_eq!(names[0].0, "failing");
    }
}
