//! Application entry point and builder pattern implementation.

use crate::{config::ConfigManager, coordinator::SystemCoordinator};
use anyhow::Result;

/// Main application structure orchestrating the daemon lifecycle:
/// initialize, start services, run the main loop until shutdown.
///
/// # Example
///
/// ```no_run
/// use ilo_fand::application::Application;
/// use ilo_fand::config::ConfigManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    /// Creates a new ApplicationBuilder.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the complete daemon lifecycle.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;

        self.coordinator.start_all_services().await?;

        self.coordinator.run_main_loop().await?;

        Ok(())
    }
}

/// Builder for [`Application`] instances.
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
        }
    }

    /// Sets the configuration manager for the application.
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    /// Builds the Application instance.
    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow::anyhow!("Configuration manager is required"))?;

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            config_manager,
        })
    }
}
