//! System coordinator for service lifecycle management.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, ServiceProvider, TelemetryPollerProvider,
        ThermalWatchdogProvider,
    },
    state::FanMode,
    task_manager::TaskManager,
};

/// Coordinates initialization, service startup, the main event loop and
/// graceful shutdown of the daemon.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Builds the shared state and registers the service providers.
    ///
    /// Also issues the initial transition to `auto` so the device starts
    /// under its own thermal control regardless of what a previous run
    /// left pinned.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let state = AppStateProvider::new(config_manager)
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        info!("Releasing all fans to automatic control for startup");
        state.controller.change_mode(FanMode::Auto).await;

        self.register_service_providers(state);

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(TelemetryPollerProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
            Box::new(ThermalWatchdogProvider::new(state, self.event_bus.clone())),
        ];

        providers.sort_by_key(|provider| std::cmp::Reverse(provider.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    ///
    /// A critical service failing to start aborts startup; a non-critical
    /// one is skipped with a warning.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    log::warn!(
                        "Non-critical service '{}' failed to start: {e}",
                        provider.name()
                    );
                }
            }
        }

        info!("All critical services started");
        Ok(())
    }

    /// Main event loop: waits for Ctrl-C or a shutdown event, logging
    /// service events in between.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            info!("Received Ctrl+C, initiating graceful shutdown...");
                            self.shutdown().await
                                .context("Failed to shutdown gracefully after Ctrl+C")?;
                            break;
                        }
                        Err(e) => {
                            bail!("Failed to listen for shutdown signal: {e}");
                        }
                    }
                }

                event = event_rx.recv() => {
                    if !self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        info!("Main event loop terminated");
        Ok(())
    }

    /// Handles one bus event; returns `false` once the loop should stop.
    async fn handle_event(
        &mut self,
        event_result: Result<Event, tokio::sync::broadcast::error::RecvError>,
    ) -> Result<bool> {
        match event_result {
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                self.shutdown()
                    .await
                    .context("Failed to shutdown gracefully after SystemShutdown event")?;
                return Ok(false);
            }
            Ok(Event::ThermalBreach {
                sensor,
                value,
                safe_max,
            }) => {
                // The watchdog already forced auto mode; the coordinator
                // only records the occurrence at daemon level.
                log::warn!(
                    "Thermal breach handled: {sensor} reached {value}°C (safe maximum {safe_max}°C)"
                );
            }
            Ok(Event::TelemetryUpdated(temps)) => {
                log::debug!("Telemetry updated for {} sensors", temps.len());
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Event bus channel closed unexpectedly");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event bus lagged by {n} messages");
            }
        }
        Ok(true)
    }

    /// Performs graceful shutdown of all background tasks.
    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {e}");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Shared state accessor for the embedding process (dashboard glue).
    pub fn shared_state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    /// Event bus accessor, mainly for tests and the embedding process.
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
