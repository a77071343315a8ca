//! Application state: the shared handles every service works against.

use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::{Config, ConfigManager},
    controller::ModeController,
    ilo::{RedfishClient, SshConsole, TelemetrySource},
    state::ControlState,
    views::{self, FanReadingView, ManualSpeedView, ModeSummary, TemperatureView},
};

/// Shared application state.
///
/// Wired once at startup and handed to every service behind an `Arc`.
/// The only mutable piece is [`ControlState`]; everything else is
/// read-only after construction.
pub struct AppState {
    /// Configuration, immutable after load.
    pub config_manager: Arc<ConfigManager>,
    /// The single shared control state.
    pub control: Arc<ControlState>,
    /// Mode state machine and manual speed operations.
    pub controller: Arc<ModeController>,
    /// Telemetry source polled by the background refresh loop.
    pub telemetry: Arc<dyn TelemetrySource>,
}

impl AppState {
    /// Builds the full component graph from the configuration: the SSH
    /// console, the Redfish telemetry client, the control state and the
    /// mode controller.
    pub async fn new(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let timeout = config.request_timeout();

        let console = Arc::new(SshConsole::new(&config.device, timeout));
        let telemetry = Arc::new(RedfishClient::new(&config.device, timeout)?);
        let control = Arc::new(ControlState::new(&config));
        let controller = Arc::new(ModeController::new(&config, console, control.clone()));

        Ok(Self {
            config_manager: Arc::new(config_manager),
            control,
            controller,
            telemetry,
        })
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    /// Fan speeds for presentation; see [`views::fan_overview`].
    pub async fn fan_view(&self) -> Vec<FanReadingView> {
        let snapshot = self.control.snapshot().await;
        views::fan_overview(&*self.config().await, &snapshot)
    }

    /// Temperatures for presentation; see [`views::temperature_overview`].
    pub async fn temperature_view(&self) -> Vec<TemperatureView> {
        let snapshot = self.control.snapshot().await;
        views::temperature_overview(&*self.config().await, &snapshot)
    }

    /// Current mode and telemetry freshness.
    pub async fn mode_summary(&self) -> ModeSummary {
        views::mode_summary(&self.control.snapshot().await)
    }

    /// Manual fan targets as percentages.
    pub async fn manual_speeds_view(&self) -> Vec<ManualSpeedView> {
        let snapshot = self.control.snapshot().await;
        views::manual_speed_overview(&*self.config().await, &snapshot)
    }
}
