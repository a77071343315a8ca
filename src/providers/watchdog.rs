//! Thermal watchdog service.
//!
//! The safety net behind the operator: whenever the device is pinned
//! (`manual` or `silent`), every cycle compares the enabled sensors
//! against their safe maxima and forces the device back to automatic
//! control on the first breach. In `auto` mode the device's own thermal
//! loop is in charge and the watchdog stands down.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::{collections::HashMap, sync::Arc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    config::SensorCfg,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    state::FanMode,
    task_manager::TaskManager,
};

/// Thermal watchdog service provider.
///
/// Critical: pinned fans without a watchdog have no thermal protection
/// at all.
pub struct ThermalWatchdogProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ThermalWatchdogProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ThermalWatchdogProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            run_watchdog_service(state, event_bus, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ThermalWatchdog"
    }

    fn priority(&self) -> i32 {
        9
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_watchdog_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    // Same cadence as the poller, but on its own clock: each cycle judges
    // whatever snapshot is currently published.
    let mut interval = interval(state.config().await.poll_interval());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Thermal watchdog cancelled");
                break;
            }
            _instant = interval.tick() => {
                watchdog_cycle(&state, &event_bus).await;
            }
        }
    }
    Ok(())
}

/// One watchdog cycle over the current snapshot.
async fn watchdog_cycle(state: &Arc<AppState>, event_bus: &EventBus) {
    let snapshot = state.control.snapshot().await;
    if !matches!(snapshot.mode, FanMode::Manual | FanMode::Silent) {
        return;
    }

    let sensors = state.config().await.sensors.clone();

    if let Some((name, value)) = hottest_sensor(&sensors, &snapshot.sensor_readings) {
        info!("[watchdog] hottest sensor: {name} = {value}°C");
    }

    for sensor in sensors.iter().filter(|sensor| sensor.enabled) {
        let Some(&value) = snapshot.sensor_readings.get(&sensor.name) else {
            continue;
        };
        if value >= sensor.safe_max {
            warn!(
                "[watchdog] {} at {value}°C is at or above its safe maximum ({}°C), forcing auto mode",
                sensor.display_name, sensor.safe_max
            );
            state.controller.change_mode(FanMode::Auto).await;
            if let Err(e) = event_bus.publish(Event::ThermalBreach {
                sensor: sensor.display_name.clone(),
                value,
                safe_max: sensor.safe_max,
            }) {
                log::debug!("No breach subscribers: {e}");
            }
            // One forced transition neutralizes every breach this cycle.
            break;
        }
    }
}

/// Hottest configured sensor by last reading. A sensor without a reading
/// competes with 0 rather than being dropped, so it can never win against
/// a real value but is still accounted for.
fn hottest_sensor(
    sensors: &[SensorCfg],
    readings: &HashMap<String, f64>,
) -> Option<(String, f64)> {
    sensors
        .iter()
        .map(|sensor| {
            (
                sensor.name.clone(),
                readings.get(&sensor.name).copied().unwrap_or(0.0),
            )
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
