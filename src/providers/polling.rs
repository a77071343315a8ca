//! Telemetry polling service.
//!
//! Refreshes the shared control state from the device's thermal endpoint
//! on a fixed interval. A failed fetch is logged and skipped: the
//! previous readings stay in place and the next tick is the retry.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Telemetry poller service provider.
///
/// Critical: without fresh readings the watchdog would be judging stale
/// data forever and the dashboard would show nothing.
pub struct TelemetryPollerProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl TelemetryPollerProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for TelemetryPollerProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name().to_string(), |cancel_token| async move {
            run_polling_service(state, event_bus, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TelemetryPoller"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_polling_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut interval = interval(state.config().await.poll_interval());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Telemetry poller cancelled");
                break;
            }
            _instant = interval.tick() => {
                refresh_telemetry(&state, &event_bus).await;
            }
        }
    }
    Ok(())
}

/// One poll cycle: fetch, then atomically replace the readings.
///
/// Any failure leaves the previous snapshot untouched; the fixed-interval
/// loop itself is the retry mechanism, there is no backoff.
async fn refresh_telemetry(state: &Arc<AppState>, event_bus: &EventBus) {
    match state.telemetry.fetch().await {
        Ok(snapshot) => {
            debug!(
                "Fetched device telemetry: {} fans, {} sensors",
                snapshot.fans.len(),
                snapshot.temperatures.len()
            );
            state
                .control
                .replace_readings(snapshot.fans, snapshot.temperatures.clone())
                .await;

            if let Err(e) = event_bus.publish(Event::TelemetryUpdated(snapshot.temperatures)) {
                debug!("No telemetry subscribers: {e}");
            }
        }
        Err(e) => {
            error!("Telemetry refresh failed, keeping previous snapshot: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager, FanCfg, SensorCfg},
        controller::ModeController,
        error::{CommandError, TelemetryError},
        ilo::{RemoteConsole, TelemetrySource, ThermalSnapshot},
        ilo::telemetry::MockTelemetrySource,
        state::ControlState,
    };
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::time::sleep;

    struct NullConsole;

    #[async_trait]
    impl RemoteConsole for NullConsole {
        async fn run(&self, _command: &str) -> Result<String, CommandError> {
            Ok(String::new())
        }
    }

    fn test_config() -> Config {
        Config {
            poll_seconds: 1,
            fans: vec![FanCfg {
                id: 0,
                name: "Fan 1".into(),
                display_name: "Fan #1".into(),
                enabled: true,
            }],
            sensors: vec![SensorCfg {
                id: 2,
                name: "02-CPU 1".into(),
                display_name: "CPU 1".into(),
                enabled: true,
                safe_max: 85.0,
            }],
            ..Default::default()
        }
    }

    fn app_state_with(telemetry: Arc<dyn TelemetrySource>) -> Arc<AppState> {
        let config = test_config();
        let config_manager = ConfigManager::new(config.clone(), PathBuf::from("/tmp/test.yml"));
        let control = Arc::new(ControlState::new(&config));
        let controller = Arc::new(ModeController::new(
            &config,
            Arc::new(NullConsole),
            control.clone(),
        ));

        Arc::new(AppState {
            config_manager: Arc::new(config_manager),
            control,
            controller,
            telemetry,
        })
    }

    fn snapshot_fixture() -> ThermalSnapshot {
        ThermalSnapshot {
            fans: HashMap::from([("Fan 1".to_string(), 50.0)]),
            temperatures: HashMap::from([("02-CPU 1".to_string(), 40.0)]),
        }
    }

    #[tokio::test]
    async fn successful_fetch_replaces_readings_and_stamps_time() {
        let mut telemetry = MockTelemetrySource::new();
        telemetry
            .expect_fetch()
            .times(1)
            .returning(|| Ok(snapshot_fixture()));

        let state = app_state_with(Arc::new(telemetry));
        let event_bus = EventBus::new();

        refresh_telemetry(&state, &event_bus).await;

        let snapshot = state.control.snapshot().await;
        assert_eq!(snapshot.fan_readings.get("Fan 1"), Some(&50.0));
        assert_eq!(snapshot.sensor_readings.get("02-CPU 1"), Some(&40.0));
        assert!(snapshot.last_updated.is_some());

        // The presentation views reflect exactly the fetched values.
        let fans = state.fan_view().await;
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].display_name, "Fan #1");
        assert_eq!(fans[0].reading, 50.0);

        let temps = state.temperature_view().await;
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].display_name, "CPU 1");
        assert_eq!(temps[0].value, 40.0);
        assert_eq!(temps[0].safe_max, 85.0);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_previous_snapshot_untouched() {
        let mut ok_source = MockTelemetrySource::new();
        ok_source
            .expect_fetch()
            .times(1)
            .returning(|| Ok(snapshot_fixture()));

        let mut failing_source = MockTelemetrySource::new();
        failing_source.expect_fetch().times(1).returning(|| {
            Err(TelemetryError::Http {
                status: 500,
                body: "Internal Server Error".into(),
            })
        });

        let state = app_state_with(Arc::new(ok_source));
        let event_bus = EventBus::new();
        refresh_telemetry(&state, &event_bus).await;
        let before = state.control.snapshot().await;

        // Same control state, now behind a failing source.
        let failing_state = Arc::new(AppState {
            config_manager: state.config_manager.clone(),
            control: state.control.clone(),
            controller: state.controller.clone(),
            telemetry: Arc::new(failing_source),
        });
        refresh_telemetry(&failing_state, &event_bus).await;

        let after = state.control.snapshot().await;
        assert_eq!(after.fan_readings, before.fan_readings);
        assert_eq!(after.sensor_readings, before.sensor_readings);
        assert_eq!(after.last_updated, before.last_updated);
    }

    #[tokio::test]
    async fn fetch_publishes_fresh_temperatures() {
        let mut telemetry = MockTelemetrySource::new();
        telemetry
            .expect_fetch()
            .times(1)
            .returning(|| Ok(snapshot_fixture()));

        let state = app_state_with(Arc::new(telemetry));
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();

        refresh_telemetry(&state, &event_bus).await;

        match receiver.recv().await.unwrap() {
            Event::TelemetryUpdated(temps) => {
                assert_eq!(temps.get("02-CPU 1"), Some(&40.0));
            }
            other => panic!("Expected TelemetryUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poller_service_responds_to_cancellation() {
        let mut telemetry = MockTelemetrySource::new();
        telemetry
            .expect_fetch()
            .returning(|| Ok(ThermalSnapshot::default()));

        let state = app_state_with(Arc::new(telemetry));
        let event_bus = EventBus::new();
        let mut task_manager = TaskManager::new();

        let provider = TelemetryPollerProvider::new(state, event_bus);
        provider.start(&mut task_manager).await.unwrap();
        assert!(task_manager.is_running("TelemetryPoller"));

        sleep(Duration::from_millis(50)).await;
        task_manager.shutdown_all().await.unwrap();
        assert_eq!(task_manager.active_count(), 0);
    }
}
