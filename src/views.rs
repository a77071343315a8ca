//! Presentation read model.
//!
//! Derived views over the control state for the external dashboard layer.
//! Everything here is computed on demand from a state snapshot plus the
//! static descriptors and is never stored back.

use serde::Serialize;

use crate::{
    config::Config,
    controller::raw_to_percent,
    state::{FanMode, StateSnapshot},
};

/// Substring marking memory-module sensors; they are aggregated into one
/// "Memory" row and never shown individually.
pub const MEMORY_SENSOR_TAG: &str = "DIMM";

/// Display name of the synthesized memory row.
pub const MEMORY_DISPLAY_NAME: &str = "Memory";

/// Safe maximum shown for the synthesized memory row (°C).
pub const MEMORY_SAFE_MAX: f64 = 85.0;

/// Shown when no telemetry fetch has succeeded yet.
const NEVER_UPDATED: &str = "--:--:--";

/// One fan with its last known speed reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanReadingView {
    pub display_name: String,
    /// Speed as reported by the device (percent).
    pub reading: f64,
}

/// One temperature row: a real sensor or the synthesized memory entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureView {
    pub display_name: String,
    pub value: f64,
    pub safe_max: f64,
}

/// Current mode and telemetry freshness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub mode: FanMode,
    pub last_updated: String,
}

/// One fan's manual target, as a percentage for operator display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualSpeedView {
    pub id: u16,
    pub name: String,
    pub display_name: String,
    pub percent: u8,
}

/// Every enabled fan with a reading; fans the device has not reported
/// yet are omitted, not zero-filled.
pub fn fan_overview(config: &Config, snapshot: &StateSnapshot) -> Vec<FanReadingView> {
    config
        .enabled_fans()
        .filter_map(|fan| {
            snapshot
                .fan_readings
                .get(&fan.name)
                .map(|reading| FanReadingView {
                    display_name: fan.display_name.clone(),
                    reading: *reading,
                })
        })
        .collect()
}

/// Enabled non-memory sensors with integer-truncated values, plus one
/// "Memory" row averaging the known memory-module readings (truncated
/// per module, mean rounded to one decimal place). Sorted by display
/// name for stable rendering.
pub fn temperature_overview(config: &Config, snapshot: &StateSnapshot) -> Vec<TemperatureView> {
    let mut rows: Vec<TemperatureView> = config
        .sensors
        .iter()
        .filter(|sensor| sensor.enabled && !sensor.name.contains(MEMORY_SENSOR_TAG))
        .filter_map(|sensor| {
            snapshot
                .sensor_readings
                .get(&sensor.name)
                .map(|value| TemperatureView {
                    display_name: sensor.display_name.clone(),
                    value: value.trunc(),
                    safe_max: sensor.safe_max,
                })
        })
        .collect();

    let memory_values: Vec<f64> = snapshot
        .sensor_readings
        .iter()
        .filter(|(name, _)| name.contains(MEMORY_SENSOR_TAG))
        .map(|(_, value)| value.trunc())
        .collect();

    if !memory_values.is_empty() {
        let mean = memory_values.iter().sum::<f64>() / memory_values.len() as f64;
        rows.push(TemperatureView {
            display_name: MEMORY_DISPLAY_NAME.to_string(),
            value: (mean * 10.0).round() / 10.0,
            safe_max: MEMORY_SAFE_MAX,
        });
    }

    rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    rows
}

/// Mode plus the wall-clock time of the last successful fetch.
pub fn mode_summary(snapshot: &StateSnapshot) -> ModeSummary {
    ModeSummary {
        mode: snapshot.mode,
        last_updated: snapshot
            .last_updated
            .map_or_else(|| NEVER_UPDATED.to_string(), |t| t.format("%H:%M:%S").to_string()),
    }
}

/// Manual targets of the enabled fans, converted back to percentages.
pub fn manual_speed_overview(config: &Config, snapshot: &StateSnapshot) -> Vec<ManualSpeedView> {
    config
        .enabled_fans()
        .filter_map(|fan| {
            snapshot
                .manual_speeds
                .get(&fan.name)
                .map(|raw| ManualSpeedView {
                    id: fan.id,
                    name: fan.name.clone(),
                    display_name: fan.display_name.clone(),
                    percent: raw_to_percent(*raw),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FanCfg, SensorCfg};
    use crate::state::ControlState;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn sensor(id: u16, name: &str, display_name: &str, enabled: bool, safe_max: f64) -> SensorCfg {
        SensorCfg {
            id,
            name: name.into(),
            display_name: display_name.into(),
            enabled,
            safe_max,
        }
    }

    fn test_config() -> Config {
        Config {
            fans: vec![
                FanCfg {
                    id: 0,
                    name: "Fan 1".into(),
                    display_name: "Fan #1".into(),
                    enabled: true,
                },
                FanCfg {
                    id: 1,
                    name: "Fan 2".into(),
                    display_name: "Fan #2".into(),
                    enabled: true,
                },
                FanCfg {
                    id: 2,
                    name: "Fan 3".into(),
                    display_name: "Fan #3".into(),
                    enabled: false,
                },
            ],
            sensors: vec![
                sensor(1, "01-Inlet Ambient", "Inlet", true, 70.0),
                sensor(2, "02-CPU 1", "CPU 1", true, 85.0),
                sensor(4, "04-P1 DIMM 1-3", "P1 DIMM 1-3", true, 85.0),
                sensor(5, "05-P1 DIMM 4-6", "P1 DIMM 4-6", true, 85.0),
                sensor(12, "12-HD Max", "Hard Drive Max", false, 80.0),
            ],
            ..Default::default()
        }
    }

    async fn snapshot_with(
        fans: HashMap<String, f64>,
        temps: HashMap<String, f64>,
    ) -> StateSnapshot {
        let state = ControlState::new(&test_config());
        state.replace_readings(fans, temps).await;
        state.snapshot().await
    }

    #[tokio::test]
    async fn fan_overview_omits_fans_without_a_reading() {
        let config = test_config();
        let snapshot = snapshot_with(
            HashMap::from([("Fan 1".to_string(), 23.0), ("Fan 3".to_string(), 50.0)]),
            HashMap::new(),
        )
        .await;

        let views = fan_overview(&config, &snapshot);

        // Fan 2 has no reading, Fan 3 is disabled.
        assert_eq!(
            views,
            vec![FanReadingView {
                display_name: "Fan #1".into(),
                reading: 23.0,
            }]
        );
    }

    #[tokio::test]
    async fn temperature_overview_aggregates_memory_sensors() {
        let config = test_config();
        let snapshot = snapshot_with(
            HashMap::new(),
            HashMap::from([
                ("04-P1 DIMM 1-3".to_string(), 40.0),
                ("05-P1 DIMM 4-6".to_string(), 44.0),
            ]),
        )
        .await;

        let views = temperature_overview(&config, &snapshot);

        assert_eq!(
            views,
            vec![TemperatureView {
                display_name: "Memory".into(),
                value: 42.0,
                safe_max: MEMORY_SAFE_MAX,
            }]
        );
    }

    #[tokio::test]
    async fn memory_row_absent_without_any_dimm_reading() {
        let config = test_config();
        let snapshot = snapshot_with(
            HashMap::new(),
            HashMap::from([("02-CPU 1".to_string(), 41.0)]),
        )
        .await;

        let views = temperature_overview(&config, &snapshot);
        assert!(views.iter().all(|v| v.display_name != "Memory"));
    }

    #[tokio::test]
    async fn memory_mean_truncates_modules_then_rounds_once() {
        let config = test_config();
        let snapshot = snapshot_with(
            HashMap::new(),
            HashMap::from([
                ("04-P1 DIMM 1-3".to_string(), 40.9),
                ("05-P1 DIMM 4-6".to_string(), 45.9),
            ]),
        )
        .await;

        let views = temperature_overview(&config, &snapshot);
        // Modules truncate to 40 and 45; mean 42.5.
        assert_eq!(views[0].value, 42.5);
    }

    #[tokio::test]
    async fn temperature_values_are_integer_truncated_and_sorted() {
        let config = test_config();
        let snapshot = snapshot_with(
            HashMap::new(),
            HashMap::from([
                ("02-CPU 1".to_string(), 40.7),
                ("01-Inlet Ambient".to_string(), 21.9),
                ("12-HD Max".to_string(), 77.0), // disabled, ignored
            ]),
        )
        .await;

        let views = temperature_overview(&config, &snapshot);

        assert_eq!(
            views,
            vec![
                TemperatureView {
                    display_name: "CPU 1".into(),
                    value: 40.0,
                    safe_max: 85.0,
                },
                TemperatureView {
                    display_name: "Inlet".into(),
                    value: 21.0,
                    safe_max: 70.0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn mode_summary_shows_placeholder_before_first_fetch() {
        let state = ControlState::new(&test_config());
        let summary = mode_summary(&state.snapshot().await);

        assert_eq!(summary.mode, FanMode::Auto);
        assert_eq!(summary.last_updated, "--:--:--");
    }

    #[tokio::test]
    async fn mode_summary_formats_last_update_as_wall_clock() {
        let snapshot = snapshot_with(HashMap::new(), HashMap::new()).await;
        let summary = mode_summary(&snapshot);

        assert_ne!(summary.last_updated, "--:--:--");
        // HH:MM:SS
        assert_eq!(summary.last_updated.len(), 8);
    }

    #[tokio::test]
    async fn manual_speed_overview_reports_percentages() {
        let config = test_config();
        let state = ControlState::new(&config);
        state.set_manual_speed("Fan 1", 255).await;
        let snapshot = state.snapshot().await;

        let views = manual_speed_overview(&config, &snapshot);

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].percent, 100); // raw 255
        // Default raw 18 -> ceil(18/255*100) = 8
        assert_eq!(views[1].percent, 8);
        assert_eq!(views[1].id, 1);
    }
}
