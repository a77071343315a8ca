//! Shared control state: the single mutable entity of the daemon.
//!
//! One [`ControlState`] instance is created at startup and shared by the
//! telemetry poller, the thermal watchdog, the mode controller and the
//! presentation layer. Every read and write goes through one `RwLock`
//! acquisition over the whole record, so callers always observe a
//! consistent snapshot: never a half-replaced readings map, never a mode
//! value that does not match one of the three cooling modes.

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;

/// Cooling mode of the managed device.
///
/// `Auto` delegates fan control to the device's own thermal loop; `Silent`
/// pins every enabled fan to the configured silent speed; `Manual` pins
/// each enabled fan to its operator-chosen target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    Silent,
    Manual,
}

impl FanMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Silent => "silent",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "silent" => Ok(Self::Silent),
            "manual" => Ok(Self::Manual),
            _ => Err(()),
        }
    }
}

/// Consistent copy of the control state at one point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Current cooling mode.
    pub mode: FanMode,
    /// Last observed fan speed per fan internal name (device units, percent).
    pub fan_readings: HashMap<String, f64>,
    /// Last observed temperature per sensor internal name (°C). Sensors the
    /// device did not report in the last successful fetch are absent.
    pub sensor_readings: HashMap<String, f64>,
    /// Timestamp of the last successful telemetry fetch.
    pub last_updated: Option<DateTime<Local>>,
    /// Manual target speed per enabled fan internal name (raw 0-255).
    pub manual_speeds: HashMap<String, u8>,
}

/// The shared mutable control state.
///
/// Mutation is restricted to the mode controller (`mode`, `manual_speeds`)
/// and the telemetry poller (`*_readings`, `last_updated`); everything else
/// reads through [`ControlState::snapshot`].
pub struct ControlState {
    inner: RwLock<StateSnapshot>,
}

impl ControlState {
    /// Creates the state for the given configuration: mode `auto`, empty
    /// readings, and a manual target seeded from `manual_default_speed`
    /// for every enabled fan.
    ///
    /// The set of `manual_speeds` keys is fixed here for the process
    /// lifetime; no later operation adds or removes an entry.
    pub fn new(config: &Config) -> Self {
        let manual_speeds = config
            .enabled_fans()
            .map(|fan| (fan.name.clone(), config.manual_default_speed))
            .collect();

        Self {
            inner: RwLock::new(StateSnapshot {
                mode: FanMode::Auto,
                fan_readings: HashMap::new(),
                sensor_readings: HashMap::new(),
                last_updated: None,
                manual_speeds,
            }),
        }
    }

    /// Returns a consistent copy of the whole state.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.read().await.clone()
    }

    /// Current cooling mode.
    pub async fn mode(&self) -> FanMode {
        self.inner.read().await.mode
    }

    /// Publishes a new cooling mode.
    pub async fn set_mode(&self, mode: FanMode) {
        self.inner.write().await.mode = mode;
    }

    /// Updates the manual target of one fan. Fans outside the seeded set
    /// are ignored; the membership invariant is enforced here, not at the
    /// call sites.
    pub async fn set_manual_speed(&self, fan: &str, raw: u8) {
        if let Some(target) = self.inner.write().await.manual_speeds.get_mut(fan) {
            *target = raw;
        }
    }

    /// Manual target of one fan, if it is part of the seeded set.
    pub async fn manual_speed(&self, fan: &str) -> Option<u8> {
        self.inner.read().await.manual_speeds.get(fan).copied()
    }

    /// Replaces both readings maps and stamps `last_updated`, all under a
    /// single write lock. Readings are never merged entry-by-entry: a
    /// refresh swaps the whole maps so readers cannot observe a mix of
    /// old and new values.
    pub async fn replace_readings(
        &self,
        fans: HashMap<String, f64>,
        sensors: HashMap<String, f64>,
    ) {
        let mut inner = self.inner.write().await;
        inner.fan_readings = fans;
        inner.sensor_readings = sensors;
        inner.last_updated = Some(Local::now());
    }
}
