//! Mode controller: validates and applies cooling-mode transitions.
//!
//! Transitions are best-effort and deliberately non-diffing: entering a
//! mode re-issues the pin/unlock command for every enabled fan, which
//! makes the operation idempotent and heals any command a previous
//! transition silently lost at the device. A fan whose command fails is
//! logged and skipped, so one unreachable fan cannot block restoring
//! airflow to the rest. The new mode is published only after every fan
//! has been attempted; readers never observe a mode that is still
//! half-applied.

use std::sync::Arc;

use log::{error, info, warn};

use crate::{
    config::{Config, FanCfg},
    error::ControlError,
    ilo::RemoteConsole,
    state::{ControlState, FanMode},
};

/// Outcome of a manual speed request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeedChange {
    /// The fan was pinned to the new target.
    Applied { fan: String, raw: u8 },
    /// Current mode is not `manual`; nothing was sent to the device.
    /// A common, harmless race between the operator and the watchdog.
    IgnoredNotManual,
}

/// Applies mode transitions and manual speed changes to the device and
/// the shared control state.
pub struct ModeController {
    fans: Vec<FanCfg>,
    silent_speed: u8,
    console: Arc<dyn RemoteConsole>,
    control: Arc<ControlState>,
}

/// Converts an operator percentage (0-100) to the device's raw 0-255
/// range, rounding up so any nonzero request keeps the fan spinning.
pub fn percent_to_raw(percent: u8) -> u8 {
    ((f64::from(percent) / 100.0) * 255.0).ceil() as u8
}

/// Converts a raw device value back to a percentage, rounding up to
/// mirror [`percent_to_raw`].
pub fn raw_to_percent(raw: u8) -> u8 {
    ((f64::from(raw) / 255.0) * 100.0).ceil() as u8
}

fn lock_command(fan_id: u16, raw: u8) -> String {
    format!("fan p {fan_id} lock {raw}")
}

fn unlock_command(fan_id: u16) -> String {
    format!("fan p {fan_id} unlock")
}

impl ModeController {
    pub fn new(
        config: &Config,
        console: Arc<dyn RemoteConsole>,
        control: Arc<ControlState>,
    ) -> Self {
        Self {
            fans: config.fans.clone(),
            silent_speed: config.silent_speed,
            console,
            control,
        }
    }

    /// Parses and applies an operator mode request.
    ///
    /// An unknown mode string is rejected before any device command is
    /// issued; the current mode stays untouched.
    pub async fn request_mode_change(&self, mode: &str) -> Result<FanMode, ControlError> {
        let mode: FanMode = mode
            .parse()
            .map_err(|()| ControlError::InvalidMode(mode.to_string()))?;

        self.change_mode(mode).await;
        Ok(mode)
    }

    /// Applies a mode transition: one command per enabled fan, in
    /// configuration order, then publishes the new mode.
    pub async fn change_mode(&self, mode: FanMode) {
        match mode {
            FanMode::Silent => {
                for fan in self.enabled_fans() {
                    self.issue(&lock_command(fan.id, self.silent_speed), fan)
                        .await;
                    self.control
                        .set_manual_speed(&fan.name, self.silent_speed)
                        .await;
                }
            }
            FanMode::Manual => {
                let targets = self.control.snapshot().await.manual_speeds;
                for fan in self.enabled_fans() {
                    // Every enabled fan has a seeded target; 0 would mean
                    // the invariant was broken elsewhere.
                    let raw = targets.get(&fan.name).copied().unwrap_or(0);
                    self.issue(&lock_command(fan.id, raw), fan).await;
                }
            }
            FanMode::Auto => {
                for fan in self.enabled_fans() {
                    self.issue(&unlock_command(fan.id), fan).await;
                }
            }
        }

        self.control.set_mode(mode).await;
        info!("Cooling mode set to {mode}");
    }

    /// Sets the manual target of one fan.
    ///
    /// Only takes effect in `manual` mode; in any other mode this is a
    /// logged no-op, not an error. Validates the percentage and the fan
    /// id before touching the device.
    pub async fn request_manual_speed(
        &self,
        fan_id: u16,
        percent: u8,
    ) -> Result<SpeedChange, ControlError> {
        let mode = self.control.mode().await;
        if mode != FanMode::Manual {
            warn!(
                "Ignoring manual speed for fan {fan_id}: current mode is {mode}, expected manual"
            );
            return Ok(SpeedChange::IgnoredNotManual);
        }

        if percent > 100 {
            return Err(ControlError::SpeedOutOfRange(percent));
        }

        let fan = self
            .fans
            .iter()
            .find(|fan| fan.id == fan_id && fan.enabled)
            .ok_or(ControlError::UnknownFan(fan_id))?;

        let raw = percent_to_raw(percent);
        self.issue(&lock_command(fan.id, raw), fan).await;
        self.control.set_manual_speed(&fan.name, raw).await;
        info!("Manual speed for '{}' set to {percent}% (raw {raw})", fan.name);

        Ok(SpeedChange::Applied {
            fan: fan.name.clone(),
            raw,
        })
    }

    fn enabled_fans(&self) -> impl Iterator<Item = &FanCfg> {
        self.fans.iter().filter(|fan| fan.enabled)
    }

    /// Runs one console command, logging instead of propagating failures:
    /// the remaining fans of a transition must still be attempted.
    async fn issue(&self, command: &str, fan: &FanCfg) {
        if let Err(e) = self.console.run(command).await {
            error!("Command for fan '{}' failed: {e}", fan.name);
        }
    }
}
