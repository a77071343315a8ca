//! Error types for the device boundary and operator-facing operations.

use std::time::Duration;

use thiserror::Error;

/// Synchronous rejections of operator requests.
///
/// These never reach the device: the request is refused before any remote
/// command is issued and the shared control state is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The requested mode string is not one of `auto`, `silent`, `manual`.
    #[error("invalid mode '{0}', expected one of 'auto', 'silent' or 'manual'")]
    InvalidMode(String),

    /// Manual speed outside the 0-100 percent range.
    #[error("invalid speed {0}, must be between 0 and 100")]
    SpeedOutOfRange(u8),

    /// Fan id that is not configured, or configured but disabled.
    #[error("unknown or disabled fan id {0}")]
    UnknownFan(u16),
}

/// Failures of a single remote console command.
///
/// A failed command never aborts a mode transition on its own; the mode
/// controller logs it and carries on with the remaining fans.
#[derive(Debug, Error)]
pub enum CommandError {
    /// TCP/SSH session establishment failed.
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: russh::Error,
    },

    /// The device rejected the configured credentials.
    #[error("authentication rejected for {user}@{host}")]
    Auth { user: String, host: String },

    /// The command ran but exited non-zero on the device.
    #[error("remote command exited with status {status}: {stderr}")]
    Exec { status: u32, stderr: String },

    /// The whole call exceeded the configured request timeout.
    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    /// Any other SSH transport failure mid-session.
    #[error("ssh transport error: {0}")]
    Transport(#[from] russh::Error),
}

/// Failures of a single telemetry fetch.
///
/// All variants are treated as "no update this cycle": the previous
/// readings snapshot stays in place and the next poll retries.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The thermal endpoint answered with a non-2xx status.
    #[error("telemetry endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level failure, including request timeouts.
    #[error("telemetry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the expected thermal JSON document.
    #[error("malformed thermal payload: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn control_error_messages_name_the_offending_input() {
        assert_eq!(
            ControlError::InvalidMode("turbo".into()).to_string(),
            "invalid mode 'turbo', expected one of 'auto', 'silent' or 'manual'"
        );
        assert_eq!(
            ControlError::SpeedOutOfRange(101).to_string(),
            "invalid speed 101, must be between 0 and 100"
        );
        assert_eq!(
            ControlError::UnknownFan(9).to_string(),
            "unknown or disabled fan id 9"
        );
    }

    #[test]
    fn exec_error_carries_status_and_stderr() {
        let err = CommandError::Exec {
            status: 2,
            stderr: "fan: no such target".into(),
        };
        assert_eq!(
            err.to_string(),
            "remote command exited with status 2: fan: no such target"
        );
    }

    #[test]
    fn http_error_records_status_and_body() {
        let err = TelemetryError::Http {
            status: 401,
            body: "Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "telemetry endpoint returned 401: Unauthorized");
    }
}
