//! Device-facing layer: the SSH command console and the Redfish
//! telemetry client for the managed iLO.

pub mod console;
pub mod telemetry;

pub use console::{RemoteConsole, SshConsole};
pub use telemetry::{RedfishClient, TelemetrySource, ThermalSnapshot};
