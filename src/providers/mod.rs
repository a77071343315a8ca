//! Dependency injection providers for service management.
//!
//! Each background service of the daemon is wrapped in a provider so the
//! coordinator can start them uniformly, in priority order, with the
//! critical/non-critical distinction handled in one place.

pub mod app_state;
pub mod polling;
pub mod traits;
pub mod watchdog;

pub use app_state::AppStateProvider;
pub use polling::TelemetryPollerProvider;
pub use traits::{AsyncProvider, ServiceProvider};
pub use watchdog::ThermalWatchdogProvider;
