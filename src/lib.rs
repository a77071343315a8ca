//! # ilo_fand
//!
//! A Linux daemon supervising the cooling subsystem of an HPE server
//! through its iLO management controller.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio; all device I/O is bounded
//!   and cooperative
//! - **Telemetry Polling**: Periodic fan/temperature readings from the
//!   iLO's Redfish-style thermal endpoint
//! - **Mode Control**: `auto`, `silent` and `manual` cooling modes,
//!   applied over the iLO SSH console
//! - **Thermal Watchdog**: Forces automatic control back on whenever an
//!   enabled sensor reaches its safe maximum
//! - **Legacy Device Support**: Speaks the old key-exchange algorithms
//!   and self-signed TLS that deployed iLO firmware requires
//!
//! ## Architecture
//!
//! The daemon wires its services through a small provider system:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - [`ControlState`](state::ControlState) - The single mutable record of
//!   mode, readings and manual fan targets
//!
//! The dashboard layer (out of tree) reads through the view accessors on
//! [`AppState`](app_context::AppState) and issues commands through
//! [`ModeController`](controller::ModeController); it never touches the
//! device channels directly.
//!
//! ## Example
//!
//! ```no_run
//! use ilo_fand::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod ilo;
pub mod providers;
pub mod state;
pub mod task_manager;
pub mod views;
