//! Event-driven communication between the daemon's services.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::broadcast;

/// Application events published through the [`EventBus`].
///
/// Services publish what happened; interested parties subscribe. This
/// keeps the poller, the watchdog and the coordinator decoupled from each
/// other.
#[derive(Debug, Clone)]
pub enum Event {
    /// A telemetry fetch succeeded; carries the fresh sensor temperatures.
    TelemetryUpdated(HashMap<String, f64>),
    /// The watchdog found a sensor at or above its safe maximum and forced
    /// the device back to automatic control.
    ThermalBreach {
        sensor: String,
        value: f64,
        safe_max: f64,
    },
    SystemShutdown,
}

/// Broadcast bus for publish-subscribe messaging between services.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Creates a new subscriber receiving every event published after the
    /// subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
