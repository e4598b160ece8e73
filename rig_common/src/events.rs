//! Broadcast events and the subscriber contract.
//!
//! Observers (status pushers, protocol adapters, test probes) implement
//! [`Subscriber`] and register with an [`EventBus`]. Dispatch isolates each
//! subscriber: a panicking subscriber is logged and skipped, and can never
//! take down the emitting worker thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::safety::{EmergencyMode, SafetyState};
use crate::timeline::TimelineState;

/// Asynchronous notifications broadcast to all observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A servo was commanded to a new angle.
    ServoUpdate {
        /// Canonical servo id.
        id: String,
        /// Stored (clamped, unoriented) angle [degrees].
        angle: f64,
    },
    /// A servo channel was re-attached.
    ServoEnabled {
        /// Canonical servo id.
        id: String,
    },
    /// A servo channel was detached.
    ServoDisabled {
        /// Canonical servo id.
        id: String,
    },
    /// A new servo entered the registry.
    ServoRegistered {
        /// Canonical servo id.
        id: String,
        /// Hardware channel.
        channel: u8,
    },
    /// An emergency stop executed.
    EmergencyStop {
        /// The mode that ran.
        mode: EmergencyMode,
        /// Resulting safety state.
        state: SafetyState,
    },
    /// Preset engine activity changed.
    PresetStatus {
        /// Names of currently running instances.
        running: Vec<String>,
    },
    /// Timeline transport changed.
    TimelineStatus {
        /// Transport state.
        state: TimelineState,
        /// Playhead position [ms].
        time_ms: f64,
    },
    /// Periodic full snapshot (2 Hz).
    StatusUpdate {
        /// Serialized snapshot payload.
        snapshot: serde_json::Value,
    },
}

/// Observer contract. Implementations must tolerate being called from
/// worker threads.
pub trait Subscriber: Send + Sync {
    /// Handle one event. Panics are contained by the bus.
    fn on(&self, event: &Event);
}

/// Fan-out dispatcher with per-subscriber failure isolation.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl EventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all subsequent events.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Broadcast `event` to every subscriber.
    ///
    /// Subscribers run on the caller's thread; a panic in one is logged
    /// and the remaining subscribers still receive the event.
    pub fn emit(&self, event: &Event) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber.on(event))).is_err() {
                error!("event subscriber panicked, skipping");
            }
        }
    }
}
