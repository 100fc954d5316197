//! Scheduling event log.
//!
//! Each core keeps one `EventLog`, shared with the miss helpers it launches.
//! Events are stamped with the coordinator cycle at the time they are recorded.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::hiding::ContextChange;
use crate::common::data::AccessType;

/// A scheduling decision or context lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedEvent {
    /// A context was installed on the core.
    Switched {
        /// Cycle of the midpoint the change was applied at.
        cycle: u64,
        /// Kind of change.
        change: ContextChange,
        /// Context that was running, if any.
        from: Option<usize>,
        /// Context now running.
        to: usize,
    },
    /// A context was handed to a new miss helper.
    HelperLaunched {
        /// Launch cycle.
        cycle: u64,
        /// Context given to the helper.
        context: usize,
        /// Access that missed.
        access: AccessType,
    },
    /// A miss helper finished and parked its context as the waiting context.
    HelperParked {
        /// Park cycle.
        cycle: u64,
        /// Parked context.
        context: usize,
        /// Whether the helper asked for the context to be swapped back in.
        swap_requested: bool,
    },
    /// A context used up its quantum.
    QuantumExpired {
        /// Expiry cycle.
        cycle: u64,
        /// Expired context.
        context: usize,
    },
    /// A context executed `FIN`.
    Retired {
        /// Retirement cycle.
        cycle: u64,
        /// Retired context.
        context: usize,
    },
}

impl SchedEvent {
    /// Context the event is about; for switches, the incoming one.
    pub const fn context(&self) -> usize {
        match *self {
            Self::Switched { to, .. } => to,
            Self::HelperLaunched { context, .. }
            | Self::HelperParked { context, .. }
            | Self::QuantumExpired { context, .. }
            | Self::Retired { context, .. } => context,
        }
    }
}

/// Append-only list of scheduling events, cloneable across threads.
#[derive(Clone, Debug, Default)]
pub struct EventLog(Arc<Mutex<Vec<SchedEvent>>>);

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`.
    pub fn record(&self, event: SchedEvent) {
        self.0.lock().push(event);
    }

    /// Copies the events recorded so far.
    pub fn snapshot(&self) -> Vec<SchedEvent> {
        self.0.lock().clone()
    }
}
