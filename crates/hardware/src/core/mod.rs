//! Core engines.
//!
//! This module contains the two simulated cores and everything they share: the
//! contexts they run, the ready queue they pull from, instruction execution and
//! the private caches. It provides:
//! 1. **Blocking Engine:** Core 1, which resolves every miss inline.
//! 2. **Latency-Hiding Engine:** Core 0, which parks a missing context on a
//!    miss helper thread and runs another context meanwhile.
//! 3. **Engine Plumbing:** The `CoreEngine` trait, the `Scheduler` handles every
//!    engine is built from, the observable `CoreStatus` and the final `CoreReport`.

/// The blocking engine.
pub mod blocking;

/// Hardware contexts.
pub mod context;

/// Scheduling event log.
pub mod events;

/// Instruction execution shared by engines and helpers.
pub mod execute;

/// The miss helper of the latency-hiding engine.
pub mod helper;

/// The latency-hiding engine.
pub mod hiding;

/// Ready queue and retirement list.
pub mod queue;

/// Caches and coherence.
pub mod units;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

pub use self::blocking::BlockingCore;
pub use self::context::Context;
pub use self::events::{EventLog, SchedEvent};
pub use self::hiding::{ContextChange, HidingCore};
pub use self::queue::{ContextQueue, FinishedContexts};

use crate::common::data::CoreId;
use crate::common::error::SimError;
use crate::sim::clock::ClockCoordinator;
use crate::stats::CoreStats;

/// A simulated core that runs on its own thread until no work is left.
pub trait CoreEngine: Send {
    /// The core this engine simulates.
    fn core(&self) -> CoreId;

    /// Runs the engine to termination.
    ///
    /// # Returns
    ///
    /// The engine's counters and scheduling log, or the fault that stopped it.
    /// On a fault the clock has been aborted.
    fn run(self) -> Result<CoreReport, SimError>;
}

/// Outcome of one fetch/execute iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The iteration ran to its final tick.
    Completed,
    /// A context change abandoned the iteration.
    Interrupted,
}

/// What an engine hands back when it terminates.
#[derive(Clone, Debug)]
pub struct CoreReport {
    /// The reporting core.
    pub core: CoreId,
    /// Counters of the core and of the helpers it launched.
    pub stats: CoreStats,
    /// Scheduling events in the order they happened.
    pub events: Vec<SchedEvent>,
}

/// Shared handles every engine is constructed from.
#[derive(Clone, Debug)]
pub struct Scheduler {
    /// The global clock.
    pub clock: Arc<ClockCoordinator>,
    /// Runnable contexts.
    pub queue: Arc<ContextQueue>,
    /// Retired contexts.
    pub finished: Arc<FinishedContexts>,
    /// Instructions a context may execute before it must yield.
    pub max_quantum: u32,
}

impl Scheduler {
    /// Bundles the scheduling handles of a run.
    pub fn new(queue: ContextQueue, max_quantum: u32) -> Self {
        Self {
            clock: ClockCoordinator::new(),
            queue: Arc::new(queue),
            finished: Arc::new(FinishedContexts::new()),
            max_quantum,
        }
    }
}

const NO_CONTEXT: usize = usize::MAX;

/// Externally observable state of a running engine.
#[derive(Debug)]
pub struct CoreStatus {
    running: AtomicUsize,
    finished: AtomicBool,
}

impl Default for CoreStatus {
    fn default() -> Self {
        Self {
            running: AtomicUsize::new(NO_CONTEXT),
            finished: AtomicBool::new(false),
        }
    }
}

impl CoreStatus {
    /// Id of the context installed on the core, if any.
    pub fn running(&self) -> Option<usize> {
        match self.running.load(Ordering::Acquire) {
            NO_CONTEXT => None,
            id => Some(id),
        }
    }

    /// Returns `true` once the engine terminated.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, context: Option<usize>) {
        self.running
            .store(context.unwrap_or(NO_CONTEXT), Ordering::Release);
    }

    pub(crate) fn set_finished(&self) {
        self.set_running(None);
        self.finished.store(true, Ordering::Release);
    }
}

/// Logs a fatal fault of `core` and tears the clock down.
///
/// `Aborted` is the echo of another party's fault and is not logged again.
pub(crate) fn abort_on_fault(clock: &ClockCoordinator, core: CoreId, who: &str, err: &SimError) {
    if matches!(err, SimError::Aborted) {
        debug!(core = %core, who, "unwinding after abort");
    } else {
        warn!(core = %core, who, %err, "fatal fault, aborting simulation");
    }
    clock.abort();
}

/// Merges the outcomes of two parties that stopped together.
///
/// The fault that caused an abort wins over the `SimError::Aborted` it raised
/// in the other party.
pub(crate) fn root_cause(
    first: Result<(), SimError>,
    second: Result<(), SimError>,
) -> Result<(), SimError> {
    match (first, second) {
        (Err(SimError::Aborted) | Ok(()), Err(err)) | (Err(err), _) => Err(err),
        (Ok(()), Ok(())) => Ok(()),
    }
}
