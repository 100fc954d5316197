//! Lock-step clock coordination.
//!
//! This module implements the global clock of the simulated machine. It provides:
//! 1. **Rendezvous Barrier:** `ClockCoordinator`, a barrier whose party count changes
//!    while parties are waiting on it.
//! 2. **Membership:** `Registration`, an RAII handle that leaves the barrier on drop.
//! 3. **Time Source Abstraction:** The `Clock` trait implemented by every party that
//!    consumes simulated time (core engines, the miss helper).
//!
//! One simulated cycle is two barrier phases. Between the first and the second
//! arrival of a cycle a party may perform zero-time mutations (installing a new
//! context) that every other party observes from the next cycle on.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::common::error::{Halt, SimError};

/// Number of barrier phases per simulated cycle.
pub const PHASES_PER_CYCLE: u64 = 2;

#[derive(Debug, Default)]
struct Phase {
    parties: usize,
    arrived: usize,
    generation: u64,
    aborted: bool,
}

impl Phase {
    fn advance(&mut self) {
        self.arrived = 0;
        self.generation += 1;
    }
}

/// Dynamic-membership rendezvous barrier driving simulated time.
pub struct ClockCoordinator {
    phase: Mutex<Phase>,
    advanced: Condvar,
}

impl fmt::Debug for ClockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = self.phase.lock();
        f.debug_struct("ClockCoordinator")
            .field("parties", &phase.parties)
            .field("arrived", &phase.arrived)
            .field("generation", &phase.generation)
            .field("aborted", &phase.aborted)
            .finish()
    }
}

impl ClockCoordinator {
    /// Creates a coordinator with no registered parties.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(Phase::default()),
            advanced: Condvar::new(),
        })
    }

    /// Adds one party that has not yet arrived in the current phase.
    ///
    /// A party registered by another party between its own cycles starts in
    /// step with it: the current phase cannot complete until the registering
    /// party arrives, and the registered party arrives first in the same phase.
    pub fn register(self: &Arc<Self>) -> Registration {
        self.phase.lock().parties += 1;
        Registration {
            clock: Arc::clone(self),
        }
    }

    /// Number of currently registered parties.
    pub fn parties(&self) -> usize {
        self.phase.lock().parties
    }

    /// Current simulated cycle.
    ///
    /// The count advances when the first phase of a cycle completes, so the
    /// zero-time work between the two arrivals is stamped with the cycle it
    /// belongs to. Once both phases complete it equals the number of elapsed
    /// cycles.
    pub fn cycle(&self) -> u64 {
        (self.phase.lock().generation + 1) / PHASES_PER_CYCLE
    }

    /// Tears the barrier down: every blocked and future arrival fails with
    /// `SimError::Aborted`.
    pub fn abort(&self) {
        self.phase.lock().aborted = true;
        let _ = self.advanced.notify_all();
    }

    /// Returns `true` once `abort` was called.
    pub fn is_aborted(&self) -> bool {
        self.phase.lock().aborted
    }

    fn arrive(&self) -> Result<(), SimError> {
        let mut phase = self.phase.lock();
        if phase.aborted {
            return Err(SimError::Aborted);
        }
        phase.arrived += 1;
        if phase.arrived >= phase.parties {
            phase.advance();
            let _ = self.advanced.notify_all();
            return Ok(());
        }
        let generation = phase.generation;
        while phase.generation == generation && !phase.aborted {
            self.advanced.wait(&mut phase);
        }
        if phase.generation == generation {
            return Err(SimError::Aborted);
        }
        Ok(())
    }

    fn deregister(&self) {
        let mut phase = self.phase.lock();
        phase.parties = phase.parties.saturating_sub(1);
        if phase.parties > 0 && phase.arrived >= phase.parties {
            phase.advance();
            let _ = self.advanced.notify_all();
        }
    }
}

/// Membership of one party in a `ClockCoordinator`.
///
/// Dropping the registration arrives and deregisters, so a party that
/// returns early (or panics) never leaves the others waiting for it.
pub struct Registration {
    clock: Arc<ClockCoordinator>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").finish_non_exhaustive()
    }
}

impl Registration {
    /// Arrives at the barrier and waits for every other registered party.
    pub fn arrive(&self) -> Result<(), SimError> {
        self.clock.arrive()
    }

    /// The coordinator this party belongs to.
    pub const fn coordinator(&self) -> &Arc<ClockCoordinator> {
        &self.clock
    }

    /// Leaves the barrier.
    pub fn deregister(self) {
        drop(self);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.clock.deregister();
    }
}

/// A consumer of simulated time.
///
/// Coherence transactions are generic over `Clock` so that the core engines
/// and the miss helper share them while accounting time to different
/// contexts.
pub trait Clock {
    /// Advances one simulated cycle.
    ///
    /// # Returns
    ///
    /// `Err(Halt::Interrupted)` if a context change was applied at the cycle
    /// midpoint and the running instruction must be abandoned.
    fn tick(&mut self) -> Result<(), Halt>;

    /// Advances one simulated cycle without charging it to the running
    /// context and without applying a pending context change.
    fn stall(&mut self) -> Result<(), SimError>;

    /// Advances `cycles` simulated cycles.
    fn ticks(&mut self, cycles: u32) -> Result<(), Halt> {
        for _ in 0..cycles {
            self.tick()?;
        }
        Ok(())
    }
}
