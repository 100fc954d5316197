//! Miss helper of the latency-hiding engine.
//!
//! A helper is a short-lived thread that owns one context and resolves the
//! single miss that context took, while the engine runs another context. It is
//! a party of the clock for exactly as long as it runs: the engine registers it
//! before starting the thread and it deregisters after parking its context.
//!
//! The helper runs the same coherence transactions as the engines. Cycles it
//! ticks are charged to its own context. When the transaction commits, the
//! instruction that missed is complete: a loaded word is already in the
//! context's registers and its pc points past the instruction. A context that
//! missed on a fetch keeps its pc and carries the fetched instruction, which
//! it executes on resumption whatever the line holds by then.

use std::sync::Arc;

use tracing::debug;

use super::context::Context;
use super::events::{EventLog, SchedEvent};
use super::hiding::{ContextChange, HidingShared};
use super::units::cache::coherence::{DataPort, InstructionPort};
use super::abort_on_fault;
use crate::common::addr::{DataAddr, InstructionAddr};
use crate::common::data::{AccessType, CoreId, Word};
use crate::common::error::{Halt, SimError};
use crate::common::reg::Reg;
use crate::sim::clock::{Clock, Registration};
use crate::stats::CoreStats;

/// The access a helper resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Miss {
    /// Instruction fetch at the context's pc.
    Fetch(InstructionAddr),
    /// `LW` into `rt`.
    Load { rt: Reg, addr: DataAddr },
    /// `SW` to a line that does not hold the block.
    Store { addr: DataAddr, value: Word },
    /// `SW` to a `Shared` line.
    Upgrade { addr: DataAddr, value: Word },
}

impl Miss {
    pub(crate) const fn access(&self) -> AccessType {
        match self {
            Self::Fetch(_) => AccessType::Fetch,
            Self::Load { .. } => AccessType::Load,
            Self::Store { .. } => AccessType::Store,
            Self::Upgrade { .. } => AccessType::Upgrade,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MissHelper {
    core: CoreId,
    context: Context,
    miss: Miss,
    data: DataPort,
    instructions: InstructionPort,
    shared: Arc<HidingShared>,
    registration: Registration,
    events: EventLog,
    stats: CoreStats,
}

impl MissHelper {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        core: CoreId,
        context: Context,
        miss: Miss,
        data: DataPort,
        instructions: InstructionPort,
        shared: Arc<HidingShared>,
        registration: Registration,
        events: EventLog,
    ) -> Self {
        Self {
            core,
            context,
            miss,
            data,
            instructions,
            shared,
            registration,
            events,
            stats: CoreStats::default(),
        }
    }

    /// Resolves the miss, then parks the context and leaves the clock.
    ///
    /// # Returns
    ///
    /// The helper's counters; on a fault the clock is aborted first.
    pub(crate) fn run(mut self) -> Result<CoreStats, SimError> {
        match self.resolve() {
            Ok(()) | Err(Halt::Interrupted) => Ok(self.park()),
            Err(Halt::Fault(err)) => {
                abort_on_fault(self.registration.coordinator(), self.core, "helper", &err);
                Err(err)
            }
        }
    }

    fn resolve(&mut self) -> Result<(), Halt> {
        let shared = Arc::clone(&self.shared);
        match self.miss {
            Miss::Fetch(addr) => {
                let port = self.instructions.clone();
                // Unlike data, the reservation names no context. The context
                // fetching here is held by this helper until it parks, so the
                // engine never fetches the line on its behalf meanwhile.
                let _reserved = shared
                    .reservations
                    .reserve_instruction(port.cache().index_for(addr.block()));
                let fetched = port.fetch(self, addr)?;
                self.context.fetched = Some(fetched.value);
            }
            Miss::Load { rt, addr } => {
                let port = self.data.clone();
                let _reserved = shared
                    .reservations
                    .reserve_data(port.cache().index_for(addr.block()), self.context.id);
                let access = port.read(self, addr)?;
                self.context.registers.write(rt, access.value);
                self.commit();
            }
            Miss::Store { addr, value } | Miss::Upgrade { addr, value } => {
                let port = self.data.clone();
                let _reserved = shared
                    .reservations
                    .reserve_data(port.cache().index_for(addr.block()), self.context.id);
                let _ = port.write(self, addr, value)?;
                self.commit();
            }
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.context.quantum += 1;
        self.stats.instructions_retired += 1;
    }

    /// Parks the context as the waiting context and deregisters.
    fn park(self) -> CoreStats {
        let Self {
            core,
            context,
            shared,
            registration,
            events,
            stats,
            ..
        } = self;
        let id = context.id;
        let senior = context.senior;
        let cycle = registration.coordinator().cycle();
        {
            let mut slots = shared.slots.lock();
            debug_assert!(slots.waiting.is_none(), "waiting slot already occupied");
            slots.waiting = Some(context);
            let swap_requested = senior
                && !slots.current_retiring
                && !slots.awaiting_reservation
                && slots.pending == ContextChange::None;
            if swap_requested {
                slots.pending = ContextChange::SwapCurrentAndWaiting;
            }
            slots.helper_active = false;
            events.record(SchedEvent::HelperParked {
                cycle,
                context: id,
                swap_requested,
            });
            debug!(core = %core, context = id, swap_requested, cycle, "helper parked context");
        }
        registration.deregister();
        stats
    }
}

impl Clock for MissHelper {
    fn tick(&mut self) -> Result<(), Halt> {
        self.registration.arrive()?;
        self.context.cycles += 1;
        self.registration.arrive()?;
        Ok(())
    }

    fn stall(&mut self) -> Result<(), SimError> {
        self.registration.arrive()?;
        self.registration.arrive()
    }
}
