//! The latency-hiding engine.
//!
//! Core 0 keeps up to two contexts in flight. When the running context misses,
//! the engine hands it to a `MissHelper` thread that performs the coherence
//! transaction, and installs another context meanwhile: the parked waiting
//! context if there is one, otherwise the next context of the ready queue.
//! A helper that finishes parks its context as the waiting context and, if the
//! context is senior, asks for it to be swapped back in.
//!
//! Context changes are only requested between ticks and only applied at the
//! midpoint of the engine's own tick, where the requested change is consumed
//! exactly once. An applied change abandons the running iteration through
//! `Halt::Interrupted`.
//!
//! The engine and its helper coordinate through `HidingShared`:
//! 1. **Slots:** The waiting context, the pending change and the scheduling
//!    flags, under one mutex.
//! 2. **Reservations:** The line a helper is resolving, which the engine must
//!    not touch on behalf of another context until the helper releases it.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::context::Context;
use super::events::{EventLog, SchedEvent};
use super::execute::{execute, fetch_address, Effect};
use super::helper::{Miss, MissHelper};
use super::units::cache::coherence::{DataPort, InstructionPort};
use super::units::cache::{DataLine, LineState};
use super::{
    abort_on_fault, root_cause, CoreEngine, CoreReport, CoreStatus, Scheduler, StepOutcome,
};
use crate::common::addr::{DataAddr, InstructionAddr};
use crate::common::data::{CoreId, Word};
use crate::common::error::{Halt, SimError};
use crate::common::reg::Reg;
use crate::common::sync::Held;
use crate::isa::instruction::Instruction;
use crate::sim::clock::{Clock, Registration};
use crate::soc::System;
use crate::stats::CoreStats;

/// Context change requested for the next midpoint of the engine's clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextChange {
    /// Nothing pending.
    #[default]
    None,
    /// Exchange the running and the waiting context. Requested by a helper.
    SwapCurrentAndWaiting,
    /// Install the waiting context on an empty core.
    BringWaitingIn,
    /// Install the context popped from the ready queue on an empty core.
    InstallNextFromQueue,
}

impl fmt::Display for ContextChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::SwapCurrentAndWaiting => "swap",
            Self::BringWaitingIn => "bring-waiting",
            Self::InstallNextFromQueue => "next-from-queue",
        };
        f.write_str(name)
    }
}

/// Scheduling state shared by the engine and its helper.
#[derive(Debug, Default)]
pub(crate) struct Slots {
    /// Context parked by a finished helper.
    pub(crate) waiting: Option<Context>,
    /// Change for the next midpoint.
    pub(crate) pending: ContextChange,
    /// A helper thread is resolving a miss.
    pub(crate) helper_active: bool,
    /// The running context executed `FIN` or used up its quantum.
    pub(crate) current_retiring: bool,
    /// The engine missed while the helper was busy and is retrying.
    pub(crate) awaiting_reservation: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DataReservation {
    line: usize,
    context: usize,
}

#[derive(Debug, Default)]
struct Reserved {
    data: Option<DataReservation>,
    instruction: Option<usize>,
}

/// Lines a helper is resolving a miss on.
#[derive(Debug, Default)]
pub(crate) struct Reservations(Mutex<Reserved>);

#[derive(Clone, Copy, Debug)]
enum ReservationKind {
    Data,
    Instruction,
}

/// Active reservation; released on drop.
#[derive(Debug)]
pub(crate) struct Reservation<'a> {
    owner: &'a Reservations,
    kind: ReservationKind,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reserved = self.owner.0.lock();
        match self.kind {
            ReservationKind::Data => reserved.data = None,
            ReservationKind::Instruction => reserved.instruction = None,
        }
    }
}

impl Reservations {
    /// Reserves data line `line` for `context`.
    pub(crate) fn reserve_data(&self, line: usize, context: usize) -> Reservation<'_> {
        self.0.lock().data = Some(DataReservation { line, context });
        Reservation {
            owner: self,
            kind: ReservationKind::Data,
        }
    }

    /// Reserves instruction line `line`.
    pub(crate) fn reserve_instruction(&self, line: usize) -> Reservation<'_> {
        self.0.lock().instruction = Some(line);
        Reservation {
            owner: self,
            kind: ReservationKind::Instruction,
        }
    }

    /// Returns `true` if data line `line` is reserved for a context other than `context`.
    pub(crate) fn blocks_data(&self, line: usize, context: Option<usize>) -> bool {
        matches!(self.0.lock().data, Some(r) if r.line == line && Some(r.context) != context)
    }

    /// Returns `true` if instruction line `line` is reserved.
    pub(crate) fn blocks_instruction(&self, line: usize) -> bool {
        self.0.lock().instruction == Some(line)
    }
}

/// State shared by the latency-hiding engine and its helper.
#[derive(Debug, Default)]
pub(crate) struct HidingShared {
    pub(crate) slots: Mutex<Slots>,
    pub(crate) reservations: Reservations,
}

/// How a miss proceeds after routing.
enum Route {
    /// A helper is busy; the access is retried.
    Retry,
    /// Nothing else can run; the engine resolves the miss itself.
    Inline,
}

enum Decision {
    HandOff,
    Retry,
    Queue,
}

/// Engine of the latency-hiding core.
#[derive(Debug)]
pub struct HidingCore {
    id: CoreId,
    registration: Registration,
    data: DataPort,
    instructions: InstructionPort,
    scheduler: Scheduler,
    shared: Arc<HidingShared>,
    status: Arc<CoreStatus>,
    events: EventLog,
    current: Option<Context>,
    next: Option<Context>,
    /// Instruction of the running iteration, until it commits.
    in_flight: Option<Instruction>,
    instruction_finished: bool,
    terminated: bool,
    helper: Option<JoinHandle<Result<CoreStats, SimError>>>,
    stats: CoreStats,
}

impl HidingCore {
    /// Builds the engine and registers it with the clock.
    ///
    /// # Arguments
    ///
    /// * `system` - Memory system the core's ports are taken from.
    /// * `scheduler` - Clock, queue and retirement list of the run.
    /// * `current` - First context to run; when `None` the engine pulls one from
    ///   the queue on start.
    pub fn new(system: &System, scheduler: &Scheduler, current: Option<Context>) -> Self {
        let id = CoreId::HIDING;
        Self {
            id,
            registration: scheduler.clock.register(),
            data: system.data_port(id),
            instructions: system.instruction_port(id),
            scheduler: scheduler.clone(),
            shared: Arc::new(HidingShared::default()),
            status: Arc::new(CoreStatus::default()),
            events: EventLog::new(),
            current,
            next: None,
            in_flight: None,
            instruction_finished: true,
            terminated: false,
            helper: None,
            stats: CoreStats::default(),
        }
    }

    /// Observable state of this engine.
    pub fn status(&self) -> Arc<CoreStatus> {
        Arc::clone(&self.status)
    }

    /// Runs one fetch/execute iteration.
    ///
    /// After an interruption the quantum of the newly installed context is
    /// checked before the next iteration starts.
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        match self.cycle() {
            Ok(()) => Ok(StepOutcome::Completed),
            Err(Halt::Interrupted) => {
                let max = self.scheduler.max_quantum;
                if self.current.as_ref().is_some_and(|ctx| ctx.quantum_expired(max)) {
                    self.expire_quantum()?;
                }
                Ok(StepOutcome::Interrupted)
            }
            Err(Halt::Fault(err)) => Err(err),
        }
    }

    fn cycle(&mut self) -> Result<(), Halt> {
        let Some(ctx) = self.current.as_mut() else {
            return self.tick();
        };
        let addr = fetch_address(ctx)?;
        let inst = match ctx.fetched.take() {
            Some(inst) => inst,
            None => self.fetch(addr)?,
        };

        let Some(ctx) = self.current.as_mut() else {
            return self.tick();
        };
        ctx.advance_pc();
        self.in_flight = Some(inst);
        self.instruction_finished = false;
        let effect = execute(ctx, inst)?;
        match effect {
            Effect::Load { rt, addr } => self.load(rt, addr)?,
            Effect::Store { addr, value } => self.store(addr, value)?,
            Effect::Done | Effect::Finish => {}
        }
        self.instruction_finished = true;
        self.in_flight = None;
        self.stats.instructions_retired += 1;

        let max = self.scheduler.max_quantum;
        let expired = self.current.as_mut().is_some_and(|ctx| {
            ctx.quantum += 1;
            ctx.quantum_expired(max)
        });
        if effect == Effect::Finish {
            self.finish_context()?;
        } else if expired {
            self.expire_quantum()?;
        }
        self.tick()
    }

    fn fetch(&mut self, addr: InstructionAddr) -> Result<Instruction, Halt> {
        let port = self.instructions.clone();
        let line_index = port.cache().index_for(addr.block());
        let mut missed = false;
        loop {
            if self.shared.reservations.blocks_instruction(line_index) {
                self.tick()?;
                continue;
            }
            let Some(line) = port.line(addr).try_acquire()? else {
                self.tick()?;
                continue;
            };
            if line.tag == Some(addr.block()) {
                if !missed {
                    self.stats.icache_hits += 1;
                }
                return Ok(line.block.instruction(addr.offset()));
            }
            drop(line);
            if !missed {
                missed = true;
                self.stats.icache_misses += 1;
                trace!(core = %self.id, pc = addr.val(), "instruction miss");
            }
            match self.route_miss(Miss::Fetch(addr))? {
                Route::Retry => {}
                Route::Inline => {
                    let fetched = port.fetch(self, addr)?;
                    self.tick()?;
                    return Ok(fetched.value);
                }
            }
        }
    }

    fn load(&mut self, rt: Reg, addr: DataAddr) -> Result<(), Halt> {
        let port = self.data.clone();
        let mut missed = false;
        loop {
            let line = self.lock_data_line(&port, addr)?;
            if line.holds(addr.block()) {
                let value = line.block.word(addr.offset());
                drop(line);
                if !missed {
                    self.stats.dcache_hits += 1;
                }
                self.write_register(rt, value);
                return Ok(());
            }
            drop(line);
            if !missed {
                missed = true;
                self.stats.dcache_misses += 1;
                trace!(core = %self.id, addr = addr.val(), "load miss");
            }
            match self.route_miss(Miss::Load { rt, addr })? {
                Route::Retry => {}
                Route::Inline => {
                    let access = port.read(self, addr)?;
                    self.write_register(rt, access.value);
                    return self.tick();
                }
            }
        }
    }

    fn store(&mut self, addr: DataAddr, value: Word) -> Result<(), Halt> {
        let port = self.data.clone();
        let mut missed = false;
        loop {
            let mut line = self.lock_data_line(&port, addr)?;
            let holds = line.holds(addr.block());
            if holds && line.state == LineState::Modified {
                line.block.set_word(addr.offset(), value);
                drop(line);
                if !missed {
                    self.stats.dcache_hits += 1;
                }
                return Ok(());
            }
            drop(line);
            if !missed {
                missed = true;
                self.stats.dcache_misses += 1;
                trace!(core = %self.id, addr = addr.val(), upgrade = holds, "store miss");
            }
            let miss = if holds {
                Miss::Upgrade { addr, value }
            } else {
                Miss::Store { addr, value }
            };
            match self.route_miss(miss)? {
                Route::Retry => {}
                Route::Inline => {
                    let _ = port.write(self, addr, value)?;
                    return self.tick();
                }
            }
        }
    }

    /// Locks the local line for `addr`, first waiting out a helper reservation
    /// held for another context.
    fn lock_data_line<'p>(
        &mut self,
        port: &'p DataPort,
        addr: DataAddr,
    ) -> Result<Held<'p, DataLine>, Halt> {
        let line_index = port.cache().index_for(addr.block());
        loop {
            let context = self.current.as_ref().map(|ctx| ctx.id);
            if self.shared.reservations.blocks_data(line_index, context) {
                self.tick()?;
                continue;
            }
            if let Some(line) = port.line(addr).try_acquire()? {
                return Ok(line);
            }
            self.tick()?;
        }
    }

    fn write_register(&mut self, rt: Reg, value: Word) {
        if let Some(ctx) = self.current.as_mut() {
            ctx.registers.write(rt, value);
        }
    }

    /// Decides who resolves a miss of the running context.
    ///
    /// Every path ends with one tick, except `Route::Inline`, whose caller
    /// ticks after resolving. A hand-off always returns `Halt::Interrupted`.
    fn route_miss(&mut self, miss: Miss) -> Result<Route, Halt> {
        if self.current.is_none() {
            return Err(Halt::Interrupted);
        }
        let decision = {
            let mut slots = self.shared.slots.lock();
            if slots.waiting.is_some() && !slots.helper_active {
                slots.helper_active = true;
                slots.pending = ContextChange::BringWaitingIn;
                Decision::HandOff
            } else if slots.helper_active {
                slots.awaiting_reservation = true;
                Decision::Retry
            } else {
                Decision::Queue
            }
        };
        match decision {
            Decision::Retry => {
                self.tick()?;
                Ok(Route::Retry)
            }
            Decision::HandOff => {
                self.launch_helper(miss)?;
                self.tick()?;
                Err(Halt::Interrupted)
            }
            Decision::Queue => {
                let queue = Arc::clone(&self.scheduler.queue);
                let mut guard = queue.acquire(self)?;
                let Some(next) = guard.pop_next() else {
                    return Ok(Route::Inline);
                };
                drop(guard);
                self.next = Some(next);
                {
                    let mut slots = self.shared.slots.lock();
                    slots.helper_active = true;
                    slots.pending = ContextChange::InstallNextFromQueue;
                }
                self.launch_helper(miss)?;
                self.tick()?;
                Err(Halt::Interrupted)
            }
        }
    }

    /// Moves the running context to a new helper thread.
    ///
    /// The helper is registered with the clock here, before its thread starts,
    /// so it is a party of the current cycle.
    fn launch_helper(&mut self, miss: Miss) -> Result<(), SimError> {
        self.join_helper()?;
        let Some(context) = self.current.take() else {
            return Ok(());
        };
        let cycle = self.scheduler.clock.cycle();
        debug!(core = %self.id, context = context.id, access = %miss.access(), cycle, "helper launched");
        self.events.record(SchedEvent::HelperLaunched {
            cycle,
            context: context.id,
            access: miss.access(),
        });
        self.stats.helper_launches += 1;
        let helper = MissHelper::new(
            self.id,
            context,
            miss,
            self.data.clone(),
            self.instructions.clone(),
            Arc::clone(&self.shared),
            self.scheduler.clock.register(),
            self.events.clone(),
        );
        let name = format!("core{}-helper", self.id);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || helper.run())
            .map_err(|source| SimError::ThreadSpawn { name, source })?;
        self.helper = Some(handle);
        Ok(())
    }

    /// Waits for the last helper to exit and merges its counters.
    fn join_helper(&mut self) -> Result<(), SimError> {
        let Some(handle) = self.helper.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Ok(stats)) => {
                self.stats.merge(&stats);
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SimError::ThreadPanicked(format!("core{}-helper", self.id))),
        }
    }

    /// Handles `FIN` of the running context.
    fn finish_context(&mut self) -> Result<(), SimError> {
        let waiting = {
            let mut slots = self.shared.slots.lock();
            slots.current_retiring = true;
            bring_waiting_in(&mut slots)
        };
        self.retire();
        if waiting {
            return Ok(());
        }

        let queue = Arc::clone(&self.scheduler.queue);
        let mut guard = queue.acquire(self)?;
        if let Some(next) = guard.pop_next() {
            self.next = Some(next);
            self.shared.slots.lock().pending = ContextChange::InstallNextFromQueue;
            return Ok(());
        }
        drop(guard);

        loop {
            {
                let mut slots = self.shared.slots.lock();
                if bring_waiting_in(&mut slots) {
                    return Ok(());
                }
                if !slots.helper_active {
                    self.terminated = true;
                    return Ok(());
                }
            }
            self.stall()?;
        }
    }

    fn retire(&mut self) {
        let Some(mut ctx) = self.current.take() else {
            return;
        };
        ctx.retired_by = Some(self.id);
        debug!(core = %self.id, context = ctx.id, cycles = ctx.cycles, "context retired");
        self.events.record(SchedEvent::Retired {
            cycle: self.scheduler.clock.cycle(),
            context: ctx.id,
        });
        self.stats.contexts_retired += 1;
        self.scheduler.finished.push(ctx);
    }

    /// Handles quantum expiry of the running context.
    ///
    /// With a waiting context the running one goes to the back of the queue
    /// and the waiting one comes in; otherwise the core rotates through the
    /// queue like the blocking engine.
    fn expire_quantum(&mut self) -> Result<(), SimError> {
        let has_waiting = {
            let mut slots = self.shared.slots.lock();
            slots.current_retiring = true;
            slots.waiting.is_some()
        };
        let queue = Arc::clone(&self.scheduler.queue);
        let mut guard = queue.acquire(self)?;
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };
        current.quantum = 0;
        self.events.record(SchedEvent::QuantumExpired {
            cycle: self.scheduler.clock.cycle(),
            context: current.id,
        });

        if has_waiting {
            current.senior = false;
            guard.push(current);
            drop(guard);
            let _ = bring_waiting_in(&mut self.shared.slots.lock());
            return Ok(());
        }
        match guard.pop_next() {
            Some(mut next) => {
                current.senior = false;
                next.senior = true;
                guard.push(current);
                self.next = Some(next);
                self.shared.slots.lock().pending = ContextChange::InstallNextFromQueue;
            }
            None => {
                self.current = Some(current);
                self.shared.slots.lock().current_retiring = false;
            }
        }
        Ok(())
    }

    /// Applies the pending change, if any; called at the midpoint of a tick.
    ///
    /// # Returns
    ///
    /// `true` if a context was installed.
    fn apply_pending_change(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let mut slots = shared.slots.lock();
        let change = std::mem::take(&mut slots.pending);
        let from = self.current.as_ref().map(|ctx| ctx.id);
        match change {
            ContextChange::None => return false,
            ContextChange::SwapCurrentAndWaiting => {
                if slots.current_retiring {
                    trace!(core = %self.id, "swap dropped, current context retiring");
                    return false;
                }
                let Some(incoming) = slots.waiting.take() else {
                    return false;
                };
                let mut outgoing = self.current.replace(incoming);
                if let (Some(out), Some(inst)) = (outgoing.as_mut(), self.in_flight.take()) {
                    if !self.instruction_finished {
                        out.rewind_to(inst);
                    }
                }
                slots.waiting = outgoing;
            }
            ContextChange::BringWaitingIn => {
                let Some(incoming) = slots.waiting.take() else {
                    return false;
                };
                self.install(&mut slots, incoming);
            }
            ContextChange::InstallNextFromQueue => {
                let Some(incoming) = self.next.take() else {
                    return false;
                };
                self.install(&mut slots, incoming);
            }
        }
        slots.current_retiring = false;
        slots.awaiting_reservation = false;
        drop(slots);

        self.instruction_finished = true;
        self.in_flight = None;
        self.stats.context_switches += 1;
        let to = self.current.as_ref().map_or(0, |ctx| ctx.id);
        let cycle = self.scheduler.clock.cycle();
        debug!(core = %self.id, %change, ?from, to, cycle, "context change");
        self.events.record(SchedEvent::Switched {
            cycle,
            change,
            from,
            to,
        });
        self.status.set_running(Some(to));
        true
    }

    fn install(&mut self, slots: &mut Slots, incoming: Context) {
        debug_assert!(self.current.is_none(), "context installed over a running one");
        if let Some(outgoing) = self.current.replace(incoming) {
            slots.waiting = Some(outgoing);
        }
    }

    fn drive(&mut self) -> Result<(), SimError> {
        if self.current.is_none() {
            let queue = Arc::clone(&self.scheduler.queue);
            self.current = queue.acquire(self)?.pop_next();
            self.terminated = self.current.is_none();
        }
        self.status.set_running(self.current.as_ref().map(|ctx| ctx.id));
        while !self.terminated {
            let _ = self.step()?;
        }
        debug!(core = %self.id, cycles = self.stats.cycles, "core terminated");
        Ok(())
    }

    fn report(mut self) -> CoreReport {
        self.stats.write_backs = self.data.cache().write_backs();
        self.stats.invalidations = self.data.cache().invalidations();
        CoreReport {
            core: self.id,
            stats: self.stats,
            events: self.events.snapshot(),
        }
    }
}

/// Requests the waiting context, which becomes senior, if one is parked.
fn bring_waiting_in(slots: &mut Slots) -> bool {
    let Some(waiting) = slots.waiting.as_mut() else {
        return false;
    };
    waiting.senior = true;
    slots.pending = ContextChange::BringWaitingIn;
    true
}

impl Clock for HidingCore {
    fn tick(&mut self) -> Result<(), Halt> {
        self.registration.arrive()?;
        self.stats.cycles += 1;
        if let Some(ctx) = self.current.as_mut() {
            ctx.cycles += 1;
        }
        let changed = self.apply_pending_change();
        self.registration.arrive()?;
        if changed {
            return Err(Halt::Interrupted);
        }
        Ok(())
    }

    fn stall(&mut self) -> Result<(), SimError> {
        self.registration.arrive()?;
        self.stats.cycles += 1;
        self.stats.stall_cycles += 1;
        self.registration.arrive()
    }
}

impl CoreEngine for HidingCore {
    fn core(&self) -> CoreId {
        self.id
    }

    fn run(mut self) -> Result<CoreReport, SimError> {
        let result = self.drive();
        if let Err(err) = &result {
            abort_on_fault(&self.scheduler.clock, self.id, "core", err);
        }
        let joined = self.join_helper();
        self.status.set_finished();
        root_cause(result, joined)?;
        Ok(self.report())
    }
}
