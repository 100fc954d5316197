//! The blocking engine.
//!
//! Core 1 runs one context at a time and resolves every cache miss inline: the
//! context waits through the whole coherence transaction. It yields its core
//! only when it executes `FIN` or uses up its quantum while another context is
//! queued.

use std::sync::Arc;

use tracing::debug;

use super::context::Context;
use super::events::{EventLog, SchedEvent};
use super::execute::{execute, fetch_address, Effect};
use super::hiding::ContextChange;
use super::units::cache::coherence::{DataPort, InstructionPort};
use super::{abort_on_fault, CoreEngine, CoreReport, CoreStatus, Scheduler, StepOutcome};
use crate::common::addr::InstructionAddr;
use crate::common::data::CoreId;
use crate::common::error::{Halt, SimError};
use crate::isa::instruction::Instruction;
use crate::sim::clock::{Clock, Registration};
use crate::soc::System;
use crate::stats::CoreStats;

/// Engine of the blocking core.
#[derive(Debug)]
pub struct BlockingCore {
    id: CoreId,
    registration: Registration,
    data: DataPort,
    instructions: InstructionPort,
    scheduler: Scheduler,
    status: Arc<CoreStatus>,
    events: EventLog,
    current: Option<Context>,
    next: Option<Context>,
    stats: CoreStats,
}

impl BlockingCore {
    /// Builds the engine and registers it with the clock.
    ///
    /// # Arguments
    ///
    /// * `system` - Memory system the core's ports are taken from.
    /// * `scheduler` - Clock, queue and retirement list of the run.
    /// * `current` - First context to run; when `None` the engine pulls one from
    ///   the queue on start.
    pub fn new(system: &System, scheduler: &Scheduler, current: Option<Context>) -> Self {
        let id = CoreId::BLOCKING;
        Self {
            id,
            registration: scheduler.clock.register(),
            data: system.data_port(id),
            instructions: system.instruction_port(id),
            scheduler: scheduler.clone(),
            status: Arc::new(CoreStatus::default()),
            events: EventLog::new(),
            current,
            next: None,
            stats: CoreStats::default(),
        }
    }

    /// Observable state of this engine.
    pub fn status(&self) -> Arc<CoreStatus> {
        Arc::clone(&self.status)
    }

    /// Runs one fetch/execute iteration.
    ///
    /// The blocking engine is never interrupted, so a successful step is
    /// always `StepOutcome::Completed`.
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        match self.cycle() {
            Ok(()) => Ok(StepOutcome::Completed),
            Err(Halt::Interrupted) => Ok(StepOutcome::Interrupted),
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
        let effect = execute(ctx, inst)?;
        match effect {
            Effect::Load { rt, addr } => {
                let port = self.data.clone();
                let access = port.read(self, addr)?;
                self.count_data(access.hit);
                if let Some(ctx) = self.current.as_mut() {
                    ctx.registers.write(rt, access.value);
                }
            }
            Effect::Store { addr, value } => {
                let port = self.data.clone();
                let access = port.write(self, addr, value)?;
                self.count_data(access.hit);
            }
            Effect::Done | Effect::Finish => {}
        }
        self.stats.instructions_retired += 1;

        let max = self.scheduler.max_quantum;
        let expired = self.current.as_mut().is_some_and(|ctx| {
            ctx.quantum += 1;
            ctx.quantum_expired(max)
        });
        if effect == Effect::Finish {
            self.retire()?;
        } else if expired {
            self.expire_quantum()?;
        }
        self.tick()
    }

    fn fetch(&mut self, addr: InstructionAddr) -> Result<Instruction, Halt> {
        let port = self.instructions.clone();
        let fetched = port.fetch(self, addr)?;
        if fetched.hit {
            self.stats.icache_hits += 1;
        } else {
            self.stats.icache_misses += 1;
        }
        Ok(fetched.value)
    }

    fn count_data(&mut self, hit: bool) {
        if hit {
            self.stats.dcache_hits += 1;
        } else {
            self.stats.dcache_misses += 1;
        }
    }

    /// Moves the current context to the finished list and pulls the next one.
    fn retire(&mut self) -> Result<(), SimError> {
        if let Some(mut ctx) = self.current.take() {
            ctx.retired_by = Some(self.id);
            debug!(core = %self.id, context = ctx.id, cycles = ctx.cycles, "context retired");
            self.events.record(SchedEvent::Retired {
                cycle: self.scheduler.clock.cycle(),
                context: ctx.id,
            });
            self.stats.contexts_retired += 1;
            self.scheduler.finished.push(ctx);
        }
        let queue = Arc::clone(&self.scheduler.queue);
        let mut queue = queue.acquire(self)?;
        self.next = queue.pop_next();
        Ok(())
    }

    /// Rotates the current context to the back of the queue if another one is waiting.
    fn expire_quantum(&mut self) -> Result<(), SimError> {
        let queue = Arc::clone(&self.scheduler.queue);
        let mut queue = queue.acquire(self)?;
        let next = queue.pop_next();
        let Some(mut current) = self.current.take() else {
            self.next = next;
            return Ok(());
        };
        current.quantum = 0;
        self.events.record(SchedEvent::QuantumExpired {
            cycle: self.scheduler.clock.cycle(),
            context: current.id,
        });
        match next {
            Some(mut next) => {
                current.senior = false;
                next.senior = true;
                queue.push(current);
                self.next = Some(next);
            }
            None => self.current = Some(current),
        }
        Ok(())
    }

    fn install_next(&mut self) {
        let Some(next) = self.next.take() else {
            return;
        };
        let from = self.current.replace(next).map(|ctx| ctx.id);
        let to = self.current.as_ref().map_or(0, |ctx| ctx.id);
        self.stats.context_switches += 1;
        debug!(core = %self.id, ?from, to, "context installed");
        self.events.record(SchedEvent::Switched {
            cycle: self.scheduler.clock.cycle(),
            change: ContextChange::InstallNextFromQueue,
            from,
            to,
        });
        self.status.set_running(Some(to));
    }

    fn drive(&mut self) -> Result<(), SimError> {
        if self.current.is_none() {
            let queue = Arc::clone(&self.scheduler.queue);
            self.current = queue.acquire(self)?.pop_next();
        }
        self.status.set_running(self.current.as_ref().map(|ctx| ctx.id));
        while self.current.is_some() || self.next.is_some() {
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

impl Clock for BlockingCore {
    /// The cycle is charged to the running context; a context pulled from the
    /// queue is installed at the midpoint.
    fn tick(&mut self) -> Result<(), Halt> {
        self.registration.arrive()?;
        self.stats.cycles += 1;
        if let Some(ctx) = self.current.as_mut() {
            ctx.cycles += 1;
        }
        self.install_next();
        self.registration.arrive()?;
        Ok(())
    }

    fn stall(&mut self) -> Result<(), SimError> {
        self.registration.arrive()?;
        self.stats.cycles += 1;
        self.stats.stall_cycles += 1;
        self.registration.arrive()
    }
}

impl CoreEngine for BlockingCore {
    fn core(&self) -> CoreId {
        self.id
    }

    fn run(mut self) -> Result<CoreReport, SimError> {
        let result = self.drive();
        self.status.set_finished();
        if let Err(err) = result {
            abort_on_fault(&self.scheduler.clock, self.id, "core", &err);
            return Err(err);
        }
        Ok(self.report())
    }
}
