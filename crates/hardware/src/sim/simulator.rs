//! Simulator: owns the machine and drives both cores.
//!
//! The simulator is the orchestrator of a run. It builds the memory system and
//! the ready queue, starts one thread per core and is itself a party of the
//! clock, so it can hold the machine between cycles for step-by-step runs.
//! When only the orchestrator remains registered, every core has terminated.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::clock::Registration;
use super::loader::Program;
use crate::common::constants::{ORCHESTRATOR_PARTIES, WORDS_PER_BLOCK, WORD_SIZE};
use crate::common::data::{CoreId, Word};
use crate::common::error::SimError;
use crate::config::Config;
use crate::core::context::Context;
use crate::core::events::SchedEvent;
use crate::core::queue::ContextQueue;
use crate::core::units::cache::{DataLine, LineState};
use crate::core::{BlockingCore, CoreEngine, CoreReport, CoreStatus, HidingCore, Scheduler};
use crate::soc::memory::DataBlock;
use crate::soc::System;
use crate::stats::SimStats;

type EngineHandle = JoinHandle<Result<CoreReport, SimError>>;

/// Final state of a completed run.
#[derive(Clone, Debug, Serialize)]
pub struct SimReport {
    /// Totals and per-core counters.
    pub stats: SimStats,
    /// Retired contexts in retirement order.
    pub contexts: Vec<Context>,
    /// Data memory.
    pub memory: Vec<DataBlock>,
    /// Data cache lines, one list per core.
    pub data_caches: Vec<Vec<DataLine>>,
    /// Scheduling events, one list per core.
    pub events: Vec<Vec<SchedEvent>>,
}

impl SimReport {
    /// The retired context with load-order number `id`.
    pub fn context(&self, id: usize) -> Option<&Context> {
        self.contexts.iter().find(|ctx| ctx.id == id)
    }

    /// The word at byte address `addr` of data memory.
    pub fn word(&self, addr: u32) -> Option<Word> {
        let index = (addr / WORD_SIZE) as usize;
        self.memory
            .get(index / WORDS_PER_BLOCK)
            .map(|block| block.word(index % WORDS_PER_BLOCK))
    }

    /// The architectural value of the word at `addr`: a `Modified` cached
    /// copy takes precedence over memory.
    pub fn coherent_word(&self, addr: u32) -> Option<Word> {
        let index = (addr / WORD_SIZE) as usize;
        let block = index / WORDS_PER_BLOCK;
        self.data_caches
            .iter()
            .flatten()
            .find(|line| line.state == LineState::Modified && line.tag == Some(block))
            .map(|line| line.block.word(index % WORDS_PER_BLOCK))
            .or_else(|| self.word(addr))
    }
}

/// The orchestrator of one simulation run.
#[derive(Debug)]
pub struct Simulator {
    config: Config,
    system: System,
    scheduler: Scheduler,
    orchestrator: Option<Registration>,
    statuses: Vec<Arc<CoreStatus>>,
    engines: Vec<(CoreId, EngineHandle)>,
    started: Option<Instant>,
}

impl Simulator {
    /// Builds the machine for `program`. No thread runs until `start`.
    ///
    /// # Returns
    ///
    /// `SimError::InvalidConfig` for an out-of-range configuration and
    /// `SimError::NoContexts` if `program` holds no context.
    pub fn new(config: Config, program: Program) -> Result<Self, SimError> {
        config.validate()?;
        if program.is_empty() {
            return Err(SimError::NoContexts);
        }
        let system = System::new(&config, &program.instructions)?;
        let scheduler = Scheduler::new(
            ContextQueue::new(program.contexts),
            config.general.max_quantum,
        );
        Ok(Self {
            config,
            system,
            scheduler,
            orchestrator: None,
            statuses: Vec::new(),
            engines: Vec::new(),
            started: None,
        })
    }

    /// The configuration of the run.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The memory system.
    pub const fn system(&self) -> &System {
        &self.system
    }

    /// Gives the first context to core 0, the second to core 1, and starts
    /// both engine threads. Calling it again has no effect.
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.orchestrator.is_some() {
            return Ok(());
        }
        self.orchestrator = Some(self.scheduler.clock.register());
        self.started = Some(Instant::now());

        let mut first = self.scheduler.queue.pop()?;
        if let Some(ctx) = first.as_mut() {
            ctx.senior = true;
        }
        let second = self.scheduler.queue.pop()?;

        let hiding = HidingCore::new(&self.system, &self.scheduler, first);
        let blocking = BlockingCore::new(&self.system, &self.scheduler, second);
        self.statuses = vec![hiding.status(), blocking.status()];
        self.spawn(hiding)?;
        self.spawn(blocking)?;
        info!(
            queued = self.scheduler.queue.len()?,
            quantum = self.config.general.max_quantum,
            "simulation started"
        );
        Ok(())
    }

    fn spawn<E: CoreEngine + 'static>(&mut self, engine: E) -> Result<(), SimError> {
        let core = engine.core();
        let name = format!("core{core}");
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || engine.run())
            .map_err(|source| SimError::ThreadSpawn { name, source })?;
        self.engines.push((core, handle));
        Ok(())
    }

    /// Returns `true` while any core or helper is still registered with the clock.
    pub fn is_running(&self) -> bool {
        self.orchestrator.is_some() && self.scheduler.clock.parties() > ORCHESTRATOR_PARTIES
    }

    /// Completed simulated cycles.
    pub fn cycle(&self) -> u64 {
        self.scheduler.clock.cycle()
    }

    /// Id of the context running on `core`, if any.
    pub fn running_context(&self, core: CoreId) -> Option<usize> {
        self.statuses
            .get(core.index())
            .and_then(|status| status.running())
    }

    /// Lets up to `cycles` cycles elapse.
    ///
    /// # Returns
    ///
    /// The number of cycles that elapsed, fewer than `cycles` if every core
    /// terminated first.
    pub fn step(&mut self, cycles: u64) -> Result<u64, SimError> {
        let Some(orchestrator) = self.orchestrator.as_ref() else {
            return Ok(0);
        };
        let mut elapsed = 0;
        while elapsed < cycles && self.scheduler.clock.parties() > ORCHESTRATOR_PARTIES {
            orchestrator.arrive()?;
            orchestrator.arrive()?;
            elapsed += 1;
        }
        Ok(elapsed)
    }

    /// Lets the cores run until they all terminate.
    pub fn run_to_completion(&mut self) -> Result<(), SimError> {
        self.start()?;
        let _ = self.step(u64::MAX)?;
        Ok(())
    }

    /// Leaves the clock, joins both cores and collects the final state.
    ///
    /// Cores that are still running complete on their own first.
    ///
    /// # Returns
    ///
    /// The report, or the first fault of any core. The fault that caused an
    /// abort is preferred over the `SimError::Aborted` it raised elsewhere.
    pub fn finish(mut self) -> Result<SimReport, SimError> {
        if let Some(orchestrator) = self.orchestrator.take() {
            orchestrator.deregister();
        }
        let mut fault: Option<SimError> = None;
        let mut reports = Vec::new();
        for (core, handle) in self.engines.drain(..) {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(SimError::ThreadPanicked(format!("core{core}"))));
            match result {
                Ok(report) => reports.push(report),
                Err(err) => {
                    if matches!(fault, None | Some(SimError::Aborted)) {
                        fault = Some(err);
                    }
                }
            }
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let mut stats = SimStats::new(self.scheduler.clock.cycle());
        stats.host_seconds = self.started.map_or(0.0, |t| t.elapsed().as_secs_f64());
        let mut events = vec![Vec::new(); stats.cores.len()];
        for report in reports {
            events[report.core.index()] = report.events;
            stats.cores[report.core.index()] = report.stats;
        }
        debug!(cycles = stats.cycles, "simulation finished");
        Ok(SimReport {
            stats,
            contexts: self.scheduler.finished.take(),
            memory: self.system.memory_snapshot()?,
            data_caches: self.system.data_cache_snapshots()?,
            events,
        })
    }
}
