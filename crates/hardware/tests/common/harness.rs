use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use smpsim_core::common::addr::InstructionAddr;
use smpsim_core::common::data::CoreId;
use smpsim_core::common::error::{Halt, SimError};
use smpsim_core::config::Config;
use smpsim_core::core::{Context, ContextQueue, Scheduler};
use smpsim_core::sim::clock::Clock;
use smpsim_core::sim::loader::{self, Program};
use smpsim_core::{SimReport, Simulator, System};
use tracing_subscriber::EnvFilter;

use super::builder::ProgramBuilder;

/// Routes simulator logs to the test output; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}

/// Default configuration with the given quantum.
pub fn config(max_quantum: u32) -> Config {
    let mut config = Config::default();
    config.general.max_quantum = max_quantum;
    config
}

/// Lays out `programs` in load order.
pub fn program(programs: &[ProgramBuilder]) -> Program {
    let sources: Vec<(String, String)> = programs
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("program{i}"), p.text()))
        .collect();
    loader::load_programs(&sources).unwrap()
}

/// Runs `programs` on both cores until every context retired.
pub fn run_programs(config: Config, programs: &[ProgramBuilder]) -> SimReport {
    try_run_programs(config, programs).unwrap()
}

pub fn try_run_programs(config: Config, programs: &[ProgramBuilder]) -> Result<SimReport, SimError> {
    init_tracing();
    let mut sim = Simulator::new(config, program(programs))?;
    let driven = sim.run_to_completion();
    let report = sim.finish()?;
    driven?;
    Ok(report)
}

/// Runs `work` on its own thread and waits at most `limit` for it.
///
/// # Returns
///
/// `None` if `work` is still running at the deadline; the thread is left
/// behind.
pub fn within<T, F>(limit: Duration, work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (done, result) = mpsc::channel();
    thread::Builder::new()
        .name("deadline-worker".into())
        .spawn(move || {
            let _ = done.send(work());
        })
        .unwrap();
    result.recv_timeout(limit).ok()
}

/// Like `run_programs`, but fails the test if the run does not end in `limit`.
pub fn run_programs_within(config: Config, programs: &[ProgramBuilder], limit: Duration) -> SimReport {
    init_tracing();
    let program = program(programs);
    let run = within(limit, move || {
        let mut sim = Simulator::new(config, program)?;
        let driven = sim.run_to_completion();
        let report = sim.finish()?;
        driven.map(|()| report)
    });
    match run {
        Some(report) => report.unwrap(),
        None => panic!("simulation still running after {limit:?}"),
    }
}

/// A memory system and scheduling handles for driving one engine directly.
///
/// No context is queued; tests hand contexts to the engine they build.
pub struct Machine {
    pub system: System,
    pub contexts: Vec<Context>,
    pub config: Config,
}

impl Machine {
    pub fn new(config: Config, programs: &[ProgramBuilder]) -> Self {
        init_tracing();
        let program = program(programs);
        let system = System::new(&config, &program.instructions).unwrap();
        Self {
            system,
            contexts: program.contexts,
            config,
        }
    }

    /// Scheduling handles whose queue holds `queued`, in order.
    pub fn scheduler(&self, queued: Vec<Context>) -> Scheduler {
        Scheduler::new(ContextQueue::new(queued), self.config.general.max_quantum)
    }

    /// Fetches `instructions` consecutive instructions from `pc` into the
    /// instruction cache of `core`, so an engine starts with warm fetches.
    pub fn warm_instructions(&self, core: CoreId, pc: u32, instructions: usize) {
        let port = self.system.instruction_port(core);
        let mut clock = StubClock::default();
        for i in 0..instructions {
            let addr = InstructionAddr::new(i64::from(pc) + 4 * i as i64).unwrap();
            let _ = port.fetch(&mut clock, addr).unwrap();
        }
    }
}

/// A clock that only counts, for driving coherence transactions on one thread.
#[derive(Debug, Default)]
pub struct StubClock {
    pub ticks: u64,
    pub stalls: u64,
}

impl StubClock {
    pub fn elapsed(&self) -> u64 {
        self.ticks + self.stalls
    }
}

impl Clock for StubClock {
    fn tick(&mut self) -> Result<(), Halt> {
        self.ticks += 1;
        Ok(())
    }

    fn stall(&mut self) -> Result<(), SimError> {
        self.stalls += 1;
        Ok(())
    }
}
