//! Simulation driving and program loading.
//!
//! Provides the global clock, the loader that turns program text into
//! contexts and instruction memory, and the simulator that runs both cores.

/// Lock-step clock coordinator.
pub mod clock;

/// Program parsing and layout.
pub mod loader;

/// Orchestrator of a run.
pub mod simulator;

pub use simulator::{SimReport, Simulator};
