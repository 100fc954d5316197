//! Two-core SMP simulator library.
//!
//! This crate implements a cycle-accurate simulator of a two-core machine with the following:
//! 1. **Cores:** A blocking core and a latency-hiding core that parks missing
//!    contexts on a helper thread, both running one OS thread each.
//! 2. **Memory:** Private direct-mapped instruction and data caches kept coherent
//!    with MSI over one shared data bus, plus a shared instruction bus.
//! 3. **Clock:** A lock-step barrier with dynamic membership that every core
//!    and helper crosses twice per simulated cycle.
//! 4. **ISA:** Decoding and execution of a twelve-instruction integer set.
//! 5. **Simulation:** Loader, configuration, orchestration and statistics.

/// Common types and constants (addresses, registers, locks, errors).
pub mod common;
/// Simulator configuration (defaults and hierarchical config structures).
pub mod config;
/// Core engines, contexts, ready queue, execution and caches.
pub mod core;
/// Instruction set (instruction records, opcodes, decode).
pub mod isa;
/// Clock, loader and orchestrator.
pub mod sim;
/// Memory system (builder, buses, main memory).
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or `Config::from_json`.
pub use crate::config::Config;
/// Orchestrator of a run and its final report.
pub use crate::sim::{SimReport, Simulator};
/// Memory system shared by both cores; construct with `System::new`.
pub use crate::soc::System;
