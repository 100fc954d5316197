//! Simulation faults and loop-control signals.
//!
//! This module defines the error handling of the simulator. It provides:
//! 1. **Fatal Faults:** `SimError`, every condition that terminates the simulation.
//! 2. **Unwinding:** `Halt`, which carries either a fault or a context-change
//!    interruption up to the fetch/execute loop through `?`.
//!
//! Lock contention and empty queues are not represented here: they are
//! ordinary backpressure and are retried by advancing the clock.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::sync::Resource;

/// Fatal simulation faults.
#[derive(Debug, Error)]
pub enum SimError {
    /// A thread tried to take a lock it already holds.
    #[error("lock protocol violation: {resource} re-acquired by its holder")]
    LockProtocol {
        /// The lock that was re-acquired.
        resource: Resource,
    },

    /// The decoded opcode or a register operand is not part of the instruction set.
    #[error("context {context}: invalid instruction at pc {pc}: {detail}")]
    InvalidInstruction {
        /// Context executing the instruction.
        context: usize,
        /// Address of the instruction.
        pc: u32,
        /// What was wrong with it.
        detail: String,
    },

    /// `DDIV` with a zero divisor.
    #[error("context {context}: division by zero at pc {pc}")]
    DivideByZero {
        /// Context executing the division.
        context: usize,
        /// Address of the division.
        pc: u32,
    },

    /// A load or store outside data memory.
    #[error("context {context}: data address {address} outside data memory")]
    AddressOutOfRange {
        /// Context issuing the access.
        context: usize,
        /// Effective byte address.
        address: i64,
    },

    /// The program counter is misaligned or outside instruction memory.
    #[error("context {context}: program counter {pc} outside instruction memory")]
    InvalidProgramCounter {
        /// Context whose pc is invalid.
        context: usize,
        /// Offending pc value.
        pc: i64,
    },

    /// An instruction record does not have four integer fields.
    #[error("{source_name}:{line}: malformed instruction record: {detail}")]
    MalformedInstruction {
        /// File or label the record came from.
        source_name: String,
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        detail: String,
    },

    /// The loaded programs do not fit in instruction memory.
    #[error("programs need {needed} instruction blocks, memory holds {available}")]
    ProgramTooLarge {
        /// Blocks required.
        needed: usize,
        /// Blocks available.
        available: usize,
    },

    /// No context was loaded.
    #[error("the simulation requires at least one context")]
    NoContexts,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A program file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A simulation thread could not be started.
    #[error("cannot spawn thread {name}: {source}")]
    ThreadSpawn {
        /// Name of the thread.
        name: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another party faulted and tore the clock down.
    #[error("simulation aborted")]
    Aborted,

    /// A simulation thread panicked.
    #[error("thread {0} panicked")]
    ThreadPanicked(String),
}

/// Reason the current fetch/execute iteration stopped early.
///
/// `Interrupted` is the context-change signal: a pending change was applied
/// at the clock midpoint and the running instruction must be abandoned.
/// Returning it through `?` drops every lock guard the iteration holds.
#[derive(Debug)]
pub enum Halt {
    /// The running context was switched out.
    Interrupted,
    /// A fatal fault.
    Fault(SimError),
}

impl From<SimError> for Halt {
    fn from(err: SimError) -> Self {
        Self::Fault(err)
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted by context change"),
            Self::Fault(err) => write!(f, "{err}"),
        }
    }
}
