//! Hardware contexts.
//!
//! A context is the architectural state of one program: its program counter,
//! register file and scheduling counters. A `Context` value is moved, never
//! shared, between the places that may own it (a core slot, the ready queue, a
//! miss helper or the finished list), so it always has exactly one owner.

use serde::Serialize;

use crate::common::constants::WORD_SIZE;
use crate::common::data::CoreId;
use crate::common::reg::RegisterFile;
use crate::isa::instruction::Instruction;

/// Architectural and scheduling state of one program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Context {
    /// Load-order number of the program.
    pub id: usize,
    /// Address of the next instruction to fetch.
    pub pc: u32,
    /// General-purpose registers.
    pub registers: RegisterFile,
    /// Cycles spent running on a core or resolving its misses.
    pub cycles: u64,
    /// Instructions executed since the context was last scheduled.
    pub quantum: u32,
    /// Priority flag for resuming on the latency-hiding core.
    pub senior: bool,
    /// Core that executed the terminating instruction.
    pub retired_by: Option<CoreId>,
    /// Instruction at `pc`, already fetched by a miss helper or by an
    /// iteration that was interrupted before it committed.
    #[serde(skip)]
    pub fetched: Option<Instruction>,
}

impl Context {
    /// Creates a context with zeroed registers and counters.
    ///
    /// # Arguments
    ///
    /// * `id` - Load-order number.
    /// * `pc` - Address of the program's first instruction.
    pub const fn new(id: usize, pc: u32) -> Self {
        Self {
            id,
            pc,
            registers: RegisterFile::new(),
            cycles: 0,
            quantum: 0,
            senior: false,
            retired_by: None,
            fetched: None,
        }
    }

    /// Moves the program counter past the instruction just fetched.
    #[inline(always)]
    pub fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(WORD_SIZE);
    }

    /// Moves the program counter back onto an instruction that did not commit.
    #[inline(always)]
    pub fn rewind_pc(&mut self) {
        self.pc = self.pc.wrapping_sub(WORD_SIZE);
    }

    /// Moves the program counter back onto `inst`, which is kept so the next
    /// iteration executes it without fetching again.
    pub fn rewind_to(&mut self, inst: Instruction) {
        self.rewind_pc();
        self.fetched = Some(inst);
    }

    /// Returns `true` once the context has executed `max` instructions since it
    /// was last scheduled.
    #[inline(always)]
    pub const fn quantum_expired(&self, max: u32) -> bool {
        self.quantum >= max
    }
}
