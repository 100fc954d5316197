//! Data and Instruction Address types.
//!
//! This module defines strong types for the two address spaces of the machine so a
//! data address can never be used to fetch an instruction. It provides the following:
//! 1. **Validation:** Construction fails for addresses outside their memory region.
//! 2. **Block Arithmetic:** Block number, word offset and cache line index.
//! 3. **Bus Translation:** Converting an instruction block number to its index on the
//!    instruction bus.

use super::constants::{
    BLOCK_SIZE, DATA_END, INSTRUCTION_BLOCK_OFFSET, INSTRUCTIONS_END, INSTRUCTIONS_START,
    WORD_SIZE,
};

/// A byte address in data memory.
///
/// Data addresses select a word by truncating to the enclosing word, as the
/// memory system has no byte lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataAddr(u32);

/// A word-aligned byte address in instruction memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionAddr(u32);

impl DataAddr {
    /// Creates a data address from an effective address.
    ///
    /// # Arguments
    ///
    /// * `addr` - Base register plus displacement, computed without wrapping.
    ///
    /// # Returns
    ///
    /// `None` if the address falls outside data memory.
    pub fn new(addr: i64) -> Option<Self> {
        u32::try_from(addr)
            .ok()
            .filter(|a| *a < DATA_END)
            .map(Self)
    }

    /// Returns the raw byte address.
    #[inline(always)]
    pub const fn val(self) -> u32 {
        self.0
    }

    /// Memory block number holding this address; also the line tag.
    #[inline(always)]
    pub const fn block(self) -> usize {
        (self.0 / BLOCK_SIZE) as usize
    }

    /// Index of the addressed word within its block.
    #[inline(always)]
    pub const fn offset(self) -> usize {
        ((self.0 % BLOCK_SIZE) / WORD_SIZE) as usize
    }
}

impl InstructionAddr {
    /// Creates an instruction address from a program counter value.
    ///
    /// # Returns
    ///
    /// `None` if `pc` is misaligned or outside instruction memory.
    pub fn new(pc: i64) -> Option<Self> {
        u32::try_from(pc)
            .ok()
            .filter(|a| (INSTRUCTIONS_START..INSTRUCTIONS_END).contains(a) && a % WORD_SIZE == 0)
            .map(Self)
    }

    /// Returns the raw byte address.
    #[inline(always)]
    pub const fn val(self) -> u32 {
        self.0
    }

    /// Block number in the unified block numbering; also the line tag.
    #[inline(always)]
    pub const fn block(self) -> usize {
        (self.0 / BLOCK_SIZE) as usize
    }

    /// Index of the block on the instruction bus.
    #[inline(always)]
    pub const fn bus_index(self) -> usize {
        self.block() - INSTRUCTION_BLOCK_OFFSET
    }

    /// Index of the instruction within its block.
    #[inline(always)]
    pub const fn offset(self) -> usize {
        ((self.0 % BLOCK_SIZE) / WORD_SIZE) as usize
    }
}

/// Line index for `block` in a direct-mapped cache of `lines` lines.
#[inline(always)]
pub const fn line_index(block: usize, lines: usize) -> usize {
    block % lines
}
