//! Context Register File.
//!
//! This module provides the `RegisterFile` held by every context and the `Reg`
//! index type produced by the decoder. It provides:
//! 1. **Checked Indexing:** A `Reg` can only be built for an index below 32, so
//!    reads and writes need no further bounds handling.
//! 2. **Storage:** Thirty-two words, zeroed at load time.
//! 3. **Observability:** Formatting of the register contents for reports.

use std::fmt;

use serde::Serialize;

use super::constants::{LINK_REGISTER, REGISTER_COUNT};
use super::data::Word;

/// A validated register index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    /// The link register written by `JAL`.
    pub const LINK: Self = Self(LINK_REGISTER as u8);

    /// Validates a register operand field.
    ///
    /// # Returns
    ///
    /// `None` if `index` is not in `0..32`.
    pub fn new(index: i32) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < REGISTER_COUNT)
            .map(Self)
    }

    /// Returns the register number.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The register file of one context.
///
/// Every register is general purpose; register 0 is writable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegisterFile([Word; REGISTER_COUNT]);

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates a register file with all registers set to zero.
    pub const fn new() -> Self {
        Self([0; REGISTER_COUNT])
    }

    /// Reads a register.
    #[inline(always)]
    pub const fn read(&self, reg: Reg) -> Word {
        self.0[reg.index()]
    }

    /// Writes a register.
    #[inline(always)]
    pub fn write(&mut self, reg: Reg, value: Word) {
        self.0[reg.index()] = value;
    }

    /// Returns all register values in index order.
    pub const fn as_slice(&self) -> &[Word; REGISTER_COUNT] {
        &self.0
    }
}

impl fmt::Display for RegisterFile {
    /// Eight registers per row, each labelled with its index.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.0.chunks(8).enumerate() {
            for (col, value) in chunk.iter().enumerate() {
                write!(f, "r{:<2}={value:<8}", row * 8 + col)?;
            }
            if row + 1 < REGISTER_COUNT / 8 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
