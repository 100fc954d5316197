//! Main Memory Blocks.
//!
//! This module implements the backing store of the shared buses. It provides:
//! 1. **Blocks:** `DataBlock` and `InstructionBlock`, the unit moved between memory and caches.
//! 2. **Initial Images:** Construction of data memory (every word set to 1) and of
//!    instruction memory from the loaded program words.

use serde::Serialize;

use crate::common::constants::{
    DATA_BLOCKS, INITIAL_DATA_WORD, INSTRUCTION_BLOCKS, WORDS_PER_BLOCK,
};
use crate::common::data::Word;
use crate::isa::instruction::Instruction;

/// Four words of data memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DataBlock(pub [Word; WORDS_PER_BLOCK]);

impl DataBlock {
    /// A block whose every word is `value`.
    pub const fn filled(value: Word) -> Self {
        Self([value; WORDS_PER_BLOCK])
    }

    /// Reads the word at `offset`.
    #[inline(always)]
    pub const fn word(&self, offset: usize) -> Word {
        self.0[offset]
    }

    /// Replaces the word at `offset`.
    #[inline(always)]
    pub fn set_word(&mut self, offset: usize, value: Word) {
        self.0[offset] = value;
    }
}

/// Four instructions of instruction memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InstructionBlock(pub [Instruction; WORDS_PER_BLOCK]);

impl InstructionBlock {
    /// Reads the instruction at `offset`.
    #[inline(always)]
    pub const fn instruction(&self, offset: usize) -> Instruction {
        self.0[offset]
    }
}

/// Builds the initial data memory image.
pub fn initial_data_memory() -> Vec<DataBlock> {
    vec![DataBlock::filled(INITIAL_DATA_WORD); DATA_BLOCKS]
}

/// Packs program words into instruction memory blocks, padding with zeroed
/// records.
///
/// The caller guarantees `words` fits in instruction memory.
pub fn instruction_memory(words: &[Instruction]) -> Vec<InstructionBlock> {
    let mut blocks = vec![InstructionBlock::default(); INSTRUCTION_BLOCKS];
    for (index, inst) in words.iter().take(INSTRUCTION_BLOCKS * WORDS_PER_BLOCK).enumerate() {
        blocks[index / WORDS_PER_BLOCK].0[index % WORDS_PER_BLOCK] = *inst;
    }
    blocks
}
