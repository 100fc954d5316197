//! Global System Constants.
//!
//! This module defines the fixed geometry of the simulated machine. It includes:
//! 1. **Word and Block Geometry:** Word width and the number of words per block.
//! 2. **Memory Map:** Data and instruction memory sizes and where instructions begin.
//! 3. **Architectural State:** Register file size and the link register.
//! 4. **Timing Defaults:** Cycle costs of main-memory and bus transactions.

/// Size of one word in bytes.
pub const WORD_SIZE: u32 = 4;

/// Number of words (or instructions) held by one block.
pub const WORDS_PER_BLOCK: usize = 4;

/// Size of one block in bytes.
pub const BLOCK_SIZE: u32 = WORD_SIZE * WORDS_PER_BLOCK as u32;

/// Number of blocks in shared data memory.
pub const DATA_BLOCKS: usize = 24;

/// Number of blocks in shared instruction memory.
pub const INSTRUCTION_BLOCKS: usize = 40;

/// Block number at which instruction memory begins.
///
/// Instruction memory is laid out directly after data memory, so an
/// instruction block number minus this offset is its index on the
/// instruction bus.
pub const INSTRUCTION_BLOCK_OFFSET: usize = DATA_BLOCKS;

/// Byte address of the first instruction (384).
pub const INSTRUCTIONS_START: u32 = INSTRUCTION_BLOCK_OFFSET as u32 * BLOCK_SIZE;

/// One past the last byte address of instruction memory.
pub const INSTRUCTIONS_END: u32 =
    INSTRUCTIONS_START + INSTRUCTION_BLOCKS as u32 * BLOCK_SIZE;

/// One past the last byte address of data memory.
pub const DATA_END: u32 = DATA_BLOCKS as u32 * BLOCK_SIZE;

/// Value every data memory word holds before the simulation starts.
pub const INITIAL_DATA_WORD: i32 = 1;

/// Number of general-purpose registers per context.
pub const REGISTER_COUNT: usize = 32;

/// Register written with the return address by `JAL`.
pub const LINK_REGISTER: usize = 31;

/// Number of whitespace-separated fields in an instruction record.
pub const INSTRUCTION_FIELDS: usize = 4;

/// Number of parties the orchestrator contributes to the clock coordinator.
pub const ORCHESTRATOR_PARTIES: usize = 1;

/// Number of simulated cores.
pub const CORE_COUNT: usize = 2;
