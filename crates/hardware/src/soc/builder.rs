//! Machine construction and the top-level `System` type.
//!
//! This module builds the memory system from configuration. It performs:
//! 1. **Memory images:** Data memory filled with the initial word, instruction
//!    memory packed with the program words.
//! 2. **Caches:** One instruction and one data cache per core, sized per core.
//! 3. **Buses:** The shared data bus (which also reaches every data cache for
//!    snooping) and the shared instruction bus.

use std::sync::Arc;

use crate::common::constants::{CORE_COUNT, INSTRUCTION_BLOCKS, WORDS_PER_BLOCK};
use crate::common::data::CoreId;
use crate::common::error::SimError;
use crate::config::Config;
use crate::core::units::cache::coherence::{DataPort, InstructionPort};
use crate::core::units::cache::{DataCache, DataLine, InstructionCache, InstructionLine};
use crate::isa::instruction::Instruction;
use crate::soc::interconnect::{DataBus, InstructionBus};
use crate::soc::memory::{initial_data_memory, instruction_memory, DataBlock};

/// The shared memory system of both cores.
#[derive(Debug)]
pub struct System {
    data_bus: Arc<DataBus>,
    instruction_bus: Arc<InstructionBus>,
    instruction_caches: [Arc<InstructionCache>; CORE_COUNT],
    latency: u32,
}

impl System {
    /// Builds memories, caches and buses.
    ///
    /// # Arguments
    ///
    /// * `config` - Cache geometry and memory latency.
    /// * `program` - Instruction words of every loaded program, in load order.
    ///
    /// # Returns
    ///
    /// `SimError::ProgramTooLarge` if `program` does not fit in instruction memory.
    pub fn new(config: &Config, program: &[Instruction]) -> Result<Self, SimError> {
        let needed = program.len().div_ceil(WORDS_PER_BLOCK);
        if needed > INSTRUCTION_BLOCKS {
            return Err(SimError::ProgramTooLarge {
                needed,
                available: INSTRUCTION_BLOCKS,
            });
        }
        let data_caches =
            CoreId::ALL.map(|core| Arc::new(DataCache::new(core, config.cache.lines(core))));
        let instruction_caches = CoreId::ALL
            .map(|core| Arc::new(InstructionCache::new(core, config.cache.lines(core))));
        Ok(Self {
            data_bus: Arc::new(DataBus::new(initial_data_memory(), data_caches)),
            instruction_bus: Arc::new(InstructionBus::new(instruction_memory(program))),
            instruction_caches,
            latency: config.memory.latency,
        })
    }

    /// Data side port of `core`.
    pub fn data_port(&self, core: CoreId) -> DataPort {
        DataPort::new(core, Arc::clone(&self.data_bus), self.latency)
    }

    /// Instruction side port of `core`.
    pub fn instruction_port(&self, core: CoreId) -> InstructionPort {
        InstructionPort::new(
            Arc::clone(&self.instruction_caches[core.index()]),
            Arc::clone(&self.instruction_bus),
            self.latency,
        )
    }

    /// The data cache of `core`.
    pub fn data_cache(&self, core: CoreId) -> &Arc<DataCache> {
        self.data_bus.cache(core)
    }

    /// The instruction cache of `core`.
    pub fn instruction_cache(&self, core: CoreId) -> &Arc<InstructionCache> {
        &self.instruction_caches[core.index()]
    }

    /// Copies data memory, blocking on the bus.
    pub fn memory_snapshot(&self) -> Result<Vec<DataBlock>, SimError> {
        self.data_bus.memory_snapshot()
    }

    /// Copies the lines of both data caches, in core order.
    pub fn data_cache_snapshots(&self) -> Result<Vec<Vec<DataLine>>, SimError> {
        CoreId::ALL
            .iter()
            .map(|&core| self.data_cache(core).snapshot())
            .collect()
    }

    /// Copies the lines of both instruction caches, in core order.
    pub fn instruction_cache_snapshots(&self) -> Result<Vec<Vec<InstructionLine>>, SimError> {
        self.instruction_caches
            .iter()
            .map(|cache| cache.snapshot())
            .collect()
    }
}
