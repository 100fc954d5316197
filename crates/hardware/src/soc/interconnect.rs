//! Shared data and instruction buses.
//!
//! This module implements the two buses connecting the private caches to main
//! memory. It provides:
//! 1. **Exclusive Gates:** Each bus is a single try-lock; holding its guard is the
//!    only way to read or write memory.
//! 2. **Peer Addressing:** The data bus knows both data caches, so a coherence
//!    transaction can reach the other core's line for a tag.
//! 3. **Translation:** The instruction bus maps unified block numbers onto
//!    instruction-memory indices.

use std::fmt;
use std::sync::Arc;

use crate::common::constants::{CORE_COUNT, INSTRUCTION_BLOCK_OFFSET};
use crate::common::data::CoreId;
use crate::common::error::SimError;
use crate::common::sync::{Held, Resource, TryLock};
use crate::core::units::cache::DataCache;
use crate::soc::memory::{DataBlock, InstructionBlock};

/// Data memory behind the data bus gate.
pub struct DataBus {
    memory: TryLock<Vec<DataBlock>>,
    caches: [Arc<DataCache>; CORE_COUNT],
}

impl fmt::Debug for DataBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBus")
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl DataBus {
    /// Connects data memory to both cores' data caches.
    ///
    /// # Arguments
    ///
    /// * `memory` - Initial data memory image.
    /// * `caches` - Data caches indexed by core.
    pub fn new(memory: Vec<DataBlock>, caches: [Arc<DataCache>; CORE_COUNT]) -> Self {
        Self {
            memory: TryLock::new(Resource::DataBus, memory),
            caches,
        }
    }

    /// Attempts to take the bus.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if another transaction holds it.
    pub fn try_acquire(&self) -> Result<Option<BusGuard<'_>>, SimError> {
        Ok(self.memory.try_acquire()?.map(|memory| BusGuard { memory }))
    }

    /// The data cache of `core`.
    pub fn cache(&self, core: CoreId) -> &Arc<DataCache> {
        &self.caches[core.index()]
    }

    /// The data cache of the core that is not `core`.
    pub fn peer(&self, core: CoreId) -> &Arc<DataCache> {
        &self.caches[core.peer().index()]
    }

    /// Copies data memory, blocking on the gate.
    pub fn memory_snapshot(&self) -> Result<Vec<DataBlock>, SimError> {
        Ok(self.memory.lock()?.clone())
    }
}

/// Exclusive access to data memory.
#[derive(Debug)]
pub struct BusGuard<'a> {
    memory: Held<'a, Vec<DataBlock>>,
}

impl BusGuard<'_> {
    /// Reads block `block`.
    pub fn read_block(&self, block: usize) -> DataBlock {
        self.memory[block]
    }

    /// Overwrites block `block`.
    pub fn write_block(&mut self, block: usize, data: DataBlock) {
        self.memory[block] = data;
    }
}

/// Instruction memory behind the instruction bus gate.
#[derive(Debug)]
pub struct InstructionBus {
    memory: TryLock<Vec<InstructionBlock>>,
}

impl InstructionBus {
    /// Wraps an instruction memory image.
    pub fn new(memory: Vec<InstructionBlock>) -> Self {
        Self {
            memory: TryLock::new(Resource::InstructionBus, memory),
        }
    }

    /// Attempts to take the bus.
    pub fn try_acquire(&self) -> Result<Option<InstructionBusGuard<'_>>, SimError> {
        Ok(self
            .memory
            .try_acquire()?
            .map(|memory| InstructionBusGuard { memory }))
    }
}

/// Exclusive access to instruction memory.
#[derive(Debug)]
pub struct InstructionBusGuard<'a> {
    memory: Held<'a, Vec<InstructionBlock>>,
}

impl InstructionBusGuard<'_> {
    /// Reads the block with unified block number `block`.
    pub fn read_block(&self, block: usize) -> InstructionBlock {
        self.memory[block - INSTRUCTION_BLOCK_OFFSET]
    }
}
