//! Direct-Mapped Private Caches.
//!
//! This module implements the per-core instruction and data caches. Each cache
//! is an array of independently locked lines indexed by `block mod lines`, so
//! coherence code running on another thread can address a single line of this
//! cache without touching the rest. The coherence transactions themselves live
//! in [`coherence`].

/// MSI coherence transactions over the shared buses.
pub mod coherence;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::common::addr::line_index;
use crate::common::data::CoreId;
use crate::common::error::SimError;
use crate::common::sync::{Resource, TryLock};
use crate::soc::memory::{DataBlock, InstructionBlock};

/// Coherence state of a data line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum LineState {
    /// The line holds no usable data.
    #[default]
    Invalid,
    /// Clean copy; other caches may hold the same block.
    Shared,
    /// Dirty, exclusive copy; memory is stale.
    Modified,
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "I",
            Self::Shared => "S",
            Self::Modified => "M",
        };
        f.write_str(name)
    }
}

/// One line of a data cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DataLine {
    /// Block number held, `None` when the line never held a block.
    pub tag: Option<usize>,
    /// Cached words.
    pub block: DataBlock,
    /// Coherence state.
    pub state: LineState,
}

impl DataLine {
    /// Returns `true` if the line holds a valid copy of block `tag`.
    #[inline(always)]
    pub fn holds(&self, tag: usize) -> bool {
        self.tag == Some(tag) && self.state != LineState::Invalid
    }

    pub(crate) fn install(&mut self, tag: usize, block: DataBlock, state: LineState) {
        self.tag = Some(tag);
        self.block = block;
        self.state = state;
    }
}

/// One line of an instruction cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InstructionLine {
    /// Block number held, `None` when the line never held a block.
    pub tag: Option<usize>,
    /// Cached instructions.
    pub block: InstructionBlock,
}

/// A core's private data cache.
#[derive(Debug)]
pub struct DataCache {
    core: CoreId,
    lines: Vec<TryLock<DataLine>>,
    write_backs: AtomicU64,
    invalidations: AtomicU64,
}

impl DataCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// * `core` - Owning core, used in lock diagnostics and peer lookups.
    /// * `lines` - Number of lines; must be non-zero.
    pub fn new(core: CoreId, lines: usize) -> Self {
        Self {
            core,
            lines: (0..lines)
                .map(|line| {
                    TryLock::new(
                        Resource::DataLine {
                            core: core.index(),
                            line,
                        },
                        DataLine::default(),
                    )
                })
                .collect(),
            write_backs: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Owning core.
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Line index that `block` maps to in this cache.
    pub fn index_for(&self, block: usize) -> usize {
        line_index(block, self.lines.len())
    }

    /// The line that `block` maps to in this cache.
    pub fn line_for(&self, block: usize) -> &TryLock<DataLine> {
        &self.lines[self.index_for(block)]
    }

    /// Copies every line, blocking on each line lock in turn.
    ///
    /// Only meaningful once the simulation is quiescent.
    pub fn snapshot(&self) -> Result<Vec<DataLine>, SimError> {
        self.lines.iter().map(|line| line.lock().map(|held| *held)).collect()
    }

    /// Blocks this cache wrote back to memory, as victim or as coherence peer.
    pub fn write_backs(&self) -> u64 {
        self.write_backs.load(Ordering::Relaxed)
    }

    /// Lines of this cache invalidated by the peer core.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub(crate) fn record_write_back(&self) {
        let _ = self.write_backs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        let _ = self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

/// A core's private instruction cache.
#[derive(Debug)]
pub struct InstructionCache {
    core: CoreId,
    lines: Vec<TryLock<InstructionLine>>,
}

impl InstructionCache {
    /// Creates an empty cache of `lines` lines.
    pub fn new(core: CoreId, lines: usize) -> Self {
        Self {
            core,
            lines: (0..lines)
                .map(|line| {
                    TryLock::new(
                        Resource::InstructionLine {
                            core: core.index(),
                            line,
                        },
                        InstructionLine::default(),
                    )
                })
                .collect(),
        }
    }

    /// Owning core.
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Line index that `block` maps to in this cache.
    pub fn index_for(&self, block: usize) -> usize {
        line_index(block, self.lines.len())
    }

    /// The line that `block` maps to in this cache.
    pub fn line_for(&self, block: usize) -> &TryLock<InstructionLine> {
        &self.lines[self.index_for(block)]
    }

    /// Copies every line, blocking on each line lock in turn.
    pub fn snapshot(&self) -> Result<Vec<InstructionLine>, SimError> {
        self.lines.iter().map(|line| line.lock().map(|held| *held)).collect()
    }
}
