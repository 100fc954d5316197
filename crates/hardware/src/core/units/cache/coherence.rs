//! MSI Coherence Transactions.
//!
//! This module implements every transaction that moves blocks between the
//! private caches and main memory. It performs:
//! 1. **Load Miss:** Victim write-back, peer inspection and fill in `Shared`.
//! 2. **Store Miss:** As a load miss, but the peer copy is invalidated and the
//!    local line ends `Modified`.
//! 3. **Upgrade:** A store to a `Shared` line invalidates the peer copy over the bus.
//! 4. **Instruction Fill:** Instruction line fill over the instruction bus.
//!
//! Locks are always taken local line, then bus, then peer line. Line and bus
//! use a non-blocking try: when the bus is busy the local line is released, one
//! cycle elapses and the caller restarts the transaction from the top. The peer
//! line is retried in place, since its holder never waits on the bus while
//! holding it.
//!
//! Each transaction costs one cycle for the bus, one for the peer line and the
//! configured memory latency for every block fetched or written back.
//! Interrupting a transaction through `Halt::Interrupted` drops every guard and
//! leaves the lines coherent; the instruction is executed again later.

use std::sync::Arc;

use tracing::trace;

use super::{DataCache, DataLine, InstructionCache, InstructionLine, LineState};
use crate::common::addr::{DataAddr, InstructionAddr};
use crate::common::data::{CoreId, Word};
use crate::common::error::Halt;
use crate::common::sync::{Held, TryLock};
use crate::isa::instruction::Instruction;
use crate::sim::clock::Clock;
use crate::soc::interconnect::{BusGuard, DataBus, InstructionBus};

/// Result of a cache access that ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Access<T> {
    /// Value read, or `()` for stores.
    pub value: T,
    /// Whether the first inspection found the line usable: holding the block,
    /// and `Modified` for stores.
    pub hit: bool,
}

/// A core's view of the data side of the memory system.
#[derive(Clone, Debug)]
pub struct DataPort {
    core: CoreId,
    cache: Arc<DataCache>,
    bus: Arc<DataBus>,
    latency: u32,
}

impl DataPort {
    /// Creates the port of `core` on `bus`.
    ///
    /// # Arguments
    ///
    /// * `core` - Core issuing the transactions; its cache is taken from the bus.
    /// * `bus` - The shared data bus.
    /// * `latency` - Cycles per block fetch or write-back.
    pub fn new(core: CoreId, bus: Arc<DataBus>, latency: u32) -> Self {
        Self {
            core,
            cache: Arc::clone(bus.cache(core)),
            bus,
            latency,
        }
    }

    /// Core issuing the transactions.
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// The local data cache.
    pub const fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    /// The local line `addr` maps to.
    pub fn line(&self, addr: DataAddr) -> &TryLock<DataLine> {
        self.cache.line_for(addr.block())
    }

    /// Reads the word at `addr`, resolving a miss inline.
    pub fn read<C: Clock>(&self, clock: &mut C, addr: DataAddr) -> Result<Access<Word>, Halt> {
        let mut hit = true;
        loop {
            let Some(line) = self.line(addr).try_acquire()? else {
                clock.tick()?;
                continue;
            };
            if line.holds(addr.block()) {
                return Ok(Access {
                    value: line.block.word(addr.offset()),
                    hit,
                });
            }
            hit = false;
            if let Some(value) = self.load_miss(clock, line, addr)? {
                return Ok(Access { value, hit });
            }
        }
    }

    /// Writes `value` at `addr`, resolving a miss or upgrade inline.
    pub fn write<C: Clock>(
        &self,
        clock: &mut C,
        addr: DataAddr,
        value: Word,
    ) -> Result<Access<()>, Halt> {
        let mut first = None;
        loop {
            let Some(mut line) = self.line(addr).try_acquire()? else {
                clock.tick()?;
                continue;
            };
            let holds = line.holds(addr.block());
            let writable = holds && line.state == LineState::Modified;
            let hit = *first.get_or_insert(writable);
            let done = if writable {
                line.block.set_word(addr.offset(), value);
                true
            } else if holds {
                self.upgrade(clock, line, addr, value)?
            } else {
                self.store_miss(clock, line, addr, value)?
            };
            if done {
                return Ok(Access { value: (), hit });
            }
        }
    }

    /// Fills `line` with the block holding `addr` for reading.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(word))` - The line is now `Shared` and holds the block.
    /// * `Ok(None)` - The bus was busy; `line` was released and one cycle elapsed.
    pub fn load_miss<C: Clock>(
        &self,
        clock: &mut C,
        line: Held<'_, DataLine>,
        addr: DataAddr,
    ) -> Result<Option<Word>, Halt> {
        let tag = addr.block();
        let Some((mut line, mut bus)) = self.begin(clock, line)? else {
            return Ok(None);
        };
        self.evict(clock, &mut line, &mut bus, tag)?;

        let peer_cache = self.bus.peer(self.core);
        let mut peer = lock_peer(peer_cache, tag, clock)?;
        let block = if peer.tag == Some(tag) && peer.state == LineState::Modified {
            bus.write_block(tag, peer.block);
            peer.state = LineState::Shared;
            peer_cache.record_write_back();
            trace!(core = %self.core, block = tag, "peer write-back, demoted to shared");
            peer.block
        } else {
            bus.read_block(tag)
        };
        clock.ticks(self.latency)?;

        line.install(tag, block, LineState::Shared);
        Ok(Some(block.word(addr.offset())))
    }

    /// Fills `line` with the block holding `addr` and writes `value` into it.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the bus was busy; `line` was released and one cycle elapsed.
    pub fn store_miss<C: Clock>(
        &self,
        clock: &mut C,
        line: Held<'_, DataLine>,
        addr: DataAddr,
        value: Word,
    ) -> Result<bool, Halt> {
        let tag = addr.block();
        let Some((mut line, mut bus)) = self.begin(clock, line)? else {
            return Ok(false);
        };
        self.evict(clock, &mut line, &mut bus, tag)?;

        let peer_cache = self.bus.peer(self.core);
        let mut peer = lock_peer(peer_cache, tag, clock)?;
        let mut block = if peer.tag == Some(tag) && peer.state == LineState::Modified {
            bus.write_block(tag, peer.block);
            peer_cache.record_write_back();
            trace!(core = %self.core, block = tag, "peer write-back before store");
            peer.block
        } else {
            bus.read_block(tag)
        };
        invalidate(peer_cache, &mut peer, tag);
        clock.ticks(self.latency)?;

        block.set_word(addr.offset(), value);
        line.install(tag, block, LineState::Modified);
        Ok(true)
    }

    /// Promotes a `Shared` line to `Modified` and writes `value` into it.
    ///
    /// The peer's copy of the block is invalidated. A `Modified` peer copy is
    /// written back and its contents taken over first.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the bus was busy; `line` was released and one cycle elapsed.
    pub fn upgrade<C: Clock>(
        &self,
        clock: &mut C,
        line: Held<'_, DataLine>,
        addr: DataAddr,
        value: Word,
    ) -> Result<bool, Halt> {
        let tag = addr.block();
        let Some((mut line, mut bus)) = self.begin(clock, line)? else {
            return Ok(false);
        };

        let peer_cache = self.bus.peer(self.core);
        let mut peer = lock_peer(peer_cache, tag, clock)?;
        let peer_was_modified = peer.tag == Some(tag) && peer.state == LineState::Modified;
        if peer_was_modified {
            bus.write_block(tag, peer.block);
            peer_cache.record_write_back();
            line.block = peer.block;
            trace!(core = %self.core, block = tag, "peer write-back before upgrade");
        }
        invalidate(peer_cache, &mut peer, tag);
        if peer_was_modified {
            clock.ticks(self.latency)?;
        }

        line.state = LineState::Modified;
        line.block.set_word(addr.offset(), value);
        Ok(true)
    }

    /// Takes the bus for a transaction on `line`.
    ///
    /// On contention `line` is released before the cycle elapses.
    fn begin<'l, C: Clock>(
        &self,
        clock: &mut C,
        line: Held<'l, DataLine>,
    ) -> Result<Option<(Held<'l, DataLine>, BusGuard<'_>)>, Halt> {
        if let Some(bus) = self.bus.try_acquire()? {
            clock.tick()?;
            return Ok(Some((line, bus)));
        }
        drop(line);
        trace!(core = %self.core, "data bus busy");
        clock.tick()?;
        Ok(None)
    }

    /// Writes back a `Modified` victim occupying the line needed for `tag`.
    fn evict<C: Clock>(
        &self,
        clock: &mut C,
        line: &mut DataLine,
        bus: &mut BusGuard<'_>,
        tag: usize,
    ) -> Result<(), Halt> {
        match line.tag {
            Some(victim) if victim != tag && line.state == LineState::Modified => {
                bus.write_block(victim, line.block);
                line.state = LineState::Invalid;
                self.cache.record_write_back();
                trace!(core = %self.core, block = victim, "victim write-back");
                clock.ticks(self.latency)
            }
            _ => Ok(()),
        }
    }
}

/// Locks the peer line for `tag`, waiting one cycle per failed attempt.
fn lock_peer<'p, C: Clock>(
    peer: &'p DataCache,
    tag: usize,
    clock: &mut C,
) -> Result<Held<'p, DataLine>, Halt> {
    let line = peer.line_for(tag);
    loop {
        if let Some(held) = line.try_acquire()? {
            clock.tick()?;
            return Ok(held);
        }
        clock.tick()?;
    }
}

fn invalidate(peer_cache: &DataCache, peer: &mut DataLine, tag: usize) {
    if peer.holds(tag) {
        peer.state = LineState::Invalid;
        peer_cache.record_invalidation();
        trace!(core = %peer_cache.core(), block = tag, "invalidated");
    }
}

/// A core's view of the instruction side of the memory system.
#[derive(Clone, Debug)]
pub struct InstructionPort {
    cache: Arc<InstructionCache>,
    bus: Arc<InstructionBus>,
    latency: u32,
}

impl InstructionPort {
    /// Creates the port connecting `cache` to `bus`.
    pub fn new(cache: Arc<InstructionCache>, bus: Arc<InstructionBus>, latency: u32) -> Self {
        Self {
            cache,
            bus,
            latency,
        }
    }

    /// The local instruction cache.
    pub const fn cache(&self) -> &Arc<InstructionCache> {
        &self.cache
    }

    /// The local line `addr` maps to.
    pub fn line(&self, addr: InstructionAddr) -> &TryLock<InstructionLine> {
        self.cache.line_for(addr.block())
    }

    /// Fetches the instruction at `addr`, filling the line inline on a miss.
    pub fn fetch<C: Clock>(
        &self,
        clock: &mut C,
        addr: InstructionAddr,
    ) -> Result<Access<Instruction>, Halt> {
        let mut hit = true;
        loop {
            let Some(line) = self.line(addr).try_acquire()? else {
                clock.tick()?;
                continue;
            };
            if line.tag == Some(addr.block()) {
                return Ok(Access {
                    value: line.block.instruction(addr.offset()),
                    hit,
                });
            }
            hit = false;
            if let Some(value) = self.fill(clock, line, addr)? {
                return Ok(Access { value, hit });
            }
        }
    }

    /// Fills `line` with the block holding `addr`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the bus was busy; `line` was released and one cycle elapsed.
    pub fn fill<C: Clock>(
        &self,
        clock: &mut C,
        mut line: Held<'_, InstructionLine>,
        addr: InstructionAddr,
    ) -> Result<Option<Instruction>, Halt> {
        let Some(bus) = self.bus.try_acquire()? else {
            drop(line);
            trace!(core = %self.cache.core(), "instruction bus busy");
            clock.tick()?;
            return Ok(None);
        };
        clock.tick()?;
        let block = bus.read_block(addr.block());
        clock.ticks(self.latency)?;

        line.tag = Some(addr.block());
        line.block = block;
        Ok(Some(block.instruction(addr.offset())))
    }
}
