//! Machine Words, Core Identities and Access Types.
//!
//! This module defines the small value types shared by every component. These
//! types are used for the following:
//! 1. **Data Representation:** `Word`, the 32-bit two's complement unit of storage.
//! 2. **Core Addressing:** `CoreId`, which names a core and its coherence peer.
//! 3. **Miss Classification:** `AccessType`, the kind of access that missed, used for
//!    routing misses to a helper and for statistics.

use std::fmt;

use serde::Serialize;

use super::constants::CORE_COUNT;

/// A 32-bit signed machine word.
pub type Word = i32;

/// Identifies one of the two simulated cores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CoreId(usize);

impl CoreId {
    /// The latency-hiding core.
    pub const HIDING: Self = Self(0);

    /// The blocking core.
    pub const BLOCKING: Self = Self(1);

    /// Both cores, in index order.
    pub const ALL: [Self; CORE_COUNT] = [Self::HIDING, Self::BLOCKING];

    /// Returns the array index of this core.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the other core, whose caches are the coherence peers of this one.
    #[inline(always)]
    pub const fn peer(self) -> Self {
        Self(1 - self.0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of memory access that reached the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Instruction fetch through the instruction cache.
    Fetch,

    /// Data read by `LW`.
    Load,

    /// Data write by `SW` to a line that does not hold the block.
    Store,

    /// Data write by `SW` to a `Shared` line, which must first invalidate the
    /// peer's copy over the bus.
    Upgrade,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Load => "load",
            Self::Store => "store",
            Self::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}
