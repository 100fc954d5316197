//! Configuration system for the simulator.
//!
//! This module defines the configuration structures used to parameterize a
//! run. It provides:
//! 1. **Defaults:** Baseline machine constants (quantum, memory latency, cache geometry).
//! 2. **Structures:** Hierarchical config for general, memory and cache settings.
//! 3. **Validation:** Range checks run before a simulator is built.
//!
//! Configuration is deserialized from JSON (every field is optional) or built
//! with `Config::default()` and adjusted by the CLI flags.

use serde::{Deserialize, Serialize};

use crate::common::data::CoreId;
use crate::common::error::SimError;

/// Default configuration constants for the simulator.
mod defaults {
    /// Instructions a context may execute before it must yield its core.
    pub const MAX_QUANTUM: u32 = 20;

    /// Cycles to move one block between memory and a cache.
    pub const MEMORY_LATENCY: u32 = 40;

    /// Lines of each cache of the latency-hiding core.
    pub const CORE0_LINES: usize = 8;

    /// Lines of each cache of the blocking core.
    pub const CORE1_LINES: usize = 4;
}

/// Root configuration of a simulation run.
///
/// # Examples
///
/// ```
/// use smpsim_core::config::Config;
///
/// let config = Config::from_json(r#"{ "general": { "max_quantum": 5 } }"#).unwrap();
/// assert_eq!(config.general.max_quantum, 5);
/// assert_eq!(config.cache.core0_lines, 8);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// General simulation settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Main memory timing
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Private cache geometry
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        serde_json::from_str(text).map_err(|err| SimError::InvalidConfig(err.to_string()))
    }

    /// Checks every value is in range.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.general.max_quantum < 1 {
            return Err(SimError::InvalidConfig(
                "max_quantum must be at least 1".to_owned(),
            ));
        }
        for core in CoreId::ALL {
            if self.cache.lines(core) == 0 {
                return Err(SimError::InvalidConfig(format!(
                    "core {core} caches need at least one line"
                )));
            }
        }
        Ok(())
    }
}

/// General simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Instructions a context may execute before it must yield its core.
    #[serde(default = "GeneralConfig::default_max_quantum")]
    pub max_quantum: u32,

    /// Emit debug-level scheduling events.
    #[serde(default)]
    pub trace: bool,
}

impl GeneralConfig {
    const fn default_max_quantum() -> u32 {
        defaults::MAX_QUANTUM
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_quantum: defaults::MAX_QUANTUM,
            trace: false,
        }
    }
}

/// Main memory timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Cycles per block fetch or write-back.
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u32,
}

impl MemoryConfig {
    const fn default_latency() -> u32 {
        defaults::MEMORY_LATENCY
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            latency: defaults::MEMORY_LATENCY,
        }
    }
}

/// Line counts of the private caches. Both caches of a core have the same size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Lines per cache on core 0.
    #[serde(default = "CacheConfig::default_core0_lines")]
    pub core0_lines: usize,

    /// Lines per cache on core 1.
    #[serde(default = "CacheConfig::default_core1_lines")]
    pub core1_lines: usize,
}

impl CacheConfig {
    const fn default_core0_lines() -> usize {
        defaults::CORE0_LINES
    }

    const fn default_core1_lines() -> usize {
        defaults::CORE1_LINES
    }

    /// Lines per cache on `core`.
    pub const fn lines(&self, core: CoreId) -> usize {
        match core.index() {
            0 => self.core0_lines,
            _ => self.core1_lines,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            core0_lines: defaults::CORE0_LINES,
            core1_lines: defaults::CORE1_LINES,
        }
    }
}
