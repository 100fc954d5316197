//! Memory-side units of a core.

/// Private instruction and data caches and their coherence transactions.
pub mod cache;
