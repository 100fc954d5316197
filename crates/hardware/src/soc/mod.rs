//! Shared Memory System.
//!
//! This module organizes the components outside the cores: main memory, the
//! two buses and the builder that assembles them with the private caches.

/// System builder for assembling the memory system.
pub mod builder;

/// Data and instruction buses.
pub mod interconnect;

/// Main memory blocks and images.
pub mod memory;

pub use builder::System;
