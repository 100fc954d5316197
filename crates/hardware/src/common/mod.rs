//! Common utilities and types used throughout the simulator.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the simulator. It includes:
//! 1. **Address Types:** Strong types for data and instruction addresses.
//! 2. **Constants:** Memory geometry and architectural sizes.
//! 3. **Value Types:** Words, core identities and access classification.
//! 4. **Error Handling:** Fatal faults and the context-change unwinding signal.
//! 5. **Register Management:** The per-context register file.
//! 6. **Synchronization:** The owner-tracking try-lock guarding all shared state.

/// Address type definitions (data and instruction addresses).
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Word, core id and access type definitions.
pub mod data;

/// Error types and the interruption signal.
pub mod error;

/// Register file implementation.
pub mod reg;

/// Owner-tracking try-lock.
pub mod sync;

pub use addr::{DataAddr, InstructionAddr};
pub use data::{AccessType, CoreId, Word};
pub use error::{Halt, SimError};
pub use reg::{Reg, RegisterFile};
pub use sync::{Held, Resource, TryLock};
