//! Instruction Set Architecture (ISA) Definitions.
//!
//! Contains the operation codes, the instruction record and the decoder for the
//! simulated machine's twelve-instruction integer ISA.

/// Instruction decoding into structured operations.
pub mod decode;

/// Instruction record structure and field accessors.
pub mod instruction;

/// Operation code values.
pub mod opcodes;

pub use decode::{decode, AluOp, DecodeError, Operation};
pub use instruction::Instruction;
