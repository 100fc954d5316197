//! Operation Codes.
//!
//! Defines the values of the first field of an instruction record.

/// Jump to register (`pc = r[f1]`).
pub const OP_JR: i32 = 2;

/// Jump and link (`r31 = pc; pc += f3`).
pub const OP_JAL: i32 = 3;

/// Branch if zero.
pub const OP_BEQZ: i32 = 4;

/// Branch if not zero.
pub const OP_BNEZ: i32 = 5;

/// Add immediate.
pub const OP_DADDI: i32 = 8;

/// Multiply.
pub const OP_DMUL: i32 = 12;

/// Divide.
pub const OP_DDIV: i32 = 14;

/// Add.
pub const OP_DADD: i32 = 32;

/// Subtract.
pub const OP_DSUB: i32 = 34;

/// Load word.
pub const OP_LW: i32 = 35;

/// Store word.
pub const OP_SW: i32 = 43;

/// Terminate the context.
pub const OP_FIN: i32 = 63;
