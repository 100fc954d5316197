//! Instruction Decoder.
//!
//! This module turns an instruction record into a structured `Operation`,
//! validating the operation code and every register operand. Immediates are
//! taken as they appear in the record.

use std::fmt;

use thiserror::Error;

use super::instruction::Instruction;
use super::opcodes::{
    OP_BEQZ, OP_BNEZ, OP_DADD, OP_DADDI, OP_DDIV, OP_DMUL, OP_DSUB, OP_FIN, OP_JAL, OP_JR, OP_LW,
    OP_SW,
};
use crate::common::reg::Reg;

/// Reasons a record does not decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The operation code is not part of the instruction set.
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),
    /// A register operand is outside the register file.
    #[error("register operand {0} out of range")]
    BadRegister(i32),
}

/// Three-register arithmetic operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    /// `DADD`
    Add,
    /// `DSUB`
    Sub,
    /// `DMUL`
    Mul,
    /// `DDIV`
    Div,
}

/// A decoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// `pc = rs`
    Jr {
        /// Target register.
        rs: Reg,
    },
    /// `r31 = pc; pc += offset`
    Jal {
        /// Byte offset from the incremented pc.
        offset: i32,
    },
    /// Branch if `rs` is zero (`BEQZ`) or non-zero (`BNEZ`).
    Branch {
        /// Tested register.
        rs: Reg,
        /// `true` for `BEQZ`.
        if_zero: bool,
        /// Offset in instructions from the incremented pc.
        offset: i32,
    },
    /// `rt = rs + imm`
    Daddi {
        /// Source register.
        rs: Reg,
        /// Destination register.
        rt: Reg,
        /// Immediate addend.
        imm: i32,
    },
    /// `rd = rs op rt`
    Alu {
        /// Operation.
        op: AluOp,
        /// First source.
        rs: Reg,
        /// Second source.
        rt: Reg,
        /// Destination.
        rd: Reg,
    },
    /// `rt = mem[base + offset]`
    Lw {
        /// Base register.
        base: Reg,
        /// Destination register.
        rt: Reg,
        /// Byte displacement.
        offset: i32,
    },
    /// `mem[base + offset] = rt`
    Sw {
        /// Base register.
        base: Reg,
        /// Source register.
        rt: Reg,
        /// Byte displacement.
        offset: i32,
    },
    /// Retire the context.
    Fin,
}

fn reg(field: i32) -> Result<Reg, DecodeError> {
    Reg::new(field).ok_or(DecodeError::BadRegister(field))
}

/// Decodes an instruction record.
///
/// # Arguments
///
/// * `inst` - The record fetched from the instruction cache.
///
/// # Returns
///
/// The decoded `Operation`, or the reason the record is not a valid instruction.
pub fn decode(inst: Instruction) -> Result<Operation, DecodeError> {
    let alu = |op| -> Result<Operation, DecodeError> {
        Ok(Operation::Alu {
            op,
            rs: reg(inst.f1())?,
            rt: reg(inst.f2())?,
            rd: reg(inst.f3())?,
        })
    };
    match inst.opcode() {
        OP_JR => Ok(Operation::Jr { rs: reg(inst.f1())? }),
        OP_JAL => Ok(Operation::Jal { offset: inst.f3() }),
        OP_BEQZ | OP_BNEZ => Ok(Operation::Branch {
            rs: reg(inst.f1())?,
            if_zero: inst.opcode() == OP_BEQZ,
            offset: inst.f3(),
        }),
        OP_DADDI => Ok(Operation::Daddi {
            rs: reg(inst.f1())?,
            rt: reg(inst.f2())?,
            imm: inst.f3(),
        }),
        OP_DADD => alu(AluOp::Add),
        OP_DSUB => alu(AluOp::Sub),
        OP_DMUL => alu(AluOp::Mul),
        OP_DDIV => alu(AluOp::Div),
        OP_LW => Ok(Operation::Lw {
            base: reg(inst.f1())?,
            rt: reg(inst.f2())?,
            offset: inst.f3(),
        }),
        OP_SW => Ok(Operation::Sw {
            base: reg(inst.f1())?,
            rt: reg(inst.f2())?,
            offset: inst.f3(),
        }),
        OP_FIN => Ok(Operation::Fin),
        other => Err(DecodeError::UnknownOpcode(other)),
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Jr { rs } => write!(f, "JR {rs}"),
            Self::Jal { offset } => write!(f, "JAL {offset}"),
            Self::Branch {
                rs,
                if_zero,
                offset,
            } => {
                let name = if if_zero { "BEQZ" } else { "BNEZ" };
                write!(f, "{name} {rs}, {offset}")
            }
            Self::Daddi { rs, rt, imm } => write!(f, "DADDI {rt}, {rs}, {imm}"),
            Self::Alu { op, rs, rt, rd } => {
                let name = match op {
                    AluOp::Add => "DADD",
                    AluOp::Sub => "DSUB",
                    AluOp::Mul => "DMUL",
                    AluOp::Div => "DDIV",
                };
                write!(f, "{name} {rd}, {rs}, {rt}")
            }
            Self::Lw { base, rt, offset } => write!(f, "LW {rt}, {offset}({base})"),
            Self::Sw { base, rt, offset } => write!(f, "SW {rt}, {offset}({base})"),
            Self::Fin => write!(f, "FIN"),
        }
    }
}
