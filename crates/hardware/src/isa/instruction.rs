//! Instruction records.
//!
//! An instruction is kept as the four integers of its text record and decoded
//! on demand, so instruction memory can hold any record the loader accepts.

use std::fmt;

use serde::Serialize;

use crate::common::constants::INSTRUCTION_FIELDS;

/// One instruction: operation code, two operand fields and an immediate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Instruction {
    /// Raw fields in record order.
    pub fields: [i32; INSTRUCTION_FIELDS],
}

impl Instruction {
    /// Builds an instruction from its four fields.
    pub const fn new(opcode: i32, f1: i32, f2: i32, f3: i32) -> Self {
        Self {
            fields: [opcode, f1, f2, f3],
        }
    }

    /// Operation code (field 0).
    #[inline(always)]
    pub const fn opcode(&self) -> i32 {
        self.fields[0]
    }

    /// First operand field.
    #[inline(always)]
    pub const fn f1(&self) -> i32 {
        self.fields[1]
    }

    /// Second operand field.
    #[inline(always)]
    pub const fn f2(&self) -> i32 {
        self.fields[2]
    }

    /// Immediate field.
    #[inline(always)]
    pub const fn f3(&self) -> i32 {
        self.fields[3]
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [op, a, b, c] = self.fields;
        write!(f, "{op} {a} {b} {c}")
    }
}
