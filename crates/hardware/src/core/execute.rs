//! Instruction execution.
//!
//! Register-transfer semantics shared by both engines and the miss helper.
//! Arithmetic and control flow commit directly into the context; memory
//! instructions are returned as an `Effect` for the caller to run through its
//! cache, so an interrupted access leaves the registers untouched.

use tracing::trace;

use super::context::Context;
use crate::common::addr::{DataAddr, InstructionAddr};
use crate::common::constants::WORD_SIZE;
use crate::common::data::Word;
use crate::common::error::SimError;
use crate::common::reg::Reg;
use crate::isa::decode::{decode, AluOp, Operation};
use crate::isa::instruction::Instruction;

/// What remains to be done after `execute` returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// The instruction committed.
    Done,
    /// Load the word at `addr` into `rt`.
    Load {
        /// Destination register.
        rt: Reg,
        /// Effective address.
        addr: DataAddr,
    },
    /// Store `value` at `addr`.
    Store {
        /// Effective address.
        addr: DataAddr,
        /// Word to write.
        value: Word,
    },
    /// The context executed `FIN`.
    Finish,
}

/// Validates the program counter of `ctx` for the next fetch.
pub fn fetch_address(ctx: &Context) -> Result<InstructionAddr, SimError> {
    InstructionAddr::new(i64::from(ctx.pc)).ok_or(SimError::InvalidProgramCounter {
        context: ctx.id,
        pc: i64::from(ctx.pc),
    })
}

fn effective_address(ctx: &Context, base: Reg, offset: i32) -> Result<DataAddr, SimError> {
    let address = i64::from(ctx.registers.read(base)) + i64::from(offset);
    DataAddr::new(address).ok_or(SimError::AddressOutOfRange {
        context: ctx.id,
        address,
    })
}

/// Executes `inst` on `ctx`, whose pc already points past it.
///
/// # Returns
///
/// The memory effect still to be performed, or `Effect::Done`.
pub fn execute(ctx: &mut Context, inst: Instruction) -> Result<Effect, SimError> {
    let pc = ctx.pc.wrapping_sub(WORD_SIZE);
    let op = decode(inst).map_err(|err| SimError::InvalidInstruction {
        context: ctx.id,
        pc,
        detail: err.to_string(),
    })?;
    trace!(context = ctx.id, pc, "{op}");

    let regs = &mut ctx.registers;
    match op {
        Operation::Jr { rs } => ctx.pc = regs.read(rs) as u32,
        Operation::Jal { offset } => {
            regs.write(Reg::LINK, ctx.pc as Word);
            ctx.pc = ctx.pc.wrapping_add(offset as u32);
        }
        Operation::Branch {
            rs,
            if_zero,
            offset,
        } => {
            if (regs.read(rs) == 0) == if_zero {
                ctx.pc = ctx.pc.wrapping_add(offset.wrapping_mul(WORD_SIZE as i32) as u32);
            }
        }
        Operation::Daddi { rs, rt, imm } => regs.write(rt, regs.read(rs).wrapping_add(imm)),
        Operation::Alu { op, rs, rt, rd } => {
            let (a, b) = (regs.read(rs), regs.read(rt));
            let value = match op {
                AluOp::Add => a.wrapping_add(b),
                AluOp::Sub => a.wrapping_sub(b),
                AluOp::Mul => a.wrapping_mul(b),
                AluOp::Div => {
                    if b == 0 {
                        return Err(SimError::DivideByZero {
                            context: ctx.id,
                            pc,
                        });
                    }
                    a.wrapping_div(b)
                }
            };
            regs.write(rd, value);
        }
        Operation::Lw { base, rt, offset } => {
            return Ok(Effect::Load {
                rt,
                addr: effective_address(ctx, base, offset)?,
            });
        }
        Operation::Sw { base, rt, offset } => {
            return Ok(Effect::Store {
                addr: effective_address(ctx, base, offset)?,
                value: ctx.registers.read(rt),
            });
        }
        Operation::Fin => return Ok(Effect::Finish),
    }
    Ok(Effect::Done)
}
