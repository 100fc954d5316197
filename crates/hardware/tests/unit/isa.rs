//! # Instruction Set Tests
//!
//! Decoding of every operation code and the register-transfer semantics of
//! each instruction, executed on a bare context.

use pretty_assertions::assert_eq;
use rstest::rstest;

use smpsim_core::common::addr::{DataAddr, InstructionAddr};
use smpsim_core::common::constants::INSTRUCTIONS_START;
use smpsim_core::common::error::SimError;
use smpsim_core::common::reg::Reg;
use smpsim_core::core::execute::{execute, fetch_address, Effect};
use smpsim_core::core::Context;
use smpsim_core::isa::{decode, AluOp, DecodeError, Instruction, Operation};

fn r(index: i32) -> Reg {
    Reg::new(index).unwrap()
}

/// Executes `inst` as the first instruction of a context whose registers
/// are set by `regs`.
fn exec(inst: Instruction, regs: &[(i32, i32)]) -> (Context, Result<Effect, SimError>) {
    let mut ctx = Context::new(0, INSTRUCTIONS_START);
    for &(reg, value) in regs {
        ctx.registers.write(r(reg), value);
    }
    ctx.advance_pc();
    let effect = execute(&mut ctx, inst);
    (ctx, effect)
}

#[rstest]
#[case(Instruction::new(8, 0, 1, 5), Operation::Daddi { rs: r(0), rt: r(1), imm: 5 })]
#[case(Instruction::new(32, 1, 2, 3), Operation::Alu { op: AluOp::Add, rs: r(1), rt: r(2), rd: r(3) })]
#[case(Instruction::new(34, 1, 2, 3), Operation::Alu { op: AluOp::Sub, rs: r(1), rt: r(2), rd: r(3) })]
#[case(Instruction::new(12, 4, 5, 6), Operation::Alu { op: AluOp::Mul, rs: r(4), rt: r(5), rd: r(6) })]
#[case(Instruction::new(14, 4, 5, 6), Operation::Alu { op: AluOp::Div, rs: r(4), rt: r(5), rd: r(6) })]
#[case(Instruction::new(35, 2, 7, 16), Operation::Lw { base: r(2), rt: r(7), offset: 16 })]
#[case(Instruction::new(43, 2, 7, -4), Operation::Sw { base: r(2), rt: r(7), offset: -4 })]
#[case(Instruction::new(4, 9, 0, -3), Operation::Branch { rs: r(9), if_zero: true, offset: -3 })]
#[case(Instruction::new(5, 9, 0, 2), Operation::Branch { rs: r(9), if_zero: false, offset: 2 })]
#[case(Instruction::new(3, 0, 0, 12), Operation::Jal { offset: 12 })]
#[case(Instruction::new(2, 31, 0, 0), Operation::Jr { rs: r(31) })]
#[case(Instruction::new(63, 0, 0, 0), Operation::Fin)]
fn test_decode(#[case] inst: Instruction, #[case] expected: Operation) {
    assert_eq!(decode(inst).unwrap(), expected);
}

#[rstest]
#[case(Instruction::new(1, 0, 0, 0), DecodeError::UnknownOpcode(1))]
#[case(Instruction::new(-8, 0, 0, 0), DecodeError::UnknownOpcode(-8))]
#[case(Instruction::new(8, 32, 1, 0), DecodeError::BadRegister(32))]
#[case(Instruction::new(32, 1, -1, 2), DecodeError::BadRegister(-1))]
fn test_decode_rejects(#[case] inst: Instruction, #[case] expected: DecodeError) {
    assert_eq!(decode(inst).unwrap_err(), expected);
}

#[test]
fn test_daddi_writes_sum() {
    let (ctx, effect) = exec(Instruction::new(8, 0, 1, 5), &[]);
    assert_eq!(effect.unwrap(), Effect::Done);
    assert_eq!(ctx.registers.read(r(1)), 5);
}

#[test]
fn test_register_zero_is_writable() {
    let (ctx, _) = exec(Instruction::new(8, 1, 0, 1), &[(1, 41)]);
    assert_eq!(ctx.registers.read(r(0)), 42);
}

#[rstest]
#[case(32, 7, 3, 10)]
#[case(34, 7, 3, 4)]
#[case(12, 7, -3, -21)]
#[case(14, 7, 2, 3)]
#[case(14, -7, 2, -3)]
#[case(32, i32::MAX, 1, i32::MIN)]
fn test_alu(#[case] opcode: i32, #[case] a: i32, #[case] b: i32, #[case] expected: i32) {
    let (ctx, _) = exec(Instruction::new(opcode, 1, 2, 3), &[(1, a), (2, b)]);
    assert_eq!(ctx.registers.read(r(3)), expected);
}

#[test]
fn test_divide_by_zero_faults() {
    let (_, effect) = exec(Instruction::new(14, 1, 2, 3), &[(1, 5)]);
    assert!(matches!(effect, Err(SimError::DivideByZero { context: 0, .. })));
}

#[test]
fn test_load_and_store_return_effects() {
    let (_, load) = exec(Instruction::new(35, 1, 2, 8), &[(1, 16)]);
    assert_eq!(
        load.unwrap(),
        Effect::Load {
            rt: r(2),
            addr: DataAddr::new(24).unwrap()
        }
    );

    let (ctx, store) = exec(Instruction::new(43, 1, 2, 0), &[(1, 4), (2, 77)]);
    assert_eq!(
        store.unwrap(),
        Effect::Store {
            addr: DataAddr::new(4).unwrap(),
            value: 77
        }
    );
    assert_eq!(ctx.registers.read(r(2)), 77);
}

#[rstest]
#[case(-4)]
#[case(384)]
#[case(100_000)]
fn test_data_address_outside_memory_faults(#[case] address: i32) {
    let (_, effect) = exec(Instruction::new(35, 1, 2, 0), &[(1, address)]);
    assert!(matches!(effect, Err(SimError::AddressOutOfRange { .. })));
}

#[test]
fn test_branches() {
    let taken = exec(Instruction::new(4, 1, 0, 3), &[]).0;
    assert_eq!(taken.pc, INSTRUCTIONS_START + 16);
    let not_taken = exec(Instruction::new(5, 1, 0, 3), &[]).0;
    assert_eq!(not_taken.pc, INSTRUCTIONS_START + 4);
    let backwards = exec(Instruction::new(5, 1, 0, -1), &[(1, 1)]).0;
    assert_eq!(backwards.pc, INSTRUCTIONS_START);
}

#[test]
fn test_jal_and_jr() {
    let (ctx, _) = exec(Instruction::new(3, 0, 0, 8), &[]);
    assert_eq!(ctx.registers.read(Reg::LINK), (INSTRUCTIONS_START + 4) as i32);
    assert_eq!(ctx.pc, INSTRUCTIONS_START + 12);

    let (ctx, _) = exec(Instruction::new(2, 5, 0, 0), &[(5, 400)]);
    assert_eq!(ctx.pc, 400);
}

#[test]
fn test_fin_finishes() {
    let (_, effect) = exec(Instruction::new(63, 0, 0, 0), &[]);
    assert_eq!(effect.unwrap(), Effect::Finish);
}

#[test]
fn test_unknown_opcode_reports_pc() {
    let (_, effect) = exec(Instruction::new(99, 0, 0, 0), &[]);
    assert!(matches!(
        effect,
        Err(SimError::InvalidInstruction { pc, .. }) if pc == INSTRUCTIONS_START
    ));
}

#[rstest]
#[case(INSTRUCTIONS_START + 2)]
#[case(INSTRUCTIONS_START - 4)]
#[case(INSTRUCTIONS_START + 40 * 16)]
fn test_fetch_address_rejects_bad_pc(#[case] pc: u32) {
    let ctx = Context::new(2, pc);
    assert!(matches!(
        fetch_address(&ctx),
        Err(SimError::InvalidProgramCounter { context: 2, .. })
    ));
}

proptest::proptest! {
    #[test]
    fn test_instruction_address_accepts_only_aligned_pcs(pc in -64i64..1200) {
        let valid = (384..384 + 40 * 16).contains(&pc) && pc % 4 == 0;
        proptest::prop_assert_eq!(InstructionAddr::new(pc).is_some(), valid);
    }
}
