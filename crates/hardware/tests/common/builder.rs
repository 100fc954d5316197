use smpsim_core::isa::instruction::Instruction;
use smpsim_core::isa::opcodes::*;

/// Builds a program one instruction at a time.
///
/// Register arguments are register numbers; branch offsets count
/// instructions from the one after the branch.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<Instruction>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, opcode: i32, f1: i32, f2: i32, f3: i32) -> Self {
        self.code.push(Instruction::new(opcode, f1, f2, f3));
        self
    }

    /// `rt = rs + imm`
    pub fn daddi(self, rt: i32, rs: i32, imm: i32) -> Self {
        self.push(OP_DADDI, rs, rt, imm)
    }

    /// `rd = rs + rt`
    pub fn dadd(self, rd: i32, rs: i32, rt: i32) -> Self {
        self.push(OP_DADD, rs, rt, rd)
    }

    /// `rd = rs - rt`
    pub fn dsub(self, rd: i32, rs: i32, rt: i32) -> Self {
        self.push(OP_DSUB, rs, rt, rd)
    }

    /// `rd = rs * rt`
    pub fn dmul(self, rd: i32, rs: i32, rt: i32) -> Self {
        self.push(OP_DMUL, rs, rt, rd)
    }

    /// `rd = rs / rt`
    pub fn ddiv(self, rd: i32, rs: i32, rt: i32) -> Self {
        self.push(OP_DDIV, rs, rt, rd)
    }

    /// `rt = mem[base + offset]`
    pub fn lw(self, rt: i32, offset: i32, base: i32) -> Self {
        self.push(OP_LW, base, rt, offset)
    }

    /// `mem[base + offset] = rt`
    pub fn sw(self, rt: i32, offset: i32, base: i32) -> Self {
        self.push(OP_SW, base, rt, offset)
    }

    pub fn beqz(self, rs: i32, offset: i32) -> Self {
        self.push(OP_BEQZ, rs, 0, offset)
    }

    pub fn bnez(self, rs: i32, offset: i32) -> Self {
        self.push(OP_BNEZ, rs, 0, offset)
    }

    /// `r31 = pc; pc += offset` (byte offset)
    pub fn jal(self, offset: i32) -> Self {
        self.push(OP_JAL, 0, 0, offset)
    }

    pub fn jr(self, rs: i32) -> Self {
        self.push(OP_JR, rs, 0, 0)
    }

    pub fn fin(self) -> Self {
        self.push(OP_FIN, 0, 0, 0)
    }

    /// Counts `reg` down from `iterations` to zero.
    pub fn countdown(self, reg: i32, iterations: i32) -> Self {
        self.daddi(reg, 0, iterations).daddi(reg, reg, -1).bnez(reg, -2)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn build(self) -> Vec<Instruction> {
        self.code
    }

    /// The program as loader text, one record per line.
    pub fn text(&self) -> String {
        self.code.iter().map(|inst| format!("{inst}\n")).collect()
    }
}
