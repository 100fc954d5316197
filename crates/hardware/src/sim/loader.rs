//! Program Loader.
//!
//! This module turns program text into instruction memory and contexts. It performs:
//! 1. **Parsing:** One instruction per non-empty line, four whitespace-separated integers.
//! 2. **Packing:** Programs are laid out back to back from the start of
//!    instruction memory, in load order.
//! 3. **Context Creation:** One context per program, numbered in load order, whose
//!    pc is the address of the program's first instruction.

use std::fs;
use std::path::Path;

use crate::common::constants::{
    INSTRUCTIONS_START, INSTRUCTION_BLOCKS, INSTRUCTION_FIELDS, WORDS_PER_BLOCK, WORD_SIZE,
};
use crate::common::error::SimError;
use crate::core::context::Context;
use crate::isa::instruction::Instruction;

/// Loaded programs, ready to build a simulator from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    /// One context per program, in load order.
    pub contexts: Vec<Context>,
    /// Instruction words of all programs, packed from the start of instruction memory.
    pub instructions: Vec<Instruction>,
}

impl Program {
    /// Returns `true` if no program was loaded.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Parses the text of one program.
///
/// # Arguments
///
/// * `source_name` - File name or label used in error messages.
/// * `text` - Program text.
///
/// # Returns
///
/// The instructions in order, or `SimError::MalformedInstruction` for the
/// first line that does not hold exactly four integers.
pub fn parse_program(source_name: &str, text: &str) -> Result<Vec<Instruction>, SimError> {
    let malformed = |line: usize, detail: String| SimError::MalformedInstruction {
        source_name: source_name.to_owned(),
        line,
        detail,
    };
    let mut program = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let fields = raw
            .split_whitespace()
            .map(|field| {
                field
                    .parse::<i32>()
                    .map_err(|_| malformed(line, format!("`{field}` is not an integer")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let fields: [i32; INSTRUCTION_FIELDS] = fields.try_into().map_err(|found: Vec<i32>| {
            malformed(
                line,
                format!("expected {INSTRUCTION_FIELDS} fields, found {}", found.len()),
            )
        })?;
        program.push(Instruction { fields });
    }
    if program.is_empty() {
        return Err(malformed(0, "program has no instructions".to_owned()));
    }
    Ok(program)
}

/// Parses and lays out several programs.
///
/// # Arguments
///
/// * `sources` - `(name, text)` pairs in load order.
///
/// # Returns
///
/// The packed program, or `SimError::ProgramTooLarge` if the programs do not
/// fit in instruction memory together.
pub fn load_programs<N, T>(sources: &[(N, T)]) -> Result<Program, SimError>
where
    N: AsRef<str>,
    T: AsRef<str>,
{
    let mut loaded = Program::default();
    for (id, (name, text)) in sources.iter().enumerate() {
        let code = parse_program(name.as_ref(), text.as_ref())?;
        let pc = INSTRUCTIONS_START + loaded.instructions.len() as u32 * WORD_SIZE;
        loaded.contexts.push(Context::new(id, pc));
        loaded.instructions.extend(code);
    }
    let needed = loaded.instructions.len().div_ceil(WORDS_PER_BLOCK);
    if needed > INSTRUCTION_BLOCKS {
        return Err(SimError::ProgramTooLarge {
            needed,
            available: INSTRUCTION_BLOCKS,
        });
    }
    Ok(loaded)
}

/// Reads and lays out the program files at `paths`, in order.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Program, SimError> {
    let sources = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            fs::read_to_string(path)
                .map(|text| (path.display().to_string(), text))
                .map_err(|source| SimError::Io {
                    path: path.to_path_buf(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    load_programs(&sources)
}
