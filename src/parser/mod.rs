use thiserror::Error;

use crate::bytecode::{Opcode, ProgramError};

pub mod parser;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unknown instruction `{name}` at {line}:{col}")]
    UnknownMnemonic { name: String, line: usize, col: usize },

    #[error("Instruction `{opcode}` at {line}:{col} requires an operand")]
    MissingOperand {
        opcode: Opcode,
        line: usize,
        col: usize,
    },

    #[error("Instruction `{opcode}` at {line}:{col} doesn't take an operand")]
    UnexpectedOperand {
        opcode: Opcode,
        line: usize,
        col: usize,
    },

    #[error("Label `{name}` used at {line}:{col} is never defined")]
    UndefinedLabel { name: String, line: usize, col: usize },

    #[error("Label `{name}` at {line}:{col} is the name of an instruction")]
    ReservedLabel { name: String, line: usize, col: usize },

    #[error("Label `{name}` at {line}:{col} is already defined")]
    DuplicateLabel { name: String, line: usize, col: usize },

    #[error("Operand {value} at {line}:{col} doesn't fit instruction `{opcode}`")]
    OperandOutOfRange {
        opcode: Opcode,
        value: i128,
        line: usize,
        col: usize,
    },

    #[error("Expected an instruction or label at {line}:{col}")]
    UnexpectedToken { line: usize, col: usize },

    #[error(transparent)]
    Program(#[from] ProgramError),
}
