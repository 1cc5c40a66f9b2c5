use serde::Serialize;
use thiserror::Error;

use crate::bytecode::Opcode;

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Error {
    #[error("Lex error at {line}:{column}: {message}")]
    Lex {
        line: u32,
        column: u32,
        message: String,
    },
    #[error("Parse error at {line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },
    /// Compile errors only know the byte range of the offending node.
    #[error("Compile error at {start}..{end}: {message}")]
    Compile {
        start: usize,
        end: usize,
        message: String,
    },
    #[error("Runtime error at pc {pc}: {fault}")]
    Runtime { pc: usize, fault: Fault },
    #[error("Invalid bytecode: {message}")]
    Bytecode { message: String },
}

/// Why an instruction could not complete.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Fault {
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{opcode} expects a number, found {found}")]
    TypeMismatch { opcode: Opcode, found: String },
    #[error("stack underflow in {opcode}")]
    StackUnderflow { opcode: Opcode },
    #[error("missing or malformed operand for {opcode}")]
    BadOperand { opcode: Opcode },
    #[error("step budget of {limit} exhausted")]
    StepBudgetExhausted { limit: u64 },
}

impl Error {
    pub(crate) fn lex(line: u32, column: u32, message: impl Into<String>) -> Self {
        Error::Lex {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn parse(line: u32, column: u32, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Line and column for errors that point into source text.
    pub fn position(&self) -> Option<(u32, u32)> {
        match self {
            Error::Lex { line, column, .. } | Error::Parse { line, column, .. } => {
                Some((*line, *column))
            }
            _ => None,
        }
    }
}
