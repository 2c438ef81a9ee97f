use thiserror::Error;

use crate::ir::{Op, Type};

/// Any failure in the compile or execute phase. The first error aborts the
/// current phase; there is no recovery and no error list.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lexical error at line {line}, column {col}: {msg}")]
    Lex { line: usize, col: usize, msg: String },

    #[error("parse error at line {line}, column {col}: got '{found}', expected {expected}")]
    Parse {
        line: usize,
        col: usize,
        found: String,
        expected: String,
    },

    #[error("line {line}: '{name}' is already declared in this scope")]
    DuplicateName { name: String, line: usize },

    #[error("line {line}: '{name}' is not declared")]
    Undeclared { name: String, line: usize },

    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    Incompatible { op: Op, left: Type, right: Type },

    #[error("cannot store a {value} value in a {cell} cell at address {addr}")]
    TypeMismatch {
        addr: usize,
        cell: Type,
        value: &'static str,
    },

    #[error("line {line}: '{name}' takes {expected} arguments, {got} given")]
    ArityMismatch {
        name: String,
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: argument {index} of '{name}' expects {expected}, got {got}")]
    ArgTypeMismatch {
        name: String,
        line: usize,
        index: usize,
        expected: Type,
        got: Type,
    },

    #[error("out of {scope} {ty} addresses")]
    SegmentExhausted { scope: &'static str, ty: Type },

    #[error("read of unbound address {addr}")]
    Unbound { addr: usize },

    #[error("address {addr} lies outside every segment")]
    BadAddress { addr: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("malformed quadruple: {0}")]
    Malformed(&'static str),

    #[error("expression stack underflow")]
    MissingOperand,

    #[error("at instruction {ip}: {source}")]
    Runtime { ip: usize, source: Box<Error> },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed artifact: {0}")]
    Artifact(#[from] serde_json::Error),
}

impl Error {
    /// Tag a fatal with the quadruple index it happened at.
    pub fn at_instruction(self, ip: usize) -> Error {
        Error::Runtime {
            ip,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
