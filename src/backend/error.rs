// Backend Error Handling

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::types::Type;

/// Position in the original source, carried by every instruction and declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(file: &str, line: u32, column: u32) -> Self {
        SourcePos {
            file: file.to_string(),
            line,
            column,
        }
    }

    pub fn is_known(&self) -> bool {
        !self.file.is_empty() || self.line != 0
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            write!(f, "<unknown>")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    // Resolution errors
    UnknownSymbol(String, SourcePos),
    NotResolvable(String), // control signal for can_resolve callers, never user facing
    CannotResolve(&'static str, Type, SourcePos), // requested domain, declared type, position
    DivisionByZero(SourcePos),
    CircularReference(String),
    BadExpression(String),

    // Declaration and allocation errors
    BadDeclaration(String, SourcePos),
    AllocationConflict(String),

    // Instruction errors
    ArityMismatch(String, usize, usize, SourcePos), // opcode, expected, found, position
    UnknownOpcode(String, SourcePos),
    Unsupported(String),

    // Outer surfaces
    Archive(String),
    Config(String),
    IOError(String),
}

impl BackendError {
    /// Attach a source position to an error that was raised without one
    pub fn at(self, pos: &SourcePos) -> Self {
        match self {
            BackendError::UnknownSymbol(name, p) if !p.is_known() => {
                BackendError::UnknownSymbol(name, pos.clone())
            }
            BackendError::CannotResolve(what, ty, p) if !p.is_known() => {
                BackendError::CannotResolve(what, ty, pos.clone())
            }
            BackendError::DivisionByZero(p) if !p.is_known() => {
                BackendError::DivisionByZero(pos.clone())
            }
            BackendError::BadDeclaration(msg, p) if !p.is_known() => {
                BackendError::BadDeclaration(msg, pos.clone())
            }
            BackendError::ArityMismatch(op, expected, found, p) if !p.is_known() => {
                BackendError::ArityMismatch(op, expected, found, pos.clone())
            }
            BackendError::UnknownOpcode(op, p) if !p.is_known() => {
                BackendError::UnknownOpcode(op, pos.clone())
            }
            // Unbound symbols reaching a constant-only emitter are user errors
            BackendError::NotResolvable(name) => BackendError::UnknownSymbol(
                format!("{} (declared but never defined)", name),
                pos.clone(),
            ),
            other => other,
        }
    }

    pub fn is_not_resolvable(&self) -> bool {
        matches!(self, BackendError::NotResolvable(_))
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendError::UnknownSymbol(name, pos) => {
                write!(f, "{}: unknown symbol '{}'", pos, name)
            }
            BackendError::NotResolvable(name) => {
                write!(f, "symbol '{}' is not yet resolvable", name)
            }
            BackendError::CannotResolve(what, ty, pos) => {
                write!(f, "{}: cannot resolve {} for type {}", pos, what, ty)
            }
            BackendError::DivisionByZero(pos) => {
                write!(f, "{}: division by zero in constant expression", pos)
            }
            BackendError::CircularReference(name) => {
                write!(f, "circular reference through symbol '{}'", name)
            }
            BackendError::BadExpression(msg) => {
                write!(f, "bad expression: {}", msg)
            }
            BackendError::BadDeclaration(msg, pos) => {
                write!(f, "{}: bad declaration: {}", pos, msg)
            }
            BackendError::AllocationConflict(msg) => {
                write!(f, "internal allocation conflict: {}", msg)
            }
            BackendError::ArityMismatch(op, expected, found, pos) => {
                write!(
                    f,
                    "{}: opcode {} takes {} argument(s), found {}",
                    pos, op, expected, found
                )
            }
            BackendError::UnknownOpcode(op, pos) => {
                write!(f, "{}: opcode {} has no translation for this target", pos, op)
            }
            BackendError::Unsupported(msg) => {
                write!(f, "unsupported: {}", msg)
            }
            BackendError::Archive(msg) => {
                write!(f, "archive error: {}", msg)
            }
            BackendError::Config(msg) => {
                write!(f, "configuration error: {}", msg)
            }
            BackendError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IOError(err.to_string())
    }
}
