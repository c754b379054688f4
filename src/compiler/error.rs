use thiserror::Error;

/// A syntax error with its source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}\n  --> {file}:{line}:{column}")]
pub struct ParseError {
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, file: &str, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            file: file.to_string(),
            line,
            column,
        }
    }
}

/// Failure to turn a syntax tree into bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("line {line}: cannot compile {what}")]
    Unsupported { what: String, line: usize },
    #[error("line {line}: too many {what} in one function (limit {limit})")]
    TooMany {
        what: &'static str,
        limit: usize,
        line: usize,
    },
    #[error("line {line}: cannot resolve '{name}'")]
    Unresolved { name: String, line: usize },
}

impl CompileError {
    pub(crate) fn too_many(what: &'static str, limit: usize, line: u32) -> Self {
        CompileError::TooMany {
            what,
            limit,
            line: line as usize,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CompileError::Unsupported { line, .. }
            | CompileError::TooMany { line, .. }
            | CompileError::Unresolved { line, .. } => *line,
        }
    }
}
