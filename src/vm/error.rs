use std::fmt;

use thiserror::Error;

use super::debug::TraceEntry;

/// Category of a language-level exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum ExceptionKind {
    TypeError,
    UndefinedName,
    Error,
}

/// A language-level exception. The trace grows innermost-first while the
/// exception unwinds the frame stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    pub trace: Vec<TraceEntry>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn undefined_name(name: &str) -> Self {
        Self::new(
            ExceptionKind::UndefinedName,
            format!("undefined name '{}'", name),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, message)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Internal invariant violations. These indicate a defect in the compiler or
/// VM (or a hand-built chunk), never a problem in the user's program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostFault {
    #[error("operand stack of '{function}' not empty at return ({remaining} values left)")]
    UnbalancedStack { function: String, remaining: usize },
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },
    #[error("call depth exceeded {0} frames")]
    FrameOverflow(usize),
    #[error("operand stack exceeded {0} values")]
    StackOverflow(usize),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("corrupt chunk: {0}")]
    Corrupt(String),
}

/// Everything the VM can fail with.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Exception(Exception),
    #[error("unhandled effect '{name}'")]
    UnhandledEffect {
        name: String,
        trace: Vec<TraceEntry>,
    },
    #[error("host fault: {0}")]
    HostFault(#[from] HostFault),
}

impl From<Exception> for RuntimeError {
    fn from(exception: Exception) -> Self {
        RuntimeError::Exception(exception)
    }
}

impl RuntimeError {
    /// Call-stack trace, newest frame first. Host faults carry none.
    pub fn trace(&self) -> &[TraceEntry] {
        match self {
            RuntimeError::Exception(exception) => &exception.trace,
            RuntimeError::UnhandledEffect { trace, .. } => trace,
            RuntimeError::HostFault(_) => &[],
        }
    }

    pub(crate) fn trace_mut(&mut self) -> Option<&mut Vec<TraceEntry>> {
        match self {
            RuntimeError::Exception(exception) => Some(&mut exception.trace),
            RuntimeError::UnhandledEffect { trace, .. } => Some(trace),
            RuntimeError::HostFault(_) => None,
        }
    }

    /// The message followed by one `  at` line per trace entry.
    pub fn report(&self) -> String {
        let mut output = self.to_string();
        for entry in self.trace() {
            output.push_str(&format!("\n  at {}", entry));
        }
        output
    }
}
