use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::compiler::{CompileError, ParseError};
use crate::config::ConfigError;
use crate::vm::RuntimeError;

/// Anything that can stop a script from running to completion.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Message for the user, with the stack trace of a runtime error.
    pub fn report(&self) -> String {
        match self {
            Error::Runtime(err) => err.report(),
            other => other.to_string(),
        }
    }

    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime(err) => Some(err),
            _ => None,
        }
    }
}
