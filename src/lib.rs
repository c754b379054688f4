//! Sable - a small dynamic language with algebraic effects
//!
//! This library provides the sable compiler and virtual machine.

pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod vm;

// Re-export commonly used types
pub use compiler::{compile_source, disassemble_file, run_file, run_source};
pub use config::{RuntimeConfig, TimingsFormat};
pub use error::Error;
pub use vm::{RuntimeError, Value, Vm};
