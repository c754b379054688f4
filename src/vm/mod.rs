mod chunk;
pub mod debug;
mod effects;
mod error;
pub mod list;
pub mod operators;
pub mod ops;
mod value;
#[allow(clippy::module_inception)]
mod vm;

pub use chunk::{Chunk, Closure, Function};
pub use debug::{DebugInfo, LocalVarInfo, TraceEntry};
pub use error::{Exception, ExceptionKind, HostFault, RuntimeError};
pub use list::{List, ListBuilder};
pub use ops::Opcode;
pub use value::{CaptureBox, Value};
pub use vm::Vm;
