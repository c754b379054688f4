use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use super::debug::DebugInfo;
use super::value::{CaptureBox, Value};

/// A compiled unit of bytecode.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    /// Global, effect and handler names referenced by operands.
    pub names: Vec<String>,
    pub debug: DebugInfo,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(&self, index: u8) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    pub fn name(&self, index: u8) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// Nested function templates held in the constant pool, in pool order.
    pub fn functions(&self) -> impl Iterator<Item = &Rc<Function>> {
        self.constants.iter().filter_map(|c| match c {
            Value::Function(f) => Some(f),
            _ => None,
        })
    }
}

/// A compiled function template.
///
/// Slot 0 of every frame holds the running closure; parameters follow in
/// slots `1..=arity`.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    /// Slot count, slot 0 included.
    pub locals: usize,
    pub chunk: Chunk,
    /// Slots of the directly enclosing frame whose boxes are captured,
    /// pairwise with `captures_inner`.
    pub captures_outer: Vec<u8>,
    /// Slots of this function's frame that receive the captured boxes.
    pub captures_inner: Vec<u8>,
    /// Slots accessed through a capture box.
    pub heap_slots: BTreeSet<u8>,
}

/// A function paired with the boxes it captured, ordered as
/// `function.captures_inner`.
pub struct Closure {
    pub function: Rc<Function>,
    pub boxes: Vec<CaptureBox>,
}

impl Closure {
    pub fn new(function: Rc<Function>, boxes: Vec<CaptureBox>) -> Self {
        Self { function, boxes }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function.name)
            .field("boxes", &self.boxes.len())
            .finish()
    }
}
