//! Per-function compilation state.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::error::CompileError;
use crate::vm::debug::DebugInfo;
use crate::vm::ops::{Instructions, Opcode};
use crate::vm::{Chunk, Function, Value};

/// Every index operand is a single byte.
pub const MAX_SLOTS: usize = 256;
pub const MAX_CONSTANTS: usize = 256;
pub const MAX_NAMES: usize = 256;

/// The code buffer, pools and slot map of the function being compiled.
#[derive(Default)]
pub struct FunctionScope {
    name: String,
    arity: usize,
    code: Vec<u8>,
    constants: Vec<Value>,
    names: Vec<String>,
    name_indices: HashMap<String, u8>,
    locals: HashMap<String, u8>,
    slot_count: usize,
    heap_slots: BTreeSet<u8>,
    captures_outer: Vec<u8>,
    captures_inner: Vec<u8>,
    debug: DebugInfo,
    /// Offset of a trailing `NIL` that only stands for a statement result.
    elidable_nil: Option<usize>,
}

impl FunctionScope {
    /// Slot 0 holds the running closure and answers to the function's own
    /// name; parameters follow.
    pub fn new(name: &str, params: &[String], line: u32) -> Result<Self, CompileError> {
        let mut scope = Self {
            name: name.to_string(),
            arity: params.len(),
            ..Self::default()
        };
        scope.declare_local(name, line)?;
        for param in params {
            scope.declare_local(param, line)?;
        }
        Ok(scope)
    }

    pub fn lookup_local(&self, name: &str) -> Option<u8> {
        self.locals.get(name).copied()
    }

    pub fn is_heap(&self, slot: u8) -> bool {
        self.heap_slots.contains(&slot)
    }

    pub fn declare_local(&mut self, name: &str, line: u32) -> Result<u8, CompileError> {
        if self.slot_count >= MAX_SLOTS {
            return Err(CompileError::too_many("locals", MAX_SLOTS, line));
        }
        let slot = self.slot_count as u8;
        self.slot_count += 1;
        self.locals.insert(name.to_string(), slot);
        self.debug.add_local(name, slot);
        Ok(slot)
    }

    /// Allocate a slot that receives the box of `outer_slot` from the
    /// enclosing frame when the closure is created.
    pub fn declare_capture(
        &mut self,
        name: &str,
        outer_slot: u8,
        line: u32,
    ) -> Result<u8, CompileError> {
        let slot = self.declare_local(name, line)?;
        self.heap_slots.insert(slot);
        self.captures_outer.push(outer_slot);
        self.captures_inner.push(slot);
        Ok(slot)
    }

    /// Move `slot` into a capture box. Every direct access to it already
    /// emitted is rewritten to the heap-indirect form.
    pub fn promote(&mut self, slot: u8) {
        if !self.heap_slots.insert(slot) {
            return;
        }
        let rewrites: Vec<(usize, Opcode)> = Instructions::new(&self.code)
            .filter_map(Result::ok)
            .filter(|i| i.byte() == slot)
            .filter_map(|i| i.opcode.promoted().map(|op| (i.offset, op)))
            .collect();
        for &(offset, opcode) in &rewrites {
            self.code[offset] = opcode as u8;
        }
        trace!(
            target: "sable::compiler",
            function = %self.name,
            slot,
            rewritten = rewrites.len(),
            "promoted slot to heap"
        );
    }

    pub fn emit(&mut self, opcode: Opcode, operands: &[u8], line: u32) -> usize {
        debug_assert_eq!(operands.len() + 1, opcode.size());
        let offset = self.code.len();
        self.code.push(opcode as u8);
        self.code.extend_from_slice(operands);
        self.debug.add_line(line, opcode.size());
        self.elidable_nil = None;
        offset
    }

    /// `NIL` standing for the result of a statement-like expression.
    pub fn emit_statement_nil(&mut self, line: u32) {
        let offset = self.emit(Opcode::Nil, &[], line);
        self.elidable_nil = Some(offset);
    }

    /// Throw away the value on top of the stack.
    pub fn discard(&mut self, line: u32) {
        match self.elidable_nil.take() {
            Some(offset) if offset + 1 == self.code.len() => {
                self.code.truncate(offset);
                self.debug.lines.truncate(offset);
            }
            _ => {
                self.emit(Opcode::Pop, &[], line);
            }
        }
    }

    /// Current offset as a jump destination. A trailing `NIL` can no longer be
    /// removed once something may jump past it.
    pub fn label(&mut self) -> usize {
        self.elidable_nil = None;
        self.code.len()
    }

    pub fn emit_jump(&mut self, opcode: Opcode, line: u32) -> usize {
        self.emit(opcode, &[0xff, 0xff], line)
    }

    /// `SET_HANDLER` for the effect name at `effect`; the target is patched
    /// once the `try` body is compiled.
    pub fn emit_set_handler(&mut self, effect: u8, line: u32) -> usize {
        self.emit(Opcode::SetHandler, &[effect, 0xff, 0xff], line)
    }

    /// Point the jump at `at` to the current offset.
    pub fn patch_jump(&mut self, at: usize, line: u32) -> Result<(), CompileError> {
        let distance = self.jump_distance(at + 3, line)?;
        self.code[at + 1..at + 3].copy_from_slice(&distance.to_be_bytes());
        self.elidable_nil = None;
        Ok(())
    }

    /// Point the `SET_HANDLER` at `at` to the current offset.
    pub fn patch_handler(&mut self, at: usize, line: u32) -> Result<(), CompileError> {
        let distance = self.jump_distance(at + 4, line)?;
        self.code[at + 2..at + 4].copy_from_slice(&distance.to_be_bytes());
        self.elidable_nil = None;
        Ok(())
    }

    pub fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), CompileError> {
        let span = self.code.len() + 3 - loop_start;
        let Ok(distance) = u16::try_from(span) else {
            let limit = u16::MAX as usize;
            return Err(CompileError::too_many("bytes in loop body", limit, line));
        };
        self.emit(Opcode::Loop, &distance.to_be_bytes(), line);
        Ok(())
    }

    fn jump_distance(&self, from: usize, line: u32) -> Result<u16, CompileError> {
        let span = self.code.len() - from;
        let Ok(distance) = u16::try_from(span) else {
            let limit = u16::MAX as usize;
            return Err(CompileError::too_many("bytes to jump over", limit, line));
        };
        Ok(distance)
    }

    pub fn add_constant(&mut self, value: Value, line: u32) -> Result<u8, CompileError> {
        let same = |c: &Value| c.is_scalar() && *c == value;
        if value.is_scalar() && let Some(index) = self.constants.iter().position(same) {
            return Ok(index as u8);
        }
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::too_many("constants", MAX_CONSTANTS, line));
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u8)
    }

    pub fn name_index(&mut self, name: &str, line: u32) -> Result<u8, CompileError> {
        if let Some(&index) = self.name_indices.get(name) {
            return Ok(index);
        }
        if self.names.len() >= MAX_NAMES {
            return Err(CompileError::too_many("names", MAX_NAMES, line));
        }
        let index = self.names.len() as u8;
        self.names.push(name.to_string());
        self.name_indices.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn add_comment(&mut self, text: &str, line: u32) {
        let offset = self.emit(Opcode::Comment, &[], line);
        self.debug.comments.insert(offset, text.to_string());
    }

    /// Line of the last emitted byte.
    pub fn last_line(&self) -> Option<u32> {
        self.debug.lines.last().copied()
    }

    pub fn finish(self) -> Function {
        Function {
            name: self.name,
            arity: self.arity,
            locals: self.slot_count,
            chunk: Chunk {
                code: self.code,
                constants: self.constants,
                names: self.names,
                debug: self.debug,
            },
            captures_outer: self.captures_outer,
            captures_inner: self.captures_inner,
            heap_slots: self.heap_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_zero_is_function_name() {
        let scope = FunctionScope::new("f", &["a".to_string()], 1).unwrap();
        assert_eq!(scope.lookup_local("f"), Some(0));
        assert_eq!(scope.lookup_local("a"), Some(1));
    }

    #[test]
    fn test_promote_rewrites_emitted_accesses() {
        let params = ["a".to_string(), "b".to_string()];
        let mut scope = FunctionScope::new("f", &params, 1).unwrap();
        scope.emit(Opcode::LoadLocal, &[1], 1);
        scope.emit(Opcode::LoadLocal, &[2], 1);
        scope.emit(Opcode::StoreLocal, &[1], 2);
        scope.emit(Opcode::LoadConst, &[1], 2);
        scope.promote(1);

        let function = scope.finish();
        let ops: Vec<(Opcode, u8)> = Instructions::new(&function.chunk.code)
            .map(|i| i.map(|i| (i.opcode, i.byte())).unwrap())
            .collect();
        assert_eq!(
            ops,
            vec![
                (Opcode::LoadHeap, 1),
                (Opcode::LoadLocal, 2),
                (Opcode::StoreHeap, 1),
                (Opcode::LoadConst, 1),
            ]
        );
        assert!(function.heap_slots.contains(&1));
    }

    #[test]
    fn test_discard_elides_statement_nil() {
        let mut scope = FunctionScope::default();
        scope.emit(Opcode::True, &[], 1);
        scope.emit_statement_nil(1);
        scope.discard(1);
        assert_eq!(scope.code, vec![Opcode::True as u8]);
        assert_eq!(scope.debug.lines.len(), 1);

        scope.discard(1);
        assert_eq!(scope.code, vec![Opcode::True as u8, Opcode::Pop as u8]);
    }

    #[test]
    fn test_patched_jump_blocks_elision() {
        let mut scope = FunctionScope::default();
        let jump = scope.emit_jump(Opcode::Jump, 1);
        scope.emit_statement_nil(1);
        scope.patch_jump(jump, 1).unwrap();
        scope.discard(1);
        assert_eq!(scope.code.last(), Some(&(Opcode::Pop as u8)));
        assert_eq!(&scope.code[1..3], &[0, 1]);
    }

    #[test]
    fn test_constant_dedup_and_limit() {
        let mut scope = FunctionScope::default();
        assert_eq!(scope.add_constant(Value::Int(7), 1).unwrap(), 0);
        assert_eq!(scope.add_constant(Value::str("x"), 1).unwrap(), 1);
        assert_eq!(scope.add_constant(Value::Int(7), 1).unwrap(), 0);

        for n in 100..354 {
            scope.add_constant(Value::Int(n), 1).unwrap();
        }
        let err = scope.add_constant(Value::Int(-1), 9).unwrap_err();
        assert_eq!(
            err,
            CompileError::TooMany {
                what: "constants",
                limit: 256,
                line: 9,
            }
        );
    }

    #[test]
    fn test_too_many_names() {
        let mut scope = FunctionScope::default();
        for i in 0..MAX_NAMES {
            scope.name_index(&format!("g{}", i), 1).unwrap();
        }
        assert_eq!(scope.name_index("g0", 2).unwrap(), 0);
        let err = scope.name_index("g256", 4).unwrap_err();
        assert_eq!(
            err,
            CompileError::TooMany {
                what: "names",
                limit: 256,
                line: 4,
            }
        );
    }

    #[test]
    fn test_too_many_locals() {
        let mut scope = FunctionScope::default();
        for i in 0..256 {
            scope.declare_local(&format!("v{}", i), 1).unwrap();
        }
        assert!(matches!(
            scope.declare_local("overflow", 3),
            Err(CompileError::TooMany { what: "locals", .. })
        ));
    }
}
