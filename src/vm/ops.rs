//! Opcodes for the sable VM.
//!
//! Code is a flat `Vec<u8>`: one opcode byte followed by a fixed number of
//! operand bytes that depends only on the opcode (see [`Opcode::size`]).
//! Anything that walks an instruction stream must step by `size()`.
//!
//! Operand encoding:
//! - 1 byte: constant index, slot index, name index, argument or handler count
//! - 2 bytes: unsigned big-endian jump distance, relative to the end of the
//!   instruction (`LOOP` jumps backward, every other jump forward)
//! - `SET_HANDLER`: name index followed by a 2-byte jump distance
use strum::{FromRepr, IntoStaticStr};

use super::error::HostFault;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // ========================================
    // Constants & Literals
    // ========================================
    LoadConst,
    Nil,
    True,
    False,

    // ========================================
    // Variables
    // ========================================
    LoadLocal,
    StoreLocal,
    /// Slot holds a capture box; read through it.
    LoadHeap,
    /// Slot holds a capture box; write through it.
    StoreHeap,
    LoadGlobal,
    StoreGlobal,

    // ========================================
    // Stack Manipulation
    // ========================================
    Pop,
    Swap,

    // ========================================
    // Control Flow
    // ========================================
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Return,

    // ========================================
    // Operators
    // ========================================
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
    Gt,
    Not,
    Neg,

    // ========================================
    // Closures
    // ========================================
    MakeClosure,

    // ========================================
    // Effect Handlers
    // ========================================
    SetHandler,
    Do,
    PopHandlers,

    // ========================================
    // Diagnostics
    // ========================================
    /// No-op; its text lives in the chunk's comment table.
    Comment,
}

impl Opcode {
    /// Total instruction size in bytes, opcode included.
    pub const fn size(self) -> usize {
        match self {
            Opcode::Nil
            | Opcode::True
            | Opcode::False
            | Opcode::Pop
            | Opcode::Swap
            | Opcode::Return
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Eq
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Not
            | Opcode::Neg
            | Opcode::Comment => 1,
            Opcode::LoadConst
            | Opcode::LoadLocal
            | Opcode::StoreLocal
            | Opcode::LoadHeap
            | Opcode::StoreHeap
            | Opcode::LoadGlobal
            | Opcode::StoreGlobal
            | Opcode::Call
            | Opcode::MakeClosure
            | Opcode::Do
            | Opcode::PopHandlers => 2,
            Opcode::Jump | Opcode::JumpIfFalse | Opcode::Loop => 3,
            Opcode::SetHandler => 4,
        }
    }

    /// Mnemonic used by the disassembler, e.g. `LOAD_CONST`.
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Heap-indirect counterpart of a direct slot access.
    pub fn promoted(self) -> Option<Opcode> {
        match self {
            Opcode::LoadLocal => Some(Opcode::LoadHeap),
            Opcode::StoreLocal => Some(Opcode::StoreHeap),
            _ => None,
        }
    }
}

/// One decoded instruction: the opcode plus its raw operand bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    operands: [u8; 3],
}

impl Instruction {
    /// First operand byte.
    pub fn byte(&self) -> u8 {
        self.operands[0]
    }

    /// Two-byte big-endian operand starting at the first operand byte.
    pub fn short(&self) -> u16 {
        u16::from_be_bytes([self.operands[0], self.operands[1]])
    }

    /// Two-byte big-endian operand following a one-byte operand (`SET_HANDLER`).
    pub fn trailing_short(&self) -> u16 {
        u16::from_be_bytes([self.operands[1], self.operands[2]])
    }

    /// Offset of the next instruction.
    pub fn next(&self) -> usize {
        self.offset + self.opcode.size()
    }
}

/// Decode the instruction starting at `offset`.
pub fn decode(code: &[u8], offset: usize) -> Result<Instruction, HostFault> {
    let Some(&byte) = code.get(offset) else {
        let len = code.len();
        let message = format!("offset {} past end of code ({} bytes)", offset, len);
        return Err(HostFault::Corrupt(message));
    };
    let Some(opcode) = Opcode::from_repr(byte) else {
        return Err(HostFault::UnknownOpcode { byte, offset });
    };
    let end = offset + opcode.size();
    let Some(raw) = code.get(offset + 1..end) else {
        let mnemonic = opcode.mnemonic();
        let message = format!("truncated {} at offset {}", mnemonic, offset);
        return Err(HostFault::Corrupt(message));
    };
    let mut operands = [0u8; 3];
    operands[..raw.len()].copy_from_slice(raw);
    Ok(Instruction {
        offset,
        opcode,
        operands,
    })
}

/// Iterator over the instructions of a code buffer, stepping by opcode size.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction, HostFault>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        match decode(self.code, self.offset) {
            Ok(instruction) => {
                self.offset = instruction.next();
                Some(Ok(instruction))
            }
            Err(fault) => {
                self.failed = true;
                Some(Err(fault))
            }
        }
    }
}
