//! Bytecode disassembler.
//!
//! Every function gets a `== name ==` header followed by one line per
//! instruction:
//!
//! ```text
//! 0000    1 LOAD_CONST       0 '42'
//! 0002    | STORE_GLOBAL     0 'x'
//! ```
//!
//! Nested functions follow their parent in constant-pool order.

use std::fmt::Write;

use crate::vm::ops::{Instruction, Instructions, Opcode};
use crate::vm::{Chunk, Function};

/// Disassembler for a function and everything nested in it.
pub struct Disassembler {
    output: String,
}

impl Disassembler {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    pub fn disassemble(mut self, function: &Function) -> String {
        self.function(function);
        self.output
    }

    fn function(&mut self, function: &Function) {
        let _ = writeln!(self.output, "== {} ==", function.name);
        let chunk = &function.chunk;
        let mut previous_line = None;
        for instruction in Instructions::new(&chunk.code) {
            match instruction {
                Ok(instruction) => {
                    let line = chunk.debug.line_at(instruction.offset);
                    let line_column = if previous_line == Some(line) {
                        "|".to_string()
                    } else {
                        line.to_string()
                    };
                    previous_line = Some(line);
                    let operands = operands(chunk, &instruction);
                    let text = format!(
                        "{:04} {:>4} {:<16} {}",
                        instruction.offset,
                        line_column,
                        instruction.opcode.mnemonic(),
                        operands
                    );
                    let _ = writeln!(self.output, "{}", text.trim_end());
                }
                Err(fault) => {
                    let _ = writeln!(self.output, "<{}>", fault);
                    break;
                }
            }
        }
        for nested in chunk.functions() {
            self.output.push('\n');
            self.function(nested);
        }
    }
}

impl Default for Disassembler {
    fn default() -> Self {
        Self::new()
    }
}

fn operands(chunk: &Chunk, instruction: &Instruction) -> String {
    let index = instruction.byte();
    match instruction.opcode {
        Opcode::LoadConst | Opcode::MakeClosure => match chunk.constant(index) {
            Some(value) => format!("{} '{}'", index, value),
            None => format!("{} <?>", index),
        },
        Opcode::LoadGlobal | Opcode::StoreGlobal | Opcode::Do => name(chunk, index),
        Opcode::LoadLocal | Opcode::StoreLocal | Opcode::LoadHeap | Opcode::StoreHeap => {
            match chunk.debug.local_name(index) {
                Some(local) => format!("{} ({})", index, local),
                None => index.to_string(),
            }
        }
        Opcode::Call | Opcode::PopHandlers => index.to_string(),
        Opcode::Jump | Opcode::JumpIfFalse => {
            let target = instruction.next() + instruction.short() as usize;
            format!("{} -> {}", instruction.offset, target)
        }
        Opcode::Loop => {
            let distance = instruction.short() as usize;
            let target = instruction.next().saturating_sub(distance);
            format!("{} -> {}", instruction.offset, target)
        }
        Opcode::SetHandler => {
            let target = instruction.next() + instruction.trailing_short() as usize;
            let effect = name(chunk, index);
            format!("{} {} -> {}", effect, instruction.offset, target)
        }
        Opcode::Comment => match chunk.debug.comment_at(instruction.offset) {
            Some(text) => format!("; {}", text),
            None => String::new(),
        },
        _ => String::new(),
    }
}

fn name(chunk: &Chunk, index: u8) -> String {
    match chunk.name(index) {
        Some(name) => format!("{} '{}'", index, name),
        None => format!("{} <?>", index),
    }
}

/// Disassemble `function` and its nested functions.
pub fn format_bytecode(function: &Function) -> String {
    Disassembler::new().disassemble(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;

    fn dump(source: &str) -> String {
        format_bytecode(&compile_source(source, "test.sbl").unwrap())
    }

    #[test]
    fn test_bytecode_simple() {
        let output = dump("x = 42\nprint(x)");
        let expected = "\
== <script> ==
0000    1 LOAD_CONST       0 '42'
0002    | STORE_GLOBAL     0 'x'
0004    2 LOAD_GLOBAL      1 'print'
0006    | LOAD_GLOBAL      0 'x'
0008    | CALL             1
0010    | RETURN
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_bytecode_function() {
        let output = dump("fn add(a, b) {\n  a + b\n}");
        let header = "== <script> ==\n0000    1 MAKE_CLOSURE     0 '<fn add>'\n";
        let nested = "\n\n== add ==\n0000    1 COMMENT          ; add\n";
        assert!(output.starts_with(header));
        assert!(output.contains(nested));
        assert!(output.contains("0001    2 LOAD_LOCAL       1 (a)\n"));
        assert!(output.contains("0003    | LOAD_LOCAL       2 (b)\n"));
    }

    #[test]
    fn test_bytecode_control_flow() {
        let output = dump("i = 0\nwhile i < 3 { i = i + 1 }");
        // the loop body's statement NIL is elided, so LOOP follows STORE_GLOBAL
        assert!(output.contains("0009    | JUMP_IF_FALSE    9 -> 22\n"));
        assert!(output.contains("0019    | LOOP             19 -> 4\n"));
    }

    #[test]
    fn test_captured_slot_renders_heap_access() {
        let output = dump("fn f() { n = 1; fn g() { n }; g() }");
        assert!(output.contains("STORE_HEAP       1 (n)"));
        assert!(output.contains("LOAD_HEAP        1 (n)"));
        assert!(!output.contains("STORE_LOCAL      1 (n)"));
    }

    #[test]
    fn test_set_handler_target() {
        let output = dump("try { do ask() } handle ask(x) { resume(1) }");
        let set_handler = "0002    | SET_HANDLER      0 'ask' 2 -> 11\n";
        assert!(output.contains(set_handler));
        assert!(output.contains("== handle ask =="));
    }

    #[test]
    fn test_disassembly_is_deterministic() {
        let function = compile_source(
            "fn f(x) { y = x; fn g() { y + 1 }; g }\nf(1)()",
            "test.sbl",
        )
        .unwrap();
        assert_eq!(format_bytecode(&function), format_bytecode(&function));
    }

    #[test]
    fn test_corrupt_code_stops_listing() {
        let mut function = Function {
            name: "broken".to_string(),
            ..Function::default()
        };
        function.chunk.code = vec![Opcode::Nil as u8, 0xee];
        function.chunk.debug.add_line(1, 1);
        function.chunk.debug.add_line(1, 1);
        let output = format_bytecode(&function);
        assert!(output.starts_with("== broken ==\n0000    1 NIL\n<"));
    }
}
