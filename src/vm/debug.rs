//! Debug information for mapping bytecode back to source.

use std::collections::BTreeMap;
use std::fmt;

/// Local variable debug information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVarInfo {
    /// Variable name
    pub name: String,
    /// Slot index in the frame
    pub slot: u8,
}

/// Side tables attached to every chunk. None of this is needed to execute
/// the code.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// Source line for every byte of code (operand bytes included).
    pub lines: Vec<u32>,
    /// Names of the frame slots, in slot order.
    pub locals: Vec<LocalVarInfo>,
    /// Text of the `COMMENT` instruction at each offset.
    pub comments: BTreeMap<usize, String>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the line for `size` freshly emitted bytes.
    pub fn add_line(&mut self, line: u32, size: usize) {
        self.lines.extend(std::iter::repeat_n(line, size));
    }

    /// Source line of the byte at `offset` (0 when unknown).
    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn add_local(&mut self, name: impl Into<String>, slot: u8) {
        self.locals.push(LocalVarInfo {
            name: name.into(),
            slot,
        });
    }

    pub fn local_name(&self, slot: u8) -> Option<&str> {
        self.locals
            .iter()
            .find(|l| l.slot == slot)
            .map(|l| l.name.as_str())
    }

    pub fn comment_at(&self, offset: usize) -> Option<&str> {
        self.comments.get(&offset).map(String::as_str)
    }
}

/// One `(function, line)` entry of a call-stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub function: String,
    pub line: u32,
}

impl TraceEntry {
    pub fn new(function: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            line,
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.function, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_table() {
        let mut info = DebugInfo::new();
        info.add_line(1, 2);
        info.add_line(2, 3);
        info.add_line(4, 1);

        assert_eq!(info.line_at(0), 1);
        assert_eq!(info.line_at(1), 1);
        assert_eq!(info.line_at(2), 2);
        assert_eq!(info.line_at(4), 2);
        assert_eq!(info.line_at(5), 4);
        assert_eq!(info.line_at(100), 0);
    }

    #[test]
    fn test_local_var_info() {
        let mut info = DebugInfo::new();
        info.add_local("f", 0);
        info.add_local("x", 1);

        assert_eq!(info.local_name(1), Some("x"));
        assert_eq!(info.local_name(2), None);
    }
}
