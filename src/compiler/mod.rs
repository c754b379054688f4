pub mod ast;
mod codegen;
pub mod dump;
pub mod error;
pub mod lexer;
mod parser;
mod scope;

pub use codegen::{Compiler, SCRIPT_NAME};
pub use dump::format_bytecode;
pub use error::{CompileError, ParseError};
pub use lexer::Lexer;
pub use parser::Parser;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::TimingsFormat;
use crate::error::Error;
use crate::vm::{Function, Value, Vm};

/// Where `--dump-bytecode` output goes: `Some(None)` is stderr.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub dump_bytecode: Option<Option<PathBuf>>,
}

/// Wall-clock time spent in each phase of a run.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    pub parse: Duration,
    pub compile: Duration,
    pub run: Duration,
}

#[derive(Serialize)]
struct TimingsReport {
    parse_ms: f64,
    compile_ms: f64,
    run_ms: f64,
    total_ms: f64,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.parse + self.compile + self.run
    }

    pub fn format(&self, format: TimingsFormat) -> String {
        match format {
            TimingsFormat::Human => {
                let phases = [
                    ("parse:", self.parse),
                    ("compile:", self.compile),
                    ("run:", self.run),
                    ("total:", self.total()),
                ];
                let lines: Vec<String> = phases
                    .iter()
                    .map(|(label, time)| format!("{:<8} {:>10.3}ms", label, millis(*time)))
                    .collect();
                lines.join("\n")
            }
            TimingsFormat::Json => {
                let report = TimingsReport {
                    parse_ms: millis(self.parse),
                    compile_ms: millis(self.compile),
                    run_ms: millis(self.run),
                    total_ms: millis(self.total()),
                };
                serde_json::to_string(&report).unwrap_or_default()
            }
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Lex and parse a whole program.
pub fn parse_source(source: &str, file: &str) -> Result<ast::Block, ParseError> {
    let mut lexer = Lexer::new(file, source);
    let tokens = lexer.scan_tokens()?;
    let mut parser = Parser::new(file, tokens);
    parser.parse()
}

/// Parse and compile a program into its top-level function.
pub fn compile_source(source: &str, file: &str) -> Result<Rc<Function>, Error> {
    let program = parse_source(source, file)?;
    Ok(Compiler::compile_script(&program)?)
}

/// Compile and run `source` on `vm`, returning the value of its last
/// expression. Globals defined by earlier runs stay visible.
pub fn run_source(vm: &mut Vm, source: &str, file: &str) -> Result<Value, Error> {
    let function = compile_source(source, file)?;
    Ok(vm.interpret(function)?)
}

/// Run a script file, honouring the dump and timing options.
pub fn run_file(
    path: &Path,
    vm: &mut Vm,
    dump: &DumpOptions,
    timings_format: Option<TimingsFormat>,
) -> Result<Value, Error> {
    let source = read_source(path)?;
    let file = path.to_string_lossy();
    let mut timings = PhaseTimings::default();

    let start = Instant::now();
    let program = parse_source(&source, &file)?;
    timings.parse = start.elapsed();

    let start = Instant::now();
    let function = Compiler::compile_script(&program)?;
    timings.compile = start.elapsed();

    if let Some(target) = &dump.dump_bytecode {
        let listing = format_bytecode(&function);
        match target {
            Some(out) => fs::write(out, &listing).map_err(|source| Error::io(out, source))?,
            None => eprint!("{}", listing),
        }
    }

    let start = Instant::now();
    let result = vm.interpret(function);
    timings.run = start.elapsed();

    if let Some(format) = timings_format {
        eprintln!("{}", timings.format(format));
    }

    Ok(result?)
}

/// Disassemble a script file without running it.
pub fn disassemble_file(path: &Path) -> Result<String, Error> {
    let source = read_source(path)?;
    let function = compile_source(&source, &path.to_string_lossy())?;
    Ok(format_bytecode(&function))
}

fn read_source(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|source| Error::io(path, source))
}
