use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sable::compiler::{self, DumpOptions};
use sable::{Error, RuntimeConfig, TimingsFormat, Vm};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum TimingsFormatArg {
    #[default]
    Human,
    Json,
}

impl From<TimingsFormatArg> for TimingsFormat {
    fn from(arg: TimingsFormatArg) -> Self {
        match arg {
            TimingsFormatArg::Human => TimingsFormat::Human,
            TimingsFormatArg::Json => TimingsFormat::Json,
        }
    }
}

#[derive(Parser)]
#[command(name = "sable")]
#[command(about = "A small dynamic language with algebraic effects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sable source file
    Run {
        /// The source file to run
        file: PathBuf,

        /// Dump bytecode to stderr, or to a file with --dump-bytecode=path
        #[arg(long, value_name = "FILE", require_equals = true, num_args = 0..=1)]
        dump_bytecode: Option<Option<PathBuf>>,

        /// Print phase timings (human or json format)
        #[arg(
            long,
            value_enum,
            require_equals = true,
            num_args = 0..=1,
            default_missing_value = "human"
        )]
        timings: Option<TimingsFormatArg>,

        /// Runtime config file (defaults to sable.toml next to the script)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Log compiler and VM events to stderr
        #[arg(long)]
        trace: bool,
    },
    /// Print the bytecode of a sable source file without running it
    Disasm {
        /// The source file to disassemble
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            dump_bytecode,
            timings,
            config,
            trace,
        } => run(&file, dump_bytecode, timings, config.as_deref(), trace),
        Commands::Disasm { file } => compiler::disassemble_file(&file).map(|listing| {
            print!("{}", listing);
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e.report());
            ExitCode::FAILURE
        }
    }
}

fn run(
    file: &Path,
    dump_bytecode: Option<Option<PathBuf>>,
    timings: Option<TimingsFormatArg>,
    config_path: Option<&Path>,
    trace: bool,
) -> Result<(), Error> {
    let mut config = match config_path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::discover(file)?,
    };
    config.trace |= trace;
    if config.trace {
        init_tracing();
    }

    let dump = DumpOptions { dump_bytecode };
    let mut vm = Vm::new(config);
    compiler::run_file(file, &mut vm, &dump, timings.map(Into::into))?;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sable=trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
