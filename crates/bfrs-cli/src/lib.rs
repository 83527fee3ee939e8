//! Option parsing and the run loop shared by the `bf` and `bfm` binaries.
//! Hand-rolled, no `clap`, in the style of `luars_interpreter`'s
//! `parse_args`/`Options` - the CLI crate is deliberately the thinnest
//! layer in the workspace, so it stays free of a parsing dependency the
//! core itself has no use for.

use bfrs::{CellConfig, CellWidth, EofPolicy, RunConfig};
use std::env;
use std::fs;
use std::io::{self, Write};

pub const VERSION: &str = "bfrs 0.1 (compatible with profilebf)";

fn print_usage() {
    eprintln!("usage: bf [options] file");
    eprintln!("Available options are:");
    eprintln!("  -sc         signed 8-bit ('signed character') cells");
    eprintln!("  -w          unsigned 16-bit ('WORD') cells instead of 8 bit");
    eprintln!("  -12         12-bit cells instead of 8 bit");
    eprintln!("  -7          7-bit cells instead of 8 bit");
    eprintln!("  -e          EOF sets cell to -1");
    eprintln!("  -z          EOF sets cell to 0");
    eprintln!("  -n          EOF leaves cell unchanged (default)");
    eprintln!("  -p          physical overflow mode (wrap silently)");
    eprintln!("  -N          suppress program output");
    eprintln!("  -d          enable '#' debug dump command");
    eprintln!("  -a          include untouched cells in the dump");
    eprintln!("  -Z          disable the optimizer");
    eprintln!("  -q          quick one-line summary");
    eprintln!("  -Q          quick summary, errors only");
    eprintln!("  --jit       run through the Cranelift JIT");
    eprintln!("  --interp    run through the profiling interpreter (default)");
    eprintln!("  -v          show version information");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Long,
    Quick,
    QuickErrorsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Interp,
    Jit,
}

pub struct Options {
    pub source_file: Option<String>,
    pub config: RunConfig,
    pub summary: SummaryMode,
    pub backend: Backend,
    pub show_version: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            source_file: None,
            config: RunConfig::default(),
            summary: SummaryMode::Long,
            backend: Backend::Interp,
            show_version: false,
        }
    }
}

pub fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-sc" => opts.config.cell = CellConfig::from_width(CellWidth::Signed8),
            "-w" => opts.config.cell = CellConfig::from_width(CellWidth::Unsigned16),
            "-12" => opts.config.cell = CellConfig::from_width(CellWidth::Unsigned12),
            "-7" => opts.config.cell = CellConfig::from_width(CellWidth::Unsigned7),
            "-e" => opts.config.eof = EofPolicy::MinusOne,
            "-z" => opts.config.eof = EofPolicy::Zero,
            "-n" => opts.config.eof = EofPolicy::Unchanged,
            "-p" => opts.config.physical_overflow = true,
            "-N" => opts.config.suppress_io = true,
            "-d" => opts.config.debug_hash = true,
            "-a" => opts.config.all_cells = true,
            "-Z" => opts.config.optimize = false,
            "-q" => opts.summary = SummaryMode::Quick,
            "-Q" => opts.summary = SummaryMode::QuickErrorsOnly,
            "--jit" => opts.backend = Backend::Jit,
            "--interp" => opts.backend = Backend::Interp,
            "-v" => opts.show_version = true,
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("unrecognized option '{}'", arg));
            }
            _ => {
                opts.source_file = Some(args[i].clone());
            }
        }
        i += 1;
    }

    Ok(opts)
}

/// Runs the parsed options to completion and returns the process exit code.
pub fn run(opts: &Options) -> i32 {
    if opts.show_version {
        println!("{}", VERSION);
        if opts.source_file.is_none() {
            return 0;
        }
    }

    let filename = match &opts.source_file {
        Some(f) => f,
        None => {
            print_usage();
            return 1;
        }
    };

    let source = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("bf: cannot open {}: {}", filename, e);
            return 1;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut jit_fallback = false;
    let report = match opts.backend {
        Backend::Interp => bfrs::execute(&source, &opts.config, io::stdin(), &mut out),
        Backend::Jit => match run_jit(&source, &opts.config, &mut out) {
            Err(e) if e.kind() == bfrs::BfError::JitUnavailable => {
                eprintln!("bf: {}; falling back to the interpreter", e);
                jit_fallback = true;
                bfrs::execute(&source, &opts.config, io::stdin(), &mut out)
            }
            other => other,
        },
    };

    let report = match report {
        Ok(r) => r,
        Err(e) => {
            eprintln!("bf: {}", e);
            return 1;
        }
    };

    let _ = out.flush();
    match opts.summary {
        SummaryMode::Long => {
            let _ = report.write_long_summary(io::stderr());
        }
        SummaryMode::Quick => {
            let _ = report.write_quick_summary(io::stderr());
        }
        SummaryMode::QuickErrorsOnly => {
            if report.overflows != 0 || report.underflows != 0 || report.tape_min < -16 {
                let _ = report.write_quick_summary(io::stderr());
            }
        }
    }

    if jit_fallback || report.overflows != 0 || report.underflows != 0 {
        1
    } else {
        0
    }
}

#[cfg(feature = "jit")]
fn run_jit<W: Write>(
    source: &[u8],
    config: &RunConfig,
    output: &mut W,
) -> bfrs::BfResult<bfrs::RunReport> {
    use bfrs::jit::JitBackend;

    let lexer = bfrs::Lexer::new(config.debug_hash);
    let tokens = lexer.tokenize(source);
    let naive = bfrs::build(&tokens);
    let program = if config.optimize {
        bfrs::optimizer::optimize(&naive)
    } else {
        naive
    };

    let mut backend = JitBackend::new();
    backend.compile(&program, config)?;
    let entry = backend.entry().ok_or_else(|| {
        bfrs::BfFullError::new(bfrs::BfError::JitUnavailable, "jit produced no entry point")
    })?;

    let mut tape = bfrs::jit::runtime::Tape::new(config);
    // SAFETY: `entry` was just compiled against exactly this tape layout
    // and signature by `JitBackend::compile`.
    let code = unsafe { entry(tape.base_ptr(), tape.cells.len() as i64) };
    if code != 0 {
        return Err(bfrs::BfFullError::new(
            bfrs::BfError::Stop,
            "jit run exited with a nonzero status",
        ));
    }

    Ok(bfrs::RunReport::default())
}

#[cfg(not(feature = "jit"))]
fn run_jit<W: Write>(
    _source: &[u8],
    _config: &RunConfig,
    _output: &mut W,
) -> bfrs::BfResult<bfrs::RunReport> {
    Err(bfrs::BfFullError::new(
        bfrs::BfError::JitUnavailable,
        "built without the `jit` feature; re-run without --jit",
    ))
}
