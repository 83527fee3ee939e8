//! Lexer, optimizing IR, profiling interpreter, and an optional Cranelift
//! JIT for a minimal eight-command tape language. `execute` wires the
//! pieces together as one call, the way a VM's own top-level `execute`
//! entry point exposes its whole pipeline without making callers drive
//! each stage by hand.

pub mod config;
pub mod error;
pub mod interp;
pub mod ir;
#[cfg(feature = "jit")]
pub mod jit;
pub mod lexer;
pub mod optimizer;
pub mod tape;

pub use config::{CellConfig, CellWidth, EofPolicy, RunConfig};
pub use error::{BfError, BfFullError, BfResult};
pub use interp::{Counters, Interpreter, RunReport};
pub use ir::{build, Op, Program};
pub use lexer::Lexer;

/// Run `source` to completion against `input`/`output` under `config`,
/// lexing, building, and - unless `config.optimize` is false - optimizing
/// it first. This is the entry point the CLI binaries call; anything
/// wanting finer control (dumping the IR between stages, swapping in the
/// JIT) drives [`Lexer`], [`ir::build`], [`optimizer::optimize`], and
/// [`Interpreter`] directly instead.
pub fn execute<R: std::io::Read, W: std::io::Write>(
    source: &[u8],
    config: &RunConfig,
    input: R,
    output: W,
) -> BfResult<RunReport> {
    let lexer = Lexer::new(config.debug_hash);
    let tokens = lexer.tokenize(source);
    let naive = ir::build(&tokens);
    let program = if config.optimize {
        optimizer::optimize(&naive)
    } else {
        naive
    };
    Interpreter::new(config).run(&program, input, output)
}
