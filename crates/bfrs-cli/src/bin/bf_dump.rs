//! Prints the token stream and the optimized IR node list for a source
//! file, for manual inspection - the analogue of `bytecode_dump`, minus
//! the line-number/constant-table bookkeeping a tape language has no use
//! for.

use bfrs::{build, Lexer, Op};
use std::env;
use std::fs;

fn main() {
    let args: Vec<String> = env::args().collect();
    let filename = match args.get(1) {
        Some(f) => f,
        None => {
            println!("usage: bf_dump <source_file>");
            std::process::exit(0);
        }
    };

    let source = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("bf_dump: cannot open {}: {}", filename, e);
            std::process::exit(1);
        }
    };

    let lexer = Lexer::default();
    let tokens = lexer.tokenize(&source);
    let naive = build(&tokens);
    let optimized = bfrs::optimizer::optimize(&naive);

    println!("tokens ({}):", tokens.len());
    for (i, t) in tokens.iter().enumerate() {
        println!("\t{}\t{:?}", i, t);
    }

    println!("\nnaive ir ({} nodes, program_len {}):", naive.len(), naive.program_len);
    dump_nodes(&naive.nodes);

    println!(
        "\noptimized ir ({} nodes, program_len {}):",
        optimized.len(),
        optimized.program_len
    );
    dump_nodes(&optimized.nodes);
}

fn dump_nodes(nodes: &[Op]) {
    for (pc, op) in nodes.iter().enumerate() {
        println!("\t{}\t{:<6}\t{:?}", pc, op.mnemonic(), op);
    }
}
