//! Profiling interpreter: walks the (optimized or naive) IR with an
//! explicit program counter, applying the configured overflow and EOF
//! policy at every write, and accumulating per-opcode counters.
//!
//! Dispatch and the overflow/profile bookkeeping are a direct
//! generalization of `original_source/extras/profilebf.c`'s `run()` -
//! its `switch` over a `char` command becomes a `match` over
//! [`crate::ir::Op`], and its four `profile[cmd*4 + k]` buckets become
//! [`Counters`]'s four named fields, one bucket row per mnemonic.

use crate::config::{EofPolicy, RunConfig, SAFE_CELL_MAX};
use crate::error::{BfError, BfFullError, BfResult};
use crate::ir::node::{Op, Program};
use crate::tape::Tape;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// The four-bucket counter `profilebf.c` keeps per opcode: how many times
/// it ran, how many of those the tested cell was zero, how many it was
/// nonzero, and how many times it triggered an overflow/underflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub total: i64,
    pub zero_path: i64,
    pub nonzero_path: i64,
    pub overflow_incidents: i64,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub profile: BTreeMap<&'static str, Counters>,
    pub tape_min: i64,
    pub tape_max: i64,
    pub final_pointer: i64,
    pub overflows: i64,
    pub underflows: i64,
    pub hard_wrap: bool,
    /// Last thing printed was not a newline.
    pub nonl: bool,
    pub program_len: i64,
}

impl RunReport {
    /// Long-form summary, mirroring `print_summary()`'s default (non
    /// `-q`/`-Q`) output.
    pub fn write_long_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let mut buf = itoa::Buffer::new();

        if self.nonl {
            writeln!(w, "No newline at end of output.")?;
        }
        writeln!(w, "Program size {}", buf.format(self.program_len))?;
        writeln!(
            w,
            "Tape visited: {}..={}",
            self.tape_min, self.tape_max
        )?;
        writeln!(w, "Pointer at: {}", buf.format(self.final_pointer))?;

        if self.overflows != 0 || self.underflows != 0 {
            write!(w, "Range error: value check")?;
            if self.overflows != 0 {
                write!(w, ", overflows: {}", buf.format(self.overflows))?;
            }
            if self.underflows != 0 {
                write!(w, ", underflows: {}", buf.format(self.underflows))?;
            }
            writeln!(w)?;
        } else if self.hard_wrap {
            writeln!(w, "Hard wrapping would occur for this cell width.")?;
        }

        writeln!(w, "Counts:")?;
        for (mnemonic, c) in &self.profile {
            writeln!(
                w,
                "  {:<5} total {:<10} zero {:<10} nonzero {:<10} overflow {:<10}",
                mnemonic,
                buf.format(c.total),
                buf.format(c.zero_path),
                buf.format(c.nonzero_path),
                buf.format(c.overflow_incidents)
            )?;
        }
        Ok(())
    }

    /// Quick-form summary, mirroring `-q`/`-Q`'s single-line-per-metric
    /// output.
    pub fn write_quick_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let mut buf = itoa::Buffer::new();
        if self.tape_min < -16 {
            write!(w, "ERROR ")?;
        }
        writeln!(
            w,
            "len={} min={} max={} ptr={} overflows={} underflows={}",
            buf.format(self.program_len),
            self.tape_min,
            self.tape_max,
            buf.format(self.final_pointer),
            buf.format(self.overflows),
            buf.format(self.underflows)
        )
    }
}

pub struct Interpreter<'a> {
    config: &'a RunConfig,
    tape: Tape,
    profile: BTreeMap<&'static str, Counters>,
    overflows: i64,
    underflows: i64,
    hard_wrap: bool,
    nonl: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Interpreter {
            config,
            tape: Tape::new(),
            profile: BTreeMap::new(),
            overflows: 0,
            underflows: 0,
            hard_wrap: false,
            nonl: false,
        }
    }

    fn bump(&mut self, mnemonic: &'static str) -> &mut Counters {
        self.profile.entry(mnemonic).or_default()
    }

    /// Apply the configured overflow policy to `value`, returning the
    /// wrapped result and whether an overflow/underflow incident fired.
    ///
    /// Under `-p`, `value` can sit more than one span past the physical
    /// bound - `Op::Calc` folds several additions/multiplications into one
    /// closed-form result, so a single wrap can leave the result still out
    /// of range. The un-fused loop this replaces would wrap once per
    /// iteration, so this wraps repeatedly too, counting one incident per
    /// wrap, to stay equivalent to the un-optimized form.
    fn apply_overflow(&mut self, value: i64) -> (i64, bool) {
        let cell = &self.config.cell;
        if self.config.physical_overflow {
            let span = cell.physical_max - cell.physical_min + 1;
            let mut v = value;
            let mut wrapped = false;
            while v > cell.physical_max {
                self.overflows += 1;
                v -= span;
                wrapped = true;
            }
            while v < cell.physical_min {
                self.underflows += 1;
                v += span;
                wrapped = true;
            }
            (v, wrapped)
        } else {
            if value > cell.physical_max || value < cell.physical_min {
                self.hard_wrap = true;
            }
            if value > SAFE_CELL_MAX {
                self.overflows += 1;
                (value - (SAFE_CELL_MAX + 1), true)
            } else if value < -SAFE_CELL_MAX {
                self.underflows += 1;
                (value + SAFE_CELL_MAX + 1, true)
            } else {
                (value, false)
            }
        }
    }

    /// `#`'s handler in `profilebf.c`: an unconditional snapshot to stderr,
    /// not gated by `suppress_io`. With `-a` and an 8-bit cell mask it's a
    /// 16-bytes-per-line hex dump with repeated lines collapsed to `*`;
    /// otherwise a 10-cell decimal strip starting at the lowest visited
    /// address, with `>` marking the current pointer.
    fn write_debug_dump(&mut self) -> BfResult<()> {
        let mut err = std::io::stderr();
        let result = if self.config.all_cells && self.config.cell.cell_mask == 0xFF {
            self.write_hex_dump(&mut err)
        } else {
            self.write_short_dump(&mut err)
        };
        result.map_err(|e| BfFullError::new(BfError::AllocFailure, e.to_string()))
    }

    fn write_short_dump<W: Write>(&mut self, mut w: W) -> std::io::Result<()> {
        let base = self.tape.tape_min;
        let ptr = self.tape.pointer();
        for i in 0..10 {
            let logical = base + i;
            let marker = if logical == ptr { '>' } else { ' ' };
            let v = self.tape.get_at(logical - ptr).unwrap_or(0);
            write!(w, "{marker}{v:<5}")?;
        }
        writeln!(w)
    }

    fn write_hex_dump<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "Debug dump ->")?;
        let cells = self.tape.visited_range();
        let mask = self.config.cell.cell_mask;
        let ptr_index = (self.tape.pointer() - self.tape.tape_min) as usize;

        let mut addr = 0usize;
        let mut last_line: Option<String> = None;
        let mut folded = false;
        for chunk in cells.chunks(16) {
            let mut hex = String::new();
            let mut ascii = String::new();
            for (i, &v) in chunk.iter().enumerate() {
                let byte = (v & mask) as u8;
                if addr + i == ptr_index {
                    hex.push_str(&format!("({byte:02x})"));
                } else {
                    hex.push_str(&format!(" {byte:02x} "));
                }
                ascii.push(if byte.is_ascii_graphic() || byte == b' ' {
                    byte as char
                } else {
                    '.'
                });
            }
            let line = format!("{addr:06x}: {hex:<64} {ascii}");
            if last_line.as_deref() == Some(line.as_str()) {
                if !folded {
                    writeln!(w, "*")?;
                    folded = true;
                }
            } else {
                writeln!(w, "{line}")?;
                folded = false;
            }
            last_line = Some(line);
            addr += chunk.len();
        }
        Ok(())
    }

    pub fn run<R: Read, W: Write>(
        &mut self,
        program: &Program,
        mut input: R,
        mut output: W,
    ) -> BfResult<RunReport> {
        let nodes = &program.nodes;
        let mut pc: usize = 0;

        while pc < nodes.len() {
            match nodes[pc] {
                Op::Mov { count } => {
                    let c = self.bump("MOV");
                    c.total += count.abs();
                    self.tape.move_pointer(count)?;
                    pc += 1;
                }
                Op::Add { count, offset } => {
                    let raw = self.tape.get_at(offset)? + count;
                    let (v, overflowed) = self.apply_overflow(raw);
                    self.tape.set_at(offset, v)?;
                    let c = self.bump("ADD");
                    c.total += count.abs();
                    if overflowed {
                        c.overflow_incidents += 1;
                    }
                    pc += 1;
                }
                Op::Set { count, offset } => {
                    self.tape.set_at(offset, count)?;
                    self.bump("SET").total += 1;
                    pc += 1;
                }
                Op::Calc {
                    off,
                    c,
                    off2,
                    c2,
                    off3,
                    c3,
                } => {
                    let v2 = if c2 != 0 { self.tape.get_at(off2)? } else { 0 };
                    let v3 = if c3 != 0 { self.tape.get_at(off3)? } else { 0 };
                    let (new_val, overflowed) = self.apply_overflow(c + c2 * v2 + c3 * v3);
                    self.tape.set_at(off, new_val)?;
                    let counter = self.bump("CALC");
                    counter.total += 1;
                    if overflowed {
                        counter.overflow_incidents += 1;
                    }
                    pc += 1;
                }
                Op::Whl { offset, link }
                | Op::Mult { offset, link }
                | Op::Cmult { offset, link }
                | Op::For { offset, link, .. } => {
                    let mnemonic = nodes[pc].mnemonic();
                    let v = self.tape.get_at(offset)?;
                    if v == 0 {
                        self.bump(mnemonic).zero_path += 1;
                        pc = link + 1;
                    } else {
                        self.bump(mnemonic).nonzero_path += 1;
                        pc += 1;
                    }
                }
                Op::End { link, .. } => {
                    let v = self.tape.get()?;
                    let c = self.bump("END");
                    if v != 0 {
                        c.nonzero_path += 1;
                        pc = link + 1;
                    } else {
                        c.zero_path += 1;
                        pc += 1;
                    }
                }
                Op::If { offset, link } => {
                    let v = self.tape.get_at(offset)?;
                    if v == 0 {
                        self.bump("IF").zero_path += 1;
                        pc = link + 1;
                    } else {
                        self.bump("IF").nonzero_path += 1;
                        pc += 1;
                    }
                }
                Op::EndIf { .. } => {
                    self.bump("ENDIF").total += 1;
                    pc += 1;
                }
                Op::Prt { offset } => {
                    let v = self.tape.get_at(offset)?;
                    let byte = (v & 0xFF) as u8;
                    if !self.config.suppress_io {
                        output
                            .write_all(&[byte])
                            .map_err(|e| BfFullError::new(BfError::AllocFailure, e.to_string()))?;
                    }
                    self.nonl = byte != b'\n';
                    self.bump("PRT").total += 1;
                    pc += 1;
                }
                Op::Chr { count } => {
                    let byte = (count & 0xFF) as u8;
                    if !self.config.suppress_io {
                        output
                            .write_all(&[byte])
                            .map_err(|e| BfFullError::new(BfError::AllocFailure, e.to_string()))?;
                    }
                    self.nonl = byte != b'\n';
                    self.bump("CHR").total += 1;
                    pc += 1;
                }
                Op::Dump => {
                    self.bump("DUMP").total += 1;
                    self.write_debug_dump()?;
                    pc += 1;
                }
                Op::Inp { offset } => {
                    let c = self.bump("INP");
                    if self.config.suppress_io {
                        self.apply_eof(offset)?;
                        c.zero_path += 1;
                    } else {
                        let mut byte = [0u8; 1];
                        match input.read(&mut byte) {
                            Ok(1) => {
                                self.tape.set_at(offset, byte[0] as i64)?;
                                c.nonzero_path += 1;
                            }
                            _ => {
                                self.apply_eof(offset)?;
                                c.zero_path += 1;
                            }
                        }
                    }
                    pc += 1;
                }
                Op::Stop => {
                    return Err(BfFullError::new(BfError::Stop, ""));
                }
            }
        }

        Ok(RunReport {
            profile: self.profile.clone(),
            tape_min: self.tape.tape_min,
            tape_max: self.tape.tape_max,
            final_pointer: self.tape.pointer(),
            overflows: self.overflows,
            underflows: self.underflows,
            hard_wrap: self.hard_wrap,
            nonl: self.nonl,
            program_len: program.program_len,
        })
    }

    fn apply_eof(&mut self, offset: i64) -> BfResult<()> {
        match self.config.eof {
            EofPolicy::MinusOne => self.tape.set_at(offset, -1)?,
            EofPolicy::Zero => self.tape.set_at(offset, 0)?,
            EofPolicy::Unchanged => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build;
    use crate::lexer::Lexer;
    use crate::optimizer::optimize;

    fn run_str(src: &[u8], config: &RunConfig) -> (Vec<u8>, RunReport) {
        let lex = Lexer::default();
        let program = build(&lex.tokenize(src));
        let mut interp = Interpreter::new(config);
        let mut out = Vec::new();
        let report = interp
            .run(&program, std::io::empty(), &mut out)
            .expect("run should succeed");
        (out, report)
    }

    #[test]
    fn hello_world_prints_expected_byte() {
        let config = RunConfig::default();
        let (out, _) = run_str(b"++++++++[>++++++++<-]>+.", &config);
        assert_eq!(out, vec![65]); // 'A'
    }

    #[test]
    fn optimizer_soundness_matches_naive_output() {
        let src = b">+>++>+>+>+++[>[->+++<<++>]<<]++++++++[>++++++++<-]>+.";
        let lex = Lexer::default();
        let naive = build(&lex.tokenize(src));
        let optimized = optimize(&naive);

        let config = RunConfig::default();
        let mut naive_out = Vec::new();
        Interpreter::new(&config)
            .run(&naive, std::io::empty(), &mut naive_out)
            .unwrap();

        let mut opt_out = Vec::new();
        Interpreter::new(&config)
            .run(&optimized, std::io::empty(), &mut opt_out)
            .unwrap();

        assert_eq!(naive_out, opt_out);
    }

    #[test]
    fn physical_overflow_mode_wraps_instead_of_counting_logical_overflow() {
        let mut config = RunConfig::default();
        config.physical_overflow = true;
        let lex = Lexer::default();
        let program = build(&lex.tokenize(&vec![b'+'; 256]));
        let mut interp = Interpreter::new(&config);
        let mut out = Vec::new();
        let report = interp.run(&program, std::io::empty(), &mut out).unwrap();
        assert_eq!(report.overflows, 1);
    }

    #[test]
    fn eof_policy_minus_one_sets_cell_to_minus_one() {
        let mut config = RunConfig::default();
        config.eof = EofPolicy::MinusOne;
        let (_, report) = run_str(b",", &config);
        assert_eq!(report.profile.get("INP").unwrap().zero_path, 1);
    }

    #[test]
    fn hash_command_dumps_to_stderr_and_does_not_disturb_the_tape() {
        let config = RunConfig::default();
        let lex = Lexer::new(true);
        let program = build(&lex.tokenize(b"+++#."));
        let mut interp = Interpreter::new(&config);
        let mut out = Vec::new();
        let report = interp
            .run(&program, std::io::empty(), &mut out)
            .expect("run should succeed");
        assert_eq!(out, vec![3]);
        assert_eq!(report.profile.get("DUMP").unwrap().total, 1);
    }

    #[test]
    fn hash_command_with_all_cells_and_8_bit_mask_still_runs() {
        let mut config = RunConfig::default();
        config.all_cells = true;
        let lex = Lexer::new(true);
        let program = build(&lex.tokenize(b">++>+++#"));
        let mut interp = Interpreter::new(&config);
        let mut out = Vec::new();
        let report = interp
            .run(&program, std::io::empty(), &mut out)
            .expect("run should succeed");
        assert_eq!(report.profile.get("DUMP").unwrap().total, 1);
    }
}
