//! IR node shape: a single tagged enum covering the base opcodes, the
//! optimizer-introduced structured conditionals, and the balanced-loop
//! rewrite forms, so both the interpreter and the JIT back-end match on one
//! exhaustive type.
//!
//! `WHL`/`END` (and `IF`/`ENDIF`) cross-reference each other by index into
//! the flat `Vec<Op>`, not by pointer, the same way `compiler::code` links
//! jump targets by bytecode offset rather than a pointer - see
//! `crate::ir::builder`.

/// One IR node, as enum payloads instead of a single struct with unused
/// slots per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Adjust the data pointer by `count` (may be negative).
    Mov { count: i64 },
    /// `T[offset] += count`.
    Add { count: i64, offset: i64 },
    /// `T[offset] = count` (a literal write, not a delta).
    Set { count: i64, offset: i64 },
    /// `T[off] := c + c2*T[off2] + c3*T[off3]`. `off2`/`count2` or
    /// `off3`/`count3` are zeroed out when unused (`count2 == 0` means "no
    /// off2 term").
    Calc {
        off: i64,
        c: i64,
        off2: i64,
        c2: i64,
        off3: i64,
        c3: i64,
    },
    /// Zero-test loop head; `link` is the index of the matching `End`.
    Whl { offset: i64, link: usize },
    /// Zero-test loop tail; `link` is the index of the matching `Whl`.
    End { offset: i64, link: usize },
    /// Structured conditional introduced by the optimizer for loops proven
    /// to run at most once; `link` points at the matching `EndIf`.
    If { offset: i64, link: usize },
    EndIf { offset: i64, link: usize },
    /// Loop-opener specialization: a balanced, pure-arithmetic "multiply
    /// frame" whose head isn't decremented by exactly one each pass (so it
    /// can't be closed-formed into `Calc`), accumulating into cells whose
    /// prior value isn't known. Closes at the matching `End`.
    Mult { offset: i64, link: usize },
    /// Same shape as `Mult`, but every cell the body touches is statically
    /// known to be zero on entry.
    Cmult { offset: i64, link: usize },
    /// Loop-opener specialization: the head was just set from a literal
    /// constant, so the trip count is known at compile time (informational;
    /// runtime behavior matches `Whl`). Closes at the matching `End`.
    For {
        offset: i64,
        trip_count: i64,
        link: usize,
    },
    /// Print `T[offset]`.
    Prt { offset: i64 },
    /// Print literal byte `count` (post-optimization run of constant
    /// prints, coalesced by the JIT into one `puts` call).
    Chr { count: i64 },
    /// Read one byte into `T[offset]`.
    Inp { offset: i64 },
    /// Print a snapshot of the tape to stderr. Only ever produced when the
    /// lexer was built with `debug_hash` enabled.
    Dump,
    /// Abort with the `STOP` diagnostic.
    Stop,
}

impl Op {
    /// A short mnemonic, used in debug dumps and error diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Mov { .. } => "MOV",
            Op::Add { .. } => "ADD",
            Op::Set { .. } => "SET",
            Op::Calc { .. } => "CALC",
            Op::Whl { .. } => "WHL",
            Op::End { .. } => "END",
            Op::If { .. } => "IF",
            Op::EndIf { .. } => "ENDIF",
            Op::Mult { .. } => "MULT",
            Op::Cmult { .. } => "CMULT",
            Op::For { .. } => "FOR",
            Op::Prt { .. } => "PRT",
            Op::Chr { .. } => "CHR",
            Op::Inp { .. } => "INP",
            Op::Dump => "DUMP",
            Op::Stop => "STOP",
        }
    }
}

/// The flat IR list plus `program_len`, the sum of atomic source commands
/// (`Mov`/`Add` contribute `count`, `Set` contributes 3 since it encodes
/// `[-]`, each I/O/loop-bracket contributes 1).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nodes: Vec<Op>,
    pub program_len: i64,
}

impl Program {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
