//! Error types for the core. No `thiserror`/`anyhow`: a small `Copy` kind
//! plus a message, the same split the VM uses for `LuaError`/`LuaFullError`.

use std::fmt;

/// Lightweight error kind - cheap to pass around, message lives alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BfError {
    /// Tape pointer moved past -1000.
    TapeUnderflow,
    /// The `STOP` opcode ran.
    Stop,
    /// JIT loop stack underflowed at `END`/`ENDIF` - a code-generation bug.
    CodeGenUnderflow,
    /// JIT backend requested but not compiled in.
    JitUnavailable,
    /// Tape growth failed to allocate.
    AllocFailure,
    /// Unsupported cell width requested.
    BadCellWidth,
}

impl fmt::Display for BfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BfError::TapeUnderflow => write!(f, "Tape underflow"),
            BfError::Stop => write!(f, "STOP command executed"),
            BfError::CodeGenUnderflow => write!(f, "Code gen failure: Stack pointer negative"),
            BfError::JitUnavailable => write!(f, "JIT backend is not available"),
            BfError::AllocFailure => write!(f, "memory allocation failure"),
            BfError::BadCellWidth => write!(f, "unsupported cell width"),
        }
    }
}

impl std::error::Error for BfError {}

/// Rich error: kind plus the exact diagnostic string callers should print.
#[derive(Debug, Clone)]
pub struct BfFullError {
    pub kind: BfError,
    pub message: String,
}

impl BfFullError {
    pub fn new(kind: BfError, message: impl Into<String>) -> Self {
        BfFullError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> BfError {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BfFullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for BfFullError {}

pub type BfResult<T> = Result<T, BfFullError>;
