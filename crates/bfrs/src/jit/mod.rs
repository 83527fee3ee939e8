//! Cranelift JIT backend, standing in for the GNU Lightning backend
//! `original_source/tritium/bfi.gnulit.c` implements. The accumulator-cache
//! state machine ([`AccCache`]) and the `JitSession` resource guard are
//! ported from that file's `acc_loaded`/`acc_offset`/`acc_dirty` globals
//! and its `saved_pointers`/`free_saved_memory` list, respectively; the
//! abstract two-register machine (`REG_P`, `REG_ACC`) is kept as the
//! mental model even though Cranelift's SSA builder doesn't need named
//! registers to implement it.

use crate::config::RunConfig;
use crate::error::{BfError, BfFullError, BfResult};
use crate::ir::node::{Op, Program};

pub mod runtime;

pub use runtime::JitSession;

/// Whether this build was compiled with the `jit` feature.
pub fn is_available() -> bool {
    cfg!(feature = "jit")
}

/// Tracks whether the accumulator register currently mirrors a tape cell,
/// and if so whether it still needs to be written back. 1:1 with
/// `bfi.gnulit.c`'s `acc_loaded`/`acc_offset`/`acc_dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccCache {
    Empty,
    Loaded { offset: i64, dirty: bool },
}

impl AccCache {
    pub fn load_offset(self, offset: i64) -> (Self, bool) {
        match self {
            AccCache::Loaded { offset: o, .. } if o == offset => (self, false),
            _ => (
                AccCache::Loaded {
                    offset,
                    dirty: false,
                },
                true,
            ),
        }
    }

    pub fn set_offset(self, offset: i64) -> (Self, bool) {
        let needs_flush = matches!(self, AccCache::Loaded { offset: o, dirty: true } if o != offset);
        (
            AccCache::Loaded {
                offset,
                dirty: true,
            },
            needs_flush,
        )
    }

    pub fn clean(self) -> Self {
        match self {
            AccCache::Loaded { offset, .. } => AccCache::Loaded {
                offset,
                dirty: false,
            },
            AccCache::Empty => AccCache::Empty,
        }
    }

    pub fn invalidate(self) -> Self {
        AccCache::Empty
    }

    /// Re-base a loaded offset by `-delta` after the data pointer moves by
    /// `delta`, the same adjustment `bfi.gnulit.c`'s `T_MOV` case makes
    /// (`acc_offset -= n->count`) instead of flushing on every pointer move.
    pub fn shift(self, delta: i64) -> Self {
        match self {
            AccCache::Loaded { offset, dirty } => AccCache::Loaded {
                offset: offset - delta,
                dirty,
            },
            AccCache::Empty => AccCache::Empty,
        }
    }

    pub fn is_dirty(self) -> bool {
        matches!(self, AccCache::Loaded { dirty: true, .. })
    }
}

#[cfg(feature = "jit")]
mod compiler;

/// Compiled entry point: runs the program against a live [`runtime::Tape`]
/// and returns its exit code (0 on success, per `failout()`'s diagnostic
/// convention in the original tool).
pub type CompiledFn = unsafe extern "C" fn(*mut i64, i64) -> i64;

pub struct JitBackend {
    #[cfg(feature = "jit")]
    session: Option<JitSession>,
    #[cfg(feature = "jit")]
    func_id: Option<cranelift_module::FuncId>,
}

impl JitBackend {
    pub fn new() -> Self {
        JitBackend {
            #[cfg(feature = "jit")]
            session: None,
            #[cfg(feature = "jit")]
            func_id: None,
        }
    }

    #[cfg(feature = "jit")]
    pub fn compile(&mut self, program: &Program, config: &RunConfig) -> BfResult<()> {
        let (session, func_id) = compiler::compile(program, config)?;
        self.session = Some(session);
        self.func_id = Some(func_id);
        Ok(())
    }

    #[cfg(not(feature = "jit"))]
    pub fn compile(&mut self, _program: &Program, _config: &RunConfig) -> BfResult<()> {
        Err(BfFullError::new(
            BfError::JitUnavailable,
            "built without the `jit` feature",
        ))
    }

    /// The compiled function pointer, valid for as long as `self` lives.
    #[cfg(feature = "jit")]
    pub fn entry(&self) -> Option<CompiledFn> {
        let session = self.session.as_ref()?;
        let id = self.func_id?;
        let ptr = session.entry_ptr(id);
        // SAFETY: `ptr` was finalized by `compile` against the signature
        // `CompiledFn` describes, and `session` outlives every call made
        // through the pointer handed back to the caller.
        Some(unsafe { std::mem::transmute::<*const u8, CompiledFn>(ptr) })
    }

    #[cfg(not(feature = "jit"))]
    pub fn entry(&self) -> Option<CompiledFn> {
        None
    }
}

impl Default for JitBackend {
    fn default() -> Self {
        JitBackend::new()
    }
}

/// True for every IR node the JIT treats as a loop-opener sharing the same
/// flush/mask/branch lowering: `WHL`, `IF`, `MULT`, `CMULT`, and `FOR` all
/// branch on the same tested cell and close at the same matching `END`.
pub fn is_loop_opener(op: &Op) -> bool {
    matches!(
        op,
        Op::Whl { .. } | Op::If { .. } | Op::Mult { .. } | Op::Cmult { .. } | Op::For { .. }
    )
}
