//! The tape memory and free-list `run_gnulightning()` manages around the
//! generated code. `bfi.gnulit.c` keeps JIT-allocated pages in a
//! `saved_pointers` array and walks it in `free_saved_memory()` at exit;
//! `JitSession` is that same free-list turned into a drop guard so a
//! failed compile or an early return can never leak the generated code.

use crate::config::RunConfig;

#[cfg(feature = "jit")]
use cranelift_jit::JITModule;

/// Flat tape storage handed to compiled code as a raw base pointer plus a
/// starting offset, mirroring the `(char *, int)` pair `run_gnulightning()`
/// passes its generated function.
pub struct Tape {
    pub cells: Vec<i64>,
    pub zero_index: usize,
}

impl Tape {
    pub fn new(_config: &RunConfig) -> Self {
        let len = crate::config::MIN_ALLOC * 64;
        Tape {
            cells: vec![0; len],
            zero_index: len / 2,
        }
    }

    pub fn base_ptr(&mut self) -> *mut i64 {
        self.cells.as_mut_ptr()
    }
}

/// Owns the JIT module's executable memory for as long as a compiled
/// function may still be called. Dropping it releases the pages, the same
/// role `free_saved_memory()` plays for the GNU Lightning backend.
pub struct JitSession {
    #[cfg(feature = "jit")]
    module: Option<JITModule>,
    #[cfg(not(feature = "jit"))]
    _private: (),
}

impl JitSession {
    #[cfg(feature = "jit")]
    pub(crate) fn new(module: JITModule) -> Self {
        JitSession {
            module: Some(module),
        }
    }

    #[cfg(feature = "jit")]
    pub(crate) fn entry_ptr(&self, id: cranelift_module::FuncId) -> *const u8 {
        self.module
            .as_ref()
            .expect("module freed before entry_ptr")
            .get_finalized_function(id)
    }
}

impl Drop for JitSession {
    fn drop(&mut self) {
        #[cfg(feature = "jit")]
        {
            if let Some(module) = self.module.take() {
                // SAFETY: no compiled function from this module is called
                // after the session is dropped - callers hold the session
                // alive for exactly as long as they hold the function
                // pointer, the same invariant `free_saved_memory()` relies
                // on its caller to respect at exit.
                unsafe {
                    module.free_memory();
                }
            }
        }
    }
}
