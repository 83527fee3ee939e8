//! Cranelift code generation, one basic block per loop boundary.
//!
//! `run_gnulightning()` walks the `bfi` linked list once, emitting GNU
//! Lightning instructions and pushing/popping a jump-label stack at each
//! `[`/`]`; this does the same walk over [`Program::nodes`] with a stack of
//! Cranelift `Block`s, keyed by the same `link` indices `crate::ir::builder`
//! already computed, so there is no separate bracket-matching pass here.
//!
//! The accumulator cache the C backend keeps in a pinned register
//! (`clean_acc`/`set_acc_offset`) carries over as an SSA value tracked
//! alongside [`crate::jit::AccCache`]: consecutive `Op::Add`/`Op::Set`/
//! `Op::Calc` nodes touching the same offset read and write that one
//! `Value` instead of round-tripping through memory, and `Op::Mov` just
//! re-bases the cached offset (`AccCache::shift`) the way `acc_offset -=
//! n->count` does. The cache can't survive a Cranelift block boundary -
//! `head`'s back-edge from the loop body means a value defined before the
//! loop does not dominate it, and `body` likewise doesn't dominate `tail` -
//! so every loop open/close and every I/O op flushes and invalidates the
//! cache first, same as `bfi.gnulit.c`'s `clean_acc()` calls at `T_WHL`,
//! `T_END`, and `T_PRT`. Masking is deferred the same way: the only place
//! a value is masked down to the configured cell width is the loop-test
//! branch in `head`, mirroring the gated `jit_andi`/`jit_extr_uc` in the
//! original rather than masking after every store.

use cranelift_codegen::ir::{types, AbiParam, Block, InstBuilder, MemFlags, Value};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};

use crate::config::RunConfig;
use crate::error::{BfError, BfFullError, BfResult};
use crate::ir::node::{Op, Program};
use crate::jit::runtime::JitSession;
use crate::jit::AccCache;

/// Build order for a `[...]` region: the block to branch back to on a
/// nonzero re-check, and the block execution continues at once the cell
/// tests zero.
struct LoopFrame {
    head: Block,
    tail: Block,
}

pub(crate) fn compile(
    program: &Program,
    config: &RunConfig,
) -> BfResult<(JitSession, cranelift_module::FuncId)> {
    let mut jit_builder = JITBuilder::new(default_libcall_names()).map_err(|e| {
        BfFullError::new(BfError::AllocFailure, format!("jit builder init: {e}"))
    })?;
    jit_builder.symbol("bfrs_putchar", runtime_putchar as *const u8);
    jit_builder.symbol("bfrs_getchar", runtime_getchar as *const u8);
    let mut module = JITModule::new(jit_builder);

    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::I64)); // tape base pointer
    sig.params.push(AbiParam::new(types::I64)); // tape length
    sig.returns.push(AbiParam::new(types::I64));
    sig.call_conv = CallConv::SystemV;

    let func_id = module
        .declare_function("bfrs_entry", Linkage::Export, &sig)
        .map_err(|e| BfFullError::new(BfError::AllocFailure, format!("declare_function: {e}")))?;

    let mut ctx = Context::new();
    ctx.func.signature = sig;
    let mut fn_ctx = FunctionBuilderContext::new();

    {
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut fn_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let base_ptr = builder.block_params(entry)[0];
        let mut ptr = builder.ins().iconst(types::I64, 0);

        let mask = config.cell.cell_mask;
        let mut frames: Vec<(usize, LoopFrame)> = Vec::new();
        let mut acc_cache = AccCache::Empty;
        let mut acc_value: Option<Value> = None;
        let mut i = 0usize;
        while i < program.nodes.len() {
            let op = program.nodes[i];
            match op {
                Op::Mov { count } => {
                    let delta = builder.ins().iconst(types::I64, count);
                    ptr = builder.ins().iadd(ptr, delta);
                    acc_cache = acc_cache.shift(count);
                }
                Op::Add { count, offset } => {
                    let old = acc_load(
                        &mut builder,
                        base_ptr,
                        ptr,
                        offset,
                        &mut acc_cache,
                        &mut acc_value,
                    );
                    let delta = builder.ins().iconst(types::I64, count);
                    let sum = builder.ins().iadd(old, delta);
                    acc_store(offset, sum, &mut acc_cache, &mut acc_value);
                }
                Op::Set { count, offset } => {
                    let k = builder.ins().iconst(types::I64, count);
                    acc_store(offset, k, &mut acc_cache, &mut acc_value);
                }
                Op::Calc {
                    off,
                    c,
                    off2,
                    c2,
                    off3,
                    c3,
                } => {
                    let mut acc = if c2 != 0 {
                        let v2 = acc_load(
                            &mut builder,
                            base_ptr,
                            ptr,
                            off2,
                            &mut acc_cache,
                            &mut acc_value,
                        );
                        let scaled = builder.ins().imul_imm(v2, c2);
                        builder.ins().iadd_imm(scaled, c)
                    } else {
                        builder.ins().iconst(types::I64, c)
                    };
                    if c3 != 0 {
                        let v3 = acc_load(
                            &mut builder,
                            base_ptr,
                            ptr,
                            off3,
                            &mut acc_cache,
                            &mut acc_value,
                        );
                        let term = builder.ins().imul_imm(v3, c3);
                        acc = builder.ins().iadd(acc, term);
                    }
                    acc_store(off, acc, &mut acc_cache, &mut acc_value);
                }
                Op::Whl { offset, link }
                | Op::If { offset, link }
                | Op::Mult { offset, link }
                | Op::Cmult { offset, link }
                | Op::For { offset, link } => {
                    // Crossing into the loop's blocks: the cache can't
                    // survive the back-edge into `head`, so flush and drop
                    // it here rather than let a stale SSA value leak in.
                    acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);
                    acc_cache = acc_cache.invalidate();
                    acc_value = None;

                    let head = builder.create_block();
                    let body = builder.create_block();
                    let tail = builder.create_block();
                    builder.ins().jump(head, &[]);
                    builder.switch_to_block(head);
                    let addr = cell_addr(&mut builder, base_ptr, ptr, offset);
                    let v = builder.ins().load(types::I64, MemFlags::trusted(), addr, 0);
                    let masked = apply_mask(&mut builder, v, mask);
                    let zero = builder.ins().iconst(types::I64, 0);
                    let is_zero = builder.ins().icmp(
                        cranelift_codegen::ir::condcodes::IntCC::Equal,
                        masked,
                        zero,
                    );
                    builder.ins().brif(is_zero, tail, &[], body, &[]);
                    builder.switch_to_block(body);
                    frames.push((link, LoopFrame { head, tail }));
                    let _ = link;
                }
                Op::End { .. } | Op::EndIf { .. } => {
                    // Same barrier on the way out: whatever the body cached
                    // doesn't dominate `tail`, which is only reached via
                    // `head`'s other edge.
                    acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);
                    acc_cache = acc_cache.invalidate();
                    acc_value = None;

                    let (_, frame) = frames.pop().expect("matching loop-opener");
                    builder.ins().jump(frame.head, &[]);
                    builder.seal_block(frame.head);
                    builder.switch_to_block(frame.tail);
                    builder.seal_block(frame.tail);
                }
                Op::Prt { offset } => {
                    acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);
                    let addr = cell_addr(&mut builder, base_ptr, ptr, offset);
                    let v = builder.ins().load(types::I64, MemFlags::trusted(), addr, 0);
                    call_putchar(&mut module, &mut builder, v);
                    acc_cache = acc_cache.invalidate();
                    acc_value = None;
                }
                Op::Chr { count } => {
                    let v = builder.ins().iconst(types::I64, count);
                    call_putchar(&mut module, &mut builder, v);
                }
                Op::Inp { offset } => {
                    acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);
                    acc_cache = acc_cache.invalidate();
                    acc_value = None;
                    let addr = cell_addr(&mut builder, base_ptr, ptr, offset);
                    let v = call_getchar(&mut module, &mut builder);
                    builder.ins().store(MemFlags::trusted(), v, addr, 0);
                }
                Op::Dump => {
                    // The hex/decimal tape dump is a diagnostic only the
                    // profiling interpreter renders; compiled code skips it
                    // rather than calling back out for a debug side-channel.
                }
                Op::Stop => {
                    acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);
                    acc_cache = acc_cache.invalidate();
                    acc_value = None;
                    let code = builder.ins().iconst(types::I64, 1);
                    builder.ins().return_(&[code]);
                    let unreachable = builder.create_block();
                    builder.switch_to_block(unreachable);
                    builder.seal_block(unreachable);
                }
            }
            i += 1;
        }

        // Anything still cached at the end of the walk (straight-line code
        // falling off the end of the program) must reach memory before the
        // implicit zero-return below.
        acc_flush(&mut builder, base_ptr, ptr, &mut acc_cache, &mut acc_value);

        let zero = builder.ins().iconst(types::I64, 0);
        builder.ins().return_(&[zero]);
        builder.finalize();
    }

    module
        .define_function(func_id, &mut ctx)
        .map_err(|e| BfFullError::new(BfError::AllocFailure, format!("define_function: {e}")))?;
    module.clear_context(&mut ctx);
    module
        .finalize_definitions()
        .map_err(|e| BfFullError::new(BfError::AllocFailure, format!("finalize_definitions: {e}")))?;

    Ok((JitSession::new(module), func_id))
}

fn cell_addr(
    builder: &mut FunctionBuilder,
    base_ptr: Value,
    ptr: Value,
    offset: i64,
) -> Value {
    let cell = builder.ins().iadd_imm(ptr, offset);
    let scaled = builder.ins().imul_imm(cell, 8);
    builder.ins().iadd(base_ptr, scaled)
}

fn apply_mask(builder: &mut FunctionBuilder, v: Value, mask: i64) -> Value {
    builder.ins().band_imm(v, mask)
}

/// Read the cell at `offset`, from the cache if it's already holding that
/// offset, otherwise from memory (which also (re)loads the cache).
fn acc_load(
    builder: &mut FunctionBuilder,
    base_ptr: Value,
    ptr: Value,
    offset: i64,
    cache: &mut AccCache,
    value: &mut Option<Value>,
) -> Value {
    let (next, miss) = cache.load_offset(offset);
    if miss {
        flush_if_dirty(builder, base_ptr, ptr, *cache, *value);
        let addr = cell_addr(builder, base_ptr, ptr, offset);
        let loaded = builder.ins().load(types::I64, MemFlags::trusted(), addr, 0);
        *value = Some(loaded);
    }
    *cache = next;
    value.expect("acc_load always leaves a cached value behind")
}

/// Write `v` to the cell at `offset` through the cache, marking it dirty
/// instead of storing to memory immediately.
fn acc_store(offset: i64, v: Value, cache: &mut AccCache, value: &mut Option<Value>) {
    let (next, _) = cache.set_offset(offset);
    *cache = next;
    *value = Some(v);
}

fn flush_if_dirty(
    builder: &mut FunctionBuilder,
    base_ptr: Value,
    ptr: Value,
    cache: AccCache,
    value: Option<Value>,
) {
    if let (AccCache::Loaded { offset, dirty: true }, Some(v)) = (cache, value) {
        let addr = cell_addr(builder, base_ptr, ptr, offset);
        builder.ins().store(MemFlags::trusted(), v, addr, 0);
    }
}

/// Write back a dirty cached value and mark it clean, without dropping the
/// cache entry - used at the end of the walk, where nothing invalidates it
/// afterwards.
fn acc_flush(
    builder: &mut FunctionBuilder,
    base_ptr: Value,
    ptr: Value,
    cache: &mut AccCache,
    value: &mut Option<Value>,
) {
    flush_if_dirty(builder, base_ptr, ptr, *cache, *value);
    *cache = cache.clean();
}

fn call_putchar(module: &mut JITModule, builder: &mut FunctionBuilder, v: Value) {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::I64));
    sig.call_conv = CallConv::SystemV;
    let callee = module
        .declare_function("bfrs_putchar", Linkage::Import, &sig)
        .expect("declare bfrs_putchar");
    let local = module.declare_func_in_func(callee, builder.func);
    builder.ins().call(local, &[v]);
}

fn call_getchar(module: &mut JITModule, builder: &mut FunctionBuilder) -> Value {
    let mut sig = module.make_signature();
    sig.returns.push(AbiParam::new(types::I64));
    sig.call_conv = CallConv::SystemV;
    let callee = module
        .declare_function("bfrs_getchar", Linkage::Import, &sig)
        .expect("declare bfrs_getchar");
    let local = module.declare_func_in_func(callee, builder.func);
    let call = builder.ins().call(local, &[]);
    builder.inst_results(call)[0]
}

extern "C" fn runtime_putchar(byte: i64) {
    use std::io::Write;
    let b = (byte & 0xff) as u8;
    let _ = std::io::stdout().write_all(&[b]);
}

extern "C" fn runtime_getchar() -> i64 {
    use std::io::Read;
    let mut buf = [0u8; 1];
    match std::io::stdin().read(&mut buf) {
        Ok(1) => buf[0] as i64,
        _ => -1,
    }
}
