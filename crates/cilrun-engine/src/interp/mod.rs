//! The dispatch loop
//!
//! Executes a transformed method's mint stream against a frame. The loop
//! is re-entrant: call opcodes recurse into a new frame; exception
//! handlers and filters re-enter the *same* frame in clause mode. An
//! exception travels as an [`Unwind`] value: raised, matched against
//! clauses by the exception engine, then unwound frame by frame with
//! finally and fault handlers running innermost-first.

pub(crate) mod arith;

use std::rc::Rc;
use std::sync::Arc;

use cilrun_cil::body::ClauseKind;
use tracing::trace;

use crate::context::ThreadContext;
use crate::engine::Engine;
use crate::error::{EngineError, RuntimeExceptionKind};
use crate::frame::{Frame, FrameInfo};
use crate::imethod::{CompiledMethod, DataItem, MethodCode};
use crate::meta::{MethodSignature, MintType};
use crate::mintops::MintOp;
use crate::object::{array_data_offset, ObjRef, HEADER_SIZE, STRING_DATA_OFFSET, WORD};
use crate::slot::{read_mem, vt_align, write_mem, StackSlot};
use crate::transform;

/// An exception in flight.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Unwind {
    /// The exception object.
    pub exc: ObjRef,
    /// Frame owning the matched handler; null while unhandled.
    pub target: *mut Frame,
    /// Handler entry point in the target frame.
    pub handler_ip: u32,
    /// Index of the matched clause in the target frame.
    pub clause_index: u32,
}

impl Unwind {
    pub(crate) fn unhandled(exc: ObjRef) -> Unwind {
        Unwind {
            exc,
            target: core::ptr::null_mut(),
            handler_ip: 0,
            clause_index: 0,
        }
    }
}

/// How a frame (or clause) execution ended.
pub(crate) enum RunOutcome {
    /// `ret` executed; the return value is in the caller's slot.
    Completed,
    /// `endfinally` with an empty chain (clause mode only).
    EndClause,
    /// `endfilter` executed with the given decision value.
    FilterResult(i32),
    /// An exception is unwinding past this frame.
    Unwinding(Unwind),
}

/// Execution mode of one `run` activation.
#[derive(Copy, Clone, PartialEq)]
pub(crate) enum ExecMode {
    /// The method body.
    Body,
    /// A finally/fault/filter/handler range re-entered on an existing
    /// frame.
    Clause,
}

/// Exit of the inner dispatch loop.
enum BlockExit {
    Completed,
    EndClause,
    FilterResult(i32),
    /// Exception raised in this frame; needs a handler search.
    Raise { exc: ObjRef, ip: u32 },
    /// Exception already matched (returned by a callee).
    Unwound { unwind: Unwind, ip: u32 },
}

/// The interpreter bound to one engine and one thread.
pub(crate) struct Interp<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) ctx: Rc<ThreadContext>,
}

/// Map an engine-boundary failure to the managed exception taxonomy.
fn engine_err_kind(e: &EngineError) -> RuntimeExceptionKind {
    match e {
        EngineError::Unsupported(_) => RuntimeExceptionKind::NotSupported,
        EngineError::MissingBody => RuntimeExceptionKind::MissingMethod,
        EngineError::Metadata(_) => RuntimeExceptionKind::TypeLoad,
        _ => RuntimeExceptionKind::ExecutionEngine,
    }
}

/// Aligned value-type bytes a call's arguments occupy in the caller's
/// value-type area.
fn args_vt_bytes(meta: &dyn crate::meta::MetadataProvider, sig: &MethodSignature) -> u32 {
    let mut total = 0;
    for p in &sig.params {
        if p.mint_type(meta) == MintType::Vt {
            let (size, _) = p.size_align(meta);
            total += vt_align(size);
        }
    }
    total
}

impl<'e> Interp<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Interp<'e> {
        Interp {
            engine,
            ctx: ThreadContext::current(),
        }
    }

    /// Invoke `callee` with materialized argument slots. On an unhandled
    /// managed exception the error carries the exception object.
    ///
    /// # Safety
    /// `args` must point at `arg_count` slots valid for the callee's
    /// signature; `retval`, when non-null, must be writable. For
    /// value-type returns, `retval` must hold a pointer to the result
    /// buffer.
    pub(crate) unsafe fn call_managed(
        &self,
        callee: Arc<CompiledMethod>,
        args: *const StackSlot,
        retval: *mut StackSlot,
    ) -> Result<(), Unwind> {
        let rt = self.engine.object_runtime();

        if callee.is_native() {
            return self
                .call_native_method(&callee, args, retval)
                .map_err(Unwind::unhandled);
        }

        if let Err(e) = transform::ensure_transformed(self.engine, &callee) {
            let exc = rt.create_exception(engine_err_kind(&e));
            return Err(Unwind::unhandled(exc));
        }
        let mcode = callee.code().expect("transformed");

        let mark = self.ctx.arena().mark();
        let region = match self.ctx.arena().alloc(mcode.alloca_size) {
            Ok(r) => r,
            Err(kind) => return Err(Unwind::unhandled(rt.create_exception(kind))),
        };
        let frame = Frame::from_region(
            self.ctx.current_frame(),
            callee,
            args,
            retval,
            region,
            mark,
        );
        self.ctx.enter_frame(&frame as *const Frame as *mut Frame);
        let outcome = self.run(&frame, 0, ExecMode::Body, None);
        self.ctx.leave_frame(frame.parent);
        self.ctx.arena().restore(mark);

        match outcome {
            RunOutcome::Completed => Ok(()),
            RunOutcome::Unwinding(u) => Err(u),
            _ => {
                let exc = rt.create_exception(RuntimeExceptionKind::ExecutionEngine);
                Err(Unwind::unhandled(exc))
            }
        }
    }

    /// Route a native or internal-call method through the call bridge.
    unsafe fn call_native_method(
        &self,
        callee: &Arc<CompiledMethod>,
        args: *const StackSlot,
        retval: *mut StackSlot,
    ) -> Result<(), ObjRef> {
        let rt = self.engine.object_runtime();
        let meta = self.engine.metadata();
        let sig = &callee.desc.signature;
        let thunk = match callee.native_entry() {
            Some(t) => t.clone(),
            None => {
                return Err(rt.create_exception(RuntimeExceptionKind::MissingMethod));
            }
        };
        let ret_vt_buf = if sig.ret.mint_type(meta) == MintType::Vt && !retval.is_null() {
            (*retval).as_mut_ptr()
        } else {
            core::ptr::null_mut()
        };
        crate::bridge::call_native(
            &self.ctx,
            meta,
            rt,
            self.ctx.current_frame(),
            &thunk,
            sig,
            args,
            retval,
            ret_vt_buf,
        )
    }

    /// Route a jit-compiled body through the call bridge.
    unsafe fn call_jit_entry(
        &self,
        callee: &Arc<CompiledMethod>,
        thunk: &Arc<dyn crate::bridge::NativeThunk>,
        args: *const StackSlot,
        retval: *mut StackSlot,
    ) -> Result<(), ObjRef> {
        let rt = self.engine.object_runtime();
        let meta = self.engine.metadata();
        let sig = &callee.desc.signature;
        let ret_vt_buf = if sig.ret.mint_type(meta) == MintType::Vt && !retval.is_null() {
            (*retval).as_mut_ptr()
        } else {
            core::ptr::null_mut()
        };
        crate::bridge::call_native(
            &self.ctx,
            meta,
            rt,
            self.ctx.current_frame(),
            thunk,
            sig,
            args,
            retval,
            ret_vt_buf,
        )
    }

    /// Execute a finally/fault/handler range on an existing frame.
    pub(crate) unsafe fn run_clause(
        &self,
        frame: &Frame,
        start_ip: u32,
        push_exc: Option<ObjRef>,
    ) -> RunOutcome {
        self.run(frame, start_ip, ExecMode::Clause, push_exc)
    }

    /// The dispatch loop over one frame.
    ///
    /// # Safety
    /// `frame` must be fully constructed over live arena memory and its
    /// method transformed.
    pub(crate) unsafe fn run(
        &self,
        frame: &Frame,
        start_ip: u32,
        mode: ExecMode,
        push_exc: Option<ObjRef>,
    ) -> RunOutcome {
        let engine = self.engine;
        let rt = engine.object_runtime();
        let meta = engine.metadata();
        let method = frame.imethod.clone();
        let mcode: &MethodCode = method.code().expect("running untransformed method");
        let code: &[u16] = &mcode.code;
        let items: &[DataItem] = &mcode.data_items;
        let tracing_ops = engine.config().trace >= 2;

        let mut ip: usize = start_ip as usize;
        let mut sp: u32 = 0;
        let mut vt_sp: u32 = 0;
        let mut chain: Vec<u32> = Vec::new();

        if let Some(exc) = push_exc {
            *frame.stack_ptr(0) = StackSlot::from_obj(exc);
            sp = 1;
        }

        'frame_loop: loop {
            let exit: BlockExit = 'dispatch: loop {
                if ip >= code.len() {
                    break 'dispatch BlockExit::Raise {
                        exc: rt.create_exception(RuntimeExceptionKind::ExecutionEngine),
                        ip: ip as u32,
                    };
                }
                let opcode_ip = ip;
                let op = match MintOp::from_word(code[ip]) {
                    Some(op) => op,
                    None => {
                        break 'dispatch BlockExit::Raise {
                            exc: rt.create_exception(RuntimeExceptionKind::ExecutionEngine),
                            ip: ip as u32,
                        };
                    }
                };
                if tracing_ops {
                    trace!(target: "cilrun::interp", "IR_{:04x}: {}", opcode_ip, op.name());
                }

                // Operand readers.
                macro_rules! short {
                    ($i:expr) => {
                        code[opcode_ip + $i]
                    };
                }
                macro_rules! read32 {
                    ($i:expr) => {
                        (code[opcode_ip + $i] as u32
                            | ((code[opcode_ip + $i + 1] as u32) << 16)) as i32
                    };
                }
                macro_rules! read64 {
                    ($i:expr) => {
                        (code[opcode_ip + $i] as u64
                            | ((code[opcode_ip + $i + 1] as u64) << 16)
                            | ((code[opcode_ip + $i + 2] as u64) << 32)
                            | ((code[opcode_ip + $i + 3] as u64) << 48))
                            as i64
                    };
                }
                // Stack accessors.
                macro_rules! push_slot {
                    ($v:expr) => {{
                        *frame.stack_ptr(sp) = $v;
                        sp += 1;
                    }};
                }
                macro_rules! pop_slot {
                    () => {{
                        sp -= 1;
                        *frame.stack_ptr(sp)
                    }};
                }
                macro_rules! raise {
                    ($kind:expr) => {
                        break 'dispatch BlockExit::Raise {
                            exc: rt.create_exception($kind),
                            ip: opcode_ip as u32,
                        }
                    };
                }
                macro_rules! raise_obj {
                    ($exc:expr) => {
                        break 'dispatch BlockExit::Raise {
                            exc: $exc,
                            ip: opcode_ip as u32,
                        }
                    };
                }
                macro_rules! null_check {
                    ($addr:expr) => {
                        if $addr == 0 {
                            raise!(RuntimeExceptionKind::NullReference);
                        }
                    };
                }
                macro_rules! branch {
                    () => {{
                        ip = (opcode_ip as i64 + read32!(1) as i64) as usize;
                        continue 'dispatch;
                    }};
                }
                macro_rules! branch_s {
                    () => {{
                        ip = (opcode_ip as i64 + (short!(1) as i16) as i64) as usize;
                        continue 'dispatch;
                    }};
                }
                macro_rules! cond_branch {
                    ($cond:expr) => {{
                        if $cond {
                            ip = (opcode_ip as i64 + read32!(1) as i64) as usize;
                        } else {
                            ip = opcode_ip + 3;
                        }
                        continue 'dispatch;
                    }};
                }
                macro_rules! cond_branch_s {
                    ($cond:expr) => {{
                        if $cond {
                            ip = (opcode_ip as i64 + (short!(1) as i16) as i64) as usize;
                        } else {
                            ip = opcode_ip + 2;
                        }
                        continue 'dispatch;
                    }};
                }
                macro_rules! binop_i4 {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32($f(a, b)));
                    }};
                }
                macro_rules! binop_i8 {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i64($f(a, b)));
                    }};
                }
                macro_rules! binop_r8 {
                    ($f:expr) => {{
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_f64($f(a, b)));
                    }};
                }
                macro_rules! binop_i4_chk {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        match $f(a, b) {
                            Ok(v) => push_slot!(StackSlot::from_i32(v)),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! binop_u4_chk {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        match $f(a, b) {
                            Ok(v) => push_slot!(StackSlot::from_i32(v as i32)),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! binop_i8_chk {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        match $f(a, b) {
                            Ok(v) => push_slot!(StackSlot::from_i64(v)),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! binop_u8_chk {
                    ($f:expr) => {{
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        match $f(a, b) {
                            Ok(v) => push_slot!(StackSlot::from_i64(v as i64)),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! compare {
                    ($pop:ident, $f:expr) => {{
                        let b = pop_slot!().$pop();
                        let a = pop_slot!().$pop();
                        push_slot!(StackSlot::from_i32($f(a, b) as i32));
                    }};
                }
                macro_rules! conv_chk {
                    ($v:expr, $push:expr) => {
                        match $v {
                            Ok(v) => push_slot!($push(v)),
                            Err(kind) => raise!(kind),
                        }
                    };
                }
                macro_rules! seq_point_hooks {
                    () => {{
                        if engine.debug().has_breakpoint(&method, opcode_ip as u32) {
                            if let Some(hook) = engine.debug().hook() {
                                hook.breakpoint(method.handle, opcode_ip as u32);
                            }
                        }
                        if self.ctx.single_step() {
                            if let Some(hook) = engine.debug().hook() {
                                let il = mcode.il_offset_of(opcode_ip as u32);
                                hook.sequence_point(method.handle, il, opcode_ip as u32);
                            }
                        }
                    }};
                }
                macro_rules! interrupt_poll {
                    () => {
                        if let Some(exc) = rt.poll_interrupt() {
                            raise_obj!(exc);
                        }
                    };
                }
                // Callee invocation shared by the call family. Expects the
                // argument slots on top of the stack and the per-argument
                // value-type area already rewound by the arm.
                macro_rules! do_invoke {
                    ($callee:expr, $use_jit:expr) => {{
                        let callee: Arc<CompiledMethod> = $callee;
                        let argc = callee.desc.signature.arg_count() as u32;
                        let ret_mt = callee.desc.signature.ret.mint_type(meta);
                        frame.ip.set(opcode_ip as u32);
                        sp -= argc;
                        let args_base = frame.stack_ptr(sp);
                        // The result slot aliases the first argument slot;
                        // word results are written after the callee consumed
                        // its arguments, but a value-type destination must
                        // travel in a side slot to avoid clobbering arg 0.
                        let mut vt_ret = StackSlot::zero();
                        let retval: *mut StackSlot = match ret_mt {
                            MintType::Void => core::ptr::null_mut(),
                            MintType::Vt => {
                                vt_ret = StackSlot::from_mut_ptr(frame.vt_ptr(vt_sp));
                                &mut vt_ret as *mut StackSlot
                            }
                            _ => frame.stack_ptr(sp),
                        };
                        let jit_thunk = if $use_jit {
                            callee.jit_entry().cloned()
                        } else {
                            None
                        };
                        let result = if let Some(thunk) = jit_thunk {
                            self.call_jit_entry(&callee, &thunk, args_base, retval)
                                .map_err(|exc| BlockExit::Raise {
                                    exc,
                                    ip: opcode_ip as u32,
                                })
                        } else if callee.is_native() {
                            self.call_native_method(&callee, args_base, retval)
                                .map_err(|exc| BlockExit::Raise {
                                    exc,
                                    ip: opcode_ip as u32,
                                })
                        } else {
                            self.call_managed(callee.clone(), args_base, retval)
                                .map_err(|unwind| BlockExit::Unwound {
                                    unwind,
                                    ip: opcode_ip as u32,
                                })
                        };
                        match result {
                            Ok(()) => {}
                            Err(exit) => break 'dispatch exit,
                        }
                        if ret_mt != MintType::Void {
                            if ret_mt == MintType::Vt {
                                *frame.stack_ptr(sp) = vt_ret;
                            }
                            sp += 1;
                        }
                        interrupt_poll!();
                    }};
                }
                macro_rules! ldelem {
                    ($esize:expr, $read:expr) => {{
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &[idx], $esize as u32) {
                            Ok(p) => push_slot!($read(p)),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! stelem {
                    ($esize:expr, $write:expr) => {{
                        let v = pop_slot!();
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &[idx], $esize as u32) {
                            Ok(p) => $write(p, v),
                            Err(kind) => raise!(kind),
                        }
                    }};
                }
                macro_rules! method_item {
                    ($i:expr) => {
                        match &items[short!($i) as usize] {
                            DataItem::Method(m) => m.clone(),
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        }
                    };
                }
                macro_rules! class_item {
                    ($i:expr) => {
                        match &items[short!($i) as usize] {
                            DataItem::Class(c) => *c,
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        }
                    };
                }
                macro_rules! field_item {
                    ($i:expr) => {
                        match &items[short!($i) as usize] {
                            DataItem::Field(f) => *f,
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        }
                    };
                }

                match op {
                    MintOp::Nop => {}

                    // ===== Prologue =====
                    MintOp::InitLocals => {
                        let offset = short!(1) as u32;
                        let size = short!(2) as u32;
                        core::ptr::write_bytes(frame.local_ptr(offset), 0, size as usize);
                    }
                    MintOp::Stinarg => {
                        let src = short!(1) as usize;
                        let dst = frame.local_ptr(short!(2) as u32);
                        let slot = *frame.args.add(src);
                        match MintType::from_code(short!(3)) {
                            Some(MintType::I1) | Some(MintType::U1) => {
                                write_mem::<u8>(dst, slot.raw() as u8)
                            }
                            Some(MintType::I2) | Some(MintType::U2) => {
                                write_mem::<u16>(dst, slot.raw() as u16)
                            }
                            Some(MintType::I4) => write_mem::<u32>(dst, slot.raw() as u32),
                            Some(MintType::R4) => write_mem::<f32>(dst, slot.as_f64() as f32),
                            Some(MintType::I8)
                            | Some(MintType::R8)
                            | Some(MintType::O)
                            | Some(MintType::P) => write_mem::<u64>(dst, slot.raw()),
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        }
                    }
                    MintOp::StinargVt => {
                        let src = short!(1) as usize;
                        let dst = frame.local_ptr(short!(2) as u32);
                        let size = short!(3) as usize;
                        let payload = (*frame.args.add(src)).as_mut_ptr();
                        core::ptr::copy_nonoverlapping(payload, dst, size);
                    }

                    // ===== Constants =====
                    MintOp::LdcI4M1 => push_slot!(StackSlot::from_i32(-1)),
                    MintOp::LdcI4_0 => push_slot!(StackSlot::from_i32(0)),
                    MintOp::LdcI4_1 => push_slot!(StackSlot::from_i32(1)),
                    MintOp::LdcI4_2 => push_slot!(StackSlot::from_i32(2)),
                    MintOp::LdcI4_3 => push_slot!(StackSlot::from_i32(3)),
                    MintOp::LdcI4_4 => push_slot!(StackSlot::from_i32(4)),
                    MintOp::LdcI4_5 => push_slot!(StackSlot::from_i32(5)),
                    MintOp::LdcI4_6 => push_slot!(StackSlot::from_i32(6)),
                    MintOp::LdcI4_7 => push_slot!(StackSlot::from_i32(7)),
                    MintOp::LdcI4_8 => push_slot!(StackSlot::from_i32(8)),
                    MintOp::LdcI4S => push_slot!(StackSlot::from_i32(short!(1) as i16 as i32)),
                    MintOp::LdcI4 => push_slot!(StackSlot::from_i32(read32!(1))),
                    MintOp::LdcI8 => push_slot!(StackSlot::from_i64(read64!(1))),
                    MintOp::LdcR4 => push_slot!(StackSlot::from_f64(
                        f32::from_bits(read32!(1) as u32) as f64
                    )),
                    MintOp::LdcR8 => {
                        push_slot!(StackSlot::from_f64(f64::from_bits(read64!(1) as u64)))
                    }
                    MintOp::Ldnull => push_slot!(StackSlot::from_obj(ObjRef::null())),
                    MintOp::Ldstr => match &items[short!(1) as usize] {
                        DataItem::Str(s) => push_slot!(StackSlot::from_obj(*s)),
                        _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                    },
                    MintOp::Ldftn => {
                        let m = method_item!(1);
                        push_slot!(StackSlot::from_word(engine.ftn_id(&m)));
                    }
                    MintOp::Ldvirtftn => {
                        let m = method_item!(1);
                        let obj = pop_slot!().as_obj();
                        null_check!(obj.addr());
                        match engine
                            .registry()
                            .resolve_virtual(meta, rt, &m, obj.class())
                        {
                            Ok(t) => push_slot!(StackSlot::from_word(engine.ftn_id(&t.method))),
                            Err(_) => raise!(RuntimeExceptionKind::MissingMethod),
                        }
                    }
                    MintOp::Ldtoken => {
                        let word = match &items[short!(1) as usize] {
                            DataItem::Class(c) => c.0 as usize,
                            DataItem::Method(m) => engine.ftn_id(m),
                            DataItem::Field(f) => f.0 as usize,
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        };
                        push_slot!(StackSlot::from_word(word));
                    }

                    // ===== Frame loads =====
                    MintOp::LdlocI1 => {
                        let v = read_mem::<i8>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i32(v as i32));
                    }
                    MintOp::LdlocU1 => {
                        let v = read_mem::<u8>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i32(v as i32));
                    }
                    MintOp::LdlocI2 => {
                        let v = read_mem::<i16>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i32(v as i32));
                    }
                    MintOp::LdlocU2 => {
                        let v = read_mem::<u16>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i32(v as i32));
                    }
                    MintOp::LdlocI4 => {
                        let v = read_mem::<i32>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i32(v));
                    }
                    MintOp::LdlocI8 => {
                        let v = read_mem::<i64>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_i64(v));
                    }
                    MintOp::LdlocR4 => {
                        let v = read_mem::<f32>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_f64(v as f64));
                    }
                    MintOp::LdlocR8 => {
                        let v = read_mem::<f64>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_f64(v));
                    }
                    MintOp::LdlocO | MintOp::LdlocP => {
                        let v = read_mem::<u64>(frame.local_ptr(short!(1) as u32));
                        push_slot!(StackSlot::from_raw(v));
                    }
                    MintOp::LdlocVt => {
                        let size = short!(2) as usize;
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::copy_nonoverlapping(
                            frame.local_ptr(short!(1) as u32),
                            dst,
                            size,
                        );
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size as u32);
                    }
                    MintOp::Ldloca => {
                        push_slot!(StackSlot::from_mut_ptr(frame.local_ptr(short!(1) as u32)))
                    }

                    // ===== Frame stores =====
                    MintOp::StlocI1 => {
                        let v = pop_slot!();
                        write_mem::<u8>(frame.local_ptr(short!(1) as u32), v.raw() as u8);
                    }
                    MintOp::StlocI2 => {
                        let v = pop_slot!();
                        write_mem::<u16>(frame.local_ptr(short!(1) as u32), v.raw() as u16);
                    }
                    MintOp::StlocI4 => {
                        let v = pop_slot!();
                        write_mem::<u32>(frame.local_ptr(short!(1) as u32), v.raw() as u32);
                    }
                    MintOp::StlocI8 | MintOp::StlocR8 | MintOp::StlocO | MintOp::StlocP => {
                        let v = pop_slot!();
                        write_mem::<u64>(frame.local_ptr(short!(1) as u32), v.raw());
                    }
                    MintOp::StlocR4 => {
                        let v = pop_slot!();
                        write_mem::<f32>(frame.local_ptr(short!(1) as u32), v.as_f64() as f32);
                    }
                    MintOp::StlocVt => {
                        let size = short!(2) as usize;
                        let src = pop_slot!().as_mut_ptr();
                        core::ptr::copy_nonoverlapping(
                            src,
                            frame.local_ptr(short!(1) as u32),
                            size,
                        );
                        vt_sp -= vt_align(size as u32);
                    }

                    // ===== Stack manipulation =====
                    MintOp::Dup => {
                        let v = *frame.stack_ptr(sp - 1);
                        push_slot!(v);
                    }
                    MintOp::DupVt => {
                        let size = short!(1) as usize;
                        let src = (*frame.stack_ptr(sp - 1)).as_mut_ptr();
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::copy_nonoverlapping(src, dst, size);
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += size as u32;
                    }
                    MintOp::Pop => sp -= 1,
                    MintOp::PopVt => {
                        sp -= 1;
                        vt_sp -= short!(1) as u32;
                    }

                    // ===== Unconditional control flow =====
                    MintOp::Br => branch!(),
                    MintOp::BrS => branch_s!(),
                    MintOp::Leave | MintOp::LeaveCheck => {
                        if op == MintOp::LeaveCheck {
                            interrupt_poll!();
                        }
                        let target = (opcode_ip as i64 + read32!(1) as i64) as u32;
                        sp = 0;
                        vt_sp = 0;
                        chain.clear();
                        chain.push(target);
                        for clause in mcode.clauses.iter().rev() {
                            if clause.kind == ClauseKind::Finally
                                && clause.covers(opcode_ip as u32)
                                && !clause.covers(target)
                            {
                                chain.push(clause.handler_start);
                            }
                        }
                        ip = chain.pop().expect("leave chain") as usize;
                        continue 'dispatch;
                    }
                    MintOp::Switch => {
                        let v = pop_slot!().as_i32() as u32;
                        let count = read32!(1) as u32;
                        if v < count {
                            let delta = (code[opcode_ip + 3 + 2 * v as usize] as u32
                                | ((code[opcode_ip + 4 + 2 * v as usize] as u32) << 16))
                                as i32;
                            ip = (opcode_ip as i64 + delta as i64) as usize;
                            continue 'dispatch;
                        }
                    }

                    // ===== Conditional branches =====
                    MintOp::BrfalseI4 => cond_branch!(pop_slot!().as_i32() == 0),
                    MintOp::BrfalseI8 => cond_branch!(pop_slot!().as_i64() == 0),
                    MintOp::BrfalseR8 => cond_branch!(pop_slot!().as_f64() == 0.0),
                    MintOp::BrtrueI4 => cond_branch!(pop_slot!().as_i32() != 0),
                    MintOp::BrtrueI8 => cond_branch!(pop_slot!().as_i64() != 0),
                    MintOp::BrtrueR8 => cond_branch!(pop_slot!().as_f64() != 0.0),
                    MintOp::BrfalseI4S => cond_branch_s!(pop_slot!().as_i32() == 0),
                    MintOp::BrfalseI8S => cond_branch_s!(pop_slot!().as_i64() == 0),
                    MintOp::BrfalseR8S => cond_branch_s!(pop_slot!().as_f64() == 0.0),
                    MintOp::BrtrueI4S => cond_branch_s!(pop_slot!().as_i32() != 0),
                    MintOp::BrtrueI8S => cond_branch_s!(pop_slot!().as_i64() != 0),
                    MintOp::BrtrueR8S => cond_branch_s!(pop_slot!().as_f64() != 0.0),
                    MintOp::BeqI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a == b)
                    }
                    MintOp::BeqI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a == b)
                    }
                    MintOp::BeqR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a == b)
                    }
                    MintOp::BgeI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a >= b)
                    }
                    MintOp::BgeI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a >= b)
                    }
                    MintOp::BgeR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a >= b)
                    }
                    MintOp::BgtI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a > b)
                    }
                    MintOp::BgtI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a > b)
                    }
                    MintOp::BgtR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a > b)
                    }
                    MintOp::BleI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a <= b)
                    }
                    MintOp::BleI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a <= b)
                    }
                    MintOp::BleR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a <= b)
                    }
                    MintOp::BltI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a < b)
                    }
                    MintOp::BltI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a < b)
                    }
                    MintOp::BltR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a < b)
                    }
                    MintOp::BneUnI4 => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch!(a != b)
                    }
                    MintOp::BneUnI8 => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch!(a != b)
                    }
                    MintOp::BneUnR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(a != b || a.is_nan() || b.is_nan())
                    }
                    MintOp::BgeUnI4 => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch!(a >= b)
                    }
                    MintOp::BgeUnI8 => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch!(a >= b)
                    }
                    MintOp::BgeUnR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(!(a < b))
                    }
                    MintOp::BgtUnI4 => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch!(a > b)
                    }
                    MintOp::BgtUnI8 => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch!(a > b)
                    }
                    MintOp::BgtUnR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(!(a <= b))
                    }
                    MintOp::BleUnI4 => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch!(a <= b)
                    }
                    MintOp::BleUnI8 => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch!(a <= b)
                    }
                    MintOp::BleUnR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(!(a > b))
                    }
                    MintOp::BltUnI4 => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch!(a < b)
                    }
                    MintOp::BltUnI8 => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch!(a < b)
                    }
                    MintOp::BltUnR8 => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch!(!(a >= b))
                    }
                    MintOp::BeqI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a == b)
                    }
                    MintOp::BeqI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a == b)
                    }
                    MintOp::BeqR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a == b)
                    }
                    MintOp::BgeI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a >= b)
                    }
                    MintOp::BgeI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a >= b)
                    }
                    MintOp::BgeR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a >= b)
                    }
                    MintOp::BgtI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a > b)
                    }
                    MintOp::BgtI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a > b)
                    }
                    MintOp::BgtR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a > b)
                    }
                    MintOp::BleI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a <= b)
                    }
                    MintOp::BleI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a <= b)
                    }
                    MintOp::BleR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a <= b)
                    }
                    MintOp::BltI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a < b)
                    }
                    MintOp::BltI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a < b)
                    }
                    MintOp::BltR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a < b)
                    }
                    MintOp::BneUnI4S => {
                        let b = pop_slot!().as_i32();
                        let a = pop_slot!().as_i32();
                        cond_branch_s!(a != b)
                    }
                    MintOp::BneUnI8S => {
                        let b = pop_slot!().as_i64();
                        let a = pop_slot!().as_i64();
                        cond_branch_s!(a != b)
                    }
                    MintOp::BneUnR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(a != b || a.is_nan() || b.is_nan())
                    }
                    MintOp::BgeUnI4S => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch_s!(a >= b)
                    }
                    MintOp::BgeUnI8S => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch_s!(a >= b)
                    }
                    MintOp::BgeUnR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(!(a < b))
                    }
                    MintOp::BgtUnI4S => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch_s!(a > b)
                    }
                    MintOp::BgtUnI8S => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch_s!(a > b)
                    }
                    MintOp::BgtUnR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(!(a <= b))
                    }
                    MintOp::BleUnI4S => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch_s!(a <= b)
                    }
                    MintOp::BleUnI8S => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch_s!(a <= b)
                    }
                    MintOp::BleUnR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(!(a > b))
                    }
                    MintOp::BltUnI4S => {
                        let b = pop_slot!().as_i32() as u32;
                        let a = pop_slot!().as_i32() as u32;
                        cond_branch_s!(a < b)
                    }
                    MintOp::BltUnI8S => {
                        let b = pop_slot!().as_i64() as u64;
                        let a = pop_slot!().as_i64() as u64;
                        cond_branch_s!(a < b)
                    }
                    MintOp::BltUnR8S => {
                        let b = pop_slot!().as_f64();
                        let a = pop_slot!().as_f64();
                        cond_branch_s!(!(a >= b))
                    }

                    // ===== Integer arithmetic =====
                    MintOp::AddI4 => binop_i4!(i32::wrapping_add),
                    MintOp::SubI4 => binop_i4!(i32::wrapping_sub),
                    MintOp::MulI4 => binop_i4!(i32::wrapping_mul),
                    MintOp::DivI4 => binop_i4_chk!(arith::div_i32),
                    MintOp::DivUnI4 => binop_u4_chk!(arith::div_u32),
                    MintOp::RemI4 => binop_i4_chk!(arith::rem_i32),
                    MintOp::RemUnI4 => binop_u4_chk!(arith::rem_u32),
                    MintOp::AndI4 => binop_i4!(|a, b| a & b),
                    MintOp::OrI4 => binop_i4!(|a: i32, b: i32| a | b),
                    MintOp::XorI4 => binop_i4!(|a: i32, b: i32| a ^ b),
                    MintOp::ShlI4 => binop_i4!(|a: i32, b: i32| a << arith::mask_shift_32(b)),
                    MintOp::ShrI4 => binop_i4!(|a: i32, b: i32| a >> arith::mask_shift_32(b)),
                    MintOp::ShrUnI4 => {
                        binop_i4!(|a: i32, b: i32| ((a as u32) >> arith::mask_shift_32(b)) as i32)
                    }
                    MintOp::AddI8 | MintOp::AddP => binop_i8!(i64::wrapping_add),
                    MintOp::SubI8 | MintOp::SubP => binop_i8!(i64::wrapping_sub),
                    MintOp::MulI8 | MintOp::MulP => binop_i8!(i64::wrapping_mul),
                    MintOp::DivI8 | MintOp::DivP => binop_i8_chk!(arith::div_i64),
                    MintOp::DivUnI8 | MintOp::DivUnP => binop_u8_chk!(arith::div_u64),
                    MintOp::RemI8 | MintOp::RemP => binop_i8_chk!(arith::rem_i64),
                    MintOp::RemUnI8 | MintOp::RemUnP => binop_u8_chk!(arith::rem_u64),
                    MintOp::AndI8 | MintOp::AndP => binop_i8!(|a, b| a & b),
                    MintOp::OrI8 | MintOp::OrP => binop_i8!(|a: i64, b: i64| a | b),
                    MintOp::XorI8 | MintOp::XorP => binop_i8!(|a: i64, b: i64| a ^ b),
                    MintOp::ShlI8 | MintOp::ShlP => {
                        let count = pop_slot!().as_i32();
                        let a = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i64(a << arith::mask_shift_64(count)));
                    }
                    MintOp::ShrI8 | MintOp::ShrP => {
                        let count = pop_slot!().as_i32();
                        let a = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i64(a >> arith::mask_shift_64(count)));
                    }
                    MintOp::ShrUnI8 | MintOp::ShrUnP => {
                        let count = pop_slot!().as_i32();
                        let a = pop_slot!().as_i64() as u64;
                        push_slot!(StackSlot::from_i64(
                            (a >> arith::mask_shift_64(count)) as i64
                        ));
                    }
                    MintOp::NegI4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(v.wrapping_neg()));
                    }
                    MintOp::NegI8 | MintOp::NegP => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i64(v.wrapping_neg()));
                    }
                    MintOp::NotI4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(!v));
                    }
                    MintOp::NotI8 | MintOp::NotP => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i64(!v));
                    }

                    // ===== Checked integer arithmetic =====
                    MintOp::AddOvfI4 => binop_i4_chk!(arith::add_ovf_i32),
                    MintOp::AddOvfUnI4 => binop_u4_chk!(arith::add_ovf_u32),
                    MintOp::SubOvfI4 => binop_i4_chk!(arith::sub_ovf_i32),
                    MintOp::SubOvfUnI4 => binop_u4_chk!(arith::sub_ovf_u32),
                    MintOp::MulOvfI4 => binop_i4_chk!(arith::mul_ovf_i32),
                    MintOp::MulOvfUnI4 => binop_u4_chk!(arith::mul_ovf_u32),
                    MintOp::AddOvfI8 => binop_i8_chk!(arith::add_ovf_i64),
                    MintOp::AddOvfUnI8 => binop_u8_chk!(arith::add_ovf_u64),
                    MintOp::SubOvfI8 => binop_i8_chk!(arith::sub_ovf_i64),
                    MintOp::SubOvfUnI8 => binop_u8_chk!(arith::sub_ovf_u64),
                    MintOp::MulOvfI8 => binop_i8_chk!(arith::mul_ovf_i64),
                    MintOp::MulOvfUnI8 => binop_u8_chk!(arith::mul_ovf_u64),

                    // ===== Floating point =====
                    MintOp::AddR8 => binop_r8!(|a: f64, b: f64| a + b),
                    MintOp::SubR8 => binop_r8!(|a: f64, b: f64| a - b),
                    MintOp::MulR8 => binop_r8!(|a: f64, b: f64| a * b),
                    MintOp::DivR8 => binop_r8!(|a: f64, b: f64| a / b),
                    MintOp::RemR8 => binop_r8!(|a: f64, b: f64| a % b),
                    MintOp::NegR8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_f64(-v));
                    }
                    MintOp::Ckfinite => {
                        let v = pop_slot!().as_f64();
                        match arith::ckfinite(v) {
                            Ok(v) => push_slot!(StackSlot::from_f64(v)),
                            Err(kind) => raise!(kind),
                        }
                    }

                    // ===== Comparisons =====
                    MintOp::CeqI4 => compare!(as_i32, |a, b| a == b),
                    MintOp::CeqI8 | MintOp::CeqP => compare!(as_i64, |a, b| a == b),
                    MintOp::CeqR8 => compare!(as_f64, |a: f64, b: f64| a == b),
                    MintOp::CgtI4 => compare!(as_i32, |a, b| a > b),
                    MintOp::CgtI8 | MintOp::CgtP => compare!(as_i64, |a, b| a > b),
                    MintOp::CgtR8 => compare!(as_f64, |a: f64, b: f64| a > b),
                    MintOp::CgtUnI4 => compare!(as_i32, |a: i32, b: i32| (a as u32) > (b as u32)),
                    MintOp::CgtUnI8 | MintOp::CgtUnP => {
                        compare!(as_i64, |a: i64, b: i64| (a as u64) > (b as u64))
                    }
                    // cgt.un on floats is the "not less or equal" form, so
                    // unordered operands compare true.
                    MintOp::CgtUnR8 => compare!(as_f64, |a: f64, b: f64| !(a <= b)),
                    MintOp::CltI4 => compare!(as_i32, |a, b| a < b),
                    MintOp::CltI8 | MintOp::CltP => compare!(as_i64, |a, b| a < b),
                    MintOp::CltR8 => compare!(as_f64, |a: f64, b: f64| a < b),
                    MintOp::CltUnI4 => compare!(as_i32, |a: i32, b: i32| (a as u32) < (b as u32)),
                    MintOp::CltUnI8 | MintOp::CltUnP => {
                        compare!(as_i64, |a: i64, b: i64| (a as u64) < (b as u64))
                    }
                    MintOp::CltUnR8 => compare!(as_f64, |a: f64, b: f64| !(a >= b)),

                    // ===== Conversions =====
                    MintOp::ConvI1I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(v as i8 as i32));
                    }
                    MintOp::ConvI1I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i32(v as i8 as i32));
                    }
                    MintOp::ConvI1R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(v as i64 as i8 as i32));
                    }
                    MintOp::ConvU1I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(v as u8 as i32));
                    }
                    MintOp::ConvU1I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i32(v as u8 as i32));
                    }
                    MintOp::ConvU1R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(v as i64 as u8 as i32));
                    }
                    MintOp::ConvI2I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(v as i16 as i32));
                    }
                    MintOp::ConvI2I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i32(v as i16 as i32));
                    }
                    MintOp::ConvI2R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(v as i64 as i16 as i32));
                    }
                    MintOp::ConvU2I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i32(v as u16 as i32));
                    }
                    MintOp::ConvU2I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i32(v as u16 as i32));
                    }
                    MintOp::ConvU2R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(v as i64 as u16 as i32));
                    }
                    MintOp::ConvI4I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_i32(v as i32));
                    }
                    MintOp::ConvI4R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(v as i64 as i32));
                    }
                    MintOp::ConvU4R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i32(arith::conv_u4_r8(v) as i32));
                    }
                    MintOp::ConvI8I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_i64(v as i64));
                    }
                    MintOp::ConvI8U4 => {
                        let v = pop_slot!().as_i32() as u32;
                        push_slot!(StackSlot::from_i64(v as i64));
                    }
                    MintOp::ConvI8R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i64(v as i64));
                    }
                    MintOp::ConvU8R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_i64(v as u64 as i64));
                    }
                    MintOp::ConvR4I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_f64(v as f32 as f64));
                    }
                    MintOp::ConvR4I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_f64(v as f32 as f64));
                    }
                    MintOp::ConvR4R8 => {
                        let v = pop_slot!().as_f64();
                        push_slot!(StackSlot::from_f64(v as f32 as f64));
                    }
                    MintOp::ConvR8I4 => {
                        let v = pop_slot!().as_i32();
                        push_slot!(StackSlot::from_f64(v as f64));
                    }
                    MintOp::ConvR8I8 => {
                        let v = pop_slot!().as_i64();
                        push_slot!(StackSlot::from_f64(v as f64));
                    }
                    MintOp::ConvRUnI4 => {
                        let v = pop_slot!().as_i32() as u32;
                        push_slot!(StackSlot::from_f64(v as f64));
                    }
                    MintOp::ConvRUnI8 => {
                        let v = pop_slot!().as_i64() as u64;
                        push_slot!(StackSlot::from_f64(v as f64));
                    }

                    // ===== Checked conversions, signed source =====
                    MintOp::ConvOvfI1I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, -128, 127), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI1I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, -128, 127), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI1R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8(v, -128.0, 127.0), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU1I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, 0, 255), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU1I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, 0, 255), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU1R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8(v, 0.0, 255.0), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI2I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, -32768, 32767), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI2I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, -32768, 32767), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI2R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8(v, -32768.0, 32767.0), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU2I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, 0, 65535), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU2I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, 0, 65535), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU2R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8(v, 0.0, 65535.0), |v: i64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI4I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(
                            arith::chk_i64(v, i32::MIN as i64, i32::MAX as i64),
                            |v: i64| StackSlot::from_i32(v as i32)
                        );
                    }
                    MintOp::ConvOvfI4R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(
                            arith::chk_r8(v, -2147483648.0, 2147483647.0),
                            |v: i64| StackSlot::from_i32(v as i32)
                        );
                    }
                    MintOp::ConvOvfU4I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, 0, u32::MAX as i64), |v: i64| {
                            StackSlot::from_i32(v as u32 as i32)
                        });
                    }
                    MintOp::ConvOvfU4I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, 0, u32::MAX as i64), |v: i64| {
                            StackSlot::from_i32(v as u32 as i32)
                        });
                    }
                    MintOp::ConvOvfU4R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8(v, 0.0, 4294967295.0), |v: i64| {
                            StackSlot::from_i32(v as u32 as i32)
                        });
                    }
                    MintOp::ConvOvfI8R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8_i64(v), StackSlot::from_i64);
                    }
                    MintOp::ConvOvfU8I4 => {
                        let v = pop_slot!().as_i32() as i64;
                        conv_chk!(arith::chk_i64(v, 0, i64::MAX), StackSlot::from_i64);
                    }
                    MintOp::ConvOvfU8I8 => {
                        let v = pop_slot!().as_i64();
                        conv_chk!(arith::chk_i64(v, 0, i64::MAX), StackSlot::from_i64);
                    }
                    MintOp::ConvOvfU8R8 => {
                        let v = pop_slot!().as_f64();
                        conv_chk!(arith::chk_r8_u64(v), |v: u64| StackSlot::from_i64(v as i64));
                    }

                    // ===== Checked conversions, unsigned source =====
                    MintOp::ConvOvfI1U4 => {
                        let v = pop_slot!().as_i32() as u32 as u64;
                        conv_chk!(arith::chk_u64(v, 127), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI1U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, 127), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU1U4 => {
                        let v = pop_slot!().as_i32() as u32 as u64;
                        conv_chk!(arith::chk_u64(v, 255), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU1U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, 255), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI2U4 => {
                        let v = pop_slot!().as_i32() as u32 as u64;
                        conv_chk!(arith::chk_u64(v, 32767), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI2U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, 32767), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU2U4 => {
                        let v = pop_slot!().as_i32() as u32 as u64;
                        conv_chk!(arith::chk_u64(v, 65535), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU2U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, 65535), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI4U4 => {
                        let v = pop_slot!().as_i32() as u32 as u64;
                        conv_chk!(arith::chk_u64(v, i32::MAX as u64), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfI4U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, i32::MAX as u64), |v: u64| {
                            StackSlot::from_i32(v as i32)
                        });
                    }
                    MintOp::ConvOvfU4U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, u32::MAX as u64), |v: u64| {
                            StackSlot::from_i32(v as u32 as i32)
                        });
                    }
                    MintOp::ConvOvfI8U8 => {
                        let v = pop_slot!().as_i64() as u64;
                        conv_chk!(arith::chk_u64(v, i64::MAX as u64), |v: u64| {
                            StackSlot::from_i64(v as i64)
                        });
                    }

                    // ===== Indirect access =====
                    MintOp::LdindI1 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i32(read_mem::<i8>(addr as *const u8) as i32));
                    }
                    MintOp::LdindU1 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i32(read_mem::<u8>(addr as *const u8) as i32));
                    }
                    MintOp::LdindI2 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<i16>(addr as *const u8) as i32
                        ));
                    }
                    MintOp::LdindU2 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<u16>(addr as *const u8) as i32
                        ));
                    }
                    MintOp::LdindI4 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i32(read_mem::<i32>(addr as *const u8)));
                    }
                    MintOp::LdindI8 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_i64(read_mem::<i64>(addr as *const u8)));
                    }
                    MintOp::LdindR4 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_f64(
                            read_mem::<f32>(addr as *const u8) as f64
                        ));
                    }
                    MintOp::LdindR8 => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_f64(read_mem::<f64>(addr as *const u8)));
                    }
                    MintOp::LdindRef => {
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        push_slot!(StackSlot::from_raw(read_mem::<u64>(addr as *const u8)));
                    }
                    MintOp::StindI1 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<u8>(addr as *mut u8, v.raw() as u8);
                    }
                    MintOp::StindI2 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<u16>(addr as *mut u8, v.raw() as u16);
                    }
                    MintOp::StindI4 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<u32>(addr as *mut u8, v.raw() as u32);
                    }
                    MintOp::StindI8 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<u64>(addr as *mut u8, v.raw());
                    }
                    MintOp::StindR4 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<f32>(addr as *mut u8, v.as_f64() as f32);
                    }
                    MintOp::StindR8 => {
                        let v = pop_slot!();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        write_mem::<f64>(addr as *mut u8, v.as_f64());
                    }
                    MintOp::StindRef => {
                        let v = pop_slot!().as_obj();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        rt.write_ref(addr as *mut u8, v);
                    }
                    MintOp::Membar => {
                        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
                    }
                    MintOp::LdobjVt => {
                        let size = short!(1) as usize;
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::copy_nonoverlapping(addr as *const u8, dst, size);
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size as u32);
                    }
                    MintOp::StobjVt => {
                        let size = short!(1) as usize;
                        let src = pop_slot!().as_mut_ptr();
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        rt.value_copy(addr as *mut u8, src, size);
                        vt_sp -= vt_align(size as u32);
                    }
                    MintOp::Cpobj => {
                        let class = class_item!(1);
                        let src = pop_slot!().as_word();
                        let dst = pop_slot!().as_word();
                        null_check!(src);
                        null_check!(dst);
                        let desc = meta.class_desc(class);
                        if desc.is_valuetype {
                            rt.value_copy(
                                dst as *mut u8,
                                src as *const u8,
                                desc.value_size as usize,
                            );
                        } else {
                            let obj = ObjRef::from_addr(read_mem::<usize>(src as *const u8));
                            rt.write_ref(dst as *mut u8, obj);
                        }
                    }
                    MintOp::Initobj => {
                        let size = short!(1) as usize;
                        let addr = pop_slot!().as_word();
                        null_check!(addr);
                        core::ptr::write_bytes(addr as *mut u8, 0, size);
                    }
                    MintOp::Cpblk => {
                        let size = pop_slot!().as_i32() as usize;
                        let src = pop_slot!().as_word();
                        let dst = pop_slot!().as_word();
                        if size > 0 {
                            null_check!(src);
                            null_check!(dst);
                            core::ptr::copy(src as *const u8, dst as *mut u8, size);
                        }
                    }
                    MintOp::Initblk => {
                        let size = pop_slot!().as_i32() as usize;
                        let value = pop_slot!().as_i32() as u8;
                        let dst = pop_slot!().as_word();
                        if size > 0 {
                            null_check!(dst);
                            core::ptr::write_bytes(dst as *mut u8, value, size);
                        }
                    }

                    // ===== Instance fields =====
                    MintOp::LdfldI1 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i32(read_mem::<i8>(p) as i32));
                    }
                    MintOp::LdfldU1 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i32(read_mem::<u8>(p) as i32));
                    }
                    MintOp::LdfldI2 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i32(read_mem::<i16>(p) as i32));
                    }
                    MintOp::LdfldU2 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i32(read_mem::<u16>(p) as i32));
                    }
                    MintOp::LdfldI4 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i32(read_mem::<i32>(p)));
                    }
                    MintOp::LdfldI8 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_i64(read_mem::<i64>(p)));
                    }
                    MintOp::LdfldR4 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_f64(read_mem::<f32>(p) as f64));
                    }
                    MintOp::LdfldR8 => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_f64(read_mem::<f64>(p)));
                    }
                    MintOp::LdfldO | MintOp::LdfldP => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let p = (obj + short!(1) as usize) as *const u8;
                        push_slot!(StackSlot::from_raw(read_mem::<u64>(p)));
                    }
                    MintOp::LdfldVt => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let size = short!(2) as usize;
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::copy_nonoverlapping(
                            (obj + short!(1) as usize) as *const u8,
                            dst,
                            size,
                        );
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size as u32);
                    }
                    MintOp::Ldflda => {
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        push_slot!(StackSlot::from_word(obj + short!(1) as usize));
                    }
                    MintOp::StfldI1 => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<u8>((obj + short!(1) as usize) as *mut u8, v.raw() as u8);
                    }
                    MintOp::StfldI2 => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<u16>((obj + short!(1) as usize) as *mut u8, v.raw() as u16);
                    }
                    MintOp::StfldI4 => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<u32>((obj + short!(1) as usize) as *mut u8, v.raw() as u32);
                    }
                    MintOp::StfldI8 | MintOp::StfldP => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<u64>((obj + short!(1) as usize) as *mut u8, v.raw());
                    }
                    MintOp::StfldR4 => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<f32>(
                            (obj + short!(1) as usize) as *mut u8,
                            v.as_f64() as f32,
                        );
                    }
                    MintOp::StfldR8 => {
                        let v = pop_slot!();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        write_mem::<f64>((obj + short!(1) as usize) as *mut u8, v.as_f64());
                    }
                    MintOp::StfldO => {
                        let v = pop_slot!().as_obj();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        rt.write_ref((obj + short!(1) as usize) as *mut u8, v);
                    }
                    MintOp::StfldVt => {
                        let src = pop_slot!().as_mut_ptr();
                        let obj = pop_slot!().as_word();
                        null_check!(obj);
                        let size = short!(2) as usize;
                        rt.value_copy((obj + short!(1) as usize) as *mut u8, src, size);
                        vt_sp -= vt_align(size as u32);
                    }
                    MintOp::Ldrmfld | MintOp::Strmfld => {
                        // The transparent-proxy path is not carried.
                        raise!(RuntimeExceptionKind::NotSupported);
                    }

                    // ===== Static fields =====
                    MintOp::LdsfldI1 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<i8>(rt.static_field_addr(f)) as i32
                        ));
                    }
                    MintOp::LdsfldU1 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<u8>(rt.static_field_addr(f)) as i32
                        ));
                    }
                    MintOp::LdsfldI2 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<i16>(rt.static_field_addr(f)) as i32
                        ));
                    }
                    MintOp::LdsfldU2 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i32(
                            read_mem::<u16>(rt.static_field_addr(f)) as i32
                        ));
                    }
                    MintOp::LdsfldI4 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i32(read_mem::<i32>(
                            rt.static_field_addr(f)
                        )));
                    }
                    MintOp::LdsfldI8 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_i64(read_mem::<i64>(
                            rt.static_field_addr(f)
                        )));
                    }
                    MintOp::LdsfldR4 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_f64(
                            read_mem::<f32>(rt.static_field_addr(f)) as f64
                        ));
                    }
                    MintOp::LdsfldR8 => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_f64(read_mem::<f64>(
                            rt.static_field_addr(f)
                        )));
                    }
                    MintOp::LdsfldO | MintOp::LdsfldP => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_raw(read_mem::<u64>(
                            rt.static_field_addr(f)
                        )));
                    }
                    MintOp::LdsfldVt => {
                        let f = field_item!(1);
                        let size = short!(2) as usize;
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::copy_nonoverlapping(rt.static_field_addr(f), dst, size);
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size as u32);
                    }
                    MintOp::Ldsflda => {
                        let f = field_item!(1);
                        push_slot!(StackSlot::from_mut_ptr(rt.static_field_addr(f)));
                    }
                    MintOp::StsfldI1 => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<u8>(rt.static_field_addr(f), v.raw() as u8);
                    }
                    MintOp::StsfldI2 => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<u16>(rt.static_field_addr(f), v.raw() as u16);
                    }
                    MintOp::StsfldI4 => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<u32>(rt.static_field_addr(f), v.raw() as u32);
                    }
                    MintOp::StsfldI8 | MintOp::StsfldP => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<u64>(rt.static_field_addr(f), v.raw());
                    }
                    MintOp::StsfldR4 => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<f32>(rt.static_field_addr(f), v.as_f64() as f32);
                    }
                    MintOp::StsfldR8 => {
                        let f = field_item!(1);
                        let v = pop_slot!();
                        write_mem::<f64>(rt.static_field_addr(f), v.as_f64());
                    }
                    MintOp::StsfldO => {
                        let f = field_item!(1);
                        let v = pop_slot!().as_obj();
                        rt.write_ref(rt.static_field_addr(f), v);
                    }
                    MintOp::StsfldVt => {
                        let f = field_item!(1);
                        let size = short!(2) as usize;
                        let src = pop_slot!().as_mut_ptr();
                        rt.value_copy(rt.static_field_addr(f), src, size);
                        vt_sp -= vt_align(size as u32);
                    }

                    // ===== Allocation, boxing, casts =====
                    MintOp::Newobj => {
                        let ctor = method_item!(1);
                        let nargs = ctor.desc.signature.params.len() as u32;
                        vt_sp -= args_vt_bytes(meta, &ctor.desc.signature);
                        let obj = match rt.alloc_object(ctor.desc.owner) {
                            Ok(o) => o,
                            Err(kind) => raise!(kind),
                        };
                        for k in (0..nargs).rev() {
                            *frame.stack_ptr(sp - nargs + k + 1) =
                                *frame.stack_ptr(sp - nargs + k);
                        }
                        *frame.stack_ptr(sp - nargs) = StackSlot::from_obj(obj);
                        sp += 1;
                        do_invoke!(ctor, false);
                        push_slot!(StackSlot::from_obj(obj));
                    }
                    MintOp::NewobjVt => {
                        let ctor = method_item!(1);
                        let size = short!(2) as u32;
                        let nargs = ctor.desc.signature.params.len() as u32;
                        vt_sp -= args_vt_bytes(meta, &ctor.desc.signature);
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::write_bytes(dst, 0, size as usize);
                        for k in (0..nargs).rev() {
                            *frame.stack_ptr(sp - nargs + k + 1) =
                                *frame.stack_ptr(sp - nargs + k);
                        }
                        *frame.stack_ptr(sp - nargs) = StackSlot::from_mut_ptr(dst);
                        sp += 1;
                        do_invoke!(ctor, false);
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size);
                    }
                    MintOp::NewobjString => {
                        let ctor = method_item!(1);
                        let nargs = ctor.desc.signature.params.len() as u32;
                        vt_sp -= args_vt_bytes(meta, &ctor.desc.signature);
                        for k in (0..nargs).rev() {
                            *frame.stack_ptr(sp - nargs + k + 1) =
                                *frame.stack_ptr(sp - nargs + k);
                        }
                        // String constructors take a null receiver and hand
                        // back the constructed reference as their result.
                        *frame.stack_ptr(sp - nargs) = StackSlot::from_obj(ObjRef::null());
                        sp += 1;
                        do_invoke!(ctor, false);
                    }
                    MintOp::NewobjArray => {
                        let ctor = method_item!(1);
                        let nargs = short!(2) as usize;
                        let owner = meta.class_desc(ctor.desc.owner);
                        let rank = owner.rank as usize;
                        let mut vals = [0i64; 32];
                        for k in (0..nargs).rev() {
                            sp -= 1;
                            vals[k] = (*frame.stack_ptr(sp)).as_i32() as i64;
                        }
                        let result = if nargs == rank {
                            rt.alloc_array(owner.id, &vals[..rank], None)
                        } else {
                            // Lower bounds interleave with lengths.
                            let mut lengths = [0i64; 16];
                            let mut lowers = [0i32; 16];
                            for d in 0..rank {
                                lowers[d] = vals[2 * d] as i32;
                                lengths[d] = vals[2 * d + 1];
                            }
                            rt.alloc_array(owner.id, &lengths[..rank], Some(&lowers[..rank]))
                        };
                        match result {
                            Ok(arr) => push_slot!(StackSlot::from_obj(arr)),
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::Newarr => {
                        let class = class_item!(1);
                        let len = pop_slot!().as_i64();
                        match rt.alloc_array(class, &[len], None) {
                            Ok(arr) => push_slot!(StackSlot::from_obj(arr)),
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::Castclass => {
                        let class = class_item!(1);
                        let obj = (*frame.stack_ptr(sp - 1)).as_obj();
                        if !obj.is_null() && !meta.is_assignable(obj.class(), class) {
                            raise!(RuntimeExceptionKind::InvalidCast);
                        }
                    }
                    MintOp::Isinst => {
                        let class = class_item!(1);
                        let obj = (*frame.stack_ptr(sp - 1)).as_obj();
                        if !obj.is_null() && !meta.is_assignable(obj.class(), class) {
                            *frame.stack_ptr(sp - 1) = StackSlot::from_obj(ObjRef::null());
                        }
                    }
                    MintOp::Box => {
                        let class = class_item!(1);
                        let desc = meta.class_desc(class);
                        let payload = pop_slot!().as_mut_ptr();
                        vt_sp -= vt_align(desc.value_size);
                        if let Some(nullable) = desc.nullable {
                            let has = read_mem::<u8>(payload.add(nullable.has_value_offset as usize));
                            if has == 0 {
                                push_slot!(StackSlot::from_obj(ObjRef::null()));
                            } else {
                                let value_desc = meta.class_desc(nullable.value_class);
                                match rt.alloc_box(nullable.value_class) {
                                    Ok(boxed) => {
                                        core::ptr::copy_nonoverlapping(
                                            payload.add(nullable.value_offset as usize),
                                            boxed.field_ptr(HEADER_SIZE),
                                            value_desc.value_size as usize,
                                        );
                                        push_slot!(StackSlot::from_obj(boxed));
                                    }
                                    Err(kind) => raise!(kind),
                                }
                            }
                        } else {
                            match rt.alloc_box(class) {
                                Ok(boxed) => {
                                    core::ptr::copy_nonoverlapping(
                                        payload,
                                        boxed.field_ptr(HEADER_SIZE),
                                        desc.value_size as usize,
                                    );
                                    push_slot!(StackSlot::from_obj(boxed));
                                }
                                Err(kind) => raise!(kind),
                            }
                        }
                    }
                    MintOp::BoxVal => {
                        let class = class_item!(1);
                        let mt = MintType::from_code(short!(2));
                        let v = pop_slot!();
                        match rt.alloc_box(class) {
                            Ok(boxed) => {
                                let dst = boxed.field_ptr(HEADER_SIZE);
                                match mt {
                                    Some(MintType::I1) | Some(MintType::U1) => {
                                        write_mem::<u8>(dst, v.raw() as u8)
                                    }
                                    Some(MintType::I2) | Some(MintType::U2) => {
                                        write_mem::<u16>(dst, v.raw() as u16)
                                    }
                                    Some(MintType::I4) => write_mem::<u32>(dst, v.raw() as u32),
                                    Some(MintType::R4) => {
                                        write_mem::<f32>(dst, v.as_f64() as f32)
                                    }
                                    Some(MintType::I8)
                                    | Some(MintType::R8)
                                    | Some(MintType::P) => write_mem::<u64>(dst, v.raw()),
                                    _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                                }
                                push_slot!(StackSlot::from_obj(boxed));
                            }
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::Unbox => {
                        let class = class_item!(1);
                        let obj = pop_slot!().as_obj();
                        null_check!(obj.addr());
                        let obj_class = obj.class();
                        let matches = obj_class == class || {
                            let a = meta.class_desc(obj_class);
                            let b = meta.class_desc(class);
                            a.is_array() && b.is_array() && a.element == b.element
                        };
                        if !matches {
                            raise!(RuntimeExceptionKind::InvalidCast);
                        }
                        push_slot!(StackSlot::from_word(obj.addr() + HEADER_SIZE as usize));
                    }
                    MintOp::UnboxAnyNullable => {
                        let class = class_item!(1);
                        let size = short!(2) as usize;
                        let desc = meta.class_desc(class);
                        let nullable = match desc.nullable {
                            Some(n) => n,
                            None => raise!(RuntimeExceptionKind::ExecutionEngine),
                        };
                        let obj = pop_slot!().as_obj();
                        let dst = frame.vt_ptr(vt_sp);
                        core::ptr::write_bytes(dst, 0, size);
                        if !obj.is_null() {
                            if obj.class() != nullable.value_class {
                                raise!(RuntimeExceptionKind::InvalidCast);
                            }
                            let value_desc = meta.class_desc(nullable.value_class);
                            write_mem::<u8>(dst.add(nullable.has_value_offset as usize), 1);
                            core::ptr::copy_nonoverlapping(
                                obj.field_ptr(HEADER_SIZE),
                                dst.add(nullable.value_offset as usize),
                                value_desc.value_size as usize,
                            );
                        }
                        push_slot!(StackSlot::from_mut_ptr(dst));
                        vt_sp += vt_align(size as u32);
                    }

                    // ===== Arrays and strings =====
                    MintOp::Ldlen => {
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        push_slot!(StackSlot::from_word(arr.length()));
                    }
                    MintOp::Ldelema => {
                        let rank = short!(1) as u32;
                        let esize = short!(2) as u32;
                        let mut indices = [0i64; 16];
                        for d in (0..rank as usize).rev() {
                            sp -= 1;
                            indices[d] = (*frame.stack_ptr(sp)).as_i64();
                        }
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &indices[..rank as usize], esize) {
                            Ok(p) => push_slot!(StackSlot::from_mut_ptr(p)),
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::LdelemaTc => {
                        let class = class_item!(1);
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        let elem = meta.class_desc(arr.class()).element;
                        if elem != Some(class) {
                            raise!(RuntimeExceptionKind::ArrayTypeMismatch);
                        }
                        match elem_addr(arr, &[idx], WORD) {
                            Ok(p) => push_slot!(StackSlot::from_mut_ptr(p)),
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::LdelemI1 => {
                        ldelem!(1, |p| StackSlot::from_i32(read_mem::<i8>(p) as i32))
                    }
                    MintOp::LdelemU1 => {
                        ldelem!(1, |p| StackSlot::from_i32(read_mem::<u8>(p) as i32))
                    }
                    MintOp::LdelemI2 => {
                        ldelem!(2, |p| StackSlot::from_i32(read_mem::<i16>(p) as i32))
                    }
                    MintOp::LdelemU2 => {
                        ldelem!(2, |p| StackSlot::from_i32(read_mem::<u16>(p) as i32))
                    }
                    MintOp::LdelemI4 => {
                        ldelem!(4, |p| StackSlot::from_i32(read_mem::<i32>(p)))
                    }
                    MintOp::LdelemI8 => {
                        ldelem!(8, |p| StackSlot::from_i64(read_mem::<i64>(p)))
                    }
                    MintOp::LdelemR4 => {
                        ldelem!(4, |p| StackSlot::from_f64(read_mem::<f32>(p) as f64))
                    }
                    MintOp::LdelemR8 => {
                        ldelem!(8, |p| StackSlot::from_f64(read_mem::<f64>(p)))
                    }
                    MintOp::LdelemRef => {
                        ldelem!(WORD, |p| StackSlot::from_raw(read_mem::<u64>(p)))
                    }
                    MintOp::LdelemVt => {
                        let size = short!(1) as u32;
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &[idx], size) {
                            Ok(p) => {
                                let dst = frame.vt_ptr(vt_sp);
                                core::ptr::copy_nonoverlapping(p, dst, size as usize);
                                push_slot!(StackSlot::from_mut_ptr(dst));
                                vt_sp += vt_align(size);
                            }
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::StelemI1 => {
                        stelem!(1, |p, v: StackSlot| write_mem::<u8>(p, v.raw() as u8))
                    }
                    MintOp::StelemI2 => {
                        stelem!(2, |p, v: StackSlot| write_mem::<u16>(p, v.raw() as u16))
                    }
                    MintOp::StelemI4 => {
                        stelem!(4, |p, v: StackSlot| write_mem::<u32>(p, v.raw() as u32))
                    }
                    MintOp::StelemI8 => {
                        stelem!(8, |p, v: StackSlot| write_mem::<u64>(p, v.raw()))
                    }
                    MintOp::StelemR4 => {
                        stelem!(4, |p, v: StackSlot| write_mem::<f32>(p, v.as_f64() as f32))
                    }
                    MintOp::StelemR8 => {
                        stelem!(8, |p, v: StackSlot| write_mem::<f64>(p, v.as_f64()))
                    }
                    MintOp::StelemRef => {
                        let v = pop_slot!().as_obj();
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        if !v.is_null() {
                            let elem = meta.class_desc(arr.class()).element;
                            let ok = match elem {
                                Some(elem) => meta.is_assignable(v.class(), elem),
                                None => false,
                            };
                            if !ok {
                                raise!(RuntimeExceptionKind::ArrayTypeMismatch);
                            }
                        }
                        match elem_addr(arr, &[idx], WORD) {
                            Ok(p) => rt.write_ref(p, v),
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::StelemVt => {
                        let size = short!(2) as u32;
                        let src = pop_slot!().as_mut_ptr();
                        let idx = pop_slot!().as_i64();
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &[idx], size) {
                            Ok(p) => {
                                rt.value_copy(p, src, size as usize);
                                vt_sp -= vt_align(size);
                            }
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::ArrayGet => {
                        let rank = short!(1) as u32;
                        let esize = short!(2) as u32;
                        let mt = MintType::from_code(short!(3));
                        let mut indices = [0i64; 16];
                        for d in (0..rank as usize).rev() {
                            sp -= 1;
                            indices[d] = (*frame.stack_ptr(sp)).as_i64();
                        }
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &indices[..rank as usize], esize) {
                            Ok(p) => match mt {
                                Some(MintType::I1) => {
                                    push_slot!(StackSlot::from_i32(read_mem::<i8>(p) as i32))
                                }
                                Some(MintType::U1) => {
                                    push_slot!(StackSlot::from_i32(read_mem::<u8>(p) as i32))
                                }
                                Some(MintType::I2) => {
                                    push_slot!(StackSlot::from_i32(read_mem::<i16>(p) as i32))
                                }
                                Some(MintType::U2) => {
                                    push_slot!(StackSlot::from_i32(read_mem::<u16>(p) as i32))
                                }
                                Some(MintType::I4) => {
                                    push_slot!(StackSlot::from_i32(read_mem::<i32>(p)))
                                }
                                Some(MintType::I8) | Some(MintType::P) | Some(MintType::O) => {
                                    push_slot!(StackSlot::from_raw(read_mem::<u64>(p)))
                                }
                                Some(MintType::R4) => {
                                    push_slot!(StackSlot::from_f64(read_mem::<f32>(p) as f64))
                                }
                                Some(MintType::R8) => {
                                    push_slot!(StackSlot::from_f64(read_mem::<f64>(p)))
                                }
                                Some(MintType::Vt) => {
                                    let dst = frame.vt_ptr(vt_sp);
                                    core::ptr::copy_nonoverlapping(p, dst, esize as usize);
                                    push_slot!(StackSlot::from_mut_ptr(dst));
                                    vt_sp += vt_align(esize);
                                }
                                _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                            },
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::ArraySet => {
                        let rank = short!(1) as u32;
                        let esize = short!(2) as u32;
                        let mt = MintType::from_code(short!(3));
                        let value = pop_slot!();
                        let mut indices = [0i64; 16];
                        for d in (0..rank as usize).rev() {
                            sp -= 1;
                            indices[d] = (*frame.stack_ptr(sp)).as_i64();
                        }
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        match elem_addr(arr, &indices[..rank as usize], esize) {
                            Ok(p) => match mt {
                                Some(MintType::I1) | Some(MintType::U1) => {
                                    write_mem::<u8>(p, value.raw() as u8)
                                }
                                Some(MintType::I2) | Some(MintType::U2) => {
                                    write_mem::<u16>(p, value.raw() as u16)
                                }
                                Some(MintType::I4) => write_mem::<u32>(p, value.raw() as u32),
                                Some(MintType::I8) | Some(MintType::P) => {
                                    write_mem::<u64>(p, value.raw())
                                }
                                Some(MintType::O) => rt.write_ref(p, value.as_obj()),
                                Some(MintType::R4) => write_mem::<f32>(p, value.as_f64() as f32),
                                Some(MintType::R8) => write_mem::<f64>(p, value.as_f64()),
                                Some(MintType::Vt) => {
                                    rt.value_copy(p, value.as_mut_ptr(), esize as usize);
                                    vt_sp -= vt_align(esize);
                                }
                                _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                            },
                            Err(kind) => raise!(kind),
                        }
                    }
                    MintOp::ArrayRank => {
                        let arr = pop_slot!().as_obj();
                        null_check!(arr.addr());
                        let rank = meta.class_desc(arr.class()).rank;
                        push_slot!(StackSlot::from_i32(rank as i32));
                    }
                    MintOp::Strlen => {
                        let s = pop_slot!().as_obj();
                        null_check!(s.addr());
                        push_slot!(StackSlot::from_i32(s.length() as i32));
                    }
                    MintOp::Getchr => {
                        let idx = pop_slot!().as_i32();
                        let s = pop_slot!().as_obj();
                        null_check!(s.addr());
                        if idx < 0 || idx as usize >= s.length() {
                            raise!(RuntimeExceptionKind::IndexOutOfRange);
                        }
                        let p = s.field_ptr(STRING_DATA_OFFSET + (idx as u32) * 2);
                        push_slot!(StackSlot::from_i32(read_mem::<u16>(p) as i32));
                    }

                    // ===== Calls =====
                    MintOp::Call => {
                        let callee = method_item!(1);
                        vt_sp -= args_vt_bytes(meta, &callee.desc.signature);
                        do_invoke!(callee, false);
                    }
                    MintOp::JitCall => {
                        let callee = method_item!(1);
                        vt_sp -= args_vt_bytes(meta, &callee.desc.signature);
                        do_invoke!(callee, true);
                    }
                    MintOp::Callvirt => {
                        let callee = method_item!(1);
                        let argc = callee.desc.signature.arg_count() as u32;
                        let recv_slot = frame.stack_ptr(sp - argc);
                        let obj = (*recv_slot).as_obj();
                        null_check!(obj.addr());
                        let resolved = if callee.desc.is_virtual() && !callee.desc.is_final() {
                            match engine
                                .registry()
                                .resolve_virtual(meta, rt, &callee, obj.class())
                            {
                                Ok(target) => {
                                    if target.unbox_receiver {
                                        *recv_slot = StackSlot::from_word(
                                            obj.addr() + HEADER_SIZE as usize,
                                        );
                                    }
                                    target.method
                                }
                                Err(_) => raise!(RuntimeExceptionKind::MissingMethod),
                            }
                        } else {
                            callee
                        };
                        vt_sp -= args_vt_bytes(meta, &resolved.desc.signature);
                        do_invoke!(resolved, false);
                    }
                    MintOp::CallvirtCtd => {
                        let callee = method_item!(1);
                        let class = class_item!(2);
                        let argc = callee.desc.signature.arg_count() as u32;
                        let recv_slot = frame.stack_ptr(sp - argc);
                        let recv_ptr = (*recv_slot).as_word();
                        null_check!(recv_ptr);
                        let desc = meta.class_desc(class);
                        let resolved = if desc.is_valuetype {
                            let target = if callee.desc.is_virtual() && !callee.desc.is_final() {
                                match engine.registry().resolve_virtual(meta, rt, &callee, class)
                                {
                                    Ok(t) => t.method,
                                    Err(_) => raise!(RuntimeExceptionKind::MissingMethod),
                                }
                            } else {
                                callee
                            };
                            if target.desc.owner == class {
                                // The value type implements it: the payload
                                // address is the receiver.
                                target
                            } else {
                                // Inherited implementation: box and call.
                                match rt.alloc_box(class) {
                                    Ok(boxed) => {
                                        core::ptr::copy_nonoverlapping(
                                            recv_ptr as *const u8,
                                            boxed.field_ptr(HEADER_SIZE),
                                            desc.value_size as usize,
                                        );
                                        *recv_slot = StackSlot::from_obj(boxed);
                                    }
                                    Err(kind) => raise!(kind),
                                }
                                target
                            }
                        } else {
                            // Reference-typed constraint: dereference and
                            // dispatch on the object.
                            let obj =
                                ObjRef::from_addr(read_mem::<usize>(recv_ptr as *const u8));
                            null_check!(obj.addr());
                            *recv_slot = StackSlot::from_obj(obj);
                            if callee.desc.is_virtual() && !callee.desc.is_final() {
                                match engine
                                    .registry()
                                    .resolve_virtual(meta, rt, &callee, obj.class())
                                {
                                    Ok(t) => t.method,
                                    Err(_) => raise!(RuntimeExceptionKind::MissingMethod),
                                }
                            } else {
                                callee
                            }
                        };
                        vt_sp -= args_vt_bytes(meta, &resolved.desc.signature);
                        do_invoke!(resolved, false);
                    }
                    MintOp::Calli => {
                        let sig = match &items[short!(1) as usize] {
                            DataItem::Sig(s) => s.clone(),
                            _ => raise!(RuntimeExceptionKind::ExecutionEngine),
                        };
                        let ftn = pop_slot!().as_word();
                        let callee = match engine.ftn_method(ftn) {
                            Some(m) => m,
                            None => raise!(RuntimeExceptionKind::InvalidOperation),
                        };
                        let _ = sig;
                        vt_sp -= args_vt_bytes(meta, &callee.desc.signature);
                        do_invoke!(callee, false);
                    }
                    MintOp::Vtresult => {
                        let size = short!(1) as u32;
                        vt_sp += vt_align(size);
                    }

                    // ===== Returns =====
                    MintOp::Ret => {
                        let v = pop_slot!();
                        if !frame.retval.is_null() {
                            *frame.retval = v;
                        }
                        break 'dispatch BlockExit::Completed;
                    }
                    MintOp::RetVoid => break 'dispatch BlockExit::Completed,
                    MintOp::RetVt => {
                        let size = short!(1) as usize;
                        let src = pop_slot!().as_mut_ptr();
                        if !frame.retval.is_null() {
                            let dst = (*frame.retval).as_mut_ptr();
                            core::ptr::copy_nonoverlapping(src, dst, size);
                        }
                        break 'dispatch BlockExit::Completed;
                    }

                    // ===== Exceptions =====
                    MintOp::Throw => {
                        let exc = pop_slot!().as_obj();
                        if exc.is_null() {
                            raise!(RuntimeExceptionKind::NullReference);
                        }
                        raise_obj!(exc);
                    }
                    MintOp::ThrowUnsupported => {
                        raise!(RuntimeExceptionKind::NotSupported);
                    }
                    MintOp::Rethrow => {
                        let exvar = short!(1) as u32;
                        let exc =
                            ObjRef::from_addr(read_mem::<usize>(frame.local_ptr(exvar)));
                        if exc.is_null() {
                            raise!(RuntimeExceptionKind::InvalidOperation);
                        }
                        // Resume the search just past the rethrow so the
                        // owning clause does not match itself.
                        break 'dispatch BlockExit::Raise {
                            exc,
                            ip: (opcode_ip + 2) as u32,
                        };
                    }
                    MintOp::EndFinally => {
                        if let Some(next) = chain.pop() {
                            ip = next as usize;
                            continue 'dispatch;
                        }
                        if mode == ExecMode::Clause {
                            break 'dispatch BlockExit::EndClause;
                        }
                        raise!(RuntimeExceptionKind::ExecutionEngine);
                    }
                    MintOp::EndFilter => {
                        let v = pop_slot!().as_i32();
                        if mode == ExecMode::Clause {
                            break 'dispatch BlockExit::FilterResult(v);
                        }
                        raise!(RuntimeExceptionKind::ExecutionEngine);
                    }

                    // ===== Safepoints and debugger =====
                    MintOp::Safepoint => interrupt_poll!(),
                    MintOp::SdbIntrLoc => {
                        interrupt_poll!();
                        seq_point_hooks!();
                    }
                    MintOp::SdbSeqPoint => seq_point_hooks!(),
                    MintOp::SdbBreakpoint => {
                        if let Some(hook) = engine.debug().hook() {
                            hook.breakpoint(method.handle, opcode_ip as u32);
                        }
                    }
                }

                ip = opcode_ip + op.len_at(code, opcode_ip);
                // Any live value-type storage is reachable from a stack
                // slot, so an empty stack resets the area.
                if sp == 0 {
                    vt_sp = 0;
                }
            };

            // ================================================================
            // Exception orchestration
            // ================================================================
            let this_frame = frame as *const Frame as *mut Frame;
            let (mut unwind, raise_ip) = match exit {
                BlockExit::Completed => return RunOutcome::Completed,
                BlockExit::EndClause => return RunOutcome::EndClause,
                BlockExit::FilterResult(v) => return RunOutcome::FilterResult(v),
                BlockExit::Raise { exc, ip: at } => {
                    frame.ip.set(at);
                    frame.pending_exception.set(exc);
                    // The external unwinder may have installed resume
                    // state for this frame while native frames unwound.
                    if let Some(resume) = self.ctx.take_resume() {
                        if core::ptr::eq(resume.frame, this_frame) {
                            frame.pending_exception.set(ObjRef::null());
                            vt_sp = 0;
                            chain.clear();
                            *frame.stack_ptr(0) = StackSlot::from_obj(resume.exception);
                            sp = 1;
                            ip = resume.handler_ip as usize;
                            continue 'frame_loop;
                        }
                    }
                    let unwind = self.search_handler(frame, at, exc);
                    (unwind, at)
                }
                BlockExit::Unwound { unwind, ip: at } => {
                    frame.ip.set(at);
                    frame.pending_exception.set(unwind.exc);
                    (unwind, at)
                }
            };
            'unwind: loop {
                if core::ptr::eq(unwind.target, this_frame) {
                    let clause_index = unwind.clause_index as usize;
                    // Finally and fault handlers of enclosed clauses run
                    // before the matched handler, innermost first.
                    for idx in 0..clause_index {
                        let clause = &mcode.clauses[idx];
                        if !clause.covers(raise_ip)
                            || !matches!(clause.kind, ClauseKind::Finally | ClauseKind::Fault)
                        {
                            continue;
                        }
                        match self.run_clause(frame, clause.handler_start, None) {
                            RunOutcome::EndClause => {}
                            RunOutcome::Unwinding(new_unwind) => {
                                unwind = new_unwind;
                                continue 'unwind;
                            }
                            _ => {
                                unwind = Unwind::unhandled(rt.create_exception(
                                    RuntimeExceptionKind::ExecutionEngine,
                                ));
                                continue 'unwind;
                            }
                        }
                    }
                    let clause = &mcode.clauses[clause_index];
                    write_mem::<usize>(
                        frame.local_ptr(clause.exvar_offset),
                        unwind.exc.addr(),
                    );
                    frame.pending_exception.set(ObjRef::null());
                    sp = 0;
                    vt_sp = 0;
                    chain.clear();
                    *frame.stack_ptr(0) = StackSlot::from_obj(unwind.exc);
                    sp = 1;
                    ip = unwind.handler_ip as usize;
                    continue 'frame_loop;
                }

                // Not this frame's handler: run every finally and fault
                // clause protecting the faulting location, then keep
                // unwinding.
                for clause in mcode.clauses.iter() {
                    if !clause.covers(raise_ip)
                        || !matches!(clause.kind, ClauseKind::Finally | ClauseKind::Fault)
                    {
                        continue;
                    }
                    match self.run_clause(frame, clause.handler_start, None) {
                        RunOutcome::EndClause => {}
                        RunOutcome::Unwinding(new_unwind) => {
                            unwind = new_unwind;
                            continue 'unwind;
                        }
                        _ => {
                            unwind = Unwind::unhandled(
                                rt.create_exception(RuntimeExceptionKind::ExecutionEngine),
                            );
                            continue 'unwind;
                        }
                    }
                }
                return RunOutcome::Unwinding(unwind);
            }
        }
    }
}

/// Element address with bounds checks; rank 1 indexes against the length
/// word, higher ranks apply per-dimension lower bounds.
///
/// # Safety
/// `arr` must be a live array object of the given element size.
unsafe fn elem_addr(
    arr: ObjRef,
    indices: &[i64],
    esize: u32,
) -> Result<*mut u8, RuntimeExceptionKind> {
    let rank = indices.len() as u32;
    if rank == 1 {
        let idx = indices[0];
        if idx < 0 || idx as usize >= arr.length() {
            return Err(RuntimeExceptionKind::IndexOutOfRange);
        }
        Ok(arr.field_ptr(array_data_offset(1) + (idx as u32) * esize))
    } else {
        let mut linear: i64 = 0;
        for (d, &idx) in indices.iter().enumerate() {
            let (lower, count) = arr.bounds(d as u32);
            let adjusted = idx - lower as i64;
            if adjusted < 0 || adjusted >= count as i64 {
                return Err(RuntimeExceptionKind::IndexOutOfRange);
            }
            linear = linear * count as i64 + adjusted;
        }
        Ok(arr.field_ptr(array_data_offset(rank) + (linear as u32) * esize))
    }
}

/// Capture a stack-walk snapshot for diagnostics and the stack walker.
pub(crate) unsafe fn capture_backtrace(top: *mut Frame) -> Vec<FrameInfo> {
    let mut frames = Vec::new();
    let mut cur = top;
    while !cur.is_null() {
        let frame = &*cur;
        frames.push(FrameInfo::capture(frame));
        cur = frame.parent;
    }
    frames
}

