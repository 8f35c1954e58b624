//! Host entry points
//!
//! The generic managed-code entry (`runtime_invoke`), function-pointer
//! descriptors for delegates, debugger queries, the external-unwinder
//! entries, and the managed stack-walk cursor.

use std::sync::Arc;

use crate::debug::MethodJitInfo;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::frame::{Frame, FrameInfo};
use crate::imethod::CompiledMethod;
use crate::interp::{capture_backtrace, Interp, RunOutcome};
use crate::meta::{MethodHandle, MintType, TypeContext, TypeDesc};
use crate::object::{ObjRef, HEADER_SIZE};
use crate::slot::{StackSlot, SLOT_SIZE};
use crate::transform;

/// A value crossing the host boundary.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ManagedValue {
    /// No value (void returns).
    Void,
    /// 32-bit integer (also carries the narrower integer types and bool
    /// and char).
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Object reference (null included). Value-type arguments travel
    /// boxed.
    Obj(ObjRef),
    /// Native-sized integer or pointer.
    Ptr(usize),
}

/// A platform-function-pointer representation of a managed method: the
/// descriptor's id is the pointer value stored into delegates, and it
/// routes back into the dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FtnPointer(pub usize);

/// Cursor over the interpreted frames of the current thread, outermost
/// last. Used by the managed stack walker.
pub struct FrameIter {
    frames: Vec<FrameInfo>,
    pos: usize,
}

impl FrameIter {
    fn new(frames: Vec<FrameInfo>) -> Self {
        FrameIter { frames, pos: 0 }
    }

    /// Next frame, innermost first.
    pub fn next_frame(&mut self) -> Option<&FrameInfo> {
        let item = self.frames.get(self.pos);
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}

fn coerce_arg(
    engine: &Engine,
    ty: &TypeDesc,
    value: &ManagedValue,
) -> EngineResult<StackSlot> {
    let meta = engine.metadata();
    let slot = match (ty.mint_type(meta), value) {
        (MintType::I1 | MintType::U1 | MintType::I2 | MintType::U2 | MintType::I4, ManagedValue::I32(v)) => {
            StackSlot::from_i32(*v)
        }
        (MintType::I8, ManagedValue::I64(v)) => StackSlot::from_i64(*v),
        (MintType::I8, ManagedValue::I32(v)) => StackSlot::from_i64(*v as i64),
        (MintType::R4, ManagedValue::F32(v)) => StackSlot::from_f64(*v as f64),
        (MintType::R8, ManagedValue::F64(v)) => StackSlot::from_f64(*v),
        (MintType::R8, ManagedValue::F32(v)) => StackSlot::from_f64(*v as f64),
        (MintType::O, ManagedValue::Obj(o)) => StackSlot::from_obj(*o),
        (MintType::P, ManagedValue::Ptr(p)) => StackSlot::from_word(*p),
        (MintType::P, ManagedValue::I64(v)) => StackSlot::from_i64(*v),
        // Boxed value types pass their payload address; the callee
        // prologue copies the payload.
        (MintType::Vt, ManagedValue::Obj(o)) if !o.is_null() => {
            StackSlot::from_word(o.addr() + HEADER_SIZE as usize)
        }
        _ => {
            return Err(EngineError::Unsupported(format!(
                "cannot coerce {value:?} to parameter type {ty:?}"
            )));
        }
    };
    Ok(slot)
}

impl Engine {
    /// The generic managed-code entry: coerce `params` per the callee's
    /// signature, run the dispatcher, and either return the result or
    /// surface the managed exception through `exception`.
    pub fn runtime_invoke(
        &self,
        method: MethodHandle,
        this: Option<ObjRef>,
        params: &[ManagedValue],
        exception: &mut Option<ObjRef>,
    ) -> EngineResult<ManagedValue> {
        *exception = None;
        let cm = self.resolve(method, TypeContext::EMPTY)?;
        transform::ensure_transformed(self, &cm)?;
        let sig = cm.desc.signature.clone();
        let meta = self.metadata();

        if params.len() != sig.params.len() {
            return Err(EngineError::Unsupported(format!(
                "expected {} arguments, got {}",
                sig.params.len(),
                params.len()
            )));
        }

        let mut slots: Vec<StackSlot> = Vec::with_capacity(sig.arg_count());
        if sig.has_this {
            let receiver = this.unwrap_or(ObjRef::null());
            let owner = meta.class_desc(cm.desc.owner);
            if owner.is_valuetype && !receiver.is_null() {
                // Boxed receiver of a value-type method: pass the payload
                // address.
                slots.push(StackSlot::from_word(
                    receiver.addr() + HEADER_SIZE as usize,
                ));
            } else {
                slots.push(StackSlot::from_obj(receiver));
            }
        }
        for (ty, value) in sig.params.iter().zip(params) {
            slots.push(coerce_arg(self, ty, value)?);
        }

        let ret_mt = sig.ret.mint_type(meta);
        let mut vt_buf: Vec<u64> = Vec::new();
        let mut ret_slot = StackSlot::zero();
        if ret_mt == MintType::Vt {
            let (size, _) = sig.ret.size_align(meta);
            vt_buf = vec![0u64; ((size + SLOT_SIZE - 1) / SLOT_SIZE) as usize];
            ret_slot = StackSlot::from_mut_ptr(vt_buf.as_mut_ptr() as *mut u8);
        }

        let interp = Interp::new(self);
        let result = unsafe { interp.call_managed(cm.clone(), slots.as_ptr(), &mut ret_slot) };
        if let Err(unwind) = result {
            *exception = Some(unwind.exc);
            return Ok(ManagedValue::Void);
        }

        Ok(match ret_mt {
            MintType::Void => ManagedValue::Void,
            MintType::I1 | MintType::U1 | MintType::I2 | MintType::U2 | MintType::I4 => {
                ManagedValue::I32(ret_slot.as_i32())
            }
            MintType::I8 => ManagedValue::I64(ret_slot.as_i64()),
            MintType::R4 => ManagedValue::F32(ret_slot.as_f64() as f32),
            MintType::R8 => ManagedValue::F64(ret_slot.as_f64()),
            MintType::O => ManagedValue::Obj(ret_slot.as_obj()),
            MintType::P => ManagedValue::Ptr(ret_slot.as_word()),
            MintType::Vt => {
                // Box the value-type result for the caller.
                let class = sig.ret.class_id().expect("value type has a class");
                let desc = meta.class_desc(class);
                match self.object_runtime().alloc_box(class) {
                    Ok(boxed) => unsafe {
                        core::ptr::copy_nonoverlapping(
                            vt_buf.as_ptr() as *const u8,
                            boxed.field_ptr(HEADER_SIZE),
                            desc.value_size as usize,
                        );
                        ManagedValue::Obj(boxed)
                    },
                    Err(kind) => {
                        *exception = Some(self.object_runtime().create_exception(kind));
                        ManagedValue::Void
                    }
                }
            }
        })
    }

    /// Resolve and transform a method eagerly, returning its compiled
    /// form. Useful for hosts that want transform failures up front and
    /// for inspecting the produced code.
    pub fn prepare_method(&self, method: MethodHandle) -> EngineResult<Arc<CompiledMethod>> {
        let cm = self.resolve(method, TypeContext::EMPTY)?;
        transform::ensure_transformed(self, &cm)?;
        Ok(cm)
    }

    /// Obtain a function-pointer descriptor for a method, suitable for
    /// storage in a delegate.
    pub fn create_method_pointer(&self, method: MethodHandle) -> EngineResult<FtnPointer> {
        let cm = self.resolve(method, TypeContext::EMPTY)?;
        Ok(FtnPointer(self.ftn_id(&cm)))
    }

    /// Populate a delegate's method from its stored function pointer.
    pub fn init_delegate(&self, ftn: FtnPointer) -> EngineResult<Arc<CompiledMethod>> {
        self.ftn_method(ftn.0)
            .ok_or_else(|| EngineError::Metadata(format!("unknown function pointer {}", ftn.0)))
    }

    /// Published pseudo-native code info for a transformed method.
    pub fn find_jit_info(&self, method: MethodHandle) -> Option<Arc<MethodJitInfo>> {
        let cm = self.registry().lookup(method, TypeContext::EMPTY)?;
        self.debug().find_jit_info(&cm)
    }

    /// Mark a mint-code location as a breakpoint.
    pub fn set_breakpoint(&self, method: MethodHandle, native_offset: u32) -> bool {
        match self.registry().lookup(method, TypeContext::EMPTY) {
            Some(cm) => self.debug().set_breakpoint(&cm, native_offset),
            None => false,
        }
    }

    /// Remove a breakpoint.
    pub fn clear_breakpoint(&self, method: MethodHandle, native_offset: u32) {
        if let Some(cm) = self.registry().lookup(method, TypeContext::EMPTY) {
            self.debug().clear_breakpoint(&cm, native_offset);
        }
    }

    /// Switch single-step mode for the calling thread.
    pub fn set_single_step(&self, on: bool) {
        crate::context::ThreadContext::current().set_single_step(on);
    }

    /// Start a cursor over the calling thread's interpreted frames.
    pub fn frame_iter_init(&self) -> FrameIter {
        let top = crate::context::ThreadContext::current().current_frame();
        FrameIter::new(unsafe { capture_backtrace(top) })
    }

    /// External-unwinder entry: re-enter a managed frame to execute one
    /// finally clause. Returns the exception raised by the handler, if
    /// any.
    ///
    /// # Safety
    /// `frame` must be a live suspended frame of the calling thread and
    /// `handler_ip` a handler entry of its method.
    pub unsafe fn run_finally(
        &self,
        frame: *mut Frame,
        _clause_index: u32,
        handler_ip: u32,
    ) -> Option<ObjRef> {
        let interp = Interp::new(self);
        match interp.run_clause(&*frame, handler_ip, None) {
            RunOutcome::EndClause => None,
            RunOutcome::Unwinding(unwind) => Some(unwind.exc),
            _ => None,
        }
    }

    /// External-unwinder entry: record where managed execution resumes
    /// after unwinding across native frames.
    ///
    /// # Safety
    /// `frame` must be a live frame of the calling thread.
    pub unsafe fn set_resume_state(&self, exc: ObjRef, frame: *mut Frame, handler_ip: u32) {
        crate::context::ThreadContext::current().set_resume(crate::context::ResumeState {
            exception: exc,
            frame,
            handler_ip,
        });
    }
}
