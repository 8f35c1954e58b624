//! Call bridge: managed code to native code and back
//!
//! P/Invoke wrappers, internal calls and jit-compiled bodies all cross
//! this bridge. Arguments are classified into the native ABI's integer
//! and float argument vectors, an LMF marker brackets the transition so
//! the unwinder can skip native frames, and a managed exception thrown
//! while in native code comes back as the `Err` arm of the thunk result,
//! which re-enters managed exception handling here at the bridge.

use std::sync::Arc;

use crate::context::{LmfEntry, ThreadContext};
use crate::frame::Frame;
use crate::meta::{MetadataProvider, MethodSignature, MintType};
use crate::object::{ObjRef, ObjectRuntime, WORD};
use crate::slot::StackSlot;

/// Marshalled call state handed to a native thunk.
///
/// Integer-class arguments (integers, pointers, references, small value
/// types) accumulate into `iargs`; float-class arguments into `fargs`.
/// Value types wider than a machine word are passed by pointer.
pub struct NativeCallContext {
    /// Integer-register argument vector.
    pub iargs: Vec<usize>,
    /// Float-register argument vector.
    pub fargs: Vec<f64>,
    /// Word-sized return value, written by the thunk.
    pub ret: StackSlot,
    /// Destination for a wide value-type return, or null.
    pub ret_buf: *mut u8,
    /// Whether the return value travels in a float register.
    pub is_float_ret: bool,
}

impl NativeCallContext {
    fn new() -> Self {
        Self {
            iargs: Vec::new(),
            fargs: Vec::new(),
            ret: StackSlot::zero(),
            ret_buf: core::ptr::null_mut(),
            is_float_ret: false,
        }
    }
}

/// A precompiled native entry: a P/Invoke target behind its marshalling
/// stub, a host internal call, or a jit-compiled managed body behind its
/// exception-catching thunk.
///
/// `Err` carries a managed exception raised while native code was on the
/// stack; the bridge routes it into the exception engine.
pub trait NativeThunk: Send + Sync {
    /// Perform the call.
    fn invoke(&self, call: &mut NativeCallContext) -> Result<(), ObjRef>;
}

/// Marshal `args` per the callee signature and invoke `thunk` under an
/// LMF bracket.
///
/// `ret_slot` receives word-sized results; `ret_vt_buf` receives wide
/// value-type results (it must point at `ret_size` writable bytes inside
/// the caller's frame).
///
/// # Safety
/// `args` must point at `signature.arg_count()` materialized slots;
/// value-type slots must point at live payloads; `frame` must be the
/// current frame.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn call_native(
    ctx: &ThreadContext,
    meta: &dyn MetadataProvider,
    runtime: &dyn ObjectRuntime,
    frame: *mut Frame,
    thunk: &Arc<dyn NativeThunk>,
    signature: &MethodSignature,
    args: *const StackSlot,
    ret_slot: *mut StackSlot,
    ret_vt_buf: *mut u8,
) -> Result<(), ObjRef> {
    let mut call = NativeCallContext::new();

    let mut slot_index = 0usize;
    if signature.has_this {
        call.iargs.push((*args).as_word());
        slot_index += 1;
    }
    for param in &signature.params {
        let slot = *args.add(slot_index);
        slot_index += 1;
        match param.mint_type(meta) {
            MintType::R4 | MintType::R8 => call.fargs.push(slot.as_f64()),
            MintType::Vt => {
                let (size, _) = param.size_align(meta);
                if size <= WORD {
                    // Small value types travel by value in an integer slot.
                    call.iargs.push(*(slot.as_mut_ptr() as *const usize));
                } else {
                    call.iargs.push(slot.as_word());
                }
            }
            _ => call.iargs.push(slot.as_word()),
        }
    }

    let ret_mint = signature.ret.mint_type(meta);
    call.is_float_ret = matches!(ret_mint, MintType::R4 | MintType::R8);
    if ret_mint == MintType::Vt {
        let (size, _) = signature.ret.size_align(meta);
        if size > WORD {
            call.ret_buf = ret_vt_buf;
        }
    }

    ctx.push_lmf(LmfEntry::InterpExit { frame });
    let result = thunk.invoke(&mut call);
    ctx.pop_lmf();

    // Native code may have switched execution domains.
    ctx.set_domain(runtime.current_domain());

    result?;

    match ret_mint {
        MintType::Void => {}
        MintType::Vt => {
            let (size, _) = signature.ret.size_align(meta);
            if size <= WORD && !ret_vt_buf.is_null() {
                // Small value-type returns come back in the word slot.
                let word = call.ret.as_word();
                core::ptr::copy_nonoverlapping(
                    &word as *const usize as *const u8,
                    ret_vt_buf,
                    size as usize,
                );
            }
        }
        _ => {
            if !ret_slot.is_null() {
                *ret_slot = call.ret;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddThunk;

    impl NativeThunk for AddThunk {
        fn invoke(&self, call: &mut NativeCallContext) -> Result<(), ObjRef> {
            let sum = call.iargs.iter().map(|v| *v as i64).sum::<i64>();
            call.ret = StackSlot::from_i64(sum);
            Ok(())
        }
    }

    #[test]
    fn thunk_receives_integer_vector() {
        let thunk = AddThunk;
        let mut call = NativeCallContext::new();
        call.iargs = vec![3, 4, 5];
        thunk.invoke(&mut call).unwrap();
        assert_eq!(call.ret.as_i64(), 12);
    }
}
