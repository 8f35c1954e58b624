//! Invocation frames
//!
//! A frame owns one contiguous region of the thread's execution arena,
//! laid out as: argument area, local area (with one exception slot per
//! clause), evaluation stack slots, value-type overflow area. Frames
//! themselves live on the Rust call stack of the dispatcher and are linked
//! through raw parent pointers for the stack walker.

use std::cell::Cell;
use std::sync::Arc;

use crate::imethod::CompiledMethod;
use crate::object::ObjRef;
use crate::slot::{StackSlot, SLOT_SIZE};

/// One managed invocation frame.
pub struct Frame {
    /// Caller's frame, null at the base of the managed stack.
    pub parent: *mut Frame,
    /// The method executing in this frame.
    pub imethod: Arc<CompiledMethod>,
    /// Caller-provided slot receiving the return value; null for void
    /// callers that discard it.
    pub retval: *mut StackSlot,
    /// Caller-materialized argument slots, copied in by the prologue.
    pub args: *const StackSlot,
    /// Start of the argument+local area.
    base: *mut u8,
    /// Start of the evaluation stack slots.
    stack_base: *mut StackSlot,
    /// Start of the value-type overflow area.
    vt_base: *mut u8,
    /// Instruction pointer snapshot, kept current across calls and at
    /// exception sites (mint-word offset).
    pub ip: Cell<u32>,
    /// Exception being propagated through this frame, if any.
    pub pending_exception: Cell<ObjRef>,
    /// Arena position to restore when the frame dies.
    pub(crate) arena_mark: usize,
}

impl Frame {
    /// Assemble a frame over an arena region of the method's
    /// `alloca_size`, partitioned per the method's layout.
    ///
    /// # Safety
    /// `region` must be a live arena allocation of at least
    /// `alloca_size` bytes, 8-aligned.
    pub(crate) unsafe fn from_region(
        parent: *mut Frame,
        imethod: Arc<CompiledMethod>,
        args: *const StackSlot,
        retval: *mut StackSlot,
        region: *mut u8,
        arena_mark: usize,
    ) -> Frame {
        let code = imethod.code().expect("frame requires a transformed method");
        let stack_base = region.add((code.args_size + code.locals_size) as usize);
        let vt_base = stack_base.add((code.stack_size * SLOT_SIZE) as usize);
        Frame {
            parent,
            imethod,
            retval,
            args,
            base: region,
            stack_base: stack_base as *mut StackSlot,
            vt_base,
            ip: Cell::new(0),
            pending_exception: Cell::new(ObjRef::null()),
            arena_mark,
        }
    }

    /// Address of the byte at `offset` in the argument+local area.
    #[inline]
    pub fn local_ptr(&self, offset: u32) -> *mut u8 {
        unsafe { self.base.add(offset as usize) }
    }

    /// Address of evaluation-stack slot `index`.
    #[inline]
    pub fn stack_ptr(&self, index: u32) -> *mut StackSlot {
        unsafe { self.stack_base.add(index as usize) }
    }

    /// Address of the byte at `offset` in the value-type area.
    #[inline]
    pub fn vt_ptr(&self, offset: u32) -> *mut u8 {
        unsafe { self.vt_base.add(offset as usize) }
    }

    /// The evaluation stack base.
    #[inline]
    pub fn stack_base(&self) -> *mut StackSlot {
        self.stack_base
    }

    /// The value-type area base.
    #[inline]
    pub fn vt_base(&self) -> *mut u8 {
        self.vt_base
    }
}

/// A stack-walk snapshot of one frame.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// The frame's method.
    pub method: Arc<CompiledMethod>,
    /// IL offset corresponding to the frame's saved ip.
    pub il_offset: u32,
    /// Mint-word offset of the frame's saved ip.
    pub native_offset: u32,
}

impl FrameInfo {
    /// Capture the identity and position of `frame`.
    pub fn capture(frame: &Frame) -> FrameInfo {
        let native_offset = frame.ip.get();
        let il_offset = frame
            .imethod
            .code()
            .map(|c| c.il_offset_of(native_offset))
            .unwrap_or(0);
        FrameInfo {
            method: frame.imethod.clone(),
            il_offset,
            native_offset,
        }
    }
}
