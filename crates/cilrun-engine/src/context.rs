//! Per-thread execution context
//!
//! One [`ThreadContext`] per OS thread, created lazily on the first
//! managed entry and published through thread-local storage. It owns the
//! pinned execution arena frames carve their regions from, the current
//! frame pointer, the LMF stack bracketing native transitions, and the
//! resume state installed by the external unwinder.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::RuntimeExceptionKind;
use crate::frame::Frame;
use crate::object::ObjRef;

/// Execution arena size per thread.
pub const EXEC_STACK_SIZE: usize = 1024 * 1024;

/// Headroom kept free so overflow surfaces as a managed trap before the
/// arena is truly exhausted.
pub const EXEC_REDZONE: usize = 8 * 1024;

/// Pinned bump arena backing frame memory.
///
/// Backed by a leaked 8-aligned buffer so frame pointers stay valid for
/// the context's lifetime regardless of how the context itself moves.
pub struct ExecArena {
    buf: NonNull<u64>,
    len_bytes: usize,
    pos: Cell<usize>,
}

impl ExecArena {
    fn new() -> Self {
        let words = EXEC_STACK_SIZE / 8;
        let buf = vec![0u64; words].into_boxed_slice();
        let buf = NonNull::new(Box::into_raw(buf) as *mut u64).expect("arena allocation");
        Self {
            buf,
            len_bytes: EXEC_STACK_SIZE,
            pos: Cell::new(0),
        }
    }

    /// Bump-allocate `size` bytes (8-aligned). Fails with the managed
    /// stack-overflow kind when the red zone would be crossed.
    pub fn alloc(&self, size: u32) -> Result<*mut u8, RuntimeExceptionKind> {
        let size = ((size as usize) + 7) & !7;
        let pos = self.pos.get();
        if pos + size > self.len_bytes - EXEC_REDZONE {
            return Err(RuntimeExceptionKind::StackOverflow);
        }
        self.pos.set(pos + size);
        Ok(unsafe { (self.buf.as_ptr() as *mut u8).add(pos) })
    }

    /// Current bump position, to be restored with [`ExecArena::restore`].
    #[inline]
    pub fn mark(&self) -> usize {
        self.pos.get()
    }

    /// Roll back to a previous mark (frame death).
    #[inline]
    pub fn restore(&self, mark: usize) {
        self.pos.set(mark);
    }
}

impl Drop for ExecArena {
    fn drop(&mut self) {
        unsafe {
            let slice = core::ptr::slice_from_raw_parts_mut(self.buf.as_ptr(), self.len_bytes / 8);
            drop(Box::from_raw(slice));
        }
    }
}

/// One entry of the last-managed-frame stack.
#[derive(Debug, Copy, Clone)]
pub enum LmfEntry {
    /// The interpreter exited to native code; `frame` is the managed
    /// frame just below the transition.
    InterpExit {
        /// The managed frame below the native transition.
        frame: *mut Frame,
    },
}

/// Resume state installed by the external unwinder: where managed
/// execution continues after unwinding across native frames.
#[derive(Debug, Copy, Clone)]
pub struct ResumeState {
    /// The exception being delivered.
    pub exception: ObjRef,
    /// Frame to resume in.
    pub frame: *mut Frame,
    /// Handler entry point (mint-word offset).
    pub handler_ip: u32,
}

/// Per-thread interpreter state.
pub struct ThreadContext {
    arena: ExecArena,
    current_frame: Cell<*mut Frame>,
    lmf: RefCell<Vec<LmfEntry>>,
    resume: Cell<Option<ResumeState>>,
    single_step: Cell<bool>,
    domain: Cell<u32>,
    managed_depth: Cell<u32>,
}

impl ThreadContext {
    fn new() -> Self {
        Self {
            arena: ExecArena::new(),
            current_frame: Cell::new(core::ptr::null_mut()),
            lmf: RefCell::new(Vec::new()),
            resume: Cell::new(None),
            single_step: Cell::new(false),
            domain: Cell::new(0),
            managed_depth: Cell::new(0),
        }
    }

    /// The calling thread's context, created on first use.
    pub fn current() -> Rc<ThreadContext> {
        thread_local! {
            static CTX: RefCell<Option<Rc<ThreadContext>>> = const { RefCell::new(None) };
        }
        CTX.with(|slot| {
            slot.borrow_mut()
                .get_or_insert_with(|| Rc::new(ThreadContext::new()))
                .clone()
        })
    }

    /// The frame arena.
    #[inline]
    pub fn arena(&self) -> &ExecArena {
        &self.arena
    }

    /// Innermost managed frame, null outside managed code.
    #[inline]
    pub fn current_frame(&self) -> *mut Frame {
        self.current_frame.get()
    }

    /// Enter a frame: link it under the current one and make it current.
    #[inline]
    pub fn enter_frame(&self, frame: *mut Frame) {
        self.current_frame.set(frame);
        self.managed_depth.set(self.managed_depth.get() + 1);
    }

    /// Leave a frame, restoring its parent as current. The base sentinel
    /// clears when the topmost managed frame returns.
    #[inline]
    pub fn leave_frame(&self, parent: *mut Frame) {
        self.current_frame.set(parent);
        self.managed_depth.set(self.managed_depth.get() - 1);
    }

    /// True while any managed frame is live on this thread.
    #[inline]
    pub fn in_managed_code(&self) -> bool {
        self.managed_depth.get() > 0
    }

    /// Bracket a native transition: push an LMF marker.
    pub fn push_lmf(&self, entry: LmfEntry) {
        self.lmf.borrow_mut().push(entry);
    }

    /// Close a native transition.
    pub fn pop_lmf(&self) -> Option<LmfEntry> {
        self.lmf.borrow_mut().pop()
    }

    /// Managed frame recorded by the innermost LMF entry, for the stack
    /// walker to skip native frames.
    pub fn lmf_top_frame(&self) -> Option<*mut Frame> {
        self.lmf
            .borrow()
            .last()
            .map(|LmfEntry::InterpExit { frame }| *frame)
    }

    /// Install resume state (external unwinder entry).
    pub fn set_resume(&self, state: ResumeState) {
        self.resume.set(Some(state));
    }

    /// Take pending resume state, clearing it.
    pub fn take_resume(&self) -> Option<ResumeState> {
        self.resume.take()
    }

    /// Whether single-step mode is active.
    #[inline]
    pub fn single_step(&self) -> bool {
        self.single_step.get()
    }

    /// Switch single-step mode.
    pub fn set_single_step(&self, on: bool) {
        self.single_step.set(on);
    }

    /// Current execution domain.
    #[inline]
    pub fn domain(&self) -> u32 {
        self.domain.get()
    }

    /// Reload the domain (after a native call may have switched it).
    #[inline]
    pub fn set_domain(&self, domain: u32) {
        self.domain.set(domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_bumps_and_restores() {
        let arena = ExecArena::new();
        let mark = arena.mark();
        let a = arena.alloc(24).unwrap();
        let b = arena.alloc(3).unwrap();
        // 8-aligned bump.
        assert_eq!(b as usize - a as usize, 24);
        arena.restore(mark);
        let c = arena.alloc(8).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn arena_overflow_is_a_managed_trap() {
        let arena = ExecArena::new();
        let err = arena.alloc(EXEC_STACK_SIZE as u32).unwrap_err();
        assert_eq!(err, RuntimeExceptionKind::StackOverflow);
    }

    #[test]
    fn context_is_per_thread() {
        let a = ThreadContext::current();
        let b = ThreadContext::current();
        assert!(Rc::ptr_eq(&a, &b));
        let other = std::thread::spawn(|| {
            let ctx = ThreadContext::current();
            ctx.arena().mark()
        })
        .join()
        .unwrap();
        assert_eq!(other, 0);
    }
}
