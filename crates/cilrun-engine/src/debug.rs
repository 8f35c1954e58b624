//! Debugger support
//!
//! The transformer emits sequence-point and interruption-check opcodes;
//! this module owns what the dispatcher consults when it hits them: the
//! breakpoint registry, the single-step hook, and the published
//! [`MethodJitInfo`] describing the mint stream as a pseudo-native code
//! range for the debug backend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::imethod::{CompiledMethod, LineNumberEntry};
use crate::meta::{MethodHandle, TypeDesc};

/// Published per-method debug information: the pseudo-native code range
/// (the mint stream), the line-number array, and the frame type tables.
#[derive(Debug, Clone)]
pub struct MethodJitInfo {
    /// The described method.
    pub method: MethodHandle,
    /// Length of the mint stream in words; the pseudo-native range is
    /// `[0, code_len)`.
    pub code_len: u32,
    /// Native-offset-to-IL mapping.
    pub line_numbers: Vec<LineNumberEntry>,
    /// Local variable types, in IL order.
    pub locals: Vec<TypeDesc>,
    /// Parameter types, excluding `this`.
    pub params: Vec<TypeDesc>,
    /// Number of exception clauses.
    pub num_clauses: u32,
}

/// Debugger callback surface. Implementations may block to pause the
/// thread.
pub trait DebuggerHook: Send + Sync {
    /// A sequence point was hit while single-stepping.
    fn sequence_point(&self, method: MethodHandle, il_offset: u32, native_offset: u32);

    /// A breakpoint trampoline fired.
    fn breakpoint(&self, method: MethodHandle, native_offset: u32);
}

type MethodKey = usize;

fn key_of(method: &Arc<CompiledMethod>) -> MethodKey {
    Arc::as_ptr(method) as MethodKey
}

/// Breakpoints, jit-info publication, and the installed hook.
pub struct DebugRegistry {
    jit_infos: DashMap<MethodKey, Arc<MethodJitInfo>>,
    breakpoints: DashMap<(MethodKey, u32), ()>,
    hook: RwLock<Option<Arc<dyn DebuggerHook>>>,
}

impl DebugRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            jit_infos: DashMap::new(),
            breakpoints: DashMap::new(),
            hook: RwLock::new(None),
        }
    }

    /// Install the debugger hook (replacing any previous one).
    pub fn set_hook(&self, hook: Arc<dyn DebuggerHook>) {
        *self.hook.write() = Some(hook);
    }

    /// The installed hook, if any.
    pub fn hook(&self) -> Option<Arc<dyn DebuggerHook>> {
        self.hook.read().clone()
    }

    /// Publish a method's debug info after transformation.
    pub fn publish(&self, method: &Arc<CompiledMethod>, info: MethodJitInfo) {
        self.jit_infos.insert(key_of(method), Arc::new(info));
    }

    /// Published info for a method, if transformed.
    pub fn find_jit_info(&self, method: &Arc<CompiledMethod>) -> Option<Arc<MethodJitInfo>> {
        self.jit_infos.get(&key_of(method)).map(|e| e.clone())
    }

    /// Mark a mint-code location as a breakpoint. Fails when the offset
    /// lies outside the method's code range.
    pub fn set_breakpoint(&self, method: &Arc<CompiledMethod>, native_offset: u32) -> bool {
        match self.jit_infos.get(&key_of(method)) {
            Some(info) if native_offset < info.code_len => {
                self.breakpoints.insert((key_of(method), native_offset), ());
                true
            }
            _ => false,
        }
    }

    /// Remove a breakpoint.
    pub fn clear_breakpoint(&self, method: &Arc<CompiledMethod>, native_offset: u32) {
        self.breakpoints.remove(&(key_of(method), native_offset));
    }

    /// Whether a breakpoint is set at the location.
    #[inline]
    pub fn has_breakpoint(&self, method: &Arc<CompiledMethod>, native_offset: u32) -> bool {
        !self.breakpoints.is_empty()
            && self.breakpoints.contains_key(&(key_of(method), native_offset))
    }
}

impl Default for DebugRegistry {
    fn default() -> Self {
        Self::new()
    }
}
