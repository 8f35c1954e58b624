//! Object layout contract and the object runtime trait
//!
//! Allocation and collection belong to the embedder, but the interpreter
//! accesses object memory directly: field loads bake byte offsets into the
//! opcode stream, array opcodes index element storage, and string
//! intrinsics read the character buffer. This module pins down the layout
//! every [`ObjectRuntime`] implementation must produce.
//!
//! Layout (word = `size_of::<usize>()`, 8 on the supported targets):
//!
//! ```text
//! object:  [class word][fields ...]
//! vector:  [class word][length word][elements ...]
//! nd array:[class word][length word][lower:i32,count:i32 per dim][elements]
//! string:  [class word][length word][utf-16 code units ...]
//! ```
//!
//! Field offsets reported by the metadata provider include the header
//! word. Multi-dimensional element storage begins 8-aligned after the
//! bounds pairs.

use std::sync::Arc;

use cilrun_cil::il::Token;

use crate::error::{EngineResult, RuntimeExceptionKind};
use crate::meta::{ClassId, FieldId, MethodHandle};

/// Machine word size in bytes.
pub const WORD: u32 = core::mem::size_of::<usize>() as u32;

/// Object header size: one class word.
pub const HEADER_SIZE: u32 = WORD;

/// Offset of the length word in arrays and strings.
pub const LENGTH_OFFSET: u32 = HEADER_SIZE;

/// A reference to a managed object, or null.
///
/// Stored as a plain address so references travel in untagged stack slots
/// and in registry data structures; all dereferences are `unsafe` and
/// guarded by the interpreter's null checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjRef(usize);

impl ObjRef {
    /// The null reference.
    #[inline]
    pub const fn null() -> Self {
        ObjRef(0)
    }

    /// True for the null reference.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Wrap a raw object address.
    #[inline]
    pub fn from_ptr(ptr: *mut u8) -> Self {
        ObjRef(ptr as usize)
    }

    /// Wrap a raw address word.
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        ObjRef(addr)
    }

    /// The raw object address.
    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// The raw address word.
    #[inline]
    pub fn addr(self) -> usize {
        self.0
    }

    /// Class of the object.
    ///
    /// # Safety
    /// `self` must be non-null and point at a live object.
    #[inline]
    pub unsafe fn class(self) -> ClassId {
        ClassId(*(self.as_ptr() as *const usize) as u32)
    }

    /// Write the header class word.
    ///
    /// # Safety
    /// `self` must be non-null and point at writable object storage.
    #[inline]
    pub unsafe fn set_class(self, class: ClassId) {
        *(self.as_ptr() as *mut usize) = class.0 as usize;
    }

    /// Address of the byte at `offset` from the object start.
    ///
    /// # Safety
    /// `self` must be non-null; `offset` must lie within the object.
    #[inline]
    pub unsafe fn field_ptr(self, offset: u32) -> *mut u8 {
        self.as_ptr().add(offset as usize)
    }

    /// Element count of an array or string.
    ///
    /// # Safety
    /// `self` must be a non-null array or string.
    #[inline]
    pub unsafe fn length(self) -> usize {
        *(self.field_ptr(LENGTH_OFFSET) as *const usize)
    }

    /// Lower bound and extent of one array dimension.
    ///
    /// # Safety
    /// `self` must be a non-null array of rank > 1 and `dim` in range.
    #[inline]
    pub unsafe fn bounds(self, dim: u32) -> (i32, i32) {
        let base = self.field_ptr(HEADER_SIZE + WORD + dim * 8) as *const i32;
        (*base, *base.add(1))
    }
}

/// Byte offset of element storage for an array of the given rank.
#[inline]
pub fn array_data_offset(rank: u32) -> u32 {
    if rank <= 1 {
        HEADER_SIZE + WORD
    } else {
        // Bounds pairs are 8 bytes per dimension; keep elements 8-aligned.
        (HEADER_SIZE + WORD + rank * 8 + 7) & !7
    }
}

/// Byte offset of the character buffer of a string.
pub const STRING_DATA_OFFSET: u32 = HEADER_SIZE + WORD;

/// The object runtime collaborator: allocation, write barriers,
/// exception materialization and thread interruption.
///
/// All allocation failures are reported as managed exception kinds
/// (normally [`RuntimeExceptionKind::OutOfMemory`]), not Rust errors.
pub trait ObjectRuntime: Send + Sync {
    /// Allocate a zeroed instance of `class`, header initialized.
    fn alloc_object(&self, class: ClassId) -> Result<ObjRef, RuntimeExceptionKind>;

    /// Allocate an array of the array class `class`.
    ///
    /// `lengths` has one entry per dimension; `lower_bounds`, when
    /// present, matches it. Negative lengths report
    /// [`RuntimeExceptionKind::Overflow`].
    fn alloc_array(
        &self,
        class: ClassId,
        lengths: &[i64],
        lower_bounds: Option<&[i32]>,
    ) -> Result<ObjRef, RuntimeExceptionKind>;

    /// Allocate a box for `class` with an uninitialized (zeroed) payload.
    fn alloc_box(&self, class: ClassId) -> Result<ObjRef, RuntimeExceptionKind>;

    /// Allocate a string from UTF-16 code units.
    fn alloc_string(&self, chars: &[u16]) -> Result<ObjRef, RuntimeExceptionKind>;

    /// The interned string object for a literal token.
    fn string_literal(&self, token: Token) -> EngineResult<ObjRef>;

    /// Store `value` at `slot` with the collector's write barrier.
    ///
    /// # Safety
    /// `slot` must point at reference-typed storage.
    unsafe fn write_ref(&self, slot: *mut u8, value: ObjRef);

    /// Copy a value-type payload, honoring interior reference barriers.
    ///
    /// # Safety
    /// Both pointers must address at least `size` valid bytes.
    unsafe fn value_copy(&self, dst: *mut u8, src: *const u8, size: usize) {
        core::ptr::copy_nonoverlapping(src, dst, size);
    }

    /// Address of a static field's storage.
    fn static_field_addr(&self, field: FieldId) -> *mut u8;

    /// Materialize a managed exception object of the given kind.
    fn create_exception(&self, kind: RuntimeExceptionKind) -> ObjRef;

    /// Pending thread interruption, polled at suspension points. Returning
    /// `Some` raises the given exception on the current frame.
    fn poll_interrupt(&self) -> Option<ObjRef> {
        None
    }

    /// Current execution domain; reloaded after native calls.
    fn current_domain(&self) -> u32 {
        0
    }

    /// Hook invoked when an exception escapes the outermost frame with no
    /// out-parameter to receive it.
    fn unhandled_exception(&self, _exc: ObjRef) {}

    /// Attach the captured managed stack trace to a freshly thrown
    /// exception object.
    fn record_stack_trace(&self, _exc: ObjRef, _frames: &[crate::frame::FrameInfo]) {}

    /// Native entry for P/Invoke and internal-call methods, when the host
    /// registered one.
    fn native_entry(&self, method: MethodHandle) -> Option<Arc<dyn crate::bridge::NativeThunk>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reference() {
        assert!(ObjRef::null().is_null());
        assert!(!ObjRef::from_addr(0x1000).is_null());
        assert_eq!(ObjRef::null().addr(), 0);
    }

    #[test]
    fn data_offsets() {
        assert_eq!(array_data_offset(0), 16);
        assert_eq!(array_data_offset(1), 16);
        // Two dims: 16 + 16 bounds bytes, already 8-aligned.
        assert_eq!(array_data_offset(2), 32);
        assert_eq!(array_data_offset(3), 40);
        assert_eq!(STRING_DATA_OFFSET, 16);
    }

    #[test]
    fn header_roundtrip() {
        let mut storage = [0u64; 4];
        let obj = ObjRef::from_ptr(storage.as_mut_ptr() as *mut u8);
        unsafe {
            obj.set_class(ClassId(17));
            assert_eq!(obj.class(), ClassId(17));
        }
    }
}
