//! Reference host runtime
//!
//! A self-contained [`MetadataProvider`] + [`ObjectRuntime`] over an
//! in-memory class registry and a non-collecting heap. It exists for the
//! test suite and for embedders that want a working runtime without
//! bringing their own metadata and collector; production embeddings
//! supply their own collaborators.
//!
//! Objects are allocated as individually boxed word buffers kept alive
//! for the runtime's lifetime, which makes every reference trivially
//! stable. No collection ever happens.

mod builder;

pub use builder::{ClassBuilder, HostBuilder, MethodBuilder};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cilrun_cil::body::MethodBody;
use cilrun_cil::il::Token;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::bridge::NativeThunk;
use crate::error::{EngineError, EngineResult, RuntimeExceptionKind};
use crate::meta::{
    ClassDesc, ClassId, FieldDesc, FieldId, MetadataProvider, MethodDesc, MethodHandle,
    MethodSignature, TypeContext, TypeDesc, WrapperNeed,
};
use crate::object::{
    array_data_offset, ObjRef, ObjectRuntime, HEADER_SIZE, LENGTH_OFFSET, STRING_DATA_OFFSET, WORD,
};

const TOKEN_CLASS: u32 = 0x0200_0000;
const TOKEN_FIELD: u32 = 0x0400_0000;
const TOKEN_METHOD: u32 = 0x0600_0000;
const TOKEN_SIG: u32 = 0x1100_0000;
const TOKEN_STRING: u32 = 0x7000_0000;
const TOKEN_KIND_MASK: u32 = 0xFF00_0000;
const TOKEN_INDEX_MASK: u32 = 0x00FF_FFFF;

pub(crate) struct HostMethod {
    pub desc: Arc<MethodDesc>,
    pub body: Option<Arc<MethodBody>>,
    pub locals: Vec<TypeDesc>,
    pub seq_points: Option<Vec<u32>>,
    pub native: Option<Arc<dyn NativeThunk>>,
}

/// The reference host.
pub struct HostRuntime {
    classes: RwLock<Vec<Arc<ClassDesc>>>,
    vtables: RwLock<Vec<Vec<MethodHandle>>>,
    interfaces: RwLock<Vec<Vec<(ClassId, u16)>>>,
    methods: RwLock<Vec<HostMethod>>,
    fields: RwLock<Vec<FieldDesc>>,
    statics: RwLock<FxHashMap<u32, Box<[u64]>>>,
    signatures: RwLock<Vec<Arc<MethodSignature>>>,
    string_pool: RwLock<Vec<String>>,
    string_cache: Mutex<FxHashMap<u32, ObjRef>>,
    exception_classes: RwLock<FxHashMap<RuntimeExceptionKind, ClassId>>,
    array_classes: Mutex<FxHashMap<(ClassId, u32), ClassId>>,
    heap: Mutex<Vec<Box<[u64]>>>,
    pending_interrupt: AtomicUsize,
    string_class: ClassId,
}

impl HostRuntime {
    pub(crate) fn from_parts(
        classes: Vec<Arc<ClassDesc>>,
        vtables: Vec<Vec<MethodHandle>>,
        interfaces: Vec<Vec<(ClassId, u16)>>,
        methods: Vec<HostMethod>,
        fields: Vec<FieldDesc>,
        statics: FxHashMap<u32, Box<[u64]>>,
        signatures: Vec<Arc<MethodSignature>>,
        string_pool: Vec<String>,
        exception_classes: FxHashMap<RuntimeExceptionKind, ClassId>,
        string_class: ClassId,
    ) -> Arc<HostRuntime> {
        Arc::new(HostRuntime {
            classes: RwLock::new(classes),
            vtables: RwLock::new(vtables),
            interfaces: RwLock::new(interfaces),
            methods: RwLock::new(methods),
            fields: RwLock::new(fields),
            statics: RwLock::new(statics),
            signatures: RwLock::new(signatures),
            string_pool: RwLock::new(string_pool),
            string_cache: Mutex::new(FxHashMap::default()),
            exception_classes: RwLock::new(exception_classes),
            array_classes: Mutex::new(FxHashMap::default()),
            heap: Mutex::new(Vec::new()),
            pending_interrupt: AtomicUsize::new(0),
            string_class,
        })
    }

    /// Metadata token for a method handle.
    pub fn method_token(handle: MethodHandle) -> Token {
        Token(TOKEN_METHOD | handle.0)
    }

    /// Metadata token for a class.
    pub fn class_token(class: ClassId) -> Token {
        Token(TOKEN_CLASS | class.0)
    }

    /// Metadata token for a field.
    pub fn field_token(field: FieldId) -> Token {
        Token(TOKEN_FIELD | field.0)
    }

    /// Request a thread interruption delivering `exc` at the next
    /// suspension point.
    pub fn interrupt_with(&self, exc: ObjRef) {
        self.pending_interrupt.store(exc.addr(), Ordering::SeqCst);
    }

    /// Allocate `words` zeroed words on the leak-heap.
    fn alloc_words(&self, words: usize) -> ObjRef {
        let mut block = vec![0u64; words.max(1)].into_boxed_slice();
        let ptr = block.as_mut_ptr() as *mut u8;
        self.heap.lock().push(block);
        ObjRef::from_ptr(ptr)
    }

    fn class(&self, id: ClassId) -> Arc<ClassDesc> {
        self.classes.read()[id.0 as usize].clone()
    }

    fn element_size(&self, elem: ClassId) -> u32 {
        let desc = self.class(elem);
        if desc.is_valuetype {
            desc.value_size
        } else {
            WORD
        }
    }

    /// Build a string object from text.
    pub fn new_string(&self, text: &str) -> ObjRef {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.alloc_string(&units).expect("string allocation")
    }

    /// Read a managed string back into Rust text.
    ///
    /// # Safety
    /// `s` must be a live string object of this runtime.
    pub unsafe fn read_string(&self, s: ObjRef) -> String {
        let len = s.length();
        let mut units = Vec::with_capacity(len);
        for i in 0..len {
            units.push(crate::slot::read_mem::<u16>(
                s.field_ptr(STRING_DATA_OFFSET + (i as u32) * 2),
            ));
        }
        String::from_utf16_lossy(&units)
    }
}

// ============================================================================
// MetadataProvider
// ============================================================================

impl MetadataProvider for HostRuntime {
    fn method_desc(
        &self,
        method: MethodHandle,
        _ctx: TypeContext,
    ) -> EngineResult<Arc<MethodDesc>> {
        self.methods
            .read()
            .get(method.0 as usize)
            .map(|m| m.desc.clone())
            .ok_or_else(|| EngineError::Metadata(format!("unknown method {}", method.0)))
    }

    fn method_body(&self, method: MethodHandle) -> EngineResult<Arc<MethodBody>> {
        self.methods
            .read()
            .get(method.0 as usize)
            .and_then(|m| m.body.clone())
            .ok_or(EngineError::MissingBody)
    }

    fn method_locals(&self, method: MethodHandle) -> EngineResult<Vec<TypeDesc>> {
        self.methods
            .read()
            .get(method.0 as usize)
            .map(|m| m.locals.clone())
            .ok_or_else(|| EngineError::Metadata(format!("unknown method {}", method.0)))
    }

    fn method_seq_points(&self, method: MethodHandle) -> Option<Vec<u32>> {
        self.methods
            .read()
            .get(method.0 as usize)
            .and_then(|m| m.seq_points.clone())
    }

    fn resolve_method(&self, token: Token, _ctx: TypeContext) -> EngineResult<MethodHandle> {
        if token.0 & TOKEN_KIND_MASK == TOKEN_METHOD {
            Ok(MethodHandle(token.0 & TOKEN_INDEX_MASK))
        } else {
            Err(EngineError::Metadata(format!(
                "token {:#010x} is not a method token",
                token.0
            )))
        }
    }

    fn resolve_field(&self, token: Token, _ctx: TypeContext) -> EngineResult<FieldDesc> {
        if token.0 & TOKEN_KIND_MASK != TOKEN_FIELD {
            return Err(EngineError::Metadata(format!(
                "token {:#010x} is not a field token",
                token.0
            )));
        }
        self.fields
            .read()
            .get((token.0 & TOKEN_INDEX_MASK) as usize)
            .cloned()
            .ok_or_else(|| EngineError::Metadata(format!("unknown field token {:#010x}", token.0)))
    }

    fn resolve_class(&self, token: Token, _ctx: TypeContext) -> EngineResult<ClassId> {
        if token.0 & TOKEN_KIND_MASK != TOKEN_CLASS {
            return Err(EngineError::Metadata(format!(
                "token {:#010x} is not a type token",
                token.0
            )));
        }
        let id = ClassId(token.0 & TOKEN_INDEX_MASK);
        if (id.0 as usize) < self.classes.read().len() {
            Ok(id)
        } else {
            Err(EngineError::Metadata(format!(
                "unknown type token {:#010x}",
                token.0
            )))
        }
    }

    fn resolve_signature(&self, token: Token) -> EngineResult<Arc<MethodSignature>> {
        if token.0 & TOKEN_KIND_MASK != TOKEN_SIG {
            return Err(EngineError::Metadata(format!(
                "token {:#010x} is not a signature token",
                token.0
            )));
        }
        self.signatures
            .read()
            .get((token.0 & TOKEN_INDEX_MASK) as usize)
            .cloned()
            .ok_or_else(|| {
                EngineError::Metadata(format!("unknown signature token {:#010x}", token.0))
            })
    }

    fn class_desc(&self, class: ClassId) -> Arc<ClassDesc> {
        self.class(class)
    }

    fn is_assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }
        let from_desc = self.class(from);
        let to_desc = self.class(to);
        // Array covariance: same rank, reference elements assignable,
        // value elements identical.
        if from_desc.is_array() && to_desc.is_array() {
            if from_desc.rank != to_desc.rank {
                return false;
            }
            let (fe, te) = match (from_desc.element, to_desc.element) {
                (Some(f), Some(t)) => (f, t),
                _ => return false,
            };
            if self.class(fe).is_valuetype || self.class(te).is_valuetype {
                return fe == te;
            }
            return self.is_assignable(fe, te);
        }
        // Interface implementation.
        if to_desc.is_interface() {
            let mut cur = Some(from);
            while let Some(c) = cur {
                if self.interfaces.read()[c.0 as usize]
                    .iter()
                    .any(|(i, _)| *i == to)
                {
                    return true;
                }
                cur = self.class(c).parent;
            }
            return false;
        }
        // Inheritance chain.
        let mut cur = from_desc.parent;
        while let Some(c) = cur {
            if c == to {
                return true;
            }
            cur = self.class(c).parent;
        }
        false
    }

    fn vtable_method(&self, class: ClassId, slot: u16) -> EngineResult<MethodHandle> {
        self.vtables
            .read()
            .get(class.0 as usize)
            .and_then(|v| v.get(slot as usize))
            .copied()
            .ok_or_else(|| {
                EngineError::Metadata(format!(
                    "class #{} has no vtable slot {slot}",
                    class.0
                ))
            })
    }

    fn interface_offset(&self, class: ClassId, iface: ClassId) -> Option<u16> {
        let mut cur = Some(class);
        while let Some(c) = cur {
            if let Some((_, offset)) = self.interfaces.read()[c.0 as usize]
                .iter()
                .find(|(i, _)| *i == iface)
            {
                return Some(*offset);
            }
            cur = self.class(c).parent;
        }
        None
    }

    fn array_class(&self, elem: ClassId, rank: u32) -> ClassId {
        if let Some(id) = self.array_classes.lock().get(&(elem, rank)) {
            return *id;
        }
        let elem_desc = self.class(elem);
        let mut classes = self.classes.write();
        let id = ClassId(classes.len() as u32);
        let name: Arc<str> = if rank == 1 {
            format!("{}[]", elem_desc.name).into()
        } else {
            format!("{}[{}]", elem_desc.name, ",".repeat(rank as usize - 1)).into()
        };
        classes.push(Arc::new(ClassDesc {
            id,
            name,
            attrs: Default::default(),
            parent: Some(ClassId(builder::CLASS_ARRAY)),
            is_valuetype: false,
            value_size: WORD,
            align: WORD,
            instance_size: array_data_offset(rank),
            underlying: None,
            element: Some(elem),
            rank,
            nullable: None,
            special: None,
            remotable: false,
        }));
        drop(classes);
        self.vtables.write().push(Vec::new());
        self.interfaces.write().push(Vec::new());
        self.array_classes.lock().insert((elem, rank), id);
        id
    }

    fn wrapper_for(&self, method: MethodHandle, _need: WrapperNeed) -> EngineResult<MethodHandle> {
        // Host methods are directly invokable; the identity wrapper is
        // sufficient here.
        Ok(method)
    }

    fn exception_class(&self, kind: RuntimeExceptionKind) -> ClassId {
        self.exception_classes
            .read()
            .get(&kind)
            .copied()
            .unwrap_or(ClassId(builder::CLASS_EXCEPTION))
    }
}

// ============================================================================
// ObjectRuntime
// ============================================================================

impl ObjectRuntime for HostRuntime {
    fn alloc_object(&self, class: ClassId) -> Result<ObjRef, RuntimeExceptionKind> {
        let desc = self.class(class);
        let words = ((desc.instance_size.max(HEADER_SIZE) + 7) / 8) as usize;
        let obj = self.alloc_words(words);
        unsafe { obj.set_class(class) };
        Ok(obj)
    }

    fn alloc_array(
        &self,
        class: ClassId,
        lengths: &[i64],
        lower_bounds: Option<&[i32]>,
    ) -> Result<ObjRef, RuntimeExceptionKind> {
        let desc = self.class(class);
        let elem = desc.element.ok_or(RuntimeExceptionKind::ExecutionEngine)?;
        let esize = self.element_size(elem) as i64;
        let rank = desc.rank;

        let mut total: i64 = 1;
        for &len in lengths {
            if len < 0 {
                return Err(RuntimeExceptionKind::Overflow);
            }
            total = total
                .checked_mul(len)
                .ok_or(RuntimeExceptionKind::OutOfMemory)?;
        }
        let bytes = array_data_offset(rank) as i64
            + total
                .checked_mul(esize)
                .ok_or(RuntimeExceptionKind::OutOfMemory)?;
        let obj = self.alloc_words(((bytes + 7) / 8) as usize);
        unsafe {
            obj.set_class(class);
            crate::slot::write_mem::<usize>(obj.field_ptr(LENGTH_OFFSET), total as usize);
            if rank > 1 {
                for d in 0..rank as usize {
                    let base = obj.field_ptr(HEADER_SIZE + WORD + d as u32 * 8) as *mut i32;
                    *base = lower_bounds.map(|lb| lb[d]).unwrap_or(0);
                    *base.add(1) = lengths[d] as i32;
                }
            }
        }
        Ok(obj)
    }

    fn alloc_box(&self, class: ClassId) -> Result<ObjRef, RuntimeExceptionKind> {
        let desc = self.class(class);
        let words = ((HEADER_SIZE + desc.value_size + 7) / 8) as usize;
        let obj = self.alloc_words(words);
        unsafe { obj.set_class(class) };
        Ok(obj)
    }

    fn alloc_string(&self, chars: &[u16]) -> Result<ObjRef, RuntimeExceptionKind> {
        let bytes = STRING_DATA_OFFSET as usize + chars.len() * 2;
        let obj = self.alloc_words((bytes + 7) / 8);
        unsafe {
            obj.set_class(self.string_class);
            crate::slot::write_mem::<usize>(obj.field_ptr(LENGTH_OFFSET), chars.len());
            for (i, unit) in chars.iter().enumerate() {
                crate::slot::write_mem::<u16>(
                    obj.field_ptr(STRING_DATA_OFFSET + i as u32 * 2),
                    *unit,
                );
            }
        }
        Ok(obj)
    }

    fn string_literal(&self, token: Token) -> EngineResult<ObjRef> {
        if token.0 & TOKEN_KIND_MASK != TOKEN_STRING {
            return Err(EngineError::Metadata(format!(
                "token {:#010x} is not a string token",
                token.0
            )));
        }
        let index = token.0 & TOKEN_INDEX_MASK;
        if let Some(cached) = self.string_cache.lock().get(&index) {
            return Ok(*cached);
        }
        let text = self
            .string_pool
            .read()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                EngineError::Metadata(format!("unknown string token {:#010x}", token.0))
            })?;
        let obj = self.new_string(&text);
        self.string_cache.lock().insert(index, obj);
        Ok(obj)
    }

    unsafe fn write_ref(&self, slot: *mut u8, value: ObjRef) {
        // No generational barrier in the leak-heap; a plain store keeps
        // the contract.
        crate::slot::write_mem::<usize>(slot, value.addr());
    }

    fn static_field_addr(&self, field: FieldId) -> *mut u8 {
        let statics = self.statics.read();
        match statics.get(&field.0) {
            Some(cell) => cell.as_ptr() as *mut u8,
            None => core::ptr::null_mut(),
        }
    }

    fn create_exception(&self, kind: RuntimeExceptionKind) -> ObjRef {
        let class = self.exception_class(kind);
        self.alloc_object(class)
            .unwrap_or_else(|_| ObjRef::null())
    }

    fn poll_interrupt(&self) -> Option<ObjRef> {
        let addr = self.pending_interrupt.swap(0, Ordering::SeqCst);
        if addr == 0 {
            None
        } else {
            Some(ObjRef::from_addr(addr))
        }
    }

    fn native_entry(&self, method: MethodHandle) -> Option<Arc<dyn NativeThunk>> {
        self.methods
            .read()
            .get(method.0 as usize)
            .and_then(|m| m.native.clone())
    }
}
