//! Compiled methods and the per-domain method registry
//!
//! A [`CompiledMethod`] is the interned execution form of one managed
//! method: a skeleton with signature-derived fields, created on first
//! resolution, plus a one-shot [`MethodCode`] payload published by the
//! transformer. Publication goes through a `OnceCell`, so readers that
//! observe the payload observe all of it; the registry's compile lock
//! serializes transformation itself.

use std::sync::Arc;

use cilrun_cil::body::ClauseKind;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::bridge::NativeThunk;
use crate::error::{EngineError, EngineResult};
use crate::meta::{
    ClassId, FieldId, MetadataProvider, MethodBodyKind, MethodDesc, MethodHandle, MethodSignature,
    TypeContext, WrapperNeed,
};
use crate::object::{ObjRef, ObjectRuntime};
use cilrun_cil::flags::MethodAttributes;

/// An indirected operand referenced from the code stream by a 16-bit
/// index.
#[derive(Clone)]
pub enum DataItem {
    /// A callee (or `ldftn`/`ldtoken` target).
    Method(Arc<CompiledMethod>),
    /// A class (casts, allocation, boxing, element types).
    Class(ClassId),
    /// A field (static access, `ldtoken`).
    Field(FieldId),
    /// An interned string literal.
    Str(ObjRef),
    /// A standalone signature (`calli`).
    Sig(Arc<MethodSignature>),
}

/// One rewritten exception clause; all offsets are mint-word offsets.
#[derive(Debug, Clone)]
pub struct MintClause {
    /// Clause kind.
    pub kind: ClauseKind,
    /// Start of the protected range.
    pub try_start: u32,
    /// One past the protected range.
    pub try_end: u32,
    /// Start of the handler body.
    pub handler_start: u32,
    /// One past the handler body.
    pub handler_end: u32,
    /// Start of the filter range (ends at `handler_start`); only for
    /// filter clauses.
    pub filter_start: u32,
    /// Catch class; only for catch clauses.
    pub catch_class: Option<ClassId>,
    /// Frame byte offset of this clause's current-exception slot.
    pub exvar_offset: u32,
}

impl MintClause {
    /// True when `ip` lies inside the protected range.
    #[inline]
    pub fn covers(&self, ip: u32) -> bool {
        ip >= self.try_start && ip < self.try_end
    }

    /// True when `ip` lies inside the handler body.
    #[inline]
    pub fn handler_covers(&self, ip: u32) -> bool {
        ip >= self.handler_start && ip < self.handler_end
    }
}

/// Why a sequence point exists.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeqPointKind {
    /// A source-line boundary designated by the symbol provider.
    Normal,
    /// The synthetic method-entry point.
    Entry,
    /// The synthetic point before a `ret`.
    Exit,
    /// The interruption check at a loop header.
    InterruptCheck,
}

/// One sequence point of a transformed method.
#[derive(Debug, Clone)]
pub struct SeqPoint {
    /// IL offset the point maps to.
    pub il_offset: u32,
    /// Mint-word offset of the emitted opcode.
    pub native_offset: u32,
    /// Why the point was emitted.
    pub kind: SeqPointKind,
    /// Indices of sequence points reachable without crossing another
    /// sequence point; consumed by step-over.
    pub next: Vec<u32>,
}

/// A native-offset-to-IL line mapping entry.
#[derive(Debug, Copy, Clone)]
pub struct LineNumberEntry {
    /// Mint-word offset.
    pub native_offset: u32,
    /// IL byte offset.
    pub il_offset: u32,
}

/// The transformer's output: the mint stream and every side table.
///
/// Immutable once published.
pub struct MethodCode {
    /// The 16-bit opcode stream.
    pub code: Box<[u16]>,
    /// Indirected operands.
    pub data_items: Box<[DataItem]>,
    /// Frame byte offset of each argument (including `this` at 0).
    pub arg_offsets: Box<[u32]>,
    /// Frame byte offset of each local.
    pub local_offsets: Box<[u32]>,
    /// Frame byte offset of each clause's exception slot.
    pub exvar_offsets: Box<[u32]>,
    /// Rewritten exception clauses, innermost first.
    pub clauses: Box<[MintClause]>,
    /// Maximum evaluation stack depth in slots.
    pub stack_size: u32,
    /// Maximum value-type area size in bytes.
    pub vt_stack_size: u32,
    /// Byte size of the argument area.
    pub args_size: u32,
    /// Byte size of the local area, including exception slots.
    pub locals_size: u32,
    /// Total frame allocation: args + locals + stack + value-type area.
    pub alloca_size: u32,
    /// Whether locals are zero-initialized by the prologue.
    pub init_locals: bool,
    /// Sequence points, in emission order.
    pub seq_points: Box<[SeqPoint]>,
    /// Line-number mapping published to the debug backend.
    pub line_numbers: Box<[LineNumberEntry]>,
}

impl MethodCode {
    /// Nearest IL offset for a mint-word offset, for stack traces.
    pub fn il_offset_of(&self, native_offset: u32) -> u32 {
        let mut best = 0;
        for entry in self.line_numbers.iter() {
            if entry.native_offset <= native_offset {
                best = entry.il_offset;
            } else {
                break;
            }
        }
        best
    }
}

impl std::fmt::Display for MethodCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::transform::disassemble(self))
    }
}

/// The interned execution form of one managed method.
pub struct CompiledMethod {
    /// The method's handle after wrapper substitution.
    pub handle: MethodHandle,
    /// Generic instantiation context.
    pub ctx: TypeContext,
    /// Immutable method descriptor.
    pub desc: Arc<MethodDesc>,
    code: OnceCell<MethodCode>,
    jit_entry: OnceCell<Arc<dyn NativeThunk>>,
    native_entry: Option<Arc<dyn NativeThunk>>,
}

impl CompiledMethod {
    fn new(
        handle: MethodHandle,
        ctx: TypeContext,
        desc: Arc<MethodDesc>,
        native_entry: Option<Arc<dyn NativeThunk>>,
    ) -> Self {
        Self {
            handle,
            ctx,
            desc,
            code: OnceCell::new(),
            jit_entry: OnceCell::new(),
            native_entry,
        }
    }

    /// The transformed payload, when published.
    #[inline]
    pub fn code(&self) -> Option<&MethodCode> {
        self.code.get()
    }

    /// One-shot publication by the transformer. The second publication
    /// attempt (a benign race resolved by the compile lock) is ignored.
    pub(crate) fn publish_code(&self, code: MethodCode) {
        let _ = self.code.set(code);
    }

    /// Externally compiled native entry, when the JIT installed one.
    #[inline]
    pub fn jit_entry(&self) -> Option<&Arc<dyn NativeThunk>> {
        self.jit_entry.get()
    }

    /// Install a compiled native entry for this method. Later installs
    /// are ignored; the first wins.
    pub fn set_jit_entry(&self, entry: Arc<dyn NativeThunk>) {
        let _ = self.jit_entry.set(entry);
    }

    /// Native entry for P/Invoke and internal-call bodies.
    #[inline]
    pub fn native_entry(&self) -> Option<&Arc<dyn NativeThunk>> {
        self.native_entry.as_ref()
    }

    /// True when this method executes through the call bridge rather than
    /// the dispatcher.
    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self.desc.kind, MethodBodyKind::Native | MethodBodyKind::Icall)
    }
}

impl std::fmt::Debug for CompiledMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledMethod")
            .field("handle", &self.handle)
            .field("name", &self.desc.name)
            .field("transformed", &self.code.get().is_some())
            .finish()
    }
}

/// Virtual resolution result: the target method plus whether the boxed
/// receiver must be unboxed before the call.
pub struct VirtualTarget {
    /// The resolved callee.
    pub method: Arc<CompiledMethod>,
    /// True when the receiver is a box and the callee expects the payload
    /// address as `this`.
    pub unbox_receiver: bool,
}

/// Interns one [`CompiledMethod`] per (handle, context).
pub struct MethodRegistry {
    methods: DashMap<(MethodHandle, TypeContext), Arc<CompiledMethod>>,
    compile_lock: Mutex<()>,
}

impl MethodRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
            compile_lock: Mutex::new(()),
        }
    }

    /// The compile lock serializing transformation.
    pub(crate) fn compile_lock(&self) -> &Mutex<()> {
        &self.compile_lock
    }

    /// Number of interned methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True when nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Resolve `handle` under `ctx`, applying wrapper substitution and
    /// interning the result. Losing a racing insert returns the winner.
    pub fn resolve(
        &self,
        meta: &dyn MetadataProvider,
        runtime: &dyn ObjectRuntime,
        handle: MethodHandle,
        ctx: TypeContext,
    ) -> EngineResult<Arc<CompiledMethod>> {
        let mut handle = handle;
        let mut desc = meta.method_desc(handle, ctx)?;

        // Wrapper substitution precedes interning so the wrapper and the
        // raw method do not alias one registry slot.
        if desc.attrs.contains(MethodAttributes::PINVOKE_IMPL)
            && desc.kind != MethodBodyKind::Native
        {
            handle = meta.wrapper_for(handle, WrapperNeed::PInvoke)?;
            desc = meta.method_desc(handle, ctx)?;
        }
        if desc.is_synchronized() && desc.kind == MethodBodyKind::Il {
            handle = meta.wrapper_for(handle, WrapperNeed::Synchronized)?;
            desc = meta.method_desc(handle, ctx)?;
        }

        if let Some(existing) = self.methods.get(&(handle, ctx)) {
            return Ok(existing.clone());
        }

        let native_entry = match desc.kind {
            MethodBodyKind::Native | MethodBodyKind::Icall => runtime.native_entry(handle),
            _ => None,
        };
        let entry = self
            .methods
            .entry((handle, ctx))
            .or_insert_with(|| Arc::new(CompiledMethod::new(handle, ctx, desc, native_entry)));
        Ok(entry.clone())
    }

    /// Already-interned entry, if any.
    pub fn lookup(&self, handle: MethodHandle, ctx: TypeContext) -> Option<Arc<CompiledMethod>> {
        self.methods.get(&(handle, ctx)).map(|e| e.clone())
    }

    /// Resolve the concrete callee of a virtual or interface call for a
    /// receiver of `receiver_class`.
    pub fn resolve_virtual(
        &self,
        meta: &dyn MetadataProvider,
        runtime: &dyn ObjectRuntime,
        method: &Arc<CompiledMethod>,
        receiver_class: ClassId,
    ) -> EngineResult<VirtualTarget> {
        let desc = &method.desc;
        if !desc.is_virtual() || desc.is_final() {
            return Ok(VirtualTarget {
                method: method.clone(),
                unbox_receiver: false,
            });
        }

        let slot = desc.vtable_slot.ok_or_else(|| {
            EngineError::Metadata(format!("virtual method {} has no vtable slot", desc.name))
        })?;
        let owner = meta.class_desc(desc.owner);
        let slot = if owner.is_interface() {
            let offset = meta
                .interface_offset(receiver_class, desc.owner)
                .ok_or_else(|| {
                    EngineError::Metadata(format!(
                        "receiver does not implement interface {}",
                        owner.name
                    ))
                })?;
            slot + offset
        } else {
            slot
        };

        let target = meta.vtable_method(receiver_class, slot)?;
        let target = meta.inflate(target, method.ctx)?;
        let resolved = self.resolve(meta, runtime, target, method.ctx)?;

        // A boxed receiver reaching a value-type method is passed as the
        // payload address.
        let receiver = meta.class_desc(receiver_class);
        let unbox_receiver =
            receiver.is_valuetype && meta.class_desc(resolved.desc.owner).is_valuetype;

        Ok(VirtualTarget {
            method: resolved,
            unbox_receiver,
        })
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
