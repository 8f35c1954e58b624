//! Host registry construction
//!
//! [`HostBuilder`] assembles the class/method/field tables the reference
//! host serves to the engine. `new()` seeds the well-known classes
//! (System.Object, System.String, System.Array, the primitive wrappers,
//! and the managed exception hierarchy); embedder classes and methods
//! are layered on top and the whole registry freezes into a
//! [`HostRuntime`].

use std::sync::Arc;

use cilrun_cil::body::MethodBody;
use cilrun_cil::flags::{MethodAttributes, MethodImplAttributes, TypeAttributes};
use cilrun_cil::il::Token;
use rustc_hash::FxHashMap;

use crate::bridge::NativeThunk;
use crate::error::RuntimeExceptionKind;
use crate::meta::{
    ClassDesc, ClassId, FieldDesc, FieldId, MethodBodyKind, MethodDesc, MethodHandle,
    MethodSignature, NullableLayout, SpecialClass, TypeDesc,
};
use crate::object::{HEADER_SIZE, STRING_DATA_OFFSET, WORD};

use super::{HostMethod, HostRuntime};

pub(crate) const CLASS_OBJECT: u32 = 0;
pub(crate) const CLASS_STRING: u32 = 1;
pub(crate) const CLASS_ARRAY: u32 = 2;
pub(crate) const CLASS_VALUETYPE: u32 = 3;
pub(crate) const CLASS_EXCEPTION: u32 = 4;

const TOKEN_SIG: u32 = 0x1100_0000;
const TOKEN_STRING: u32 = 0x7000_0000;

fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) & !(align - 1)
}

/// Declares one class before layout.
pub struct ClassBuilder {
    name: String,
    parent: Option<ClassId>,
    is_valuetype: bool,
    is_interface: bool,
    sealed: bool,
    fields: Vec<TypeDesc>,
    static_fields: Vec<TypeDesc>,
    special: Option<SpecialClass>,
    remotable: bool,
    underlying: Option<TypeDesc>,
    interfaces: Vec<ClassId>,
}

impl ClassBuilder {
    /// A reference class deriving from System.Object.
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_string(),
            parent: Some(ClassId(CLASS_OBJECT)),
            is_valuetype: false,
            is_interface: false,
            sealed: false,
            fields: Vec::new(),
            static_fields: Vec::new(),
            special: None,
            remotable: false,
            underlying: None,
            interfaces: Vec::new(),
        }
    }

    /// Make this a value type (deriving from System.ValueType).
    pub fn valuetype(mut self) -> Self {
        self.is_valuetype = true;
        self.parent = Some(ClassId(CLASS_VALUETYPE));
        self
    }

    /// Make this an interface.
    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self.parent = None;
        self
    }

    /// Mark the class sealed.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Set the base class.
    pub fn parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Append an instance field.
    pub fn field(mut self, ty: TypeDesc) -> Self {
        self.fields.push(ty);
        self
    }

    /// Append a static field.
    pub fn static_field(mut self, ty: TypeDesc) -> Self {
        self.static_fields.push(ty);
        self
    }

    /// Declare an implemented interface.
    pub fn implements(mut self, iface: ClassId) -> Self {
        self.interfaces.push(iface);
        self
    }

    /// Mark the class remotable (field access through the remoting hook).
    pub fn remotable(mut self) -> Self {
        self.remotable = true;
        self
    }
}

/// Declares one method before registration.
pub struct MethodBuilder {
    owner: ClassId,
    name: String,
    signature: MethodSignature,
    attrs: MethodAttributes,
    impl_attrs: MethodImplAttributes,
    kind: MethodBodyKind,
    body: Option<MethodBody>,
    locals: Vec<TypeDesc>,
    seq_points: Option<Vec<u32>>,
    native: Option<Arc<dyn NativeThunk>>,
    vtable: VtablePlacement,
}

enum VtablePlacement {
    None,
    NewSlot,
    Override(u16),
}

impl MethodBuilder {
    /// An instance IL method.
    pub fn new(owner: ClassId, name: &str, signature: MethodSignature) -> MethodBuilder {
        MethodBuilder {
            owner,
            name: name.to_string(),
            signature,
            attrs: MethodAttributes::HIDE_BY_SIG,
            impl_attrs: MethodImplAttributes::default(),
            kind: MethodBodyKind::Il,
            body: None,
            locals: Vec::new(),
            seq_points: None,
            native: None,
            vtable: VtablePlacement::None,
        }
    }

    /// Mark static.
    pub fn static_(mut self) -> Self {
        self.attrs |= MethodAttributes::STATIC;
        self
    }

    /// Mark final (sealed override).
    pub fn final_(mut self) -> Self {
        self.attrs |= MethodAttributes::FINAL;
        self
    }

    /// Mark synchronized.
    pub fn synchronized(mut self) -> Self {
        self.impl_attrs |= MethodImplAttributes::SYNCHRONIZED;
        self
    }

    /// Virtual method occupying a fresh vtable slot.
    pub fn virtual_new_slot(mut self) -> Self {
        self.attrs |= MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT;
        self.vtable = VtablePlacement::NewSlot;
        self
    }

    /// Virtual method overriding an existing slot.
    pub fn overrides(mut self, slot: u16) -> Self {
        self.attrs |= MethodAttributes::VIRTUAL;
        self.vtable = VtablePlacement::Override(slot);
        self
    }

    /// Attach the IL body.
    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Declare local variable types.
    pub fn locals(mut self, locals: Vec<TypeDesc>) -> Self {
        self.locals = locals;
        self
    }

    /// Provide symbol-side sequence points (IL offsets with source
    /// lines).
    pub fn seq_points(mut self, offsets: Vec<u32>) -> Self {
        self.seq_points = Some(offsets);
        self
    }

    /// Make this an internal call backed by a native thunk.
    pub fn icall(mut self, thunk: Arc<dyn NativeThunk>) -> Self {
        self.kind = MethodBodyKind::Icall;
        self.impl_attrs |= MethodImplAttributes::INTERNAL_CALL;
        self.native = Some(thunk);
        self
    }
}

/// Assembles a [`HostRuntime`].
pub struct HostBuilder {
    classes: Vec<Arc<ClassDesc>>,
    vtables: Vec<Vec<MethodHandle>>,
    interfaces: Vec<Vec<(ClassId, u16)>>,
    methods: Vec<HostMethod>,
    fields: Vec<FieldDesc>,
    statics: FxHashMap<u32, Box<[u64]>>,
    signatures: Vec<Arc<MethodSignature>>,
    strings: Vec<String>,
    exception_classes: FxHashMap<RuntimeExceptionKind, ClassId>,
}

impl HostBuilder {
    /// A registry seeded with the well-known classes.
    pub fn new() -> HostBuilder {
        let mut b = HostBuilder {
            classes: Vec::new(),
            vtables: Vec::new(),
            interfaces: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            statics: FxHashMap::default(),
            signatures: Vec::new(),
            strings: Vec::new(),
            exception_classes: FxHashMap::default(),
        };

        // Order matters: the CLASS_* constants name these slots.
        b.push_class(raw_class("System.Object", None, false));
        let mut string = raw_class("System.String", Some(ClassId(CLASS_OBJECT)), false);
        string.special = Some(SpecialClass::String);
        string.instance_size = STRING_DATA_OFFSET;
        string.attrs |= TypeAttributes::SEALED;
        b.push_class(string);
        let mut array = raw_class("System.Array", Some(ClassId(CLASS_OBJECT)), false);
        array.special = Some(SpecialClass::Array);
        array.attrs |= TypeAttributes::ABSTRACT;
        b.push_class(array);
        b.push_class(raw_class(
            "System.ValueType",
            Some(ClassId(CLASS_OBJECT)),
            false,
        ));
        b.push_class(raw_class(
            "System.Exception",
            Some(ClassId(CLASS_OBJECT)),
            false,
        ));

        for kind in [
            RuntimeExceptionKind::NullReference,
            RuntimeExceptionKind::IndexOutOfRange,
            RuntimeExceptionKind::ArrayTypeMismatch,
            RuntimeExceptionKind::InvalidCast,
            RuntimeExceptionKind::DivideByZero,
            RuntimeExceptionKind::Overflow,
            RuntimeExceptionKind::Arithmetic,
            RuntimeExceptionKind::ExecutionEngine,
            RuntimeExceptionKind::NotSupported,
            RuntimeExceptionKind::InvalidOperation,
            RuntimeExceptionKind::StackOverflow,
            RuntimeExceptionKind::TypeLoad,
            RuntimeExceptionKind::MissingMethod,
            RuntimeExceptionKind::OutOfMemory,
        ] {
            // DivideByZeroException derives from ArithmeticException,
            // OverflowException likewise; the rest hang off Exception.
            let parent = match kind {
                RuntimeExceptionKind::DivideByZero | RuntimeExceptionKind::Overflow => b
                    .exception_classes
                    .get(&RuntimeExceptionKind::Arithmetic)
                    .copied()
                    .unwrap_or(ClassId(CLASS_EXCEPTION)),
                _ => ClassId(CLASS_EXCEPTION),
            };
            let id = b.push_class(raw_class(kind.type_name(), Some(parent), false));
            b.exception_classes.insert(kind, id);
        }

        for (name, underlying, size) in [
            ("System.Boolean", TypeDesc::Bool, 1),
            ("System.Char", TypeDesc::Char, 2),
            ("System.SByte", TypeDesc::I1, 1),
            ("System.Byte", TypeDesc::U1, 1),
            ("System.Int16", TypeDesc::I2, 2),
            ("System.UInt16", TypeDesc::U2, 2),
            ("System.Int32", TypeDesc::I4, 4),
            ("System.UInt32", TypeDesc::U4, 4),
            ("System.Int64", TypeDesc::I8, 8),
            ("System.UInt64", TypeDesc::U8, 8),
            ("System.Single", TypeDesc::R4, 4),
            ("System.Double", TypeDesc::R8, 8),
        ] {
            let mut c = raw_class(name, Some(ClassId(CLASS_VALUETYPE)), true);
            c.underlying = Some(underlying);
            c.value_size = size;
            c.align = size;
            c.instance_size = HEADER_SIZE + size;
            b.push_class(c);
        }

        for name in ["System.IntPtr", "System.UIntPtr"] {
            let mut c = raw_class(name, Some(ClassId(CLASS_VALUETYPE)), true);
            c.special = Some(SpecialClass::MagicNumeric);
            c.value_size = WORD;
            c.align = WORD;
            c.instance_size = HEADER_SIZE + WORD;
            b.push_class(c);
        }

        b
    }

    fn push_class(&mut self, desc: ClassDesc) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let mut desc = desc;
        desc.id = id;
        let parent_vtable = desc
            .parent
            .map(|p| self.vtables[p.0 as usize].clone())
            .unwrap_or_default();
        self.classes.push(Arc::new(desc));
        self.vtables.push(parent_vtable);
        self.interfaces.push(Vec::new());
        id
    }

    /// Class id of a seeded or previously defined class, by name.
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|c| &*c.name == name)
            .map(|c| c.id)
    }

    /// Handle the next defined method will receive; handles are dense
    /// indices, which lets a method body reference itself.
    pub fn next_method_index(&self) -> usize {
        self.methods.len()
    }

    /// Vtable slot assigned to a virtual method.
    pub fn method_slot(&self, method: MethodHandle) -> Option<u16> {
        self.methods
            .get(method.0 as usize)
            .and_then(|m| m.desc.vtable_slot)
    }

    fn type_size_align(&self, ty: &TypeDesc) -> (u32, u32) {
        match ty {
            TypeDesc::Void => (0, 1),
            TypeDesc::Bool | TypeDesc::I1 | TypeDesc::U1 => (1, 1),
            TypeDesc::Char | TypeDesc::I2 | TypeDesc::U2 => (2, 2),
            TypeDesc::I4 | TypeDesc::U4 | TypeDesc::R4 => (4, 4),
            TypeDesc::I8 | TypeDesc::U8 | TypeDesc::R8 => (8, 8),
            TypeDesc::I | TypeDesc::U | TypeDesc::ByRef(_) | TypeDesc::Ptr(_) => (WORD, WORD),
            TypeDesc::Object(_) => (WORD, WORD),
            TypeDesc::ValueType(c) => {
                let desc = &self.classes[c.0 as usize];
                if desc.is_valuetype {
                    (desc.value_size, desc.align)
                } else {
                    (WORD, WORD)
                }
            }
        }
    }

    /// Lay out and register a class; returns its id plus the ids of its
    /// declared fields (instance fields first, then statics).
    pub fn define_class(&mut self, cb: ClassBuilder) -> (ClassId, Vec<FieldId>) {
        // Instance layout starts after the parent's fields.
        let parent_size = cb
            .parent
            .map(|p| {
                let parent = &self.classes[p.0 as usize];
                if cb.is_valuetype {
                    0
                } else {
                    parent.instance_size.max(HEADER_SIZE)
                }
            })
            .unwrap_or(HEADER_SIZE);
        let mut cursor = if cb.is_valuetype { 0 } else { parent_size };
        let mut align = if cb.is_valuetype { 1 } else { WORD };
        let id = ClassId(self.classes.len() as u32);

        let mut field_ids = Vec::new();
        for ty in &cb.fields {
            let (size, a) = self.type_size_align(ty);
            align = align.max(a);
            cursor = round_up(cursor, a);
            let fid = FieldId(self.fields.len() as u32);
            self.fields.push(FieldDesc {
                id: fid,
                owner: id,
                ty: ty.clone(),
                // Instance offsets include the object header; value-type
                // payloads subtract it at the access site.
                offset: if cb.is_valuetype {
                    cursor + HEADER_SIZE
                } else {
                    cursor
                },
                is_static: false,
            });
            field_ids.push(fid);
            cursor += size;
        }
        let value_size = if cb.is_valuetype {
            round_up(cursor.max(1), align)
        } else {
            WORD
        };
        let instance_size = if cb.is_valuetype {
            HEADER_SIZE + value_size
        } else {
            round_up(cursor.max(HEADER_SIZE), WORD)
        };

        for ty in &cb.static_fields {
            let (size, _) = self.type_size_align(ty);
            let fid = FieldId(self.fields.len() as u32);
            self.fields.push(FieldDesc {
                id: fid,
                owner: id,
                ty: ty.clone(),
                offset: 0,
                is_static: true,
            });
            self.statics
                .insert(fid.0, vec![0u64; ((size + 7) / 8).max(1) as usize].into_boxed_slice());
            field_ids.push(fid);
        }

        let mut attrs = TypeAttributes::default();
        if cb.is_interface {
            attrs |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        }
        if cb.sealed {
            attrs |= TypeAttributes::SEALED;
        }

        let class_id = self.push_class(ClassDesc {
            id,
            name: cb.name.into(),
            attrs,
            parent: cb.parent,
            is_valuetype: cb.is_valuetype,
            value_size,
            align,
            instance_size,
            underlying: cb.underlying,
            element: None,
            rank: 0,
            nullable: None,
            special: cb.special,
            remotable: cb.remotable,
        });
        debug_assert_eq!(class_id, id);

        for iface in cb.interfaces {
            let offset = self.vtables[id.0 as usize].len() as u16;
            let iface_slots = self.vtables[iface.0 as usize].len();
            self.vtables[id.0 as usize]
                .extend(std::iter::repeat(MethodHandle(u32::MAX)).take(iface_slots));
            self.interfaces[id.0 as usize].push((iface, offset));
        }

        (id, field_ids)
    }

    /// Register a `Nullable<T>` instantiation for a value class.
    pub fn define_nullable(&mut self, value_class: ClassId) -> ClassId {
        let value = self.classes[value_class.0 as usize].clone();
        let value_offset = round_up(1, value.align);
        let size = round_up(value_offset + value.value_size, value.align.max(1));
        self.push_class(ClassDesc {
            id: ClassId(0),
            name: format!("System.Nullable`1[{}]", value.name).into(),
            attrs: TypeAttributes::SEALED,
            parent: Some(ClassId(CLASS_VALUETYPE)),
            is_valuetype: true,
            value_size: size,
            align: value.align,
            instance_size: HEADER_SIZE + size,
            underlying: None,
            element: None,
            rank: 0,
            nullable: Some(NullableLayout {
                value_class,
                has_value_offset: 0,
                value_offset,
            }),
            special: Some(SpecialClass::Nullable),
            remotable: false,
        })
    }

    /// Register a method; virtual placements update the owner's vtable.
    pub fn define_method(&mut self, mb: MethodBuilder) -> MethodHandle {
        let handle = MethodHandle(self.methods.len() as u32);
        let vtable_slot = match mb.vtable {
            VtablePlacement::None => None,
            VtablePlacement::NewSlot => {
                let vtable = &mut self.vtables[mb.owner.0 as usize];
                vtable.push(handle);
                Some((vtable.len() - 1) as u16)
            }
            VtablePlacement::Override(slot) => {
                self.vtables[mb.owner.0 as usize][slot as usize] = handle;
                Some(slot)
            }
        };
        let kind = if mb.body.is_some() {
            mb.kind
        } else if mb.native.is_some() {
            mb.kind
        } else {
            MethodBodyKind::Abstract
        };
        self.methods.push(HostMethod {
            desc: Arc::new(MethodDesc {
                handle,
                owner: mb.owner,
                name: mb.name.into(),
                attrs: mb.attrs,
                impl_attrs: mb.impl_attrs,
                signature: mb.signature,
                vtable_slot,
                kind,
            }),
            body: mb.body.map(Arc::new),
            locals: mb.locals,
            seq_points: mb.seq_points,
            native: mb.native,
        });
        handle
    }

    /// Intern a string literal; the token feeds `ldstr`.
    pub fn string(&mut self, text: &str) -> Token {
        let index = self.strings.len() as u32;
        self.strings.push(text.to_string());
        Token(TOKEN_STRING | index)
    }

    /// Register a standalone signature; the token feeds `calli`.
    pub fn signature(&mut self, sig: MethodSignature) -> Token {
        let index = self.signatures.len() as u32;
        self.signatures.push(Arc::new(sig));
        Token(TOKEN_SIG | index)
    }

    /// Freeze the registry.
    pub fn finish(self) -> Arc<HostRuntime> {
        HostRuntime::from_parts(
            self.classes,
            self.vtables,
            self.interfaces,
            self.methods,
            self.fields,
            self.statics,
            self.signatures,
            self.strings,
            self.exception_classes,
            ClassId(CLASS_STRING),
        )
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_class(name: &str, parent: Option<ClassId>, is_valuetype: bool) -> ClassDesc {
    ClassDesc {
        id: ClassId(0),
        name: name.into(),
        attrs: TypeAttributes::default(),
        parent,
        is_valuetype,
        value_size: if is_valuetype { 0 } else { WORD },
        align: WORD,
        instance_size: HEADER_SIZE,
        underlying: None,
        element: None,
        rank: 0,
        nullable: None,
        special: None,
        remotable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_classes_are_seeded() {
        let b = HostBuilder::new();
        assert_eq!(b.find_class("System.Object"), Some(ClassId(CLASS_OBJECT)));
        assert_eq!(b.find_class("System.String"), Some(ClassId(CLASS_STRING)));
        assert!(b.find_class("System.Int32").is_some());
        assert!(b.find_class("System.DivideByZeroException").is_some());
    }

    #[test]
    fn value_class_layout_is_aligned() {
        let mut b = HostBuilder::new();
        let (id, fields) = b.define_class(
            ClassBuilder::new("Pair")
                .valuetype()
                .field(TypeDesc::I1)
                .field(TypeDesc::I8),
        );
        let desc = b.classes[id.0 as usize].clone();
        assert_eq!(desc.value_size, 16);
        assert_eq!(desc.align, 8);
        // Offsets include the header word.
        assert_eq!(b.fields[fields[0].0 as usize].offset, HEADER_SIZE);
        assert_eq!(b.fields[fields[1].0 as usize].offset, HEADER_SIZE + 8);
    }

    #[test]
    fn virtual_methods_extend_the_vtable() {
        let mut b = HostBuilder::new();
        let (base, _) = b.define_class(ClassBuilder::new("Base"));
        let sig = MethodSignature {
            has_this: true,
            params: vec![],
            ret: TypeDesc::I4,
        };
        let m = b.define_method(
            MethodBuilder::new(base, "Get", sig.clone())
                .virtual_new_slot()
                .body(MethodBody::empty()),
        );
        let (derived, _) = b.define_class(ClassBuilder::new("Derived").parent(base));
        let slot = b.methods[m.0 as usize].desc.vtable_slot.unwrap();
        assert_eq!(b.vtables[base.0 as usize][slot as usize], m);
        // Derived inherits the slot until overridden.
        assert_eq!(b.vtables[derived.0 as usize][slot as usize], m);
        let m2 = b.define_method(
            MethodBuilder::new(derived, "Get", sig)
                .overrides(slot)
                .body(MethodBody::empty()),
        );
        assert_eq!(b.vtables[derived.0 as usize][slot as usize], m2);
    }

    #[test]
    fn nullable_layout_places_payload_after_flag() {
        let mut b = HostBuilder::new();
        let int32 = b.find_class("System.Int32").unwrap();
        let nullable = b.define_nullable(int32);
        let desc = b.classes[nullable.0 as usize].clone();
        let layout = desc.nullable.unwrap();
        assert_eq!(layout.has_value_offset, 0);
        assert_eq!(layout.value_offset, 4);
        assert_eq!(desc.value_size, 8);
    }
}
