//! Metadata contract
//!
//! The engine never parses metadata itself: everything it needs to know
//! about classes, fields, methods and signatures comes through the
//! [`MetadataProvider`] trait. Identifiers are opaque newtypes minted by
//! the provider; descriptor structs are returned as `Arc`s and treated as
//! immutable.

use std::sync::Arc;

use cilrun_cil::body::MethodBody;
use cilrun_cil::flags::{MethodAttributes, MethodImplAttributes, TypeAttributes};
use cilrun_cil::il::Token;

use crate::error::{EngineResult, RuntimeExceptionKind};

/// Opaque identity of a managed method.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle(pub u32);

/// Opaque identity of a class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Opaque identity of a field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FieldId(pub u32);

/// Generic instantiation context; [`TypeContext::EMPTY`] for non-generic
/// code. Opaque to the engine, meaningful to the provider's `inflate`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TypeContext(pub u32);

impl TypeContext {
    /// The non-generic context.
    pub const EMPTY: TypeContext = TypeContext(0);
}

/// A resolved type as it appears in signatures, locals, and fields.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    /// No value.
    Void,
    /// System.Boolean, stored as one byte.
    Bool,
    /// System.Char, a UTF-16 code unit.
    Char,
    /// Signed 8-bit integer.
    I1,
    /// Unsigned 8-bit integer.
    U1,
    /// Signed 16-bit integer.
    I2,
    /// Unsigned 16-bit integer.
    U2,
    /// Signed 32-bit integer.
    I4,
    /// Unsigned 32-bit integer.
    U4,
    /// Signed 64-bit integer.
    I8,
    /// Unsigned 64-bit integer.
    U8,
    /// 32-bit float.
    R4,
    /// 64-bit float.
    R8,
    /// Native signed integer.
    I,
    /// Native unsigned integer.
    U,
    /// Reference type of the given class.
    Object(ClassId),
    /// Value type of the given class.
    ValueType(ClassId),
    /// Managed pointer to the inner type.
    ByRef(Box<TypeDesc>),
    /// Unmanaged pointer to the inner type.
    Ptr(Box<TypeDesc>),
}

/// Storage classification used by the transformer and the opcode set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MintType {
    /// Signed byte storage.
    I1,
    /// Unsigned byte storage.
    U1,
    /// Signed 16-bit storage.
    I2,
    /// Unsigned 16-bit storage.
    U2,
    /// 32-bit integer storage.
    I4,
    /// 64-bit integer storage.
    I8,
    /// 32-bit float storage.
    R4,
    /// 64-bit float storage.
    R8,
    /// Object reference.
    O,
    /// Pointer-sized integer (native int, managed pointer, function pointer).
    P,
    /// Value-type payload.
    Vt,
    /// No storage.
    Void,
}

impl MintType {
    /// Byte size of this storage class; value types report the word size of
    /// their stack slot, not their payload.
    #[inline]
    pub fn size(self) -> u32 {
        match self {
            MintType::I1 | MintType::U1 => 1,
            MintType::I2 | MintType::U2 => 2,
            MintType::I4 | MintType::R4 => 4,
            MintType::I8 | MintType::R8 => 8,
            MintType::O | MintType::P | MintType::Vt => core::mem::size_of::<usize>() as u32,
            MintType::Void => 0,
        }
    }

    /// Natural alignment of this storage class.
    #[inline]
    pub fn align(self) -> u32 {
        self.size().max(1)
    }

    /// Stable small-integer encoding, used where a storage class travels
    /// in a 16-bit operand.
    pub fn code(self) -> u16 {
        match self {
            MintType::I1 => 0,
            MintType::U1 => 1,
            MintType::I2 => 2,
            MintType::U2 => 3,
            MintType::I4 => 4,
            MintType::I8 => 5,
            MintType::R4 => 6,
            MintType::R8 => 7,
            MintType::O => 8,
            MintType::P => 9,
            MintType::Vt => 10,
            MintType::Void => 11,
        }
    }

    /// Inverse of [`MintType::code`]; `None` for malformed operands.
    pub fn from_code(code: u16) -> Option<MintType> {
        Some(match code {
            0 => MintType::I1,
            1 => MintType::U1,
            2 => MintType::I2,
            3 => MintType::U2,
            4 => MintType::I4,
            5 => MintType::I8,
            6 => MintType::R4,
            7 => MintType::R8,
            8 => MintType::O,
            9 => MintType::P,
            10 => MintType::Vt,
            11 => MintType::Void,
            _ => return None,
        })
    }
}

impl TypeDesc {
    /// Class behind this type, when there is one.
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            TypeDesc::Object(c) | TypeDesc::ValueType(c) => Some(*c),
            _ => None,
        }
    }

    /// True for managed pointers.
    pub fn is_byref(&self) -> bool {
        matches!(self, TypeDesc::ByRef(_))
    }

    /// Storage classification of this type. Enums classify as their
    /// underlying primitive.
    pub fn mint_type(&self, meta: &dyn MetadataProvider) -> MintType {
        match self {
            TypeDesc::Void => MintType::Void,
            TypeDesc::Bool | TypeDesc::U1 => MintType::U1,
            TypeDesc::I1 => MintType::I1,
            TypeDesc::Char | TypeDesc::U2 => MintType::U2,
            TypeDesc::I2 => MintType::I2,
            TypeDesc::I4 | TypeDesc::U4 => MintType::I4,
            TypeDesc::I8 | TypeDesc::U8 => MintType::I8,
            TypeDesc::R4 => MintType::R4,
            TypeDesc::R8 => MintType::R8,
            TypeDesc::I | TypeDesc::U => MintType::P,
            TypeDesc::ByRef(_) | TypeDesc::Ptr(_) => MintType::P,
            TypeDesc::Object(_) => MintType::O,
            TypeDesc::ValueType(c) => {
                let desc = meta.class_desc(*c);
                if let Some(underlying) = &desc.underlying {
                    return underlying.mint_type(meta);
                }
                // Platform-sized magic numerics carry one pointer-sized
                // field and live in a plain slot; anything else is a
                // value-type payload. The layout check guards the rewrite.
                if desc.special == Some(SpecialClass::MagicNumeric)
                    && desc.value_size == core::mem::size_of::<usize>() as u32
                {
                    MintType::P
                } else {
                    MintType::Vt
                }
            }
        }
    }

    /// Storage size and alignment in the frame layout.
    pub fn size_align(&self, meta: &dyn MetadataProvider) -> (u32, u32) {
        match self.mint_type(meta) {
            MintType::Vt => {
                let desc = meta.class_desc(self.class_id().expect("value type has a class"));
                (desc.value_size, desc.align)
            }
            mt => (mt.size(), mt.align()),
        }
    }
}

/// A method signature as the engine consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    /// Whether the method takes a `this` receiver.
    pub has_this: bool,
    /// Declared parameter types, excluding `this`.
    pub params: Vec<TypeDesc>,
    /// Return type; [`TypeDesc::Void`] for none.
    pub ret: TypeDesc,
}

impl MethodSignature {
    /// Total argument slot count, including `this`.
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// True when the method produces a value.
    #[inline]
    pub fn has_result(&self) -> bool {
        self.ret != TypeDesc::Void
    }
}

/// How a method's body is provided.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MethodBodyKind {
    /// Ordinary IL body, transformed and interpreted.
    Il,
    /// Internal call into the host runtime.
    Icall,
    /// P/Invoke wrapper around a native function.
    Native,
    /// Runtime-provided body (delegate Invoke and friends).
    Runtime,
    /// No body (abstract or interface declaration).
    Abstract,
}

/// Immutable descriptor of one method.
#[derive(Debug, Clone)]
pub struct MethodDesc {
    /// The method's handle.
    pub handle: MethodHandle,
    /// Declaring class.
    pub owner: ClassId,
    /// Simple name, for intrinsic matching and dumps.
    pub name: Arc<str>,
    /// Metadata attributes.
    pub attrs: MethodAttributes,
    /// Implementation attributes.
    pub impl_attrs: MethodImplAttributes,
    /// The signature.
    pub signature: MethodSignature,
    /// Vtable slot for virtual methods.
    pub vtable_slot: Option<u16>,
    /// Body kind.
    pub kind: MethodBodyKind,
}

impl MethodDesc {
    /// True for static methods.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.attrs.contains(MethodAttributes::STATIC)
    }

    /// True for virtually dispatched methods.
    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.attrs.contains(MethodAttributes::VIRTUAL)
    }

    /// True when the method cannot be overridden.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.attrs.contains(MethodAttributes::FINAL)
    }

    /// True for synchronized methods (monitor-wrapped by the marshaller).
    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.impl_attrs.contains(MethodImplAttributes::SYNCHRONIZED)
    }
}

/// Immutable descriptor of one field.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// The field's identity.
    pub id: FieldId,
    /// Declaring class.
    pub owner: ClassId,
    /// Field type.
    pub ty: TypeDesc,
    /// Byte offset: from the object start (including the header) for
    /// instance fields, from the static base for static fields.
    pub offset: u32,
    /// Whether the field is static.
    pub is_static: bool,
}

/// Layout of a `Nullable<T>` instantiation.
#[derive(Debug, Copy, Clone)]
pub struct NullableLayout {
    /// The underlying value class.
    pub value_class: ClassId,
    /// Byte offset of the has-value flag.
    pub has_value_offset: u32,
    /// Byte offset of the payload.
    pub value_offset: u32,
}

/// Classes the transformer recognizes structurally.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpecialClass {
    /// System.String.
    String,
    /// System.Array.
    Array,
    /// Nullable<T> instantiations.
    Nullable,
    /// Platform-sized numeric value types (one pointer-sized field) whose
    /// operators lower to the pointer opcode family.
    MagicNumeric,
}

/// Immutable descriptor of one class.
#[derive(Debug, Clone)]
pub struct ClassDesc {
    /// The class's identity.
    pub id: ClassId,
    /// Namespace-qualified name.
    pub name: Arc<str>,
    /// Metadata attributes.
    pub attrs: TypeAttributes,
    /// Base class, `None` for System.Object and interfaces.
    pub parent: Option<ClassId>,
    /// True for value types.
    pub is_valuetype: bool,
    /// Byte size when stored as a value (fields, locals, array elements).
    pub value_size: u32,
    /// Natural alignment of the value layout.
    pub align: u32,
    /// Heap instance size including the object header (boxes for value
    /// types).
    pub instance_size: u32,
    /// Underlying primitive storage, for enums and the primitive wrapper
    /// classes; classification follows it instead of the value layout.
    pub underlying: Option<TypeDesc>,
    /// Element class for array classes.
    pub element: Option<ClassId>,
    /// Array rank; 0 for non-arrays, 1 for vectors.
    pub rank: u32,
    /// Nullable layout, when the class is a `Nullable<T>` instantiation.
    pub nullable: Option<NullableLayout>,
    /// Structural role the transformer recognizes.
    pub special: Option<SpecialClass>,
    /// True when field access must go through the remoting hook.
    pub remotable: bool,
}

impl ClassDesc {
    /// True for interface types.
    #[inline]
    pub fn is_interface(&self) -> bool {
        self.attrs.contains(TypeAttributes::INTERFACE)
    }

    /// True for array classes.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.rank > 0
    }
}

/// Wrapper kinds the registry may request from the marshalling layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WrapperNeed {
    /// Monitor-enter/exit wrapper for synchronized methods.
    Synchronized,
    /// Managed-to-native wrapper for P/Invoke methods.
    PInvoke,
    /// Dispatch wrapper for delegate Invoke.
    DelegateInvoke,
}

/// The metadata collaborator.
///
/// Implementations must be internally synchronized; descriptor values
/// returned from any method are immutable snapshots.
pub trait MetadataProvider: Send + Sync {
    /// Descriptor of `method` under `ctx`.
    fn method_desc(&self, method: MethodHandle, ctx: TypeContext) -> EngineResult<Arc<MethodDesc>>;

    /// IL body of `method`. Errors for body-less methods.
    fn method_body(&self, method: MethodHandle) -> EngineResult<Arc<MethodBody>>;

    /// Local variable types of `method`, in IL order.
    fn method_locals(&self, method: MethodHandle) -> EngineResult<Vec<TypeDesc>>;

    /// IL offsets carrying source-line mappings, when symbols are
    /// available. `None` disables sequence-point emission.
    fn method_seq_points(&self, method: MethodHandle) -> Option<Vec<u32>>;

    /// Resolve a method token in `ctx`.
    fn resolve_method(&self, token: Token, ctx: TypeContext) -> EngineResult<MethodHandle>;

    /// Resolve a field token in `ctx`.
    fn resolve_field(&self, token: Token, ctx: TypeContext) -> EngineResult<FieldDesc>;

    /// Resolve a type token in `ctx`.
    fn resolve_class(&self, token: Token, ctx: TypeContext) -> EngineResult<ClassId>;

    /// Resolve a standalone signature token (for `calli`).
    fn resolve_signature(&self, token: Token) -> EngineResult<Arc<MethodSignature>>;

    /// Descriptor of `class`.
    fn class_desc(&self, class: ClassId) -> Arc<ClassDesc>;

    /// Whether `from` is assignable to `to` (identity, inheritance,
    /// interface implementation, array covariance).
    fn is_assignable(&self, from: ClassId, to: ClassId) -> bool;

    /// Method installed in `class`'s vtable at `slot`.
    fn vtable_method(&self, class: ClassId, slot: u16) -> EngineResult<MethodHandle>;

    /// Offset added to interface method slots for `class`'s implementation
    /// of `iface`; `None` when the class does not implement it.
    fn interface_offset(&self, class: ClassId, iface: ClassId) -> Option<u16>;

    /// The array class of `elem` with the given rank.
    fn array_class(&self, elem: ClassId, rank: u32) -> ClassId;

    /// Re-inflate a generic method under the caller's context. Identity
    /// for non-generic methods.
    fn inflate(&self, method: MethodHandle, _ctx: TypeContext) -> EngineResult<MethodHandle> {
        Ok(method)
    }

    /// Obtain a wrapper method from the marshalling layer.
    fn wrapper_for(&self, method: MethodHandle, need: WrapperNeed) -> EngineResult<MethodHandle>;

    /// Managed class used for the given runtime exception kind.
    fn exception_class(&self, kind: RuntimeExceptionKind) -> ClassId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_type_sizes() {
        assert_eq!(MintType::I1.size(), 1);
        assert_eq!(MintType::U2.size(), 2);
        assert_eq!(MintType::I4.size(), 4);
        assert_eq!(MintType::R8.size(), 8);
        assert_eq!(MintType::P.size(), core::mem::size_of::<usize>() as u32);
        assert_eq!(MintType::Void.size(), 0);
        assert_eq!(MintType::Void.align(), 1);
    }

    #[test]
    fn signature_arg_count_includes_this() {
        let sig = MethodSignature {
            has_this: true,
            params: vec![TypeDesc::I4, TypeDesc::R8],
            ret: TypeDesc::Void,
        };
        assert_eq!(sig.arg_count(), 3);
        assert!(!sig.has_result());
    }
}
