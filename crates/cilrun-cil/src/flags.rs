//! Attribute bitflags from the metadata tables
//!
//! Only the bits the interpreter core actually consults are defined; the
//! numeric values are the ECMA-335 ones so embedders can pass raw metadata
//! through unchanged.

use bitflags::bitflags;

bitflags! {
    /// `MethodAttributes` from the MethodDef table (ECMA-335 II.23.1.10).
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodAttributes: u16 {
        /// Method is defined on the type, not on instances.
        const STATIC = 0x0010;
        /// Method cannot be overridden.
        const FINAL = 0x0020;
        /// Method is dispatched through the vtable.
        const VIRTUAL = 0x0040;
        /// Method hides by signature, not just by name.
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new vtable slot.
        const NEW_SLOT = 0x0100;
        /// Method has no body of its own.
        const ABSTRACT = 0x0400;
        /// Method is special (ctor, operator, accessor).
        const SPECIAL_NAME = 0x0800;
        /// Implementation is forwarded through PInvoke.
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    /// `MethodImplAttributes` from the MethodDef table (ECMA-335 II.23.1.11).
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodImplAttributes: u16 {
        /// Body is native machine code.
        const NATIVE = 0x0001;
        /// Body is provided by the runtime itself.
        const RUNTIME = 0x0003;
        /// Method may not be inlined.
        const NO_INLINING = 0x0008;
        /// Method is single-threaded through its body.
        const SYNCHRONIZED = 0x0020;
        /// Implementation is an internal call into the host.
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// `TypeAttributes` from the TypeDef table (ECMA-335 II.23.1.15).
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Type is an interface.
        const INTERFACE = 0x0000_0020;
        /// Type cannot be instantiated directly.
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from.
        const SEALED = 0x0000_0100;
        /// Instances are laid out sequentially.
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Instances have explicit field offsets.
        const EXPLICIT_LAYOUT = 0x0000_0010;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinvoke_bit_matches_metadata_value() {
        let attrs = MethodAttributes::from_bits_retain(0x2010);
        assert!(attrs.contains(MethodAttributes::PINVOKE_IMPL));
        assert!(attrs.contains(MethodAttributes::STATIC));
    }

    #[test]
    fn runtime_impl_includes_native_bit() {
        // RUNTIME is a two-bit code, not a single flag.
        assert!(MethodImplAttributes::RUNTIME.contains(MethodImplAttributes::NATIVE));
    }
}
