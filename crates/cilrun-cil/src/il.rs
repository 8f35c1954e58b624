//! CIL opcode enumeration and byte-stream decoding
//!
//! One enum variant per IL instruction, declared through `define_il_ops!`
//! together with its encoding byte and operand type. The extended `0xFE`
//! page lives in [`ExtInstr`], reached through [`Instr::prefixed`], which
//! mirrors how the two opcode pages are encoded on disk.

use thiserror::Error;

/// Opaque metadata token operand (type, method, field, string, signature).
///
/// The interpreter never interprets the bits; resolution belongs to the
/// embedder's metadata layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Token(pub u32);

/// IL decoding errors.
#[derive(Debug, Error)]
pub enum IlError {
    /// The code stream ended in the middle of an instruction.
    #[error("IL stream truncated at offset {offset}")]
    Truncated {
        /// Byte offset at which more input was required.
        offset: usize,
    },

    /// An undefined opcode byte was encountered.
    #[error("unknown IL opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode {
        /// The offending byte.
        byte: u8,
        /// Byte offset of the opcode.
        offset: usize,
    },
}

/// Cursor over an IL code block.
pub struct IlReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> IlReader<'a> {
    /// Create a reader positioned at the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// True when the whole block has been consumed.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IlError> {
        if self.pos + n > self.bytes.len() {
            return Err(IlError::Truncated { offset: self.pos });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, IlError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, IlError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, IlError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, IlError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

/// Operand decoding/encoding, implemented per operand type.
trait Operand: Sized {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError>;
    fn write(&self, out: &mut Vec<u8>);
}

impl Operand for u8 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        r.read_u8()
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl Operand for i8 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(r.read_u8()? as i8)
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Operand for u16 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        r.read_u16()
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Operand for i32 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(r.read_u32()? as i32)
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Operand for i64 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(r.read_u64()? as i64)
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Operand for f32 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(f32::from_bits(r.read_u32()?))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
}

impl Operand for f64 {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(f64::from_bits(r.read_u64()?))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
}

impl Operand for Token {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        Ok(Token(r.read_u32()?))
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.to_le_bytes());
    }
}

/// Switch operand: branch-target deltas, count-prefixed on disk.
impl Operand for Vec<i32> {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        let count = r.read_u32()? as usize;
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(r.read_u32()? as i32);
        }
        Ok(targets)
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for t in self {
            out.extend_from_slice(&t.to_le_bytes());
        }
    }
}

impl Operand for ExtInstr {
    fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
        ExtInstr::read(r)
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.encode_tail(out);
    }
}

/// One `if let` arm of the encoder; expands in statement position so the
/// operand binding stays in scope for the write call.
macro_rules! encode_il_op {
    ($self:expr, $out:expr, $name:ident, $disc:literal, $ident:ident) => {
        if let $name::$ident = $self {
            $out.push($disc);
            return;
        }
    };
    ($self:expr, $out:expr, $name:ident, $disc:literal, $ident:ident($ty:ty)) => {
        if let $name::$ident(v) = $self {
            $out.push($disc);
            Operand::write(v, $out);
            return;
        }
    };
}

/// One `if let` arm of the mnemonic lookup.
macro_rules! il_op_name {
    ($self:expr, $name:ident, $ident:ident) => {
        if let $name::$ident = $self {
            return stringify!($ident);
        }
    };
    ($self:expr, $name:ident, $ident:ident($ty:ty)) => {
        if let $name::$ident(_) = $self {
            return stringify!($ident);
        }
    };
}

macro_rules! define_il_ops {
    (
        $(#[$eattr:meta])*
        enum $name:ident {
            $(
                $(#[$attr:meta])*
                $ident:ident $(($ty:ty))? = $disc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$eattr])*
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $(
                $(#[$attr])*
                $ident $(($ty))?,
            )*
        }

        impl $name {
            /// Decode one instruction from the reader.
            pub fn read(r: &mut IlReader<'_>) -> Result<Self, IlError> {
                let at = r.offset();
                let disc = r.read_u8()?;
                match disc {
                    $( $disc => Ok(define_il_ops!(@construct $name, r, $ident $(($ty))?)), )*
                    other => Err(IlError::UnknownOpcode { byte: other, offset: at }),
                }
            }

            /// Append this instruction's page-local encoding (no page prefix).
            #[allow(unreachable_code)]
            fn encode_tail(&self, out: &mut Vec<u8>) {
                $( encode_il_op!(self, out, $name, $disc, $ident $(($ty))?); )*
            }

            /// Instruction mnemonic for dumps and diagnostics.
            #[allow(unreachable_code)]
            pub fn mnemonic(&self) -> &'static str {
                $( il_op_name!(self, $name, $ident $(($ty))?); )*
                unreachable!()
            }
        }
    };

    (@construct $name:ident, $r:ident, $ident:ident) => { $name::$ident };
    (@construct $name:ident, $r:ident, $ident:ident ($ty:ty)) => {
        $name::$ident(<$ty as Operand>::read($r)?)
    };
}

define_il_ops! {
    /// Base-page CIL instructions.
    enum Instr {
        /// Do nothing.
        nop = 0x00,
        /// Inform an attached debugger that a breakpoint was reached.
        brk = 0x01,
        /// Load argument 0 onto the stack.
        ldarg_0 = 0x02,
        /// Load argument 1 onto the stack.
        ldarg_1 = 0x03,
        /// Load argument 2 onto the stack.
        ldarg_2 = 0x04,
        /// Load argument 3 onto the stack.
        ldarg_3 = 0x05,
        /// Load local 0 onto the stack.
        ldloc_0 = 0x06,
        /// Load local 1 onto the stack.
        ldloc_1 = 0x07,
        /// Load local 2 onto the stack.
        ldloc_2 = 0x08,
        /// Load local 3 onto the stack.
        ldloc_3 = 0x09,
        /// Store the top of stack into local 0.
        stloc_0 = 0x0A,
        /// Store the top of stack into local 1.
        stloc_1 = 0x0B,
        /// Store the top of stack into local 2.
        stloc_2 = 0x0C,
        /// Store the top of stack into local 3.
        stloc_3 = 0x0D,
        /// Load the numbered argument, short form.
        ldarg_s(u8) = 0x0E,
        /// Load the address of the numbered argument, short form.
        ldarga_s(u8) = 0x0F,
        /// Store the top of stack into the numbered argument, short form.
        starg_s(u8) = 0x10,
        /// Load the numbered local, short form.
        ldloc_s(u8) = 0x11,
        /// Load the address of the numbered local, short form.
        ldloca_s(u8) = 0x12,
        /// Store the top of stack into the numbered local, short form.
        stloc_s(u8) = 0x13,
        /// Push a null reference.
        ldnull = 0x14,
        /// Push -1 as int32.
        ldc_i4_m1 = 0x15,
        /// Push 0 as int32.
        ldc_i4_0 = 0x16,
        /// Push 1 as int32.
        ldc_i4_1 = 0x17,
        /// Push 2 as int32.
        ldc_i4_2 = 0x18,
        /// Push 3 as int32.
        ldc_i4_3 = 0x19,
        /// Push 4 as int32.
        ldc_i4_4 = 0x1A,
        /// Push 5 as int32.
        ldc_i4_5 = 0x1B,
        /// Push 6 as int32.
        ldc_i4_6 = 0x1C,
        /// Push 7 as int32.
        ldc_i4_7 = 0x1D,
        /// Push 8 as int32.
        ldc_i4_8 = 0x1E,
        /// Push a sign-extended int8 as int32.
        ldc_i4_s(i8) = 0x1F,
        /// Push an int32 constant.
        ldc_i4(i32) = 0x20,
        /// Push an int64 constant.
        ldc_i8(i64) = 0x21,
        /// Push a float32 constant (widened to F on the stack).
        ldc_r4(f32) = 0x22,
        /// Push a float64 constant.
        ldc_r8(f64) = 0x23,
        /// Duplicate the top of stack.
        dup = 0x25,
        /// Discard the top of stack.
        pop = 0x26,
        /// Exit the current method and jump to the named method.
        jmp(Token) = 0x27,
        /// Call the method described by the token.
        call(Token) = 0x28,
        /// Call the function pointer on the stack with the given signature.
        calli(Token) = 0x29,
        /// Return from the current method.
        ret = 0x2A,
        /// Unconditional branch, short form.
        br_s(i8) = 0x2B,
        /// Branch if the value is zero, short form.
        brfalse_s(i8) = 0x2C,
        /// Branch if the value is non-zero, short form.
        brtrue_s(i8) = 0x2D,
        /// Branch if equal, short form.
        beq_s(i8) = 0x2E,
        /// Branch if greater or equal, short form.
        bge_s(i8) = 0x2F,
        /// Branch if greater, short form.
        bgt_s(i8) = 0x30,
        /// Branch if less or equal, short form.
        ble_s(i8) = 0x31,
        /// Branch if less, short form.
        blt_s(i8) = 0x32,
        /// Branch if unequal or unordered, short form.
        bne_un_s(i8) = 0x33,
        /// Branch if greater or equal, unsigned or unordered, short form.
        bge_un_s(i8) = 0x34,
        /// Branch if greater, unsigned or unordered, short form.
        bgt_un_s(i8) = 0x35,
        /// Branch if less or equal, unsigned or unordered, short form.
        ble_un_s(i8) = 0x36,
        /// Branch if less, unsigned or unordered, short form.
        blt_un_s(i8) = 0x37,
        /// Unconditional branch.
        br(i32) = 0x38,
        /// Branch if the value is zero.
        brfalse(i32) = 0x39,
        /// Branch if the value is non-zero.
        brtrue(i32) = 0x3A,
        /// Branch if equal.
        beq(i32) = 0x3B,
        /// Branch if greater or equal.
        bge(i32) = 0x3C,
        /// Branch if greater.
        bgt(i32) = 0x3D,
        /// Branch if less or equal.
        ble(i32) = 0x3E,
        /// Branch if less.
        blt(i32) = 0x3F,
        /// Branch if unequal or unordered.
        bne_un(i32) = 0x40,
        /// Branch if greater or equal, unsigned or unordered.
        bge_un(i32) = 0x41,
        /// Branch if greater, unsigned or unordered.
        bgt_un(i32) = 0x42,
        /// Branch if less or equal, unsigned or unordered.
        ble_un(i32) = 0x43,
        /// Branch if less, unsigned or unordered.
        blt_un(i32) = 0x44,
        /// Jump table over the int32 on the stack.
        switch(Vec<i32>) = 0x45,
        /// Load an int8 through the address on the stack.
        ldind_i1 = 0x46,
        /// Load a uint8 through the address on the stack.
        ldind_u1 = 0x47,
        /// Load an int16 through the address on the stack.
        ldind_i2 = 0x48,
        /// Load a uint16 through the address on the stack.
        ldind_u2 = 0x49,
        /// Load an int32 through the address on the stack.
        ldind_i4 = 0x4A,
        /// Load a uint32 through the address on the stack.
        ldind_u4 = 0x4B,
        /// Load an int64 through the address on the stack.
        ldind_i8 = 0x4C,
        /// Load a native int through the address on the stack.
        ldind_i = 0x4D,
        /// Load a float32 through the address on the stack.
        ldind_r4 = 0x4E,
        /// Load a float64 through the address on the stack.
        ldind_r8 = 0x4F,
        /// Load an object reference through the address on the stack.
        ldind_ref = 0x50,
        /// Store an object reference through the address on the stack.
        stind_ref = 0x51,
        /// Store an int8 through the address on the stack.
        stind_i1 = 0x52,
        /// Store an int16 through the address on the stack.
        stind_i2 = 0x53,
        /// Store an int32 through the address on the stack.
        stind_i4 = 0x54,
        /// Store an int64 through the address on the stack.
        stind_i8 = 0x55,
        /// Store a float32 through the address on the stack.
        stind_r4 = 0x56,
        /// Store a float64 through the address on the stack.
        stind_r8 = 0x57,
        /// Add the two top values.
        add = 0x58,
        /// Subtract the top value from the one below it.
        sub = 0x59,
        /// Multiply the two top values.
        mul = 0x5A,
        /// Divide, signed.
        div = 0x5B,
        /// Divide, unsigned.
        div_un = 0x5C,
        /// Remainder, signed.
        rem = 0x5D,
        /// Remainder, unsigned.
        rem_un = 0x5E,
        /// Bitwise and.
        and = 0x5F,
        /// Bitwise or.
        or = 0x60,
        /// Bitwise xor.
        xor = 0x61,
        /// Shift left.
        shl = 0x62,
        /// Shift right, signed.
        shr = 0x63,
        /// Shift right, unsigned.
        shr_un = 0x64,
        /// Arithmetic negation.
        neg = 0x65,
        /// Bitwise complement.
        not = 0x66,
        /// Convert to int8 (int32 on the stack).
        conv_i1 = 0x67,
        /// Convert to int16 (int32 on the stack).
        conv_i2 = 0x68,
        /// Convert to int32.
        conv_i4 = 0x69,
        /// Convert to int64.
        conv_i8 = 0x6A,
        /// Convert to float32 (F on the stack).
        conv_r4 = 0x6B,
        /// Convert to float64.
        conv_r8 = 0x6C,
        /// Convert to uint32 (int32 on the stack).
        conv_u4 = 0x6D,
        /// Convert to uint64 (int64 on the stack).
        conv_u8 = 0x6E,
        /// Call a virtual method on the object on the stack.
        callvirt(Token) = 0x6F,
        /// Copy a value type between the two addresses on the stack.
        cpobj(Token) = 0x70,
        /// Load a value type from the address on the stack.
        ldobj(Token) = 0x71,
        /// Push the string object for the token.
        ldstr(Token) = 0x72,
        /// Allocate an object and call its constructor.
        newobj(Token) = 0x73,
        /// Cast the object on the stack, trapping on failure.
        castclass(Token) = 0x74,
        /// Test the object on the stack against a type, pushing null on failure.
        isinst(Token) = 0x75,
        /// Convert an unsigned integer to F.
        conv_r_un = 0x76,
        /// Extract the value-type payload address from a boxed object.
        unbox(Token) = 0x79,
        /// Throw the exception object on the stack.
        throw = 0x7A,
        /// Load a field of the object (or value-type address) on the stack.
        ldfld(Token) = 0x7B,
        /// Load the address of a field of the object on the stack.
        ldflda(Token) = 0x7C,
        /// Store into a field of the object on the stack.
        stfld(Token) = 0x7D,
        /// Load a static field.
        ldsfld(Token) = 0x7E,
        /// Load the address of a static field.
        ldsflda(Token) = 0x7F,
        /// Store into a static field.
        stsfld(Token) = 0x80,
        /// Store a value type at the address on the stack.
        stobj(Token) = 0x81,
        /// Checked unsigned-source conversion to int8.
        conv_ovf_i1_un = 0x82,
        /// Checked unsigned-source conversion to int16.
        conv_ovf_i2_un = 0x83,
        /// Checked unsigned-source conversion to int32.
        conv_ovf_i4_un = 0x84,
        /// Checked unsigned-source conversion to int64.
        conv_ovf_i8_un = 0x85,
        /// Checked unsigned-source conversion to uint8.
        conv_ovf_u1_un = 0x86,
        /// Checked unsigned-source conversion to uint16.
        conv_ovf_u2_un = 0x87,
        /// Checked unsigned-source conversion to uint32.
        conv_ovf_u4_un = 0x88,
        /// Checked unsigned-source conversion to uint64.
        conv_ovf_u8_un = 0x89,
        /// Checked unsigned-source conversion to native int.
        conv_ovf_i_un = 0x8A,
        /// Checked unsigned-source conversion to native unsigned int.
        conv_ovf_u_un = 0x8B,
        /// Box a value type (or no-op for reference types).
        box_val(Token) = 0x8C,
        /// Allocate a one-dimensional array.
        newarr(Token) = 0x8D,
        /// Push the length of the array on the stack.
        ldlen = 0x8E,
        /// Push the address of the indexed array element.
        ldelema(Token) = 0x8F,
        /// Load an int8 array element.
        ldelem_i1 = 0x90,
        /// Load a uint8 array element.
        ldelem_u1 = 0x91,
        /// Load an int16 array element.
        ldelem_i2 = 0x92,
        /// Load a uint16 array element.
        ldelem_u2 = 0x93,
        /// Load an int32 array element.
        ldelem_i4 = 0x94,
        /// Load a uint32 array element.
        ldelem_u4 = 0x95,
        /// Load an int64 array element.
        ldelem_i8 = 0x96,
        /// Load a native-int array element.
        ldelem_i = 0x97,
        /// Load a float32 array element.
        ldelem_r4 = 0x98,
        /// Load a float64 array element.
        ldelem_r8 = 0x99,
        /// Load an object-reference array element.
        ldelem_ref = 0x9A,
        /// Store a native-int array element.
        stelem_i = 0x9B,
        /// Store an int8 array element.
        stelem_i1 = 0x9C,
        /// Store an int16 array element.
        stelem_i2 = 0x9D,
        /// Store an int32 array element.
        stelem_i4 = 0x9E,
        /// Store an int64 array element.
        stelem_i8 = 0x9F,
        /// Store a float32 array element.
        stelem_r4 = 0xA0,
        /// Store a float64 array element.
        stelem_r8 = 0xA1,
        /// Store an object-reference array element with a covariance check.
        stelem_ref = 0xA2,
        /// Load an array element of the token's type.
        ldelem(Token) = 0xA3,
        /// Store an array element of the token's type.
        stelem(Token) = 0xA4,
        /// Unbox to the value itself (or cast for reference types).
        unbox_any(Token) = 0xA5,
        /// Checked conversion to int8.
        conv_ovf_i1 = 0xB3,
        /// Checked conversion to uint8.
        conv_ovf_u1 = 0xB4,
        /// Checked conversion to int16.
        conv_ovf_i2 = 0xB5,
        /// Checked conversion to uint16.
        conv_ovf_u2 = 0xB6,
        /// Checked conversion to int32.
        conv_ovf_i4 = 0xB7,
        /// Checked conversion to uint32.
        conv_ovf_u4 = 0xB8,
        /// Checked conversion to int64.
        conv_ovf_i8 = 0xB9,
        /// Checked conversion to uint64.
        conv_ovf_u8 = 0xBA,
        /// Push the address stored in a typed reference.
        refanyval(Token) = 0xC2,
        /// Trap if the value is not a finite number.
        ckfinite = 0xC3,
        /// Build a typed reference from the pointer on the stack.
        mkrefany(Token) = 0xC6,
        /// Push the runtime representation of a metadata token.
        ldtoken(Token) = 0xD0,
        /// Convert to uint16 (int32 on the stack).
        conv_u2 = 0xD1,
        /// Convert to uint8 (int32 on the stack).
        conv_u1 = 0xD2,
        /// Convert to native int.
        conv_i = 0xD3,
        /// Checked conversion to native int.
        conv_ovf_i = 0xD4,
        /// Checked conversion to native unsigned int.
        conv_ovf_u = 0xD5,
        /// Add with signed overflow check.
        add_ovf = 0xD6,
        /// Add with unsigned overflow check.
        add_ovf_un = 0xD7,
        /// Multiply with signed overflow check.
        mul_ovf = 0xD8,
        /// Multiply with unsigned overflow check.
        mul_ovf_un = 0xD9,
        /// Subtract with signed overflow check.
        sub_ovf = 0xDA,
        /// Subtract with unsigned overflow check.
        sub_ovf_un = 0xDB,
        /// End a finally or fault handler.
        endfinally = 0xDC,
        /// Exit a protected region.
        leave(i32) = 0xDD,
        /// Exit a protected region, short form.
        leave_s(i8) = 0xDE,
        /// Store a native int through the address on the stack.
        stind_i = 0xDF,
        /// Convert to native unsigned int.
        conv_u = 0xE0,
        /// Extended-page instruction.
        prefixed(ExtInstr) = 0xFE,
    }
}

define_il_ops! {
    /// Extended-page (`0xFE`-prefixed) CIL instructions.
    enum ExtInstr {
        /// Push the argument-list handle of the current method.
        arglist = 0x00,
        /// Push 1 if the two top values are equal, else 0.
        ceq = 0x01,
        /// Push 1 if the second value is greater, signed.
        cgt = 0x02,
        /// Push 1 if the second value is greater, unsigned or unordered.
        cgt_un = 0x03,
        /// Push 1 if the second value is less, signed.
        clt = 0x04,
        /// Push 1 if the second value is less, unsigned or unordered.
        clt_un = 0x05,
        /// Push a function pointer for the named method.
        ldftn(Token) = 0x06,
        /// Push a function pointer resolved virtually on the object.
        ldvirtftn(Token) = 0x07,
        /// Load the numbered argument, long form.
        ldarg(u16) = 0x09,
        /// Load the address of the numbered argument, long form.
        ldarga(u16) = 0x0A,
        /// Store into the numbered argument, long form.
        starg(u16) = 0x0B,
        /// Load the numbered local, long form.
        ldloc(u16) = 0x0C,
        /// Load the address of the numbered local, long form.
        ldloca(u16) = 0x0D,
        /// Store into the numbered local, long form.
        stloc(u16) = 0x0E,
        /// Allocate from the local dynamic memory pool.
        localloc = 0x0F,
        /// End a filter clause, consuming the decision value.
        endfilter = 0x11,
        /// The next pointer access may be unaligned.
        unaligned(u8) = 0x12,
        /// The next pointer access is volatile.
        volatile = 0x13,
        /// The next call terminates the current method.
        tail = 0x14,
        /// Zero-initialize the value type at the address on the stack.
        initobj(Token) = 0x15,
        /// Constrain the receiver of the next callvirt.
        constrained(Token) = 0x16,
        /// Copy a block of memory.
        cpblk = 0x17,
        /// Fill a block of memory with a byte value.
        initblk = 0x18,
        /// Skip the named fault checks on the next instruction.
        no_chk(u8) = 0x19,
        /// Rethrow the exception of the enclosing catch clause.
        rethrow = 0x1A,
        /// Push the byte size of the token's type.
        sizeof(Token) = 0x1C,
        /// Push the type token stored in a typed reference.
        refanytype = 0x1D,
        /// The next ldelema skips its type check.
        readonly = 0x1E,
    }
}

impl Instr {
    /// Append this instruction's full encoding to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.encode_tail(out);
    }
}

/// Streaming decoder yielding `(byte_offset, instruction)` pairs.
pub struct InstrIter<'a> {
    reader: IlReader<'a>,
}

impl<'a> InstrIter<'a> {
    /// Iterate over the instructions of `code`.
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            reader: IlReader::new(code),
        }
    }
}

impl Iterator for InstrIter<'_> {
    type Item = (u32, Result<Instr, IlError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_at_end() {
            return None;
        }
        let offset = self.reader.offset() as u32;
        Some((offset, Instr::read(&mut self.reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_sequence() {
        // ldc.i4.s 10; ldc.i4 300; add; ret
        let code = [0x1F, 10, 0x20, 0x2C, 0x01, 0x00, 0x00, 0x58, 0x2A];
        let instrs: Vec<_> = InstrIter::new(&code)
            .map(|(off, i)| (off, i.unwrap()))
            .collect();
        assert_eq!(
            instrs,
            vec![
                (0, Instr::ldc_i4_s(10)),
                (2, Instr::ldc_i4(300)),
                (7, Instr::add),
                (8, Instr::ret),
            ]
        );
    }

    #[test]
    fn decode_extended_page() {
        let code = [0xFE, 0x01, 0x2A];
        let instrs: Vec<_> = InstrIter::new(&code).map(|(_, i)| i.unwrap()).collect();
        assert_eq!(instrs, vec![Instr::prefixed(ExtInstr::ceq), Instr::ret]);
    }

    #[test]
    fn roundtrip_encoding() {
        let ops = vec![
            Instr::ldarg_0,
            Instr::ldc_i8(-5),
            Instr::ldc_r8(2.5),
            Instr::switch(vec![3, -7]),
            Instr::call(Token(0x0600_0001)),
            Instr::prefixed(ExtInstr::ldloc(300)),
            Instr::ret,
        ];
        let mut bytes = Vec::new();
        for op in &ops {
            op.encode(&mut bytes);
        }
        let decoded: Vec<_> = InstrIter::new(&bytes).map(|(_, i)| i.unwrap()).collect();
        assert_eq!(decoded, ops);
    }

    #[test]
    fn truncated_stream_reports_offset() {
        let code = [0x20, 0x01];
        let err = Instr::read(&mut IlReader::new(&code)).unwrap_err();
        assert!(matches!(err, IlError::Truncated { .. }));
    }

    #[test]
    fn unknown_opcode_rejected() {
        let code = [0xC0];
        let err = Instr::read(&mut IlReader::new(&code)).unwrap_err();
        assert!(matches!(err, IlError::UnknownOpcode { byte: 0xC0, .. }));
    }
}
