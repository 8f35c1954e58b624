//! Internal ("mint") opcode set and its static descriptor table
//!
//! The transformer lowers CIL into a stream of 16-bit mint words; the
//! dispatcher executes it. One row per opcode records the dump name, the
//! operand layout, and the pop/push counts. Instruction length is *not*
//! encoded in the stream: it is derived from the operand layout here, plus
//! the embedded target count for `switch`.
//!
//! Naming follows `<operation>.<stack type>`: `I4`/`I8`/`R8` operate on the
//! corresponding slot types, `P` on pointer-sized integers (the word size
//! of the host), `Vt` on value-type payloads, `O` on object references.

/// Operand layout of a mint opcode. The number of operand words follows
/// from the layout except for `Switch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintArg {
    /// No operands.
    NoArgs,
    /// One word: signed or unsigned 16-bit immediate (offset, size, index).
    Short,
    /// Two words: little-endian 32-bit immediate.
    Int,
    /// Four words: little-endian 64-bit immediate.
    Long,
    /// Four words: an f64 bit pattern.
    Double,
    /// Two words: signed 32-bit branch delta, relative to the opcode.
    Branch,
    /// One word: signed 16-bit branch delta, relative to the opcode.
    ShortBranch,
    /// Two words of count, then `count` 32-bit deltas (two words each).
    Switch,
    /// One word: data item index.
    Tok,
    /// Two independent 16-bit operands.
    TwoShorts,
    /// Three independent 16-bit operands.
    ThreeShorts,
}

impl MintArg {
    /// Number of operand words, excluding the opcode word. `Switch` returns
    /// the fixed header size; use [`MintOp::len_at`] for the full length.
    #[inline]
    pub fn operand_words(self) -> usize {
        match self {
            MintArg::NoArgs => 0,
            MintArg::Short | MintArg::ShortBranch | MintArg::Tok => 1,
            MintArg::Int | MintArg::Branch | MintArg::TwoShorts | MintArg::Switch => 2,
            MintArg::ThreeShorts => 3,
            MintArg::Long | MintArg::Double => 4,
        }
    }
}

/// Variable pop/push marker for the call family.
pub const VAR: i8 = -1;

/// Static descriptor of one mint opcode.
#[derive(Debug, Clone, Copy)]
pub struct MintOpDesc {
    /// Dump name.
    pub name: &'static str,
    /// Operand layout.
    pub arg: MintArg,
    /// Slots popped, or [`VAR`].
    pub pop: i8,
    /// Slots pushed, or [`VAR`].
    pub push: i8,
}

macro_rules! define_mint_ops {
    ($( $variant:ident = ($name:literal, $arg:ident, $pop:expr, $push:expr) ),* $(,)?) => {
        /// The internal opcode set.
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MintOp {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        /// Number of defined mint opcodes.
        pub const MINT_OP_COUNT: usize = [$( MintOp::$variant as u16 ),*].len();

        /// Descriptor table, indexed by opcode value.
        pub static MINT_OPS: [MintOpDesc; MINT_OP_COUNT] = [
            $( MintOpDesc { name: $name, arg: MintArg::$arg, pop: $pop, push: $push } ),*
        ];

        static MINT_OP_LOOKUP: [MintOp; MINT_OP_COUNT] = [ $( MintOp::$variant ),* ];
    };
}

impl MintOp {
    /// Decode a code word, or `None` for a malformed stream.
    #[inline]
    pub fn from_word(word: u16) -> Option<MintOp> {
        MINT_OP_LOOKUP.get(word as usize).copied()
    }

    /// Descriptor row for this opcode.
    #[inline]
    pub fn desc(self) -> &'static MintOpDesc {
        &MINT_OPS[self as usize]
    }

    /// Dump name.
    #[inline]
    pub fn name(self) -> &'static str {
        self.desc().name
    }

    /// Full instruction length in words at `ip`, including the opcode word.
    /// For `switch` this reads the embedded target count.
    #[inline]
    pub fn len_at(self, code: &[u16], ip: usize) -> usize {
        match self.desc().arg {
            MintArg::Switch => {
                let count = (code[ip + 1] as u32 | ((code[ip + 2] as u32) << 16)) as usize;
                3 + 2 * count
            }
            arg => 1 + arg.operand_words(),
        }
    }
}

define_mint_ops! {
    // ===== Prologue and padding =====
    Nop = ("nop", NoArgs, 0, 0),
    InitLocals = ("initlocals", TwoShorts, 0, 0),
    Stinarg = ("stinarg", ThreeShorts, 0, 0),
    StinargVt = ("stinarg.vt", ThreeShorts, 0, 0),

    // ===== Constants =====
    LdcI4M1 = ("ldc.i4.m1", NoArgs, 0, 1),
    LdcI4_0 = ("ldc.i4.0", NoArgs, 0, 1),
    LdcI4_1 = ("ldc.i4.1", NoArgs, 0, 1),
    LdcI4_2 = ("ldc.i4.2", NoArgs, 0, 1),
    LdcI4_3 = ("ldc.i4.3", NoArgs, 0, 1),
    LdcI4_4 = ("ldc.i4.4", NoArgs, 0, 1),
    LdcI4_5 = ("ldc.i4.5", NoArgs, 0, 1),
    LdcI4_6 = ("ldc.i4.6", NoArgs, 0, 1),
    LdcI4_7 = ("ldc.i4.7", NoArgs, 0, 1),
    LdcI4_8 = ("ldc.i4.8", NoArgs, 0, 1),
    LdcI4S = ("ldc.i4.s", Short, 0, 1),
    LdcI4 = ("ldc.i4", Int, 0, 1),
    LdcI8 = ("ldc.i8", Long, 0, 1),
    LdcR4 = ("ldc.r4", Int, 0, 1),
    LdcR8 = ("ldc.r8", Double, 0, 1),
    Ldnull = ("ldnull", NoArgs, 0, 1),
    Ldstr = ("ldstr", Tok, 0, 1),
    Ldftn = ("ldftn", Tok, 0, 1),
    Ldvirtftn = ("ldvirtftn", Tok, 1, 1),
    Ldtoken = ("ldtoken", Tok, 0, 1),

    // ===== Frame loads/stores (arguments and locals share one space) =====
    LdlocI1 = ("ldloc.i1", Short, 0, 1),
    LdlocU1 = ("ldloc.u1", Short, 0, 1),
    LdlocI2 = ("ldloc.i2", Short, 0, 1),
    LdlocU2 = ("ldloc.u2", Short, 0, 1),
    LdlocI4 = ("ldloc.i4", Short, 0, 1),
    LdlocI8 = ("ldloc.i8", Short, 0, 1),
    LdlocR4 = ("ldloc.r4", Short, 0, 1),
    LdlocR8 = ("ldloc.r8", Short, 0, 1),
    LdlocO = ("ldloc.o", Short, 0, 1),
    LdlocP = ("ldloc.p", Short, 0, 1),
    LdlocVt = ("ldloc.vt", TwoShorts, 0, 1),
    Ldloca = ("ldloca", Short, 0, 1),
    StlocI1 = ("stloc.i1", Short, 1, 0),
    StlocI2 = ("stloc.i2", Short, 1, 0),
    StlocI4 = ("stloc.i4", Short, 1, 0),
    StlocI8 = ("stloc.i8", Short, 1, 0),
    StlocR4 = ("stloc.r4", Short, 1, 0),
    StlocR8 = ("stloc.r8", Short, 1, 0),
    StlocO = ("stloc.o", Short, 1, 0),
    StlocP = ("stloc.p", Short, 1, 0),
    StlocVt = ("stloc.vt", TwoShorts, 1, 0),

    // ===== Stack manipulation =====
    Dup = ("dup", NoArgs, 1, 2),
    DupVt = ("dup.vt", Short, 1, 2),
    Pop = ("pop", NoArgs, 1, 0),
    PopVt = ("pop.vt", Short, 1, 0),

    // ===== Unconditional control flow =====
    Br = ("br", Branch, 0, 0),
    BrS = ("br.s", ShortBranch, 0, 0),
    Leave = ("leave", Branch, 0, 0),
    LeaveCheck = ("leave.check", Branch, 0, 0),
    Switch = ("switch", Switch, 1, 0),

    // ===== Conditional branches =====
    BrfalseI4 = ("brfalse.i4", Branch, 1, 0),
    BrfalseI8 = ("brfalse.i8", Branch, 1, 0),
    BrfalseR8 = ("brfalse.r8", Branch, 1, 0),
    BrtrueI4 = ("brtrue.i4", Branch, 1, 0),
    BrtrueI8 = ("brtrue.i8", Branch, 1, 0),
    BrtrueR8 = ("brtrue.r8", Branch, 1, 0),
    BrfalseI4S = ("brfalse.i4.s", ShortBranch, 1, 0),
    BrfalseI8S = ("brfalse.i8.s", ShortBranch, 1, 0),
    BrfalseR8S = ("brfalse.r8.s", ShortBranch, 1, 0),
    BrtrueI4S = ("brtrue.i4.s", ShortBranch, 1, 0),
    BrtrueI8S = ("brtrue.i8.s", ShortBranch, 1, 0),
    BrtrueR8S = ("brtrue.r8.s", ShortBranch, 1, 0),
    BeqI4 = ("beq.i4", Branch, 2, 0),
    BeqI8 = ("beq.i8", Branch, 2, 0),
    BeqR8 = ("beq.r8", Branch, 2, 0),
    BgeI4 = ("bge.i4", Branch, 2, 0),
    BgeI8 = ("bge.i8", Branch, 2, 0),
    BgeR8 = ("bge.r8", Branch, 2, 0),
    BgtI4 = ("bgt.i4", Branch, 2, 0),
    BgtI8 = ("bgt.i8", Branch, 2, 0),
    BgtR8 = ("bgt.r8", Branch, 2, 0),
    BleI4 = ("ble.i4", Branch, 2, 0),
    BleI8 = ("ble.i8", Branch, 2, 0),
    BleR8 = ("ble.r8", Branch, 2, 0),
    BltI4 = ("blt.i4", Branch, 2, 0),
    BltI8 = ("blt.i8", Branch, 2, 0),
    BltR8 = ("blt.r8", Branch, 2, 0),
    BneUnI4 = ("bne.un.i4", Branch, 2, 0),
    BneUnI8 = ("bne.un.i8", Branch, 2, 0),
    BneUnR8 = ("bne.un.r8", Branch, 2, 0),
    BgeUnI4 = ("bge.un.i4", Branch, 2, 0),
    BgeUnI8 = ("bge.un.i8", Branch, 2, 0),
    BgeUnR8 = ("bge.un.r8", Branch, 2, 0),
    BgtUnI4 = ("bgt.un.i4", Branch, 2, 0),
    BgtUnI8 = ("bgt.un.i8", Branch, 2, 0),
    BgtUnR8 = ("bgt.un.r8", Branch, 2, 0),
    BleUnI4 = ("ble.un.i4", Branch, 2, 0),
    BleUnI8 = ("ble.un.i8", Branch, 2, 0),
    BleUnR8 = ("ble.un.r8", Branch, 2, 0),
    BltUnI4 = ("blt.un.i4", Branch, 2, 0),
    BltUnI8 = ("blt.un.i8", Branch, 2, 0),
    BltUnR8 = ("blt.un.r8", Branch, 2, 0),
    BeqI4S = ("beq.i4.s", ShortBranch, 2, 0),
    BeqI8S = ("beq.i8.s", ShortBranch, 2, 0),
    BeqR8S = ("beq.r8.s", ShortBranch, 2, 0),
    BgeI4S = ("bge.i4.s", ShortBranch, 2, 0),
    BgeI8S = ("bge.i8.s", ShortBranch, 2, 0),
    BgeR8S = ("bge.r8.s", ShortBranch, 2, 0),
    BgtI4S = ("bgt.i4.s", ShortBranch, 2, 0),
    BgtI8S = ("bgt.i8.s", ShortBranch, 2, 0),
    BgtR8S = ("bgt.r8.s", ShortBranch, 2, 0),
    BleI4S = ("ble.i4.s", ShortBranch, 2, 0),
    BleI8S = ("ble.i8.s", ShortBranch, 2, 0),
    BleR8S = ("ble.r8.s", ShortBranch, 2, 0),
    BltI4S = ("blt.i4.s", ShortBranch, 2, 0),
    BltI8S = ("blt.i8.s", ShortBranch, 2, 0),
    BltR8S = ("blt.r8.s", ShortBranch, 2, 0),
    BneUnI4S = ("bne.un.i4.s", ShortBranch, 2, 0),
    BneUnI8S = ("bne.un.i8.s", ShortBranch, 2, 0),
    BneUnR8S = ("bne.un.r8.s", ShortBranch, 2, 0),
    BgeUnI4S = ("bge.un.i4.s", ShortBranch, 2, 0),
    BgeUnI8S = ("bge.un.i8.s", ShortBranch, 2, 0),
    BgeUnR8S = ("bge.un.r8.s", ShortBranch, 2, 0),
    BgtUnI4S = ("bgt.un.i4.s", ShortBranch, 2, 0),
    BgtUnI8S = ("bgt.un.i8.s", ShortBranch, 2, 0),
    BgtUnR8S = ("bgt.un.r8.s", ShortBranch, 2, 0),
    BleUnI4S = ("ble.un.i4.s", ShortBranch, 2, 0),
    BleUnI8S = ("ble.un.i8.s", ShortBranch, 2, 0),
    BleUnR8S = ("ble.un.r8.s", ShortBranch, 2, 0),
    BltUnI4S = ("blt.un.i4.s", ShortBranch, 2, 0),
    BltUnI8S = ("blt.un.i8.s", ShortBranch, 2, 0),
    BltUnR8S = ("blt.un.r8.s", ShortBranch, 2, 0),

    // ===== Integer arithmetic =====
    AddI4 = ("add.i4", NoArgs, 2, 1),
    SubI4 = ("sub.i4", NoArgs, 2, 1),
    MulI4 = ("mul.i4", NoArgs, 2, 1),
    DivI4 = ("div.i4", NoArgs, 2, 1),
    DivUnI4 = ("div.un.i4", NoArgs, 2, 1),
    RemI4 = ("rem.i4", NoArgs, 2, 1),
    RemUnI4 = ("rem.un.i4", NoArgs, 2, 1),
    AndI4 = ("and.i4", NoArgs, 2, 1),
    OrI4 = ("or.i4", NoArgs, 2, 1),
    XorI4 = ("xor.i4", NoArgs, 2, 1),
    ShlI4 = ("shl.i4", NoArgs, 2, 1),
    ShrI4 = ("shr.i4", NoArgs, 2, 1),
    ShrUnI4 = ("shr.un.i4", NoArgs, 2, 1),
    AddI8 = ("add.i8", NoArgs, 2, 1),
    SubI8 = ("sub.i8", NoArgs, 2, 1),
    MulI8 = ("mul.i8", NoArgs, 2, 1),
    DivI8 = ("div.i8", NoArgs, 2, 1),
    DivUnI8 = ("div.un.i8", NoArgs, 2, 1),
    RemI8 = ("rem.i8", NoArgs, 2, 1),
    RemUnI8 = ("rem.un.i8", NoArgs, 2, 1),
    AndI8 = ("and.i8", NoArgs, 2, 1),
    OrI8 = ("or.i8", NoArgs, 2, 1),
    XorI8 = ("xor.i8", NoArgs, 2, 1),
    ShlI8 = ("shl.i8", NoArgs, 2, 1),
    ShrI8 = ("shr.i8", NoArgs, 2, 1),
    ShrUnI8 = ("shr.un.i8", NoArgs, 2, 1),
    NegI4 = ("neg.i4", NoArgs, 1, 1),
    NegI8 = ("neg.i8", NoArgs, 1, 1),
    NotI4 = ("not.i4", NoArgs, 1, 1),
    NotI8 = ("not.i8", NoArgs, 1, 1),

    // ===== Checked integer arithmetic =====
    AddOvfI4 = ("add.ovf.i4", NoArgs, 2, 1),
    AddOvfUnI4 = ("add.ovf.un.i4", NoArgs, 2, 1),
    SubOvfI4 = ("sub.ovf.i4", NoArgs, 2, 1),
    SubOvfUnI4 = ("sub.ovf.un.i4", NoArgs, 2, 1),
    MulOvfI4 = ("mul.ovf.i4", NoArgs, 2, 1),
    MulOvfUnI4 = ("mul.ovf.un.i4", NoArgs, 2, 1),
    AddOvfI8 = ("add.ovf.i8", NoArgs, 2, 1),
    AddOvfUnI8 = ("add.ovf.un.i8", NoArgs, 2, 1),
    SubOvfI8 = ("sub.ovf.i8", NoArgs, 2, 1),
    SubOvfUnI8 = ("sub.ovf.un.i8", NoArgs, 2, 1),
    MulOvfI8 = ("mul.ovf.i8", NoArgs, 2, 1),
    MulOvfUnI8 = ("mul.ovf.un.i8", NoArgs, 2, 1),

    // ===== Floating point arithmetic =====
    AddR8 = ("add.r8", NoArgs, 2, 1),
    SubR8 = ("sub.r8", NoArgs, 2, 1),
    MulR8 = ("mul.r8", NoArgs, 2, 1),
    DivR8 = ("div.r8", NoArgs, 2, 1),
    RemR8 = ("rem.r8", NoArgs, 2, 1),
    NegR8 = ("neg.r8", NoArgs, 1, 1),
    Ckfinite = ("ckfinite", NoArgs, 1, 1),

    // ===== Pointer-sized arithmetic (magic numeric types, native int) =====
    AddP = ("add.p", NoArgs, 2, 1),
    SubP = ("sub.p", NoArgs, 2, 1),
    MulP = ("mul.p", NoArgs, 2, 1),
    DivP = ("div.p", NoArgs, 2, 1),
    DivUnP = ("div.un.p", NoArgs, 2, 1),
    RemP = ("rem.p", NoArgs, 2, 1),
    RemUnP = ("rem.un.p", NoArgs, 2, 1),
    AndP = ("and.p", NoArgs, 2, 1),
    OrP = ("or.p", NoArgs, 2, 1),
    XorP = ("xor.p", NoArgs, 2, 1),
    ShlP = ("shl.p", NoArgs, 2, 1),
    ShrP = ("shr.p", NoArgs, 2, 1),
    ShrUnP = ("shr.un.p", NoArgs, 2, 1),
    NegP = ("neg.p", NoArgs, 1, 1),
    NotP = ("not.p", NoArgs, 1, 1),
    CeqP = ("ceq.p", NoArgs, 2, 1),
    CgtP = ("cgt.p", NoArgs, 2, 1),
    CgtUnP = ("cgt.un.p", NoArgs, 2, 1),
    CltP = ("clt.p", NoArgs, 2, 1),
    CltUnP = ("clt.un.p", NoArgs, 2, 1),

    // ===== Comparisons =====
    CeqI4 = ("ceq.i4", NoArgs, 2, 1),
    CeqI8 = ("ceq.i8", NoArgs, 2, 1),
    CeqR8 = ("ceq.r8", NoArgs, 2, 1),
    CgtI4 = ("cgt.i4", NoArgs, 2, 1),
    CgtI8 = ("cgt.i8", NoArgs, 2, 1),
    CgtR8 = ("cgt.r8", NoArgs, 2, 1),
    CgtUnI4 = ("cgt.un.i4", NoArgs, 2, 1),
    CgtUnI8 = ("cgt.un.i8", NoArgs, 2, 1),
    CgtUnR8 = ("cgt.un.r8", NoArgs, 2, 1),
    CltI4 = ("clt.i4", NoArgs, 2, 1),
    CltI8 = ("clt.i8", NoArgs, 2, 1),
    CltR8 = ("clt.r8", NoArgs, 2, 1),
    CltUnI4 = ("clt.un.i4", NoArgs, 2, 1),
    CltUnI8 = ("clt.un.i8", NoArgs, 2, 1),
    CltUnR8 = ("clt.un.r8", NoArgs, 2, 1),

    // ===== Conversions =====
    ConvI1I4 = ("conv.i1.i4", NoArgs, 1, 1),
    ConvI1I8 = ("conv.i1.i8", NoArgs, 1, 1),
    ConvI1R8 = ("conv.i1.r8", NoArgs, 1, 1),
    ConvU1I4 = ("conv.u1.i4", NoArgs, 1, 1),
    ConvU1I8 = ("conv.u1.i8", NoArgs, 1, 1),
    ConvU1R8 = ("conv.u1.r8", NoArgs, 1, 1),
    ConvI2I4 = ("conv.i2.i4", NoArgs, 1, 1),
    ConvI2I8 = ("conv.i2.i8", NoArgs, 1, 1),
    ConvI2R8 = ("conv.i2.r8", NoArgs, 1, 1),
    ConvU2I4 = ("conv.u2.i4", NoArgs, 1, 1),
    ConvU2I8 = ("conv.u2.i8", NoArgs, 1, 1),
    ConvU2R8 = ("conv.u2.r8", NoArgs, 1, 1),
    ConvI4I8 = ("conv.i4.i8", NoArgs, 1, 1),
    ConvI4R8 = ("conv.i4.r8", NoArgs, 1, 1),
    ConvU4R8 = ("conv.u4.r8", NoArgs, 1, 1),
    ConvI8I4 = ("conv.i8.i4", NoArgs, 1, 1),
    ConvI8U4 = ("conv.i8.u4", NoArgs, 1, 1),
    ConvI8R8 = ("conv.i8.r8", NoArgs, 1, 1),
    ConvU8R8 = ("conv.u8.r8", NoArgs, 1, 1),
    ConvR4I4 = ("conv.r4.i4", NoArgs, 1, 1),
    ConvR4I8 = ("conv.r4.i8", NoArgs, 1, 1),
    ConvR4R8 = ("conv.r4.r8", NoArgs, 1, 1),
    ConvR8I4 = ("conv.r8.i4", NoArgs, 1, 1),
    ConvR8I8 = ("conv.r8.i8", NoArgs, 1, 1),
    ConvRUnI4 = ("conv.r.un.i4", NoArgs, 1, 1),
    ConvRUnI8 = ("conv.r.un.i8", NoArgs, 1, 1),

    // ===== Checked conversions, signed source =====
    ConvOvfI1I4 = ("conv.ovf.i1.i4", NoArgs, 1, 1),
    ConvOvfI1I8 = ("conv.ovf.i1.i8", NoArgs, 1, 1),
    ConvOvfI1R8 = ("conv.ovf.i1.r8", NoArgs, 1, 1),
    ConvOvfU1I4 = ("conv.ovf.u1.i4", NoArgs, 1, 1),
    ConvOvfU1I8 = ("conv.ovf.u1.i8", NoArgs, 1, 1),
    ConvOvfU1R8 = ("conv.ovf.u1.r8", NoArgs, 1, 1),
    ConvOvfI2I4 = ("conv.ovf.i2.i4", NoArgs, 1, 1),
    ConvOvfI2I8 = ("conv.ovf.i2.i8", NoArgs, 1, 1),
    ConvOvfI2R8 = ("conv.ovf.i2.r8", NoArgs, 1, 1),
    ConvOvfU2I4 = ("conv.ovf.u2.i4", NoArgs, 1, 1),
    ConvOvfU2I8 = ("conv.ovf.u2.i8", NoArgs, 1, 1),
    ConvOvfU2R8 = ("conv.ovf.u2.r8", NoArgs, 1, 1),
    ConvOvfI4I8 = ("conv.ovf.i4.i8", NoArgs, 1, 1),
    ConvOvfI4R8 = ("conv.ovf.i4.r8", NoArgs, 1, 1),
    ConvOvfU4I4 = ("conv.ovf.u4.i4", NoArgs, 1, 1),
    ConvOvfU4I8 = ("conv.ovf.u4.i8", NoArgs, 1, 1),
    ConvOvfU4R8 = ("conv.ovf.u4.r8", NoArgs, 1, 1),
    ConvOvfI8R8 = ("conv.ovf.i8.r8", NoArgs, 1, 1),
    ConvOvfU8I4 = ("conv.ovf.u8.i4", NoArgs, 1, 1),
    ConvOvfU8I8 = ("conv.ovf.u8.i8", NoArgs, 1, 1),
    ConvOvfU8R8 = ("conv.ovf.u8.r8", NoArgs, 1, 1),

    // ===== Checked conversions, unsigned source =====
    ConvOvfI1U4 = ("conv.ovf.i1.u4", NoArgs, 1, 1),
    ConvOvfI1U8 = ("conv.ovf.i1.u8", NoArgs, 1, 1),
    ConvOvfU1U4 = ("conv.ovf.u1.u4", NoArgs, 1, 1),
    ConvOvfU1U8 = ("conv.ovf.u1.u8", NoArgs, 1, 1),
    ConvOvfI2U4 = ("conv.ovf.i2.u4", NoArgs, 1, 1),
    ConvOvfI2U8 = ("conv.ovf.i2.u8", NoArgs, 1, 1),
    ConvOvfU2U4 = ("conv.ovf.u2.u4", NoArgs, 1, 1),
    ConvOvfU2U8 = ("conv.ovf.u2.u8", NoArgs, 1, 1),
    ConvOvfI4U4 = ("conv.ovf.i4.u4", NoArgs, 1, 1),
    ConvOvfI4U8 = ("conv.ovf.i4.u8", NoArgs, 1, 1),
    ConvOvfU4U8 = ("conv.ovf.u4.u8", NoArgs, 1, 1),
    ConvOvfI8U8 = ("conv.ovf.i8.u8", NoArgs, 1, 1),

    // ===== Indirect memory access =====
    LdindI1 = ("ldind.i1", NoArgs, 1, 1),
    LdindU1 = ("ldind.u1", NoArgs, 1, 1),
    LdindI2 = ("ldind.i2", NoArgs, 1, 1),
    LdindU2 = ("ldind.u2", NoArgs, 1, 1),
    LdindI4 = ("ldind.i4", NoArgs, 1, 1),
    LdindI8 = ("ldind.i8", NoArgs, 1, 1),
    LdindR4 = ("ldind.r4", NoArgs, 1, 1),
    LdindR8 = ("ldind.r8", NoArgs, 1, 1),
    LdindRef = ("ldind.ref", NoArgs, 1, 1),
    StindI1 = ("stind.i1", NoArgs, 2, 0),
    StindI2 = ("stind.i2", NoArgs, 2, 0),
    StindI4 = ("stind.i4", NoArgs, 2, 0),
    StindI8 = ("stind.i8", NoArgs, 2, 0),
    StindR4 = ("stind.r4", NoArgs, 2, 0),
    StindR8 = ("stind.r8", NoArgs, 2, 0),
    StindRef = ("stind.ref", NoArgs, 2, 0),
    Membar = ("membar", NoArgs, 0, 0),
    LdobjVt = ("ldobj.vt", Short, 1, 1),
    StobjVt = ("stobj.vt", Short, 2, 0),
    Cpobj = ("cpobj", Tok, 2, 0),
    Initobj = ("initobj", Short, 1, 0),
    Cpblk = ("cpblk", NoArgs, 3, 0),
    Initblk = ("initblk", NoArgs, 3, 0),

    // ===== Instance fields =====
    LdfldI1 = ("ldfld.i1", Short, 1, 1),
    LdfldU1 = ("ldfld.u1", Short, 1, 1),
    LdfldI2 = ("ldfld.i2", Short, 1, 1),
    LdfldU2 = ("ldfld.u2", Short, 1, 1),
    LdfldI4 = ("ldfld.i4", Short, 1, 1),
    LdfldI8 = ("ldfld.i8", Short, 1, 1),
    LdfldR4 = ("ldfld.r4", Short, 1, 1),
    LdfldR8 = ("ldfld.r8", Short, 1, 1),
    LdfldO = ("ldfld.o", Short, 1, 1),
    LdfldP = ("ldfld.p", Short, 1, 1),
    LdfldVt = ("ldfld.vt", TwoShorts, 1, 1),
    Ldflda = ("ldflda", Short, 1, 1),
    StfldI1 = ("stfld.i1", Short, 2, 0),
    StfldI2 = ("stfld.i2", Short, 2, 0),
    StfldI4 = ("stfld.i4", Short, 2, 0),
    StfldI8 = ("stfld.i8", Short, 2, 0),
    StfldR4 = ("stfld.r4", Short, 2, 0),
    StfldR8 = ("stfld.r8", Short, 2, 0),
    StfldO = ("stfld.o", Short, 2, 0),
    StfldP = ("stfld.p", Short, 2, 0),
    StfldVt = ("stfld.vt", TwoShorts, 2, 0),
    Ldrmfld = ("ldrmfld", Tok, 1, 1),
    Strmfld = ("strmfld", Tok, 2, 0),

    // ===== Static fields =====
    LdsfldI1 = ("ldsfld.i1", Tok, 0, 1),
    LdsfldU1 = ("ldsfld.u1", Tok, 0, 1),
    LdsfldI2 = ("ldsfld.i2", Tok, 0, 1),
    LdsfldU2 = ("ldsfld.u2", Tok, 0, 1),
    LdsfldI4 = ("ldsfld.i4", Tok, 0, 1),
    LdsfldI8 = ("ldsfld.i8", Tok, 0, 1),
    LdsfldR4 = ("ldsfld.r4", Tok, 0, 1),
    LdsfldR8 = ("ldsfld.r8", Tok, 0, 1),
    LdsfldO = ("ldsfld.o", Tok, 0, 1),
    LdsfldP = ("ldsfld.p", Tok, 0, 1),
    LdsfldVt = ("ldsfld.vt", TwoShorts, 0, 1),
    Ldsflda = ("ldsflda", Tok, 0, 1),
    StsfldI1 = ("stsfld.i1", Tok, 1, 0),
    StsfldI2 = ("stsfld.i2", Tok, 1, 0),
    StsfldI4 = ("stsfld.i4", Tok, 1, 0),
    StsfldI8 = ("stsfld.i8", Tok, 1, 0),
    StsfldR4 = ("stsfld.r4", Tok, 1, 0),
    StsfldR8 = ("stsfld.r8", Tok, 1, 0),
    StsfldO = ("stsfld.o", Tok, 1, 0),
    StsfldP = ("stsfld.p", Tok, 1, 0),
    StsfldVt = ("stsfld.vt", TwoShorts, 1, 0),

    // ===== Objects, boxing, casts =====
    Newobj = ("newobj", Tok, VAR, 1),
    NewobjVt = ("newobj.vt", TwoShorts, VAR, 1),
    NewobjString = ("newobj.string", Tok, VAR, 1),
    NewobjArray = ("newobj.array", TwoShorts, VAR, 1),
    Newarr = ("newarr", Tok, 1, 1),
    Castclass = ("castclass", Tok, 1, 1),
    Isinst = ("isinst", Tok, 1, 1),
    Box = ("box", Tok, 1, 1),
    BoxVal = ("box.val", TwoShorts, 1, 1),
    Unbox = ("unbox", Tok, 1, 1),
    UnboxAnyNullable = ("unbox.any.nullable", TwoShorts, 1, 1),

    // ===== Arrays and strings =====
    Ldlen = ("ldlen", NoArgs, 1, 1),
    Ldelema = ("ldelema", TwoShorts, VAR, 1),
    LdelemaTc = ("ldelema.tc", Tok, 2, 1),
    LdelemI1 = ("ldelem.i1", NoArgs, 2, 1),
    LdelemU1 = ("ldelem.u1", NoArgs, 2, 1),
    LdelemI2 = ("ldelem.i2", NoArgs, 2, 1),
    LdelemU2 = ("ldelem.u2", NoArgs, 2, 1),
    LdelemI4 = ("ldelem.i4", NoArgs, 2, 1),
    LdelemI8 = ("ldelem.i8", NoArgs, 2, 1),
    LdelemR4 = ("ldelem.r4", NoArgs, 2, 1),
    LdelemR8 = ("ldelem.r8", NoArgs, 2, 1),
    LdelemRef = ("ldelem.ref", NoArgs, 2, 1),
    LdelemVt = ("ldelem.vt", Short, 2, 1),
    StelemI1 = ("stelem.i1", NoArgs, 3, 0),
    StelemI2 = ("stelem.i2", NoArgs, 3, 0),
    StelemI4 = ("stelem.i4", NoArgs, 3, 0),
    StelemI8 = ("stelem.i8", NoArgs, 3, 0),
    StelemR4 = ("stelem.r4", NoArgs, 3, 0),
    StelemR8 = ("stelem.r8", NoArgs, 3, 0),
    StelemRef = ("stelem.ref", NoArgs, 3, 0),
    StelemVt = ("stelem.vt", TwoShorts, 3, 0),
    ArrayGet = ("array.get", ThreeShorts, VAR, 1),
    ArraySet = ("array.set", ThreeShorts, VAR, 0),
    ArrayRank = ("array.rank", NoArgs, 1, 1),
    Strlen = ("strlen", NoArgs, 1, 1),
    Getchr = ("getchr", NoArgs, 2, 1),

    // ===== Calls =====
    Call = ("call", Tok, VAR, VAR),
    Callvirt = ("callvirt", Tok, VAR, VAR),
    CallvirtCtd = ("callvirt.ctd", TwoShorts, VAR, VAR),
    Calli = ("calli", Tok, VAR, VAR),
    JitCall = ("jit.call", Tok, VAR, VAR),
    Vtresult = ("vtresult", Short, 0, 0),

    // ===== Returns =====
    Ret = ("ret", NoArgs, 1, 0),
    RetVoid = ("ret.void", NoArgs, 0, 0),
    RetVt = ("ret.vt", Short, 1, 0),

    // ===== Exception handling =====
    Throw = ("throw", NoArgs, 1, 0),
    ThrowUnsupported = ("throw.unsupported", NoArgs, 0, 0),
    Rethrow = ("rethrow", Short, 0, 0),
    EndFinally = ("endfinally", NoArgs, 0, 0),
    EndFilter = ("endfilter", NoArgs, 1, 0),

    // ===== Safepoints and debugger support =====
    Safepoint = ("safepoint", NoArgs, 0, 0),
    SdbSeqPoint = ("sdb.seq.point", NoArgs, 0, 0),
    SdbIntrLoc = ("sdb.intr.loc", NoArgs, 0, 0),
    SdbBreakpoint = ("sdb.breakpoint", NoArgs, 0, 0),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_roundtrips() {
        for word in 0..MINT_OP_COUNT as u16 {
            let op = MintOp::from_word(word).unwrap();
            assert_eq!(op as u16, word);
        }
        assert!(MintOp::from_word(MINT_OP_COUNT as u16).is_none());
        assert!(MintOp::from_word(u16::MAX).is_none());
    }

    #[test]
    fn fixed_lengths_follow_operand_layout() {
        let code = [0u16; 8];
        assert_eq!(MintOp::Nop.len_at(&code, 0), 1);
        assert_eq!(MintOp::LdcI4S.len_at(&code, 0), 2);
        assert_eq!(MintOp::LdcI4.len_at(&code, 0), 3);
        assert_eq!(MintOp::LdcI8.len_at(&code, 0), 5);
        assert_eq!(MintOp::Br.len_at(&code, 0), 3);
        assert_eq!(MintOp::BrS.len_at(&code, 0), 2);
        assert_eq!(MintOp::StinargVt.len_at(&code, 0), 4);
    }

    #[test]
    fn switch_length_reads_embedded_count() {
        // switch with 2 targets: op, count lo/hi, 2 * (delta lo/hi)
        let code = [MintOp::Switch as u16, 2, 0, 5, 0, 9, 0];
        assert_eq!(MintOp::Switch.len_at(&code, 0), 7);
    }

    #[test]
    fn call_family_is_variable_arity() {
        assert_eq!(MintOp::Call.desc().pop, VAR);
        assert_eq!(MintOp::Callvirt.desc().push, VAR);
        assert_eq!(MintOp::Newobj.desc().pop, VAR);
    }

    #[test]
    fn names_are_dotted_lowercase() {
        assert_eq!(MintOp::AddI4.name(), "add.i4");
        assert_eq!(MintOp::ConvOvfU1R8.name(), "conv.ovf.u1.r8");
        assert_eq!(MintOp::SdbSeqPoint.name(), "sdb.seq.point");
    }
}
