//! cilrun interpreter engine
//!
//! The execution core of a CIL runtime:
//! - IL-to-mint transformation (internal 16-bit opcode stream)
//! - the dispatch loop with full exception-handling semantics
//! - the compiled-method registry with one-shot code publication
//! - the call bridge for P/Invoke, internal calls, and jit-compiled code
//! - debugger support (sequence points, breakpoints, single-step)
//!
//! Metadata and object allocation are abstract collaborators behind the
//! [`meta::MetadataProvider`] and [`object::ObjectRuntime`] traits; a
//! self-contained reference implementation lives in [`host`].

#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]
#![allow(clippy::manual_div_ceil)]

pub mod bridge;
pub mod config;
pub mod context;
pub mod debug;
pub mod engine;
pub mod error;
pub mod frame;
pub mod host;
pub mod imethod;
pub mod invoke;
pub mod meta;
pub mod mintops;
pub mod object;
pub mod slot;

mod except;
mod interp;
mod transform;

pub use bridge::{NativeCallContext, NativeThunk};
pub use config::{DumpFilter, EngineConfig};
pub use debug::{DebuggerHook, MethodJitInfo};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, RuntimeExceptionKind};
pub use frame::FrameInfo;
pub use host::{ClassBuilder, HostBuilder, HostRuntime, MethodBuilder};
pub use imethod::{CompiledMethod, MethodRegistry};
pub use invoke::{FrameIter, FtnPointer, ManagedValue};
pub use meta::{
    ClassDesc, ClassId, FieldDesc, FieldId, MetadataProvider, MethodBodyKind, MethodDesc,
    MethodHandle, MethodSignature, MintType, SpecialClass, TypeContext, TypeDesc,
};
pub use mintops::{MintArg, MintOp, MintOpDesc, MINT_OPS, MINT_OP_COUNT};
pub use object::{ObjRef, ObjectRuntime};
pub use slot::{StackSlot, StackType};
