//! CIL instruction stream model
//!
//! This crate provides the ECMA-335 IL layer consumed by the interpreter
//! engine:
//! - the CIL opcode enumeration with an in-place byte-stream decoder
//! - the method body model (header fields, code bytes, exception clauses)
//! - method/class attribute bitflags
//! - a label-based IL assembler (`BodyBuilder`) for constructing method
//!   bodies programmatically
//!
//! The crate is deliberately metadata-free: operands that reference
//! metadata (types, methods, fields, strings, signatures) are carried as
//! opaque 32-bit tokens and resolved by the embedder.

#![warn(rust_2018_idioms)]

pub mod body;
pub mod emit;
pub mod flags;
pub mod il;

pub use body::{ClauseKind, IlClause, MethodBody};
pub use emit::{BodyBuilder, EmitError, Label};
pub use flags::{MethodAttributes, MethodImplAttributes, TypeAttributes};
pub use il::{ExtInstr, IlError, IlReader, Instr, InstrIter, Token};
