//! Error taxonomies
//!
//! Two distinct layers:
//! - [`EngineError`]: host-facing failures at the engine boundary
//!   (configuration, malformed IL, unsupported constructs). These are Rust
//!   errors and propagate with `?`.
//! - [`RuntimeExceptionKind`]: the managed exception taxonomy. Inside
//!   managed execution, failures become heap exception objects created by
//!   the object runtime and propagate through the exception engine, never
//!   through `Result`.

use thiserror::Error;

/// Host-facing engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A configuration string could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The IL stream or clause table of a method is malformed.
    #[error("method transform failed: {0}")]
    Transform(String),

    /// A hard limit of the internal encoding was exceeded
    /// (data items, frame offsets, or branch deltas).
    #[error("internal encoding limit exceeded: {0}")]
    Limit(String),

    /// The method has no IL body and no native entry.
    #[error("method has no executable body")]
    MissingBody,

    /// The metadata layer failed to resolve a token.
    #[error("metadata resolution failed: {0}")]
    Metadata(String),

    /// The construct is not supported by this engine.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// The managed exception taxonomy raised by the interpreter itself.
///
/// The object runtime materializes these as heap objects of the
/// corresponding managed exception class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeExceptionKind {
    /// Null receiver or null indirect base.
    NullReference,
    /// Array index outside the bounds.
    IndexOutOfRange,
    /// Covariant array store or typed element address mismatch.
    ArrayTypeMismatch,
    /// `castclass`/`unbox` on an incompatible type.
    InvalidCast,
    /// Integer division by zero.
    DivideByZero,
    /// Checked arithmetic or conversion out of range.
    Overflow,
    /// `ckfinite` on a NaN or infinity.
    Arithmetic,
    /// Malformed opcode stream or trapped transformer postcondition.
    ExecutionEngine,
    /// Construct the engine chooses not to support.
    NotSupported,
    /// Invalid runtime operation (misused typed reference, bad delegate).
    InvalidOperation,
    /// The execution stack arena is exhausted.
    StackOverflow,
    /// The metadata layer could not load a type.
    TypeLoad,
    /// The metadata layer could not find a method.
    MissingMethod,
    /// Allocation failure reported by the object runtime.
    OutOfMemory,
}

impl RuntimeExceptionKind {
    /// Canonical managed type name, used by hosts to pick the exception
    /// class and by diagnostics.
    pub fn type_name(self) -> &'static str {
        match self {
            RuntimeExceptionKind::NullReference => "System.NullReferenceException",
            RuntimeExceptionKind::IndexOutOfRange => "System.IndexOutOfRangeException",
            RuntimeExceptionKind::ArrayTypeMismatch => "System.ArrayTypeMismatchException",
            RuntimeExceptionKind::InvalidCast => "System.InvalidCastException",
            RuntimeExceptionKind::DivideByZero => "System.DivideByZeroException",
            RuntimeExceptionKind::Overflow => "System.OverflowException",
            RuntimeExceptionKind::Arithmetic => "System.ArithmeticException",
            RuntimeExceptionKind::ExecutionEngine => "System.ExecutionEngineException",
            RuntimeExceptionKind::NotSupported => "System.NotSupportedException",
            RuntimeExceptionKind::InvalidOperation => "System.InvalidOperationException",
            RuntimeExceptionKind::StackOverflow => "System.StackOverflowException",
            RuntimeExceptionKind::TypeLoad => "System.TypeLoadException",
            RuntimeExceptionKind::MissingMethod => "System.MissingMethodException",
            RuntimeExceptionKind::OutOfMemory => "System.OutOfMemoryException",
        }
    }
}

/// Engine-level result alias.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_type_names_are_qualified() {
        assert_eq!(
            RuntimeExceptionKind::DivideByZero.type_name(),
            "System.DivideByZeroException"
        );
        assert!(RuntimeExceptionKind::Overflow.type_name().starts_with("System."));
    }
}
