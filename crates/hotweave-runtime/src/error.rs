//! Interpreter errors

use thiserror::Error;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Call depth limit exceeded
    #[error("Stack overflow")]
    StackOverflow,

    /// Pop from an empty evaluation stack
    #[error("Stack underflow in {0}")]
    StackUnderflow(String),

    /// Null dereference
    #[error("Null reference: {0}")]
    NullReference(String),

    /// Operand of the wrong kind
    #[error("Type error: {0}")]
    TypeError(String),

    /// `castclass`/`unbox.any` to an incompatible type
    #[error("Invalid cast from {actual} to {expected}")]
    InvalidCast {
        /// Target type
        expected: String,
        /// Runtime type of the value
        actual: String,
    },

    /// No loaded type with this name
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// No method matching a reference
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Internal-call method without a runtime implementation
    #[error("No intrinsic for {0}")]
    MissingIntrinsic(String),

    /// Map lookup of an absent key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Array or list index out of range
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Collection length
        len: usize,
    },

    /// Integer division by zero
    #[error("Division by zero")]
    DivideByZero,

    /// `throw` executed
    #[error("Unhandled exception: {0}")]
    Thrown(String),

    /// Malformed method body
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
