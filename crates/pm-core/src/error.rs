//! Error types for PlotMaker.

use thiserror::Error;

/// Setup and scan errors.
///
/// Everything here is fatal for the operation that raised it. Per-event
/// evaluation problems are reported separately as [`EvalError`].
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid setup (empty file set, bad binning, unknown names, ...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Formula failed to parse
    #[error("expression error: {0}")]
    Expression(String),

    /// Backing data could not be decoded mid-scan
    #[error("scan error: {0}")]
    Scan(String),

    /// Per-event evaluation error escalated to a fatal one
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Computation error
    #[error("computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while evaluating an expression against one record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The record has no field with this name.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The field exists but holds no value for this record.
    #[error("null value in field: {0}")]
    NullValue(String),

    /// An operand had the wrong type for the operation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type description.
        expected: String,
        /// Actual type name.
        found: String,
    },

    /// Division by zero in a formula.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer overflow or other arithmetic failure.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Vector index out of range.
    #[error("index {index} out of range for vector of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// Vector length.
        len: usize,
    },

    /// Error reported by a caller-supplied function.
    #[error("{0}")]
    Native(String),
}

impl EvalError {
    /// Shorthand for a [`EvalError::TypeMismatch`].
    pub fn type_mismatch(expected: impl Into<String>, found: &crate::Value) -> Self {
        EvalError::TypeMismatch { expected: expected.into(), found: found.type_name().to_string() }
    }
}
