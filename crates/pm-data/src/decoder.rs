//! Decoding capability per schema type.
//!
//! The engine never parses on-disk formats itself. A [`SourceLoader`]
//! opens a resolved file set and returns a [`RecordDecoder`] that walks its
//! records one at a time.

use std::path::PathBuf;

use pm_core::{EvalError, Result, Value};

/// Record-at-a-time reader over one resolved file set.
pub trait RecordDecoder: Send {
    /// Field names declared by the schema, in schema order.
    fn field_names(&self) -> Vec<String>;

    /// Reposition before the first record.
    fn rewind(&mut self) -> Result<()>;

    /// Decode the next record. `Ok(false)` at end of data.
    fn next_record(&mut self) -> Result<bool>;

    /// Resolve one field of the current record.
    ///
    /// Fields the schema does not declare are [`EvalError::UnknownField`].
    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError>;
}

/// Factory for decoders of one schema type.
pub trait SourceLoader: Send + Sync {
    /// Schema marker, part of the source signature (e.g. `"parquet"`).
    fn schema(&self) -> &str;

    /// Open a decoder over `files` (sorted, de-duplicated, non-empty).
    fn open(&self, files: &[PathBuf]) -> Result<Box<dyn RecordDecoder>>;
}

pub(crate) fn not_positioned() -> EvalError {
    EvalError::Native("cursor is not positioned on a record".to_string())
}
