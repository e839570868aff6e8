//! The view of one event that expressions are evaluated against.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::value::Value;

/// One event of a data source.
///
/// Implementations resolve fields lazily; asking for a field that the
/// schema does not declare is an [`EvalError::UnknownField`].
pub trait Record {
    /// Resolve a named field of this record.
    fn field(&self, name: &str) -> Result<Value, EvalError>;

    /// Zero-based position of this record within its source scan.
    fn index(&self) -> u64 {
        0
    }
}

/// A record backed by a plain map. Handy for tests and ad-hoc evaluation.
#[derive(Debug, Clone, Default)]
pub struct MapRecord {
    fields: HashMap<String, Value>,
    index: u64,
}

impl MapRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the record index.
    pub fn at(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

impl Record for MapRecord {
    fn field(&self, name: &str) -> Result<Value, EvalError> {
        self.fields.get(name).cloned().ok_or_else(|| EvalError::UnknownField(name.to_string()))
    }

    fn index(&self) -> u64 {
        self.index
    }
}
