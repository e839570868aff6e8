//! In-memory columns, for tests and embedding callers.

use std::collections::HashMap;
use std::path::PathBuf;

use pm_core::{Error, EvalError, Result, Value};

use crate::decoder::{RecordDecoder, SourceLoader, not_positioned};

/// Column-major table decoded straight from memory.
#[derive(Debug, Clone)]
pub struct MemoryDecoder {
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<Value>>,
    n_rows: usize,
    row: Option<usize>,
}

impl MemoryDecoder {
    /// Build from `(name, values)` columns. All columns must have the same
    /// length and distinct names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = (S, Vec<Value>)>) -> Result<Self> {
        let mut names = Vec::new();
        let mut index = HashMap::new();
        let mut data = Vec::new();
        for (name, values) in columns {
            let name = name.into();
            if index.insert(name.clone(), data.len()).is_some() {
                return Err(Error::Configuration(format!("duplicate column '{name}'")));
            }
            names.push(name);
            data.push(values);
        }
        let n_rows = data.first().map_or(0, Vec::len);
        if let Some((i, col)) = data.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(Error::Configuration(format!(
                "column '{}' has {} rows, expected {n_rows}",
                names[i],
                col.len()
            )));
        }
        Ok(Self { names, index, columns: data, n_rows, row: None })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    /// True when the table has no records.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    fn append(&mut self, other: MemoryDecoder) -> Result<()> {
        if other.names != self.names {
            return Err(Error::Configuration(format!(
                "in-memory tables disagree on columns: {:?} vs {:?}",
                self.names, other.names
            )));
        }
        for (col, more) in self.columns.iter_mut().zip(other.columns) {
            col.extend(more);
        }
        self.n_rows += other.n_rows;
        Ok(())
    }
}

impl RecordDecoder for MemoryDecoder {
    fn field_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn rewind(&mut self) -> Result<()> {
        self.row = None;
        Ok(())
    }

    fn next_record(&mut self) -> Result<bool> {
        let next = self.row.map_or(0, |r| r + 1);
        if next < self.n_rows {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = None;
            Ok(false)
        }
    }

    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError> {
        let row = self.row.ok_or_else(not_positioned)?;
        let col = self.index.get(name).ok_or_else(|| EvalError::UnknownField(name.to_string()))?;
        Ok(self.columns[*col][row].clone())
    }
}

/// Loader over tables registered under pseudo file paths.
///
/// Opening several paths concatenates their tables in path order.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    tables: HashMap<PathBuf, Vec<(String, Vec<Value>)>>,
}

impl MemoryLoader {
    /// Loader with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under `path` (builder style).
    pub fn with_table<S: Into<String>>(
        mut self,
        path: impl Into<PathBuf>,
        columns: impl IntoIterator<Item = (S, Vec<Value>)>,
    ) -> Self {
        let columns = columns.into_iter().map(|(n, v)| (n.into(), v)).collect();
        self.tables.insert(path.into(), columns);
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn schema(&self) -> &str {
        "memory"
    }

    fn open(&self, files: &[PathBuf]) -> Result<Box<dyn RecordDecoder>> {
        let mut out: Option<MemoryDecoder> = None;
        for path in files {
            let table = self.tables.get(path).ok_or_else(|| {
                Error::Configuration(format!("no in-memory table registered at '{}'", path.display()))
            })?;
            let decoder = MemoryDecoder::new(table.iter().cloned())?;
            match out.as_mut() {
                Some(acc) => acc.append(decoder)?,
                None => out = Some(decoder),
            }
        }
        let decoder = out.ok_or_else(|| Error::Configuration("no files to open".to_string()))?;
        Ok(Box::new(decoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_columns_are_rejected() {
        let err = MemoryDecoder::new([("a", vec![Value::Int(1)]), ("b", vec![])]).unwrap_err();
        assert!(err.to_string().contains("column 'b'"));
    }

    #[test]
    fn tables_concatenate_in_path_order() {
        let loader = MemoryLoader::new()
            .with_table("p1", [("x", vec![Value::Int(1), Value::Int(2)])])
            .with_table("p2", [("x", vec![Value::Int(3)])]);
        let mut d = loader.open(&["p1".into(), "p2".into()]).unwrap();
        let mut xs = Vec::new();
        while d.next_record().unwrap() {
            xs.push(d.field("x").unwrap());
        }
        assert_eq!(xs, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn mismatched_tables_are_rejected() {
        let loader = MemoryLoader::new()
            .with_table("p1", [("x", vec![Value::Int(1)])])
            .with_table("p2", [("y", vec![Value::Int(3)])]);
        assert!(loader.open(&["p1".into(), "p2".into()]).is_err());
    }
}
