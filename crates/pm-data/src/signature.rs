//! Canonical identity of a data source.

use std::fmt;
use std::path::PathBuf;

use pm_core::{Error, Result};

/// Schema marker plus the sorted, de-duplicated set of backing files.
///
/// Two categories whose file lists resolve to the same signature read the
/// same [`DataSource`](crate::DataSource).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    schema: String,
    files: Vec<PathBuf>,
}

impl Signature {
    /// Build a signature. Fails if `files` is empty.
    pub fn new<P: Into<PathBuf>>(
        schema: impl Into<String>,
        files: impl IntoIterator<Item = P>,
    ) -> Result<Self> {
        let schema = schema.into();
        let mut files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        files.sort();
        files.dedup();
        if files.is_empty() {
            return Err(Error::Configuration(format!(
                "data source of schema '{schema}' has no backing files"
            )));
        }
        Ok(Self { schema, files })
    }

    /// Schema marker.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Backing files, sorted.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema, self.files[0].display())?;
        if self.files.len() > 1 {
            write!(f, " (+{} more)", self.files.len() - 1)?;
        }
        Ok(())
    }
}
