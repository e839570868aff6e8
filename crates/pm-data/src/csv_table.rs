//! Delimited text tables via the `csv` crate.
//!
//! The header row names the fields. Every file of a source must carry the
//! same header. Cells are typed on access: integers, floats, `true`/`false`,
//! anything else is a string. An empty cell is a null.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use pm_core::{Error, EvalError, Result, Value};

use crate::decoder::{RecordDecoder, SourceLoader, not_positioned};

/// Loader for comma-separated (or other single-byte delimited) files.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvLoader {
    /// Comma-separated loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl SourceLoader for CsvLoader {
    fn schema(&self) -> &str {
        "csv"
    }

    fn open(&self, files: &[PathBuf]) -> Result<Box<dyn RecordDecoder>> {
        Ok(Box::new(CsvDecoder::open(files.to_vec(), self.delimiter)?))
    }
}

/// Record decoder over a sequence of CSV files.
pub struct CsvDecoder {
    files: Vec<PathBuf>,
    delimiter: u8,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    next_file: usize,
    reader: Option<csv::Reader<File>>,
    record: csv::StringRecord,
    positioned: bool,
}

fn csv_err(path: &Path, e: csv::Error) -> Error {
    Error::Scan(format!("{}: {e}", path.display()))
}

impl CsvDecoder {
    /// Open `files`, reading the header of the first one as the schema.
    pub fn open(files: Vec<PathBuf>, delimiter: u8) -> Result<Self> {
        let first = files
            .first()
            .ok_or_else(|| Error::Configuration("CSV source has no files".to_string()))?;
        let headers = read_headers(first, delimiter)?;
        let mut index = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            if index.insert(h.clone(), i).is_some() {
                return Err(Error::Configuration(format!(
                    "{}: duplicate column '{h}'",
                    first.display()
                )));
            }
        }
        Ok(Self {
            files,
            delimiter,
            headers,
            index,
            next_file: 0,
            reader: None,
            record: csv::StringRecord::new(),
            positioned: false,
        })
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.files.get(self.next_file) else {
            return Ok(false);
        };
        let mut reader = builder(self.delimiter).from_path(path).map_err(|e| csv_err(path, e))?;
        let headers: Vec<String> =
            reader.headers().map_err(|e| csv_err(path, e))?.iter().map(str::to_string).collect();
        if headers != self.headers {
            return Err(Error::Scan(format!(
                "{}: header {:?} does not match source schema {:?}",
                path.display(),
                headers,
                self.headers
            )));
        }
        tracing::debug!(file = %path.display(), "csv file opened");
        self.reader = Some(reader);
        self.next_file += 1;
        Ok(true)
    }
}

fn builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.delimiter(delimiter).has_headers(true).trim(csv::Trim::All);
    b
}

fn read_headers(path: &Path, delimiter: u8) -> Result<Vec<String>> {
    let mut reader = builder(delimiter).from_path(path).map_err(|e| csv_err(path, e))?;
    Ok(reader.headers().map_err(|e| csv_err(path, e))?.iter().map(str::to_string).collect())
}

/// Type a cell: int, float, bool, else string. Empty is null.
fn parse_cell(name: &str, cell: &str) -> std::result::Result<Value, EvalError> {
    if cell.is_empty() {
        return Err(EvalError::NullValue(name.to_string()));
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Ok(Value::Float(f));
    }
    Ok(match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        s => Value::Str(s.to_string()),
    })
}

impl RecordDecoder for CsvDecoder {
    fn field_names(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = None;
        self.next_file = 0;
        self.positioned = false;
        Ok(())
    }

    fn next_record(&mut self) -> Result<bool> {
        self.positioned = false;
        loop {
            if self.reader.is_none() && !self.open_next()? {
                return Ok(false);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(false);
            };
            let path = &self.files[self.next_file - 1];
            if reader.read_record(&mut self.record).map_err(|e| csv_err(path, e))? {
                self.positioned = true;
                return Ok(true);
            }
            self.reader = None;
        }
    }

    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError> {
        if !self.positioned {
            return Err(not_positioned());
        }
        let col = *self.index.get(name).ok_or_else(|| EvalError::UnknownField(name.to_string()))?;
        parse_cell(name, self.record.get(col).unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pm_data_csv_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn cells_are_typed() {
        assert_eq!(parse_cell("a", "3").unwrap(), Value::Int(3));
        assert_eq!(parse_cell("a", "3.5e1").unwrap(), Value::Float(35.0));
        assert_eq!(parse_cell("a", "true").unwrap(), Value::Bool(true));
        assert_eq!(parse_cell("a", "ee").unwrap(), Value::Str("ee".into()));
        assert_eq!(parse_cell("a", "").unwrap_err(), EvalError::NullValue("a".into()));
    }

    #[test]
    fn reads_across_files() {
        let dir = tmp_dir("multi");
        std::fs::write(dir.join("a.csv"), "x,flavor\n1,ee\n2,mm\n").unwrap();
        std::fs::write(dir.join("b.csv"), "x,flavor\n3, em \n").unwrap();
        let mut d = CsvLoader::new().open(&[dir.join("a.csv"), dir.join("b.csv")]).unwrap();
        assert_eq!(d.field_names(), vec!["x", "flavor"]);

        let mut rows = Vec::new();
        while d.next_record().unwrap() {
            rows.push((d.field("x").unwrap(), d.field("flavor").unwrap()));
        }
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], (Value::Int(3), Value::Str("em".into())));

        d.rewind().unwrap();
        assert!(d.next_record().unwrap());
        assert_eq!(d.field("x").unwrap(), Value::Int(1));
        assert!(matches!(d.field("y"), Err(EvalError::UnknownField(_))));
    }

    #[test]
    fn header_mismatch_is_a_scan_error() {
        let dir = tmp_dir("mismatch");
        std::fs::write(dir.join("a.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.join("b.csv"), "y\n1\n").unwrap();
        let mut d = CsvLoader::new().open(&[dir.join("a.csv"), dir.join("b.csv")]).unwrap();
        assert!(d.next_record().unwrap());
        let err = d.next_record().unwrap_err();
        assert!(matches!(err, Error::Scan(_)));
    }
}
