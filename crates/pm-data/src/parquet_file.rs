//! Parquet files via `parquet` + `arrow`.
//!
//! Record batches are pulled lazily. A column is converted to its typed
//! arrow array the first time a field of the current batch asks for it, so
//! columns nobody reads are never touched.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, ListArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use pm_core::{Error, EvalError, Result, Value};

use crate::decoder::{RecordDecoder, SourceLoader, not_positioned};

const DEFAULT_BATCH_SIZE: usize = 8192;

/// Loader for Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetLoader {
    batch_size: usize,
}

impl Default for ParquetLoader {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl ParquetLoader {
    /// Loader with the default batch size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per decoded record batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl SourceLoader for ParquetLoader {
    fn schema(&self) -> &str {
        "parquet"
    }

    fn open(&self, files: &[PathBuf]) -> Result<Box<dyn RecordDecoder>> {
        Ok(Box::new(ParquetDecoder::open(files.to_vec(), self.batch_size)?))
    }
}

/// Typed view of one column of the current batch.
enum Column {
    Int(Int64Array),
    Float(Float64Array),
    Bool(BooleanArray),
    Str(StringArray),
    List(ListArray),
}

impl Column {
    fn from_array(name: &str, array: &ArrayRef) -> std::result::Result<Self, EvalError> {
        let cast_to = |to: &DataType| cast(array, to).map_err(|e| EvalError::Native(format!("{name}: {e}")));
        Ok(match array.data_type() {
            DataType::Boolean => Column::Bool(array.as_boolean().clone()),
            dt if dt.is_integer() => Column::Int(cast_to(&DataType::Int64)?.as_primitive::<Int64Type>().clone()),
            dt if dt.is_floating() => {
                Column::Float(cast_to(&DataType::Float64)?.as_primitive::<Float64Type>().clone())
            }
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                Column::Str(cast_to(&DataType::Utf8)?.as_string::<i32>().clone())
            }
            DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => {
                let item = Arc::new(Field::new("item", DataType::Float64, true));
                Column::List(cast_to(&DataType::List(item))?.as_list::<i32>().clone())
            }
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: "int, float, bool, string or list column".to_string(),
                    found: format!("{other}"),
                });
            }
        })
    }

    fn value(&self, name: &str, row: usize) -> std::result::Result<Value, EvalError> {
        let null = match self {
            Column::Int(a) => a.is_null(row),
            Column::Float(a) => a.is_null(row),
            Column::Bool(a) => a.is_null(row),
            Column::Str(a) => a.is_null(row),
            Column::List(a) => a.is_null(row),
        };
        if null {
            return Err(EvalError::NullValue(name.to_string()));
        }
        Ok(match self {
            Column::Int(a) => Value::Int(a.value(row)),
            Column::Float(a) => Value::Float(a.value(row)),
            Column::Bool(a) => Value::Bool(a.value(row)),
            Column::Str(a) => Value::Str(a.value(row).to_string()),
            Column::List(a) => {
                let inner = a.value(row);
                Value::Vector(inner.as_primitive::<Float64Type>().iter().flatten().collect())
            }
        })
    }
}

/// Record decoder over a sequence of Parquet files sharing one schema.
pub struct ParquetDecoder {
    files: Vec<PathBuf>,
    batch_size: usize,
    fields: Vec<String>,
    next_file: usize,
    reader: Option<ParquetRecordBatchReader>,
    batch: Option<RecordBatch>,
    row: usize,
    positioned: bool,
    columns: HashMap<String, Column>,
}

fn parquet_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Scan(format!("{}: {e}", path.display()))
}

fn open_reader(path: &Path, batch_size: usize) -> Result<(Vec<String>, ParquetRecordBatchReader)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(path, e))?;
    let fields = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
    let reader = builder.with_batch_size(batch_size).build().map_err(|e| parquet_err(path, e))?;
    Ok((fields, reader))
}

impl ParquetDecoder {
    /// Open `files`, taking the schema of the first one.
    pub fn open(files: Vec<PathBuf>, batch_size: usize) -> Result<Self> {
        let first = files
            .first()
            .ok_or_else(|| Error::Configuration("Parquet source has no files".to_string()))?;
        let (fields, _) = open_reader(first, batch_size)?;
        Ok(Self {
            files,
            batch_size,
            fields,
            next_file: 0,
            reader: None,
            batch: None,
            row: 0,
            positioned: false,
            columns: HashMap::new(),
        })
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.files.get(self.next_file) else {
            return Ok(false);
        };
        let (fields, reader) = open_reader(path, self.batch_size)?;
        if fields != self.fields {
            return Err(Error::Scan(format!(
                "{}: columns {:?} do not match source schema {:?}",
                path.display(),
                fields,
                self.fields
            )));
        }
        tracing::debug!(file = %path.display(), "parquet file opened");
        self.reader = Some(reader);
        self.next_file += 1;
        Ok(true)
    }

    /// Pull the next non-empty batch. `Ok(false)` when all files are exhausted.
    fn next_batch(&mut self) -> Result<bool> {
        self.columns.clear();
        self.batch = None;
        loop {
            if self.reader.is_none() && !self.open_next()? {
                return Ok(false);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(false);
            };
            match reader.next() {
                Some(Ok(batch)) if batch.num_rows() > 0 => {
                    self.batch = Some(batch);
                    self.row = 0;
                    return Ok(true);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(parquet_err(&self.files[self.next_file - 1], e)),
                None => self.reader = None,
            }
        }
    }
}

impl RecordDecoder for ParquetDecoder {
    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = None;
        self.batch = None;
        self.columns.clear();
        self.next_file = 0;
        self.row = 0;
        self.positioned = false;
        Ok(())
    }

    fn next_record(&mut self) -> Result<bool> {
        if self.positioned
            && let Some(batch) = &self.batch
            && self.row + 1 < batch.num_rows()
        {
            self.row += 1;
            return Ok(true);
        }
        self.positioned = false;
        self.positioned = self.next_batch()?;
        Ok(self.positioned)
    }

    fn field(&mut self, name: &str) -> std::result::Result<Value, EvalError> {
        if !self.positioned {
            return Err(not_positioned());
        }
        let Some(batch) = &self.batch else {
            return Err(not_positioned());
        };
        if !self.columns.contains_key(name) {
            let array =
                batch.column_by_name(name).ok_or_else(|| EvalError::UnknownField(name.to_string()))?;
            let column = Column::from_array(name, array)?;
            self.columns.insert(name.to_string(), column);
        }
        match self.columns.get(name) {
            Some(column) => column.value(name, self.row),
            None => Err(EvalError::UnknownField(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Builder, ListBuilder};
    use arrow::datatypes::Schema;
    use parquet::arrow::ArrowWriter;

    fn write_file(path: &Path, xs: &[i64], jets: &[&[f64]]) {
        let mut list = ListBuilder::new(Float64Builder::new());
        for j in jets {
            list.values().append_slice(j);
            list.append(true);
        }
        let list = list.finish();
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("jet_pt", list.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(xs.to_vec())), Arc::new(list)],
        )
        .unwrap();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_batches_across_files() {
        let dir = std::env::temp_dir().join(format!("pm_data_parquet_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.parquet");
        let b = dir.join("b.parquet");
        write_file(&a, &[1, 5, 9], &[&[10.0], &[], &[30.0, 20.0]]);
        write_file(&b, &[7], &[&[1.0, 2.0, 3.0]]);

        let mut d = ParquetLoader::new().with_batch_size(2).open(&[a, b]).unwrap();
        assert_eq!(d.field_names(), vec!["x", "jet_pt"]);

        let mut xs = Vec::new();
        let mut sizes = Vec::new();
        while d.next_record().unwrap() {
            xs.push(d.field("x").unwrap());
            if let Value::Vector(v) = d.field("jet_pt").unwrap() {
                sizes.push(v.len());
            }
        }
        assert_eq!(xs, vec![Value::Int(1), Value::Int(5), Value::Int(9), Value::Int(7)]);
        assert_eq!(sizes, vec![1, 0, 2, 3]);

        d.rewind().unwrap();
        assert!(d.next_record().unwrap());
        assert_eq!(d.field("x").unwrap(), Value::Int(1));
        assert!(matches!(d.field("nope"), Err(EvalError::UnknownField(_))));
    }
}
