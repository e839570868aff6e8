//! Shared cursor over one concrete dataset.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pm_core::{EvalError, Record, Result, Value};

use crate::decoder::{RecordDecoder, not_positioned};
use crate::signature::Signature;

/// Id of a data source, unique within the process across every registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub usize);

static NEXT_SOURCE_ID: AtomicUsize = AtomicUsize::new(0);

impl SourceId {
    /// Allocate a fresh id.
    pub fn fresh() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Cursor {
    decoder: RefCell<Box<dyn RecordDecoder>>,
    cache: RefCell<HashMap<String, Value>>,
    index: u64,
    positioned: bool,
}

/// One concrete backing dataset.
///
/// The cursor is single-owner: [`DataSource::scan`] locks it for the
/// duration of one pass, so two tasks never interleave reads of the same
/// source. Fields are decoded on first access and cached until the cursor
/// advances.
pub struct DataSource {
    id: SourceId,
    signature: Signature,
    fields: Vec<String>,
    cursor: Mutex<Cursor>,
    decoded: AtomicU64,
}

impl DataSource {
    pub(crate) fn new(id: SourceId, signature: Signature, decoder: Box<dyn RecordDecoder>) -> Self {
        let fields = decoder.field_names();
        Self {
            id,
            signature,
            fields,
            cursor: Mutex::new(Cursor {
                decoder: RefCell::new(decoder),
                cache: RefCell::new(HashMap::new()),
                index: 0,
                positioned: false,
            }),
            decoded: AtomicU64::new(0),
        }
    }

    /// Registry-assigned id.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Canonical identity.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Field names declared by the schema.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Total records decoded over the lifetime of this source.
    pub fn records_decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Lock the cursor and rewind it to before the first record.
    ///
    /// Blocks while another scan of this source is in progress.
    pub fn scan(&self) -> Result<Scan<'_>> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        cursor.decoder.get_mut().rewind()?;
        cursor.cache.get_mut().clear();
        cursor.index = 0;
        cursor.positioned = false;
        tracing::debug!(source = %self.signature, "scan started");
        Ok(Scan { source: self, cursor })
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// An in-progress pass over a [`DataSource`].
pub struct Scan<'a> {
    source: &'a DataSource,
    cursor: MutexGuard<'a, Cursor>,
}

impl<'a> Scan<'a> {
    /// Step to the next record. `Ok(false)` at end of data.
    pub fn advance(&mut self) -> Result<bool> {
        let cursor = &mut *self.cursor;
        cursor.cache.get_mut().clear();
        if cursor.positioned {
            cursor.index += 1;
        }
        let more = cursor.decoder.get_mut().next_record()?;
        cursor.positioned = more;
        if more {
            self.source.decoded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(more)
    }

    /// View of the current record.
    pub fn current(&self) -> RecordView<'_> {
        RecordView { cursor: &*self.cursor }
    }

    /// Shorthand for `self.current().field(name)`.
    pub fn field(&self, name: &str) -> std::result::Result<Value, EvalError> {
        self.current().field(name)
    }

    /// Zero-based index of the current record.
    pub fn index(&self) -> u64 {
        self.cursor.index
    }

    /// The source being scanned.
    pub fn source(&self) -> &'a DataSource {
        self.source
    }
}

/// Borrowed view of the record under the cursor.
#[derive(Clone, Copy)]
pub struct RecordView<'s> {
    cursor: &'s Cursor,
}

impl Record for RecordView<'_> {
    fn field(&self, name: &str) -> std::result::Result<Value, EvalError> {
        if !self.cursor.positioned {
            return Err(not_positioned());
        }
        if let Some(v) = self.cursor.cache.borrow().get(name) {
            return Ok(v.clone());
        }
        let v = self.cursor.decoder.borrow_mut().field(name)?;
        self.cursor.cache.borrow_mut().insert(name.to_string(), v.clone());
        Ok(v)
    }

    fn index(&self) -> u64 {
        self.cursor.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDecoder;

    fn source() -> DataSource {
        let decoder = MemoryDecoder::new([
            ("x", vec![Value::Int(1), Value::Int(5), Value::Int(9)]),
            ("w", vec![Value::Float(0.5), Value::Float(1.0), Value::Float(2.0)]),
        ])
        .unwrap();
        let sig = Signature::new("memory", ["t"]).unwrap();
        DataSource::new(SourceId::fresh(), sig, Box::new(decoder))
    }

    #[test]
    fn scan_visits_every_record_once() {
        let src = source();
        let mut xs = Vec::new();
        let mut scan = src.scan().unwrap();
        while scan.advance().unwrap() {
            xs.push((scan.index(), scan.field("x").unwrap()));
        }
        assert_eq!(xs, vec![(0, Value::Int(1)), (1, Value::Int(5)), (2, Value::Int(9))]);
        drop(scan);
        assert_eq!(src.records_decoded(), 3);
    }

    #[test]
    fn rescan_rewinds() {
        let src = source();
        for _ in 0..2 {
            let mut scan = src.scan().unwrap();
            assert!(scan.advance().unwrap());
            assert_eq!(scan.field("x").unwrap(), Value::Int(1));
        }
        assert_eq!(src.records_decoded(), 2);
    }

    #[test]
    fn unknown_field_and_unpositioned_cursor() {
        let src = source();
        let mut scan = src.scan().unwrap();
        assert!(scan.field("x").is_err());
        assert!(scan.advance().unwrap());
        assert_eq!(scan.field("nope").unwrap_err(), EvalError::UnknownField("nope".into()));
    }
}
