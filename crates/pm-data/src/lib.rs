//! # pm-data
//!
//! Data sources for PlotMaker.
//!
//! A [`DataSource`] is a cursor over one concrete dataset: a canonical set
//! of files decoded by one [`RecordDecoder`]. Sources are shared through a
//! [`SourceRegistry`] so that every category declared over the same files
//! reads them through the same instance.
//!
//! ```
//! use std::sync::Arc;
//! use pm_core::Record;
//! use pm_data::{MemoryLoader, Signature, SourceRegistry};
//!
//! let loader = Arc::new(MemoryLoader::new().with_table("mc.mem", [("x", vec![1i64.into(), 5i64.into()])]));
//! let registry = SourceRegistry::new();
//! let sig = Signature::new("memory", ["mc.mem"]).unwrap();
//! let src = registry.get_or_create(&sig, loader.as_ref()).unwrap();
//!
//! let mut scan = src.scan().unwrap();
//! let mut n = 0;
//! while scan.advance().unwrap() {
//!     assert!(scan.current().field("x").is_ok());
//!     n += 1;
//! }
//! assert_eq!(n, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod csv_table;
pub mod decoder;
pub mod memory;
pub mod parquet_file;
pub mod registry;
pub mod resolve;
pub mod signature;
pub mod source;

pub use csv_table::{CsvDecoder, CsvLoader};
pub use decoder::{RecordDecoder, SourceLoader};
pub use memory::{MemoryDecoder, MemoryLoader};
pub use parquet_file::{ParquetDecoder, ParquetLoader};
pub use registry::SourceRegistry;
pub use resolve::resolve_patterns;
pub use signature::Signature;
pub use source::{DataSource, RecordView, Scan, SourceId};
