//! # pm-core
//!
//! Core types shared by every PlotMaker crate: the dynamically typed
//! [`Value`] produced by expressions, the [`Record`] view an expression is
//! evaluated against, and the error types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod value;

pub use error::{Error, EvalError, Result};
pub use record::{MapRecord, Record};
pub use value::Value;

/// PlotMaker version (from the workspace manifest).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
