//! # pm-expr
//!
//! Per-event expressions for cuts, weights and plotted variables.
//!
//! An [`Expression`] is either parsed from a formula string
//! (`"njet >= 4 && pt[0] > 25"`) or wraps a caller-supplied function. Both
//! kinds compose through [`Expression::and`], [`Expression::compare`] and
//! friends, and evaluate against any [`pm_core::Record`].
//!
//! ```
//! use pm_core::{MapRecord, Value};
//! use pm_expr::Expression;
//!
//! let cut = Expression::formula("x > 4 && w != 0").unwrap();
//! let rec = MapRecord::new().with("x", 5i64).with("w", 0.5);
//! assert_eq!(cut.evaluate(&rec).unwrap(), Value::Bool(true));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expression;
pub mod formula;
pub mod ops;

pub use expression::{Expression, NamedFunc, NativeFn};
pub use formula::Formula;
pub use ops::{ArithOp, CmpOp};
