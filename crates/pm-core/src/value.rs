//! Dynamically typed result of evaluating an expression.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Value of one field or expression for one record.
///
/// Numeric and boolean values normalize to `f64` for weighting and binning;
/// `Vector` carries small per-event collections (e.g. jet momenta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Variable-length vector of floats.
    Vector(Vec<f64>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Vector(_) => "vector",
        }
    }

    /// Normalize a scalar to `f64` (`true` → 1, `false` → 0).
    pub fn as_f64(&self) -> Result<f64, EvalError> {
        match self {
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(EvalError::type_mismatch("numeric scalar", other)),
        }
    }

    /// Truthiness used by cuts and logical operators.
    ///
    /// Numbers are true when non-zero (NaN is false), strings when non-empty.
    /// Vectors have no truth value.
    pub fn truthy(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
            Value::Str(s) => Ok(!s.is_empty()),
            other @ Value::Vector(_) => Err(EvalError::type_mismatch("scalar", other)),
        }
    }

    /// Whether this is a [`Value::Vector`].
    pub fn is_vector(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    /// Flatten into the `f64` values to be filled into a histogram:
    /// one value for scalars, every element for vectors.
    pub fn fill_values(&self) -> Result<Vec<f64>, EvalError> {
        match self {
            Value::Vector(v) => Ok(v.clone()),
            scalar => Ok(vec![scalar.as_f64()?]),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Vector(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_normalization() {
        assert_eq!(Value::Bool(true).as_f64().unwrap(), 1.0);
        assert_eq!(Value::Int(-3).as_f64().unwrap(), -3.0);
        assert_eq!(Value::Float(2.5).as_f64().unwrap(), 2.5);
        assert!(Value::Str("x".into()).as_f64().is_err());
        assert!(Value::Vector(vec![1.0]).as_f64().is_err());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(2).truthy().unwrap());
        assert!(!Value::Float(0.0).truthy().unwrap());
        assert!(!Value::Float(f64::NAN).truthy().unwrap());
        assert!(!Value::Str(String::new()).truthy().unwrap());
        assert!(Value::Vector(vec![]).truthy().is_err());
    }

    #[test]
    fn untagged_json() {
        let v: Vec<Value> = serde_json::from_str(r#"[true, 3, 1.5, "mu", [1.0, 2.0]]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Value::Bool(true),
                Value::Int(3),
                Value::Float(1.5),
                Value::Str("mu".into()),
                Value::Vector(vec![1.0, 2.0]),
            ]
        );
    }

    #[test]
    fn fill_values_flattens_vectors() {
        assert_eq!(Value::Int(4).fill_values().unwrap(), vec![4.0]);
        assert_eq!(Value::Vector(vec![1.0, 2.0]).fill_values().unwrap(), vec![1.0, 2.0]);
    }
}
