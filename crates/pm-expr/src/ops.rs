//! Operator semantics shared by parsed formulas and composite expressions.

use pm_core::{EvalError, Value};

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    /// Operator symbol as written in formulas.
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Operator symbol as written in formulas.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ord == Equal,
            CmpOp::Ne => ord != Equal,
            CmpOp::Lt => ord == Less,
            CmpOp::Le => ord != Greater,
            CmpOp::Gt => ord == Greater,
            CmpOp::Ge => ord != Less,
        }
    }
}

/// Integer view of bools and ints; `None` for everything else.
fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Apply an arithmetic operator.
///
/// Integer `+ - *` stays integer (checked). `/` is always float division.
/// Vectors broadcast against scalars and combine element-wise with vectors
/// of the same length.
pub fn arith(op: ArithOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() != b.len() {
                return Err(EvalError::TypeMismatch {
                    expected: format!("vector of length {}", a.len()),
                    found: format!("vector of length {}", b.len()),
                });
            }
            a.iter().zip(&b).map(|(&x, &y)| float_op(op, x, y)).collect::<Result<_, _>>().map(Value::Vector)
        }
        (Value::Vector(a), scalar) => {
            let y = scalar.as_f64()?;
            a.iter().map(|&x| float_op(op, x, y)).collect::<Result<_, _>>().map(Value::Vector)
        }
        (scalar, Value::Vector(b)) => {
            let x = scalar.as_f64()?;
            b.iter().map(|&y| float_op(op, x, y)).collect::<Result<_, _>>().map(Value::Vector)
        }
        (lhs, rhs) => {
            if op != ArithOp::Div
                && let (Some(a), Some(b)) = (as_int(&lhs), as_int(&rhs))
            {
                let r = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                return r.map(Value::Int).ok_or_else(|| {
                    EvalError::Arithmetic(format!("integer overflow in {a} {} {b}", op.symbol()))
                });
            }
            Ok(Value::Float(float_op(op, lhs.as_f64()?, rhs.as_f64()?)?))
        }
    }
}

fn float_op(op: ArithOp, a: f64, b: f64) -> Result<f64, EvalError> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
    })
}

/// Negate a value.
pub fn negate(v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Arithmetic(format!("integer overflow in -{i}"))),
        Value::Bool(b) => Ok(Value::Int(-(b as i64))),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Vector(v) => Ok(Value::Vector(v.into_iter().map(|x| -x).collect())),
        other => Err(EvalError::type_mismatch("numeric", &other)),
    }
}

/// Equal within `f64::EPSILON` relative to the larger magnitude (absolute
/// below 1). Infinities are equal only to themselves; NaN to nothing.
fn float_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_finite() && b.is_finite() && (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0))
}

/// Compare two values.
///
/// Strings compare only with strings; integers compare exactly; anything
/// involving a float compares as `f64` with the [`float_eq`] tolerance,
/// which every operator honours, so `<=` agrees with `==`.
pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(op.holds(a.cmp(b))),
        (Value::Str(_), other) | (other, Value::Str(_)) => {
            Err(EvalError::type_mismatch("string", other))
        }
        _ => {
            if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
                return Ok(op.holds(a.cmp(&b)));
            }
            let (a, b) = (lhs.as_f64()?, rhs.as_f64()?);
            let eq = float_eq(a, b);
            Ok(match op {
                CmpOp::Eq => eq,
                CmpOp::Ne => !eq,
                CmpOp::Lt => a < b && !eq,
                CmpOp::Le => a < b || eq,
                CmpOp::Gt => a > b && !eq,
                CmpOp::Ge => a > b || eq,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(arith(ArithOp::Add, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(arith(ArithOp::Mul, Value::Bool(true), Value::Int(7)).unwrap(), Value::Int(7));
        assert_eq!(arith(ArithOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            arith(ArithOp::Div, Value::Float(1.0), Value::Int(0)).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn overflow_is_an_error() {
        let err = arith(ArithOp::Add, Value::Int(i64::MAX), Value::Int(1)).unwrap_err();
        assert!(matches!(err, EvalError::Arithmetic(_)));
    }

    #[test]
    fn vector_broadcast() {
        let v = arith(ArithOp::Mul, Value::Vector(vec![1.0, 2.0]), Value::Int(2)).unwrap();
        assert_eq!(v, Value::Vector(vec![2.0, 4.0]));
        let err = arith(ArithOp::Add, Value::Vector(vec![1.0]), Value::Vector(vec![1.0, 2.0]));
        assert!(err.is_err());
    }

    #[test]
    fn comparisons() {
        assert!(compare(CmpOp::Gt, &Value::Int(5), &Value::Float(4.0)).unwrap());
        assert!(compare(CmpOp::Eq, &Value::Float(0.1 + 0.2), &Value::Float(0.3)).unwrap());
        assert!(compare(CmpOp::Eq, &Value::Str("ee".into()), &Value::Str("ee".into())).unwrap());
        assert!(compare(CmpOp::Eq, &Value::Str("ee".into()), &Value::Int(1)).is_err());
    }

    #[test]
    fn float_tolerance_is_consistent_across_operators() {
        let (sum, third) = (Value::Float(0.1 + 0.2), Value::Float(0.3));
        assert!(compare(CmpOp::Le, &sum, &third).unwrap());
        assert!(compare(CmpOp::Ge, &sum, &third).unwrap());
        assert!(!compare(CmpOp::Gt, &sum, &third).unwrap());
        assert!(!compare(CmpOp::Ne, &sum, &third).unwrap());

        let big = Value::Float(1.0e12);
        assert!(compare(CmpOp::Eq, &big, &Value::Float(1.0e12 + 1.0e-4)).unwrap());
        assert!(compare(CmpOp::Lt, &big, &Value::Float(1.0e12 + 1.0)).unwrap());

        let inf = Value::Float(f64::INFINITY);
        assert!(compare(CmpOp::Eq, &inf, &inf).unwrap());
        assert!(!compare(CmpOp::Eq, &inf, &Value::Float(f64::MAX)).unwrap());
        let nan = Value::Float(f64::NAN);
        assert!(!compare(CmpOp::Eq, &nan, &nan).unwrap());
        assert!(compare(CmpOp::Ne, &nan, &nan).unwrap());
    }
}
