//! Named, immutable per-event expressions.

use std::fmt;
use std::sync::Arc;

use pm_core::{EvalError, MapRecord, Record, Result, Value};

use crate::formula::Formula;
use crate::ops::{self, ArithOp, CmpOp};

/// Signature of a caller-supplied per-event function.
pub type NativeFn = dyn Fn(&dyn Record) -> std::result::Result<Value, EvalError> + Send + Sync;

/// Historical name used by analysis code for [`Expression`].
pub type NamedFunc = Expression;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Logic {
    And,
    Or,
}

enum Node {
    Formula(Formula),
    Native(Box<NativeFn>),
    Constant(Value),
    Not(Expression),
    Logic(Logic, Expression, Expression),
    Compare(CmpOp, Expression, Expression),
    Arith(ArithOp, Expression, Expression),
}

/// A named computation from one record to one [`Value`].
///
/// Cloning is cheap: the payload is shared behind an `Arc`, and combinators
/// build new nodes that reference their operands without touching them.
/// The name is the display identity (legends, table rows, file names); two
/// expressions with the same name are treated as the same quantity.
#[derive(Clone)]
pub struct Expression {
    name: Arc<str>,
    node: Arc<Node>,
}

impl Expression {
    fn from_node(name: impl Into<Arc<str>>, node: Node) -> Self {
        Self { name: name.into(), node: Arc::new(node) }
    }

    /// Parse a formula; the expression is named after its (trimmed) text.
    pub fn formula(text: &str) -> Result<Self> {
        let f = Formula::parse(text)?;
        Ok(Self::from_node(f.source().to_string(), Node::Formula(f)))
    }

    /// Parse a formula under an explicit display name.
    pub fn named_formula(name: impl Into<String>, text: &str) -> Result<Self> {
        let f = Formula::parse(text)?;
        Ok(Self::from_node(name.into(), Node::Formula(f)))
    }

    /// Wrap a caller-supplied function.
    pub fn native<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn Record) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self::from_node(name.into(), Node::Native(Box::new(f)))
    }

    /// A constant, named after its value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let name = match &value {
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Str(s) => format!("\"{s}\""),
            other => other.to_string(),
        };
        Self::from_node(name, Node::Constant(value))
    }

    /// The always-true cut (named `"1"`), the default selection.
    pub fn always() -> Self {
        Self::constant(true)
    }

    /// Unit weight (named `"1"`).
    pub fn unit() -> Self {
        Self::from_node("1", Node::Constant(Value::Int(1)))
    }

    /// Same computation under a different display name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self { name: name.into(), node: Arc::clone(&self.node) }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a constant that is true for every record.
    pub fn is_always_true(&self) -> bool {
        self.constant_value().is_some_and(|v| v.truthy().unwrap_or(false))
    }

    /// Whether this is the constant 1 (numerically).
    pub fn is_unit(&self) -> bool {
        self.constant_value().is_some_and(|v| v.as_f64().is_ok_and(|x| x == 1.0))
    }

    /// Value of a record-independent expression (a constant, or a formula
    /// without field references).
    fn constant_value(&self) -> Option<Value> {
        match &*self.node {
            Node::Constant(v) => Some(v.clone()),
            Node::Formula(f) if f.is_constant() => f.eval(&MapRecord::new()).ok(),
            _ => None,
        }
    }

    /// Whether both handles point at the same underlying node.
    pub fn ptr_eq(&self, other: &Expression) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    // ── Combinators ────────────────────────────────────────────

    /// Logical AND. `always()` is the identity.
    pub fn and(&self, rhs: &Expression) -> Expression {
        if self.is_always_true() {
            return rhs.clone();
        }
        if rhs.is_always_true() {
            return self.clone();
        }
        let name = format!("{}&&{}", wrap(self.name()), wrap(rhs.name()));
        Self::from_node(name, Node::Logic(Logic::And, self.clone(), rhs.clone()))
    }

    /// Logical OR.
    pub fn or(&self, rhs: &Expression) -> Expression {
        let name = format!("{}||{}", wrap(self.name()), wrap(rhs.name()));
        Self::from_node(name, Node::Logic(Logic::Or, self.clone(), rhs.clone()))
    }

    /// Logical NOT.
    pub fn not(&self) -> Expression {
        Self::from_node(format!("!{}", wrap(self.name())), Node::Not(self.clone()))
    }

    /// Compare against another expression.
    pub fn compare(&self, op: CmpOp, rhs: &Expression) -> Expression {
        let name = format!("{}{}{}", wrap(self.name()), op.symbol(), wrap(rhs.name()));
        Self::from_node(name, Node::Compare(op, self.clone(), rhs.clone()))
    }

    /// Compare against a literal.
    pub fn compare_value(&self, op: CmpOp, rhs: impl Into<Value>) -> Expression {
        self.compare(op, &Expression::constant(rhs))
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Into<Value>) -> Expression {
        self.compare_value(CmpOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(&self, rhs: impl Into<Value>) -> Expression {
        self.compare_value(CmpOp::Ge, rhs)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Into<Value>) -> Expression {
        self.compare_value(CmpOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(&self, rhs: impl Into<Value>) -> Expression {
        self.compare_value(CmpOp::Le, rhs)
    }

    /// Arithmetic combination.
    pub fn arith(&self, op: ArithOp, rhs: &Expression) -> Expression {
        let name = format!("{}{}{}", wrap(self.name()), op.symbol(), wrap(rhs.name()));
        Self::from_node(name, Node::Arith(op, self.clone(), rhs.clone()))
    }

    /// Product, used for combining weights. `unit()` is the identity.
    pub fn times(&self, rhs: &Expression) -> Expression {
        if self.is_unit() {
            return rhs.clone();
        }
        if rhs.is_unit() {
            return self.clone();
        }
        self.arith(ArithOp::Mul, rhs)
    }

    // ── Evaluation ─────────────────────────────────────────────

    /// Evaluate against one record.
    pub fn evaluate(&self, record: &dyn Record) -> std::result::Result<Value, EvalError> {
        match &*self.node {
            Node::Formula(f) => f.eval(record),
            Node::Native(f) => f(record),
            Node::Constant(v) => Ok(v.clone()),
            Node::Not(a) => Ok(Value::Bool(!a.evaluate(record)?.truthy()?)),
            Node::Logic(op, a, b) => {
                let lhs = a.evaluate(record)?.truthy()?;
                let decided = match op {
                    Logic::And => !lhs,
                    Logic::Or => lhs,
                };
                if decided {
                    return Ok(Value::Bool(lhs));
                }
                Ok(Value::Bool(b.evaluate(record)?.truthy()?))
            }
            Node::Compare(op, a, b) => {
                let lhs = a.evaluate(record)?;
                let rhs = b.evaluate(record)?;
                Ok(Value::Bool(ops::compare(*op, &lhs, &rhs)?))
            }
            Node::Arith(op, a, b) => {
                let lhs = a.evaluate(record)?;
                let rhs = b.evaluate(record)?;
                ops::arith(*op, lhs, rhs)
            }
        }
    }

    /// Evaluate as a cut.
    pub fn passes(&self, record: &dyn Record) -> std::result::Result<bool, EvalError> {
        self.evaluate(record)?.truthy()
    }

    /// Evaluate as a scalar weight.
    pub fn evaluate_f64(&self, record: &dyn Record) -> std::result::Result<f64, EvalError> {
        self.evaluate(record)?.as_f64()
    }

    /// Field names referenced by the formula parts of this expression.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match &*self.node {
            Node::Formula(f) => {
                for name in f.fields() {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
            }
            Node::Native(_) | Node::Constant(_) => {}
            Node::Not(a) => a.collect_fields(out),
            Node::Logic(_, a, b) | Node::Compare(_, a, b) | Node::Arith(_, a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
        }
    }

    /// File-system friendly rendering of the name, e.g.
    /// `"njet>=4&&met>200.5"` → `"njetgeq4_and_metg200p5"`.
    pub fn file_stem(&self) -> String {
        file_stem(self.name())
    }
}

fn wrap(name: &str) -> String {
    let simple = name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
    if simple { name.to_string() } else { format!("({name})") }
}

/// Map an expression name to a string usable in file names.
pub fn file_stem(name: &str) -> String {
    const REPLACEMENTS: [(&str, &str); 14] = [
        (">=", "geq"),
        ("<=", "leq"),
        ("==", "eq"),
        ("!=", "neq"),
        ("&&", "_and_"),
        ("||", "_or_"),
        (">", "g"),
        ("<", "l"),
        ("!", "not"),
        ("+", "_plus_"),
        ("-", "_minus_"),
        ("*", "_times_"),
        ("/", "_div_"),
        (".", "p"),
    ];
    let mut s = name.to_string();
    for (from, to) in REPLACEMENTS {
        s = s.replace(from, to);
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else if c == ' ' || c == '(' || c == ')' {
            continue;
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { "expr".to_string() } else { out }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.node {
            Node::Formula(_) => "formula",
            Node::Native(_) => "native",
            Node::Constant(_) => "constant",
            Node::Not(_) | Node::Logic(..) | Node::Compare(..) | Node::Arith(..) => "composite",
        };
        f.debug_struct("Expression").field("name", &self.name).field("kind", &kind).finish()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<Formula> for Expression {
    fn from(f: Formula) -> Self {
        Self::from_node(f.source().to_string(), Node::Formula(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::MapRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn x(v: i64) -> MapRecord {
        MapRecord::new().with("x", v)
    }

    #[test]
    fn native_and_formula_agree() {
        let declarative = Expression::formula("x * 2 + 1").unwrap();
        let functional = Expression::native("x*2+1", |r: &dyn Record| {
            ops::arith(ArithOp::Add, ops::arith(ArithOp::Mul, r.field("x")?, Value::Int(2))?, Value::Int(1))
        });
        for v in [-3, 0, 7] {
            assert_eq!(declarative.evaluate(&x(v)).unwrap(), functional.evaluate(&x(v)).unwrap());
        }
    }

    #[test]
    fn and_with_always_is_identity() {
        let cut = Expression::formula("x > 4").unwrap();
        assert!(Expression::always().and(&cut).ptr_eq(&cut));
        assert!(cut.and(&Expression::always()).ptr_eq(&cut));
        assert!(Expression::unit().times(&cut).ptr_eq(&cut));
    }

    #[test]
    fn composite_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = Arc::clone(&calls);
            Expression::native("expensive", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Bool(true))
            })
        };
        let cut = Expression::formula("x > 4").unwrap().and(&counted);
        assert_eq!(cut.evaluate(&x(1)).unwrap(), Value::Bool(false));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cut.evaluate(&x(9)).unwrap(), Value::Bool(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let either = Expression::formula("x < 4").unwrap().or(&counted);
        assert_eq!(either.evaluate(&x(1)).unwrap(), Value::Bool(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composites_leave_operands_untouched() {
        let a = Expression::formula("x").unwrap();
        let b = a.gt(4i64);
        let c = a.times(&Expression::constant(3i64));
        assert_eq!(a.name(), "x");
        assert_eq!(b.name(), "x>4");
        assert_eq!(c.name(), "x*3");
        assert_eq!(a.evaluate(&x(5)).unwrap(), Value::Int(5));
        assert_eq!(b.evaluate(&x(5)).unwrap(), Value::Bool(true));
        assert_eq!(c.evaluate(&x(5)).unwrap(), Value::Int(15));
    }

    #[test]
    fn composite_names_are_parenthesized() {
        let a = Expression::formula("njet >= 4").unwrap();
        let b = Expression::formula("met>200").unwrap();
        assert_eq!(a.and(&b).name(), "(njet >= 4)&&(met>200)");
        assert_eq!(a.not().name(), "!(njet >= 4)");
    }

    #[test]
    fn unknown_field_propagates() {
        let e = Expression::formula("nope + 1").unwrap();
        assert_eq!(e.evaluate(&x(1)).unwrap_err(), EvalError::UnknownField("nope".into()));
        let composite = e.gt(0i64).and(&Expression::always());
        assert!(composite.passes(&x(1)).is_err());
    }

    #[test]
    fn fields_are_collected_through_composites() {
        let e = Expression::formula("a + b").unwrap().and(&Expression::formula("c > a").unwrap());
        assert_eq!(e.fields(), vec!["a", "b", "c"]);
    }

    #[test]
    fn file_stems() {
        assert_eq!(file_stem("njet>=4&&met>200.5"), "njetgeq4_and_metg200p5");
        assert_eq!(file_stem("(a)*(b)"), "a_times_b");
        assert_eq!(file_stem("jet_pt[0]"), "jet_pt_0");
        assert_eq!(file_stem("!!"), "notnot");
        assert_eq!(file_stem("()"), "expr");
    }
}
