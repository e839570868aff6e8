//! Formula compiler for cuts, weights and plotted variables.
//!
//! Supports arithmetic (+, -, *, /), comparisons (==, !=, <, <=, >, >=),
//! boolean operators (&&, ||, !), the ternary `c ? a : b`, vector indexing
//! (`jet_pt[0]`), string literals, and built-in functions (abs, sqrt, log,
//! log10, exp, sin, cos, pow, atan2, min, max, size, sum). ROOT spellings
//! such as `TMath::Abs` or `fabs` are accepted.
//!
//! Identifiers are field names. They are resolved through the record at
//! evaluation time, so a formula can be compiled before any data source is
//! opened.

use pm_core::{Error, EvalError, Record, Result, Value};

use crate::ops::{self, ArithOp, CmpOp};

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Field(usize), // index into `fields`
    Neg(Box<Node>),
    Not(Box<Node>),
    Arith(ArithOp, Box<Node>, Box<Node>),
    Cmp(CmpOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
    Index(Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Log10,
    Exp,
    Sin,
    Cos,
    Pow,
    Atan2,
    Min,
    Max,
    Size,
    Sum,
}

impl Func {
    fn from_ident(name: &str) -> Option<Func> {
        // Accept ROOT spellings by stripping namespaces and lowercasing.
        let leaf = name.rsplit("::").next().unwrap_or(name);
        match leaf.to_ascii_lowercase().as_str() {
            "abs" | "fabs" => Some(Func::Abs),
            "sqrt" => Some(Func::Sqrt),
            "log" => Some(Func::Log),
            "log10" => Some(Func::Log10),
            "exp" => Some(Func::Exp),
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "pow" | "power" => Some(Func::Pow),
            "atan2" => Some(Func::Atan2),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "size" => Some(Func::Size),
            "sum" => Some(Func::Sum),
            _ => None,
        }
    }

    /// Accepted argument counts (inclusive range).
    fn arity(self) -> (usize, usize) {
        match self {
            Func::Pow | Func::Atan2 => (2, 2),
            Func::Min | Func::Max => (1, 2),
            _ => (1, 1),
        }
    }
}

// ── Compiled formula ───────────────────────────────────────────

/// A parsed formula ready for evaluation.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    root: Node,
    fields: Vec<String>,
}

impl Formula {
    /// Parse a formula string.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty formula".to_string()));
        }
        let mut parser = Parser::new(input, &tokens);
        let root = parser.parse_ternary()?;
        if let Some(t) = parser.tokens.get(parser.pos) {
            return Err(expr_err(
                input,
                t.span,
                format!("unexpected token after expression: {:?}", t.kind),
            ));
        }
        let fields = std::mem::take(&mut parser.fields);
        Ok(Formula { source: input.trim().to_string(), root, fields })
    }

    /// The formula text (trimmed).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced by this formula, in order of first occurrence.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the formula references no fields.
    pub fn is_constant(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluate against one record.
    pub fn eval(&self, record: &dyn Record) -> std::result::Result<Value, EvalError> {
        eval_node(&self.root, &self.fields, record)
    }
}

// ── Evaluation ─────────────────────────────────────────────────

type EvalResult = std::result::Result<Value, EvalError>;

fn eval_node(n: &Node, fields: &[String], rec: &dyn Record) -> EvalResult {
    match n {
        Node::Literal(v) => Ok(v.clone()),
        Node::Field(i) => rec.field(&fields[*i]),
        Node::Neg(a) => ops::negate(eval_node(a, fields, rec)?),
        Node::Not(a) => Ok(Value::Bool(!eval_node(a, fields, rec)?.truthy()?)),
        Node::Arith(op, a, b) => {
            let lhs = eval_node(a, fields, rec)?;
            let rhs = eval_node(b, fields, rec)?;
            ops::arith(*op, lhs, rhs)
        }
        Node::Cmp(op, a, b) => {
            let lhs = eval_node(a, fields, rec)?;
            let rhs = eval_node(b, fields, rec)?;
            Ok(Value::Bool(ops::compare(*op, &lhs, &rhs)?))
        }
        Node::And(a, b) => {
            if !eval_node(a, fields, rec)?.truthy()? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_node(b, fields, rec)?.truthy()?))
        }
        Node::Or(a, b) => {
            if eval_node(a, fields, rec)?.truthy()? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_node(b, fields, rec)?.truthy()?))
        }
        Node::Ternary(c, t, f) => {
            if eval_node(c, fields, rec)?.truthy()? {
                eval_node(t, fields, rec)
            } else {
                eval_node(f, fields, rec)
            }
        }
        Node::Index(base, index) => {
            let base = eval_node(base, fields, rec)?;
            let index = eval_node(index, fields, rec)?;
            let Value::Vector(v) = base else {
                return Err(EvalError::type_mismatch("vector", &base));
            };
            let i = match index {
                Value::Int(i) => i,
                Value::Float(f) if f.fract() == 0.0 => f as i64,
                other => return Err(EvalError::type_mismatch("integer index", &other)),
            };
            usize::try_from(i)
                .ok()
                .and_then(|u| v.get(u).copied())
                .map(Value::Float)
                .ok_or(EvalError::IndexOutOfRange { index: i, len: v.len() })
        }
        Node::Call(f, args) => {
            let vals =
                args.iter().map(|a| eval_node(a, fields, rec)).collect::<std::result::Result<Vec<_>, _>>()?;
            call(*f, vals)
        }
    }
}

fn call(f: Func, args: Vec<Value>) -> EvalResult {
    let scalar = |i: usize| args[i].as_f64();
    let vector = |i: usize| match &args[i] {
        Value::Vector(v) => Ok(v.as_slice()),
        other => Err(EvalError::type_mismatch("vector", other)),
    };
    let out = match f {
        Func::Abs => match &args[0] {
            Value::Int(i) => {
                return i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Arithmetic(format!("integer overflow in abs({i})")));
            }
            _ => scalar(0)?.abs(),
        },
        Func::Sqrt => scalar(0)?.sqrt(),
        Func::Log => scalar(0)?.ln(),
        Func::Log10 => scalar(0)?.log10(),
        Func::Exp => scalar(0)?.exp(),
        Func::Sin => scalar(0)?.sin(),
        Func::Cos => scalar(0)?.cos(),
        Func::Pow => scalar(0)?.powf(scalar(1)?),
        Func::Atan2 => scalar(0)?.atan2(scalar(1)?),
        Func::Min | Func::Max => {
            let pick = |a: f64, b: f64| if matches!(f, Func::Min) { a.min(b) } else { a.max(b) };
            if args.len() == 2 {
                pick(scalar(0)?, scalar(1)?)
            } else {
                vector(0)?.iter().copied().reduce(pick).ok_or_else(|| {
                    EvalError::Arithmetic("min/max of an empty vector".to_string())
                })?
            }
        }
        Func::Size => return Ok(Value::Int(vector(0)?.len() as i64)),
        Func::Sum => vector(0)?.iter().sum(),
    };
    Ok(Value::Float(out))
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    span: Span,
}

fn line_col_1based(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let mut line: usize = 1;
    let mut col: usize = 1;
    for &b in &input.as_bytes()[..offset] {
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn expr_err(input: &str, span: Span, msg: String) -> Error {
    let (line, col) = line_col_1based(input, span.start);
    Error::Expression(format!("line {line}, col {col}: {msg} (in '{}')", input.trim()))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    if let Some((start, ch)) = input.char_indices().find(|(_, ch)| !ch.is_ascii()) {
        return Err(expr_err(
            input,
            Span { start, end: start + ch.len_utf8() },
            "formula must be ASCII".to_string(),
        ));
    }

    let bytes = input.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i: usize = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if i + 1 < bytes.len() {
            let kind = match &input[i..i + 2] {
                "&&" => Some(TokenKind::And),
                "||" => Some(TokenKind::Or),
                "==" => Some(TokenKind::Eq),
                "!=" => Some(TokenKind::Ne),
                "<=" => Some(TokenKind::Le),
                ">=" => Some(TokenKind::Ge),
                _ => None,
            };
            if let Some(kind) = kind {
                tokens.push(Token { kind, span: Span { start: i, end: i + 2 } });
                i += 2;
                continue;
            }
        }

        let single = match b {
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b',' => Some(TokenKind::Comma),
            b'?' => Some(TokenKind::Question),
            b'<' => Some(TokenKind::Lt),
            b'>' => Some(TokenKind::Gt),
            b'!' => Some(TokenKind::Not),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, span: Span { start: i, end: i + 1 } });
            i += 1;
            continue;
        }

        let start = i;
        match b {
            // `::` belongs to identifiers (TMath::Abs); a lone ':' is the ternary separator.
            b':' => {
                tokens.push(Token { kind: TokenKind::Colon, span: Span { start, end: i + 1 } });
                i += 1;
            }
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(expr_err(
                        input,
                        Span { start, end: i },
                        "unterminated string literal".to_string(),
                    ));
                }
                let text = input[start + 1..i].to_string();
                i += 1;
                tokens.push(Token { kind: TokenKind::Str(text), span: Span { start, end: i } });
            }
            _ if b.is_ascii_digit() || b == b'.' => {
                let mut is_float = false;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit()
                        || bytes[i] == b'.'
                        || bytes[i] == b'e'
                        || bytes[i] == b'E'
                        || ((bytes[i] == b'+' || bytes[i] == b'-')
                            && i > start
                            && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
                {
                    if !bytes[i].is_ascii_digit() {
                        is_float = true;
                    }
                    i += 1;
                }
                let s = &input[start..i];
                let span = Span { start, end: i };
                let kind = if is_float {
                    s.parse::<f64>()
                        .map(TokenKind::Float)
                        .map_err(|_| expr_err(input, span, format!("invalid number: '{s}'")))?
                } else {
                    s.parse::<i64>()
                        .map(TokenKind::Int)
                        .map_err(|_| expr_err(input, span, format!("invalid integer: '{s}'")))?
                };
                tokens.push(Token { kind, span });
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() {
                    let c = bytes[i];
                    if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                        i += 1;
                    } else if c == b':' && bytes.get(i + 1) == Some(&b':') {
                        i += 2;
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[start..i].to_string()),
                    span: Span { start, end: i },
                });
            }
            _ => {
                return Err(expr_err(
                    input,
                    Span { start, end: i + 1 },
                    format!("unexpected character: '{}'", b as char),
                ));
            }
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Token],
    pos: usize,
    fields: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: &'a [Token]) -> Self {
        Self { input, tokens, pos: 0, fields: Vec::new() }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn end_span(&self) -> Span {
        let end = self.input.len();
        Span { start: end, end }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<()> {
        match self.advance() {
            Some(t) if &t.kind == expected => Ok(()),
            Some(t) => Err(expr_err(
                self.input,
                t.span,
                format!("expected {:?}, got {:?}", expected, t.kind),
            )),
            None => Err(expr_err(
                self.input,
                self.end_span(),
                format!("expected {:?}, got end of input", expected),
            )),
        }
    }

    fn resolve_field(&mut self, name: &str) -> usize {
        if let Some(i) = self.fields.iter().position(|f| f == name) {
            i
        } else {
            self.fields.push(name.to_string());
            self.fields.len() - 1
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_ternary(&mut self) -> Result<Node> {
        let cond = self.parse_or()?;
        if !matches!(self.peek(), Some(TokenKind::Question)) {
            return Ok(cond);
        }
        self.advance();
        let then = self.parse_ternary()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_ternary()?;
        Ok(Node::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(TokenKind::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(TokenKind::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Node> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(TokenKind::Eq) => CmpOp::Eq,
            Some(TokenKind::Ne) => CmpOp::Ne,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Node::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Node> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Node::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Node::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.advance();
                Ok(Node::Neg(Box::new(self.parse_unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(TokenKind::Not) => {
                self.advance();
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut base = self.parse_atom()?;
        while matches!(self.peek(), Some(TokenKind::LBracket)) {
            self.advance();
            let index = self.parse_ternary()?;
            self.expect(&TokenKind::RBracket)?;
            base = Node::Index(Box::new(base), Box::new(index));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Node> {
        let Some(tok) = self.advance() else {
            return Err(expr_err(
                self.input,
                self.end_span(),
                "expected number, identifier, or '(', got end of input".to_string(),
            ));
        };
        match &tok.kind {
            TokenKind::Int(n) => Ok(Node::Literal(Value::Int(*n))),
            TokenKind::Float(x) => Ok(Node::Literal(Value::Float(*x))),
            TokenKind::Str(s) => Ok(Node::Literal(Value::Str(s.clone()))),
            TokenKind::LParen => {
                let e = self.parse_ternary()?;
                self.expect(&TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek(), Some(TokenKind::LParen)) {
                    self.parse_call(name, tok.span)
                } else {
                    match name.as_str() {
                        "true" => Ok(Node::Literal(Value::Bool(true))),
                        "false" => Ok(Node::Literal(Value::Bool(false))),
                        _ => Ok(Node::Field(self.resolve_field(name))),
                    }
                }
            }
            other => Err(expr_err(
                self.input,
                tok.span,
                format!("expected number, identifier, or '(', got {:?}", other),
            )),
        }
    }

    fn parse_call(&mut self, name: &str, span: Span) -> Result<Node> {
        let func = Func::from_ident(name)
            .ok_or_else(|| expr_err(self.input, span, format!("unknown function: '{name}'")))?;
        self.advance(); // consume '('
        let mut args = vec![self.parse_ternary()?];
        while matches!(self.peek(), Some(TokenKind::Comma)) {
            self.advance();
            args.push(self.parse_ternary()?);
        }
        self.expect(&TokenKind::RParen)?;
        let (lo, hi) = func.arity();
        if args.len() < lo || args.len() > hi {
            return Err(expr_err(
                self.input,
                span,
                format!("function '{name}' takes {lo}..={hi} arguments, got {}", args.len()),
            ));
        }
        Ok(Node::Call(func, args))
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pm_core::MapRecord;

    fn eval(text: &str, rec: &MapRecord) -> Value {
        Formula::parse(text).unwrap().eval(rec).unwrap()
    }

    fn num(text: &str, rec: &MapRecord) -> f64 {
        eval(text, rec).as_f64().unwrap()
    }

    #[test]
    fn simple_arithmetic() {
        let f = Formula::parse("2 + 3 * 4").unwrap();
        assert!(f.is_constant());
        assert_eq!(f.eval(&MapRecord::new()).unwrap(), Value::Int(14));
    }

    #[test]
    fn abs_of_int_min_is_an_error() {
        let f = Formula::parse("abs(x)").unwrap();
        let rec = MapRecord::new().with("x", i64::MIN);
        assert!(matches!(f.eval(&rec).unwrap_err(), EvalError::Arithmetic(_)));
        let rec = MapRecord::new().with("x", -7i64);
        assert_eq!(f.eval(&rec).unwrap(), Value::Int(7));
    }

    #[test]
    fn fields_in_order_of_first_use() {
        let f = Formula::parse("pt * weight_mc + pt").unwrap();
        assert_eq!(f.fields(), ["pt", "weight_mc"]);
        let rec = MapRecord::new().with("pt", 100.0).with("weight_mc", 0.5);
        assert_relative_eq!(f.eval(&rec).unwrap().as_f64().unwrap(), 150.0);
    }

    #[test]
    fn comparison_and_boolean() {
        let f = Formula::parse("njet >= 4 && pt_lead > 25.0").unwrap();
        let pass = MapRecord::new().with("njet", 4i64).with("pt_lead", 30.0);
        let fail = MapRecord::new().with("njet", 3i64).with("pt_lead", 30.0);
        assert_eq!(f.eval(&pass).unwrap(), Value::Bool(true));
        assert_eq!(f.eval(&fail).unwrap(), Value::Bool(false));
    }

    #[test]
    fn and_short_circuits_before_unknown_field() {
        // `missing` is never resolved because the left side is false.
        let rec = MapRecord::new().with("x", 1i64);
        assert_eq!(eval("x > 4 && missing > 0", &rec), Value::Bool(false));
        assert_eq!(eval("x < 4 || missing > 0", &rec), Value::Bool(true));
        let err = Formula::parse("x < 4 && missing > 0").unwrap().eval(&rec).unwrap_err();
        assert_eq!(err, EvalError::UnknownField("missing".into()));
    }

    #[test]
    fn functions() {
        let rec = MapRecord::new().with("x", 9.0).with("a", 3.0).with("b", 7.0);
        assert_relative_eq!(num("sqrt(x)", &rec), 3.0);
        assert_relative_eq!(num("pow(a, 2)", &rec), 9.0);
        assert_relative_eq!(num("TMath::Max(a, b)", &rec), 7.0);
        assert_relative_eq!(num("fabs(-a)", &rec), 3.0);
        assert_relative_eq!(num("log10(100)", &rec), 2.0);
    }

    #[test]
    fn vectors_index_and_reduce() {
        let rec = MapRecord::new().with("jet_pt", vec![50.0, 30.0, 20.0]);
        assert_relative_eq!(num("jet_pt[0]", &rec), 50.0);
        assert_relative_eq!(num("jet_pt[size(jet_pt) - 1]", &rec), 20.0);
        assert_relative_eq!(num("sum(jet_pt)", &rec), 100.0);
        assert_relative_eq!(num("min(jet_pt)", &rec), 20.0);
        assert_eq!(eval("size(jet_pt)", &rec), Value::Int(3));
        let err = Formula::parse("jet_pt[3]").unwrap().eval(&rec).unwrap_err();
        assert_eq!(err, EvalError::IndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn ternary_evaluates_only_chosen_branch() {
        let rec = MapRecord::new().with("n", 0i64);
        assert_relative_eq!(num("n > 0 ? 1 / n : -1", &rec), -1.0);
    }

    #[test]
    fn division_by_zero_surfaces() {
        let rec = MapRecord::new().with("n", 0i64);
        let err = Formula::parse("1 / n").unwrap().eval(&rec).unwrap_err();
        assert_eq!(err, EvalError::DivisionByZero);
    }

    #[test]
    fn strings() {
        let rec = MapRecord::new().with("channel", "ee");
        assert_eq!(eval("channel == \"ee\"", &rec), Value::Bool(true));
        assert_eq!(eval("channel != 'mumu'", &rec), Value::Bool(true));
    }

    #[test]
    fn negation_and_not() {
        let rec = MapRecord::new().with("x", 5i64);
        assert_eq!(eval("-x + 1", &rec), Value::Int(-4));
        assert_eq!(eval("!(x > 3)", &rec), Value::Bool(false));
        assert_eq!(eval("!true", &rec), Value::Bool(false));
    }

    #[test]
    fn scientific_notation() {
        assert_relative_eq!(num("1.5e2 + 3.0E-1", &MapRecord::new()), 150.3, epsilon = 1e-10);
    }

    #[test]
    fn nested_parens() {
        assert_eq!(eval("(1 + 2) * (3 + 4)", &MapRecord::new()), Value::Int(21));
    }

    #[test]
    fn parse_errors_carry_position() {
        let err = Formula::parse("x > ").unwrap_err().to_string();
        assert!(err.contains("end of input"), "{err}");
        let err = Formula::parse("x $ 3").unwrap_err().to_string();
        assert!(err.contains("line 1, col 3"), "{err}");
        let err = Formula::parse("frobnicate(x)").unwrap_err().to_string();
        assert!(err.contains("unknown function"), "{err}");
        let err = Formula::parse("pow(x)").unwrap_err().to_string();
        assert!(err.contains("arguments"), "{err}");
        assert!(Formula::parse("   ").is_err());
        assert!(Formula::parse("(x").is_err());
    }
}
