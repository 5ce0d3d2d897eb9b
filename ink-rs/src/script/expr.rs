//! Story expression lexer, shunting-yard compiler, validator and evaluator.
//!
//! Expressions appear in choice conditions, `VAR`/`~` statements and inline
//! `{...}` text.  Evaluation runs in three steps:
//!
//! 1. tokenize, resolving unary minus from context;
//! 2. convert to postfix, classifying each identifier as a variable, a
//!    function, or a method call on a host object;
//! 3. validate operand counts over the postfix form, then walk it once over a
//!    value stack.
//!
//! Operator precedence (lowest → highest):
//!   `||`  →  `&&`  →  `= == != <>`  →  `< <= > >=`  →  `+ -`  →  `* / %`
//!   →  `^`  →  unary `-`

use super::value::{Number, Value};
use crate::error::ExprError;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// A [`Story`](crate::story::Story) implements this trait to give expressions
/// access to variables, visit counts, knot functions and randomness.
pub trait EvalContext {
    /// Whether `name` resolves to a value (variable, parameter, visit count).
    fn has_variable(&self, name: &str) -> bool;

    /// Resolve `name` to its current value.
    fn get_value(&self, name: &str) -> Value;

    /// Whether `name` is callable, either built in or a knot function.
    fn has_function(&self, name: &str) -> bool;

    /// Invoke a function with already-evaluated arguments.
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExprError>;

    /// A uniformly distributed index in `0..bound`.  `bound` is non-zero.
    fn random_below(&mut self, bound: usize) -> usize;
}

// ── Operator ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Neg,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::Or => 2,
            Operator::And => 4,
            Operator::Eq | Operator::Ne => 7,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => 10,
            Operator::Add | Operator::Sub => 20,
            Operator::Mul | Operator::Div | Operator::Rem => 30,
            Operator::Pow => 40,
            Operator::Neg => 50,
        }
    }

    fn right_assoc(self) -> bool {
        matches!(self, Operator::Pow | Operator::Neg)
    }

    fn operands(self) -> usize {
        if self == Operator::Neg {
            1
        } else {
            2
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Pow => "^",
            Operator::Neg => "-",
        }
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Op(Operator),
    LParen,
    RParen,
    Comma,
    /// Unrecognised input, reported with its byte position.
    Unknown(char, usize),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            text: src,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Read a numeric literal starting at `start` (which may hold a `-`).
    fn read_number(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some(b'0'..=b'9')) {
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            } else {
                // `2e` is a number followed by an identifier, not an exponent.
                self.pos = mark;
            }
        }
        let literal = &self.text[start..self.pos];
        match Number::parse(literal) {
            Some(n) => Token::Number(n),
            None => Token::Unknown(self.src[start] as char, start),
        }
    }

    fn read_string(&mut self, quote: u8) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            self.pos += 1;
        }
        let s = self.text[start..self.pos].to_owned();
        self.eat(quote);
        Token::Str(s)
    }

    fn read_ident(&mut self, start: usize) -> Token {
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'.')
        ) {
            self.pos += 1;
        }
        let word = &self.text[start..self.pos];
        match word {
            "and" => Token::Op(Operator::And),
            "or" => Token::Op(Operator::Or),
            "true" => Token::Number(Number::ONE),
            "false" => Token::Number(Number::ZERO),
            _ => Token::Ident(word.to_owned()),
        }
    }

    /// `unary` is true when an operand is expected, i.e. a `-` here negates.
    fn next_token(&mut self, unary: bool) -> Token {
        self.skip_ws();
        let start = self.pos;
        let ch = match self.advance() {
            None => return Token::Eof,
            Some(c) => c,
        };

        match ch {
            b'0'..=b'9' => self.read_number(start),
            b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => self.read_number(start),
            b'-' if unary && matches!(self.peek(), Some(b'0'..=b'9' | b'.')) => {
                self.read_number(start)
            }
            b'-' if unary => Token::Op(Operator::Neg),
            b'"' => self.read_string(b'"'),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_ident(start),
            b'+' => Token::Op(Operator::Add),
            b'-' => Token::Op(Operator::Sub),
            b'*' => Token::Op(Operator::Mul),
            b'/' => Token::Op(Operator::Div),
            b'%' => Token::Op(Operator::Rem),
            b'^' => Token::Op(Operator::Pow),
            b'&' if self.eat(b'&') => Token::Op(Operator::And),
            b'|' if self.eat(b'|') => Token::Op(Operator::Or),
            b'!' if self.eat(b'=') => Token::Op(Operator::Ne),
            b'<' => {
                if self.eat(b'=') {
                    Token::Op(Operator::Le)
                } else if self.eat(b'>') {
                    Token::Op(Operator::Ne)
                } else {
                    Token::Op(Operator::Lt)
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::Op(Operator::Ge)
                } else {
                    Token::Op(Operator::Gt)
                }
            }
            b'=' => {
                self.eat(b'=');
                Token::Op(Operator::Eq)
            }
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            _ => {
                let c = self.text[start..].chars().next().unwrap_or('?');
                self.pos = start + c.len_utf8();
                Token::Unknown(c, start)
            }
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut unary = true;
        loop {
            let t = self.next_token(unary);
            let done = matches!(t, Token::Eof);
            unary = matches!(t, Token::Op(_) | Token::LParen | Token::Comma);
            tokens.push(t);
            if done {
                break;
            }
        }
        tokens
    }
}

/// Tokenize `src` (exposed for tests and benchmarks).
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).tokenize()
}

// ── Postfix form ──────────────────────────────────────────────────────────────

/// One step of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Literal(Value),
    Var(String),
    Op(Operator),
    /// Sentinel marking where a call's arguments begin.
    ParamsStart,
    Call(String),
    Method { object: String, method: String },
}

#[derive(Debug)]
enum Pending {
    Op(Operator),
    LParen,
    Call(String),
    Method { object: String, method: String },
}

enum Callee {
    Function(String),
    Method { object: String, method: String },
}

fn classify_call(name: &str, ctx: &dyn EvalContext) -> Option<Callee> {
    if ctx.has_function(name) {
        return Some(Callee::Function(name.to_owned()));
    }
    let (object, method) = name.rsplit_once('.')?;
    if !method.is_empty() && ctx.has_variable(object) {
        return Some(Callee::Method {
            object: object.to_owned(),
            method: method.to_owned(),
        });
    }
    None
}

fn pop_until_lparen(stack: &mut Vec<Pending>, out: &mut Vec<Item>) -> Result<(), ExprError> {
    loop {
        match stack.pop() {
            Some(Pending::LParen) => return Ok(()),
            Some(Pending::Op(op)) => out.push(Item::Op(op)),
            // A call is always preceded on the stack by its own `(`.
            Some(Pending::Call(_)) | Some(Pending::Method { .. }) | None => {
                return Err(ExprError::MismatchedParens)
            }
        }
    }
}

/// Shunting-yard conversion to postfix.
fn to_postfix(tokens: Vec<Token>, ctx: &dyn EvalContext) -> Result<Vec<Item>, ExprError> {
    let mut out = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while let Some(tok) = iter.next() {
        match tok {
            Token::Eof => break,
            Token::Number(n) => out.push(Item::Literal(Value::Number(n))),
            Token::Str(s) => out.push(Item::Literal(Value::Str(s))),
            Token::Ident(name) => {
                if ctx.has_variable(&name) {
                    out.push(Item::Var(name));
                    continue;
                }
                let callee = classify_call(&name, ctx)
                    .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))?;
                let called = iter.peek() == Some(&Token::LParen);
                if called {
                    iter.next();
                }
                match (callee, called) {
                    (Callee::Function(f), true) => {
                        stack.push(Pending::Call(f));
                        stack.push(Pending::LParen);
                        out.push(Item::ParamsStart);
                    }
                    (Callee::Method { object, method }, true) => {
                        stack.push(Pending::Method { object, method });
                        stack.push(Pending::LParen);
                        out.push(Item::ParamsStart);
                    }
                    (Callee::Function(f), false) => {
                        out.push(Item::ParamsStart);
                        out.push(Item::Call(f));
                    }
                    (Callee::Method { object, method }, false) => {
                        out.push(Item::ParamsStart);
                        out.push(Item::Method { object, method });
                    }
                }
            }
            Token::Op(op) => {
                while let Some(Pending::Op(top)) = stack.last() {
                    let top = *top;
                    let higher = top.precedence() > op.precedence()
                        || (top.precedence() == op.precedence() && !op.right_assoc());
                    if !higher {
                        break;
                    }
                    stack.pop();
                    out.push(Item::Op(top));
                }
                stack.push(Pending::Op(op));
            }
            Token::LParen => stack.push(Pending::LParen),
            Token::Comma => {
                pop_until_lparen(&mut stack, &mut out)?;
                stack.push(Pending::LParen);
            }
            Token::RParen => {
                pop_until_lparen(&mut stack, &mut out)?;
                match stack.pop() {
                    Some(Pending::Call(f)) => out.push(Item::Call(f)),
                    Some(Pending::Method { object, method }) => {
                        out.push(Item::Method { object, method })
                    }
                    Some(other) => stack.push(other),
                    None => {}
                }
            }
            Token::Unknown(op, pos) => return Err(ExprError::UnknownOperator { op, pos }),
        }
    }

    while let Some(p) = stack.pop() {
        match p {
            Pending::Op(op) => out.push(Item::Op(op)),
            _ => return Err(ExprError::MismatchedParens),
        }
    }
    Ok(out)
}

/// Check operand counts over the postfix form before anything is evaluated.
fn validate(items: &[Item]) -> Result<(), ExprError> {
    let mut counts: Vec<usize> = vec![0];
    for item in items {
        match item {
            Item::Literal(_) | Item::Var(_) => {
                if let Some(top) = counts.last_mut() {
                    *top += 1;
                }
            }
            Item::Op(op) => {
                let top = counts.last_mut().ok_or(ExprError::MismatchedParens)?;
                if *top < op.operands() {
                    return Err(ExprError::MissingParameters(op.symbol().to_owned()));
                }
                *top = *top + 1 - op.operands();
            }
            Item::ParamsStart => counts.push(0),
            Item::Call(_) | Item::Method { .. } => {
                if counts.len() < 2 {
                    return Err(ExprError::MismatchedParens);
                }
                counts.pop();
                if let Some(top) = counts.last_mut() {
                    *top += 1;
                }
            }
        }
    }
    if counts.len() > 1 {
        return Err(ExprError::MissingParameters("(".to_owned()));
    }
    match counts[0] {
        0 => Err(ExprError::Empty),
        1 => Ok(()),
        _ => Err(ExprError::TooManyValues),
    }
}

// ── Expression ────────────────────────────────────────────────────────────────

/// A compiled, validated expression.
#[derive(Debug, Clone)]
pub struct Expression {
    postfix: Vec<Item>,
}

enum Slot {
    Marker,
    Value(Value),
}

impl Expression {
    /// Compile `src`.  Identifiers are classified against `ctx` now, so a
    /// compiled expression should only be reused while the set of known names
    /// is unchanged.
    pub fn parse(src: &str, ctx: &dyn EvalContext) -> Result<Self, ExprError> {
        let postfix = to_postfix(tokenize(src), ctx)?;
        validate(&postfix)?;
        Ok(Expression { postfix })
    }

    pub fn eval(&self, ctx: &mut dyn EvalContext) -> Result<Value, ExprError> {
        let mut stack: Vec<Slot> = Vec::new();
        for item in &self.postfix {
            match item {
                Item::Literal(v) => stack.push(Slot::Value(v.clone())),
                Item::Var(name) => {
                    let v = match ctx.get_value(name) {
                        Value::Bool(b) => Value::from(b as i64),
                        v => v,
                    };
                    stack.push(Slot::Value(v));
                }
                Item::Op(op) => {
                    let rhs = pop_value(&mut stack)?;
                    let v = if op.operands() == 1 {
                        apply_unary(*op, rhs)?
                    } else {
                        let lhs = pop_value(&mut stack)?;
                        apply_binary(*op, lhs, rhs)?
                    };
                    stack.push(Slot::Value(v));
                }
                Item::ParamsStart => stack.push(Slot::Marker),
                Item::Call(name) => {
                    let args = pop_args(&mut stack)?;
                    let v = ctx.call_function(name, args)?;
                    stack.push(Slot::Value(v));
                }
                Item::Method { object, method } => {
                    let args = pop_args(&mut stack)?;
                    let v = call_method(ctx.get_value(object), object, method, &args)?;
                    stack.push(Slot::Value(v));
                }
            }
        }
        let result = pop_value(&mut stack)?;
        if !stack.is_empty() {
            return Err(ExprError::TooManyValues);
        }
        Ok(result)
    }
}

fn pop_value(stack: &mut Vec<Slot>) -> Result<Value, ExprError> {
    match stack.pop() {
        Some(Slot::Value(v)) => Ok(v),
        _ => Err(ExprError::MissingParameters("value".to_owned())),
    }
}

fn pop_args(stack: &mut Vec<Slot>) -> Result<Vec<Value>, ExprError> {
    let mut args = Vec::new();
    loop {
        match stack.pop() {
            Some(Slot::Value(v)) => args.push(v),
            Some(Slot::Marker) => break,
            None => return Err(ExprError::MismatchedParens),
        }
    }
    args.reverse();
    Ok(args)
}

fn call_method(
    target: Value,
    object: &str,
    method: &str,
    args: &[Value],
) -> Result<Value, ExprError> {
    let obj = match target {
        Value::Object(obj) => obj,
        // Calls on an unset receiver quietly yield zero.
        Value::Null => return Ok(Value::from(0)),
        Value::Number(n) if n.is_zero() => return Ok(Value::from(0)),
        _ => {
            return Err(ExprError::UnknownMethod {
                object: object.to_owned(),
                method: method.to_owned(),
            })
        }
    };
    match obj.call(method, args) {
        Some(Ok(v)) => Ok(v),
        Some(Err(message)) => Err(ExprError::HostMethod {
            object: object.to_owned(),
            method: method.to_owned(),
            message,
        }),
        None => Err(ExprError::UnknownMethod {
            object: object.to_owned(),
            method: method.to_owned(),
        }),
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

fn mismatch(op: Operator, lhs: &Value, rhs: &Value) -> ExprError {
    ExprError::TypeMismatch {
        op: op.symbol().to_owned(),
        detail: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    }
}

fn truth(b: bool) -> Value {
    Value::from(b as i64)
}

fn apply_unary(op: Operator, v: Value) -> Result<Value, ExprError> {
    match v.as_number() {
        Some(n) => Ok(Value::Number(n.neg())),
        None => Err(ExprError::TypeMismatch {
            op: op.symbol().to_owned(),
            detail: v.type_name().to_owned(),
        }),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn apply_binary(op: Operator, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match op {
        Operator::And => return Ok(truth(lhs.as_bool() && rhs.as_bool())),
        Operator::Or => return Ok(truth(lhs.as_bool() || rhs.as_bool())),
        Operator::Eq => return Ok(truth(values_equal(&lhs, &rhs))),
        Operator::Ne => return Ok(truth(!values_equal(&lhs, &rhs))),
        Operator::Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => {
            return Ok(Value::Str(format!("{lhs}{rhs}")));
        }
        _ => {}
    }

    if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
        let ord = a.cmp(b);
        return match op {
            Operator::Lt => Ok(truth(ord.is_lt())),
            Operator::Le => Ok(truth(ord.is_le())),
            Operator::Gt => Ok(truth(ord.is_gt())),
            Operator::Ge => Ok(truth(ord.is_ge())),
            _ => Err(mismatch(op, &lhs, &rhs)),
        };
    }

    let (a, b) = match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(mismatch(op, &lhs, &rhs)),
    };
    let n = match op {
        Operator::Add => a.add(&b),
        Operator::Sub => a.sub(&b),
        Operator::Mul => a.mul(&b),
        Operator::Div => a.div(&b)?,
        Operator::Rem => a.rem(&b)?,
        Operator::Pow => a.pow(b.to_i64())?,
        Operator::Lt => return Ok(truth(a < b)),
        Operator::Le => return Ok(truth(a <= b)),
        Operator::Gt => return Ok(truth(a > b)),
        Operator::Ge => return Ok(truth(a >= b)),
        _ => return Err(mismatch(op, &lhs, &rhs)),
    };
    Ok(Value::Number(n))
}

/// Compile and evaluate `src` in one go.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value, ExprError> {
    Expression::parse(src, &*ctx)?.eval(ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostObject;
    use crate::script::builtins::{call_builtin, is_builtin};
    use std::collections::HashMap;
    use std::rc::Rc;

    // ── Minimal EvalContext for tests ─────────────────────────────────────────

    struct TestCtx {
        vars: HashMap<String, Value>,
    }

    impl TestCtx {
        fn new() -> Self {
            TestCtx {
                vars: HashMap::new(),
            }
        }

        fn with(mut self, k: &str, v: Value) -> Self {
            self.vars.insert(k.to_owned(), v);
            self
        }
    }

    impl EvalContext for TestCtx {
        fn has_variable(&self, name: &str) -> bool {
            self.vars.contains_key(name)
        }
        fn get_value(&self, name: &str) -> Value {
            self.vars.get(name).cloned().unwrap_or_default()
        }
        fn has_function(&self, name: &str) -> bool {
            name == "double" || name == "three" || is_builtin(name)
        }
        fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
            match name {
                "double" => {
                    let n = args[0].as_number().unwrap();
                    Ok(Value::Number(n.mul(&Number::from_i64(2))))
                }
                "three" => Ok(Value::from(3)),
                _ => call_builtin(name, args, self)
                    .unwrap_or_else(|| Err(ExprError::UnknownIdentifier(name.to_owned()))),
            }
        }
        fn random_below(&mut self, _bound: usize) -> usize {
            0
        }
    }

    fn eval(src: &str) -> Value {
        eval_ctx(src, &mut TestCtx::new())
    }

    fn eval_ctx(src: &str, ctx: &mut TestCtx) -> Value {
        eval_str(src, ctx).expect("eval failed")
    }

    fn eval_err(src: &str) -> ExprError {
        eval_str(src, &mut TestCtx::new()).expect_err("expected an error")
    }

    #[test]
    fn literals() {
        assert_eq!(eval("42"), Value::from(42));
        assert_eq!(eval("\"hi\""), Value::from("hi"));
        assert_eq!(eval("2.50").to_string(), "2.5");
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Value::from(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::from(20));
        assert_eq!(eval("10 - 4 - 3"), Value::from(3));
        assert_eq!(eval("2 ^ 3 ^ 2"), Value::from(512));
        assert_eq!(eval("7 % 4"), Value::from(3));
        assert_eq!(eval("1.5 * 7").to_string(), "10.5");
    }

    #[test]
    fn unary_minus() {
        assert_eq!(eval("-3 + 5"), Value::from(2));
        assert_eq!(eval("4 - -1"), Value::from(5));
        assert_eq!(eval("-(2 + 3)"), Value::from(-5));
        assert_eq!(eval("2 * -(1)"), Value::from(-2));
    }

    #[test]
    fn logic_words_and_literals() {
        assert!(!eval("true and false").as_bool());
        assert!(eval("true or false").as_bool());
        assert!(!eval("5 > 3 && 2 < 1").as_bool());
        assert!(eval("5 > 3 || 2 < 1").as_bool());
    }

    #[test]
    fn builtins_through_the_compiler() {
        assert!(!eval("not(5)").as_bool());
        assert!(eval("not(0)").as_bool());
        assert!(eval("NOT(true and false)").as_bool());
        assert_eq!(eval("floor(7 / 2) + 1"), Value::from(4));
        assert!(eval("isNull(getNull())").as_bool());
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(eval("3 >= 3"), Value::from(1));
        assert_eq!(eval("3 = 4"), Value::from(0));
        assert_eq!(eval("3 <> 4"), Value::from(1));
        assert_eq!(eval("\"a\" == \"a\""), Value::from(1));
        assert_eq!(eval("\"a\" < \"b\""), Value::from(1));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("\"Mambo Number \" + 5"), Value::from("Mambo Number 5"));
    }

    #[test]
    fn variables_and_bool_normalisation() {
        let mut ctx = TestCtx::new()
            .with("x", Value::from(4))
            .with("knows", Value::Bool(true))
            .with("start.left", Value::from(2));
        assert_eq!(eval_ctx("x * 2", &mut ctx), Value::from(8));
        assert_eq!(eval_ctx("knows", &mut ctx), Value::from(1));
        assert_eq!(eval_ctx("start.left > 1", &mut ctx), Value::from(1));
    }

    #[test]
    fn function_calls() {
        assert_eq!(eval("double(21)"), Value::from(42));
        assert_eq!(eval("double(1 + 2) + 1"), Value::from(7));
        assert_eq!(eval("three"), Value::from(3));
        assert_eq!(eval("three()"), Value::from(3));
    }

    #[test]
    fn host_method_calls() {
        let obj = HostObject::new("x")
            .with_method("hello", |_| Ok(Value::from("Hello")))
            .with_method("number", |args| Ok(Value::Str(format!("Number {}", args[0]))));
        let mut ctx = TestCtx::new().with("x", Value::Object(Rc::new(obj)));
        assert_eq!(eval_ctx("x.hello()", &mut ctx), Value::from("Hello"));
        assert_eq!(eval_ctx("x.hello", &mut ctx), Value::from("Hello"));
        assert_eq!(eval_ctx("x.number(5)", &mut ctx), Value::from("Number 5"));
        assert!(matches!(
            eval_str("x.wrong()", &mut ctx),
            Err(ExprError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn method_on_null_receiver_is_zero() {
        let mut ctx = TestCtx::new().with("nobody", Value::Null);
        assert_eq!(eval_ctx("nobody.name()", &mut ctx), Value::from(0));
    }

    #[test]
    fn validation_errors() {
        assert_eq!(eval_err("2 + "), ExprError::MissingParameters("+".into()));
        assert_eq!(eval_err(""), ExprError::Empty);
        assert_eq!(eval_err("2 3"), ExprError::TooManyValues);
        assert_eq!(eval_err("(2 + 3"), ExprError::MismatchedParens);
        assert_eq!(eval_err("2 + 3)"), ExprError::MismatchedParens);
    }

    #[test]
    fn unknown_operator_reports_position() {
        assert_eq!(eval_err("2 # 3"), ExprError::UnknownOperator { op: '#', pos: 2 });
    }

    #[test]
    fn unknown_identifier() {
        assert_eq!(eval_err("nope + 1"), ExprError::UnknownIdentifier("nope".into()));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval_err("1 / 0"), ExprError::DivisionByZero);
    }

    #[test]
    fn minus_between_operands_is_binary() {
        let toks = tokenize("x -1");
        assert_eq!(toks[1], Token::Op(Operator::Sub));
        let toks = tokenize("(-1)");
        assert_eq!(toks[1], Token::Number(Number::from_i64(-1)));
    }
}
