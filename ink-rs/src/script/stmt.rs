//! `VAR` declarations and `~` statements.
//!
//! Statement lines are classified once, at parse time:
//!
//! - `VAR name = value` declares a global.  The value is a boolean, number or
//!   quoted string literal, a `-> address` container reference, or otherwise
//!   an expression evaluated when the declaration runs.
//! - `~ name = expr` assigns an existing variable.
//! - `~ return expr` returns a value from a knot function.
//! - `~ expr` is evaluated for its side effects.
//!
//! Execution lives in the story, which owns the variable tables.

use std::sync::OnceLock;

use regex::Regex;

use super::value::Number;

/// Right-hand side of a `VAR` declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Bool(bool),
    Number(Number),
    Str(String),
    /// `-> address`; resolved when the declaration runs.
    Divert(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Declare { name: String, init: Initializer },
    Assign { name: String, expr: String },
    Return(Option<String>),
    Eval(String),
}

/// `name = expr`, refusing to split on `==`, `>=`, `<=` or `!=`.
fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*=([^=].*)$").expect("valid assignment regex")
    })
}

/// Returns `true` if `line` is a statement line.
pub fn is_statement(line: &str) -> bool {
    line.starts_with("VAR ") || line.starts_with("~ ") || line == "~"
}

/// Classify a statement line.  The error is a message for the parser to wrap.
pub fn parse_statement(line: &str) -> Result<Statement, String> {
    if let Some(decl) = line.strip_prefix("VAR ") {
        return parse_declaration(decl.trim());
    }
    let body = line.strip_prefix('~').unwrap_or(line).trim();
    if body.is_empty() {
        return Err("Empty variable statement".to_owned());
    }
    if body == "return" {
        return Ok(Statement::Return(None));
    }
    if let Some(rest) = body.strip_prefix("return ") {
        return Ok(Statement::Return(Some(rest.trim().to_owned())));
    }
    match assignment_re().captures(body) {
        Some(caps) => Ok(Statement::Assign {
            name: caps[1].to_owned(),
            expr: caps[2].trim().to_owned(),
        }),
        None => Ok(Statement::Eval(body.to_owned())),
    }
}

fn parse_declaration(decl: &str) -> Result<Statement, String> {
    let caps = assignment_re().captures(decl).ok_or_else(|| {
        "Invalid variable declaration. Expected values, values, and/or operators after '='."
            .to_owned()
    })?;
    let name = caps[1].to_owned();
    let value = caps[2].trim();
    if value.is_empty() {
        return Err(format!("Variable {name} is declared without a value"));
    }

    let init = if value == "true" {
        Initializer::Bool(true)
    } else if value == "false" {
        Initializer::Bool(false)
    } else if let Some(n) = Number::parse(value) {
        Initializer::Number(n)
    } else if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let s = &value[1..value.len() - 1];
        if s.contains("->") {
            return Err(format!("String value of {name} may not contain a divert"));
        }
        Initializer::Str(s.to_owned())
    } else if let Some(target) = value.strip_prefix("->") {
        Initializer::Divert(target.trim().to_owned())
    } else {
        Initializer::Expr(value.to_owned())
    };
    Ok(Statement::Declare { name, init })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(line: &str) -> Initializer {
        match parse_statement(line).unwrap() {
            Statement::Declare { init, .. } => init,
            other => panic!("not a declaration: {other:?}"),
        }
    }

    #[test]
    fn declaration_literals() {
        assert_eq!(declare("VAR knows = true"), Initializer::Bool(true));
        assert_eq!(declare("VAR age = 23"), Initializer::Number(Number::from_i64(23)));
        assert_eq!(declare("VAR name = \"Jackie\""), Initializer::Str("Jackie".into()));
        assert_eq!(declare("VAR fate = -> dies"), Initializer::Divert("dies".into()));
        assert_eq!(declare("VAR x = 2 * 3"), Initializer::Expr("2 * 3".into()));
    }

    #[test]
    fn string_with_divert_is_rejected() {
        assert!(parse_statement("VAR s = \"go -> there\"").is_err());
    }

    #[test]
    fn malformed_declaration_is_rejected() {
        assert!(parse_statement("VAR = 3").is_err());
        assert!(parse_statement("VAR nothing").is_err());
    }

    #[test]
    fn assignment_split() {
        assert_eq!(
            parse_statement("~ x = x + 1").unwrap(),
            Statement::Assign {
                name: "x".into(),
                expr: "x + 1".into()
            }
        );
    }

    #[test]
    fn comparisons_are_not_assignments() {
        assert_eq!(
            parse_statement("~ x == 2").unwrap(),
            Statement::Eval("x == 2".into())
        );
        assert_eq!(
            parse_statement("~ x >= 2").unwrap(),
            Statement::Eval("x >= 2".into())
        );
    }

    #[test]
    fn bare_call_is_evaluated() {
        assert_eq!(
            parse_statement("~ herp(2, 3)").unwrap(),
            Statement::Eval("herp(2, 3)".into())
        );
    }

    #[test]
    fn return_statement() {
        assert_eq!(
            parse_statement("~ return a * b").unwrap(),
            Statement::Return(Some("a * b".into()))
        );
        assert_eq!(parse_statement("~ return").unwrap(), Statement::Return(None));
    }

    #[test]
    fn statement_detection() {
        assert!(is_statement("VAR x = 1"));
        assert!(is_statement("~ x = 1"));
        assert!(!is_statement("~x"));
        assert!(!is_statement("Variable text"));
    }
}
