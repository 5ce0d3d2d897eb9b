//! Error types for loading and playing stories.
//!
//! Three layers, each wrapping the one below where it makes sense:
//!
//! | Type           | Raised by                                   |
//! |----------------|---------------------------------------------|
//! | [`ParseError`] | the line parser, fatal to one source        |
//! | [`ExprError`]  | a single expression evaluation              |
//! | [`RuntimeError`] | story traversal and the public play API   |
//! | [`StateError`] | saving and restoring story state            |

use thiserror::Error;

// ── ParseError ────────────────────────────────────────────────────────────────

/// A structural error found while parsing a story source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(file: &str, line: usize, message: impl Into<String>) -> Self {
        ParseError {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }
}

// ── ExprError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("Unknown operator '{op}' at position {pos}")]
    UnknownOperator { op: char, pos: usize },

    #[error("Mismatched parentheses")]
    MismatchedParens,

    #[error("Missing parameter(s) for operator or function {0}")]
    MissingParameters(String),

    #[error("Too many numbers or values")]
    TooManyValues,

    #[error("Empty expression")]
    Empty,

    #[error("Unknown operator or function: {0}")]
    UnknownIdentifier(String),

    #[error("Function {name} expects {expected} parameter(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Could not identify the method {method} on {object}")]
    UnknownMethod { object: String, method: String },

    #[error("Method {object}.{method} failed: {message}")]
    HostMethod {
        object: String,
        method: String,
        message: String,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Numeric overflow in {0}")]
    Overflow(String),

    #[error("Operator {op} cannot be applied to {detail}")]
    TypeMismatch { op: String, detail: String },

    /// A failure inside a knot function body.
    #[error("Error in function {name}: {message}")]
    Function { name: String, message: String },
}

// ── RuntimeError ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Error evaluating expression {expr} on line {line}: {source}")]
    Expr {
        expr: String,
        line: usize,
        source: ExprError,
    },

    #[error("Attempt to divert to non-defined {target} or {qualified} in line {line}")]
    UnknownDivert {
        target: String,
        qualified: String,
        line: usize,
    },

    #[error("Mismatch in the parameter declaration in the call to {0}")]
    ParameterMismatch(String),

    #[error(
        "Trying to select a choice {index} that does not exist in story: {file} \
         container: {container} cIndex: {local_index}"
    )]
    ChoiceOutOfRange {
        index: usize,
        file: String,
        container: String,
        local_index: usize,
    },

    #[error("advance() called with no content pending")]
    NothingPending,

    #[error("Invalid variable declaration {text} on line {line}: {message}")]
    InvalidDeclaration {
        text: String,
        line: usize,
        message: String,
    },

    #[error("Variable {name} is not defined in variable expression on line {line}")]
    UndefinedVariable { name: String, line: usize },

    #[error("Saved state refers to {0}, which is not a choice")]
    NotAChoice(String),

    #[error("Saved state refers to unknown container {0}")]
    UnknownContainer(String),

    #[error("Saved state refers to unknown host object {0}")]
    UnknownObject(String),

    #[error("Cannot open story source {file}: {source}")]
    Source {
        file: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl RuntimeError {
    pub(crate) fn expr(expr: &str, line: usize, source: ExprError) -> Self {
        RuntimeError::Expr {
            expr: expr.to_owned(),
            line,
            source,
        }
    }
}

// ── StateError ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_file_and_line() {
        let e = ParseError::new("main.ink", 12, "Duplicate id start.a");
        assert_eq!(e.to_string(), "main.ink:12: Duplicate id start.a");
    }

    #[test]
    fn choice_out_of_range_message() {
        let e = RuntimeError::ChoiceOutOfRange {
            index: 3,
            file: "main.ink".into(),
            container: "start".into(),
            local_index: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("choice 3"));
        assert!(msg.contains("container: start"));
        assert!(msg.contains("cIndex: 2"));
    }

    #[test]
    fn expr_error_wraps_source() {
        let e = RuntimeError::expr("2 +", 4, ExprError::MissingParameters("+".into()));
        assert!(e.to_string().contains("line 4"));
        assert!(std::error::Error::source(&e).is_some());
    }
}
