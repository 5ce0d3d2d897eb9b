//! The story scripting layer.
//!
//! - [`value`]: runtime values and fixed-precision decimals
//! - [`expr`]: tokenizer, shunting-yard conversion and postfix evaluation
//! - [`builtins`]: built-in functions callable from expressions
//! - [`expand`]: inline `{...}` directives in text
//! - [`stmt`]: `VAR` / `~` statement lines

pub mod builtins;
pub mod expand;
pub mod expr;
pub mod stmt;
pub mod value;

pub use expr::EvalContext;
pub use value::Value;
