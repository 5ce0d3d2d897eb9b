//! Built-in story functions.
//!
//! Names match case-insensitively.  Each function receives already-evaluated
//! arguments; the dispatcher is called from the story's
//! [`EvalContext::call_function`] after knot functions have been tried.

use super::expr::EvalContext;
use super::value::{Number, Value};
use crate::error::ExprError;

const BUILTINS: &[&str] = &["isnull", "getnull", "not", "random", "isknot", "floor"];

/// Returns `true` if `name` is a built-in function.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name.to_ascii_lowercase().as_str())
}

/// Dispatch a built-in function call.
///
/// Returns `None` if the function name is not a built-in.
pub fn call_builtin(
    name: &str,
    args: Vec<Value>,
    ctx: &mut dyn EvalContext,
) -> Option<Result<Value, ExprError>> {
    fn inner(
        name: &str,
        args: Vec<Value>,
        ctx: &mut dyn EvalContext,
    ) -> Result<Option<Value>, ExprError> {
        let lower = name.to_ascii_lowercase();
        Ok(Some(match lower.as_str() {
            "isnull" => {
                expect_args(name, &args, 1)?;
                Value::Bool(args[0].is_null())
            }
            "getnull" => {
                expect_args(name, &args, 0)?;
                Value::Null
            }
            "not" => {
                expect_args(name, &args, 1)?;
                Value::Bool(match &args[0] {
                    Value::Bool(b) => !b,
                    Value::Number(n) => n.to_i64() == 0,
                    _ => false,
                })
            }
            "random" => {
                expect_args(name, &args, 1)?;
                let bound = get_number(&args, 0).to_i64();
                if bound <= 0 {
                    Value::Number(Number::ZERO)
                } else {
                    let bound = usize::try_from(bound).unwrap_or(usize::MAX);
                    Value::from(ctx.random_below(bound) as i64)
                }
            }
            "isknot" => {
                // True when the argument names the container being played.
                expect_args(name, &args, 1)?;
                match (&args[0], ctx.get_value("this")) {
                    (Value::Str(s), Value::Str(this)) => Value::Bool(*s == this),
                    (Value::Divert(s), Value::Str(this)) => Value::Bool(*s == this),
                    _ => Value::Bool(false),
                }
            }
            "floor" => {
                // Truncates, so negative fractions move up toward zero.
                expect_args(name, &args, 1)?;
                Value::Number(get_number(&args, 0).trunc())
            }
            _ => return Ok(None),
        }))
    }
    inner(name, args, ctx).transpose()
}

fn expect_args(name: &str, args: &[Value], expected: usize) -> Result<(), ExprError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExprError::Arity {
            name: name.to_owned(),
            expected,
            found: args.len(),
        })
    }
}

/// Numeric argument `i`; non-numbers count as zero.
fn get_number(args: &[Value], i: usize) -> Number {
    args.get(i).and_then(Value::as_number).unwrap_or(Number::ZERO)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
