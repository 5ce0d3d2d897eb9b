//! Inline `{...}` text directives.
//!
//! | Directive              | Meaning                                        |
//! |------------------------|------------------------------------------------|
//! | `{expr}`               | value of `expr`, numbers in plain notation     |
//! | `{cond: a\|b}`         | `a` when `cond` holds, else `b` (or nothing)   |
//! | `{#expr: a\|b\|c}`     | option at index `expr`, clamped to the range   |
//! | `{a\|b\|c}`            | stopping: one per visit, then stick on the last |
//! | `{&a\|b\|c}`           | cycle                                          |
//! | `{!a\|b\|c}`           | once each, then nothing                        |
//! | `{~a\|b\|c}`           | shuffle: a random option per visit             |
//!
//! Directives nest; the innermost is resolved first.  The visit count is the
//! count of the node that owns the text.

use tracing::{error, warn};

use super::expr::{eval_str, EvalContext};
use super::value::Value;

/// Expand every directive in `text`.
///
/// Unbalanced braces leave the text untouched.  A directive whose expression
/// fails renders as `(ERROR:expr)` in place.
pub fn expand(text: &str, count: u32, ctx: &mut dyn EvalContext) -> String {
    let mut out = text.to_owned();
    // Substituted values are never rescanned: the next `{` is searched for
    // only left of the last directive.
    let mut end = out.len();
    while let Some(start) = out[..end].rfind('{') {
        let Some(len) = out[start..].find('}') else {
            warn!(text, "mismatched curly braces in text");
            return out;
        };
        let inner = out[start + 1..start + len].to_owned();
        let resolved = resolve(&inner, count, ctx);
        out.replace_range(start..=start + len, &resolved);
        end = start;
    }
    if out[..end].contains('}') {
        warn!(text, "mismatched curly braces in text");
    }
    out
}

fn resolve(inner: &str, count: u32, ctx: &mut dyn EvalContext) -> String {
    let count = count as usize;
    if let Some((cond, body)) = inner.split_once(':') {
        return conditional(cond.trim(), body, ctx);
    }
    if let Some(rest) = inner.strip_prefix('&') {
        let opts = options(rest);
        return opts[count % opts.len()].to_owned();
    }
    if let Some(rest) = inner.strip_prefix('!') {
        return options(rest).get(count).copied().unwrap_or("").to_owned();
    }
    if let Some(rest) = inner.strip_prefix('~') {
        let opts = options(rest);
        let i = ctx.random_below(opts.len()).min(opts.len() - 1);
        return opts[i].to_owned();
    }
    if inner.contains('|') {
        let opts = options(inner);
        return opts[count.min(opts.len() - 1)].to_owned();
    }
    evaluate(inner, ctx)
}

/// Split options on `|`; never empty.
fn options(s: &str) -> Vec<&str> {
    s.split('|').collect()
}

fn conditional(cond: &str, body: &str, ctx: &mut dyn EvalContext) -> String {
    let opts = options(body);
    if let Some(index_expr) = cond.strip_prefix('#').or_else(|| cond.strip_prefix('?')) {
        let i = match eval_str(index_expr, ctx) {
            Ok(v) => match v {
                Value::Number(n) => n.to_i64(),
                Value::Bool(b) => b as i64,
                Value::Null => 0,
                _ => 1,
            },
            Err(e) => {
                error!(expr = index_expr, error = %e, "cannot evaluate indexed text");
                0
            }
        };
        let i = i.clamp(0, opts.len() as i64 - 1) as usize;
        return opts[i].to_owned();
    }
    let holds = match eval_str(cond, ctx) {
        Ok(v) => v.as_bool(),
        Err(e) => {
            error!(expr = cond, error = %e, "cannot evaluate conditional text");
            false
        }
    };
    if holds {
        opts[0].to_owned()
    } else {
        opts.get(1).copied().unwrap_or("").to_owned()
    }
}

fn evaluate(expr: &str, ctx: &mut dyn EvalContext) -> String {
    match eval_str(expr, ctx) {
        Ok(v) => v.to_string(),
        Err(e) => {
            error!(expr, error = %e, "cannot evaluate text");
            format!("(ERROR:{expr})")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
