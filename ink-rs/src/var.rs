//! Global story variables.
//!
//! Holds everything declared with `VAR`, the `TRUE`/`FALSE` constants and any
//! values the host sets through [`Story::set_variable`](crate::story::Story::set_variable).
//! Parameters of knots, stitches and functions live in the scope map of their
//! container instead.

use std::collections::HashMap;

use crate::script::value::Value;

/// Global key/value variable store.
#[derive(Debug, Default, Clone)]
pub struct VarStore {
    vars: HashMap<String, Value>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
