//! Saved story state.
//!
//! A [`SaveState`] is everything that changes while a story plays; the
//! content tree itself is rebuilt from source on restore.  Container-keyed
//! data uses the dotted node ids, which are stable for a given set of
//! sources.
//!
//! ```json
//! {
//!   "files": ["main.ink"],
//!   "content": { "start": { "count": 1 }, "start.0": { "count": 2 } },
//!   "container": "start",
//!   "index": 3,
//!   "text": ["Hello."],
//!   "choices": ["start.1", "start.2"],
//!   "variables": { "TRUE": { "type": "number", "value": "1" } },
//!   "running": true,
//!   "processing": false
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A persisted variable value.  Host objects are saved by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SavedValue {
    Bool(bool),
    /// Decimal string in plain notation.
    Number(String),
    Str(String),
    /// Container id.
    Divert(String),
    /// Host object key.
    Object(String),
    Null,
}

/// Per-container data for every container visited at least once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedContent {
    pub count: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, SavedValue>,
    /// Active option of a conditional or sequence block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub files: Vec<String>,
    pub content: BTreeMap<String, SavedContent>,
    #[serde(default)]
    pub container: Option<String>,
    pub index: usize,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, SavedValue>,
    pub running: bool,
    #[serde(default)]
    pub processing: bool,
}

impl SaveState {
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the state as JSON to `path`, replacing any existing file.
    pub fn save_to_path(&self, path: &Path) -> Result<(), StateError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, StateError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
