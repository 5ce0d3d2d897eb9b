//! Host-side collaborators of a running story.
//!
//! The runtime performs no I/O of its own.  A [`StoryHost`] supplies source
//! text by file id (for the main story, `INCLUDE` lines and file-backed
//! interrupts) and resolves opaque [`HostObject`]s by key.  Host objects expose
//! an explicit table of methods that story expressions call as
//! `obj.method(args)`.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::script::value::Value;

/// Signature of a method callable from story expressions.
pub type HostMethod = Box<dyn Fn(&[Value]) -> Result<Value, String>>;

// ── HostObject ────────────────────────────────────────────────────────────────

/// An object supplied by the embedding application.
///
/// Persisted by its key; on restore the key is resolved through
/// [`StoryHost::resolve_object`] again.
pub struct HostObject {
    key: String,
    methods: HashMap<String, HostMethod>,
}

impl HostObject {
    pub fn new(key: impl Into<String>) -> Self {
        HostObject {
            key: key.into(),
            methods: HashMap::new(),
        }
    }

    /// Register a method (builder style).
    pub fn with_method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + 'static,
    {
        self.methods.insert(name.to_owned(), Box::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Invoke `name`.  Returns `None` when the object has no such method.
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, String>> {
        self.methods.get(name).map(|m| m(args))
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("HostObject")
            .field("key", &self.key)
            .field("methods", &names)
            .finish()
    }
}

// ── StoryHost ─────────────────────────────────────────────────────────────────

/// Services the embedding application provides to a story.
pub trait StoryHost {
    /// Return the full source text for `file_id`.
    fn open_source(&self, file_id: &str) -> io::Result<String>;

    /// Resolve a host object by key (used by saved-state restore and by
    /// variables bound to objects).
    fn resolve_object(&self, key: &str) -> Option<Rc<HostObject>> {
        let _ = key;
        None
    }
}

// ── MemoryHost ────────────────────────────────────────────────────────────────

/// A host backed by in-memory sources and objects; handy for tests and for
/// stories bundled into the binary.
#[derive(Debug, Default)]
pub struct MemoryHost {
    sources: HashMap<String, String>,
    objects: HashMap<String, Rc<HostObject>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, file_id: &str, text: &str) -> Self {
        self.sources.insert(file_id.to_owned(), text.to_owned());
        self
    }

    pub fn with_object(mut self, object: HostObject) -> Self {
        self.objects.insert(object.key().to_owned(), Rc::new(object));
        self
    }
}

impl StoryHost for MemoryHost {
    fn open_source(&self, file_id: &str) -> io::Result<String> {
        self.sources.get(file_id).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no source named {file_id}"))
        })
    }

    fn resolve_object(&self, key: &str) -> Option<Rc<HostObject>> {
        self.objects.get(key).cloned()
    }
}

// ── FsHost ────────────────────────────────────────────────────────────────────

/// A host reading story files relative to a base directory.
#[derive(Debug, Default)]
pub struct FsHost {
    base: PathBuf,
    objects: HashMap<String, Rc<HostObject>>,
}

impl FsHost {
    pub fn new(base: impl AsRef<Path>) -> Self {
        FsHost {
            base: base.as_ref().to_path_buf(),
            objects: HashMap::new(),
        }
    }

    pub fn add_object(&mut self, object: HostObject) {
        self.objects.insert(object.key().to_owned(), Rc::new(object));
    }
}

impl StoryHost for FsHost {
    fn open_source(&self, file_id: &str) -> io::Result<String> {
        std::fs::read_to_string(self.base.join(file_id))
    }

    fn resolve_object(&self, key: &str) -> Option<Rc<HostObject>> {
        self.objects.get(key).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
