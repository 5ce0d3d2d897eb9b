//! An embeddable runtime for ink-style branching narratives.
//!
//! Stories are plain text: knots (`== name`), stitches (`= name`), choices
//! (`*` / `+`), gathers (`-`), diverts (`-> target`), inline `{...}`
//! directives, multi-line conditionals and sequences, variables and knot
//! functions.  [`Story`] parses a source (plus its `INCLUDE`s) through a
//! [`StoryHost`] and plays it one text unit at a time:
//!
//! ```rust
//! use ink::Story;
//!
//! let mut story = Story::from_source("== start\nHello.\n* Go left\n  You went left.\n").unwrap();
//! assert_eq!(story.advance_all().unwrap(), ["Hello."]);
//! assert_eq!(story.pending_choices(), ["Go left"]);
//! story.choose(0).unwrap();
//! assert_eq!(story.advance_all().unwrap(), ["Go left", "You went left."]);
//! assert!(story.is_ended());
//! ```

pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod host;
pub mod interrupt;
pub mod logging;
pub mod parser;
pub mod script;
pub mod state;
pub mod story;
pub mod terminal;
pub mod var;

pub use error::{ExprError, ParseError, RuntimeError, StateError};
pub use host::{FsHost, HostObject, MemoryHost, StoryHost};
pub use interrupt::{Interrupt, InterruptKind};
pub use script::value::{Number, Value};
pub use state::SaveState;
pub use story::Story;
