//! Player console: crossterm-styled story output.
//!
//! [`Console`] knows how to:
//!
//! * Print story text, word-wrapped to a configured width.
//! * List pending choices numbered from 1.
//! * Print side notes (story comments, save confirmations) and the prompt.
//!
//! Styling is applied through crossterm commands only when enabled; with it
//! off the output is plain text, which is what pipes and tests see.

use std::io::{self, Write};

use crossterm::{
    queue,
    style::{Attribute, Color, ContentStyle, Print, ResetColor, SetStyle, Stylize},
};

/// Style of the choice number.
fn number_style() -> ContentStyle {
    ContentStyle::new().with(Color::Cyan).attribute(Attribute::Bold)
}

/// Style of side notes.
fn note_style() -> ContentStyle {
    ContentStyle::new().with(Color::DarkGrey).attribute(Attribute::Italic)
}

// ── Console ───────────────────────────────────────────────────────────────────

pub struct Console<W: Write> {
    out: W,
    /// Wrap column; 0 disables wrapping.
    width: usize,
    styled: bool,
    /// Suppress the banner and prompt decoration.
    quiet: bool,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, width: usize, styled: bool, quiet: bool) -> Self {
        Console {
            out,
            width,
            styled,
            quiet,
        }
    }

    /// Write a styled string, or the bare text when styling is off.
    fn write_styled(&mut self, text: &str, style: ContentStyle) -> io::Result<()> {
        if self.styled {
            queue!(self.out, SetStyle(style), Print(text), ResetColor)
        } else {
            self.out.write_all(text.as_bytes())
        }
    }

    pub fn banner(&mut self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let version = env!("CARGO_PKG_VERSION");
        let style = ContentStyle::new().attribute(Attribute::Bold);
        self.write_styled(&format!("ink {version}: {title}"), style)?;
        writeln!(self.out)?;
        writeln!(self.out, "Type a choice number, `save' or `quit'.")?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Print one text unit.
    pub fn text(&mut self, text: &str) -> io::Result<()> {
        for line in wrap(text, self.width) {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    pub fn note(&mut self, text: &str) -> io::Result<()> {
        self.write_styled(text, note_style())?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// List choices numbered from 1.
    pub fn choices(&mut self, choices: &[String]) -> io::Result<()> {
        writeln!(self.out)?;
        for (i, choice) in choices.iter().enumerate() {
            self.write_styled(&format!("{}.", i + 1), number_style())?;
            writeln!(self.out, " {choice}")?;
        }
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        if !self.quiet {
            if self.styled {
                queue!(self.out, Print("> ".bold()))?;
            } else {
                self.out.write_all(b"> ")?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ── Wrapping ──────────────────────────────────────────────────────────────────

/// Greedy word wrap at `width` columns; words longer than a line stand alone.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_owned()];
    }
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        let needed = if cur.is_empty() { 0 } else { cur.chars().count() + 1 };
        if !cur.is_empty() && needed + word.chars().count() > width {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() || lines.is_empty() {
        lines.push(cur);
    }
    lines
}

// ── Tests ─────────────────────────────────────────────────────────────────────
