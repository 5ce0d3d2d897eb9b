//! Host-injected choices and divert redirects.
//!
//! An interrupt overlays behaviour on a running story without editing its
//! source:
//!
//! - a **choice** interrupt holds one choice line (`* [Ask about the ship]
//!   -> ship`).  Whenever the pending-choice list is finalized and the guard
//!   holds, it is prepended to the list.
//! - a **divert** interrupt holds `from -> to`.  A divert to `from` taken
//!   while the guard holds goes to `to` instead, and the global `event` names
//!   the interrupt.
//!
//! Either kind is consumed once it fires: choosing an injected choice, or
//! taking a redirected divert, marks it done.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    Choice,
    Divert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupt {
    /// Id of the injected choice node; must not collide with story ids.
    pub id: String,
    pub kind: InterruptKind,
    /// The choice line, or `from -> to`.
    pub text: String,
    /// Guard expression; empty always holds.
    pub condition: String,
    /// Extra source loaded through the host when the interrupt is added.
    pub file: Option<String>,
    pub active: bool,
    pub done: bool,
}

impl Interrupt {
    pub fn choice(id: &str, text: &str) -> Self {
        Interrupt {
            id: id.to_owned(),
            kind: InterruptKind::Choice,
            text: text.to_owned(),
            condition: String::new(),
            file: None,
            active: true,
            done: false,
        }
    }

    pub fn divert(id: &str, from: &str, to: &str) -> Self {
        Interrupt {
            id: id.to_owned(),
            kind: InterruptKind::Divert,
            text: format!("{from} -> {to}"),
            condition: String::new(),
            file: None,
            active: true,
            done: false,
        }
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = condition.to_owned();
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = Some(file.to_owned());
        self
    }

    pub fn is_live(&self) -> bool {
        self.active && !self.done
    }

    pub fn mark_done(&mut self) {
        self.done = true;
        self.active = false;
    }

    /// `(from, to)` of a divert interrupt.
    pub fn redirect(&self) -> Option<(&str, &str)> {
        if self.kind != InterruptKind::Divert {
            return None;
        }
        let (from, to) = self.text.split_once("->")?;
        Some((from.trim(), to.trim()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
