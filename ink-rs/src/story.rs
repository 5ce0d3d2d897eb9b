//! The story runtime.
//!
//! A [`Story`] owns the content arena plus all play state: the current
//! container and the index of the next child, pending choices, globals,
//! and the random source.  Play is pull-based:
//!
//! ```text
//!   load ──► advance() ──► advance() ──► … ──► [choices pending]
//!                ▲                                   │
//!                └────────────── choose(i) ◄─────────┘
//! ```
//!
//! ## Traversal
//!
//! `advance()` resolves the node at the cursor, steps past it and keeps going
//! while the next node continues the same text unit (glue, silently gathered
//! choices, a stitch header, a divert whose target opens with glue, or an
//! unfinished blank unit).  Stepping handles diverts, entry into fallback
//! choices and conditional blocks, and convergence on the next gather once a
//! choice or gather body runs out.
//!
//! ## Name lookup
//!
//! | Form            | Resolves to                                         |
//! |-----------------|-----------------------------------------------------|
//! | `this`          | id of the current container                         |
//! | parameter name  | value bound in the nearest parameterized ancestor   |
//! | `-> id`         | container reference                                 |
//! | container id    | visit count, tried bare then qualified by ancestors |
//! | anything else   | global variable                                     |

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, warn};

use crate::content::{Content, NodeId, NodeKind, SequenceMode};
use crate::error::{ExprError, RuntimeError, StateError};
use crate::host::{MemoryHost, StoryHost};
use crate::interrupt::{Interrupt, InterruptKind};
use crate::parser::{load_into, load_story, parse_detached_choice};
use crate::script::builtins::{call_builtin, is_builtin};
use crate::script::expand::expand;
use crate::script::expr::{eval_str, EvalContext};
use crate::script::stmt::{Initializer, Statement};
use crate::script::value::{Number, Value};
use crate::state::{SaveState, SavedContent, SavedValue};
use crate::var::VarStore;

const GLUE: &str = "<>";
const END: &str = "END";

pub struct Story {
    content: Content,
    files: Vec<String>,
    host: Box<dyn StoryHost>,
    interrupts: Vec<Interrupt>,
    container: Option<NodeId>,
    index: usize,
    transcript: Vec<String>,
    choices: Vec<NodeId>,
    comments: Vec<NodeId>,
    image: Option<String>,
    vars: VarStore,
    running: bool,
    processing: bool,
    rng: StdRng,
}

impl Story {
    /// Load `file_id` and its includes through `host` and position the story
    /// at its start knot.
    pub fn load(host: Box<dyn StoryHost>, file_id: &str) -> Result<Self, RuntimeError> {
        Self::load_with_rng(host, file_id, StdRng::from_entropy())
    }

    /// Like [`load`](Self::load) with a deterministic random source.
    pub fn load_seeded(
        host: Box<dyn StoryHost>,
        file_id: &str,
        seed: u64,
    ) -> Result<Self, RuntimeError> {
        Self::load_with_rng(host, file_id, StdRng::seed_from_u64(seed))
    }

    /// Parse a single in-memory source.
    pub fn from_source(src: &str) -> Result<Self, RuntimeError> {
        let host = MemoryHost::new().with_source("main.ink", src);
        Self::load(Box::new(host), "main.ink")
    }

    fn load_with_rng(
        host: Box<dyn StoryHost>,
        file_id: &str,
        rng: StdRng,
    ) -> Result<Self, RuntimeError> {
        let loaded = load_story(host.as_ref(), file_id)?;
        let mut story = Story {
            content: loaded.content,
            files: loaded.files,
            host,
            interrupts: Vec::new(),
            container: Some(loaded.start),
            index: 0,
            transcript: Vec::new(),
            choices: Vec::new(),
            comments: Vec::new(),
            image: None,
            vars: VarStore::new(),
            running: true,
            processing: true,
            rng,
        };
        story.start(loaded.start)?;
        Ok(story)
    }

    fn start(&mut self, start: NodeId) -> Result<(), RuntimeError> {
        self.vars.set("TRUE", Value::int(1));
        self.vars.set("FALSE", Value::int(0));
        let mut first = start;
        if let Some(child) = self.content.child(start, 0) {
            if self.content.get(child).is_stitch() {
                first = child;
            }
        }
        debug!(container = %self.content.get(first).id, "starting story");
        self.image = self.content.get(start).background.clone();
        self.container = Some(first);
        self.index = 0;
        self.running = true;
        self.processing = true;
        self.settle()
    }

    /// Replace the random source, e.g. to make shuffles reproducible.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Source file ids in load order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    // ── Play API ──────────────────────────────────────────────────────────────

    /// Whether [`advance`](Self::advance) has content to produce.
    pub fn has_more(&self) -> bool {
        self.processing
            && self.running
            && self
                .container
                .map_or(false, |c| self.index < self.content.size(c))
    }

    /// Produce the next text unit.
    pub fn advance(&mut self) -> Result<String, RuntimeError> {
        if !self.has_more() {
            return Err(RuntimeError::NothingPending);
        }
        self.processing = true;
        let mut out = String::new();
        while let Some(current) = self.current_node() {
            out.push_str(&self.resolve(current)?);
            self.step(current)?;
            if !self.processing || !self.running {
                break;
            }
            match self.current_node() {
                Some(next) if self.continues_into(next, &out) => {}
                _ => break,
            }
        }
        if !self.has_more() {
            self.add_interrupt_choices();
        }
        let text = clean_up(&out);
        if !text.is_empty() {
            self.transcript.push(text.clone());
        }
        Ok(text)
    }

    /// Produce every text unit up to the next choice point or the end,
    /// skipping empty units.
    pub fn advance_all(&mut self) -> Result<Vec<String>, RuntimeError> {
        let mut out = Vec::new();
        while self.has_more() {
            let text = self.advance()?;
            if !text.is_empty() {
                out.push(text);
            }
        }
        Ok(out)
    }

    /// Every non-empty unit produced so far, including those restored from a
    /// saved state.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn pending_choice_count(&self) -> usize {
        self.choices.len()
    }

    /// Display text of pending choice `i`, directives expanded.
    pub fn pending_choice_text(&mut self, i: usize) -> Option<String> {
        let id = *self.choices.get(i)?;
        let node = self.content.get(id);
        let (text, count) = (node.text.clone(), node.count);
        Some(clean_up(&expand(&text, count, self)))
    }

    pub fn pending_choices(&mut self) -> Vec<String> {
        (0..self.choices.len())
            .filter_map(|i| self.pending_choice_text(i))
            .collect()
    }

    /// Select pending choice `i` and continue inside it.
    pub fn choose(&mut self, i: usize) -> Result<(), RuntimeError> {
        let Some(&choice) = self.choices.get(i) else {
            return Err(RuntimeError::ChoiceOutOfRange {
                index: i,
                file: self.files.first().cloned().unwrap_or_default(),
                container: self
                    .container
                    .map_or_else(|| "null".to_owned(), |c| self.content.get(c).id.clone()),
                local_index: self.index,
            });
        };
        let node = self.content.get_mut(choice);
        node.count += 1;
        let id = node.id.clone();
        debug!(choice = %id, "choice selected");
        for interrupt in &mut self.interrupts {
            if interrupt.id == id {
                interrupt.mark_done();
            }
        }
        self.container = Some(choice);
        self.index = 0;
        self.choices.clear();
        self.processing = true;
        self.settle()
    }

    pub fn is_ended(&self) -> bool {
        self.container.is_none()
    }

    pub fn current_background(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// First collected comment whose conditions hold.  Once-comments are
    /// dropped after being returned.
    pub fn current_comment(&mut self) -> Option<String> {
        for i in 0..self.comments.len() {
            let id = self.comments[i];
            let (once, conditions, text, count) = match &self.content.get(id).kind {
                NodeKind::Comment { once, conditions } => {
                    let node = self.content.get(id);
                    (*once, conditions.clone(), node.text.clone(), node.count)
                }
                _ => continue,
            };
            if !conditions.iter().all(|c| self.guard_holds(c)) {
                continue;
            }
            if once {
                self.comments.remove(i);
            }
            return Some(clean_up(&expand(&text, count, self)));
        }
        None
    }

    /// Global variable `key`.
    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Assign `key`, preferring a parameter of the current scope.
    pub fn set_variable(&mut self, key: &str, value: impl Into<Value>) {
        self.put_variable(key, value.into());
    }

    /// Register an interrupt, loading its source file and injected choice.
    pub fn add_interrupt(&mut self, interrupt: Interrupt) -> Result<(), RuntimeError> {
        if let Some(file) = &interrupt.file {
            if !self.files.contains(file) {
                load_into(self.host.as_ref(), file, &mut self.content, &mut self.files)?;
            }
        }
        if interrupt.kind == InterruptKind::Choice && self.content.lookup(&interrupt.id).is_none() {
            let file = interrupt.file.as_deref().unwrap_or("interrupt");
            parse_detached_choice(&interrupt.text, &interrupt.id, file, &mut self.content)?;
        }
        debug!(interrupt = %interrupt.id, kind = ?interrupt.kind, "interrupt added");
        self.interrupts.push(interrupt);
        Ok(())
    }

    pub fn interrupts(&self) -> &[Interrupt] {
        &self.interrupts
    }

    // ── Traversal ─────────────────────────────────────────────────────────────

    fn current_node(&self) -> Option<NodeId> {
        if !self.running {
            return None;
        }
        self.content.child(self.container?, self.index)
    }

    fn resolve(&mut self, id: NodeId) -> Result<String, RuntimeError> {
        let node = self.content.get(id);
        match &node.kind {
            NodeKind::Text if node.is_divert() => Ok(GLUE.to_owned()),
            NodeKind::Text => {
                let (text, count) = (node.text.clone(), node.count);
                let out = expand(&text, count, self);
                self.content.get_mut(id).count += 1;
                Ok(out)
            }
            NodeKind::Choice { .. } => {
                self.add_choice(id);
                Ok(String::new())
            }
            NodeKind::Comment { .. } => {
                if !self.comments.contains(&id) {
                    self.comments.push(id);
                }
                Ok(String::new())
            }
            NodeKind::Statement(stmt) => {
                let (stmt, line) = (stmt.clone(), node.line);
                self.execute(&stmt, line)?;
                Ok(String::new())
            }
            _ => Ok(String::new()),
        }
    }

    /// Move the cursor past `id`.
    fn step(&mut self, id: NodeId) -> Result<(), RuntimeError> {
        if self.content.get(id).is_divert() {
            match self.take_divert(id)? {
                Some((target, args)) => {
                    self.enter(target, args)?;
                    self.choices.clear();
                }
                None => {
                    debug!("divert to END");
                    self.container = None;
                    self.running = false;
                    self.choices.clear();
                    return Ok(());
                }
            }
        } else if self.container != Some(id) {
            // A fallback choice entered while resolving is already the cursor.
            self.index += 1;
        }
        self.settle()
    }

    /// Normalize the cursor: enter blocks and fallbacks, pop out of exhausted
    /// blocks, and converge on gathers.
    fn settle(&mut self) -> Result<(), RuntimeError> {
        loop {
            let Some(c) = self.container else {
                return Ok(());
            };
            let Some(next) = self.content.child(c, self.index) else {
                let node = self.content.get(c);
                if node.is_conditional() {
                    let Some(parent) = node.parent else {
                        self.container = None;
                        return Ok(());
                    };
                    self.index = self.content.index_of(parent, c).map_or(usize::MAX, |i| i + 1);
                    self.container = Some(parent);
                    continue;
                }
                if !self.choices.is_empty() {
                    return Ok(());
                }
                if node.is_choice() || node.is_gather() {
                    if self.converge(c)? {
                        continue;
                    }
                } else {
                    debug!(container = %node.id, "story ran out of content");
                }
                self.container = None;
                return Ok(());
            };
            let node = self.content.get(next);
            if node.is_fallback() && self.choices.is_empty() {
                if self.choice_available(next) {
                    self.enter(next, Vec::new())?;
                } else {
                    self.index += 1;
                }
                continue;
            }
            if node.is_conditional() {
                self.enter(next, Vec::new())?;
                continue;
            }
            if node.is_gather() {
                if !self.choices.is_empty() {
                    self.processing = false;
                    return Ok(());
                }
                self.enter(next, Vec::new())?;
                continue;
            }
            return Ok(());
        }
    }

    /// Find where flow continues after `exhausted` (a choice or gather body).
    /// The nearest following gather wins.  Choices that directly follow an
    /// exhausted gather at its own level are collected next.
    fn converge(&mut self, exhausted: NodeId) -> Result<bool, RuntimeError> {
        let from_gather = self.content.get(exhausted).is_gather();
        let mut child = exhausted;
        let mut first = true;
        while let Some(parent) = self.content.get(child).parent {
            let start = self.content.index_of(parent, child).map_or(usize::MAX, |i| i + 1);
            let siblings = self.content.children(parent).get(start..).unwrap_or(&[]).to_vec();
            for (offset, sibling) in siblings.into_iter().enumerate() {
                let node = self.content.get(sibling);
                if node.is_gather() {
                    self.enter(sibling, Vec::new())?;
                    return Ok(true);
                }
                if node.is_choice() && first && from_gather {
                    self.container = Some(parent);
                    self.index = start + offset;
                    return Ok(true);
                }
            }
            first = false;
            child = parent;
        }
        Ok(false)
    }

    /// Whether text flow carries on from the current unit into `next`.
    fn continues_into(&self, next: NodeId, out: &str) -> bool {
        let node = self.content.get(next);
        if node.text.starts_with(GLUE) || out.ends_with(GLUE) || out.trim().is_empty() {
            return true;
        }
        if (node.is_choice() && !node.is_fallback()) || node.is_stitch() {
            return true;
        }
        if node.is_divert() {
            return match self.peek_divert(next) {
                Some(None) => true,
                Some(Some(target)) => self
                    .content
                    .child(target, 0)
                    .map_or(false, |first| self.content.get(first).text.starts_with(GLUE)),
                None => false,
            };
        }
        false
    }

    /// Initialize and move into `target`.
    fn enter(&mut self, target: NodeId, args: Vec<Value>) -> Result<(), RuntimeError> {
        let node = self.content.get(target);
        if node.is_section() {
            let params = node.params();
            if params.len() != args.len() {
                return Err(RuntimeError::ParameterMismatch(node.id.clone()));
            }
            if !params.is_empty() {
                let scope: HashMap<String, Value> = params.iter().cloned().zip(args).collect();
                self.content.get_mut(target).scope = Some(scope);
            }
        }
        if self.content.get(target).is_conditional() {
            self.select(target);
        }
        let node = self.content.get_mut(target);
        node.count += 1;
        if let Some(bg) = &node.background {
            self.image = Some(bg.clone());
        }
        debug!(container = %node.id, "entering container");
        self.container = Some(target);
        self.index = 0;
        Ok(())
    }

    /// Pick the active option of a conditional block for this entry.
    fn select(&mut self, id: NodeId) {
        let node = self.content.get(id);
        let NodeKind::Conditional { mode, options, .. } = &node.kind else {
            return;
        };
        let (mode, n, count) = (*mode, options.len(), node.count as usize);
        let selection = match mode {
            SequenceMode::Conditional => {
                let guards: Vec<Option<String>> = options.iter().map(|o| o.guard.clone()).collect();
                guards
                    .iter()
                    .position(|g| g.as_deref().map_or(true, |g| self.guard_holds(g)))
                    .unwrap_or(n)
            }
            SequenceMode::Cycle if n > 0 => count % n,
            SequenceMode::Once => count.min(n),
            SequenceMode::Shuffle if n > 0 => self.rng.gen_range(0..n),
            SequenceMode::Stopping => count.min(n.saturating_sub(1)),
            SequenceMode::Cycle | SequenceMode::Shuffle => 0,
        };
        if let NodeKind::Conditional { selection: s, .. } = &mut self.content.get_mut(id).kind {
            *s = selection;
        }
    }

    // ── Choices ───────────────────────────────────────────────────────────────

    /// Once-ness and gating conditions of a choice.
    fn choice_available(&mut self, id: NodeId) -> bool {
        let node = self.content.get(id);
        let NodeKind::Choice {
            repeatable,
            conditions,
        } = &node.kind
        else {
            return false;
        };
        if !repeatable && node.count > 0 {
            return false;
        }
        let conditions = conditions.clone();
        conditions.iter().all(|c| self.guard_holds(c))
    }

    fn add_choice(&mut self, id: NodeId) {
        if !self.choice_available(id) {
            return;
        }
        if self.content.get(id).is_fallback() {
            if self.choices.is_empty() {
                self.content.get_mut(id).count += 1;
                self.container = Some(id);
                self.index = 0;
            }
            return;
        }
        self.choices.push(id);
    }

    fn add_interrupt_choices(&mut self) {
        for i in 0..self.interrupts.len() {
            let interrupt = &self.interrupts[i];
            if !interrupt.is_live() || interrupt.kind != InterruptKind::Choice {
                continue;
            }
            let (id, condition) = (interrupt.id.clone(), interrupt.condition.clone());
            if !condition.trim().is_empty() && !self.guard_holds(&condition) {
                continue;
            }
            let Some(node) = self.content.lookup(&id) else {
                continue;
            };
            if !self.choices.contains(&node) && self.choice_available(node) {
                self.choices.insert(0, node);
            }
        }
    }

    /// Evaluate a guard; failures are logged and count as false.
    fn guard_holds(&mut self, expr: &str) -> bool {
        match eval_str(expr, self) {
            Ok(v) => v.as_bool(),
            Err(e) => {
                error!(expr, error = %e, "condition failed to evaluate");
                false
            }
        }
    }

    // ── Diverts ───────────────────────────────────────────────────────────────

    /// Resolve a divert node for taking it: interrupts apply and arguments are
    /// evaluated.  `None` is `-> END`.
    fn take_divert(&mut self, id: NodeId) -> Result<Option<(NodeId, Vec<Value>)>, RuntimeError> {
        let node = self.content.get(id);
        let line = node.line;
        let raw = node.divert_target().unwrap_or_default().to_owned();
        let (name, args) = split_call(&raw);
        if name == END {
            return Ok(None);
        }
        let name = self.redirect(name);
        if name == END {
            return Ok(None);
        }
        let target = self.find_target(&name).ok_or_else(|| RuntimeError::UnknownDivert {
            qualified: self.qualified(&name),
            target: name.clone(),
            line,
        })?;
        let target = self.descend(target);
        let mut values = Vec::new();
        for arg in args {
            let v = eval_str(&arg, self).map_err(|e| RuntimeError::expr(&arg, line, e))?;
            values.push(v);
        }
        debug!(from = %self.content.get(id).id, to = %self.content.get(target).id, "divert");
        Ok(Some((target, values)))
    }

    /// Side-effect free lookup of a divert's target.  `Some(None)` is END,
    /// `None` is unresolvable.
    fn peek_divert(&self, id: NodeId) -> Option<Option<NodeId>> {
        let raw = self.content.get(id).divert_target()?;
        let (name, _) = split_call(raw);
        if name == END {
            return Some(None);
        }
        self.find_target(name).map(|t| Some(self.descend(t)))
    }

    /// A knot whose first child is a stitch starts in that stitch.
    fn descend(&self, target: NodeId) -> NodeId {
        if self.content.get(target).is_knot() {
            if let Some(first) = self.content.child(target, 0) {
                if self.content.get(first).is_stitch() {
                    return first;
                }
            }
        }
        target
    }

    fn find_target(&self, name: &str) -> Option<NodeId> {
        let container_target = |id: NodeId| self.content.get(id).is_container().then_some(id);
        if let Some(id) = self.content.lookup(name).and_then(container_target) {
            return Some(id);
        }
        if let Some(c) = self.container {
            let scopes = std::iter::once(c).chain(self.content.ancestors(c));
            let parent = self.content.get(c).parent;
            for scope in parent.into_iter().chain(scopes.filter(|&n| self.content.get(n).is_section())) {
                let qualified = format!("{}.{name}", self.content.get(scope).id);
                if let Some(id) = self.content.lookup(&qualified).and_then(container_target) {
                    return Some(id);
                }
            }
        }
        if let Some(id) = self.content.find_by_label(name) {
            return Some(id);
        }
        match self.vars.get(name) {
            Some(Value::Divert(id)) => self.content.lookup(id),
            _ => None,
        }
    }

    /// The parent-qualified form of `name`, for diagnostics.
    fn qualified(&self, name: &str) -> String {
        if name.contains('.') {
            return name.to_owned();
        }
        match self.container.and_then(|c| self.content.get(c).parent) {
            Some(p) => format!("{}.{name}", self.content.get(p).id),
            None => name.to_owned(),
        }
    }

    /// Apply the first live divert interrupt from `target` whose guard holds.
    fn redirect(&mut self, target: &str) -> String {
        for i in 0..self.interrupts.len() {
            let interrupt = &self.interrupts[i];
            if !interrupt.is_live() {
                continue;
            }
            let Some((from, to)) = interrupt.redirect() else {
                continue;
            };
            if from != target {
                continue;
            }
            let (to, condition) = (to.to_owned(), interrupt.condition.clone());
            if !condition.trim().is_empty() && !self.guard_holds(&condition) {
                continue;
            }
            let interrupt = &mut self.interrupts[i];
            interrupt.mark_done();
            debug!(interrupt = %interrupt.id, from = target, to = %to, "divert interrupted");
            let event = Value::Str(interrupt.id.clone());
            self.vars.set("event", event);
            return to;
        }
        target.to_owned()
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Statement, line: usize) -> Result<(), RuntimeError> {
        match stmt {
            Statement::Declare { name, init } => {
                let value = match init {
                    Initializer::Bool(b) => Value::Bool(*b),
                    Initializer::Number(n) => Value::Number(*n),
                    Initializer::Str(s) => Value::Str(s.clone()),
                    Initializer::Divert(target) => self.address(target).ok_or_else(|| {
                        RuntimeError::InvalidDeclaration {
                            text: format!("{name} = -> {target}"),
                            line,
                            message: format!("{target} is not a valid address"),
                        }
                    })?,
                    Initializer::Expr(expr) => {
                        eval_str(expr, self).map_err(|e| RuntimeError::expr(expr, line, e))?
                    }
                };
                self.put_variable(name, value);
            }
            Statement::Assign { name, expr } => {
                if !self.has_variable(name) {
                    return Err(RuntimeError::UndefinedVariable {
                        name: name.clone(),
                        line,
                    });
                }
                let value = match expr.trim().strip_prefix("->") {
                    Some(target) => self.address(target.trim()).ok_or_else(|| {
                        RuntimeError::InvalidDeclaration {
                            text: format!("{name} = {expr}"),
                            line,
                            message: format!("{} is not a valid address", target.trim()),
                        }
                    })?,
                    None => eval_str(expr, self).map_err(|e| RuntimeError::expr(expr, line, e))?,
                };
                self.put_variable(name, value);
            }
            Statement::Eval(expr) => {
                eval_str(expr, self).map_err(|e| RuntimeError::expr(expr, line, e))?;
            }
            Statement::Return(_) => {
                warn!(line, "return outside of a function is ignored");
            }
        }
        Ok(())
    }

    /// A container reference for `target`.
    fn address(&self, target: &str) -> Option<Value> {
        self.find_target(target)
            .map(|id| Value::Divert(self.content.get(id).id.clone()))
    }

    /// Write into the nearest scope binding `key`, else the globals.
    fn put_variable(&mut self, key: &str, value: Value) {
        if let Some(scope) = self.scope_binding(key) {
            if let Some(vars) = self.content.get_mut(scope).scope.as_mut() {
                vars.insert(key.to_owned(), value);
                return;
            }
        }
        self.vars.set(key, value);
    }

    fn scope_binding(&self, key: &str) -> Option<NodeId> {
        let c = self.container?;
        std::iter::once(c).chain(self.content.ancestors(c)).find(|&n| {
            let node = self.content.get(n);
            node.is_section() && node.scope.as_ref().map_or(false, |s| s.contains_key(key))
        })
    }

    /// Visit count of the container `token` names, tried bare and then
    /// qualified by the current container and its sections.
    fn count_of(&self, token: &str) -> Option<u32> {
        let counted = |id: &str| {
            self.content
                .lookup(id)
                .map(|n| self.content.get(n))
                .filter(|n| n.is_container() && !n.is_function())
                .map(|n| n.count)
        };
        if let Some(count) = counted(token) {
            return Some(count);
        }
        let c = self.container?;
        let candidates = std::iter::once(c).chain(
            self.content
                .ancestors(c)
                .filter(|&n| self.content.get(n).is_section()),
        );
        for scope in candidates {
            if let Some(count) = counted(&format!("{}.{token}", self.content.get(scope).id)) {
                return Some(count);
            }
        }
        None
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    fn function_node(&self, name: &str) -> Option<NodeId> {
        self.content
            .lookup(name)
            .filter(|&n| self.content.get(n).is_function())
    }

    fn call_knot_function(
        &mut self,
        func: NodeId,
        args: Vec<Value>,
    ) -> Result<Value, ExprError> {
        let node = self.content.get(func);
        let name = node.id.clone();
        let params = node.params().to_vec();
        if params.len() != args.len() {
            return Err(ExprError::Arity {
                name,
                expected: params.len(),
                found: args.len(),
            });
        }
        let node = self.content.get_mut(func);
        node.scope = Some(params.into_iter().zip(args).collect());
        node.count += 1;
        let saved = (self.container, self.index);
        self.container = Some(func);
        let result = self.run_body(func);
        (self.container, self.index) = saved;
        match result {
            Ok(v) => Ok(v.unwrap_or_else(|| Value::Str(String::new()))),
            Err(e) => Err(ExprError::Function {
                name,
                message: e.to_string(),
            }),
        }
    }

    /// Walk a function body (or a block inside one) until it yields a value.
    fn run_body(&mut self, container: NodeId) -> Result<Option<Value>, RuntimeError> {
        let children = self.content.children(container).to_vec();
        for child in children {
            let node = self.content.get(child);
            let line = node.line;
            match &node.kind {
                NodeKind::Text => {
                    let (text, count) = (node.text.clone(), node.count);
                    self.content.get_mut(child).count += 1;
                    return Ok(Some(Value::Str(clean_up(&expand(&text, count, self)))));
                }
                NodeKind::Statement(Statement::Return(expr)) => {
                    let Some(expr) = expr.clone() else {
                        return Ok(Some(Value::Str(String::new())));
                    };
                    let v = eval_str(&expr, self).map_err(|e| RuntimeError::expr(&expr, line, e))?;
                    return Ok(Some(v));
                }
                NodeKind::Statement(stmt) => {
                    let stmt = stmt.clone();
                    self.execute(&stmt, line)?;
                }
                NodeKind::Conditional { .. } => {
                    self.select(child);
                    self.content.get_mut(child).count += 1;
                    if let Some(v) = self.run_body(child)? {
                        return Ok(Some(v));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Snapshot everything that changes during play.
    pub fn save_state(&self) -> SaveState {
        let mut content = BTreeMap::new();
        for (_, node) in self.content.iter() {
            if node.count == 0 {
                continue;
            }
            let variables = node
                .scope
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), save_value(v)))
                .collect();
            let selection = match node.kind {
                NodeKind::Conditional { selection, .. } => Some(selection),
                _ => None,
            };
            content.insert(
                node.id.clone(),
                SavedContent {
                    count: node.count,
                    variables,
                    selection,
                },
            );
        }
        let ids = |list: &[NodeId]| -> Vec<String> {
            list.iter().map(|&n| self.content.get(n).id.clone()).collect()
        };
        SaveState {
            files: self.files.clone(),
            content,
            container: self.container.map(|c| self.content.get(c).id.clone()),
            index: self.index,
            text: self.transcript.clone(),
            choices: ids(&self.choices),
            comments: ids(&self.comments),
            image: self.image.clone(),
            variables: self
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), save_value(v)))
                .collect(),
            running: self.running,
            processing: self.processing,
        }
    }

    /// Replace all play state with `state`.
    pub fn restore_state(&mut self, state: &SaveState) -> Result<(), RuntimeError> {
        for file in &state.files {
            if !self.files.contains(file) {
                load_into(self.host.as_ref(), file, &mut self.content, &mut self.files)?;
            }
        }
        let nodes: Vec<NodeId> = self.content.iter().map(|(id, _)| id).collect();
        for id in nodes {
            let node = self.content.get_mut(id);
            node.count = 0;
            node.scope = None;
            if let NodeKind::Conditional { selection, .. } = &mut node.kind {
                *selection = 0;
            }
        }
        for (key, saved) in &state.content {
            let Some(id) = self.content.lookup(key) else {
                warn!(container = %key, "saved container no longer exists");
                continue;
            };
            let mut scope = HashMap::new();
            for (name, value) in &saved.variables {
                scope.insert(name.clone(), self.load_value(value)?);
            }
            let node = self.content.get_mut(id);
            node.count = saved.count;
            if node.is_section() && !scope.is_empty() {
                node.scope = Some(scope);
            }
            if let (NodeKind::Conditional { selection, .. }, Some(saved)) =
                (&mut node.kind, saved.selection)
            {
                *selection = saved;
            }
        }
        self.container = match &state.container {
            Some(id) => Some(
                self.content
                    .lookup(id)
                    .ok_or_else(|| RuntimeError::UnknownContainer(id.clone()))?,
            ),
            None => None,
        };
        self.index = state.index;
        self.transcript = state.text.clone();
        self.choices.clear();
        for id in &state.choices {
            let node = self
                .content
                .lookup(id)
                .ok_or_else(|| RuntimeError::UnknownContainer(id.clone()))?;
            if !self.content.get(node).is_choice() {
                return Err(RuntimeError::NotAChoice(id.clone()));
            }
            self.choices.push(node);
        }
        self.comments = state
            .comments
            .iter()
            .filter_map(|id| self.content.lookup(id))
            .collect();
        self.image = state.image.clone();
        self.vars.clear();
        for (name, value) in &state.variables {
            let value = self.load_value(value)?;
            self.vars.set(name.clone(), value);
        }
        self.running = state.running;
        self.processing = state.processing;
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), StateError> {
        self.save_state().save_to_path(path)
    }

    pub fn load_from_path(&mut self, path: &Path) -> Result<(), StateError> {
        let state = SaveState::load_from_path(path)?;
        Ok(self.restore_state(&state)?)
    }

    fn load_value(&self, value: &SavedValue) -> Result<Value, RuntimeError> {
        Ok(match value {
            SavedValue::Bool(b) => Value::Bool(*b),
            SavedValue::Number(s) => match Number::parse(s) {
                Some(n) => Value::Number(n),
                None => {
                    warn!(value = %s, "saved number does not parse");
                    Value::Null
                }
            },
            SavedValue::Str(s) => Value::Str(s.clone()),
            SavedValue::Divert(id) => Value::Divert(id.clone()),
            SavedValue::Object(key) => Value::Object(
                self.host
                    .resolve_object(key)
                    .ok_or_else(|| RuntimeError::UnknownObject(key.clone()))?,
            ),
            SavedValue::Null => Value::Null,
        })
    }
}

fn save_value(value: &Value) -> SavedValue {
    match value {
        Value::Null => SavedValue::Null,
        Value::Bool(b) => SavedValue::Bool(*b),
        Value::Number(n) => SavedValue::Number(n.to_string()),
        Value::Str(s) => SavedValue::Str(s.clone()),
        Value::Divert(id) => SavedValue::Divert(id.clone()),
        Value::Object(o) => SavedValue::Object(o.key().to_owned()),
    }
}

// ── EvalContext ───────────────────────────────────────────────────────────────

impl EvalContext for Story {
    fn has_variable(&self, name: &str) -> bool {
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return false;
        }
        if name == "this" {
            return self.container.is_some();
        }
        if self.scope_binding(name).is_some() {
            return true;
        }
        if let Some(target) = name.strip_prefix("->") {
            return self.content.lookup(target.trim()).is_some();
        }
        self.count_of(name).is_some() || self.vars.contains(name)
    }

    fn get_value(&self, name: &str) -> Value {
        if name == "this" {
            return match self.container {
                Some(c) => Value::Str(self.content.get(c).id.clone()),
                None => {
                    error!("'this' used with no current container");
                    Value::Null
                }
            };
        }
        if let Some(scope) = self.scope_binding(name) {
            if let Some(v) = self.content.get(scope).scope.as_ref().and_then(|s| s.get(name)) {
                return v.clone();
            }
        }
        if let Some(target) = name.strip_prefix("->") {
            let target = target.trim();
            if let Some(id) = self.content.lookup(target) {
                return Value::Divert(self.content.get(id).id.clone());
            }
            error!(container = target, "could not identify container");
            return Value::int(0);
        }
        if let Some(count) = self.count_of(name) {
            return Value::int(i64::from(count));
        }
        if let Some(v) = self.vars.get(name) {
            return v.clone();
        }
        error!(variable = name, "could not identify the variable");
        Value::int(0)
    }

    fn has_function(&self, name: &str) -> bool {
        is_builtin(name) || self.function_node(name).is_some()
    }

    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
        if let Some(func) = self.function_node(name) {
            return self.call_knot_function(func, args);
        }
        call_builtin(name, args, self)
            .unwrap_or_else(|| Err(ExprError::UnknownIdentifier(name.to_owned())))
    }

    fn random_below(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound.max(1))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Split `name(a, b)` into the name and its raw argument expressions.
fn split_call(target: &str) -> (&str, Vec<String>) {
    let target = target.trim();
    let Some(open) = target.find('(') else {
        return (target, Vec::new());
    };
    let inner = target[open + 1..].trim_end();
    let inner = inner.strip_suffix(')').unwrap_or(inner);
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut cur = String::new();
    for c in inner.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                args.push(cur.trim().to_owned());
                cur.clear();
                continue;
            }
            _ => {}
        }
        cur.push(c);
    }
    if !cur.trim().is_empty() {
        args.push(cur.trim().to_owned());
    }
    (target[..open].trim(), args)
}

/// Glue becomes a space, runs of whitespace collapse, ends are trimmed.
fn clean_up(text: &str) -> String {
    text.replace(GLUE, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl std::fmt::Debug for Story {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Story")
            .field("files", &self.files)
            .field(
                "container",
                &self.container.map(|c| self.content.get(c).id.as_str()),
            )
            .field("index", &self.index)
            .field("choices", &self.choices.len())
            .field("running", &self.running)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
