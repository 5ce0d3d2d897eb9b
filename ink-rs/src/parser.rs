//! Line-oriented story parser.
//!
//! Single pass, no backtracking.  Each trimmed line is dispatched on its first
//! character:
//!
//! | Line                     | Produces                                      |
//! |--------------------------|-----------------------------------------------|
//! | `== name`, `=== name ===` | knot                                          |
//! | `== function f(a, b)`    | knot function                                 |
//! | `= name`                 | stitch of the enclosing knot                  |
//! | `*` / `+` (repeated)     | once / sticky choice, nested by marker count     |
//! | `-` (repeated)           | gather, nested the same way                   |
//! | `{` without `}`          | opens a multi-line conditional or sequence    |
//! | `VAR ` / `~ `            | variable statement                            |
//! | `INCLUDE file`           | queued for loading after this source          |
//! | anything else            | text, split at each `->` into diverts         |
//!
//! A trailing `// ...` comment may carry `@img(name)` (background of the
//! current container) or `@* {cond} text` / `@+ {cond} text` (a comment node
//! shown once / repeatedly).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::content::{CondOption, Content, Node, NodeId, NodeKind, SequenceMode};
use crate::error::{ParseError, RuntimeError};
use crate::host::StoryHost;
use crate::script::stmt::{is_statement, parse_statement};

/// What one source contributed besides its nodes.
#[derive(Debug, Default)]
pub struct ParsedSource {
    /// The knot play starts at, if this source defines one.
    pub start: Option<NodeId>,
    pub includes: Vec<String>,
}

/// All sources of a story, merged into one arena.
#[derive(Debug)]
pub struct LoadedStory {
    pub content: Content,
    pub start: NodeId,
    /// Source file ids in load order, main file first.
    pub files: Vec<String>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load `file_id` and, transitively, everything it includes.
pub fn load_story(host: &dyn StoryHost, file_id: &str) -> Result<LoadedStory, RuntimeError> {
    let mut content = Content::new();
    let mut files = Vec::new();
    let start = load_into(host, file_id, &mut content, &mut files)?;
    let start = start.ok_or_else(|| {
        ParseError::new(file_id, 0, format!("Could not detect a root knot node in {file_id}"))
    })?;
    Ok(LoadedStory {
        content,
        start,
        files,
    })
}

/// Parse `file_id` plus its includes into `content`.  Returns the start knot
/// of `file_id` itself.
pub fn load_into(
    host: &dyn StoryHost,
    file_id: &str,
    content: &mut Content,
    files: &mut Vec<String>,
) -> Result<Option<NodeId>, RuntimeError> {
    let mut seen: HashSet<String> = files.iter().cloned().collect();
    let mut queue = vec![file_id.to_owned()];
    let mut start = None;
    while let Some(file) = queue.pop() {
        if !seen.insert(file.clone()) {
            continue;
        }
        let src = host.open_source(&file).map_err(|source| RuntimeError::Source {
            file: file.clone(),
            source,
        })?;
        let parsed = parse_source(&src, &file, content)?;
        debug!(file = %file, includes = parsed.includes.len(), "parsed story source");
        if file == file_id {
            start = parsed.start;
        }
        files.push(file);
        // Reverse so includes load in the order they were written.
        queue.extend(parsed.includes.into_iter().rev());
    }
    Ok(start)
}

/// Parse one source into `content`.
pub fn parse_source(src: &str, file: &str, content: &mut Content) -> Result<ParsedSource, ParseError> {
    let mut parser = Parser::new(file, content);
    for (i, raw) in src.lines().enumerate() {
        parser.line = i + 1;
        parser.parse_line(raw)?;
    }
    if !parser.blocks.is_empty() {
        return Err(parser.error(UNCLOSED_BLOCK));
    }
    Ok(ParsedSource {
        start: parser.start,
        includes: parser.includes,
    })
}

/// Parse a single choice line (and its inline body) that hangs under no
/// container, registering it under `id`.
pub fn parse_detached_choice(
    line: &str,
    id: &str,
    file: &str,
    content: &mut Content,
) -> Result<NodeId, ParseError> {
    let mut parser = Parser::new(file, content);
    parser.line = 1;
    let line = line.trim();
    if !matches!(line.chars().next(), Some('*' | '+')) {
        return Err(parser.error("An interrupt choice must start with '*' or '+'"));
    }
    parser.choice(line, Some(id))
}

// ── Parser ────────────────────────────────────────────────────────────────────

fn choice_body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*\]").expect("valid choice regex"))
}

const UNCLOSED_BLOCK: &str = "Conditional block is not closed by '}'";

const ORPHAN_CHOICE: &str =
    "A choice must be nested within another knot, parent or choice/gather structure";

struct Parser<'a> {
    content: &'a mut Content,
    file: String,
    line: usize,
    current: Option<NodeId>,
    /// Open multi-line conditionals, innermost last.
    blocks: Vec<NodeId>,
    start: Option<NodeId>,
    includes: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(file: &str, content: &'a mut Content) -> Self {
        Parser {
            content,
            file: file.to_owned(),
            line: 0,
            current: None,
            blocks: Vec::new(),
            start: None,
            includes: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(&self.file, self.line, message)
    }

    fn parse_line(&mut self, raw: &str) -> Result<(), ParseError> {
        let trimmed = raw.trim();
        let (code, comment) = match trimmed.find("//") {
            Some(i) => (trimmed[..i].trim(), Some(trimmed[i + 2..].trim())),
            None => (trimmed, None),
        };
        if let Some(file) = code.strip_prefix("INCLUDE ") {
            self.includes.push(file.trim().to_owned());
            return Ok(());
        }
        self.parse_code(code)?;
        if let Some(comment) = comment {
            self.parse_comment(comment)?;
        }
        Ok(())
    }

    fn parse_code(&mut self, line: &str) -> Result<(), ParseError> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(&block) = self.blocks.last() {
            if let Some(before) = closing_brace(line) {
                let before = before.trim();
                if !before.is_empty() {
                    self.parse_code(before)?;
                }
                self.close_block();
                return Ok(());
            }
            if self.is_option_line(block, line) {
                return self.start_option(block, line);
            }
        }

        match line.as_bytes()[0] {
            b'=' if line.starts_with("==") => self.knot(line),
            b'=' => self.stitch(line),
            b'*' | b'+' => self.choice(line, None).map(|_| ()),
            b'-' if !line.starts_with("->") => self.gather(line),
            b'{' if !line.contains('}') => self.open_block(line),
            _ if is_statement(line) => self.statement(line),
            _ => match self.current {
                Some(cur) => self.add_text(cur, line),
                None => {
                    warn!(file = %self.file, line = self.line, "text outside of a knot is ignored");
                    Ok(())
                }
            },
        }
    }

    // ── Nodes ─────────────────────────────────────────────────────────────────

    fn new_node(&self, id: String, kind: NodeKind, text: &str) -> Node {
        Node::new(id, &self.file, self.line, kind, text.to_owned())
    }

    fn insert(&mut self, node: Node) -> Result<NodeId, ParseError> {
        self.content
            .insert(node)
            .map_err(|id| self.error(format!("Duplicate id {id}")))
    }

    fn insert_child(&mut self, parent: NodeId, mut node: Node) -> Result<NodeId, ParseError> {
        if node.level == 0 {
            node.level = self.content.get(parent).level;
        }
        let id = self.insert(node)?;
        self.content.attach(parent, id);
        Ok(id)
    }

    /// Add narrative text under `parent`, turning every `->` into a divert.
    fn add_text(&mut self, parent: NodeId, text: &str) -> Result<(), ParseError> {
        if !text.contains("->") {
            let id = self.content.next_child_id(parent);
            let node = self.new_node(id, NodeKind::Text, text);
            self.insert_child(parent, node)?;
            return Ok(());
        }
        let mut parts = text.split("->");
        let head = parts.next().unwrap_or("");
        if !head.trim().is_empty() {
            let id = self.content.next_child_id(parent);
            let node = self.new_node(id, NodeKind::Text, &format!("{head}<>"));
            self.insert_child(parent, node)?;
        }
        for part in parts {
            let target = part.trim();
            if target.is_empty() {
                continue;
            }
            let id = self.content.next_child_id(parent);
            let node = self.new_node(id, NodeKind::Text, &format!("-> {target}"));
            self.insert_child(parent, node)?;
        }
        Ok(())
    }

    // ── Headers ───────────────────────────────────────────────────────────────

    fn knot(&mut self, line: &str) -> Result<(), ParseError> {
        if !self.blocks.is_empty() {
            return Err(self.error(UNCLOSED_BLOCK));
        }
        let header = line.trim_matches('=').trim();
        let (is_function, header) = match header.strip_prefix("function ") {
            Some(rest) => (true, rest.trim()),
            None => (false, header),
        };
        let (name, params) = self.split_params(header)?;
        if name.is_empty() {
            return Err(self.error("Knot header without a name"));
        }
        let kind = if is_function {
            NodeKind::Function { params }
        } else {
            NodeKind::Knot { params }
        };
        let node = self.new_node(name.clone(), kind, &name);
        let id = self.insert(node)?;
        if !is_function {
            let placeholder = self.start.map_or(true, |s| self.content.size(s) == 0);
            if placeholder {
                self.start = Some(id);
            }
        }
        self.current = Some(id);
        Ok(())
    }

    fn stitch(&mut self, line: &str) -> Result<(), ParseError> {
        if !self.blocks.is_empty() {
            return Err(self.error(UNCLOSED_BLOCK));
        }
        let header = line.trim_matches('=').trim();
        let (name, params) = self.split_params(header)?;
        let knot = self.current.and_then(|cur| {
            std::iter::once(cur)
                .chain(self.content.ancestors(cur))
                .find(|&n| self.content.get(n).is_knot() || self.content.get(n).is_function())
        });
        let Some(knot) = knot else {
            return Err(self.error("Stitch without a containing Knot"));
        };
        let id = format!("{}.{name}", self.content.get(knot).id);
        let mut node = self.new_node(id, NodeKind::Stitch { params }, &name);
        node.level = 1;
        let id = self.insert_child(knot, node)?;
        self.current = Some(id);
        Ok(())
    }

    /// Split `name(a, b)` into the name and trimmed parameter names.
    fn split_params(&self, header: &str) -> Result<(String, Vec<String>), ParseError> {
        let Some(open) = header.find('(') else {
            return Ok((header.trim().to_owned(), Vec::new()));
        };
        let close = header
            .rfind(')')
            .filter(|&c| c > open)
            .ok_or_else(|| self.error("Parameter list is not closed by ')'"))?;
        let params = header[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();
        Ok((header[..open].trim().to_owned(), params))
    }

    // ── Choices and gathers ───────────────────────────────────────────────────

    /// Nearest ancestor-or-self of the cursor that may hold a choice or gather
    /// at `level`.
    fn weave_parent(&self, level: usize) -> Option<NodeId> {
        let mut cur = self.current?;
        loop {
            let node = self.content.get(cur);
            if (node.is_choice() || node.is_gather()) && node.level >= level {
                cur = node.parent?;
            } else {
                return Some(cur);
            }
        }
    }

    fn choice(&mut self, line: &str, fixed_id: Option<&str>) -> Result<NodeId, ParseError> {
        let marker = line.as_bytes()[0] as char;
        let (markers, mut rest) = strip_markers(line, marker);
        let level = 1 + markers;

        let parent = match fixed_id {
            Some(_) => None,
            None => Some(self.weave_parent(level).ok_or_else(|| self.error(ORPHAN_CHOICE))?),
        };

        let mut label = None;
        let mut conditions = Vec::new();
        loop {
            if rest.starts_with('(') && label.is_none() {
                let close = rest.find(')').ok_or_else(|| self.error("Choice label is not closed by ')'"))?;
                label = Some(rest[1..close].trim().to_owned());
                rest = rest[close + 1..].trim_start();
            } else if rest.starts_with('{') {
                let close = rest.find('}').ok_or_else(|| self.error("Choice condition is not closed by '}'"))?;
                conditions.push(rest[1..close].trim().to_owned());
                rest = rest[close + 1..].trim_start();
            } else {
                break;
            }
        }

        let mut display = match rest.find(']') {
            Some(i) => rest[..i].replace('[', ""),
            None => rest.to_owned(),
        };
        if let Some(i) = display.find("->") {
            display.truncate(i);
        }
        let display = display.trim().to_owned();
        let body = if rest.contains(']') {
            choice_body_re().replace(rest, "").into_owned()
        } else {
            rest.to_owned()
        };
        let body = body.trim().trim_start_matches(['*', '+', ' ']).to_owned();

        let id = match (fixed_id, parent, &label) {
            (Some(id), _, _) => id.to_owned(),
            (None, Some(p), Some(l)) => format!("{}.{l}", self.content.get(p).id),
            (None, Some(p), None) => self.content.next_child_id(p),
            (None, None, _) => return Err(self.error(ORPHAN_CHOICE)),
        };
        let kind = NodeKind::Choice {
            repeatable: marker == '+',
            conditions,
        };
        let mut node = self.new_node(id, kind, &display);
        node.level = level;
        let id = match parent {
            Some(p) => self.insert_child(p, node)?,
            None => self.insert(node)?,
        };
        if !body.is_empty() {
            self.add_text(id, &body)?;
        }
        self.current = Some(id);
        Ok(id)
    }

    fn gather(&mut self, line: &str) -> Result<(), ParseError> {
        let (markers, mut rest) = strip_markers(line, '-');
        let level = 1 + markers;
        let parent = self
            .weave_parent(level)
            .ok_or_else(|| self.error("A gather must be nested within a knot or stitch"))?;
        let mut label = None;
        if rest.starts_with('(') {
            let close = rest.find(')').ok_or_else(|| self.error("Gather label is not closed by ')'"))?;
            label = Some(rest[1..close].trim().to_owned());
            rest = rest[close + 1..].trim_start();
        }
        let id = match label {
            Some(l) => format!("{}.{l}", self.content.get(parent).id),
            None => self.content.next_child_id(parent),
        };
        let mut node = self.new_node(id, NodeKind::Gather, "");
        node.level = level;
        let id = self.insert_child(parent, node)?;
        self.current = Some(id);
        if !rest.is_empty() {
            self.add_text(id, rest)?;
        }
        Ok(())
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn statement(&mut self, line: &str) -> Result<(), ParseError> {
        let parent = self
            .current
            .ok_or_else(|| self.error("Declaration is not inside a knot/container"))?;
        let stmt = parse_statement(line).map_err(|m| self.error(m))?;
        let id = self.content.next_child_id(parent);
        let node = self.new_node(id, NodeKind::Statement(stmt), line);
        self.insert_child(parent, node)?;
        Ok(())
    }

    // ── Conditional blocks ────────────────────────────────────────────────────

    fn open_block(&mut self, line: &str) -> Result<(), ParseError> {
        let parent = self
            .current
            .ok_or_else(|| self.error("Conditional block is not inside a knot/container"))?;
        let header = line[1..].trim();
        let (mode, options) = if header.is_empty() {
            (SequenceMode::Conditional, Vec::new())
        } else {
            let Some(cond) = header.strip_suffix(':') else {
                return Err(self.error("Error in conditional block; condition not ended by ':'"));
            };
            let cond = cond.trim();
            match SequenceMode::from_keyword(cond) {
                Some(mode) => (mode, Vec::new()),
                None => (
                    SequenceMode::Conditional,
                    vec![CondOption {
                        guard: Some(cond.to_owned()),
                        lines: Vec::new(),
                    }],
                ),
            }
        };
        let id = self.content.next_child_id(parent);
        let kind = NodeKind::Conditional {
            mode,
            options,
            selection: 0,
        };
        let node = self.new_node(id, kind, "");
        let id = self.insert_child(parent, node)?;
        self.blocks.push(id);
        self.current = Some(id);
        Ok(())
    }

    fn block_mode(&self, block: NodeId) -> SequenceMode {
        match self.content.get(block).kind {
            NodeKind::Conditional { mode, .. } => mode,
            _ => SequenceMode::Conditional,
        }
    }

    fn is_option_line(&self, block: NodeId, line: &str) -> bool {
        if !line.starts_with('-') || line.starts_with("->") {
            return false;
        }
        match self.block_mode(block) {
            SequenceMode::Conditional => line.ends_with(':'),
            _ => true,
        }
    }

    fn start_option(&mut self, block: NodeId, line: &str) -> Result<(), ParseError> {
        let body = line[1..].trim();
        let conditional = self.block_mode(block) == SequenceMode::Conditional;
        let guard = match body.strip_suffix(':') {
            Some(cond) if conditional => {
                let cond = cond.trim();
                (!cond.eq_ignore_ascii_case("else")).then(|| cond.to_owned())
            }
            _ => None,
        };
        if let NodeKind::Conditional { options, .. } = &mut self.content.get_mut(block).kind {
            options.push(CondOption {
                guard,
                lines: Vec::new(),
            });
        }
        self.current = Some(block);
        if !conditional && !body.is_empty() {
            self.parse_code(body)?;
        }
        Ok(())
    }

    fn close_block(&mut self) {
        if let Some(block) = self.blocks.pop() {
            self.current = self.content.get(block).parent;
        }
    }

    // ── Comments ──────────────────────────────────────────────────────────────

    fn parse_comment(&mut self, comment: &str) -> Result<(), ParseError> {
        if let Some(i) = comment.find("@img(") {
            let rest = &comment[i + 5..];
            let name = rest.split(')').next().unwrap_or("").trim();
            if let Some(cur) = self.current {
                self.content.get_mut(cur).background = Some(name.to_owned());
            }
            return Ok(());
        }
        let (once, rest) = if let Some(rest) = comment.strip_prefix("@*") {
            (true, rest)
        } else if let Some(rest) = comment.strip_prefix("@+") {
            (false, rest)
        } else {
            return Ok(());
        };
        let Some(parent) = self.current else {
            return Ok(());
        };
        let mut rest = rest.trim();
        let mut conditions = Vec::new();
        while rest.starts_with('{') {
            let close = rest.find('}').ok_or_else(|| self.error("Comment condition is not closed by '}'"))?;
            conditions.push(rest[1..close].trim().to_owned());
            rest = rest[close + 1..].trim_start();
        }
        let id = self.content.next_child_id(parent);
        let node = self.new_node(id, NodeKind::Comment { once, conditions }, rest);
        self.insert_child(parent, node)?;
        Ok(())
    }
}

/// Count repeated `marker`s (spaces allowed between them) and return the rest.
fn strip_markers(line: &str, marker: char) -> (usize, &str) {
    let mut rest = line;
    let mut count = 0;
    while rest.starts_with(marker) && !(marker == '-' && rest.starts_with("->")) {
        rest = rest[marker.len_utf8()..].trim_start();
        count += 1;
    }
    (count, rest)
}

/// If `line` ends in a `}` that closes an enclosing block, the text before it.
fn closing_brace(line: &str) -> Option<&str> {
    if !line.ends_with('}') {
        return None;
    }
    let mut depth: i32 = 0;
    for (i, c) in line.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return (i == line.len() - 1).then(|| &line[..i]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stmt::Statement;

    fn parse(src: &str) -> (Content, ParsedSource) {
        let mut content = Content::new();
        let parsed = parse_source(src, "test.ink", &mut content).expect("parse failed");
        (content, parsed)
    }

    fn node<'c>(content: &'c Content, id: &str) -> &'c Node {
        let n = content.lookup(id).unwrap_or_else(|| panic!("no node {id}"));
        content.get(n)
    }

    #[test]
    fn knots_and_stitches_get_dotted_ids() {
        let (c, parsed) = parse("== start ==\nHello.\n= inner\nInside.\n== other\n");
        let start = parsed.start.unwrap();
        assert_eq!(c.get(start).id, "start");
        assert!(node(&c, "start.inner").is_stitch());
        assert_eq!(node(&c, "start.inner.0").text, "Inside.");
        assert!(node(&c, "other").is_knot());
    }

    #[test]
    fn function_headers_take_parameters() {
        let (c, parsed) = parse("== function lerp(a, b, k)\n~ return a + (b - a) * k\n== start\nHi\n");
        let f = node(&c, "lerp");
        assert!(f.is_function());
        assert_eq!(f.params(), ["a", "b", "k"]);
        assert_eq!(c.get(parsed.start.unwrap()).id, "start");
    }

    #[test]
    fn empty_first_knot_is_superseded() {
        let (c, parsed) = parse("== placeholder\n== real\nHello.\n");
        assert_eq!(c.get(parsed.start.unwrap()).id, "real");
    }

    #[test]
    fn choice_text_and_body() {
        let (c, _) = parse("== start\n* Hello [back!] right back to you!\n");
        let choice = node(&c, "start.0");
        assert_eq!(choice.text, "Hello back!");
        assert_eq!(node(&c, "start.0.0").text, "Hello  right back to you!");
    }

    #[test]
    fn choice_with_divert_splits_body() {
        let (c, _) = parse("== start\n* [Go left] -> left\n");
        let choice = node(&c, "start.0");
        assert_eq!(choice.text, "Go left");
        assert_eq!(choice.children.len(), 1);
        assert_eq!(node(&c, "start.0.0").divert_target(), Some("left"));
    }

    #[test]
    fn choice_labels_and_conditions() {
        let (c, _) = parse("== start\n+ (greet) {met > 0} {!left} [Hi]\n");
        let choice = node(&c, "start.greet");
        match &choice.kind {
            NodeKind::Choice {
                repeatable,
                conditions,
            } => {
                assert!(*repeatable);
                assert_eq!(conditions, &["met > 0", "!left"]);
            }
            other => panic!("not a choice: {other:?}"),
        }
    }

    #[test]
    fn nested_choices_attach_by_level() {
        let src = "== start\n* A\n** A1\n** A2\n* B\n- (join) Joined.\n";
        let (c, _) = parse(src);
        assert_eq!(node(&c, "start.0").level, 2);
        assert_eq!(node(&c, "start.0.1").level, 3);
        assert!(node(&c, "start.0.2").is_choice());
        assert!(node(&c, "start.1").is_choice());
        let join = node(&c, "start.join");
        assert!(join.is_gather());
        assert_eq!(c.get(join.parent.unwrap()).id, "start");
    }

    #[test]
    fn text_with_divert_gets_glue() {
        let (c, _) = parse("== start\nI drew a card. -> test\n");
        assert_eq!(node(&c, "start.0").text, "I drew a card. <>");
        assert_eq!(node(&c, "start.1").text, "-> test");
    }

    #[test]
    fn statements_are_classified() {
        let (c, _) = parse("== start\nVAR x = 2\n~ x = x + 1\n");
        assert!(matches!(node(&c, "start.0").kind, NodeKind::Statement(Statement::Declare { .. })));
        assert!(matches!(node(&c, "start.1").kind, NodeKind::Statement(Statement::Assign { .. })));
    }

    #[test]
    fn conditional_block_with_options() {
        let src = "== test\n{\n - x == 0:\n  Zero.\n - else:\n  Other.\n}\nAfter.\n";
        let (c, _) = parse(src);
        let cond = node(&c, "test.0");
        match &cond.kind {
            NodeKind::Conditional { mode, options, .. } => {
                assert_eq!(*mode, SequenceMode::Conditional);
                assert_eq!(options.len(), 2);
                assert_eq!(options[0].guard.as_deref(), Some("x == 0"));
                assert_eq!(options[1].guard, None);
                assert_eq!(c.get(options[1].lines[0]).text, "Other.");
            }
            other => panic!("not a conditional: {other:?}"),
        }
        assert_eq!(node(&c, "test.1").text, "After.");
    }

    #[test]
    fn sequence_block_options_carry_text() {
        let src = "== test\n{ stopping:\n - First.\n - Second.\n   More.\n}\n";
        let (c, _) = parse(src);
        match &node(&c, "test.0").kind {
            NodeKind::Conditional { mode, options, .. } => {
                assert_eq!(*mode, SequenceMode::Stopping);
                assert_eq!(options.len(), 2);
                assert_eq!(options[1].lines.len(), 2);
            }
            other => panic!("not a conditional: {other:?}"),
        }
        assert_eq!(node(&c, "test.0.1.1").text, "More.");
    }

    #[test]
    fn nested_blocks() {
        let src = "== test\n{ a:\n  { b:\n   Both.\n  }\n- else:\n  Neither.\n}\n";
        let (c, _) = parse(src);
        assert!(node(&c, "test.0.0.0").is_conditional());
        assert_eq!(node(&c, "test.0.0.0.0.0").text, "Both.");
        assert_eq!(node(&c, "test.0.1.0").text, "Neither.");
    }

    #[test]
    fn block_header_must_end_with_colon() {
        let mut content = Content::new();
        let err = parse_source("== test\n{ x > 0\n}\n", "t.ink", &mut content).unwrap_err();
        assert!(err.message.contains("not ended by ':'"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unclosed_blocks_fail_at_any_header() {
        for (src, line) in [
            ("== start\n{ x > 0:\nA\n= st\nB\n", 4),
            ("== start\n{ x > 0:\nA\n== other\nB\n", 4),
        ] {
            let mut content = Content::new();
            let err = parse_source(src, "t.ink", &mut content).unwrap_err();
            assert!(err.message.contains("not closed by '}'"), "{err}");
            assert_eq!(err.line, line);
        }
        let mut content = Content::new();
        let err = parse_source("== start\n{ stopping:\n- A\n", "t.ink", &mut content).unwrap_err();
        assert!(err.message.contains("not closed by '}'"));
    }

    #[test]
    fn duplicate_ids_fail() {
        let mut content = Content::new();
        let err = parse_source("== start\nA\n== start\nB\n", "t.ink", &mut content).unwrap_err();
        assert!(err.message.contains("start"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn orphans_fail() {
        let mut content = Content::new();
        let err = parse_source("* Hello\n", "t.ink", &mut content).unwrap_err();
        assert!(err.message.contains("A choice must be nested"));
        let mut content = Content::new();
        let err = parse_source("= stitch\n", "t.ink", &mut content).unwrap_err();
        assert!(err.message.contains("Stitch without a containing Knot"));
    }

    #[test]
    fn comments_set_background_and_notes() {
        let src = "== start // @img(station)\nHello. // @* {start > 0} Remember the station.\n";
        let (c, _) = parse(src);
        assert_eq!(node(&c, "start").background.as_deref(), Some("station"));
        let note = node(&c, "start.1");
        assert!(matches!(note.kind, NodeKind::Comment { once: true, .. }));
        assert_eq!(note.text, "Remember the station.");
    }

    #[test]
    fn includes_are_collected() {
        let (_, parsed) = parse("INCLUDE other.ink\n== start\nHi\n");
        assert_eq!(parsed.includes, ["other.ink"]);
    }

    #[test]
    fn closing_brace_detection() {
        assert_eq!(closing_brace("}"), Some(""));
        assert_eq!(closing_brace("Done. }"), Some("Done. "));
        assert_eq!(closing_brace("{x}"), None);
        assert_eq!(closing_brace("{x} }"), Some("{x} "));
    }

    #[test]
    fn detached_choice_for_interrupts() {
        let mut content = Content::new();
        let id = parse_detached_choice("* [Look around] -> look", "event1", "t", &mut content).unwrap();
        let n = content.get(id);
        assert_eq!(n.id, "event1");
        assert_eq!(n.text, "Look around");
        assert_eq!(n.parent, None);
    }
}
