//! The parsed content tree.
//!
//! Nodes live in one arena owned by [`Content`] and refer to each other by
//! [`NodeId`].  Parent links are plain ids, so walking up the tree is a chain
//! of index hops.  Every node also carries a dotted string id, unique across
//! the story and stable for its lifetime; saved state is keyed by it.
//!
//! A conditional keeps its children in option groups rather than in
//! `children`; which group is active is decided each time the conditional is
//! entered (see [`Content::children`]).

use std::collections::HashMap;

use crate::script::stmt::Statement;
use crate::script::value::Value;

/// Index of a node in the [`Content`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// How a `{...}` block picks its option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    /// First option whose guard holds.
    Conditional,
    /// One option per visit, sticking on the last.
    Stopping,
    Cycle,
    /// One option per visit, then nothing.
    Once,
    Shuffle,
}

impl SequenceMode {
    /// Recognise a block header keyword (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<SequenceMode> {
        match s.to_ascii_lowercase().as_str() {
            "stopping" => Some(SequenceMode::Stopping),
            "cycle" => Some(SequenceMode::Cycle),
            "once" => Some(SequenceMode::Once),
            "shuffle" => Some(SequenceMode::Shuffle),
            _ => None,
        }
    }
}

/// One branch of a conditional block.
#[derive(Debug, Clone, Default)]
pub struct CondOption {
    /// `None` for `else` and for sequence options.
    pub guard: Option<String>,
    pub lines: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Knot {
        params: Vec<String>,
    },
    Function {
        params: Vec<String>,
    },
    Stitch {
        params: Vec<String>,
    },
    Choice {
        repeatable: bool,
        conditions: Vec<String>,
    },
    Gather,
    Conditional {
        mode: SequenceMode,
        options: Vec<CondOption>,
        /// Active option; past the end means nothing is active.
        selection: usize,
    },
    /// Narrative text; a divert when it starts with `->`.
    Text,
    Statement(Statement),
    Comment {
        once: bool,
        conditions: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    /// Source file id and 1-based line.
    pub file: String,
    pub line: usize,
    pub kind: NodeKind,
    /// Raw text: narrative text, choice text, or comment text.
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Nesting level: knots 0, stitches 1, choices and gathers 1 + markers.
    pub level: usize,
    /// Visit counter.
    pub count: u32,
    pub background: Option<String>,
    /// Bound parameters of a parameterized container.
    pub scope: Option<HashMap<String, Value>>,
}

impl Node {
    pub fn new(id: String, file: &str, line: usize, kind: NodeKind, text: String) -> Self {
        Node {
            id,
            file: file.to_owned(),
            line,
            kind,
            text,
            parent: None,
            children: Vec::new(),
            level: 0,
            count: 0,
            background: None,
            scope: None,
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::Text | NodeKind::Statement(_) | NodeKind::Comment { .. }
        )
    }

    pub fn is_knot(&self) -> bool {
        matches!(self.kind, NodeKind::Knot { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, NodeKind::Function { .. })
    }

    pub fn is_stitch(&self) -> bool {
        matches!(self.kind, NodeKind::Stitch { .. })
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, NodeKind::Choice { .. })
    }

    pub fn is_gather(&self) -> bool {
        matches!(self.kind, NodeKind::Gather)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, NodeKind::Conditional { .. })
    }

    /// Knots, functions and stitches: the containers that can take parameters.
    pub fn is_section(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Knot { .. } | NodeKind::Function { .. } | NodeKind::Stitch { .. }
        )
    }

    /// A choice without display text.
    pub fn is_fallback(&self) -> bool {
        self.is_choice() && self.text.is_empty()
    }

    pub fn params(&self) -> &[String] {
        match &self.kind {
            NodeKind::Knot { params }
            | NodeKind::Function { params }
            | NodeKind::Stitch { params } => params,
            _ => &[],
        }
    }

    /// Target text of a divert node (`-> target(args)` yields `target(args)`).
    pub fn divert_target(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Text => self.text.strip_prefix("->").map(str::trim),
            _ => None,
        }
    }

    pub fn is_divert(&self) -> bool {
        self.divert_target().is_some()
    }
}

// ── Content ───────────────────────────────────────────────────────────────────

/// Arena of all nodes of a loaded story plus the id index.
#[derive(Debug, Clone, Default)]
pub struct Content {
    nodes: Vec<Node>,
    ids: HashMap<String, NodeId>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` and register its id.  Fails with the duplicate id.
    pub fn insert(&mut self, node: Node) -> Result<NodeId, String> {
        if self.ids.contains_key(&node.id) {
            return Err(node.id);
        }
        let id = NodeId(self.nodes.len());
        self.ids.insert(node.id.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Add `child` under `parent`'s active child list and link it back.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        let node = &mut self.nodes[parent.0];
        match &mut node.kind {
            NodeKind::Conditional { options, .. } => {
                if options.is_empty() {
                    options.push(CondOption::default());
                }
                if let Some(last) = options.last_mut() {
                    last.lines.push(child);
                }
            }
            _ => node.children.push(child),
        }
    }

    /// Id for the next child of `parent`: its dotted id plus position.
    pub fn next_child_id(&self, parent: NodeId) -> String {
        let node = &self.nodes[parent.0];
        match &node.kind {
            NodeKind::Conditional { options, .. } => {
                let opt = options.len().saturating_sub(1);
                let pos = options.last().map_or(0, |o| o.lines.len());
                format!("{}.{opt}.{pos}", node.id)
            }
            _ => format!("{}.{}", node.id, node.children.len()),
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// The children traversal walks: the selected option for a conditional,
    /// the plain child list otherwise.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0].kind {
            NodeKind::Conditional {
                options, selection, ..
            } => options.get(*selection).map_or(&[][..], |o| &o.lines[..]),
            _ => &self.nodes[id.0].children,
        }
    }

    pub fn child(&self, id: NodeId, i: usize) -> Option<NodeId> {
        self.children(id).get(i).copied()
    }

    pub fn size(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            content: self,
            next: self.nodes[id.0].parent,
        }
    }

    /// The unique container whose id ends in `.name`, if there is exactly one.
    pub fn find_by_label(&self, name: &str) -> Option<NodeId> {
        let suffix = format!(".{name}");
        let mut found = None;
        for (id, &node) in &self.ids {
            if id.ends_with(&suffix) && self.nodes[node.0].is_container() {
                if found.is_some() {
                    return None;
                }
                found = Some(node);
            }
        }
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct Ancestors<'a> {
    content: &'a Content,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.content.get(id).parent;
        Some(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn knot(content: &mut Content, name: &str) -> NodeId {
        let node = Node::new(name.into(), "t", 1, NodeKind::Knot { params: vec![] }, String::new());
        content.insert(node).unwrap()
    }

    fn text(content: &mut Content, parent: NodeId, s: &str) -> NodeId {
        let id = content.next_child_id(parent);
        let node = Node::new(id, "t", 2, NodeKind::Text, s.into());
        let n = content.insert(node).unwrap();
        content.attach(parent, n);
        n
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut c = Content::new();
        knot(&mut c, "start");
        let dup = Node::new("start".into(), "t", 3, NodeKind::Gather, String::new());
        assert_eq!(c.insert(dup), Err("start".to_string()));
    }

    #[test]
    fn children_get_positional_ids() {
        let mut c = Content::new();
        let k = knot(&mut c, "start");
        let a = text(&mut c, k, "A");
        let b = text(&mut c, k, "B");
        assert_eq!(c.get(a).id, "start.0");
        assert_eq!(c.get(b).id, "start.1");
        assert_eq!(c.index_of(k, b), Some(1));
        assert_eq!(c.ancestors(b).collect::<Vec<_>>(), vec![k]);
    }

    #[test]
    fn conditional_children_follow_selection() {
        let mut c = Content::new();
        let k = knot(&mut c, "start");
        let kind = NodeKind::Conditional {
            mode: SequenceMode::Stopping,
            options: vec![CondOption::default()],
            selection: 0,
        };
        let cond = c.insert(Node::new("start.0".into(), "t", 2, kind, String::new())).unwrap();
        c.attach(k, cond);
        let first = text(&mut c, cond, "first");
        if let NodeKind::Conditional { options, .. } = &mut c.get_mut(cond).kind {
            options.push(CondOption::default());
        }
        let second = text(&mut c, cond, "second");
        assert_eq!(c.get(second).id, "start.0.1.0");
        assert_eq!(c.children(cond), &[first]);
        if let NodeKind::Conditional { selection, .. } = &mut c.get_mut(cond).kind {
            *selection = 1;
        }
        assert_eq!(c.children(cond), &[second]);
        if let NodeKind::Conditional { selection, .. } = &mut c.get_mut(cond).kind {
            *selection = 2;
        }
        assert_eq!(c.size(cond), 0);
    }

    #[test]
    fn label_lookup_requires_unique_suffix() {
        let mut c = Content::new();
        let k = knot(&mut c, "start");
        let g = Node::new("start.land".into(), "t", 3, NodeKind::Gather, String::new());
        let g = c.insert(g).unwrap();
        c.attach(k, g);
        assert_eq!(c.find_by_label("land"), Some(g));
        knot(&mut c, "other.land");
        assert_eq!(c.find_by_label("land"), None);
    }

    #[test]
    fn divert_nodes() {
        let n = Node::new("a.0".into(), "t", 1, NodeKind::Text, "-> END".into());
        assert_eq!(n.divert_target(), Some("END"));
        let n = Node::new("a.1".into(), "t", 1, NodeKind::Text, "plain".into());
        assert!(!n.is_divert());
    }
}
