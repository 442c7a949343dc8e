mod markdown;
mod render;

use std::ops::Range;

use crate::context::AnchorId;
use crate::pattern::PatternMatch;

pub(crate) use markdown::read_markdown;

/// Handle to a node in a [`Document`] arena. Stable for the lifetime of the
/// document: detaching, cloning or removing other nodes never invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Character formatting carried by a text run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub strike: bool,
    pub code: bool,
    pub highlight: bool,
}

impl RunStyle {
    pub fn plain() -> Self {
        RunStyle::default()
    }

    pub fn highlighted() -> Self {
        RunStyle {
            highlight: true,
            ..RunStyle::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Soft,
    Line,
    Page,
    Section,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Composite
    Root,
    Paragraph,
    Heading(u8),
    Blockquote,
    List { start: Option<u64> },
    ListItem,
    Table,
    TableRow { header: bool },
    TableCell,
    CodeBlock { language: Option<String> },
    Link { dest: String },
    /// Zero-content placeholder marking an insertion point.
    Anchor,

    // Leaves
    Run(RunStyle),
    Break(BreakKind),
    Rule,
    Image { dest: String, title: String, alt: String },
}

impl NodeKind {
    /// Containers whose runs form one contiguous scannable text.
    pub fn holds_text(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading(_)
                | NodeKind::TableCell
                | NodeKind::CodeBlock { .. }
        )
    }

    /// Containers that may take inline content directly (runs, breaks, links).
    pub fn is_inline_container(&self) -> bool {
        self.holds_text() || matches!(self, NodeKind::Link { .. })
    }

    /// Composite kinds that vanish once emptied by marker removal. Table
    /// structure is never pruned.
    fn is_prunable(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading(_)
                | NodeKind::Blockquote
                | NodeKind::List { .. }
                | NodeKind::ListItem
                | NodeKind::Link { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    marker: Option<PatternMatch>,
    anchor: Option<AnchorId>,
    span: Option<Range<usize>>,
    removed: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            text: String::new(),
            parent: None,
            children: Vec::new(),
            marker: None,
            anchor: None,
            span: None,
            removed: false,
        }
    }
}

/// A mutable document tree stored as an arena of nodes.
///
/// Composite nodes own ordered children; leaves carry text. Any node may be
/// tagged with a scanned [`PatternMatch`] (a marker) or an [`AnchorId`]
/// (an insertion point).
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node::new(NodeKind::Root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    // ----- Node creation -----

    /// Create a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_run(&mut self, text: impl Into<String>, style: RunStyle) -> NodeId {
        let id = self.create(NodeKind::Run(style));
        self.nodes[id.0].text = text.into();
        id
    }

    /// Append a new node of `kind` as the last child of `parent`.
    pub fn append_new(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.create(kind);
        self.append(parent, id);
        id
    }

    // ----- Accessors -----

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.0].kind = kind;
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].text
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.nodes[id.0].text = text.into();
    }

    pub fn style(&self, id: NodeId) -> Option<RunStyle> {
        match self.nodes[id.0].kind {
            NodeKind::Run(style) => Some(style),
            _ => None,
        }
    }

    pub fn set_style(&mut self, id: NodeId, style: RunStyle) {
        if let NodeKind::Run(current) = &mut self.nodes[id.0].kind {
            *current = style;
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn span(&self, id: NodeId) -> Option<Range<usize>> {
        self.nodes[id.0].span.clone()
    }

    pub fn set_span(&mut self, id: NodeId, span: Range<usize>) {
        self.nodes[id.0].span = Some(span);
    }

    pub fn marker(&self, id: NodeId) -> Option<&PatternMatch> {
        self.nodes[id.0].marker.as_ref()
    }

    pub fn set_marker(&mut self, id: NodeId, marker: PatternMatch) {
        self.nodes[id.0].marker = Some(marker);
    }

    pub fn take_marker(&mut self, id: NodeId) -> Option<PatternMatch> {
        self.nodes[id.0].marker.take()
    }

    pub fn anchor(&self, id: NodeId) -> Option<AnchorId> {
        self.nodes[id.0].anchor
    }

    pub fn set_anchor(&mut self, id: NodeId, anchor: AnchorId) {
        self.nodes[id.0].anchor = Some(anchor);
    }

    pub fn is_removed(&self, id: NodeId) -> bool {
        self.nodes[id.0].removed
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Ancestors of `id`, nearest first. Does not include `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    /// True if `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).last() == Some(&self.root)
    }

    /// Nearest node that has both `a` and `b` as (strict) descendants.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let of_a = self.ancestors(a);
        let of_b = self.ancestors(b);
        of_a.into_iter().find(|p| of_b.contains(p))
    }

    /// The child of `ancestor` on the path down to `node`.
    pub fn child_toward(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut cur = node;
        loop {
            let parent = self.parent(cur)?;
            if parent == ancestor {
                return Some(cur);
            }
            cur = parent;
        }
    }

    /// Nearest ancestor (or self) matching `pred`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        if pred(self.kind(id)) {
            return Some(id);
        }
        self.ancestors(id).into_iter().find(|&a| pred(self.kind(a)))
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Concatenated leaf text below `id`.
    pub fn plain_text(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter(|&n| matches!(self.kind(n), NodeKind::Run(_)))
            .map(|n| self.text(n))
            .collect()
    }

    // ----- Structural edits -----

    /// Attach a detached node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) {
        self.insert_relative(sibling, node, 0);
    }

    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        self.insert_relative(sibling, node, 1);
    }

    fn insert_relative(&mut self, sibling: NodeId, node: NodeId, offset: usize) {
        self.detach(node);
        let Some(parent) = self.parent(sibling) else {
            return;
        };
        let idx = self.index_in_parent(sibling).unwrap_or(0) + offset;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx, node);
    }

    /// Unlink `id` from its parent. The subtree stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Detach `id` and tombstone its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
        for n in self.descendants(id) {
            self.nodes[n.0].removed = true;
        }
    }

    /// Copy `id` and its subtree, markers and anchors included. The copy is
    /// detached.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let src = self.nodes[id.0].clone();
        let copy = self.create(src.kind);
        {
            let node = &mut self.nodes[copy.0];
            node.text = src.text;
            node.marker = src.marker;
            node.anchor = src.anchor;
            node.span = src.span;
        }
        for child in src.children {
            let c = self.deep_clone(child);
            self.append(copy, c);
        }
        copy
    }

    /// New detached node of the same kind and span, without children or tags.
    fn shallow_copy(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let span = self.nodes[id.0].span.clone();
        let copy = self.create(kind);
        self.nodes[copy.0].span = span;
        copy
    }

    /// Split a run at byte offset `at`; the tail becomes a new run inserted
    /// right after it with the same style. Returns the tail.
    pub fn split_run(&mut self, run: NodeId, at: usize) -> NodeId {
        let tail_text = self.nodes[run.0].text.split_off(at);
        let tail = self.shallow_copy(run);
        self.nodes[tail.0].text = tail_text;
        self.insert_after(run, tail);
        tail
    }

    /// Split every composite between `at` and `upto` (inclusive) so that the
    /// content following `at` moves into fresh right-hand siblings. The
    /// right-hand copy of `upto` is inserted directly after it and returned.
    ///
    /// With `keep_left` the node `at` itself stays on the left side; otherwise
    /// it moves to the right. Returns `None` if `upto` is not an ancestor of
    /// `at` or has no parent.
    pub fn split_at(&mut self, upto: NodeId, at: NodeId, keep_left: bool) -> Option<NodeId> {
        self.parent(upto)?;
        let mut cur = at;
        let mut carried: Option<NodeId> = None;
        loop {
            let parent = self.parent(cur)?;
            let idx = self.index_in_parent(cur)?;
            let cut = if carried.is_none() && !keep_left {
                idx
            } else {
                idx + 1
            };
            let tail = self.nodes[parent.0].children.split_off(cut);
            let right = self.shallow_copy(parent);
            if let Some(c) = carried {
                self.append(right, c);
            }
            for t in tail {
                self.nodes[t.0].parent = Some(right);
                self.nodes[right.0].children.push(t);
            }
            if parent == upto {
                self.insert_after(upto, right);
                return Some(right);
            }
            carried = Some(right);
            cur = parent;
        }
    }

    /// Remove `id` if it is an empty prunable container, then repeat upward.
    /// Stops at `stop` (never removed).
    pub fn prune_empty(&mut self, id: NodeId, stop: Option<NodeId>) {
        let mut cur = Some(id);
        while let Some(node) = cur {
            if Some(node) == stop
                || !self.kind(node).is_prunable()
                || !self.children(node).is_empty()
            {
                break;
            }
            cur = self.parent(node);
            self.remove(node);
        }
    }

    /// Remove every empty prunable container in the subtree of `id`, deepest
    /// first, `id` included.
    pub fn prune_tree(&mut self, id: NodeId) {
        for child in self.children(id).to_vec() {
            self.prune_tree(child);
        }
        if self.kind(id).is_prunable() && self.children(id).is_empty() {
            self.remove(id);
        }
    }

    /// Nodes under `roots` tagged with `anchor`.
    pub fn find_anchor(&self, roots: &[NodeId], anchor: AnchorId) -> Vec<NodeId> {
        roots
            .iter()
            .flat_map(|&r| self.descendants(r))
            .filter(|&n| self.anchor(n) == Some(anchor))
            .collect()
    }

    /// Every node in the live tree that still carries an anchor.
    pub fn live_anchors(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.anchor(n).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(doc: &mut Document, parts: &[&str]) -> (NodeId, Vec<NodeId>) {
        let p = doc.append_new(doc.root(), NodeKind::Paragraph);
        let runs = parts
            .iter()
            .map(|t| {
                let r = doc.create_run(*t, RunStyle::plain());
                doc.append(p, r);
                r
            })
            .collect();
        (p, runs)
    }

    #[test]
    fn split_keeps_all_children() {
        let mut doc = Document::new();
        let (p, runs) = paragraph(&mut doc, &["a", "b", "c", "d"]);
        let right = doc.split_at(p, runs[1], true).unwrap();
        assert_eq!(doc.children(p), &runs[..2]);
        assert_eq!(doc.children(right), &runs[2..]);
        assert_eq!(doc.children(doc.root()), &[p, right]);
    }

    #[test]
    fn split_before_moves_node_right() {
        let mut doc = Document::new();
        let (p, runs) = paragraph(&mut doc, &["a", "b", "c"]);
        let right = doc.split_at(p, runs[1], false).unwrap();
        assert_eq!(doc.children(p), &runs[..1]);
        assert_eq!(doc.children(right), &runs[1..]);
    }

    #[test]
    fn nested_split_carries_right_halves() {
        let mut doc = Document::new();
        let list = doc.append_new(doc.root(), NodeKind::List { start: None });
        let item = doc.append_new(list, NodeKind::ListItem);
        let p = doc.append_new(item, NodeKind::Paragraph);
        let a = doc.create_run("a", RunStyle::plain());
        let b = doc.create_run("b", RunStyle::plain());
        doc.append(p, a);
        doc.append(p, b);
        let right = doc.split_at(list, a, true).unwrap();
        assert_eq!(doc.plain_text(list), "a");
        assert_eq!(doc.plain_text(right), "b");
        assert_eq!(doc.kind(right), &NodeKind::List { start: None });
    }

    #[test]
    fn deep_clone_is_detached_and_equal() {
        let mut doc = Document::new();
        let (p, _) = paragraph(&mut doc, &["x", "y"]);
        let copy = doc.deep_clone(p);
        assert_eq!(doc.parent(copy), None);
        assert_eq!(doc.plain_text(copy), "xy");
        assert_ne!(doc.children(copy), doc.children(p));
    }

    #[test]
    fn split_run_preserves_style() {
        let mut doc = Document::new();
        let p = doc.append_new(doc.root(), NodeKind::Paragraph);
        let strong = RunStyle {
            strong: true,
            ..RunStyle::default()
        };
        let r = doc.create_run("hello", strong);
        doc.append(p, r);
        let tail = doc.split_run(r, 2);
        assert_eq!(doc.text(r), "he");
        assert_eq!(doc.text(tail), "llo");
        assert_eq!(doc.style(tail), Some(strong));
    }

    #[test]
    fn prune_stops_at_table_cells() {
        let mut doc = Document::new();
        let table = doc.append_new(doc.root(), NodeKind::Table);
        let row = doc.append_new(table, NodeKind::TableRow { header: false });
        let cell = doc.append_new(row, NodeKind::TableCell);
        let r = doc.create_run("x", RunStyle::plain());
        doc.append(cell, r);
        doc.remove(r);
        doc.prune_empty(cell, None);
        assert!(doc.is_attached(cell));
    }

    #[test]
    fn closest_finds_the_enclosing_row() {
        let mut doc = Document::new();
        let table = doc.append_new(doc.root(), NodeKind::Table);
        let row = doc.append_new(table, NodeKind::TableRow { header: false });
        let cell = doc.append_new(row, NodeKind::TableCell);
        let r = doc.create_run("x", RunStyle::plain());
        doc.append(cell, r);
        let is_row = |k: &NodeKind| matches!(k, NodeKind::TableRow { .. });
        assert_eq!(doc.closest(r, is_row), Some(row));
        assert_eq!(doc.closest(row, is_row), Some(row));
        assert_eq!(doc.closest(table, is_row), None);
    }
}
