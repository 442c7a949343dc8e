use std::ops::Range;

use tracing::debug;

use crate::block::{Block, BlockKind, BlockTree, BranchKind};
use crate::context::{AnchorId, IdGenerator};
use crate::document::{Document, NodeId, NodeKind};
use crate::parser::error::{ParseError, TemplateError};
use crate::pattern::{Keyword, Markup};

const DYNAMIC_TABLE_FORMATTER: &str = "dyntable";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Turn the tagged markers of `doc` into a block tree. Each block's content
/// is detached from the document and replaced by an insertion point.
///
/// Every structural marker is gone from the document afterwards; variable
/// markers stay in place (inside block content or in the body).
pub fn build(
    doc: &mut Document,
    ids: &mut IdGenerator,
    file_id: usize,
) -> Result<BlockTree, ParseError> {
    let markers: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.marker(n).is_some())
        .collect();

    let mut state = BuildState {
        doc,
        ids,
        block_stack: vec![BlockBuilder::root()],
    };

    for node in markers {
        state
            .process_marker(node)
            .map_err(|e| ParseError::new(e, state.doc.span(node), file_id))?;
    }

    state.finalize(file_id)
}

// ---------------------------------------------------------------------------
// Build state
// ---------------------------------------------------------------------------

struct BuildState<'a> {
    doc: &'a mut Document,
    ids: &'a mut IdGenerator,
    /// Blocks being built. Bottom = document body.
    block_stack: Vec<BlockBuilder>,
}

struct BlockBuilder {
    kind: Option<BlockKind>,
    start: Option<NodeId>,
    label: String,
    span: Option<Range<usize>>,
    children: Vec<Block>,
}

impl BlockBuilder {
    fn root() -> Self {
        BlockBuilder {
            kind: None,
            start: None,
            label: String::new(),
            span: None,
            children: Vec::new(),
        }
    }

    fn open(kind: BlockKind, start: NodeId, doc: &Document) -> Self {
        BlockBuilder {
            kind: Some(kind),
            start: Some(start),
            label: doc.marker(start).map(|m| m.raw.clone()).unwrap_or_default(),
            span: doc.span(start),
            children: Vec::new(),
        }
    }

    fn is(&self, pred: impl Fn(&BlockKind) -> bool) -> bool {
        self.kind.as_ref().is_some_and(pred)
    }
}

impl<'a> BuildState<'a> {
    fn top(&self) -> &BlockBuilder {
        // The root builder is never popped.
        &self.block_stack[self.block_stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut BlockBuilder {
        let last = self.block_stack.len() - 1;
        &mut self.block_stack[last]
    }

    fn pop(&mut self, marker: NodeId) -> Result<BlockBuilder, TemplateError> {
        if self.block_stack.len() <= 1 {
            return Err(TemplateError::MissingStart {
                marker: self.raw(marker),
            });
        }
        self.block_stack
            .pop()
            .ok_or_else(|| TemplateError::MissingStart {
                marker: self.raw(marker),
            })
    }

    fn raw(&self, node: NodeId) -> String {
        self.doc.marker(node).map(|m| m.raw.clone()).unwrap_or_default()
    }

    fn push(&mut self, kind: BlockKind, start: NodeId) {
        let builder = BlockBuilder::open(kind, start, self.doc);
        self.block_stack.push(builder);
    }

    fn process_marker(&mut self, node: NodeId) -> Result<(), TemplateError> {
        let Some(marker) = self.doc.marker(node).cloned() else {
            return Ok(());
        };

        if !self.doc.is_attached(node) {
            // Swept into a table-row unit of an earlier block.
            if marker.is_structural() {
                return Err(TemplateError::MisplacedMarker {
                    marker: marker.raw,
                    reason: "shares a table row with the end of an enclosing block".into(),
                });
            }
            return Ok(());
        }

        // Inside an ignore block everything but its own close is literal text.
        if self.top().is(|k| matches!(k, BlockKind::Ignore))
            && !matches!(marker.markup, Markup::CollectionEnd(None))
        {
            self.doc.take_marker(node);
            return Ok(());
        }

        match marker.markup {
            Markup::Variable { .. } => {}

            Markup::InlineKeyWord(name) => {
                let keyword =
                    Keyword::from_name(&name).ok_or(TemplateError::UnknownKeyword(name))?;
                let anchor = self.ids.next_anchor();
                self.doc.take_marker(node);
                self.doc.set_kind(node, NodeKind::Anchor);
                self.doc.set_text(node, "");
                self.doc.set_anchor(node, anchor);
                let block = Block {
                    kind: BlockKind::InlineKeyWord(keyword),
                    content: Vec::new(),
                    anchor,
                    children: Vec::new(),
                    label: marker.raw,
                    span: self.doc.span(node),
                };
                self.top_mut().children.push(block);
            }

            Markup::CollectionStart { path, formatter } => {
                let dynamic = formatter
                    .as_ref()
                    .is_some_and(|f| f.name.eq_ignore_ascii_case(DYNAMIC_TABLE_FORMATTER));
                let kind = if dynamic {
                    BlockKind::DynamicTable { path }
                } else {
                    BlockKind::Loop { path }
                };
                self.push(kind, node);
            }

            Markup::RangeStart { index, count } => {
                self.push(BlockKind::RangeLoop { index, count }, node);
            }

            Markup::IgnoreStart => self.push(BlockKind::Ignore, node),

            Markup::SwitchStart(expr) => self.push(BlockKind::Switch { expr }, node),

            Markup::CaseStart(value) => {
                self.require_switch(node)?;
                self.push(BlockKind::Case { value }, node);
            }

            Markup::DefaultStart => {
                self.require_switch(node)?;
                self.push(BlockKind::Default, node);
            }

            Markup::Condition(condition) => {
                self.push(BlockKind::Conditional { condition }, node);
                self.push(BlockKind::Branch(BranchKind::Then), node);
            }

            Markup::ConditionElse => {
                if !self
                    .top()
                    .is(|k| matches!(k, BlockKind::Branch(BranchKind::Then)))
                {
                    return Err(TemplateError::ElseOutsideCondition { marker: marker.raw });
                }
                let then = self.pop(node)?;
                let block = self.close(then, node, &[], true)?;
                self.top_mut().children.push(block);
                self.push(BlockKind::Branch(BranchKind::Else), node);
            }

            Markup::CollectionSeparator => {
                if !self.top().is(|k| matches!(k, BlockKind::Loop { .. })) {
                    return Err(TemplateError::SeparatorOutsideLoop { marker: marker.raw });
                }
                let mut lp = self.pop(node)?;
                let Some(start) = lp.start else {
                    return Err(TemplateError::MissingStart { marker: marker.raw });
                };
                let body = if self.splits_row(start, node) {
                    // The loop repeats the whole row, so the body stays put.
                    let anchor = self.place_anchor(start);
                    Block {
                        kind: BlockKind::Branch(BranchKind::Body),
                        content: Vec::new(),
                        anchor,
                        children: Vec::new(),
                        label: lp.label.clone(),
                        span: lp.span.clone(),
                    }
                } else {
                    let body = BlockBuilder {
                        kind: Some(BlockKind::Branch(BranchKind::Body)),
                        start: lp.start,
                        label: lp.label.clone(),
                        span: lp.span.clone(),
                        children: std::mem::take(&mut lp.children),
                    };
                    self.close(body, node, &[], true)?
                };
                lp.children.push(body);
                self.block_stack.push(lp);
                self.push(BlockKind::Separator, node);
            }

            Markup::CollectionEnd(name) => self.process_end(node, name, &marker.raw)?,
        }

        Ok(())
    }

    fn require_switch(&self, node: NodeId) -> Result<(), TemplateError> {
        if self.top().is(|k| matches!(k, BlockKind::Switch { .. })) {
            Ok(())
        } else {
            Err(TemplateError::CaseOutsideSwitch {
                marker: self.raw(node),
            })
        }
    }

    fn process_end(
        &mut self,
        node: NodeId,
        name: Option<String>,
        raw: &str,
    ) -> Result<(), TemplateError> {
        let top = self.pop(node)?;

        // Two-level closes: a branch closes its condition, a separator its loop.
        let wraps_parent = top.is(|k| {
            matches!(
                k,
                BlockKind::Branch(BranchKind::Then | BranchKind::Else) | BlockKind::Separator
            )
        });

        if wraps_parent {
            let inner = self.close(top, node, &[], false)?;
            let outer = self.pop(node)?;
            check_close_name(&outer, name.as_deref(), raw)?;
            let mut outer = outer;
            outer.children.push(inner);
            let block = self.close(outer, node, &[], false)?;
            self.top_mut().children.push(block);
        } else {
            check_close_name(&top, name.as_deref(), raw)?;
            let block = self.close(top, node, &[], false)?;
            self.top_mut().children.push(block);
        }

        Ok(())
    }

    /// Finish `builder`, whose content runs up to the `end` marker. With
    /// `split`, `end` opens the next branch (`{{else}}`, `{{:s:}}`) and is
    /// left where it is.
    fn close(
        &mut self,
        builder: BlockBuilder,
        end: NodeId,
        keep: &[NodeId],
        split: bool,
    ) -> Result<Block, TemplateError> {
        let (Some(kind), Some(start)) = (builder.kind, builder.start) else {
            return Err(TemplateError::MissingStart {
                marker: self.raw(end),
            });
        };

        // A branch shares its start marker with the block it belongs to.
        let mut keep: Vec<NodeId> = keep.to_vec();
        keep.extend(
            self.block_stack
                .iter()
                .filter_map(|b| b.start)
                .filter(|&s| s != start),
        );

        let anchor = self.ids.next_anchor();
        let content = if self.doc.is_attached(start) && self.doc.is_attached(end) {
            self.extract(start, end, anchor, &keep, &builder.label, split)?
        } else {
            // Both markers went with rows taken by the branches.
            let rows = self.branch_rows(&builder.children).ok_or_else(|| {
                TemplateError::MisplacedMarker {
                    marker: builder.label.clone(),
                    reason: "spans table cells, but its branches do not each cover whole rows"
                        .into(),
                }
            })?;
            self.extract_rows(rows, anchor)
        };
        debug!(kind = kind.name(), label = %builder.label, nodes = content.len(), "closed block");

        Ok(Block {
            kind,
            content,
            anchor,
            children: builder.children,
            label: builder.label,
            span: builder.span,
        })
    }

    // ------------------------------------------------------------------
    // Content extraction
    // ------------------------------------------------------------------

    /// Detach everything strictly between `start` and `end` and put an
    /// insertion point tagged `anchor` where it was.
    fn extract(
        &mut self,
        start: NodeId,
        end: NodeId,
        anchor: AnchorId,
        keep: &[NodeId],
        label: &str,
        split: bool,
    ) -> Result<Vec<NodeId>, TemplateError> {
        let misplaced = |reason: &str| TemplateError::MisplacedMarker {
            marker: label.to_string(),
            reason: reason.to_string(),
        };
        if !self.doc.is_attached(start) || !self.doc.is_attached(end) {
            return Err(misplaced("was moved into a table row of another block"));
        }
        let ancestor = self
            .doc
            .common_ancestor(start, end)
            .ok_or_else(|| misplaced("has no common parent with its close marker"))?;

        let content = match self.row_unit(ancestor, start, end) {
            Some(mut rows) => {
                if split {
                    // The row holding the next branch marker belongs to that branch.
                    let next = self.row_of(end);
                    rows.retain(|&r| Some(r) != next);
                    if rows.is_empty() {
                        return Err(misplaced(
                            "spans table cells, so {{else}} or {{:s:}} must start a new row",
                        ));
                    }
                }
                self.extract_rows(rows, anchor)
            }
            None => self.extract_between(ancestor, start, end, anchor)?,
        };

        self.strip_markers(content, keep, label)
    }

    /// Rows forming the repeated unit when the markers meet inside a table.
    fn row_unit(&self, ancestor: NodeId, start: NodeId, end: NodeId) -> Option<Vec<NodeId>> {
        match self.doc.kind(ancestor) {
            NodeKind::TableRow { .. } => Some(vec![ancestor]),
            NodeKind::Table => {
                let first = self.doc.child_toward(ancestor, start)?;
                let last = self.doc.child_toward(ancestor, end)?;
                let rows = self.doc.children(ancestor);
                let i = rows.iter().position(|&r| r == first)?;
                let j = rows.iter().position(|&r| r == last)?;
                Some(rows[i..=j].to_vec())
            }
            _ => None,
        }
    }

    fn row_of(&self, node: NodeId) -> Option<NodeId> {
        self.doc.closest(node, |k| matches!(k, NodeKind::TableRow { .. }))
    }

    /// True when `a` and `b` sit in different cells of one table row.
    fn splits_row(&self, a: NodeId, b: NodeId) -> bool {
        let cell = |n: NodeId| self.doc.closest(n, |k| matches!(k, NodeKind::TableCell));
        let row = self.row_of(a);
        row.is_some() && row == self.row_of(b) && cell(a) != cell(b)
    }

    /// An insertion point right after `node`, with no content of its own.
    fn place_anchor(&mut self, node: NodeId) -> AnchorId {
        let anchor = self.ids.next_anchor();
        let placeholder = self.doc.create(NodeKind::Anchor);
        self.doc.set_anchor(placeholder, anchor);
        self.doc.insert_after(node, placeholder);
        anchor
    }

    /// The placeholder rows of `branches`, when every branch took whole rows
    /// and they sit side by side in one table.
    fn branch_rows(&self, branches: &[Block]) -> Option<Vec<NodeId>> {
        let mut rows = Vec::new();
        for branch in branches {
            if !matches!(branch.kind, BlockKind::Branch(_) | BlockKind::Separator) {
                return None;
            }
            let found = self.doc.find_anchor(&[self.doc.root()], branch.anchor);
            let [row] = found.as_slice() else {
                return None;
            };
            if !matches!(self.doc.kind(*row), NodeKind::TableRow { .. }) {
                return None;
            }
            rows.push(*row);
        }
        let first = *rows.first()?;
        let table = self.doc.parent(first)?;
        let at = self.doc.index_in_parent(first)?;
        let siblings = self.doc.children(table).get(at..at + rows.len())?;
        (siblings == rows.as_slice()).then_some(rows)
    }

    fn extract_rows(&mut self, rows: Vec<NodeId>, anchor: AnchorId) -> Vec<NodeId> {
        let placeholder = self.doc.create(NodeKind::TableRow { header: false });
        self.doc.set_anchor(placeholder, anchor);
        self.doc.insert_before(rows[0], placeholder);
        for &row in &rows {
            self.doc.detach(row);
        }
        rows
    }

    fn extract_between(
        &mut self,
        ancestor: NodeId,
        start: NodeId,
        end: NodeId,
        anchor: AnchorId,
    ) -> Result<Vec<NodeId>, TemplateError> {
        let invariant = |reason: &str| TemplateError::InsertionPoint {
            anchor: anchor.to_string(),
            reason: reason.to_string(),
        };

        let left = if self.doc.parent(start) == Some(ancestor) {
            start
        } else {
            let child = self
                .doc
                .child_toward(ancestor, start)
                .ok_or_else(|| invariant("start marker left its container"))?;
            self.doc
                .split_at(child, start, true)
                .ok_or_else(|| invariant("cannot split at start marker"))?;
            child
        };

        let right = if self.doc.parent(end) == Some(ancestor) {
            end
        } else {
            let child = self
                .doc
                .child_toward(ancestor, end)
                .ok_or_else(|| invariant("end marker left its container"))?;
            self.doc
                .split_at(child, end, false)
                .ok_or_else(|| invariant("cannot split at end marker"))?
        };

        let kids = self.doc.children(ancestor);
        let i = kids.iter().position(|&c| c == left);
        let j = kids.iter().position(|&c| c == right);
        let (Some(i), Some(j)) = (i, j) else {
            return Err(invariant("split lost a boundary"));
        };
        let content: Vec<NodeId> = kids[i + 1..j].to_vec();

        let placeholder = self.doc.create(NodeKind::Anchor);
        self.doc.set_anchor(placeholder, anchor);
        self.doc.insert_after(left, placeholder);
        for &node in &content {
            self.doc.detach(node);
        }
        Ok(content)
    }

    /// Remove spent structural markers from extracted content and drop
    /// containers they leave empty.
    fn strip_markers(
        &mut self,
        content: Vec<NodeId>,
        keep: &[NodeId],
        label: &str,
    ) -> Result<Vec<NodeId>, TemplateError> {
        for &root in &content {
            let spent: Vec<NodeId> = self
                .doc
                .descendants(root)
                .into_iter()
                .filter(|&n| self.doc.marker(n).is_some_and(|m| m.is_structural()))
                .collect();
            for marker in spent {
                if keep.contains(&marker) {
                    return Err(TemplateError::MisplacedMarker {
                        marker: self.raw(marker),
                        reason: format!("is swallowed by the table row of '{}'", label),
                    });
                }
                let parent = self.doc.parent(marker);
                self.doc.remove(marker);
                if let Some(parent) = parent {
                    self.doc.prune_empty(parent, None);
                }
            }
        }

        let mut kept = Vec::new();
        for node in content {
            if self.doc.is_removed(node) {
                continue;
            }
            self.doc.prune_tree(node);
            if !self.doc.is_removed(node) {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn finalize(self, file_id: usize) -> Result<BlockTree, ParseError> {
        let BuildState {
            doc,
            mut block_stack,
            ..
        } = self;

        if block_stack.len() > 1 {
            let open: Vec<&BlockBuilder> = block_stack[1..]
                .iter()
                .filter(|b| {
                    !b.is(|k| matches!(k, BlockKind::Branch(_) | BlockKind::Separator))
                })
                .collect();
            let span = open.first().and_then(|b| b.span.clone());
            let labels = open.iter().map(|b| b.label.clone()).collect();
            let mut err = ParseError::new(TemplateError::Unclosed(labels), span, file_id);
            for b in &open {
                err = err.with_note(format!(
                    "'{}' is never closed; close it with {{{{/}}}}",
                    b.label
                ));
            }
            return Err(err);
        }

        // Body-level boundary markers are spent now.
        let spent: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.marker(n).is_some_and(|m| m.is_structural()))
            .collect();
        let root = doc.root();
        for marker in spent {
            let parent = doc.parent(marker);
            doc.remove(marker);
            if let Some(parent) = parent {
                doc.prune_empty(parent, Some(root));
            }
        }

        let root_builder = block_stack.pop().unwrap_or_else(BlockBuilder::root);
        let tree = BlockTree {
            children: root_builder.children,
        };
        debug!(blocks = tree.count(), "built block tree");
        Ok(tree)
    }
}

fn check_close_name(
    builder: &BlockBuilder,
    name: Option<&str>,
    raw: &str,
) -> Result<(), TemplateError> {
    let Some(name) = name else { return Ok(()) };
    let matches = match &builder.kind {
        Some(BlockKind::Loop { path }) | Some(BlockKind::DynamicTable { path }) => path == name,
        Some(BlockKind::RangeLoop { index, count }) => index == name || count == name,
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(TemplateError::MismatchedClose {
            open: builder.label.clone(),
            close: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::read_markdown;
    use crate::isolation::isolate_document;

    fn build_source(source: &str) -> Result<(Document, BlockTree), ParseError> {
        let mut doc = read_markdown(source);
        let mut ids = IdGenerator::new();
        isolate_document(&mut doc, 0)?;
        let tree = build(&mut doc, &mut ids, 0)?;
        Ok((doc, tree))
    }

    fn error_of(source: &str) -> TemplateError {
        match build_source(source) {
            Ok(_) => panic!("expected an error for {:?}", source),
            Err(e) => e.error,
        }
    }

    #[test]
    fn paragraph_loop_leaves_one_insertion_point() {
        let (doc, tree) =
            build_source("Before\n\n{{#items}}\n\nItem {{name}}\n\n{{/items}}\n\nAfter\n").unwrap();
        assert_eq!(tree.children.len(), 1);
        let block = &tree.children[0];
        assert_eq!(block.kind, BlockKind::Loop { path: "items".into() });
        assert_eq!(block.content.len(), 1);
        assert_eq!(doc.plain_text(block.content[0]), "Item {{name}}");
        assert_eq!(doc.live_anchors().len(), 1);
        assert_eq!(doc.to_string(), "Before\n\nAfter\n");
    }

    #[test]
    fn inline_condition_with_else() {
        let (doc, tree) = build_source("Hi {?{vip}}friend{{else}}guest{{/}}!\n").unwrap();
        let cond = &tree.children[0];
        assert_eq!(
            cond.kind,
            BlockKind::Conditional {
                condition: "vip".into()
            }
        );
        let kinds: Vec<&BlockKind> = cond.children.iter().map(|b| &b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &BlockKind::Branch(BranchKind::Then),
                &BlockKind::Branch(BranchKind::Else)
            ]
        );
        assert_eq!(doc.plain_text(cond.children[0].content[0]), "friend");
        assert_eq!(doc.plain_text(cond.children[1].content[0]), "guest");
        assert_eq!(doc.to_string(), "Hi !\n");
    }

    #[test]
    fn separator_splits_loop_into_body_and_separator() {
        let (_, tree) = build_source("{{#tags}}{{name}}{{:s:}}, {{/}}\n").unwrap();
        let lp = &tree.children[0];
        let kinds: Vec<&str> = lp.children.iter().map(|b| b.kind.name()).collect();
        assert_eq!(kinds, vec!["body", "separator"]);
    }

    #[test]
    fn switch_with_cases_and_default() {
        let (_, tree) =
            build_source("{{#switch:kind}}{{#case:'a'}}A{{/}}{{#default}}other{{/}}{{/}}\n")
                .unwrap();
        let switch = &tree.children[0];
        assert_eq!(switch.kind, BlockKind::Switch { expr: "kind".into() });
        assert_eq!(switch.children.len(), 2);
        assert_eq!(
            switch.children[0].kind,
            BlockKind::Case {
                value: "'a'".into()
            }
        );
        assert_eq!(switch.children[1].kind, BlockKind::Default);
    }

    #[test]
    fn cells_in_one_row_repeat_the_row() {
        let source = "| Name | Qty |\n|---|---|\n| {{#rows}}{{name}} | {{qty}}{{/rows}} |\n";
        let (doc, tree) = build_source(source).unwrap();
        let block = &tree.children[0];
        assert_eq!(block.content.len(), 1);
        assert_eq!(
            doc.kind(block.content[0]),
            &NodeKind::TableRow { header: false }
        );
        let anchors = doc.live_anchors();
        assert_eq!(anchors.len(), 1);
        assert!(matches!(doc.kind(anchors[0]), NodeKind::TableRow { .. }));
    }

    #[test]
    fn condition_across_cells_takes_the_row() {
        let source = "| A | B |\n|---|---|\n| {?{show}}x | y{{/}} |\n";
        let (doc, tree) = build_source(source).unwrap();
        let cond = &tree.children[0];
        assert_eq!(cond.content.len(), 1);
        assert!(matches!(doc.kind(cond.content[0]), NodeKind::TableRow { .. }));
        assert_eq!(doc.anchor(cond.content[0]), Some(cond.children[0].anchor));

        let then = &cond.children[0];
        assert_eq!(then.kind, BlockKind::Branch(BranchKind::Then));
        assert_eq!(doc.plain_text(then.content[0]), "xy");
        assert_eq!(doc.live_anchors().len(), 1);
    }

    #[test]
    fn else_row_starts_the_else_branch() {
        let source = "| A | B |\n|---|---|\n| {?{paid}}Paid | yes |\n| {{else}}Due | no{{/}} |\n";
        let (doc, tree) = build_source(source).unwrap();
        let cond = &tree.children[0];
        assert_eq!(cond.content.len(), 2);
        let text: Vec<String> = cond
            .children
            .iter()
            .map(|b| doc.plain_text(b.content[0]))
            .collect();
        assert_eq!(text, vec!["Paidyes", "Dueno"]);
    }

    #[test]
    fn else_sharing_a_spanning_row_is_misplaced() {
        let source = "| A | B |\n|---|---|\n| {?{show}}x | y{{else}}z{{/}} |\n";
        assert!(matches!(
            error_of(source),
            TemplateError::MisplacedMarker { .. }
        ));
    }

    #[test]
    fn separator_loop_across_cells_keeps_body_in_the_row() {
        let source = "| A | B |\n|---|---|\n| {{#items}}{{.}} | {{:s:}}-{{/}} |\n";
        let (doc, tree) = build_source(source).unwrap();
        let lp = &tree.children[0];
        assert!(matches!(doc.kind(lp.content[0]), NodeKind::TableRow { .. }));
        let kinds: Vec<&str> = lp.children.iter().map(|b| b.kind.name()).collect();
        assert_eq!(kinds, vec!["body", "separator"]);
        assert!(lp.children[0].content.is_empty());
        assert_eq!(doc.plain_text(lp.children[1].content[0]), "-");
    }

    #[test]
    fn ignore_keeps_markup_literal() {
        let (doc, tree) = build_source("{{#ignore}}{{name}} {{#x}}{{/ignore}}\n").unwrap();
        let block = &tree.children[0];
        assert_eq!(block.kind, BlockKind::Ignore);
        let text: String = block.content.iter().map(|&n| doc.plain_text(n)).collect();
        assert_eq!(text, "{{name}} {{#x}}");
        assert!(
            block
                .content
                .iter()
                .flat_map(|&n| doc.descendants(n))
                .all(|n| doc.marker(n).is_none())
        );
    }

    #[test]
    fn keyword_becomes_its_own_anchor() {
        let (doc, tree) = build_source("a{{:pageBreak}}b\n").unwrap();
        let block = &tree.children[0];
        assert_eq!(block.kind, BlockKind::InlineKeyWord(Keyword::PageBreak));
        let anchors = doc.live_anchors();
        assert_eq!(anchors.len(), 1);
        assert_eq!(doc.anchor(anchors[0]), Some(block.anchor));
    }

    #[test]
    fn structural_errors() {
        assert_eq!(
            error_of("{{#items}}x\n"),
            TemplateError::Unclosed(vec!["{{#items}}".into()])
        );
        assert!(matches!(error_of("x{{/}}\n"), TemplateError::MissingStart { .. }));
        assert!(matches!(
            error_of("{{#a}}x{{/b}}\n"),
            TemplateError::MismatchedClose { .. }
        ));
        assert!(matches!(
            error_of("x{{:s:}}y\n"),
            TemplateError::SeparatorOutsideLoop { .. }
        ));
        assert!(matches!(
            error_of("{{#case:1}}x{{/}}\n"),
            TemplateError::CaseOutsideSwitch { .. }
        ));
        assert!(matches!(
            error_of("x{{else}}y\n"),
            TemplateError::ElseOutsideCondition { .. }
        ));
        assert!(matches!(
            error_of("x{{:nope}}\n"),
            TemplateError::UnknownKeyword(_)
        ));
    }

    #[test]
    fn unclosed_lists_outermost_first() {
        let err = error_of("{{#a}}{?{b}}x\n");
        assert_eq!(
            err,
            TemplateError::Unclosed(vec!["{{#a}}".into(), "{?{b}}".into()])
        );
    }
}
