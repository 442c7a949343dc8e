//! Block expansion. Every block clones its stored content in at its
//! insertion point, substitutes variables in the copy and then expands its
//! children inside that copy.

mod branch;
mod keyword;
mod loops;
mod table;

use docweave::block::{Block, BlockKind};
use docweave::document::NodeId;
use docweave::parser::TemplateError;
use tracing::debug;

use crate::engine::ExpandContext;
use crate::error::{DiagnosticError, ExpandError};

/// Expand `block` at its insertion point, which must sit under `roots`.
/// The insertion point is removed afterwards whatever the outcome.
pub(crate) fn expand(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    roots: &[NodeId],
) -> Result<(), DiagnosticError> {
    let anchor = locate(ctx, block, roots)?;
    debug!(kind = block.kind.name(), anchor = %block.anchor, label = %block.label, "expand");

    let result = match &block.kind {
        BlockKind::Loop { path } => loops::expand_loop(ctx, block, anchor, path),
        BlockKind::RangeLoop { index, count } => {
            loops::expand_range(ctx, block, anchor, index, count)
        }
        BlockKind::Separator => loops::expand_separator(ctx, block, anchor),
        BlockKind::Conditional { condition } => {
            branch::expand_conditional(ctx, block, anchor, condition)
        }
        BlockKind::Switch { expr } => branch::expand_switch(ctx, block, anchor, expr),
        BlockKind::Branch(_) | BlockKind::Case { .. } | BlockKind::Default => {
            render(ctx, block, anchor)
        }
        BlockKind::DynamicTable { path } => table::expand_table(ctx, block, anchor, path),
        BlockKind::InlineKeyWord(keyword) => keyword::expand_keyword(ctx, *keyword, anchor),
        BlockKind::Ignore => keyword::expand_ignore(ctx, block, anchor),
    };

    if let Err(error) = result {
        ctx.fail_block(anchor, error)?;
    }
    remove_anchor(ctx, anchor);
    Ok(())
}

/// Base behaviour: insert a copy of the content, fill it in, recurse.
pub(super) fn render(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
) -> Result<(), DiagnosticError> {
    let clones = insert_content(ctx, block, anchor);
    ctx.substitute(&clones)?;
    for child in &block.children {
        expand(ctx, child, &clones)?;
    }
    Ok(())
}

/// Clone the content of `block` directly after `anchor`, in document order.
pub(super) fn insert_content(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
) -> Vec<NodeId> {
    let clones: Vec<NodeId> = block
        .content
        .iter()
        .map(|&node| ctx.doc.deep_clone(node))
        .collect();
    for &clone in clones.iter().rev() {
        ctx.doc.insert_after(anchor, clone);
    }
    clones
}

/// Drop the insertion point of a block that is not rendered.
pub(super) fn discard(ctx: &mut ExpandContext<'_>, block: &Block, roots: &[NodeId]) {
    for anchor in live_anchors(ctx, block, roots) {
        remove_anchor(ctx, anchor);
    }
}

pub(super) fn has_anchor(ctx: &ExpandContext<'_>, block: &Block, roots: &[NodeId]) -> bool {
    !live_anchors(ctx, block, roots).is_empty()
}

/// Attach the block's source span to an expansion error.
pub(super) fn located(
    block: &Block,
    source_id: usize,
) -> impl Fn(ExpandError) -> DiagnosticError + '_ {
    move |error| DiagnosticError::new(error, block.span.clone(), source_id)
}

fn live_anchors(ctx: &ExpandContext<'_>, block: &Block, roots: &[NodeId]) -> Vec<NodeId> {
    ctx.doc
        .find_anchor(roots, block.anchor)
        .into_iter()
        .filter(|&n| !ctx.doc.is_removed(n))
        .collect()
}

fn locate(
    ctx: &ExpandContext<'_>,
    block: &Block,
    roots: &[NodeId],
) -> Result<NodeId, DiagnosticError> {
    match live_anchors(ctx, block, roots).as_slice() {
        [one] => Ok(*one),
        found => {
            let error = TemplateError::InsertionPoint {
                anchor: block.anchor.to_string(),
                reason: format!("found {} times under its parent, expected once", found.len()),
            };
            Err(ctx.fatal(error.into(), block.span.clone()))
        }
    }
}

fn remove_anchor(ctx: &mut ExpandContext<'_>, anchor: NodeId) {
    let parent = ctx.doc.parent(anchor);
    ctx.doc.remove(anchor);
    if let Some(parent) = parent {
        let root = ctx.doc.root();
        ctx.doc.prune_empty(parent, Some(root));
    }
}
