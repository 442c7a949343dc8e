use docweave::block::Block;
use docweave::document::{BreakKind, NodeId, NodeKind};
use docweave::pattern::Keyword;

use super::insert_content;
use crate::engine::ExpandContext;
use crate::error::DiagnosticError;

pub(super) fn expand_keyword(
    ctx: &mut ExpandContext<'_>,
    keyword: Keyword,
    anchor: NodeId,
) -> Result<(), DiagnosticError> {
    let kind = match keyword {
        Keyword::Break => BreakKind::Line,
        Keyword::PageBreak => BreakKind::Page,
        Keyword::SectionBreak => BreakKind::Section,
    };
    let node = ctx.doc.create(NodeKind::Break(kind));
    ctx.doc.insert_before(anchor, node);
    Ok(())
}

/// Content goes back verbatim, markup and all.
pub(super) fn expand_ignore(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
) -> Result<(), DiagnosticError> {
    for clone in insert_content(ctx, block, anchor) {
        for node in ctx.doc.descendants(clone) {
            ctx.doc.take_marker(node);
        }
    }
    Ok(())
}
