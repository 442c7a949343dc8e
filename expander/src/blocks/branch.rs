use docweave::block::{Block, BlockKind, BranchKind};
use docweave::document::NodeId;
use tracing::debug;

use super::{discard, expand, insert_content, located};
use crate::engine::ExpandContext;
use crate::error::DiagnosticError;
use crate::script::compile;

pub(super) fn expand_conditional(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    condition: &str,
) -> Result<(), DiagnosticError> {
    let at = located(block, ctx.source_id);
    let script = compile(condition, &ctx.scope).map_err(&at)?;
    let holds = script.test(&ctx.scope).map_err(&at)?;
    debug!(condition, holds, "condition");

    let wanted = if holds {
        BranchKind::Then
    } else {
        BranchKind::Else
    };
    let selected = block
        .children
        .iter()
        .position(|child| child.kind == BlockKind::Branch(wanted));
    render_selected(ctx, block, anchor, selected)
}

pub(super) fn expand_switch(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    expr: &str,
) -> Result<(), DiagnosticError> {
    let at = located(block, ctx.source_id);
    let subject = compile(expr, &ctx.scope)
        .and_then(|s| s.evaluate(&ctx.scope))
        .map_err(&at)?;

    // Evaluated fresh on every call: a switch inside a loop matches per item.
    let mut selected = None;
    for (i, child) in block.children.iter().enumerate() {
        if let BlockKind::Case { value } = &child.kind {
            let case = compile(value, &ctx.scope)
                .and_then(|s| s.evaluate(&ctx.scope))
                .map_err(located(child, ctx.source_id))?;
            if case == subject {
                selected = Some(i);
                break;
            }
        }
    }
    let selected = selected.or_else(|| {
        block
            .children
            .iter()
            .position(|child| child.kind == BlockKind::Default)
    });
    debug!(expr, subject = %subject, case = ?selected, "switch");
    render_selected(ctx, block, anchor, selected)
}

/// Insert the block's own content, expand the chosen child and drop the
/// insertion points of the others.
fn render_selected(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    selected: Option<usize>,
) -> Result<(), DiagnosticError> {
    let clones = insert_content(ctx, block, anchor);
    ctx.substitute(&clones)?;
    for (i, child) in block.children.iter().enumerate() {
        if Some(i) == selected {
            expand(ctx, child, &clones)?;
        } else {
            discard(ctx, child, &clones);
        }
    }
    Ok(())
}
