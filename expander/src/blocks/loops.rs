use docweave::block::Block;
use docweave::document::NodeId;
use tracing::debug;

use super::{located, render};
use crate::engine::ExpandContext;
use crate::error::{DiagnosticError, ExpandError};
use crate::scope::{Frame, INDEX_VAR, LENGTH_VAR};
use crate::value::Value;

// Iterations run last to first. Each copy lands directly after the
// unchanged insertion point, so the finished output reads first to last.

pub(super) fn expand_loop(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    path: &str,
) -> Result<(), DiagnosticError> {
    let at = located(block, ctx.source_id);
    let items = match ctx.scope.lookup(path).map_err(&at)? {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(at(ExpandError::type_mismatch(
                path,
                "a collection",
                other.type_name(),
            )));
        }
    };

    let length = items.len();
    debug!(path, length, "loop");
    for (i, item) in items.into_iter().enumerate().rev() {
        let mut frame = ctx.enter(Frame::item(path, item, i + 1, length));
        render(&mut frame, block, anchor)?;
    }
    Ok(())
}

pub(super) fn expand_range(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    index: &str,
    count: &str,
) -> Result<(), DiagnosticError> {
    let at = located(block, ctx.source_id);
    let count = range_count(ctx, count).map_err(&at)?;
    debug!(index, count, "range");
    for i in (0..count.max(0)).rev() {
        let mut frame = ctx.enter(Frame::index(index, i));
        render(&mut frame, block, anchor)?;
    }
    Ok(())
}

/// An integer literal, or a model path holding a whole number, a numeric
/// string or a collection (its length).
fn range_count(ctx: &ExpandContext<'_>, count: &str) -> Result<i64, ExpandError> {
    let count = count.trim();
    if let Ok(n) = count.parse::<i64>() {
        return Ok(n);
    }
    let value = ctx.scope.lookup(count)?;
    match (&value, value.as_number()) {
        (Value::List(items), _) => Ok(items.len() as i64),
        (_, Some(n)) if n.is_finite() && n.fract() == 0.0 => Ok(n as i64),
        (other, Some(_)) => Err(ExpandError::type_mismatch(
            count,
            "an integer",
            &format!("{} {}", other.type_name(), other),
        )),
        (other, None) => Err(ExpandError::type_mismatch(count, "a count", other.type_name())),
    }
}

/// Renders between items, never after the last one.
pub(super) fn expand_separator(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
) -> Result<(), DiagnosticError> {
    let index = ctx.scope.get(INDEX_VAR).and_then(Value::as_number);
    let length = ctx.scope.get(LENGTH_VAR).and_then(Value::as_number);
    if index.is_some() && index == length {
        return Ok(());
    }
    render(ctx, block, anchor)
}
