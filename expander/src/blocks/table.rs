use docweave::block::Block;
use docweave::document::{Document, NodeId, NodeKind};
use docweave::parser::TemplateError;
use docweave::pattern::Markup;
use tracing::debug;

use super::{expand, has_anchor, insert_content, located};
use crate::engine::ExpandContext;
use crate::error::{DiagnosticError, ExpandError};
use crate::scope::Frame;
use crate::value::Value;

const HEADER_VAR: &str = "Header";
const CELL_VAR: &str = "Cell";

/// Header texts and row values bound to a dynamic table.
struct TableData {
    headers: Vec<Value>,
    rows: Vec<Vec<Value>>,
}

impl TableData {
    /// A table value, or a map with a `headers` list and a `rows` list of
    /// lists.
    fn from_value(value: &Value) -> Option<TableData> {
        match value {
            Value::Table { headers, rows } => Some(TableData {
                headers: headers.iter().map(|h| Value::from(h.as_str())).collect(),
                rows: rows.clone(),
            }),
            Value::Map(map) => {
                let Value::List(headers) = map.get("headers")? else {
                    return None;
                };
                let Value::List(rows) = map.get("rows")? else {
                    return None;
                };
                let rows = rows
                    .iter()
                    .map(|row| match row {
                        Value::List(cells) => Some(cells.clone()),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(TableData {
                    headers: headers.clone(),
                    rows,
                })
            }
            _ => None,
        }
    }

    /// Every row is padded out to this many cells.
    fn width(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain([self.headers.len()])
            .max()
            .unwrap_or(0)
    }
}

pub(super) fn expand_table(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    anchor: NodeId,
    path: &str,
) -> Result<(), DiagnosticError> {
    let at = located(block, ctx.source_id);
    let value = ctx.scope.lookup(path).map_err(&at)?;
    let data = TableData::from_value(&value).ok_or_else(|| {
        at(ExpandError::type_mismatch(
            path,
            "a table with headers and rows",
            value.type_name(),
        ))
    })?;
    debug!(path, headers = data.headers.len(), rows = data.rows.len(), "dynamic table");

    let clones = insert_content(ctx, block, anchor);
    let tables: Vec<NodeId> = clones
        .iter()
        .flat_map(|&c| ctx.doc.descendants(c))
        .filter(|&n| matches!(ctx.doc.kind(n), NodeKind::Table))
        .collect();
    for table in tables {
        fill_table(ctx, block, table, &data)?;
    }
    let clones: Vec<NodeId> = clones
        .into_iter()
        .filter(|&c| !ctx.doc.is_removed(c))
        .collect();

    ctx.substitute(&clones)?;
    for child in &block.children {
        // Children inside the template cells were expanded per cell.
        if has_anchor(ctx, child, &clones) {
            expand(ctx, child, &clones)?;
        }
    }
    Ok(())
}

fn fill_table(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    table: NodeId,
    data: &TableData,
) -> Result<(), DiagnosticError> {
    if data.headers.is_empty() {
        ctx.doc.remove(table);
        return Ok(());
    }

    let misplaced = |reason: &str| {
        let error = TemplateError::MisplacedMarker {
            marker: block.label.clone(),
            reason: reason.to_string(),
        };
        DiagnosticError::new(error.into(), block.span.clone(), ctx.source_id)
    };
    let header_cell = template_cell(ctx.doc, table, HEADER_VAR)
        .ok_or_else(|| misplaced("needs a table cell holding {{Header}}"))?;
    let data_cell = template_cell(ctx.doc, table, CELL_VAR)
        .ok_or_else(|| misplaced("needs a table cell holding {{Cell}}"))?;
    let (Some(data_row), Some(position)) =
        (ctx.doc.parent(data_cell), ctx.doc.index_in_parent(data_cell))
    else {
        return Err(misplaced("has a data cell outside any row"));
    };
    if ctx.doc.parent(header_cell) == Some(data_row) {
        return Err(misplaced("needs {{Header}} and {{Cell}} in different rows"));
    }

    let width = data.width();
    fill_cells(ctx, block, header_cell, HEADER_VAR, &data.headers, width)?;

    for row in data.rows.iter().rev() {
        let copy = ctx.doc.deep_clone(data_row);
        ctx.doc.insert_after(data_row, copy);
        let cell = ctx.doc.children(copy)[position];
        fill_cells(ctx, block, cell, CELL_VAR, row, width)?;
    }
    ctx.doc.remove(data_row);
    Ok(())
}

/// Replace `template` with `width` filled copies. Cells past the end of
/// `values` are bound to null.
fn fill_cells(
    ctx: &mut ExpandContext<'_>,
    block: &Block,
    template: NodeId,
    name: &str,
    values: &[Value],
    width: usize,
) -> Result<(), DiagnosticError> {
    for j in (0..width).rev() {
        let value = values.get(j).cloned().unwrap_or(Value::Null);
        let cell = ctx.doc.deep_clone(template);
        ctx.doc.insert_after(template, cell);

        let mut frame = ctx.enter(Frame::item(name, value, j + 1, width));
        frame.substitute(&[cell])?;
        for child in &block.children {
            if has_anchor(&frame, child, &[cell]) {
                expand(&mut frame, child, &[cell])?;
            }
        }
    }
    ctx.doc.remove(template);
    Ok(())
}

/// First cell under `table` holding the variable `name`.
fn template_cell(doc: &Document, table: NodeId, name: &str) -> Option<NodeId> {
    doc.descendants(table)
        .into_iter()
        .filter(|&n| matches!(doc.kind(n), NodeKind::TableCell))
        .find(|&cell| {
            doc.descendants(cell).into_iter().any(|n| {
                doc.marker(n).is_some_and(|m| {
                    matches!(&m.markup, Markup::Variable { path, .. } if path == name)
                })
            })
        })
}
