use std::fmt;

use crate::document::{BreakKind, Document, NodeId, NodeKind, RunStyle};

/// Markdown output. Blocks are separated by a blank line, adjacent runs of
/// the same style are merged and insertion points print nothing.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_blocks(self, self.root()))
    }
}

fn render_blocks(doc: &Document, parent: NodeId) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut loose: Vec<NodeId> = Vec::new();

    for &child in doc.children(parent) {
        match doc.kind(child) {
            NodeKind::Anchor => {}
            // Stray inline nodes at block level are gathered into one line.
            NodeKind::Run(_)
            | NodeKind::Break(BreakKind::Soft | BreakKind::Line)
            | NodeKind::Link { .. }
            | NodeKind::Image { .. } => {
                loose.push(child);
            }
            _ => {
                if !loose.is_empty() {
                    parts.push(render_inline_list(doc, &std::mem::take(&mut loose)) + "\n");
                }
                parts.push(render_block(doc, child));
            }
        }
    }
    if !loose.is_empty() {
        parts.push(render_inline_list(doc, &loose) + "\n");
    }

    parts.join("\n")
}

fn render_block(doc: &Document, id: NodeId) -> String {
    match doc.kind(id) {
        NodeKind::Root => render_blocks(doc, id),
        NodeKind::Paragraph => format!("{}\n", render_inlines(doc, id)),
        NodeKind::Heading(level) => {
            format!("{} {}\n", "#".repeat(*level as usize), render_inlines(doc, id))
        }
        NodeKind::CodeBlock { language } => {
            let mut out = String::from("```");
            if let Some(lang) = language {
                out.push_str(lang);
            }
            out.push('\n');
            let body: String = doc.children(id).iter().map(|&c| doc.text(c)).collect();
            out.push_str(&body);
            if !body.is_empty() && !body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
            out
        }
        NodeKind::Blockquote => {
            let inner = render_blocks(doc, id);
            let mut out = String::new();
            for line in inner.lines() {
                if line.is_empty() {
                    out.push_str(">\n");
                } else {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out
        }
        NodeKind::List { start } => render_list(doc, id, *start),
        NodeKind::ListItem => render_blocks(doc, id),
        NodeKind::Table => render_table(doc, id),
        NodeKind::TableRow { .. } => format!("{}\n", render_row(doc, id)),
        NodeKind::TableCell => format!("{}\n", render_inlines(doc, id)),
        NodeKind::Rule => "---\n".to_string(),
        NodeKind::Break(BreakKind::Page) => "<!-- pagebreak -->\n".to_string(),
        NodeKind::Break(BreakKind::Section) => "<!-- sectionbreak -->\n".to_string(),
        NodeKind::Anchor => String::new(),
        NodeKind::Run(_) | NodeKind::Break(_) | NodeKind::Link { .. } | NodeKind::Image { .. } => {
            format!("{}\n", render_inline_list(doc, &[id]))
        }
    }
}

fn render_list(doc: &Document, id: NodeId, start: Option<u64>) -> String {
    let mut out = String::new();
    let mut number = start.unwrap_or(1);
    for &item in doc.children(id) {
        if !matches!(doc.kind(item), NodeKind::ListItem) {
            continue;
        }
        let marker = match start {
            Some(_) => format!("{}. ", number),
            None => "- ".to_string(),
        };
        number += 1;
        let indent = " ".repeat(marker.len());

        let body = render_blocks(doc, item);
        let mut lines = body.lines();
        out.push_str(&marker);
        out.push_str(lines.next().unwrap_or(""));
        out.push('\n');
        for line in lines {
            if !line.is_empty() {
                out.push_str(&indent);
                out.push_str(line);
            }
            out.push('\n');
        }
    }
    out
}

fn render_table(doc: &Document, id: NodeId) -> String {
    let rows: Vec<NodeId> = doc
        .children(id)
        .iter()
        .copied()
        .filter(|&r| matches!(doc.kind(r), NodeKind::TableRow { .. }))
        .collect();
    let columns = rows
        .iter()
        .map(|&r| {
            doc.children(r)
                .iter()
                .filter(|&&c| matches!(doc.kind(c), NodeKind::TableCell))
                .count()
        })
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (n, &row) in rows.iter().enumerate() {
        out.push_str(&render_row(doc, row));
        out.push('\n');
        if n == 0 {
            out.push('|');
            for _ in 0..columns {
                out.push_str("---|");
            }
            out.push('\n');
        }
    }
    out
}

fn render_row(doc: &Document, row: NodeId) -> String {
    let mut out = String::from("|");
    for &cell in doc.children(row) {
        if !matches!(doc.kind(cell), NodeKind::TableCell) {
            continue;
        }
        let text = render_inlines(doc, cell).replace('\n', " ").replace('|', "\\|");
        out.push(' ');
        out.push_str(&text);
        out.push_str(" |");
    }
    out
}

// ---------------------------------------------------------------------------
// Inline output
// ---------------------------------------------------------------------------

fn render_inlines(doc: &Document, parent: NodeId) -> String {
    render_inline_list(doc, doc.children(parent))
}

fn render_inline_list(doc: &Document, nodes: &[NodeId]) -> String {
    let mut out = String::new();
    let mut pending: Option<(RunStyle, String)> = None;

    for &node in nodes {
        if let NodeKind::Run(style) = doc.kind(node) {
            match &mut pending {
                Some((current, text)) if *current == *style => text.push_str(doc.text(node)),
                _ => {
                    if let Some((s, text)) = pending.take() {
                        push_run(&mut out, s, &text);
                    }
                    pending = Some((*style, doc.text(node).to_string()));
                }
            }
            continue;
        }
        if let Some((s, text)) = pending.take() {
            push_run(&mut out, s, &text);
        }
        render_inline_node(doc, node, &mut out);
    }
    if let Some((s, text)) = pending {
        push_run(&mut out, s, &text);
    }
    out
}

fn render_inline_node(doc: &Document, node: NodeId, out: &mut String) {
    match doc.kind(node) {
        NodeKind::Run(style) => push_run(out, *style, doc.text(node)),
        NodeKind::Break(BreakKind::Soft) => out.push('\n'),
        NodeKind::Break(BreakKind::Line) => out.push_str("\\\n"),
        NodeKind::Break(BreakKind::Page) => out.push_str("<!-- pagebreak -->"),
        NodeKind::Break(BreakKind::Section) => out.push_str("<!-- sectionbreak -->"),
        NodeKind::Link { dest } => {
            out.push('[');
            out.push_str(&render_inlines(doc, node));
            out.push_str("](");
            out.push_str(dest);
            out.push(')');
        }
        NodeKind::Image { dest, title, alt } => {
            out.push_str("![");
            out.push_str(alt);
            out.push_str("](");
            out.push_str(dest);
            if !title.is_empty() {
                out.push_str(" \"");
                out.push_str(title);
                out.push('"');
            }
            out.push(')');
        }
        _ => {}
    }
}

/// Emit `text` wrapped in the delimiters of `style`. Surrounding whitespace
/// stays outside the delimiters.
fn push_run(out: &mut String, style: RunStyle, text: &str) {
    if text.is_empty() {
        return;
    }
    if style.code {
        out.push('`');
        out.push_str(text);
        out.push('`');
        return;
    }

    let trimmed = text.trim();
    if trimmed.is_empty() || style == RunStyle::plain() {
        out.push_str(text);
        return;
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];

    let mut open = String::new();
    if style.highlight {
        open.push_str("<mark>");
    }
    if style.strike {
        open.push_str("~~");
    }
    if style.strong {
        open.push_str("**");
    }
    if style.emphasis {
        open.push('*');
    }
    let mut close = String::new();
    if style.emphasis {
        close.push('*');
    }
    if style.strong {
        close.push_str("**");
    }
    if style.strike {
        close.push_str("~~");
    }
    if style.highlight {
        close.push_str("</mark>");
    }

    out.push_str(lead);
    out.push_str(&open);
    out.push_str(trimmed);
    out.push_str(&close);
    out.push_str(trail);
}
