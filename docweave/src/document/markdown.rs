use std::ops::Range;

use pulldown_cmark::{
    CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd,
};

use crate::document::{BreakKind, Document, NodeId, NodeKind, RunStyle};

const PAGE_BREAK_COMMENT: &str = "<!-- pagebreak -->";
const SECTION_BREAK_COMMENT: &str = "<!-- sectionbreak -->";

type Events<'e> = [(Event<'e>, Range<usize>)];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read Markdown source into a document tree. Inline formatting is
/// flattened into styled runs; every run keeps its source span.
pub(crate) fn read_markdown(source: &str) -> Document {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = CmarkParser::new_ext(source, options);
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut state = ReadState {
        doc: Document::new(),
        style: RunStyle::plain(),
    };
    let root = state.doc.root();
    let mut i = 0;
    state.collect(&events, &mut i, root, &|_| false);
    state.doc
}

// ---------------------------------------------------------------------------
// Read state
// ---------------------------------------------------------------------------

struct ReadState {
    doc: Document,
    /// Style applied to text events; toggled by emphasis tags and `<mark>`.
    style: RunStyle,
}

impl ReadState {
    /// Append nodes for events under `parent` until a matching End tag.
    fn collect(
        &mut self,
        events: &Events<'_>,
        i: &mut usize,
        parent: NodeId,
        is_end: &dyn Fn(&TagEnd) -> bool,
    ) {
        // Tight list items carry inline content without a paragraph.
        let mut implicit: Option<NodeId> = None;

        while *i < events.len() {
            let (ref ev, ref range) = events[*i];
            match ev {
                Event::End(tag_end) if is_end(tag_end) => {
                    *i += 1;
                    break;
                }

                // ----- Block level -----
                Event::Start(Tag::Paragraph) => {
                    implicit = None;
                    *i += 1;
                    let node = self.open(parent, NodeKind::Paragraph, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::Paragraph));
                }
                Event::Start(Tag::Heading { level, .. }) => {
                    implicit = None;
                    *i += 1;
                    let kind = NodeKind::Heading(heading_level_to_u8(level));
                    let node = self.open(parent, kind, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::Heading(_)));
                }
                Event::Start(Tag::BlockQuote(_)) => {
                    implicit = None;
                    *i += 1;
                    let node = self.open(parent, NodeKind::Blockquote, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::BlockQuote(_)));
                }
                Event::Start(Tag::List(start)) => {
                    implicit = None;
                    *i += 1;
                    let node = self.open(parent, NodeKind::List { start: *start }, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::List(_)));
                }
                Event::Start(Tag::Item) => {
                    *i += 1;
                    let node = self.open(parent, NodeKind::ListItem, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::Item));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    implicit = None;
                    let language = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                    *i += 1;
                    let node = self.open(parent, NodeKind::CodeBlock { language }, range);
                    let (content, span) = collect_text_until(events, i, |e| {
                        matches!(e, TagEnd::CodeBlock)
                    });
                    let run = self.doc.create_run(content, RunStyle::plain());
                    self.doc.set_span(run, span);
                    self.doc.append(node, run);
                }
                Event::Start(Tag::Table(_)) => {
                    implicit = None;
                    *i += 1;
                    let node = self.open(parent, NodeKind::Table, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::Table));
                }
                Event::Start(Tag::TableHead) => {
                    *i += 1;
                    let node = self.open(parent, NodeKind::TableRow { header: true }, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::TableHead));
                }
                Event::Start(Tag::TableRow) => {
                    *i += 1;
                    let node = self.open(parent, NodeKind::TableRow { header: false }, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::TableRow));
                }
                Event::Start(Tag::TableCell) => {
                    *i += 1;
                    let node = self.open(parent, NodeKind::TableCell, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::TableCell));
                }
                Event::Rule => {
                    implicit = None;
                    self.open(parent, NodeKind::Rule, range);
                    *i += 1;
                }
                Event::Html(html) => {
                    implicit = None;
                    match break_comment(html) {
                        Some(kind) => {
                            self.open(parent, NodeKind::Break(kind), range);
                        }
                        None => {
                            let p = self.open(parent, NodeKind::Paragraph, range);
                            let text = html.trim_end_matches('\n').to_string();
                            self.run(p, text, self.style, range);
                        }
                    }
                    *i += 1;
                }

                // ----- Inline level -----
                Event::Start(Tag::Strong) => {
                    *i += 1;
                    self.styled(events, i, parent, &mut implicit, range, |s| s.strong = true, |e| {
                        matches!(e, TagEnd::Strong)
                    });
                }
                Event::Start(Tag::Emphasis) => {
                    *i += 1;
                    let set = |s: &mut RunStyle| s.emphasis = true;
                    self.styled(events, i, parent, &mut implicit, range, set, |e| {
                        matches!(e, TagEnd::Emphasis)
                    });
                }
                Event::Start(Tag::Strikethrough) => {
                    *i += 1;
                    self.styled(events, i, parent, &mut implicit, range, |s| s.strike = true, |e| {
                        matches!(e, TagEnd::Strikethrough)
                    });
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    *i += 1;
                    let kind = NodeKind::Link {
                        dest: dest_url.to_string(),
                    };
                    let node = self.open(host, kind, range);
                    self.collect(events, i, node, &|e| matches!(e, TagEnd::Link));
                }
                Event::Start(Tag::Image { dest_url, title, .. }) => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    *i += 1;
                    let (alt, _) = collect_text_until(events, i, |e| matches!(e, TagEnd::Image));
                    let kind = NodeKind::Image {
                        dest: dest_url.to_string(),
                        title: title.to_string(),
                        alt,
                    };
                    self.open(host, kind, range);
                }
                Event::Text(s) => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    self.run(host, s.to_string(), self.style, range);
                    *i += 1;
                }
                Event::Code(s) => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    let style = RunStyle {
                        code: true,
                        ..self.style
                    };
                    self.run(host, s.to_string(), style, range);
                    *i += 1;
                }
                Event::SoftBreak => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    self.open(host, NodeKind::Break(BreakKind::Soft), range);
                    *i += 1;
                }
                Event::HardBreak => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    self.open(host, NodeKind::Break(BreakKind::Line), range);
                    *i += 1;
                }
                Event::InlineHtml(html) => {
                    let host = self.inline_parent(parent, &mut implicit, range);
                    match html.trim() {
                        "<mark>" => self.style.highlight = true,
                        "</mark>" => self.style.highlight = false,
                        other => match break_comment(other) {
                            Some(kind) => {
                                self.open(host, NodeKind::Break(kind), range);
                            }
                            None => self.run(host, html.to_string(), self.style, range),
                        },
                    }
                    *i += 1;
                }
                _ => {
                    *i += 1;
                }
            }
        }
    }

    /// Collect children under a temporarily extended style.
    #[allow(clippy::too_many_arguments)]
    fn styled(
        &mut self,
        events: &Events<'_>,
        i: &mut usize,
        parent: NodeId,
        implicit: &mut Option<NodeId>,
        range: &Range<usize>,
        apply: impl Fn(&mut RunStyle),
        is_end: impl Fn(&TagEnd) -> bool,
    ) {
        let host = self.inline_parent(parent, implicit, range);
        let saved = self.style;
        apply(&mut self.style);
        self.collect(events, i, host, &is_end);
        self.style = saved;
    }

    fn open(&mut self, parent: NodeId, kind: NodeKind, range: &Range<usize>) -> NodeId {
        let node = self.doc.append_new(parent, kind);
        self.doc.set_span(node, range.clone());
        node
    }

    fn run(&mut self, parent: NodeId, text: String, style: RunStyle, range: &Range<usize>) {
        let run = self.doc.create_run(text, style);
        self.doc.set_span(run, range.clone());
        self.doc.append(parent, run);
    }

    /// The node inline content goes into: `parent` itself when it takes
    /// inline children, otherwise an implicit paragraph.
    fn inline_parent(
        &mut self,
        parent: NodeId,
        implicit: &mut Option<NodeId>,
        range: &Range<usize>,
    ) -> NodeId {
        if self.doc.kind(parent).is_inline_container() {
            return parent;
        }
        match *implicit {
            Some(p) => p,
            None => {
                let p = self.open(parent, NodeKind::Paragraph, range);
                *implicit = Some(p);
                p
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn break_comment(html: &str) -> Option<BreakKind> {
    match html.trim() {
        PAGE_BREAK_COMMENT => Some(BreakKind::Page),
        SECTION_BREAK_COMMENT => Some(BreakKind::Section),
        _ => None,
    }
}

/// Collect all text content until a matching End tag, with the span it covers.
fn collect_text_until(
    events: &Events<'_>,
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> (String, Range<usize>) {
    let mut text = String::new();
    let mut span: Option<Range<usize>> = None;
    while *i < events.len() {
        let (ref ev, ref range) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Code(s) => {
                text.push_str(s);
                span = Some(match span {
                    Some(s) => s.start..range.end,
                    None => range.clone(),
                });
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    (text, span.unwrap_or(0..0))
}
