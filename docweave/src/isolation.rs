use tracing::{debug, trace};

use crate::document::{BreakKind, Document, NodeId, NodeKind};
use crate::parser::error::{ParseError, TemplateError};
use crate::parser::scanner;
use crate::pattern::PatternMatch;

/// Flattened text of one container plus the origin of every byte.
#[derive(Debug, Clone)]
pub struct CharMap {
    text: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    node: NodeId,
    start: usize,
    end: usize,
    is_run: bool,
}

impl CharMap {
    /// Flatten the runs under `container` in document order. Links are
    /// descended into; breaks contribute a newline without a run.
    pub fn build(doc: &Document, container: NodeId) -> CharMap {
        let mut map = CharMap {
            text: String::new(),
            segments: Vec::new(),
        };
        map.collect(doc, container);
        map
    }

    fn collect(&mut self, doc: &Document, parent: NodeId) {
        for &child in doc.children(parent) {
            match doc.kind(child) {
                NodeKind::Run(_) => self.push(child, doc.text(child), true),
                NodeKind::Break(BreakKind::Soft | BreakKind::Line) => self.push(child, "\n", false),
                NodeKind::Link { .. } => self.collect(doc, child),
                _ => {}
            }
        }
    }

    fn push(&mut self, node: NodeId, text: &str, is_run: bool) {
        let start = self.text.len();
        self.text.push_str(text);
        self.segments.push(Segment {
            node,
            start,
            end: self.text.len(),
            is_run,
        });
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The node holding byte `offset` and the offset inside that node.
    pub fn locate(&self, offset: usize) -> Option<(NodeId, usize)> {
        self.segments
            .iter()
            .find(|s| s.start <= offset && offset < s.end)
            .map(|s| (s.node, offset - s.start))
    }

    fn spanning(&self, start: usize, end: usize) -> Vec<Segment> {
        self.segments
            .iter()
            .filter(|s| s.start < end && s.end > start)
            .copied()
            .collect()
    }
}

/// Isolates matches inside one container, rebuilding the character map
/// lazily after every structural edit.
struct Isolator<'d> {
    doc: &'d mut Document,
    container: NodeId,
    map: Option<CharMap>,
}

impl<'d> Isolator<'d> {
    fn new(doc: &'d mut Document, container: NodeId, map: CharMap) -> Self {
        Isolator {
            doc,
            container,
            map: Some(map),
        }
    }

    fn map(&mut self) -> &CharMap {
        let doc = &*self.doc;
        let container = self.container;
        self.map.get_or_insert_with(|| CharMap::build(doc, container))
    }

    fn invalidate(&mut self) {
        self.map = None;
    }

    /// Make `m` owned by exactly one run and tag that run.
    fn isolate(&mut self, m: PatternMatch) -> Result<NodeId, TemplateError> {
        let covered = self.map().spanning(m.start, m.end());
        let first = covered
            .first()
            .copied()
            .filter(|s| s.is_run)
            .ok_or_else(|| TemplateError::syntax(&m.raw, "markup does not start in a text run"))?;

        let mut target = first.node;
        if m.start > first.start {
            target = self.doc.split_run(first.node, m.start - first.start);
            self.invalidate();
        }

        if covered.len() == 1 {
            let own_len = m.end() - m.start;
            if self.doc.text(target).len() > own_len {
                self.doc.split_run(target, own_len);
                self.invalidate();
            }
        } else {
            if let Some(last) = covered.last().copied().filter(|s| m.end() < s.end) {
                self.doc.split_run(last.node, m.end() - last.start);
            }
            self.doc.set_text(target, m.raw.clone());
            for seg in &covered[1..] {
                let parent = self.doc.parent(seg.node);
                self.doc.remove(seg.node);
                if let Some(parent) = parent {
                    self.doc.prune_empty(parent, Some(self.container));
                }
            }
            self.invalidate();
            trace!(markup = %m.raw, runs = covered.len(), "merged runs");
        }

        self.doc.set_marker(target, m);
        Ok(target)
    }
}

/// Scan every text container of `doc` and isolate each match into a single
/// tagged run. Returns the number of tagged runs.
pub fn isolate_document(doc: &mut Document, file_id: usize) -> Result<usize, ParseError> {
    let containers: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.kind(n).holds_text())
        .collect();

    let mut tagged = 0;
    for container in containers {
        let map = CharMap::build(doc, container);
        let span = doc
            .children(container)
            .first()
            .and_then(|&c| doc.span(c))
            .or_else(|| doc.span(container));
        let matches = scanner::scan(map.text())
            .map_err(|e| ParseError::new(e, span.clone(), file_id))?;
        if matches.is_empty() {
            continue;
        }

        let mut isolator = Isolator::new(doc, container, map);
        for m in matches {
            isolator
                .isolate(m)
                .map_err(|e| ParseError::new(e, span.clone(), file_id))?;
            tagged += 1;
        }
    }

    debug!(tagged, "isolated markup");
    Ok(tagged)
}
