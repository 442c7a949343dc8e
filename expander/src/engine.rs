use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::str::FromStr;

use docweave::context::IdGenerator;
use docweave::document::{Document, NodeId, NodeKind, RunStyle};
use docweave::parser::TemplateError;
use docweave::pattern::Markup;
use tracing::{debug, warn};

use crate::blocks;
use crate::error::{DiagnosticError, ExpandError};
use crate::format::{FormatContext, Formatter, Formatters};
use crate::scope::{Frame, Scope};
use crate::value::Value;

/// How data-binding errors are handled. Template errors are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Abort on the first error.
    #[default]
    Throw,
    /// Drop the offending field or block and carry on.
    SkipAndRemove,
    /// Replace the offending content with a visible error note.
    Highlight,
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "throw" => Ok(ProcessingMode::Throw),
            "skip" | "skipandremove" | "skip-and-remove" => Ok(ProcessingMode::SkipAndRemove),
            "highlight" => Ok(ProcessingMode::Highlight),
            other => Err(format!(
                "unknown mode '{}' (expected throw, skip or highlight)",
                other
            )),
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingMode::Throw => "throw",
            ProcessingMode::SkipAndRemove => "skip",
            ProcessingMode::Highlight => "highlight",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a successful `process` call.
#[derive(Debug, Default)]
pub struct Report {
    /// Data errors handled by the processing mode, in the order met.
    pub diagnostics: Vec<DiagnosticError>,
    /// Blocks found in the template.
    pub blocks: usize,
}

/// Binds models to a template and expands it.
pub struct Engine {
    mode: ProcessingMode,
    models: Vec<(String, Value)>,
    formatters: Formatters,
    source_id: usize,
}

impl Engine {
    pub fn new(mode: ProcessingMode) -> Self {
        Engine {
            mode,
            models: Vec::new(),
            formatters: Formatters::with_builtins(),
            source_id: 0,
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// File id used in diagnostics.
    pub fn with_source_id(mut self, source_id: usize) -> Self {
        self.source_id = source_id;
        self
    }

    /// Bind a root model. The first bound model is also searched for paths
    /// that match no bound name.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        self.models.retain(|(n, _)| *n != name);
        self.models.push((name, value));
        self
    }

    pub fn register_formatter(&mut self, formatter: Box<dyn Formatter>) -> &mut Self {
        self.formatters.register(formatter);
        self
    }

    /// Expand the template in `doc` in place.
    pub fn process(&self, doc: &mut Document) -> Result<Report, DiagnosticError> {
        let mut ids = IdGenerator::new();
        let tree = docweave::prepare(doc, &mut ids, self.source_id)?;
        debug!(blocks = tree.count(), mode = %self.mode, "template prepared");

        let mut scope = Scope::new();
        for (name, value) in &self.models {
            scope.bind_root(name, value.clone());
        }

        let root = doc.root();
        let mut ctx = ExpandContext {
            doc,
            scope,
            formatters: &self.formatters,
            mode: self.mode,
            diagnostics: Vec::new(),
            source_id: self.source_id,
        };

        ctx.substitute(&[root])?;
        for block in &tree.children {
            blocks::expand(&mut ctx, block, &[root])?;
        }

        if let Some(&left) = ctx.doc.live_anchors().first() {
            let anchor = ctx.doc.anchor(left).map(|a| a.to_string()).unwrap_or_default();
            return Err(ctx.fatal(
                TemplateError::InsertionPoint {
                    anchor,
                    reason: "still in the document after expansion".into(),
                }
                .into(),
                None,
            ));
        }

        Ok(Report {
            diagnostics: ctx.diagnostics,
            blocks: tree.count(),
        })
    }
}

// ---------------------------------------------------------------------------
// Expansion context
// ---------------------------------------------------------------------------

/// State threaded through one `process` call.
pub(crate) struct ExpandContext<'a> {
    pub doc: &'a mut Document,
    pub scope: Scope,
    pub formatters: &'a Formatters,
    pub mode: ProcessingMode,
    pub diagnostics: Vec<DiagnosticError>,
    pub source_id: usize,
}

/// Pops its scope frame when dropped, on error paths too.
pub(crate) struct FrameGuard<'c, 'a> {
    ctx: &'c mut ExpandContext<'a>,
}

impl<'a> Deref for FrameGuard<'_, 'a> {
    type Target = ExpandContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for FrameGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for FrameGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.scope.pop();
    }
}

impl<'a> ExpandContext<'a> {
    pub fn enter<'c>(&'c mut self, frame: Frame) -> FrameGuard<'c, 'a> {
        self.scope.push(frame);
        FrameGuard { ctx: self }
    }

    pub fn fatal(&self, error: ExpandError, span: Option<Range<usize>>) -> DiagnosticError {
        DiagnosticError::new(error, span, self.source_id)
    }

    /// Whether `error` must abort processing.
    fn is_fatal(&self, error: &ExpandError) -> bool {
        error.is_structural() || self.mode == ProcessingMode::Throw
    }

    fn record(&mut self, error: ExpandError, span: Option<Range<usize>>) {
        warn!(mode = %self.mode, "{}", error);
        let diag = DiagnosticError::new(error, span, self.source_id).into_warning();
        self.diagnostics.push(diag);
    }

    // ----- Variable substitution -----

    /// Replace every variable marker under `roots` with its rendered value.
    pub fn substitute(&mut self, roots: &[NodeId]) -> Result<(), DiagnosticError> {
        let leaves: Vec<NodeId> = roots
            .iter()
            .flat_map(|&r| self.doc.descendants(r))
            .filter(|&n| {
                self.doc
                    .marker(n)
                    .is_some_and(|m| matches!(m.markup, Markup::Variable { .. }))
            })
            .collect();

        for leaf in leaves {
            if let Err(error) = self.render_variable(leaf) {
                self.fail_leaf(leaf, error)?;
            }
        }
        Ok(())
    }

    fn render_variable(&mut self, leaf: NodeId) -> Result<(), ExpandError> {
        let Some(Markup::Variable { path, formatter }) =
            self.doc.marker(leaf).map(|m| m.markup.clone())
        else {
            return Ok(());
        };
        let value = self.scope.lookup(&path)?;

        match &formatter {
            None => {
                if matches!(value, Value::Map(_) | Value::Object(_) | Value::Table { .. }) {
                    return Err(ExpandError::type_mismatch(
                        &path,
                        "a printable value",
                        value.type_name(),
                    ));
                }
                self.doc.set_text(leaf, value.to_string());
            }
            Some(call) => {
                let f = self
                    .formatters
                    .find(value.type_name(), &call.name)
                    .ok_or_else(|| ExpandError::FormatterNotApplicable {
                        formatter: call.name.clone(),
                        type_name: value.type_name().to_string(),
                    })?;
                let ctx = FormatContext {
                    value: &value,
                    call,
                    path: &path,
                };
                f.apply(&ctx, self.doc, leaf)?;
            }
        }
        self.doc.take_marker(leaf);
        Ok(())
    }

    // ----- Error handling per mode -----

    /// Handle a data error raised by the variable in `leaf`.
    pub fn fail_leaf(&mut self, leaf: NodeId, error: ExpandError) -> Result<(), DiagnosticError> {
        let span = self.doc.span(leaf);
        if self.is_fatal(&error) {
            return Err(self.fatal(error, span));
        }
        match self.mode {
            ProcessingMode::Highlight => {
                self.doc.take_marker(leaf);
                self.doc.set_text(leaf, error_note(&error));
                self.doc.set_style(leaf, RunStyle::highlighted());
            }
            _ => {
                let parent = self.doc.parent(leaf);
                self.doc.remove(leaf);
                if let Some(parent) = parent {
                    let root = self.doc.root();
                    self.doc.prune_empty(parent, Some(root));
                }
            }
        }
        self.record(error, span);
        Ok(())
    }

    /// Handle a data error raised by a block whose output would go at
    /// `anchor`. Nothing has been inserted for the block yet.
    pub fn fail_block(
        &mut self,
        anchor: NodeId,
        error: DiagnosticError,
    ) -> Result<(), DiagnosticError> {
        if self.is_fatal(&error.error) {
            return Err(error);
        }
        if self.mode == ProcessingMode::Highlight {
            let note = self.error_node(anchor, &error_note(&error.error));
            self.doc.insert_before(anchor, note);
        }
        self.record(error.error, error.span);
        Ok(())
    }

    /// A highlighted note shaped to fit where `anchor` sits.
    fn error_node(&mut self, anchor: NodeId, text: &str) -> NodeId {
        let run = self.doc.create_run(text, RunStyle::highlighted());
        if matches!(self.doc.kind(anchor), NodeKind::TableRow { .. }) {
            let row = self.doc.create(NodeKind::TableRow { header: false });
            let cell = self.doc.append_new(row, NodeKind::TableCell);
            self.doc.append(cell, run);
            return row;
        }
        let inline = self
            .doc
            .parent(anchor)
            .is_some_and(|p| self.doc.kind(p).is_inline_container());
        if inline {
            return run;
        }
        let paragraph = self.doc.create(NodeKind::Paragraph);
        self.doc.append(paragraph, run);
        paragraph
    }
}

fn error_note(error: &ExpandError) -> String {
    format!("[error: {}]", error)
}
