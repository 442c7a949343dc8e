pub mod block;
pub mod context;
pub mod document;
pub mod isolation;
pub mod parser;
pub mod pattern;

use crate::block::BlockTree;
use crate::context::IdGenerator;
use crate::document::Document;
use crate::parser::ParseError;

/// A Markdown template whose markup has been isolated and split into blocks.
#[derive(Debug, Clone)]
pub struct Template {
    /// The document body, with block content detached behind insertion points.
    pub document: Document,
    pub blocks: BlockTree,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

/// Isolate every piece of markup in `doc` and build its block tree.
pub fn prepare(
    doc: &mut Document,
    ids: &mut IdGenerator,
    file_id: usize,
) -> Result<BlockTree, ParseError> {
    isolation::isolate_document(doc, file_id)?;
    block::builder::build(doc, ids, file_id)
}
