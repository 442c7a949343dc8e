pub mod error;
pub mod expression;
pub mod scanner;

pub use error::{ParseError, TemplateError};

use crate::Template;
use crate::context::IdGenerator;
use crate::document::{Document, read_markdown};

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Read the source Markdown into a document tree without looking at markup.
    pub fn read(&self) -> Document {
        read_markdown(&self.source)
    }

    /// Read the source and split it into blocks, drawing insertion point ids
    /// from `ids`.
    pub fn parse(&self, ids: &mut IdGenerator) -> Result<Template, Vec<ParseError>> {
        let mut document = self.read();
        let blocks = crate::prepare(&mut document, ids, self.file_id).map_err(|e| vec![e])?;
        Ok(Template {
            document,
            blocks,
            source_id: self.file_id,
        })
    }
}
