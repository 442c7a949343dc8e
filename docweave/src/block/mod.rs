pub mod builder;

use std::ops::Range;

use crate::context::AnchorId;
use crate::document::NodeId;
use crate::pattern::Keyword;

/// The wrapper role of a generic child block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// Content of a condition when it holds.
    Then,
    /// Content after `{{else}}`.
    Else,
    /// Loop content in front of a `{{:s:}}` separator.
    Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Loop { path: String },
    RangeLoop { index: String, count: String },
    Conditional { condition: String },
    Branch(BranchKind),
    Switch { expr: String },
    Case { value: String },
    Default,
    Separator,
    DynamicTable { path: String },
    InlineKeyWord(Keyword),
    Ignore,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Loop { .. } => "loop",
            BlockKind::RangeLoop { .. } => "range",
            BlockKind::Conditional { .. } => "condition",
            BlockKind::Branch(BranchKind::Then) => "then",
            BlockKind::Branch(BranchKind::Else) => "else",
            BlockKind::Branch(BranchKind::Body) => "body",
            BlockKind::Switch { .. } => "switch",
            BlockKind::Case { .. } => "case",
            BlockKind::Default => "default",
            BlockKind::Separator => "separator",
            BlockKind::DynamicTable { .. } => "dyntable",
            BlockKind::InlineKeyWord(_) => "keyword",
            BlockKind::Ignore => "ignore",
        }
    }
}

/// A unit of control flow: the content detached from between its markers,
/// the insertion point that content is re-inserted at, and nested blocks.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    /// Detached subtree roots, in document order.
    pub content: Vec<NodeId>,
    pub anchor: AnchorId,
    pub children: Vec<Block>,
    /// Raw text of the opening marker.
    pub label: String,
    pub span: Option<Range<usize>>,
}

/// Result of building: the blocks found directly in the document body.
#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    pub children: Vec<Block>,
}

impl BlockTree {
    /// Visit every block depth-first with its nesting depth.
    pub fn walk(&self, mut f: impl FnMut(&Block, usize)) {
        fn visit(blocks: &[Block], depth: usize, f: &mut dyn FnMut(&Block, usize)) {
            for block in blocks {
                f(block, depth);
                visit(&block.children, depth + 1, f);
            }
        }
        visit(&self.children, 0, &mut f);
    }

    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(|_, _| n += 1);
        n
    }
}
