use std::fmt;

/// A formatter invocation: `name(arg, 'quoted arg', ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatterCall {
    pub name: String,
    pub args: Vec<String>,
}

/// What a piece of markup means.
#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    /// `{{path}}`, `{{path}:fmt(args)}`
    Variable {
        path: String,
        formatter: Option<FormatterCall>,
    },
    /// `{{:break}}`, `{{:pageBreak}}`, `{{:sectionBreak}}`
    InlineKeyWord(String),
    /// `{{#path}}`, `{{#path:dyntable}}`
    CollectionStart {
        path: String,
        formatter: Option<FormatterCall>,
    },
    /// `{{@index:count}}`
    RangeStart { index: String, count: String },
    SwitchStart(String),
    CaseStart(String),
    DefaultStart,
    IgnoreStart,
    /// `{{:s:}}`
    CollectionSeparator,
    /// `{{/}}` or `{{/path}}`. Also closes conditions and switches.
    CollectionEnd(Option<String>),
    /// `{?{expr}}`
    Condition(String),
    ConditionElse,
}

/// Field-less discriminant of [`Markup`], used to tag isolated nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Variable,
    InlineKeyWord,
    CollectionStart,
    RangeStart,
    SwitchStart,
    CaseStart,
    DefaultStart,
    IgnoreStart,
    CollectionSeparator,
    CollectionEnd,
    Condition,
    ConditionElse,
}

/// One scanned piece of markup within a flattened text.
/// `start` and `len` are byte offsets into the scanned string.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub markup: Markup,
    pub raw: String,
    pub start: usize,
    pub len: usize,
}

impl PatternMatch {
    pub fn kind(&self) -> MatchKind {
        match &self.markup {
            Markup::Variable { .. } => MatchKind::Variable,
            Markup::InlineKeyWord(_) => MatchKind::InlineKeyWord,
            Markup::CollectionStart { .. } => MatchKind::CollectionStart,
            Markup::RangeStart { .. } => MatchKind::RangeStart,
            Markup::SwitchStart(_) => MatchKind::SwitchStart,
            Markup::CaseStart(_) => MatchKind::CaseStart,
            Markup::DefaultStart => MatchKind::DefaultStart,
            Markup::IgnoreStart => MatchKind::IgnoreStart,
            Markup::CollectionSeparator => MatchKind::CollectionSeparator,
            Markup::CollectionEnd(_) => MatchKind::CollectionEnd,
            Markup::Condition(_) => MatchKind::Condition,
            Markup::ConditionElse => MatchKind::ConditionElse,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Markers that open, divide or close blocks.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self.kind(),
            MatchKind::Variable | MatchKind::InlineKeyWord
        )
    }
}

impl fmt::Display for PatternMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Control keywords usable as `{{:name}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Break,
    PageBreak,
    SectionBreak,
}

impl Keyword {
    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Keyword> {
        match name.trim().to_uppercase().as_str() {
            "BREAK" => Some(Keyword::Break),
            "PAGEBREAK" => Some(Keyword::PageBreak),
            "SECTIONBREAK" => Some(Keyword::SectionBreak),
            _ => None,
        }
    }
}
