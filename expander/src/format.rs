use docweave::document::{Document, NodeId, RunStyle};
use docweave::pattern::FormatterCall;

use crate::error::ExpandError;
use crate::value::Value;

/// What a formatter is asked to render.
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    pub value: &'a Value,
    pub call: &'a FormatterCall,
    /// The variable path, for error messages.
    pub path: &'a str,
}

/// Renders a value into the run that held its variable marker.
pub trait Formatter {
    /// Whether this formatter renders values of `type_name` under `name`.
    fn can_handle(&self, type_name: &str, name: &str) -> bool;

    /// Write the formatted value into `leaf`, a text run.
    fn apply(
        &self,
        ctx: &FormatContext<'_>,
        doc: &mut Document,
        leaf: NodeId,
    ) -> Result<(), ExpandError>;
}

/// Formatter lookup. Later registrations win over earlier ones, so user
/// formatters shadow the built-ins.
pub struct Formatters {
    registered: Vec<Box<dyn Formatter>>,
}

impl Default for Formatters {
    fn default() -> Self {
        Formatters::with_builtins()
    }
}

impl Formatters {
    pub fn empty() -> Self {
        Formatters {
            registered: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut formatters = Formatters::empty();
        for builtin in BUILTINS {
            formatters.register(Box::new(builtin));
        }
        formatters
    }

    pub fn register(&mut self, formatter: Box<dyn Formatter>) {
        self.registered.push(formatter);
    }

    pub fn find(&self, type_name: &str, name: &str) -> Option<&dyn Formatter> {
        self.registered
            .iter()
            .rev()
            .find(|f| f.can_handle(type_name, name))
            .map(|f| f.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

const SCALAR: &[&str] = &["Null", "Bool", "Number", "String"];

struct Builtin {
    names: &'static [&'static str],
    types: &'static [&'static str],
    render: fn(&FormatContext<'_>) -> Result<String, ExpandError>,
    style: fn(&mut RunStyle),
}

impl Formatter for Builtin {
    fn can_handle(&self, type_name: &str, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
            && self.types.iter().any(|t| *t == type_name)
    }

    fn apply(
        &self,
        ctx: &FormatContext<'_>,
        doc: &mut Document,
        leaf: NodeId,
    ) -> Result<(), ExpandError> {
        let text = (self.render)(ctx)?;
        doc.set_text(leaf, text);
        if let Some(mut style) = doc.style(leaf) {
            (self.style)(&mut style);
            doc.set_style(leaf, style);
        }
        Ok(())
    }
}

fn keep(_: &mut RunStyle) {}

const BUILTINS: [Builtin; 10] = [
    Builtin {
        names: &["upper", "toupper"],
        types: SCALAR,
        render: |ctx| Ok(ctx.value.to_string().to_uppercase()),
        style: keep,
    },
    Builtin {
        names: &["lower", "tolower"],
        types: SCALAR,
        render: |ctx| Ok(ctx.value.to_string().to_lowercase()),
        style: keep,
    },
    Builtin {
        names: &["trim"],
        types: &["String"],
        render: |ctx| Ok(ctx.value.to_string().trim().to_string()),
        style: keep,
    },
    Builtin {
        names: &["fixed"],
        types: &["Number", "String"],
        render: render_fixed,
        style: keep,
    },
    Builtin {
        names: &["default"],
        types: SCALAR,
        render: |ctx| match ctx.value {
            Value::Null => Ok(ctx.call.args.first().cloned().unwrap_or_default()),
            other => Ok(other.to_string()),
        },
        style: keep,
    },
    Builtin {
        names: &["join"],
        types: &["List"],
        render: render_join,
        style: keep,
    },
    Builtin {
        names: &["count"],
        types: &["List", "Map", "String", "Table"],
        render: |ctx| {
            let n = match ctx.value {
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                Value::String(s) => s.chars().count(),
                Value::Table { rows, .. } => rows.len(),
                _ => 0,
            };
            Ok(n.to_string())
        },
        style: keep,
    },
    Builtin {
        names: &["bold"],
        types: SCALAR,
        render: |ctx| Ok(ctx.value.to_string()),
        style: |s| s.strong = true,
    },
    Builtin {
        names: &["italic"],
        types: SCALAR,
        render: |ctx| Ok(ctx.value.to_string()),
        style: |s| s.emphasis = true,
    },
    Builtin {
        names: &["yesno"],
        types: &["Bool", "Null"],
        render: |ctx| {
            let args = &ctx.call.args;
            let (yes, no) = match args.as_slice() {
                [] => ("yes", "no"),
                [yes] => (yes.as_str(), "no"),
                [yes, no, ..] => (yes.as_str(), no.as_str()),
            };
            let text = if ctx.value.is_truthy() { yes } else { no };
            Ok(text.to_string())
        },
        style: keep,
    },
];

fn render_fixed(ctx: &FormatContext<'_>) -> Result<String, ExpandError> {
    let places = match ctx.call.args.first() {
        None => 2,
        Some(arg) => arg.trim().parse::<usize>().map_err(|_| ExpandError::FormatterArgument {
            formatter: ctx.call.name.clone(),
            message: format!("'{}' is not a number of decimal places", arg),
        })?,
    };
    let n = ctx
        .value
        .as_number()
        .ok_or_else(|| ExpandError::type_mismatch(ctx.path, "a number", ctx.value.type_name()))?;
    Ok(format!("{:.*}", places, n))
}

fn render_join(ctx: &FormatContext<'_>) -> Result<String, ExpandError> {
    let sep = ctx.call.args.first().map(String::as_str).unwrap_or(", ");
    let Value::List(items) = ctx.value else {
        return Err(ExpandError::type_mismatch(ctx.path, "List", ctx.value.type_name()));
    };
    Ok(items
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep))
}
