use crate::parser::error::TemplateError;
use crate::pattern::{FormatterCall, Markup, PatternMatch};

const DEFAULT_INDEX_NAME: &str = "Index";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Find every piece of markup in `text`, in order. Matches never overlap.
/// Offsets are byte offsets into `text`.
pub fn scan(text: &str) -> Result<Vec<PatternMatch>, TemplateError> {
    let mut matches = Vec::new();
    let mut i = 0;

    while let Some(rel) = text[i..].find('{') {
        let start = i + rel;
        let rest = &text[start..];

        if rest.starts_with("{?{") {
            let body_start = start + 3;
            let close = find_brace(text, body_start)
                .filter(|&c| text[c + 1..].starts_with('}'))
                .ok_or_else(|| TemplateError::syntax(excerpt(rest), "missing closing '}}'"))?;
            let end = close + 2;
            let expr = text[body_start..close].trim();
            if expr.is_empty() {
                return Err(TemplateError::syntax(&text[start..end], "empty condition"));
            }
            matches.push(PatternMatch {
                markup: Markup::Condition(expr.to_string()),
                raw: text[start..end].to_string(),
                start,
                len: end - start,
            });
            i = end;
        } else if rest.starts_with("{{") {
            let body_start = start + 2;
            let close = find_brace(text, body_start)
                .ok_or_else(|| TemplateError::syntax(excerpt(rest), "missing closing '}}'"))?;
            let body = &text[body_start..close];
            let after = &text[close + 1..];

            let (markup, end) = if after.starts_with('}') {
                let end = close + 2;
                (classify(body, &text[start..end])?, end)
            } else if after.starts_with(':') {
                // `{{path}:fmt(args)}` with an optional second closing brace
                let fmt_start = close + 2;
                let fmt_close = find_brace(text, fmt_start)
                    .ok_or_else(|| TemplateError::syntax(excerpt(rest), "missing closing '}'"))?;
                let mut end = fmt_close + 1;
                if text[end..].starts_with('}') {
                    end += 1;
                }
                let raw = &text[start..end];
                let formatter = parse_formatter(&text[fmt_start..fmt_close], raw)?;
                (attach_formatter(classify(body, raw)?, formatter, raw)?, end)
            } else {
                return Err(TemplateError::syntax(excerpt(rest), "expected '}}'"));
            };

            matches.push(PatternMatch {
                markup,
                raw: text[start..end].to_string(),
                start,
                len: end - start,
            });
            i = end;
        } else {
            i = start + 1;
        }
    }

    Ok(matches)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn classify(body: &str, raw: &str) -> Result<Markup, TemplateError> {
    let b = body.trim();
    if b.is_empty() {
        return Err(TemplateError::syntax(raw, "empty markup"));
    }

    // Fixed spellings first so they never read as variables.
    if b == "/" {
        return Ok(Markup::CollectionEnd(None));
    }
    if b == ":s:" {
        return Ok(Markup::CollectionSeparator);
    }
    if b.eq_ignore_ascii_case("else") {
        return Ok(Markup::ConditionElse);
    }

    if let Some(rest) = b.strip_prefix('/') {
        let name = rest.trim();
        if is_switch_word(name) {
            return Err(TemplateError::syntax(
                raw,
                "close switch, case and default blocks with the generic {{/}}",
            ));
        }
        if name.eq_ignore_ascii_case("ignore") {
            return Ok(Markup::CollectionEnd(None));
        }
        return Ok(Markup::CollectionEnd(Some(normalize_path(name, raw)?)));
    }

    if let Some(rest) = b.strip_prefix('#') {
        return classify_start(rest.trim(), raw);
    }

    if let Some(rest) = b.strip_prefix('@') {
        return classify_range(rest.trim(), raw);
    }

    if let Some(rest) = b.strip_prefix(':') {
        let name = rest.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(TemplateError::syntax(raw, "expected a keyword name after ':'"));
        }
        return Ok(Markup::InlineKeyWord(name.to_string()));
    }

    let (path, formatter) = split_formatter(b, raw)?;
    Ok(Markup::Variable { path, formatter })
}

fn classify_start(rest: &str, raw: &str) -> Result<Markup, TemplateError> {
    if let Some((head, tail)) = rest.split_once(':') {
        let tail = tail.trim();
        match head.trim().to_lowercase().as_str() {
            "switch" | "s" => {
                return non_empty(tail, raw, "switch expression").map(Markup::SwitchStart);
            }
            "case" | "c" => {
                return non_empty(tail, raw, "case value").map(Markup::CaseStart);
            }
            _ => {}
        }
    }

    match rest.to_lowercase().as_str() {
        "default" | "d" => return Ok(Markup::DefaultStart),
        "ignore" => return Ok(Markup::IgnoreStart),
        "switch" | "s" | "case" | "c" => {
            return Err(TemplateError::syntax(raw, "expected ':' and an expression"));
        }
        _ => {}
    }

    let (path, formatter) = split_formatter(rest, raw)?;
    Ok(Markup::CollectionStart { path, formatter })
}

fn classify_range(rest: &str, raw: &str) -> Result<Markup, TemplateError> {
    let (index, count) = match rest.split_once(':') {
        Some((index, count)) => (index.trim(), count.trim()),
        None => (DEFAULT_INDEX_NAME, rest),
    };
    if !is_identifier(index) {
        return Err(TemplateError::syntax(raw, "index name must be an identifier"));
    }
    let count = if count.parse::<i64>().is_ok() {
        count.to_string()
    } else {
        normalize_path(count, raw)?
    };
    Ok(Markup::RangeStart {
        index: index.to_string(),
        count,
    })
}

fn attach_formatter(
    markup: Markup,
    formatter: FormatterCall,
    raw: &str,
) -> Result<Markup, TemplateError> {
    match markup {
        Markup::Variable {
            path,
            formatter: None,
        } => Ok(Markup::Variable {
            path,
            formatter: Some(formatter),
        }),
        Markup::CollectionStart {
            path,
            formatter: None,
        } => Ok(Markup::CollectionStart {
            path,
            formatter: Some(formatter),
        }),
        _ => Err(TemplateError::syntax(raw, "a formatter is not allowed here")),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Byte index of the first `}` at or after `from` that is not inside quotes.
fn find_brace(text: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (off, c) in text[from..].char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '}' => return Some(from + off),
            None => {}
        }
    }
    None
}

fn excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or(text);
    line.chars().take(40).collect()
}

fn non_empty(text: &str, raw: &str, what: &str) -> Result<String, TemplateError> {
    if text.is_empty() {
        Err(TemplateError::syntax(raw, format!("missing {}", what)))
    } else {
        Ok(text.to_string())
    }
}

fn is_switch_word(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "switch" | "s" | "case" | "c" | "default" | "d"
    )
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Canonical form of a dotted path: leading dots kept, whitespace around
/// segments dropped. A segment with inner whitespace or punctuation is an
/// error.
pub(crate) fn normalize_path(path: &str, raw: &str) -> Result<String, TemplateError> {
    let t = path.trim();
    let rest = t.trim_start_matches(|c: char| c == '.' || c.is_whitespace());
    let dots = t[..t.len() - rest.len()].chars().filter(|&c| c == '.').count();
    let rest = rest.trim();

    if rest.is_empty() {
        if dots == 0 {
            return Err(TemplateError::syntax(raw, "empty path"));
        }
        return Ok(".".repeat(dots));
    }

    let mut segments = Vec::new();
    for seg in rest.split('.') {
        let seg = seg.trim();
        if !is_segment(seg) {
            return Err(TemplateError::syntax(raw, format!("invalid path '{}'", t)));
        }
        segments.push(seg);
    }
    Ok(format!("{}{}", ".".repeat(dots), segments.join(".")))
}

/// Split `path:formatter(args)` into its parts.
fn split_formatter(
    text: &str,
    raw: &str,
) -> Result<(String, Option<FormatterCall>), TemplateError> {
    match text.split_once(':') {
        Some((path, fmt)) => Ok((normalize_path(path, raw)?, Some(parse_formatter(fmt, raw)?))),
        None => Ok((normalize_path(text, raw)?, None)),
    }
}

fn parse_formatter(text: &str, raw: &str) -> Result<FormatterCall, TemplateError> {
    let t = text.trim();
    let (name, args) = match t.find('(') {
        Some(open) => {
            let inner = t[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| TemplateError::syntax(raw, "unterminated formatter arguments"))?;
            (t[..open].trim(), split_args(inner, raw)?)
        }
        None => (t, Vec::new()),
    };
    if !is_identifier(name) {
        return Err(TemplateError::syntax(raw, "expected a formatter name"));
    }
    Ok(FormatterCall {
        name: name.to_string(),
        args,
    })
}

/// Comma-separated arguments; single or double quotes protect commas and
/// whitespace, and a backslash escapes the next character inside quotes.
fn split_args(inner: &str, raw: &str) -> Result<Vec<String>, TemplateError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut quote: Option<char> = None;
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    if !current.trim().is_empty() {
                        return Err(TemplateError::syntax(raw, "unexpected quote in argument"));
                    }
                    current.clear();
                    quote = Some(c);
                    quoted = true;
                }
                ',' => {
                    args.push(finish_arg(&mut current, quoted));
                    quoted = false;
                }
                _ => {
                    if quoted && !c.is_whitespace() {
                        return Err(TemplateError::syntax(raw, "text after a quoted argument"));
                    }
                    current.push(c);
                }
            },
        }
    }

    if quote.is_some() {
        return Err(TemplateError::syntax(raw, "unterminated quoted argument"));
    }
    args.push(finish_arg(&mut current, quoted));
    Ok(args)
}

fn finish_arg(current: &mut String, quoted: bool) -> String {
    let arg = std::mem::take(current);
    if quoted {
        arg
    } else {
        arg.trim().to_string()
    }
}
