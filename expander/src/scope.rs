use tracing::trace;

use crate::error::ExpandError;
use crate::value::Value;

pub const INDEX_VAR: &str = "_Idx";
pub const LENGTH_VAR: &str = "_Length";

/// One layer of bindings, pushed per block iteration.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    bindings: Vec<(String, Value)>,
    /// The current item, addressed with leading dots.
    item: Option<Value>,
}

impl Frame {
    /// A collection iteration: the item under `name`, plus the 1-based
    /// `_Idx` and `_Length` metadata.
    pub fn item(name: &str, item: Value, index: usize, length: usize) -> Self {
        Frame {
            bindings: vec![
                (name.to_string(), item.clone()),
                (INDEX_VAR.to_string(), Value::Number(index as f64)),
                (LENGTH_VAR.to_string(), Value::Number(length as f64)),
            ],
            item: Some(item),
        }
    }

    /// A range iteration: only the index variable, no item.
    pub fn index(name: &str, index: i64) -> Self {
        Frame {
            bindings: vec![(name.to_string(), Value::Number(index as f64))],
            item: None,
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// The full scope is a stack of frames. The bottom frame holds the bound
/// root models in binding order.
#[derive(Debug)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            frames: vec![Frame::default()],
        }
    }

    /// Bind a root model. The first one bound is the implicit default root.
    pub fn bind_root(&mut self, name: &str, value: Value) {
        let root = &mut self.frames[0];
        root.bindings.retain(|(k, _)| k != name);
        root.bindings.push((name.to_string(), value));
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pop the innermost frame. The root frame is never popped.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Innermost binding of exactly `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    /// Resolve a dotted path.
    ///
    /// Leading dots pick an iteration item directly: `.` is the innermost,
    /// `..` the one around it. Otherwise frames are searched innermost first
    /// for the longest bound prefix of the path; if none matches, the path
    /// is read from the first root model.
    pub fn lookup(&self, path: &str) -> Result<Value, ExpandError> {
        let rest = path.trim_start_matches('.');
        let dots = path.len() - rest.len();
        let segments: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.').collect()
        };

        if dots > 0 {
            let items: Vec<&Value> = self
                .frames
                .iter()
                .rev()
                .filter_map(|f| f.item.as_ref())
                .collect();
            let item = items.get(dots - 1).ok_or_else(|| ExpandError::ScopeDepth {
                path: path.to_string(),
                depth: dots,
                available: items.len(),
            })?;
            return resolve(item, &segments, path);
        }

        for frame in self.frames.iter().rev() {
            for n in (1..=segments.len()).rev() {
                let key = segments[..n].join(".");
                if let Some(value) = frame.get(&key) {
                    trace!(path, key = %key, "bound prefix");
                    return resolve(value, &segments[n..], path);
                }
            }
        }

        let Some((root_name, root)) = self.frames[0].bindings.first() else {
            return Err(ExpandError::ModelNotFound {
                path: path.to_string(),
            });
        };
        let first = segments.first().copied().unwrap_or_default();
        if root.member(first).is_none() {
            return Err(ExpandError::ModelNotFound {
                path: path.to_string(),
            });
        }
        trace!(path, root = %root_name, "implicit root");
        resolve(root, &segments, path)
    }
}

/// Walk `segments` down from `value`. A null along the way resolves to null.
fn resolve(value: &Value, segments: &[&str], path: &str) -> Result<Value, ExpandError> {
    let mut current = value.clone();
    for segment in segments {
        if matches!(current, Value::Null) {
            return Ok(Value::Null);
        }
        current = match current.member(segment) {
            Some(next) => next,
            None if matches!(current, Value::List(_)) => {
                return Err(ExpandError::CollectionWithoutLoop {
                    path: path.to_string(),
                    property: segment.to_string(),
                });
            }
            None => {
                return Err(ExpandError::PropertyNotFound {
                    path: path.to_string(),
                    property: segment.to_string(),
                    type_name: current.type_name().to_string(),
                });
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> Value {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn invoice_scope() -> Scope {
        let mut scope = Scope::new();
        let customer = map(&[("name", "Ada".into())]);
        scope.bind_root(
            "invoice",
            map(&[("customer", customer), ("total", Value::Number(42.0))]),
        );
        scope.bind_root("company", map(&[("name", "Acme".into())]));
        scope
    }

    #[test]
    fn explicit_root_paths() {
        let scope = invoice_scope();
        assert_eq!(scope.lookup("invoice.total").unwrap(), Value::Number(42.0));
        assert_eq!(scope.lookup("company.name").unwrap(), Value::from("Acme"));
    }

    #[test]
    fn bare_paths_fall_back_to_first_root() {
        let scope = invoice_scope();
        assert_eq!(scope.lookup("customer.name").unwrap(), Value::from("Ada"));
        assert!(matches!(
            scope.lookup("nothing.here"),
            Err(ExpandError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn loop_frames_shadow_roots() {
        let mut scope = invoice_scope();
        scope.push(Frame::item("company", map(&[("name", "Inner".into())]), 1, 1));
        assert_eq!(scope.lookup("company.name").unwrap(), Value::from("Inner"));
        scope.pop();
        assert_eq!(scope.lookup("company.name").unwrap(), Value::from("Acme"));
    }

    #[test]
    fn dotted_loop_names_match_longest_prefix() {
        let mut scope = invoice_scope();
        scope.push(Frame::item("invoice.lines", map(&[("sku", "A1".into())]), 1, 3));
        assert_eq!(scope.lookup("invoice.lines.sku").unwrap(), Value::from("A1"));
        assert_eq!(scope.lookup("_Length").unwrap(), Value::Number(3.0));
    }

    #[test]
    fn leading_dots_address_enclosing_items() {
        let mut scope = invoice_scope();
        scope.push(Frame::item("a", "outer".into(), 1, 1));
        scope.push(Frame::index("i", 0));
        scope.push(Frame::item("b", "middle".into(), 1, 1));
        scope.push(Frame::item("c", "inner".into(), 1, 1));
        assert_eq!(scope.lookup(".").unwrap(), Value::from("inner"));
        assert_eq!(scope.lookup("..").unwrap(), Value::from("middle"));
        assert_eq!(scope.lookup("...").unwrap(), Value::from("outer"));
        assert!(matches!(
            scope.lookup("...."),
            Err(ExpandError::ScopeDepth { available: 3, .. })
        ));
    }

    #[test]
    fn null_short_circuits_and_lists_need_loops() {
        let mut scope = Scope::new();
        scope.bind_root(
            "order",
            map(&[
                ("note", Value::Null),
                ("lines", Value::from(vec!["x"])),
            ]),
        );
        assert_eq!(scope.lookup("order.note.text").unwrap(), Value::Null);
        assert!(matches!(
            scope.lookup("order.lines.sku"),
            Err(ExpandError::CollectionWithoutLoop { .. })
        ));
        assert!(matches!(
            scope.lookup("order.missing"),
            Err(ExpandError::PropertyNotFound { .. })
        ));
    }
}
