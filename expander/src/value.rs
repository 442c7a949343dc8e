use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Named property lookup for data sources that are not plain maps.
///
/// Implement this to expose application objects to templates without
/// converting them into [`Value::Map`] up front.
pub trait ModelObject: fmt::Debug {
    /// Name used in error messages and for formatter selection.
    fn type_name(&self) -> &str;

    /// The value of property `name`, or `None` if there is no such property.
    fn property(&self, name: &str) -> Option<Value>;

    /// Property names, for listings. Optional.
    fn properties(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A model value bound into a template.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Structured data with named columns and rows. Bound to dynamic tables.
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Object(Rc<dyn ModelObject>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Table { rows, .. } => !rows.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Table { .. } => "Table",
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Null, booleans, numbers and strings.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    /// Numeric view: numbers, and strings that parse as numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Resolve one path segment against this value: named lookup on
    /// objects, then map keys, then intrinsic properties.
    pub fn member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => {
                if let Some(v) = obj.property(name) {
                    return Some(v);
                }
            }
            Value::Map(map) => {
                if let Some(v) = map.get(name) {
                    return Some(v.clone());
                }
            }
            _ => {}
        }
        self.intrinsic(name)
    }

    fn intrinsic(&self, name: &str) -> Option<Value> {
        match self {
            Value::List(items) => match name {
                "Count" | "Length" => Some(Value::Number(items.len() as f64)),
                "First" => Some(items.first().cloned().unwrap_or(Value::Null)),
                "Last" => Some(items.last().cloned().unwrap_or(Value::Null)),
                _ => name.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            },
            Value::Map(map) => match name {
                "Count" => Some(Value::Number(map.len() as f64)),
                _ => None,
            },
            Value::String(s) => match name {
                "Length" => Some(Value::Number(s.chars().count() as f64)),
                _ => None,
            },
            Value::Table { headers, rows } => match name {
                "Headers" => Some(Value::List(
                    headers.iter().cloned().map(Value::String).collect(),
                )),
                "Rows" => Some(Value::List(
                    rows.iter().cloned().map(Value::List).collect(),
                )),
                "Count" => Some(Value::Number(rows.len() as f64)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                Ok(())
            }
            Value::Table { headers, rows } => {
                write!(f, "{}", headers.join(", "))?;
                write!(f, " ({} rows)", rows.len())
            }
            Value::Object(obj) => write!(f, "{}", obj.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // A number equals a string holding the same number.
            (Value::Number(a), Value::String(s)) | (Value::String(s), Value::Number(a)) => {
                s.trim().parse::<f64>().is_ok_and(|b| *a == b)
            }
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (
                Value::Table {
                    headers: h1,
                    rows: r1,
                },
                Value::Table {
                    headers: h2,
                    rows: r2,
                },
            ) => h1 == h2 && r1 == r2,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Customer;

    impl ModelObject for Customer {
        fn type_name(&self) -> &str {
            "Customer"
        }

        fn property(&self, name: &str) -> Option<Value> {
            match name {
                "Name" => Some("Ada".into()),
                _ => None,
            }
        }
    }

    #[test]
    fn integral_numbers_print_without_decimals() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn numbers_equal_numeric_strings() {
        assert_eq!(Value::Number(5.0), Value::from("5"));
        assert_ne!(Value::Number(5.0), Value::from("five"));
    }

    #[test]
    fn members_resolve_in_order() {
        let obj = Value::Object(Rc::new(Customer));
        assert_eq!(obj.member("Name"), Some(Value::from("Ada")));
        assert_eq!(obj.member("Age"), None);

        let list = Value::from(vec!["a", "b"]);
        assert_eq!(list.member("Count"), Some(Value::Number(2.0)));
        assert_eq!(list.member("Last"), Some(Value::from("b")));
        assert_eq!(list.member("0"), Some(Value::from("a")));

        let map: Value = vec![("Count".to_string(), Value::from("own"))]
            .into_iter()
            .collect();
        assert_eq!(map.member("Count"), Some(Value::from("own")));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
    }
}
