use docweave::parser::expression::{BinaryOperator, Expr, UnaryOperator, parse_expression};
use tracing::trace;

use crate::error::ExpandError;
use crate::scope::Scope;
use crate::value::Value;

/// A path reference inside a compiled script.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Resolved when the script was compiled.
    Bound(Value),
    /// Resolved through the scope each time the script is evaluated.
    Unresolved(String),
}

#[derive(Debug, Clone)]
enum Node {
    Operand(Operand),
    Unary {
        operator: UnaryOperator,
        operand: Box<Node>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A compiled condition or switch expression.
#[derive(Debug, Clone)]
pub struct Script {
    source: String,
    root: Node,
}

/// Compile `text` against `scope`.
///
/// Leading-dot paths are resolved now and fixed for the lifetime of the
/// script. Other paths holding primitives are bound to their value;
/// everything else stays a path and is resolved on evaluation.
pub fn compile(text: &str, scope: &Scope) -> Result<Script, ExpandError> {
    let expr = parse_expression(text).map_err(|e| ExpandError::Expression {
        expression: e.expression,
        message: e.message,
    })?;
    let root = bind(&expr, scope).map_err(|e| wrap(text, e))?;
    let script = Script {
        source: text.to_string(),
        root,
    };
    trace!(expression = text, unresolved = ?script.unresolved(), "compiled");
    Ok(script)
}

fn bind(expr: &Expr, scope: &Scope) -> Result<Node, ExpandError> {
    Ok(match expr {
        Expr::Number(n) => Node::Operand(Operand::Bound(Value::Number(*n))),
        Expr::Str(s) => Node::Operand(Operand::Bound(Value::String(s.clone()))),
        Expr::Bool(b) => Node::Operand(Operand::Bound(Value::Bool(*b))),
        Expr::Null => Node::Operand(Operand::Bound(Value::Null)),
        Expr::Path(path) if path.starts_with('.') => {
            Node::Operand(Operand::Bound(scope.lookup(path)?))
        }
        Expr::Path(path) => match scope.lookup(path) {
            Ok(value) if value.is_primitive() => Node::Operand(Operand::Bound(value)),
            _ => Node::Operand(Operand::Unresolved(path.clone())),
        },
        Expr::Unary { operator, operand } => Node::Unary {
            operator: *operator,
            operand: Box::new(bind(operand, scope)?),
        },
        Expr::Binary {
            operator,
            left,
            right,
        } => Node::Binary {
            operator: *operator,
            left: Box::new(bind(left, scope)?),
            right: Box::new(bind(right, scope)?),
        },
    })
}

fn wrap(expression: &str, err: ExpandError) -> ExpandError {
    match err {
        ExpandError::Expression { .. } => err,
        other => ExpandError::Expression {
            expression: expression.to_string(),
            message: other.to_string(),
        },
    }
}

impl Script {
    /// Paths left for evaluation time, left to right.
    pub fn unresolved(&self) -> Vec<&str> {
        fn visit<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
            match node {
                Node::Operand(Operand::Unresolved(p)) => out.push(p),
                Node::Operand(Operand::Bound(_)) => {}
                Node::Unary { operand, .. } => visit(operand, out),
                Node::Binary { left, right, .. } => {
                    visit(left, out);
                    visit(right, out);
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.root, &mut out);
        out
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, ExpandError> {
        let value = evaluate(&self.root, scope).map_err(|e| wrap(&self.source, e))?;
        trace!(expression = %self.source, result = %value, "evaluated");
        Ok(value)
    }

    /// Evaluate as a condition.
    pub fn test(&self, scope: &Scope) -> Result<bool, ExpandError> {
        Ok(self.evaluate(scope)?.is_truthy())
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn evaluate(node: &Node, scope: &Scope) -> Result<Value, ExpandError> {
    match node {
        Node::Operand(Operand::Bound(value)) => Ok(value.clone()),
        Node::Operand(Operand::Unresolved(path)) => scope.lookup(path),

        Node::Unary { operator, operand } => {
            let val = evaluate(operand, scope)?;
            match operator {
                UnaryOperator::Negation => {
                    let n = coerce_number(&val)?;
                    Ok(Value::Number(-n))
                }
                UnaryOperator::LogicalNot => Ok(Value::Bool(!val.is_truthy())),
            }
        }

        // Logical operators short-circuit.
        Node::Binary {
            operator: BinaryOperator::LogicalAnd,
            left,
            right,
        } => {
            if !evaluate(left, scope)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(right, scope)?.is_truthy()))
        }
        Node::Binary {
            operator: BinaryOperator::LogicalOr,
            left,
            right,
        } => {
            if evaluate(left, scope)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(right, scope)?.is_truthy()))
        }

        Node::Binary {
            operator,
            left,
            right,
        } => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            eval_binary_op(operator, &l, &r)
        }
    }
}

fn coerce_number(val: &Value) -> Result<f64, ExpandError> {
    val.as_number()
        .ok_or_else(|| ExpandError::type_mismatch("operand", "Number", val.type_name()))
}

fn eval_binary_op(op: &BinaryOperator, left: &Value, right: &Value) -> Result<Value, ExpandError> {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left, right)))
            }
            _ => Err(ExpandError::type_mismatch(
                "+",
                "numbers or strings",
                &format!("{} + {}", left.type_name(), right.type_name()),
            )),
        },
        BinaryOperator::Subtraction => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(ExpandError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        BinaryOperator::Modulo => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(ExpandError::DivisionByZero);
            }
            Ok(Value::Number(a % b))
        }
        BinaryOperator::Equality => Ok(Value::Bool(left == right)),
        BinaryOperator::Inequality => Ok(Value::Bool(left != right)),
        BinaryOperator::GreaterThan => compare(left, right, |o| o.is_gt()),
        BinaryOperator::LessThan => compare(left, right, |o| o.is_lt()),
        BinaryOperator::GreaterThanOrEqual => compare(left, right, |o| o.is_ge()),
        BinaryOperator::LessThanOrEqual => compare(left, right, |o| o.is_le()),
        BinaryOperator::LogicalAnd => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOperator::LogicalOr => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOperator::Contains => contains(left, right),
    }
}

fn numeric_binop(
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, ExpandError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(Value::Number(f(a, b)))
}

/// Numbers compare numerically, two strings lexically.
fn compare(
    left: &Value,
    right: &Value,
    f: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ExpandError> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        if a.parse::<f64>().is_err() || b.parse::<f64>().is_err() {
            return Ok(Value::Bool(f(a.cmp(b))));
        }
    }
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    match a.partial_cmp(&b) {
        Some(ordering) => Ok(Value::Bool(f(ordering))),
        None => Ok(Value::Bool(false)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<Value, ExpandError> {
    match haystack {
        Value::String(s) => Ok(Value::Bool(s.contains(&needle.to_string()))),
        Value::List(items) => Ok(Value::Bool(items.contains(needle))),
        Value::Map(map) => Ok(Value::Bool(map.contains_key(&needle.to_string()))),
        Value::Null => Ok(Value::Bool(false)),
        other => Err(ExpandError::type_mismatch(
            "contains",
            "String, List or Map",
            other.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Frame;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        let order: Value = vec![
            ("total".to_string(), Value::Number(120.0)),
            ("status".to_string(), Value::from("paid")),
            ("tags".to_string(), Value::from(vec!["rush", "gift"])),
        ]
        .into_iter()
        .collect();
        scope.bind_root("order", order);
        scope
    }

    fn eval(text: &str, scope: &Scope) -> Value {
        compile(text, scope).unwrap().evaluate(scope).unwrap()
    }

    #[test]
    fn comparison_and_logic() {
        let s = scope();
        assert_eq!(eval("order.total > 100 and order.status == 'paid'", &s), Value::Bool(true));
        assert_eq!(eval("not (order.total >= 200) || false", &s), Value::Bool(true));
        assert_eq!(eval("order.total / 4 + 1", &s), Value::Number(31.0));
    }

    #[test]
    fn primitives_bind_and_collections_defer() {
        let s = scope();
        let script = compile("order.total > 1 and order.tags contains 'gift'", &s).unwrap();
        assert_eq!(script.unresolved(), vec!["order.tags"]);
        assert!(script.test(&s).unwrap());
    }

    #[test]
    fn leading_dots_resolve_eagerly() {
        let mut s = scope();
        s.push(Frame::item("line", Value::from("first"), 1, 2));
        let script = compile(". == 'first'", &s).unwrap();
        s.pop();
        s.push(Frame::item("line", Value::from("second"), 2, 2));
        assert!(script.test(&s).unwrap());
        assert!(script.unresolved().is_empty());
    }

    #[test]
    fn string_containment_and_numeric_strings() {
        let s = scope();
        assert_eq!(eval("order.status contains 'ai'", &s), Value::Bool(true));
        assert_eq!(eval("'10' == 10", &s), Value::Bool(true));
        assert_eq!(eval("'b' > 'a'", &s), Value::Bool(true));
    }

    #[test]
    fn failures_name_the_expression() {
        let s = scope();
        let err = compile("order.total >", &s).unwrap_err();
        assert!(err.to_string().contains("order.total >"), "{}", err);

        let script = compile("missing.path == 1", &s).unwrap();
        let err = script.evaluate(&s).unwrap_err();
        match err {
            ExpandError::Expression { expression, message } => {
                assert_eq!(expression, "missing.path == 1");
                assert!(message.contains("model not found"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = compile("1 / 0", &s).unwrap().evaluate(&s).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }
}
