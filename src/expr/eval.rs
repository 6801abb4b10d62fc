//! Evaluation of compiled conditions against a data context

use std::cmp::Ordering;

use serde_json::Value;

use crate::expr::grammar::{CompareOp, Expr};
use crate::expr::ExprError;
use crate::render::resolve::VarPath;

/// Truthiness of a possibly undefined value
///
/// `false`, `0`, `""`, `null`, undefined and empty arrays are false;
/// everything else, empty objects included, is true.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

/// Equality without type coercion; numbers compare by value
pub fn strict_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => values_eq(l, r),
        _ => false,
    }
}

fn values_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_eq(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(k, v)| r.get(k).is_some_and(|other| values_eq(v, other)))
        }
        _ => left == right,
    }
}

/// Ordering of two numbers or two strings; anything else is unordered
fn order(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
    match (left?, right?) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn compare(op: CompareOp, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        CompareOp::Eq => strict_eq(left, right),
        CompareOp::Ne => !strict_eq(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::In => match right {
            Some(Value::Array(items)) => items.iter().any(|item| strict_eq(left, Some(item))),
            _ => false,
        },
    }
}

/// Evaluate an expression to a value; `None` is undefined
pub fn evaluate(expr: &Expr, data: &Value) -> Result<Option<Value>, ExprError> {
    let value = match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::Path(path) => VarPath::parse(path)
            .map_err(|e| ExprError::new(e.to_string()))?
            .resolve_value(data),
        Expr::Not(inner) => Some(Value::Bool(!truthy(evaluate(inner, data)?.as_ref()))),
        Expr::And(left, right) => {
            let result =
                truthy(evaluate(left, data)?.as_ref()) && truthy(evaluate(right, data)?.as_ref());
            Some(Value::Bool(result))
        }
        Expr::Or(left, right) => {
            let result =
                truthy(evaluate(left, data)?.as_ref()) || truthy(evaluate(right, data)?.as_ref());
            Some(Value::Bool(result))
        }
        Expr::Compare(left, op, right) => {
            let l = evaluate(left, data)?;
            let r = evaluate(right, data)?;
            Some(Value::Bool(compare(*op, l.as_ref(), r.as_ref())))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(0.0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(Some(&json!([]))));
        assert!(!truthy(Some(&json!(null))));
        assert!(!truthy(None));
        assert!(truthy(Some(&json!([0]))));
        assert!(truthy(Some(&json!({}))));
        assert!(truthy(Some(&json!("0"))));
    }

    #[test]
    fn test_strict_equality_has_no_coercion() {
        assert!(strict_eq(Some(&json!(1)), Some(&json!(1.0))));
        assert!(!strict_eq(Some(&json!(1)), Some(&json!("1"))));
        assert!(!strict_eq(Some(&json!(null)), None));
        assert!(strict_eq(None, None));
        assert!(!strict_eq(Some(&json!(false)), Some(&json!(0))));
    }

    #[test]
    fn test_ordering_requires_matching_types() {
        assert!(compare(CompareOp::Lt, Some(&json!(1)), Some(&json!(2))));
        assert!(compare(CompareOp::Ge, Some(&json!("b")), Some(&json!("a"))));
        assert!(!compare(CompareOp::Lt, Some(&json!(1)), Some(&json!("2"))));
        assert!(!compare(CompareOp::Gt, None, Some(&json!(0))));
    }

    #[test]
    fn test_membership() {
        let tags = json!(["a", 2]);
        assert!(compare(CompareOp::In, Some(&json!("a")), Some(&tags)));
        assert!(compare(CompareOp::In, Some(&json!(2.0)), Some(&tags)));
        assert!(!compare(CompareOp::In, Some(&json!("2")), Some(&tags)));
        assert!(!compare(CompareOp::In, Some(&json!("a")), Some(&json!("abc"))));
    }
}
