//! The small boolean expression language edges and `condition` nodes are
//! written in (§4.5, §9): `"x > 0"`, `"status == failed"`. Deliberately not
//! a general expression language — just enough to route a DAG and let an
//! edge opt out of the default "any upstream failure fails the execution"
//! rule.

use std::collections::HashMap;

use flowpilot_core::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Op {
    fn parse(s: &str) -> Option<(Self, usize)> {
        for (text, op, len) in [
            ("==", Op::Eq, 2),
            ("!=", Op::Ne, 2),
            (">=", Op::Ge, 2),
            ("<=", Op::Le, 2),
            (">", Op::Gt, 1),
            ("<", Op::Lt, 1),
        ] {
            if s.starts_with(text) {
                return Some((op, len));
            }
        }
        None
    }
}

/// Evaluates one `left OP right` clause, or a bare truthy operand, against
/// `context`. Clauses may be joined with `&&`/`||`, left-to-right, no
/// operator precedence beyond that (sufficient for routing expressions —
/// this is not a general-purpose language).
pub fn evaluate(expr: &str, context: &HashMap<String, Value>) -> Result<bool> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(true);
    }
    if let Some(rest) = split_once_logical(expr, "||") {
        let (left, right) = rest;
        return Ok(evaluate(left, context)? || evaluate(right, context)?);
    }
    if let Some(rest) = split_once_logical(expr, "&&") {
        let (left, right) = rest;
        return Ok(evaluate(left, context)? && evaluate(right, context)?);
    }
    evaluate_clause(expr, context)
}

fn split_once_logical<'a>(expr: &'a str, token: &str) -> Option<(&'a str, &'a str)> {
    expr.find(token).map(|idx| (&expr[..idx], &expr[idx + token.len()..]))
}

fn evaluate_clause(clause: &str, context: &HashMap<String, Value>) -> Result<bool> {
    let clause = clause.trim();
    for idx in 0..clause.len() {
        if let Some((op, len)) = Op::parse(&clause[idx..]) {
            let left = resolve_operand(clause[..idx].trim(), context)?;
            let right = resolve_operand(clause[idx + len..].trim(), context)?;
            return Ok(compare(op, &left, &right));
        }
    }
    // No comparison operator: truthy check on the bare variable. Unlike an
    // operand beside `==`/`!=`, an unresolved bare clause is a missing
    // variable, not a string literal of its own name.
    Ok(is_truthy(&resolve_variable(clause, context)?))
}

fn literal(token: &str) -> Option<Value> {
    if token == "true" {
        return Some(Value::Bool(true));
    }
    if token == "false" {
        return Some(Value::Bool(false));
    }
    if token == "null" {
        return Some(Value::Null);
    }
    if (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
        || (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
    {
        return Some(Value::String(token[1..token.len() - 1].to_string()));
    }
    if let Ok(n) = token.parse::<f64>() {
        return Some(serde_json::json!(n));
    }
    None
}

/// Resolves one side of a comparison: a path that isn't in `context` falls
/// back to its own text as a string literal, so `status == failed` works
/// without quoting `failed`.
fn resolve_operand(token: &str, context: &HashMap<String, Value>) -> Result<Value> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::validation("empty operand in condition expression"));
    }
    if let Some(v) = literal(token) {
        return Ok(v);
    }
    Ok(lookup_path(token, context).unwrap_or_else(|| Value::String(token.to_string())))
}

/// Resolves a bare clause with no operator: a missing variable is `null`,
/// not a literal string of its own name.
fn resolve_variable(token: &str, context: &HashMap<String, Value>) -> Result<Value> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::validation("empty operand in condition expression"));
    }
    if let Some(v) = literal(token) {
        return Ok(v);
    }
    Ok(lookup_path(token, context).unwrap_or(Value::Null))
}

/// Dotted-path lookup into the flat `context` map, e.g. `node_a.status`.
fn lookup_path(path: &str, context: &HashMap<String, Value>) -> Option<Value> {
    let mut parts = path.split('.');
    let head = parts.next()?;
    let mut current = context.get(head)?.clone();
    for part in parts {
        current = current.get(part)?.clone();
    }
    Some(current)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(op: Op, left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            Op::Eq => l == r,
            Op::Ne => l != r,
            Op::Gt => l > r,
            Op::Lt => l < r,
            Op::Ge => l >= r,
            Op::Le => l <= r,
        };
    }
    match op {
        Op::Eq => left == right,
        Op::Ne => left != right,
        // Ordering comparisons between non-numeric values are never true.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn numeric_comparison() {
        let c = ctx(&[("x", serde_json::json!(42))]);
        assert!(evaluate("x > 0", &c).unwrap());
        assert!(!evaluate("x < 0", &c).unwrap());
    }

    #[test]
    fn string_equality_on_nested_status() {
        let c = ctx(&[("b", serde_json::json!({"status": "failed"}))]);
        assert!(evaluate("b.status == failed", &c).unwrap());
    }

    #[test]
    fn missing_variable_resolves_null_and_is_falsy() {
        let c = HashMap::new();
        assert!(!evaluate("missing", &c).unwrap());
    }

    #[test]
    fn logical_and() {
        let c = ctx(&[("x", serde_json::json!(5)), ("y", serde_json::json!(true))]);
        assert!(evaluate("x > 0 && y == true", &c).unwrap());
        assert!(!evaluate("x > 0 && y == false", &c).unwrap());
    }

    #[test]
    fn bare_boolean_truthy_check() {
        let c = ctx(&[("flag", serde_json::json!(true))]);
        assert!(evaluate("flag", &c).unwrap());
    }
}
