//! Document filter AST and its evaluator. The same tree feeds both direct
//! in-memory evaluation and predicate pushdown rewriting.

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Leaf { field: String, op: CompareOp },
}

#[derive(Debug, Clone)]
pub enum CompareOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    All(Vec<Value>),
    ElemMatch(Box<Filter>),
    Size(usize),
}

/// Resolve dot-notation `field` against `doc`, distinguishing a missing key
/// (`None`) from a key whose value is JSON `null` (`Some(&Value::Null)`).
fn resolve<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub fn evaluate(filter: &Filter, doc: &Value) -> bool {
    if doc.is_null() {
        return false;
    }
    match filter {
        Filter::And(children) => children.iter().all(|f| evaluate(f, doc)),
        Filter::Or(children) => children.iter().any(|f| evaluate(f, doc)),
        Filter::Nor(children) => !children.iter().any(|f| evaluate(f, doc)),
        Filter::Not(child) => !evaluate(child, doc),
        Filter::Leaf { field, op } => evaluate_leaf(field, op, doc),
    }
}

fn evaluate_leaf(field: &str, op: &CompareOp, doc: &Value) -> bool {
    let resolved = resolve(doc, field);
    match op {
        CompareOp::Exists(want) => *want == resolved.is_some(),
        _ => {
            let Some(value) = resolved else { return false };
            match op {
                CompareOp::Eq(v) => value == v,
                CompareOp::Ne(v) => value != v,
                CompareOp::Gt(v) => compare_numeric(value, v).map(|o| o.is_gt()).unwrap_or(false),
                CompareOp::Gte(v) => compare_numeric(value, v).map(|o| o.is_ge()).unwrap_or(false),
                CompareOp::Lt(v) => compare_numeric(value, v).map(|o| o.is_lt()).unwrap_or(false),
                CompareOp::Lte(v) => compare_numeric(value, v).map(|o| o.is_le()).unwrap_or(false),
                CompareOp::In(options) => options.contains(value),
                CompareOp::Nin(options) => !options.contains(value),
                CompareOp::Regex(pattern) => Regex::new(pattern)
                    .ok()
                    .and_then(|re| value.as_str().map(|s| re.is_match(s)))
                    .unwrap_or(false),
                CompareOp::StartsWith(prefix) => value.as_str().map(|s| s.starts_with(prefix.as_str())).unwrap_or(false),
                CompareOp::EndsWith(suffix) => value.as_str().map(|s| s.ends_with(suffix.as_str())).unwrap_or(false),
                CompareOp::Contains(needle) => value.as_str().map(|s| s.contains(needle.as_str())).unwrap_or(false),
                CompareOp::All(items) => value
                    .as_array()
                    .map(|arr| items.iter().all(|i| arr.contains(i)))
                    .unwrap_or(false),
                CompareOp::ElemMatch(sub) => value
                    .as_array()
                    .map(|arr| arr.iter().any(|item| evaluate(sub, item)))
                    .unwrap_or(false),
                CompareOp::Size(n) => value.as_array().map(|arr| arr.len() == *n).unwrap_or(false),
                CompareOp::Exists(_) => unreachable!("handled above"),
            }
        }
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => a.as_str().zip(b.as_str()).map(|(x, y)| x.cmp(y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_and_or_nor_algebra() {
        let doc = json!({});
        assert!(evaluate(&Filter::And(vec![]), &doc));
        assert!(!evaluate(&Filter::Or(vec![]), &doc));
        assert!(evaluate(&Filter::Nor(vec![]), &doc));
    }

    #[test]
    fn not_empty_object_is_false() {
        let doc = json!({});
        assert!(!evaluate(&Filter::Not(Box::new(Filter::And(vec![]))), &doc));
    }

    #[test]
    fn null_document_fails_nontrivial_filter() {
        let leaf = Filter::Leaf {
            field: "a".into(),
            op: CompareOp::Eq(json!(1)),
        };
        assert!(!evaluate(&leaf, &Value::Null));
    }

    #[test]
    fn exists_distinguishes_missing_from_null() {
        let doc = json!({"a": null});
        assert!(evaluate(
            &Filter::Leaf { field: "a".into(), op: CompareOp::Exists(true) },
            &doc
        ));
        assert!(!evaluate(
            &Filter::Leaf { field: "b".into(), op: CompareOp::Exists(true) },
            &doc
        ));
    }

    #[test]
    fn dot_notation_resolves_nested_fields() {
        let doc = json!({"address": {"city": "NYC"}});
        let filter = Filter::Leaf {
            field: "address.city".into(),
            op: CompareOp::Eq(json!("NYC")),
        };
        assert!(evaluate(&filter, &doc));
    }

    #[test]
    fn elem_match_runs_subfilter_per_element() {
        let doc = json!({"tags": [{"name": "a"}, {"name": "b"}]});
        let filter = Filter::Leaf {
            field: "tags".into(),
            op: CompareOp::ElemMatch(Box::new(Filter::Leaf {
                field: "name".into(),
                op: CompareOp::Eq(json!("b")),
            })),
        };
        assert!(evaluate(&filter, &doc));
    }

    #[test]
    fn string_ops_are_case_sensitive() {
        let doc = json!({"name": "Hello"});
        assert!(!evaluate(
            &Filter::Leaf { field: "name".into(), op: CompareOp::StartsWith("hello".into()) },
            &doc
        ));
        assert!(evaluate(
            &Filter::Leaf { field: "name".into(), op: CompareOp::StartsWith("Hello".into()) },
            &doc
        ));
    }
}
