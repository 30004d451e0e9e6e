//! Deep JSON containment used by body restrictions.

use serde_json::Value;

/// Check if `subset` is contained in `target`.
///
/// Objects match when every key of `subset` is present in `target` with a contained
/// value. Arrays match when the elements of `subset` are contained, in order, in
/// distinct elements of `target`. Primitives must be equal.
pub fn json_contains(target: &Value, subset: &Value) -> bool {
    match (target, subset) {
        (Value::Object(t), Value::Object(s)) => s
            .iter()
            .all(|(k, sv)| t.get(k).is_some_and(|tv| json_contains(tv, sv))),
        (Value::Array(t), Value::Array(s)) => array_contains(t, s),
        _ => target == subset,
    }
}

/// Ordered subsequence match; each target element satisfies at most one subset element.
fn array_contains(target: &[Value], subset: &[Value]) -> bool {
    if target.len() < subset.len() {
        return false;
    }
    let mut remaining = target.iter();
    subset
        .iter()
        .all(|sv| remaining.any(|tv| json_contains(tv, sv)))
}
