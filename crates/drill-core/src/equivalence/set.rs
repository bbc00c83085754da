//! Set-equivalence comparator — same elements, any order.

use crate::domain::Value;

use super::{describe, Verdict};

/// Compare two collections ignoring order.
///
/// Without `multiset`, duplicates collapse (`[1, 1, 2]` matches `[2, 1]`).
/// With `multiset`, every element must occur the same number of times.
pub fn compare(expected: &Value, actual: &Value, multiset: bool) -> Verdict {
    let (expected_items, actual_items) = match (expected, actual) {
        (Value::List(e), Value::List(a)) => (e.as_slice(), a.as_slice()),
        (e, a) => {
            return Verdict::Mismatch(format!(
                "expected a collection {}, got {}",
                e,
                describe(a)
            ))
        }
    };

    let (mut missing, mut unexpected) = if multiset {
        multiset_difference(expected_items, actual_items)
    } else {
        let e = distinct(expected_items);
        let a = distinct(actual_items);
        (
            e.iter().filter(|x| !contains(&a, x)).cloned().collect(),
            a.iter().filter(|x| !contains(&e, x)).cloned().collect(),
        )
    };

    if missing.is_empty() && unexpected.is_empty() {
        return Verdict::Match;
    }

    missing.sort_by(|a, b| a.total_cmp(b));
    unexpected.sort_by(|a, b| a.total_cmp(b));

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing elements: {}", Value::List(missing)));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected elements: {}", Value::List(unexpected)));
    }
    Verdict::Mismatch(parts.join("; "))
}

fn contains(items: &[Value], needle: &Value) -> bool {
    items.iter().any(|v| v.semantic_eq(needle))
}

fn distinct(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !contains(&out, item) {
            out.push(item.clone());
        }
    }
    out
}

/// Elements of `expected` left unmatched, and elements of `actual` left over.
fn multiset_difference(expected: &[Value], actual: &[Value]) -> (Vec<Value>, Vec<Value>) {
    let mut pool: Vec<Option<&Value>> = actual.iter().map(Some).collect();
    let mut missing = Vec::new();
    for item in expected {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.is_some_and(|v| v.semantic_eq(item)));
        match slot {
            Some(slot) => *slot = None,
            None => missing.push(item.clone()),
        }
    }
    let unexpected = pool.into_iter().flatten().cloned().collect();
    (missing, unexpected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_ignored() {
        let verdict = compare(&Value::int_list(&[1, 2, 3]), &Value::int_list(&[3, 2, 1]), false);
        assert!(verdict.is_match());
    }

    #[test]
    fn test_duplicates_collapse_without_multiset() {
        let verdict = compare(&Value::int_list(&[2]), &Value::int_list(&[2, 2]), false);
        assert!(verdict.is_match());
    }

    #[test]
    fn test_duplicates_count_with_multiset() {
        let verdict = compare(&Value::int_list(&[2]), &Value::int_list(&[2, 2]), true);
        assert_eq!(verdict, Verdict::Mismatch("unexpected elements: [2]".into()));
    }

    #[test]
    fn test_missing_and_unexpected_are_reported() {
        let verdict = compare(&Value::int_list(&[1, 2, 3]), &Value::int_list(&[4, 1, 2]), false);
        assert_eq!(
            verdict,
            Verdict::Mismatch("missing elements: [3]; unexpected elements: [4]".into())
        );
    }

    #[test]
    fn test_non_collection_is_a_mismatch() {
        let verdict = compare(&Value::int_list(&[1]), &Value::Int(1), false);
        match verdict {
            Verdict::Mismatch(msg) => assert!(msg.contains("got int 1")),
            Verdict::Match => panic!("scalar must not match a collection"),
        }
    }
}
