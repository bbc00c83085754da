//! Exact comparator — deep structural equality.

use crate::domain::Value;

use super::{describe, tabular, RowOrdering, Verdict};

/// Compare two values structurally.
///
/// Sequences are compared in order and the first differing index is reported.
/// Maps are compared by key. Tables must match cell for cell, in order.
pub fn compare(expected: &Value, actual: &Value) -> Verdict {
    match (expected, actual) {
        (Value::List(e), Value::List(a)) => compare_sequences(e, a),
        (Value::Map(e), Value::Map(a)) => compare_maps(e, a),
        (Value::Table(_), Value::Table(_)) => {
            tabular::compare(expected, actual, 0.0, &RowOrdering::Sensitive)
        }
        (e, a) if e.semantic_eq(a) => Verdict::Match,
        (e, a) if same_shape(e, a) => Verdict::Mismatch(format!("expected {e}, got {a}")),
        (e, a) => Verdict::Mismatch(format!(
            "type differs: expected {}, got {}",
            describe(e),
            describe(a)
        )),
    }
}

fn same_shape(a: &Value, b: &Value) -> bool {
    (a.is_numeric() && b.is_numeric()) || a.type_name() == b.type_name()
}

fn compare_sequences(expected: &[Value], actual: &[Value]) -> Verdict {
    if let Some((i, (e, a))) = expected
        .iter()
        .zip(actual)
        .enumerate()
        .find(|(_, (e, a))| !e.semantic_eq(a))
    {
        return Verdict::Mismatch(format!("index {i} differs: expected {e}, got {a}"));
    }
    if expected.len() != actual.len() {
        return Verdict::Mismatch(format!(
            "length differs: expected {} items, got {}",
            expected.len(),
            actual.len()
        ));
    }
    Verdict::Match
}

fn compare_maps(expected: &[(Value, Value)], actual: &[(Value, Value)]) -> Verdict {
    for (key, value) in expected {
        match actual.iter().find(|(k, _)| k.semantic_eq(key)) {
            None => return Verdict::Mismatch(format!("missing key {key}")),
            Some((_, got)) if !value.semantic_eq(got) => {
                return Verdict::Mismatch(format!(
                    "key {key} differs: expected {value}, got {got}"
                ))
            }
            Some(_) => {}
        }
    }
    if let Some((key, _)) = actual
        .iter()
        .find(|(k, _)| !expected.iter().any(|(e, _)| e.semantic_eq(k)))
    {
        return Verdict::Mismatch(format!("unexpected key {key}"));
    }
    Verdict::Match
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Table;

    #[test]
    fn test_equal_sequences_match() {
        let v = Value::int_list(&[1, 2, 3]);
        assert_eq!(compare(&v, &v.clone()), Verdict::Match);
    }

    #[test]
    fn test_order_matters() {
        let verdict = compare(&Value::int_list(&[1, 2, 3]), &Value::int_list(&[1, 3, 2]));
        assert_eq!(
            verdict,
            Verdict::Mismatch("index 1 differs: expected 2, got 3".into())
        );
    }

    #[test]
    fn test_pair_sum_explanation() {
        let verdict = compare(&Value::int_list(&[0, 1]), &Value::int_list(&[1, 0]));
        assert_eq!(
            verdict,
            Verdict::Mismatch("index 0 differs: expected 0, got 1".into())
        );
    }

    #[test]
    fn test_length_mismatch_after_common_prefix() {
        let verdict = compare(&Value::int_list(&[1, 2]), &Value::int_list(&[1, 2, 3]));
        assert_eq!(
            verdict,
            Verdict::Mismatch("length differs: expected 2 items, got 3".into())
        );
    }

    #[test]
    fn test_int_and_float_scalars_match() {
        assert!(compare(&Value::Int(49), &Value::Float(49.0)).is_match());
    }

    #[test]
    fn test_type_mismatch_is_explained() {
        let verdict = compare(&Value::Bool(true), &Value::Int(1));
        match verdict {
            Verdict::Mismatch(msg) => assert!(msg.starts_with("type differs: expected bool True")),
            Verdict::Match => panic!("bool and int must not match exactly"),
        }
    }

    #[test]
    fn test_maps_compare_by_key() {
        let e = Value::Map(vec![(Value::from("a"), Value::Int(1))]);
        let a = Value::Map(vec![(Value::from("a"), Value::Int(2))]);
        assert_eq!(
            compare(&e, &a),
            Verdict::Mismatch("key 'a' differs: expected 1, got 2".into())
        );

        let extra = Value::Map(vec![
            (Value::from("a"), Value::Int(1)),
            (Value::from("b"), Value::Int(2)),
        ]);
        assert_eq!(
            compare(&e, &extra),
            Verdict::Mismatch("unexpected key 'b'".into())
        );
    }

    #[test]
    fn test_tables_are_order_sensitive() {
        let a = Value::Table(Table::new(
            vec!["x".into()],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        ));
        let b = Value::Table(Table::new(
            vec!["x".into()],
            vec![vec![Value::Int(2)], vec![Value::Int(1)]],
        ));
        assert!(compare(&a, &a).is_match());
        assert!(!compare(&a, &b).is_match());
    }
}
