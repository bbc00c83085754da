//! Numeric-tolerance comparator for metric-style answers.

use crate::domain::Value;

use super::{describe, floats_close, Verdict};

/// Compare a scalar, or a vector of numbers element-wise, within `epsilon`.
pub fn compare(expected: &Value, actual: &Value, epsilon: f64) -> Verdict {
    match (expected, actual) {
        (Value::List(e), Value::List(a)) => compare_vectors(e, a, epsilon),
        (e, a) => match scalar(e, a, epsilon) {
            Ok(()) => Verdict::Match,
            Err(msg) => Verdict::Mismatch(msg),
        },
    }
}

fn compare_vectors(expected: &[Value], actual: &[Value], epsilon: f64) -> Verdict {
    if expected.len() != actual.len() {
        return Verdict::Mismatch(format!(
            "length differs: expected {} items, got {}",
            expected.len(),
            actual.len()
        ));
    }
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        if let Err(msg) = scalar(e, a, epsilon) {
            return Verdict::Mismatch(format!("index {i} differs: {msg}"));
        }
    }
    Verdict::Match
}

fn scalar(expected: &Value, actual: &Value, epsilon: f64) -> Result<(), String> {
    let Some(a) = actual.as_f64() else {
        return Err(format!("expected a number, got {}", describe(actual)));
    };
    let Some(e) = expected.as_f64() else {
        return Err(format!("expected {expected}, got {actual}"));
    };
    if floats_close(e, a, epsilon) {
        return Ok(());
    }
    Err(format!(
        "expected {expected}, got {actual} (delta {} exceeds tolerance {})",
        Value::Float((a - e).abs()),
        Value::Float(epsilon)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_within_epsilon_passes() {
        let verdict = compare(&Value::Float(0.1738), &Value::Float(0.17379999), 1e-4);
        assert!(verdict.is_match());
    }

    #[test]
    fn test_delta_is_reported() {
        let verdict = compare(&Value::Float(0.5), &Value::Float(0.6), 1e-4);
        assert_eq!(
            verdict,
            Verdict::Mismatch(
                "expected 0.5, got 0.6 (delta 0.09999999999999998 exceeds tolerance 0.0001)".into()
            )
        );
    }

    #[test]
    fn test_int_answer_for_float_expectation() {
        assert!(compare(&Value::Float(3.0), &Value::Int(3), 1e-4).is_match());
    }

    #[test]
    fn test_vectors_compare_element_wise() {
        let expected = Value::float_list(&[0.1, 0.2]);
        assert!(compare(&expected, &Value::float_list(&[0.10001, 0.2]), 1e-4).is_match());
        match compare(&expected, &Value::float_list(&[0.1, 0.3]), 1e-4) {
            Verdict::Mismatch(msg) => assert!(msg.starts_with("index 1 differs")),
            Verdict::Match => panic!("0.3 must not match 0.2"),
        }
        assert!(!compare(&expected, &Value::float_list(&[0.1]), 1e-4).is_match());
    }

    #[test]
    fn test_non_numeric_answer() {
        assert_eq!(
            compare(&Value::Float(1.0), &Value::from("1.0"), 1e-4),
            Verdict::Mismatch("expected a number, got str '1.0'".into())
        );
    }
}
