//! Comparator behaviour as seen through the public `check` entry point.

use drill_core::{check, Comparator, RowOrdering, Table, Value, Verdict};

fn mean_table(value: f64) -> Value {
    Value::Table(Table::new(
        vec!["Category".into(), "mean".into()],
        vec![
            vec![Value::from("A"), Value::Float(value)],
            vec![Value::from("B"), Value::Float(1.5)],
        ],
    ))
}

#[test]
fn exact_is_order_sensitive() {
    let a = Value::int_list(&[1, 2, 3]);
    assert_eq!(check(&Comparator::Exact, &a, &a.clone()), Verdict::Match);
    assert!(!check(&Comparator::Exact, &a, &Value::int_list(&[1, 3, 2])).is_match());
}

#[test]
fn set_equivalence_ignores_order() {
    let verdict = check(
        &Comparator::set(),
        &Value::int_list(&[1, 2, 3]),
        &Value::int_list(&[3, 2, 1]),
    );
    assert_eq!(verdict, Verdict::Match);
}

#[test]
fn tabular_absorbs_rounding_and_names_offending_column() {
    let comparator = Comparator::tabular_sorted_by(&["Category"]);
    assert!(check(&comparator, &mean_table(0.3), &mean_table(0.30000000000000004)).is_match());

    match check(&comparator, &mean_table(0.3), &mean_table(0.31)) {
        Verdict::Mismatch(explanation) => assert!(explanation.contains("column 'mean'")),
        Verdict::Match => panic!("a 0.01 difference must fail"),
    }
}

#[test]
fn tabular_custom_tolerance() {
    let loose = Comparator::TabularEquivalence {
        tolerance: 0.05,
        ordering: RowOrdering::Sensitive,
    };
    assert!(check(&loose, &mean_table(0.3), &mean_table(0.31)).is_match());
}

#[test]
fn numeric_tolerance_accepts_close_metric() {
    let verdict = check(
        &Comparator::numeric(),
        &Value::Float(0.1738),
        &Value::Float(0.17379999),
    );
    assert_eq!(verdict, Verdict::Match);
}

#[test]
fn numeric_tolerance_reports_delta() {
    match check(&Comparator::numeric(), &Value::Float(0.33754), &Value::Float(0.1738)) {
        Verdict::Mismatch(explanation) => {
            assert!(explanation.contains("delta"));
            assert!(explanation.contains("exceeds tolerance"));
        }
        Verdict::Match => panic!("0.1738 is far from 0.33754"),
    }
}
