//! Tabular comparator — columns, row count, then cells within a tolerance.

use std::cmp::Ordering;

use crate::domain::{Table, Value};

use super::{describe, floats_close, RowOrdering, Verdict};

/// Compare two tables.
///
/// Column names must match in order and row counts must agree. Rows are then
/// aligned according to `ordering` and compared cell by cell; numeric cells
/// are equal when within `tolerance` (absolute or relative), and a null
/// matches a NaN.
pub fn compare(expected: &Value, actual: &Value, tolerance: f64, ordering: &RowOrdering) -> Verdict {
    let (expected, actual) = match (expected, actual) {
        (Value::Table(e), Value::Table(a)) => (e, a),
        (e, a) => {
            return Verdict::Mismatch(format!(
                "expected a table {}, got {}",
                e,
                describe(a)
            ))
        }
    };

    if expected.columns != actual.columns {
        return Verdict::Mismatch(format!(
            "column names differ: expected {}, got {}",
            column_list(expected),
            column_list(actual)
        ));
    }

    if expected.row_count() != actual.row_count() {
        return Verdict::Mismatch(format!(
            "row count differs: expected {} rows, got {}",
            expected.row_count(),
            actual.row_count()
        ));
    }

    let (expected_rows, actual_rows) = match ordering {
        RowOrdering::Sensitive => (row_refs(expected), row_refs(actual)),
        RowOrdering::SortedBy { keys } => {
            let key_indices = match key_indices(expected, keys) {
                Ok(indices) => indices,
                Err(verdict) => return verdict,
            };
            (
                canonical_rows(expected, &key_indices),
                canonical_rows(actual, &key_indices),
            )
        }
    };

    for (r, (e_row, a_row)) in expected_rows.iter().zip(&actual_rows).enumerate() {
        for (c, column) in expected.columns.iter().enumerate() {
            let (e, a) = match (e_row.get(c), a_row.get(c)) {
                (Some(e), Some(a)) => (e, a),
                _ => {
                    return Verdict::Mismatch(format!(
                        "row {r} is missing a cell for column '{column}'"
                    ))
                }
            };
            if !cells_equal(e, a, tolerance) {
                return Verdict::Mismatch(cell_explanation(r, column, e, a));
            }
        }
    }

    Verdict::Match
}

fn column_list(table: &Table) -> String {
    format!("[{}]", table.columns.join(", "))
}

fn row_refs(table: &Table) -> Vec<&[Value]> {
    table.rows.iter().map(Vec::as_slice).collect()
}

fn key_indices(table: &Table, keys: &[String]) -> Result<Vec<usize>, Verdict> {
    keys.iter()
        .map(|key| {
            table.column_index(key).ok_or_else(|| {
                Verdict::Mismatch(format!(
                    "sort key column '{key}' is not in the result (columns {})",
                    column_list(table)
                ))
            })
        })
        .collect()
}

/// Rows sorted by the key columns, then by every remaining column left to right.
fn canonical_rows<'a>(table: &'a Table, keys: &[usize]) -> Vec<&'a [Value]> {
    let rest: Vec<usize> = (0..table.columns.len())
        .filter(|c| !keys.contains(c))
        .collect();
    let mut rows = row_refs(table);
    rows.sort_by(|a, b| {
        keys.iter()
            .chain(&rest)
            .map(|&c| cell_order(a.get(c), b.get(c)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    rows
}

fn cell_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}

fn cells_equal(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    if is_missing(expected) || is_missing(actual) {
        return is_missing(expected) && is_missing(actual);
    }
    // Integers carry no rounding error to absorb.
    if let (Value::Int(e), Value::Int(a)) = (expected, actual) {
        return e == a;
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => floats_close(e, a, tolerance),
        _ => expected.semantic_eq(actual),
    }
}

fn cell_explanation(row: usize, column: &str, expected: &Value, actual: &Value) -> String {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => format!(
            "row {row}, column '{column}' differs: expected {expected}, got {actual} (delta {})",
            Value::Float((a - e).abs())
        ),
        _ => format!("row {row}, column '{column}' differs: expected {expected}, got {actual}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::DEFAULT_TABULAR_TOLERANCE;

    fn stats(values: &[f64]) -> Value {
        let categories = ["A", "B", "C"];
        Value::Table(
            Table::from_columns(vec![
                (
                    "Category",
                    categories[..values.len()]
                        .iter()
                        .map(|c| Value::from(*c))
                        .collect(),
                ),
                ("mean", values.iter().map(|v| Value::Float(*v)).collect()),
            ])
            .expect("table"),
        )
    }

    fn sorted() -> RowOrdering {
        RowOrdering::SortedBy {
            keys: vec!["Category".into()],
        }
    }

    #[test]
    fn test_float_rounding_is_absorbed() {
        let verdict = compare(
            &stats(&[0.3, 1.0]),
            &stats(&[0.1 + 0.2, 1.0]),
            DEFAULT_TABULAR_TOLERANCE,
            &sorted(),
        );
        assert!(verdict.is_match());
    }

    #[test]
    fn test_integer_cells_compare_exactly() {
        let headcount = |n: i64| {
            Value::Table(
                Table::from_columns(vec![
                    ("name", vec![Value::from("Engineering")]),
                    ("total", vec![Value::Int(n)]),
                ])
                .expect("table"),
            )
        };
        let ordering = RowOrdering::SortedBy {
            keys: vec!["name".into()],
        };
        assert!(compare(&headcount(1_000_000_000), &headcount(1_000_000_000), 1e-8, &ordering).is_match());
        match compare(&headcount(1_000_000_000), &headcount(1_000_000_005), 1e-8, &ordering) {
            Verdict::Mismatch(msg) => {
                assert!(msg.starts_with("row 0, column 'total' differs"), "{msg}");
                assert!(msg.contains("expected 1000000000, got 1000000005"), "{msg}");
            }
            Verdict::Match => panic!("integers five apart must not match"),
        }

        let as_float = Value::Table(
            Table::from_columns(vec![
                ("name", vec![Value::from("Engineering")]),
                ("total", vec![Value::Float(1_000_000_000.0)]),
            ])
            .expect("table"),
        );
        assert!(compare(&headcount(1_000_000_000), &as_float, 1e-8, &ordering).is_match());
    }

    #[test]
    fn test_off_by_a_hundredth_names_the_column() {
        let verdict = compare(
            &stats(&[0.3, 1.0]),
            &stats(&[0.31, 1.0]),
            DEFAULT_TABULAR_TOLERANCE,
            &sorted(),
        );
        match verdict {
            Verdict::Mismatch(msg) => {
                assert!(msg.starts_with("row 0, column 'mean' differs"), "{msg}");
                assert!(msg.contains("expected 0.3, got 0.31"), "{msg}");
            }
            Verdict::Match => panic!("0.31 must not match 0.3"),
        }
    }

    #[test]
    fn test_sorted_ordering_ignores_row_order() {
        let expected = stats(&[1.0, 2.0]);
        let actual = Value::Table(Table::new(
            vec!["Category".into(), "mean".into()],
            vec![
                vec![Value::from("B"), Value::Float(2.0)],
                vec![Value::from("A"), Value::Int(1)],
            ],
        ));
        assert!(compare(&expected, &actual, 1e-8, &sorted()).is_match());
        assert!(!compare(&expected, &actual, 1e-8, &RowOrdering::Sensitive).is_match());
    }

    #[test]
    fn test_column_order_matters() {
        let expected = stats(&[1.0]);
        let actual = Value::Table(Table::new(
            vec!["mean".into(), "Category".into()],
            vec![vec![Value::Float(1.0), Value::from("A")]],
        ));
        assert_eq!(
            compare(&expected, &actual, 1e-8, &sorted()),
            Verdict::Mismatch(
                "column names differ: expected [Category, mean], got [mean, Category]".into()
            )
        );
    }

    #[test]
    fn test_row_count_mismatch() {
        assert_eq!(
            compare(&stats(&[1.0, 2.0]), &stats(&[1.0]), 1e-8, &sorted()),
            Verdict::Mismatch("row count differs: expected 2 rows, got 1".into())
        );
    }

    #[test]
    fn test_null_matches_nan_only() {
        let with = |cell: Value| {
            Value::Table(Table::new(vec!["r".into()], vec![vec![cell]]))
        };
        let ordered = RowOrdering::Sensitive;
        assert!(compare(&with(Value::Null), &with(Value::Float(f64::NAN)), 1e-8, &ordered).is_match());
        assert!(!compare(&with(Value::Null), &with(Value::Float(0.0)), 1e-8, &ordered).is_match());
    }

    #[test]
    fn test_missing_sort_key_is_a_mismatch() {
        let ordering = RowOrdering::SortedBy {
            keys: vec!["id".into()],
        };
        match compare(&stats(&[1.0]), &stats(&[1.0]), 1e-8, &ordering) {
            Verdict::Mismatch(msg) => assert!(msg.contains("sort key column 'id'")),
            Verdict::Match => panic!("missing key column must be reported"),
        }
    }

    #[test]
    fn test_non_table_result() {
        match compare(&stats(&[1.0]), &Value::int_list(&[1]), 1e-8, &sorted()) {
            Verdict::Mismatch(msg) => assert!(msg.contains("got list [1]")),
            Verdict::Match => panic!("list must not match a table"),
        }
    }
}
