//! Equivalence checker.
//!
//! Decides whether a produced value matches the reference value. The strategy
//! is chosen explicitly per exercise through [`Comparator`]; nothing is
//! inferred from the runtime shape of the values. On mismatch the checker
//! returns a human-readable explanation, which is the only diagnostic the
//! learner sees.
//!
//! # Modules
//!
//! - [`exact`]   — deep structural equality, first differing index
//! - [`set`]     — order-insensitive collection comparison
//! - [`tabular`] — column/row/cell comparison with float tolerance
//! - [`numeric`] — scalar or vector comparison within an epsilon

pub mod exact;
pub mod numeric;
pub mod set;
pub mod tabular;

use serde::{Deserialize, Serialize};

use crate::domain::Value;

/// Default absolute/relative tolerance for numeric table cells.
pub const DEFAULT_TABULAR_TOLERANCE: f64 = 1e-8;

/// Default epsilon for metric-style exercises.
pub const DEFAULT_NUMERIC_EPSILON: f64 = 1e-4;

/// How rows of two tables are aligned before cell comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RowOrdering {
    /// Row order is part of the answer (rolling/window computations).
    Sensitive,
    /// Rows are canonically sorted on these columns (then all remaining
    /// columns) before comparison.
    SortedBy { keys: Vec<String> },
}

/// The comparison strategy declared by an exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Comparator {
    /// Deep structural equality; sequences compared element-wise in order.
    Exact,
    /// Same elements regardless of order. With `multiset` the number of
    /// occurrences must match too.
    SetEquivalence { multiset: bool },
    /// Identical columns (in order), identical row count, cells equal within
    /// `tolerance` for numbers.
    TabularEquivalence { tolerance: f64, ordering: RowOrdering },
    /// Scalars or numeric vectors equal within an absolute or relative epsilon.
    NumericTolerance { epsilon: f64 },
}

impl Comparator {
    /// Set equivalence ignoring duplicate counts.
    pub fn set() -> Self {
        Comparator::SetEquivalence { multiset: false }
    }

    /// Tabular equivalence with the default tolerance, rows sorted on `keys`.
    pub fn tabular_sorted_by(keys: &[&str]) -> Self {
        Comparator::TabularEquivalence {
            tolerance: DEFAULT_TABULAR_TOLERANCE,
            ordering: RowOrdering::SortedBy {
                keys: keys.iter().map(|k| (*k).to_string()).collect(),
            },
        }
    }

    /// Tabular equivalence with the default tolerance where row order matters.
    pub fn tabular_ordered() -> Self {
        Comparator::TabularEquivalence {
            tolerance: DEFAULT_TABULAR_TOLERANCE,
            ordering: RowOrdering::Sensitive,
        }
    }

    /// Numeric tolerance with the default epsilon.
    pub fn numeric() -> Self {
        Comparator::NumericTolerance {
            epsilon: DEFAULT_NUMERIC_EPSILON,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Comparator::Exact => "exact",
            Comparator::SetEquivalence { .. } => "set_equivalence",
            Comparator::TabularEquivalence { .. } => "tabular_equivalence",
            Comparator::NumericTolerance { .. } => "numeric_tolerance",
        }
    }

    /// Reject parameters no comparison could honour.
    pub fn validate(&self) -> Result<(), String> {
        let check_tolerance = |t: f64| {
            if t.is_finite() && t >= 0.0 {
                Ok(())
            } else {
                Err(format!("tolerance must be finite and non-negative, got {t}"))
            }
        };
        match self {
            Comparator::Exact | Comparator::SetEquivalence { .. } => Ok(()),
            Comparator::NumericTolerance { epsilon } => check_tolerance(*epsilon),
            Comparator::TabularEquivalence {
                tolerance,
                ordering,
            } => {
                check_tolerance(*tolerance)?;
                if let RowOrdering::SortedBy { keys } = ordering {
                    if keys.is_empty() {
                        return Err("sorted row ordering needs at least one key column".into());
                    }
                    if let Some(k) = keys.iter().find(|k| k.is_empty()) {
                        return Err(format!("invalid sort key column '{k}'"));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Outcome of a single comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch(String),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// Compare `actual` against `expected` using `comparator`.
pub fn check(comparator: &Comparator, expected: &Value, actual: &Value) -> Verdict {
    match comparator {
        Comparator::Exact => exact::compare(expected, actual),
        Comparator::SetEquivalence { multiset } => set::compare(expected, actual, *multiset),
        Comparator::TabularEquivalence {
            tolerance,
            ordering,
        } => tabular::compare(expected, actual, *tolerance, ordering),
        Comparator::NumericTolerance { epsilon } => numeric::compare(expected, actual, *epsilon),
    }
}

/// Absolute-or-relative closeness test shared by the numeric comparators.
#[allow(clippy::float_cmp)]
pub(crate) fn floats_close(expected: f64, actual: f64, tolerance: f64) -> bool {
    if expected == actual || (expected.is_nan() && actual.is_nan()) {
        return true;
    }
    let delta = (expected - actual).abs();
    if delta <= tolerance {
        return true;
    }
    let scale = expected.abs().max(actual.abs());
    scale.is_finite() && delta <= tolerance * scale
}

/// "a list [1, 2]" style description for type-mismatch explanations.
pub(crate) fn describe(value: &Value) -> String {
    format!("{} {}", value.type_name(), value)
}
