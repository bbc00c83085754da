//! Values exchanged between evaluators, the query engine and the equivalence checker.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::table::Table;

/// A language-neutral value produced by a submission or a reference computation.
///
/// Serialised adjacently tagged (`{"type": "int", "value": 3}`) so that the
/// external-process harness can emit it without knowing Rust's layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Str(String),
    List(Vec<Value>),
    /// Key/value pairs in insertion order. Equality ignores order.
    Map(Vec<(Value, Value)>),
    Table(Table),
}

impl Value {
    /// Short shape name used in mismatch explanations.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Table(_) => "table",
        }
    }

    /// Numeric view of ints and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Scalars are the only values allowed inside table cells.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_) | Value::Table(_))
    }

    /// Convenience constructor for lists of ints.
    pub fn int_list(items: &[i64]) -> Value {
        Value::List(items.iter().map(|i| Value::Int(*i)).collect())
    }

    /// Convenience constructor for lists of floats.
    pub fn float_list(items: &[f64]) -> Value {
        Value::List(items.iter().map(|f| Value::Float(*f)).collect())
    }

    /// Convenience constructor for lists of strings.
    pub fn str_list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::Str((*s).to_string())).collect())
    }

    /// Deep equality where an int and a float holding the same number are equal
    /// and map entries are compared without regard to order.
    pub fn semantic_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
                _ => false,
            },
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantic_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k.semantic_eq(k2))
                            .is_some_and(|(_, v2)| v.semantic_eq(v2))
                    })
            }
            (Value::Table(a), Value::Table(b)) => {
                a.columns == b.columns
                    && a.rows.len() == b.rows.len()
                    && a.rows.iter().zip(&b.rows).all(|(ra, rb)| {
                        ra.len() == rb.len() && ra.iter().zip(rb).all(|(x, y)| x.semantic_eq(y))
                    })
            }
            _ => false,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
            Value::Map(_) => 5,
            Value::Table(_) => 6,
        }
    }

    /// Total order across all values, used for canonical sorting.
    ///
    /// Values of different kinds order by kind; numbers compare numerically
    /// regardless of int/float representation.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => cmp_sequences(a, b),
            (Value::Map(a), Value::Map(b)) => {
                let mut left = a.clone();
                let mut right = b.clone();
                left.sort_by(|x, y| x.0.total_cmp(&y.0));
                right.sort_by(|x, y| x.0.total_cmp(&y.0));
                for ((ka, va), (kb, vb)) in left.iter().zip(&right) {
                    let ord = ka.total_cmp(kb).then_with(|| va.total_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                left.len().cmp(&right.len())
            }
            (Value::Table(a), Value::Table(b)) => a
                .columns
                .cmp(&b.columns)
                .then_with(|| {
                    for (ra, rb) in a.rows.iter().zip(&b.rows) {
                        let ord = cmp_sequences(ra, rb);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    a.rows.len().cmp(&b.rows.len())
                }),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }
}

fn cmp_sequences(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Format a float the way a learner expects to read it (`1.0`, `0.3`, `1e-15`).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        format!("{f:e}")
    } else if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Table(t) => write!(
                f,
                "table(columns=[{}], rows={})",
                t.columns.join(", "),
                t.rows.len()
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

/// Non-finite floats travel as strings because JSON has no literal for them.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.as_str() {
                "NaN" | "nan" => Ok(f64::NAN),
                "inf" | "Infinity" => Ok(f64::INFINITY),
                "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid float literal '{other}'"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_and_float_are_semantically_equal() {
        assert!(Value::Int(2).semantic_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).semantic_eq(&Value::Float(2.5)));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = Value::Map(vec![
            (Value::from("a"), Value::Int(1)),
            (Value::from("b"), Value::Int(2)),
        ]);
        let b = Value::Map(vec![
            (Value::from("b"), Value::Int(2)),
            (Value::from("a"), Value::Int(1)),
        ]);
        assert!(a.semantic_eq(&b));
    }

    #[test]
    fn test_total_cmp_orders_kinds_then_values() {
        let mut values = vec![
            Value::from("b"),
            Value::Int(3),
            Value::Null,
            Value::Float(1.5),
            Value::from("a"),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(1.5),
                Value::Int(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_display_is_python_like() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::from("x"),
            Value::Bool(true),
            Value::Null,
        ]);
        assert_eq!(v.to_string(), "[1, 2.0, 'x', True, None]");
        assert_eq!(Value::Float(1e-15).to_string(), "1e-15");
        assert_eq!(Value::Float(0.1738).to_string(), "0.1738");
    }

    #[test]
    fn test_non_finite_float_serde() {
        let json = serde_json::to_string(&Value::Float(f64::INFINITY)).expect("serialize");
        assert_eq!(json, r#"{"type":"float","value":"inf"}"#);
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_harness_wire_format_parses() {
        let json = r#"{"type":"list","value":[{"type":"int","value":0},{"type":"float","value":1}]}"#;
        let v: Value = serde_json::from_str(json).expect("deserialize");
        assert_eq!(v, Value::List(vec![Value::Int(0), Value::Float(1.0)]));

        let null: Value = serde_json::from_str(r#"{"type":"null"}"#).expect("deserialize");
        assert_eq!(null, Value::Null);
    }
}
