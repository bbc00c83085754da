//! Fixture context builder.
//!
//! A [`FixtureSpec`] is the immutable, exercise-scoped definition of the inputs
//! a submission sees. Every evaluation receives a fresh [`FixtureContext`]
//! materialised from it, and the reference computation receives another one,
//! so nothing a submission does can reach the canonical fixture or the value
//! it is compared against.

use serde::{Deserialize, Serialize};

use crate::domain::{Table, Value};

/// One named fixture input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntry {
    pub name: String,
    pub value: Value,
}

/// Why a fixture definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureError {
    pub entry: String,
    pub reason: String,
}

/// Ordered, named fixture definitions for one exercise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    entries: Vec<FixtureEntry>,
}

impl FixtureSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar or array entry.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.entries.push(FixtureEntry {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Add a table entry.
    pub fn with_table(self, name: &str, table: Table) -> Self {
        self.with(name, Value::Table(table))
    }

    pub fn entries(&self) -> &[FixtureEntry] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Table entries, in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.entries.iter().filter_map(|e| match &e.value {
            Value::Table(t) => Some((e.name.as_str(), t)),
            _ => None,
        })
    }

    /// Check that the fixture is well formed.
    ///
    /// Names must be identifiers and unique; tables must be rectangular with
    /// scalar cells of one kind per column; tables may not be nested.
    pub fn validate(&self) -> Result<(), FixtureError> {
        for (i, entry) in self.entries.iter().enumerate() {
            let fail = |reason: String| FixtureError {
                entry: entry.name.clone(),
                reason,
            };

            if !is_identifier(&entry.name) {
                return Err(fail("name is not a valid identifier".into()));
            }
            if self.entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(fail("name is declared more than once".into()));
            }

            match &entry.value {
                Value::Table(table) => {
                    table.validate().map_err(fail)?;
                    check_column_kinds(table).map_err(fail)?;
                }
                other => {
                    if contains_table(other) {
                        return Err(fail("tables may only appear as top-level entries".into()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Materialise a fresh context. Each call returns independent copies.
    pub fn materialize(&self) -> FixtureContext {
        FixtureContext {
            bindings: self
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.value.clone()))
                .collect(),
        }
    }
}

/// The bindings visible to one submission (or one reference computation).
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureContext {
    bindings: Vec<(String, Value)>,
}

impl FixtureContext {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Look up a table entry.
    pub fn table(&self, name: &str) -> Result<&Table, String> {
        match self.get(name) {
            Some(Value::Table(t)) => Ok(t),
            Some(other) => Err(format!("fixture '{name}' is a {}, not a table", other.type_name())),
            None => Err(format!("fixture '{name}' is missing")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn into_bindings(self) -> Vec<(String, Value)> {
        self.bindings
    }
}

/// ASCII identifier check shared by fixture and slot validation.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn contains_table(value: &Value) -> bool {
    match value {
        Value::Table(_) => true,
        Value::List(items) => items.iter().any(contains_table),
        Value::Map(entries) => entries
            .iter()
            .any(|(k, v)| contains_table(k) || contains_table(v)),
        _ => false,
    }
}

fn check_column_kinds(table: &Table) -> Result<(), String> {
    for (c, name) in table.columns.iter().enumerate() {
        let mut kind: Option<&'static str> = None;
        for row in &table.rows {
            let cell_kind = match &row[c] {
                Value::Null => continue,
                v if v.is_numeric() => "number",
                v => v.type_name(),
            };
            match kind {
                None => kind = Some(cell_kind),
                Some(k) if k == cell_kind => {}
                Some(k) => {
                    return Err(format!(
                        "column '{name}' mixes {k} and {cell_kind} cells"
                    ))
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> Table {
        Table::from_columns(vec![
            ("name", vec![Value::from("Alice"), Value::from("Bob")]),
            ("salary", vec![Value::Int(70000), Value::Int(80000)]),
        ])
        .expect("table")
    }

    #[test]
    fn test_materialize_returns_independent_copies() {
        let spec = FixtureSpec::new().with("nums", Value::int_list(&[2, 7, 11, 15]));
        let mut first = spec.materialize();
        let second = spec.materialize();

        if let Some(Value::List(items)) = first.get_mut("nums") {
            items.push(Value::Int(99));
        }

        assert_eq!(second.get("nums"), Some(&Value::int_list(&[2, 7, 11, 15])));
        assert_eq!(spec.materialize(), second);
    }

    #[test]
    fn test_validate_accepts_well_formed_spec() {
        let spec = FixtureSpec::new()
            .with("target", 9i64)
            .with_table("df", employees());
        assert!(spec.validate().is_ok());
        assert_eq!(spec.tables().count(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_names_and_duplicates() {
        let bad = FixtureSpec::new().with("2nums", 1i64);
        assert_eq!(bad.validate().unwrap_err().entry, "2nums");

        let dup = FixtureSpec::new().with("x", 1i64).with("x", 2i64);
        assert!(dup.validate().unwrap_err().reason.contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_mixed_column_kinds() {
        let table = Table::new(
            vec!["v".into()],
            vec![vec![Value::Int(1)], vec![Value::from("x")]],
        );
        let spec = FixtureSpec::new().with_table("t", table);
        assert!(spec.validate().unwrap_err().reason.contains("mixes"));
    }

    #[test]
    fn test_validate_allows_int_float_and_null_in_one_column() {
        let table = Table::new(
            vec!["v".into()],
            vec![vec![Value::Int(1)], vec![Value::Float(2.5)], vec![Value::Null]],
        );
        assert!(FixtureSpec::new().with_table("t", table).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nested_tables() {
        let spec = FixtureSpec::new().with("xs", Value::List(vec![Value::Table(employees())]));
        assert!(spec.validate().unwrap_err().reason.contains("top-level"));
    }

    #[test]
    fn test_context_table_lookup() {
        let ctx = FixtureSpec::new()
            .with("n", 3i64)
            .with_table("df", employees())
            .materialize();
        assert!(ctx.table("df").is_ok());
        assert!(ctx.table("n").unwrap_err().contains("not a table"));
        assert!(ctx.table("missing").unwrap_err().contains("missing"));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("twoSum"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
