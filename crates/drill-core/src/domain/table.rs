//! Tabular structure: named columns over ordered rows.

use serde::{Deserialize, Serialize};

use super::value::Value;

/// A named-column, ordered-row result set.
///
/// # Invariants
///
/// Every row has exactly `columns.len()` cells and every cell is a scalar.
/// [`Table::validate`] checks both; constructors used by the engine keep them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from column-major data.
    ///
    /// Returns an error when columns have different lengths.
    pub fn from_columns(columns: Vec<(&str, Vec<Value>)>) -> Result<Self, String> {
        let height = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
        if let Some((name, cells)) = columns.iter().find(|(_, cells)| cells.len() != height) {
            return Err(format!(
                "column '{name}' has {} cells, expected {height}",
                cells.len()
            ));
        }

        let names = columns.iter().map(|(name, _)| (*name).to_string()).collect();
        let mut rows = vec![Vec::with_capacity(columns.len()); height];
        for (_, cells) in columns {
            for (row, cell) in rows.iter_mut().zip(cells) {
                row.push(cell);
            }
        }
        Ok(Self::new(names, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Check the shape invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (i, name) in self.columns.iter().enumerate() {
            if name.is_empty() {
                return Err(format!("column {i} has an empty name"));
            }
            if self.columns[..i].contains(name) {
                return Err(format!("duplicate column name '{name}'"));
            }
        }
        for (r, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(format!(
                    "row {r} has {} cells, expected {}",
                    row.len(),
                    self.columns.len()
                ));
            }
            if let Some((c, cell)) = row.iter().enumerate().find(|(_, v)| !v.is_scalar()) {
                return Err(format!(
                    "row {r}, column '{}' holds a {}; cells must be scalars",
                    self.columns[c],
                    cell.type_name()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_transposes() {
        let t = Table::from_columns(vec![
            ("id", vec![Value::Int(1), Value::Int(2)]),
            ("name", vec![Value::from("a"), Value::from("b")]),
        ])
        .expect("table");
        assert_eq!(t.columns, vec!["id", "name"]);
        assert_eq!(t.rows[1], vec![Value::Int(2), Value::from("b")]);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let err = Table::from_columns(vec![
            ("id", vec![Value::Int(1), Value::Int(2)]),
            ("name", vec![Value::from("a")]),
        ])
        .unwrap_err();
        assert!(err.contains("column 'name'"));
    }

    #[test]
    fn test_validate_rejects_duplicate_columns_and_nested_cells() {
        let dup = Table::new(vec!["a".into(), "a".into()], vec![]);
        assert!(dup.validate().unwrap_err().contains("duplicate"));

        let nested = Table::new(vec!["a".into()], vec![vec![Value::int_list(&[1])]]);
        assert!(nested.validate().unwrap_err().contains("scalars"));
    }

    #[test]
    fn test_column_lookup() {
        let t = Table::from_columns(vec![("x", vec![Value::Int(5), Value::Int(6)])]).expect("table");
        let cells = t.column("x").expect("column");
        assert_eq!(cells, vec![&Value::Int(5), &Value::Int(6)]);
        assert!(t.column("missing").is_none());
    }
}
