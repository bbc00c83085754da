//! Fixture tables → in-memory engine tables.
//!
//! Column types are inferred from the cells: all ints → `Int64`, ints mixed
//! with floats → `Float64`, strings → `Utf8`, booleans → `Boolean`. Nulls are
//! allowed anywhere; a column holding nothing but nulls becomes `Utf8`.

use std::sync::Arc;

use datafusion::arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use drill_core::{Table, Value};

use crate::error::{QueryError, QueryResult};

/// Pick the engine type for one column.
fn infer_column(table: &str, column: &str, cells: &[&Value]) -> QueryResult<DataType> {
    let mut inferred: Option<DataType> = None;
    for cell in cells {
        let ty = match cell {
            Value::Null => continue,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::Str(_) => DataType::Utf8,
            Value::Bool(_) => DataType::Boolean,
            other => {
                return Err(QueryError::schema(
                    table,
                    format!("column '{column}' holds a {}", other.type_name()),
                ))
            }
        };
        inferred = Some(match (inferred, ty) {
            (None, ty) => ty,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            (Some(a), b) => {
                return Err(QueryError::schema(
                    table,
                    format!("column '{column}' mixes {a} and {b}"),
                ))
            }
        });
    }
    Ok(inferred.unwrap_or(DataType::Utf8))
}

fn build_array(data_type: &DataType, cells: &[&Value]) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(cells.iter().map(|v| v.as_f64()).collect::<Float64Array>()),
        DataType::Boolean => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        _ => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<StringArray>(),
        ),
    }
}

/// Convert one fixture table into a record batch and its schema.
pub fn to_record_batch(name: &str, table: &Table) -> QueryResult<(SchemaRef, RecordBatch)> {
    table.validate().map_err(|reason| QueryError::schema(name, reason))?;

    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays = Vec::with_capacity(table.columns.len());
    for (index, column) in table.columns.iter().enumerate() {
        let cells: Vec<&Value> = table.rows.iter().map(|row| &row[index]).collect();
        let data_type = infer_column(name, column, &cells)?;
        arrays.push(build_array(&data_type, &cells));
        fields.push(Field::new(column, data_type, true));
    }

    let schema: SchemaRef = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;
    Ok((schema, batch))
}

/// Wrap a fixture table as an engine table provider.
pub fn to_mem_table(name: &str, table: &Table) -> QueryResult<MemTable> {
    let (schema, batch) = to_record_batch(name, table)?;
    Ok(MemTable::try_new(schema, vec![vec![batch]])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(columns.iter().map(|c| (*c).to_string()).collect(), rows)
    }

    #[test]
    fn test_infers_column_types() {
        let t = table(
            &["id", "score", "name", "active", "empty"],
            vec![
                vec![Value::Int(1), Value::Int(3), Value::from("a"), Value::Bool(true), Value::Null],
                vec![Value::Int(2), Value::Float(2.5), Value::Null, Value::Bool(false), Value::Null],
            ],
        );
        let (schema, batch) = to_record_batch("t", &t).expect("converts");
        let types: Vec<_> = schema.fields().iter().map(|f| f.data_type().clone()).collect();
        assert_eq!(
            types,
            vec![
                DataType::Int64,
                DataType::Float64,
                DataType::Utf8,
                DataType::Boolean,
                DataType::Utf8,
            ]
        );
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(2).null_count(), 1);
    }

    #[test]
    fn test_rejects_mixed_column() {
        let t = table(&["x"], vec![vec![Value::Int(1)], vec![Value::from("one")]]);
        let err = to_record_batch("t", &t).unwrap_err();
        assert_eq!(err.to_string(), "table 't': column 'x' mixes Int64 and Utf8");
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let t = table(&["x", "y"], vec![vec![Value::Int(1)]]);
        assert!(matches!(to_record_batch("t", &t), Err(QueryError::Schema { .. })));
    }

    #[test]
    fn test_empty_table_registers() {
        let t = table(&["x"], Vec::new());
        let mem = to_mem_table("t", &t).expect("converts");
        use datafusion::datasource::TableProvider;
        assert_eq!(mem.schema().fields().len(), 1);
    }
}
