//! Result batches → [`Table`].

use chrono::{DateTime, NaiveDate};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::ScalarValue;
use drill_core::{Table, Value};

use crate::error::{QueryError, QueryResult};

/// Days between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Flatten `batches` into one table with the given column names.
pub fn to_table(columns: Vec<String>, batches: &[RecordBatch]) -> QueryResult<Table> {
    let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in batches {
        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for (index, array) in batch.columns().iter().enumerate() {
                let scalar = ScalarValue::try_from_array(array, row)?;
                let column = columns.get(index).map(String::as_str).unwrap_or("?");
                cells.push(to_value(column, scalar)?);
            }
            rows.push(cells);
        }
    }
    Ok(Table::new(columns, rows))
}

fn to_value(column: &str, scalar: ScalarValue) -> QueryResult<Value> {
    if scalar.is_null() {
        return Ok(Value::Null);
    }
    let value = match scalar {
        ScalarValue::Boolean(Some(b)) => Value::Bool(b),
        ScalarValue::Int8(Some(v)) => Value::Int(v.into()),
        ScalarValue::Int16(Some(v)) => Value::Int(v.into()),
        ScalarValue::Int32(Some(v)) => Value::Int(v.into()),
        ScalarValue::Int64(Some(v)) => Value::Int(v),
        ScalarValue::UInt8(Some(v)) => Value::Int(v.into()),
        ScalarValue::UInt16(Some(v)) => Value::Int(v.into()),
        ScalarValue::UInt32(Some(v)) => Value::Int(v.into()),
        ScalarValue::UInt64(Some(v)) => match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(v as f64),
        },
        ScalarValue::Float32(Some(v)) => Value::Float(v.into()),
        ScalarValue::Float64(Some(v)) => Value::Float(v),
        ScalarValue::Decimal128(Some(v), _, scale) => {
            Value::Float(v as f64 / 10f64.powi(i32::from(scale)))
        }
        ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) | ScalarValue::Utf8View(Some(s)) => {
            Value::Str(s)
        }
        ScalarValue::Date32(Some(days)) => match date32(days) {
            Some(date) => Value::Str(date.to_string()),
            None => return Err(unsupported(column, ScalarValue::Date32(Some(days)))),
        },
        ScalarValue::Date64(Some(millis)) => match DateTime::from_timestamp_millis(millis) {
            Some(at) => Value::Str(at.date_naive().to_string()),
            None => return Err(unsupported(column, ScalarValue::Date64(Some(millis)))),
        },
        other => return Err(unsupported(column, other)),
    };
    Ok(value)
}

fn date32(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

fn unsupported(column: &str, scalar: ScalarValue) -> QueryError {
    QueryError::UnsupportedType {
        column: column.to_string(),
        data_type: scalar.data_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use datafusion::arrow::array::{
        ArrayRef, BinaryArray, Date32Array, Decimal128Array, Int32Array, StringArray, UInt64Array,
    };
    use datafusion::arrow::datatypes::{DataType, Field, Schema};

    fn batch(fields: Vec<Field>, arrays: Vec<ArrayRef>) -> RecordBatch {
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("batch")
    }

    #[test]
    fn test_converts_common_types() {
        let decimals = Decimal128Array::from(vec![Some(12_345), None])
            .with_precision_and_scale(10, 2)
            .expect("decimal");
        let b = batch(
            vec![
                Field::new("n", DataType::Int32, true),
                Field::new("rank", DataType::UInt64, false),
                Field::new("price", DataType::Decimal128(10, 2), true),
                Field::new("day", DataType::Date32, true),
                Field::new("name", DataType::Utf8, true),
            ],
            vec![
                Arc::new(Int32Array::from(vec![Some(7), None])),
                Arc::new(UInt64Array::from(vec![1, 2])),
                Arc::new(decimals),
                Arc::new(Date32Array::from(vec![Some(19_358), Some(0)])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        );
        let columns = vec!["n", "rank", "price", "day", "name"]
            .into_iter()
            .map(String::from)
            .collect();
        let table = to_table(columns, &[b]).expect("converts");
        assert_eq!(
            table.rows[0],
            vec![
                Value::Int(7),
                Value::Int(1),
                Value::Float(123.45),
                Value::from("2023-01-01"),
                Value::from("a"),
            ]
        );
        assert_eq!(
            table.rows[1],
            vec![Value::Null, Value::Int(2), Value::Null, Value::from("1970-01-01"), Value::Null]
        );
    }

    #[test]
    fn test_rows_from_several_batches_concatenate() {
        let make = |values: Vec<i32>| {
            batch(
                vec![Field::new("x", DataType::Int32, false)],
                vec![Arc::new(Int32Array::from(values))],
            )
        };
        let table = to_table(vec!["x".into()], &[make(vec![1, 2]), make(vec![3])]).expect("converts");
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[2], vec![Value::Int(3)]);
    }

    #[test]
    fn test_binary_is_unsupported() {
        let b = batch(
            vec![Field::new("blob", DataType::Binary, false)],
            vec![Arc::new(BinaryArray::from(vec![b"ab".as_ref()]))],
        );
        let err = to_table(vec!["blob".into()], &[b]).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedType { ref column, .. } if column == "blob"));
    }

    #[test]
    fn test_no_batches_keeps_columns() {
        let table = to_table(vec!["a".into(), "b".into()], &[]).expect("converts");
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.row_count(), 0);
    }
}
