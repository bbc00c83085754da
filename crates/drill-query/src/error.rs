//! Query engine errors.

use datafusion::arrow::datatypes::DataType;
use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A fixture table cannot be turned into an engine table. Fatal at startup.
    #[error("table '{table}': {reason}")]
    Schema { table: String, reason: String },

    #[error("the query is empty")]
    Empty,

    #[error("{0}")]
    Engine(#[from] DataFusionError),

    #[error("{0}")]
    Arrow(#[from] ArrowError),

    #[error("column '{column}' has type {data_type}, which cannot be graded")]
    UnsupportedType { column: String, data_type: DataType },
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl QueryError {
    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        QueryError::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = QueryError::schema("sales", "column 'amount' mixes str and int");
        assert_eq!(err.to_string(), "table 'sales': column 'amount' mixes str and int");
    }

    #[test]
    fn test_unsupported_type_display() {
        let err = QueryError::UnsupportedType {
            column: "blob".into(),
            data_type: DataType::Binary,
        };
        assert_eq!(err.to_string(), "column 'blob' has type Binary, which cannot be graded");
    }
}
