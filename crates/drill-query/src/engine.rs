//! [`QueryEngine`] backed by an embedded DataFusion session.
//!
//! One session is built per process from the fixed query schema and shared
//! by every query evaluation. Queries run with DDL, DML and other
//! statements disabled, so a submission can read the tables but never
//! change them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use datafusion::execution::context::{SQLOptions, SessionContext};
use drill_core::{ExecutionOutcome, FixtureSpec, QueryEngine, Table, Value};
use tracing::{debug, info};

use crate::convert;
use crate::error::{QueryError, QueryResult};
use crate::schema;

#[derive(Clone)]
pub struct DataFusionEngine {
    ctx: SessionContext,
    tables: Arc<[String]>,
}

impl fmt::Debug for DataFusionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionEngine")
            .field("tables", &self.tables)
            .finish()
    }
}

impl DataFusionEngine {
    /// Register every table entry of `fixture` with a fresh session.
    /// Non-table entries are ignored.
    pub fn from_fixture(fixture: &FixtureSpec) -> QueryResult<Self> {
        let ctx = SessionContext::new();
        let mut tables = Vec::new();
        for (name, table) in fixture.tables() {
            let provider = schema::to_mem_table(name, table)?;
            ctx.register_table(name, Arc::new(provider))?;
            debug!(table = %name, rows = table.row_count(), "registered query table");
            tables.push(name.to_string());
        }
        info!(tables = tables.len(), "query engine ready");
        Ok(Self {
            ctx,
            tables: tables.into(),
        })
    }

    /// Names of the registered tables.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Options every learner query is planned under.
    pub fn read_only() -> SQLOptions {
        SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false)
    }

    /// Run `sql` and collect the whole result.
    pub async fn query(&self, sql: &str) -> QueryResult<Table> {
        if sql.trim().trim_end_matches(';').trim().is_empty() {
            return Err(QueryError::Empty);
        }
        let frame = self.ctx.sql_with_options(sql, Self::read_only()).await?;
        let columns = frame
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();
        let batches = frame.collect().await?;
        convert::to_table(columns, &batches)
    }
}

#[async_trait]
impl QueryEngine for DataFusionEngine {
    fn name(&self) -> &'static str {
        "datafusion"
    }

    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        let start = Instant::now();
        let result = self.query(sql).await;
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "query finished"
        );
        match result {
            Ok(table) => ExecutionOutcome::Completed {
                value: Value::Table(table),
            },
            Err(e) => ExecutionOutcome::query_failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DataFusionEngine {
        let people = Table::new(
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                vec![Value::Int(1), Value::from("ada"), Value::Float(9.5)],
                vec![Value::Int(2), Value::from("bo"), Value::Null],
            ],
        );
        let fixture = FixtureSpec::new()
            .with_table("people", people)
            .with("threshold", 3i64);
        DataFusionEngine::from_fixture(&fixture).expect("engine")
    }

    #[tokio::test]
    async fn test_select_returns_table() {
        let table = engine()
            .query("SELECT name, score FROM people ORDER BY id")
            .await
            .expect("query");
        assert_eq!(table.columns, vec!["name", "score"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Value::from("ada"), Value::Float(9.5)],
                vec![Value::from("bo"), Value::Null],
            ]
        );
    }

    #[tokio::test]
    async fn test_only_tables_are_registered() {
        assert_eq!(engine().tables(), ["people".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        assert!(matches!(engine().query("  ;  ").await, Err(QueryError::Empty)));
    }

    #[tokio::test]
    async fn test_unknown_column_is_a_query_failure() {
        let outcome = engine().execute("SELECT salary FROM people").await;
        let ExecutionOutcome::QueryFailure { message } = outcome else {
            panic!("expected a query failure, got {outcome:?}");
        };
        assert!(message.contains("salary"), "{message}");
    }

    #[tokio::test]
    async fn test_mutations_are_rejected() {
        let engine = engine();
        for sql in [
            "DROP TABLE people",
            "CREATE TABLE extra (x INT)",
            "INSERT INTO people VALUES (3, 'cy', 1.0)",
        ] {
            let outcome = engine.execute(sql).await;
            assert!(
                matches!(outcome, ExecutionOutcome::QueryFailure { .. }),
                "{sql}: {outcome:?}"
            );
        }
        let table = engine.query("SELECT COUNT(*) AS n FROM people").await.expect("query");
        assert_eq!(table.rows, vec![vec![Value::Int(2)]]);
    }
}
