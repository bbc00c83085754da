//! The catalogue's SQL exercises against the shared query schema.

use drill_core::{
    catalog, check, ExecutionOutcome, ExerciseKind, ExerciseRegistry, QueryEngine, Table, Value,
    Verdict,
};
use drill_query::DataFusionEngine;

fn engine() -> DataFusionEngine {
    DataFusionEngine::from_fixture(&catalog::sql_schema()).expect("schema loads")
}

#[tokio::test]
async fn test_every_query_solution_matches_its_reference() {
    let registry = ExerciseRegistry::new(catalog::builtin()).expect("catalog is valid");
    let engine = engine();
    let mut checked = 0;

    for exercise in registry.iter() {
        if exercise.kind != ExerciseKind::Query {
            continue;
        }
        let expected = registry
            .reference(&exercise.key)
            .expect("known key")
            .expect("reference computes");
        let outcome = engine.execute(&exercise.solution).await;
        let ExecutionOutcome::Completed { value } = outcome else {
            panic!("{}: query failed: {outcome:?}", exercise.key);
        };
        assert_eq!(
            check(&exercise.comparator, expected, &value),
            Verdict::Match,
            "{}: {value:?}",
            exercise.key
        );
        checked += 1;
    }
    assert_eq!(checked, 4);
}

#[tokio::test]
async fn test_schema_survives_rejected_mutations() {
    let engine = engine();
    let before = engine
        .query("SELECT * FROM employees ORDER BY id")
        .await
        .expect("select");

    for sql in [
        "DROP TABLE employees",
        "DELETE FROM sales",
        "INSERT INTO employees VALUES (7, 'Mallory', 'HR', 1)",
        "SELECT 1; DROP TABLE sales",
    ] {
        assert!(
            matches!(engine.execute(sql).await, ExecutionOutcome::QueryFailure { .. }),
            "{sql} should be rejected"
        );
    }

    let after = engine
        .query("SELECT * FROM employees ORDER BY id")
        .await
        .expect("select");
    assert_eq!(before, after);
    assert_eq!(after.row_count(), 6);
}

#[tokio::test]
async fn test_aggregate_over_join() {
    let table = engine()
        .query(
            "SELECT e.department, SUM(s.amount) AS total \
             FROM employees e JOIN sales s ON e.id = s.employee_id \
             GROUP BY e.department ORDER BY e.department",
        )
        .await
        .expect("query");
    assert_eq!(
        table,
        Table::new(
            vec!["department".into(), "total".into()],
            vec![
                vec![Value::from("Engineering"), Value::Int(1400)],
                vec![Value::from("Marketing"), Value::Int(1500)],
            ],
        )
    );
}

#[tokio::test]
async fn test_unknown_table_is_a_query_failure() {
    let outcome = engine().execute("SELECT * FROM managers").await;
    let ExecutionOutcome::QueryFailure { message } = outcome else {
        panic!("expected a query failure, got {outcome:?}");
    };
    assert!(message.contains("managers"), "{message}");
}

#[tokio::test]
async fn test_average_is_a_float() {
    let table = engine()
        .query("SELECT AVG(salary) AS avg_salary FROM employees WHERE department = 'HR'")
        .await
        .expect("query");
    assert_eq!(table.rows, vec![vec![Value::Float(62_500.0)]]);
}
