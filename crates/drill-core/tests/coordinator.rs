//! Coordinator state-machine tests against scripted fakes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drill_core::{
    Comparator, Coordinator, EvaluationResult, Evaluator, ExecutionOutcome, Exercise,
    ExerciseRegistry, FixtureSpec, QueryEngine, ResultSlot, ScriptRequest, Submission, Table,
    Value,
};
use tracing_test::traced_test;

/// Evaluator that answers from a canned table of submission text to outcome,
/// and records every context it was handed.
#[derive(Debug, Default)]
struct FakeEvaluator {
    seen: Mutex<Vec<ScriptRequest>>,
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn execute(&self, mut request: ScriptRequest) -> ExecutionOutcome {
        let outcome = match request.source.trim() {
            "hash-map" => ExecutionOutcome::Completed {
                value: Value::int_list(&[0, 1]),
            },
            "brute-force" => ExecutionOutcome::Completed {
                value: Value::int_list(&[1, 0]),
            },
            "mutate" => {
                if let Some(Value::List(nums)) = request.context.get_mut("nums") {
                    nums.clear();
                }
                ExecutionOutcome::Completed {
                    value: Value::int_list(&[0, 1]),
                }
            }
            "echo-nums" => ExecutionOutcome::Completed {
                value: request.context.get("nums").cloned().unwrap_or(Value::Null),
            },
            "unbound" => ExecutionOutcome::runtime_failure(
                "NameError: 'twoSum' was never defined",
            ),
            other => ExecutionOutcome::runtime_failure(format!("SyntaxError: {other}")),
        };
        self.seen.lock().expect("lock").push(request);
        outcome
    }
}

#[derive(Debug)]
struct FakeQueryEngine;

#[async_trait]
impl QueryEngine for FakeQueryEngine {
    fn name(&self) -> &'static str {
        "fake-sql"
    }

    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        if sql.contains("Charlie") {
            ExecutionOutcome::Completed {
                value: Value::Table(Table::new(
                    vec!["name".into()],
                    vec![vec![Value::from("Charlie")]],
                )),
            }
        } else {
            ExecutionOutcome::query_failure("Binder Error: column \"nme\" not found")
        }
    }
}

fn pair_sum() -> Exercise {
    Exercise::scripted("pair-sum", ResultSlot::call("twoSum", &["nums", "target"]))
        .fixture(
            FixtureSpec::new()
                .with("nums", Value::int_list(&[2, 7, 11, 15]))
                .with("target", 9i64),
        )
        .expected(Value::int_list(&[0, 1]))
}

fn echo(calls: Arc<AtomicUsize>) -> Exercise {
    Exercise::scripted("echo", ResultSlot::binding("result"))
        .fixture(FixtureSpec::new().with("nums", Value::int_list(&[3, 1, 2])))
        .reference(move |ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            ctx.get("nums").cloned().ok_or_else(|| "nums missing".to_string())
        })
}

fn high_earners() -> Exercise {
    Exercise::query("high-earners")
        .expected(Value::Table(Table::new(
            vec!["name".into()],
            vec![vec![Value::from("Charlie")]],
        )))
        .comparator(Comparator::tabular_sorted_by(&["name"]))
}

fn coordinator(
    exercises: Vec<Exercise>,
    with_query: bool,
) -> (Coordinator, Arc<FakeEvaluator>) {
    let registry = Arc::new(ExerciseRegistry::new(exercises).expect("registry"));
    let evaluator = Arc::new(FakeEvaluator::default());
    let query: Option<Arc<dyn QueryEngine>> = if with_query {
        Some(Arc::new(FakeQueryEngine))
    } else {
        None
    };
    (
        Coordinator::new(registry, evaluator.clone(), query),
        evaluator,
    )
}

#[tokio::test]
async fn correct_submission_passes() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let result = c.evaluate(&Submission::new("pair-sum", "hash-map")).await;
    assert_eq!(result, EvaluationResult::Passed);
}

#[tokio::test]
async fn reversed_indices_fail_with_first_differing_index() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let result = c.evaluate(&Submission::new("pair-sum", "brute-force")).await;
    assert_eq!(
        result,
        EvaluationResult::Failed {
            explanation: "index 0 differs: expected 0, got 1".into()
        }
    );
}

#[tokio::test]
async fn runtime_failure_is_errored_not_failed() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let result = c.evaluate(&Submission::new("pair-sum", "unbound")).await;
    assert!(matches!(result, EvaluationResult::Errored { message } if message.contains("never defined")));
}

#[tokio::test]
async fn unknown_exercise_is_errored() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let result = c.evaluate(&Submission::new("nope", "hash-map")).await;
    assert_eq!(result, EvaluationResult::errored("unknown exercise 'nope'"));
}

#[tokio::test]
async fn evaluation_is_idempotent() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let submission = Submission::new("pair-sum", "brute-force");
    let first = c.evaluate(&submission).await;
    let second = c.evaluate(&submission).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn mutation_does_not_leak_into_next_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (c, evaluator) = coordinator(vec![pair_sum(), echo(calls.clone())], false);

    let _ = c.evaluate(&Submission::new("pair-sum", "mutate")).await;
    let _ = c.evaluate(&Submission::new("pair-sum", "hash-map")).await;

    let seen = evaluator.seen.lock().expect("lock");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].context.get("nums"), Some(&Value::List(vec![])));
    assert_eq!(
        seen[1].context.get("nums"),
        Some(&Value::int_list(&[2, 7, 11, 15]))
    );
}

#[tokio::test]
async fn reference_is_computed_once_from_its_own_context() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (c, _) = coordinator(vec![echo(calls.clone())], false);

    for _ in 0..3 {
        let result = c.evaluate(&Submission::new("echo", "echo-nums")).await;
        assert_eq!(result, EvaluationResult::Passed);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_reference_is_errored() {
    let broken = Exercise::scripted("broken", ResultSlot::binding("result"))
        .reference(|_| Err("reference exploded".into()));
    let (c, _) = coordinator(vec![broken], false);
    let result = c.evaluate(&Submission::new("broken", "hash-map")).await;
    assert!(matches!(result, EvaluationResult::Errored { message } if message.contains("reference exploded")));
}

#[tokio::test]
async fn query_exercises_route_to_query_engine() {
    let (c, evaluator) = coordinator(vec![high_earners()], true);

    let ok = c
        .evaluate(&Submission::new("high-earners", "SELECT 'Charlie' AS name"))
        .await;
    assert_eq!(ok, EvaluationResult::Passed);

    let bad = c
        .evaluate(&Submission::new("high-earners", "SELECT nme FROM employees"))
        .await;
    assert!(matches!(bad, EvaluationResult::Errored { message } if message.contains("Binder Error")));

    assert!(evaluator.seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn query_exercise_without_engine_is_errored() {
    let (c, _) = coordinator(vec![high_earners()], false);
    let result = c
        .evaluate(&Submission::new("high-earners", "SELECT 1"))
        .await;
    assert!(matches!(result, EvaluationResult::Errored { message } if message.contains("no query engine")));
}

#[traced_test]
#[tokio::test]
async fn evaluation_emits_lifecycle_events_without_submission_text() {
    let (c, _) = coordinator(vec![pair_sum()], false);
    let _ = c
        .evaluate(&Submission::new("pair-sum", "hash-map"))
        .await;

    assert!(logs_contain("evaluation.started"));
    assert!(logs_contain("evaluation.finished"));
    assert!(logs_contain("verdict=passed"));
    assert!(!logs_contain("hash-map"));
}
