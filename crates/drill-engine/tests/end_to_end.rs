//! Submissions through the fully assembled engine.

use drill_core::{EvaluationResult, ExecutionLimits, Submission, METRICS};
use drill_engine::{Engine, EngineConfig};
use tracing_test::traced_test;

async fn engine() -> Engine {
    Engine::bootstrap(EngineConfig::default())
        .await
        .expect("engine bootstraps")
}

fn errored_message(result: EvaluationResult) -> String {
    match result {
        EvaluationResult::Errored { message } => message,
        other => panic!("expected an errored result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_every_canonical_solution_passes() {
    let engine = engine().await;
    let keys: Vec<String> = engine.registry().keys().map(String::from).collect();
    assert_eq!(keys.len(), 21);

    for exercise in engine.registry().iter() {
        let result = engine
            .evaluate(&Submission::new(&exercise.key, &exercise.solution))
            .await;
        assert_eq!(result, EvaluationResult::Passed, "{}", exercise.key);
    }
}

#[tokio::test]
async fn test_evaluation_is_idempotent() {
    let engine = engine().await;
    let submission = Submission::new(
        "pair-sum",
        "def twoSum(nums, target):\n    return [0, 1]\n",
    );
    let first = engine.evaluate(&submission).await;
    let second = engine.evaluate(&submission).await;
    assert_eq!(first, EvaluationResult::Passed);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_submissions_do_not_leak_state() {
    let engine = engine().await;
    let polluting = Submission::new(
        "contains-duplicate",
        "nums.clear()\nleaked = 1\ndef containsDuplicate(nums):\n    return len(nums) != len(set(nums))\n",
    );
    assert_eq!(engine.evaluate(&polluting).await, EvaluationResult::Passed);

    let reader = Submission::new(
        "contains-duplicate",
        "def containsDuplicate(nums):\n    return leaked == 1\n",
    );
    let message = errored_message(engine.evaluate(&reader).await);
    assert!(message.contains("NameError"), "{message}");

    let canonical = engine.registry().get("contains-duplicate").expect("exists");
    let again = Submission::new("contains-duplicate", &canonical.solution);
    assert_eq!(engine.evaluate(&again).await, EvaluationResult::Passed);
}

#[tokio::test]
async fn test_wrong_order_fails_with_an_explanation() {
    let engine = engine().await;
    let brute_force = "def twoSum(nums, target):\n    for i in range(len(nums)):\n        for j in range(len(nums) - 1, i, -1):\n            if nums[i] + nums[j] == target:\n                return [j, i]\n    return []\n";
    let result = engine.evaluate(&Submission::new("pair-sum", brute_force)).await;
    assert_eq!(
        result,
        EvaluationResult::Failed {
            explanation: "index 0 differs: expected 0, got 1".into()
        }
    );
}

#[tokio::test]
async fn test_set_equivalence_ignores_order() {
    let engine = engine().await;
    let result = engine
        .evaluate(&Submission::new(
            "array-intersection",
            "def intersection(nums1, nums2):\n    return [9, 4]\n",
        ))
        .await;
    assert_eq!(result, EvaluationResult::Passed);
}

#[tokio::test]
async fn test_numeric_tolerance_accepts_rounding_noise() {
    let engine = engine().await;
    let source = "import math\n\ndef log_loss(y_true, y_pred):\n    total = 0.0\n    for y, p in zip(y_true, y_pred):\n        total += y * math.log(p) + (1 - y) * math.log(1 - p)\n    return round(-total / len(y_true), 6)\n";
    let result = engine.evaluate(&Submission::new("log-loss", source)).await;
    assert_eq!(result, EvaluationResult::Passed);
}

#[tokio::test]
async fn test_missing_result_binding_is_errored() {
    let engine = engine().await;
    let message = errored_message(
        engine
            .evaluate(&Submission::new("employee-filter", "answer = 1\n"))
            .await,
    );
    assert_eq!(message, "NameError: the result variable 'result' was never assigned");
}

#[tokio::test]
async fn test_undefined_function_is_errored() {
    let engine = engine().await;
    let message = errored_message(engine.evaluate(&Submission::new("pair-sum", "x = 1\n")).await);
    assert_eq!(
        message,
        "NameError: 'twoSum' was never defined; define a function named twoSum(nums, target)"
    );
}

#[tokio::test]
async fn test_infinite_loop_is_errored_and_engine_recovers() {
    let config = EngineConfig {
        limits: ExecutionLimits {
            timeout_ms: 300,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = Engine::bootstrap(config).await.expect("bootstrap");

    let message = errored_message(
        engine
            .evaluate(&Submission::new(
                "pair-sum",
                "def twoSum(nums, target):\n    while True:\n        pass\n",
            ))
            .await,
    );
    assert!(
        message.contains("TimeoutError") || message.contains("StepLimitExceeded"),
        "{message}"
    );

    let canonical = engine.registry().get("pair-sum").expect("exists");
    let result = engine
        .evaluate(&Submission::new("pair-sum", &canonical.solution))
        .await;
    assert_eq!(result, EvaluationResult::Passed);
}

#[tokio::test]
async fn test_undeclared_import_is_errored() {
    let engine = engine().await;
    let message = errored_message(
        engine
            .evaluate(&Submission::new(
                "pair-sum",
                "import os\ndef twoSum(nums, target):\n    return [0, 1]\n",
            ))
            .await,
    );
    assert_eq!(
        message,
        "line 1: ImportError: module 'os' is not available in this exercise"
    );
}

#[tokio::test]
async fn test_schema_mutation_is_rejected_and_schema_survives() {
    let engine = engine().await;
    for sql in ["DROP TABLE employees", "INSERT INTO sales VALUES (6, 1, 5, '2023-02-01')"] {
        let result = engine.evaluate(&Submission::new("sql-high-earners", sql)).await;
        assert!(
            matches!(result, EvaluationResult::Errored { .. }),
            "{sql}: {result:?}"
        );
    }

    let canonical = engine.registry().get("sql-high-earners").expect("exists");
    let result = engine
        .evaluate(&Submission::new("sql-high-earners", &canonical.solution))
        .await;
    assert_eq!(result, EvaluationResult::Passed);
}

#[tokio::test]
async fn test_bad_sql_is_errored() {
    let engine = engine().await;
    let message = errored_message(
        engine
            .evaluate(&Submission::new("sql-total-sales", "SELECT nope FROM employees"))
            .await,
    );
    assert!(message.contains("nope"), "{message}");
}

#[tokio::test]
async fn test_wrong_columns_fail() {
    let engine = engine().await;
    let result = engine
        .evaluate(&Submission::new(
            "sql-high-earners",
            "SELECT id, name FROM employees WHERE department = 'Engineering' AND salary > 125000",
        ))
        .await;
    let EvaluationResult::Failed { explanation } = result else {
        panic!("expected a failed result, got {result:?}");
    };
    assert!(explanation.starts_with("column names differ"), "{explanation}");
}

#[tokio::test]
async fn test_unknown_exercise_is_errored() {
    let engine = engine().await;
    let message = errored_message(
        engine
            .evaluate(&Submission::new("no-such-exercise", "result = 1\n"))
            .await,
    );
    assert_eq!(message, "unknown exercise 'no-such-exercise'");
}

#[traced_test]
#[tokio::test]
async fn test_evaluation_emits_lifecycle_events_without_text() {
    let engine = engine().await;
    let before = METRICS.evaluations();
    engine
        .evaluate(&Submission::new("pair-sum", "secret_marker = 1\n"))
        .await;
    assert!(METRICS.evaluations() > before);
    assert!(logs_contain("evaluation.started"));
    assert!(logs_contain("evaluation.finished"));
    assert!(logs_contain("verdict=errored"));
    assert!(!logs_contain("secret_marker"));
}
