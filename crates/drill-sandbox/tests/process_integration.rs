//! Integration tests for the external-process evaluator.
//!
//! Every test returns early when no `python3` can be started, so the suite
//! stays green on machines without an interpreter.

use drill_core::{
    catalog, check, Evaluator, ExecutionLimits, ExecutionOutcome, ExerciseKind, ExerciseRegistry,
    FixtureSpec, Helper, ResultSlot, ScriptRequest, Value, Verdict,
};
use drill_sandbox::{ProcessEvaluator, DEFAULT_PYTHON};

async fn evaluator(limits: ExecutionLimits) -> Option<ProcessEvaluator> {
    let evaluator = ProcessEvaluator::new(DEFAULT_PYTHON, limits);
    if evaluator.is_available().await {
        Some(evaluator)
    } else {
        eprintln!("skipping: {DEFAULT_PYTHON} is not available");
        None
    }
}

fn request(source: &str, slot: ResultSlot, fixture: FixtureSpec, helpers: &[Helper]) -> ScriptRequest {
    ScriptRequest {
        source: source.to_string(),
        context: fixture.materialize(),
        slot,
        helpers: helpers.to_vec(),
    }
}

fn failure_message(outcome: ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::RuntimeFailure { message } => message,
        other => panic!("expected a runtime failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_every_scripted_solution_matches_under_python() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let registry = ExerciseRegistry::new(catalog::builtin()).expect("catalog is valid");

    for exercise in registry.iter() {
        let ExerciseKind::Scripted { slot, helpers } = &exercise.kind else {
            continue;
        };
        let expected = registry
            .reference(&exercise.key)
            .expect("known key")
            .expect("reference computes")
            .clone();
        let outcome = evaluator
            .execute(ScriptRequest {
                source: exercise.solution.clone(),
                context: exercise.fixture.materialize(),
                slot: slot.clone(),
                helpers: helpers.clone(),
            })
            .await;
        let ExecutionOutcome::Completed { value } = outcome else {
            panic!("{}: solution did not complete: {outcome:?}", exercise.key);
        };
        assert_eq!(
            check(&exercise.comparator, &expected, &value),
            Verdict::Match,
            "{}",
            exercise.key
        );
    }
}

#[tokio::test]
async fn test_call_slot_returns_value() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let source = "def twoSum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n";
    let outcome = evaluator
        .execute(request(
            source,
            ResultSlot::call("twoSum", &["nums", "target"]),
            FixtureSpec::new()
                .with("nums", Value::int_list(&[2, 7, 11, 15]))
                .with("target", 9i64),
            &[],
        ))
        .await;
    assert_eq!(
        outcome,
        ExecutionOutcome::Completed {
            value: Value::int_list(&[0, 1])
        }
    );
}

#[tokio::test]
async fn test_printing_does_not_disturb_the_result() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let outcome = evaluator
        .execute(request(
            "print('__DRILL_RESULT__ {}')\nresult = 2.5\n",
            ResultSlot::binding("result"),
            FixtureSpec::new(),
            &[],
        ))
        .await;
    assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Float(2.5) });
}

#[tokio::test]
async fn test_undeclared_import_is_rejected() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let message = failure_message(
        evaluator
            .execute(request("import os\nresult = 1\n", ResultSlot::binding("result"), FixtureSpec::new(), &[]))
            .await,
    );
    assert_eq!(
        message,
        "line 1: ImportError: module 'os' is not available in this exercise"
    );
}

#[tokio::test]
async fn test_declared_helper_is_importable() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let outcome = evaluator
        .execute(request(
            "import heapq\nh = [5, 1, 3]\nheapq.heapify(h)\nresult = heapq.heappop(h)\n",
            ResultSlot::binding("result"),
            FixtureSpec::new(),
            &[Helper::Heapq],
        ))
        .await;
    assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Int(1) });
}

#[tokio::test]
async fn test_missing_binding_is_named() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let message = failure_message(
        evaluator
            .execute(request("x = 1\n", ResultSlot::binding("result"), FixtureSpec::new(), &[]))
            .await,
    );
    assert_eq!(message, "NameError: the result variable 'result' was never assigned");
}

#[tokio::test]
async fn test_exception_reports_line_and_kind() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let message = failure_message(
        evaluator
            .execute(request(
                "x = 1\nraise ValueError('bad input')\n",
                ResultSlot::binding("result"),
                FixtureSpec::new(),
                &[],
            ))
            .await,
    );
    assert_eq!(message, "line 2: ValueError: bad input");
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let Some(evaluator) = evaluator(ExecutionLimits {
        timeout_ms: 500,
        ..Default::default()
    })
    .await
    else {
        return;
    };
    let message = failure_message(
        evaluator
            .execute(request("while True:\n    pass\n", ResultSlot::binding("result"), FixtureSpec::new(), &[]))
            .await,
    );
    assert_eq!(message, "TimeoutError: execution exceeded the 500 ms time limit");

    // The evaluator stays usable after a killed run.
    let outcome = evaluator
        .execute(request("result = 7\n", ResultSlot::binding("result"), FixtureSpec::new(), &[]))
        .await;
    assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Int(7) });
}

#[tokio::test]
async fn test_top_level_mutation_does_not_reach_the_call() {
    let Some(evaluator) = evaluator(ExecutionLimits::default()).await else {
        return;
    };
    let outcome = evaluator
        .execute(request(
            "nums.append(99)\ndef f(nums):\n    return len(nums)\n",
            ResultSlot::call("f", &["nums"]),
            FixtureSpec::new().with("nums", Value::int_list(&[1, 2])),
            &[],
        ))
        .await;
    assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Int(2) });
}
