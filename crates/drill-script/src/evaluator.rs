//! [`Evaluator`] implementation backed by the in-process interpreter.
//!
//! Interpreter values are `Rc`-based and never cross threads, so each run
//! gets its own OS thread with a generous stack; the result comes back over a
//! oneshot channel. The interpreter enforces the wall-clock ceiling itself,
//! and an outer `tokio::time::timeout` catches anything that slips past it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use drill_core::{
    Evaluator, ExecutionLimits, ExecutionOutcome, ResultSlot, ScriptRequest, METRICS,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ScriptError;
use crate::interpreter::Interpreter;
use crate::value::{from_core, to_core};

/// Stack size of the interpreter thread. Deep recursion in learner code
/// walks the Rust stack, bounded by `max_call_depth`.
const INTERPRETER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Slack on top of the configured timeout before the host gives up waiting.
const TIMEOUT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct InterpretedEvaluator {
    limits: ExecutionLimits,
}

impl InterpretedEvaluator {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }
}

impl Default for InterpretedEvaluator {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

#[async_trait]
impl Evaluator for InterpretedEvaluator {
    fn name(&self) -> &'static str {
        "interpreted"
    }

    async fn execute(&self, request: ScriptRequest) -> ExecutionOutcome {
        let (tx, rx) = oneshot::channel();
        let limits = self.limits.clone();
        let spawned = std::thread::Builder::new()
            .name("drill-script".into())
            .stack_size(INTERPRETER_STACK_BYTES)
            .spawn(move || {
                let outcome = execute_blocking(request, &limits);
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn interpreter thread");
            return ExecutionOutcome::runtime_failure(format!(
                "RuntimeError: could not start the interpreter: {e}"
            ));
        }

        match tokio::time::timeout(self.limits.timeout() + TIMEOUT_GRACE, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                warn!("interpreter thread exited without a result");
                ExecutionOutcome::runtime_failure("RuntimeError: the interpreter stopped unexpectedly")
            }
            Err(_) => {
                METRICS.inc_timeouts();
                warn!(timeout_ms = self.limits.timeout_ms, "interpreter missed its deadline");
                ExecutionOutcome::runtime_failure(self.limits.timeout_message())
            }
        }
    }
}

/// Run one request to completion on the current thread.
pub fn execute_blocking(request: ScriptRequest, limits: &ExecutionLimits) -> ExecutionOutcome {
    let started = Instant::now();
    let mut interp = Interpreter::new(limits, &request.helpers);
    for (name, value) in request.context.iter() {
        interp.bind(name, from_core(value));
    }

    let outcome = match interp.run(&request.source) {
        Ok(()) => extract(&mut interp, &request),
        Err(e) => Err(e),
    };

    debug!(
        steps = interp.steps(),
        duration_ms = started.elapsed().as_millis() as u64,
        completed = outcome.is_ok(),
        "interpreter run finished"
    );

    match outcome {
        Ok(value) => match to_core(&value) {
            Ok(value) => ExecutionOutcome::Completed { value },
            Err(message) => ExecutionOutcome::runtime_failure(format!("TypeError: {message}")),
        },
        Err(e) => {
            if e.is_timeout() {
                METRICS.inc_timeouts();
            }
            ExecutionOutcome::runtime_failure(e.to_string())
        }
    }
}

/// Read the answer out of the result slot.
fn extract(
    interp: &mut Interpreter,
    request: &ScriptRequest,
) -> Result<crate::value::Value, ScriptError> {
    match &request.slot {
        ResultSlot::Binding { name } => interp.global(name).ok_or_else(|| {
            ScriptError::Name(format!("the result variable '{name}' was never assigned"))
        }),
        ResultSlot::Call { function, args } => {
            let callee = interp.global(function).ok_or_else(|| {
                ScriptError::Name(format!(
                    "'{function}' was never defined; define a function named {}",
                    request.slot
                ))
            })?;
            if !callee.is_callable() {
                return Err(ScriptError::Type(format!(
                    "'{function}' must be a function, but it is a {}",
                    callee.type_name()
                )));
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                let value = request.context.get(arg).ok_or_else(|| {
                    ScriptError::Runtime(format!("fixture entry '{arg}' is missing"))
                })?;
                values.push(from_core(value));
            }
            interp.call(&callee, values, Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{FixtureSpec, Helper, Value};

    fn request(source: &str, slot: ResultSlot, fixture: FixtureSpec) -> ScriptRequest {
        ScriptRequest {
            source: source.to_string(),
            context: fixture.materialize(),
            slot,
            helpers: vec![Helper::Math],
        }
    }

    #[test]
    fn test_binding_slot() {
        let outcome = execute_blocking(
            request("result = [n * 2 for n in nums]\n", ResultSlot::binding("result"), FixtureSpec::new().with("nums", Value::int_list(&[1, 2]))),
            &ExecutionLimits::default(),
        );
        assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::int_list(&[2, 4]) });
    }

    #[test]
    fn test_missing_binding_names_the_variable() {
        let outcome = execute_blocking(
            request("x = 1\n", ResultSlot::binding("result"), FixtureSpec::new()),
            &ExecutionLimits::default(),
        );
        assert_eq!(
            outcome,
            ExecutionOutcome::runtime_failure(
                "NameError: the result variable 'result' was never assigned"
            )
        );
    }

    #[test]
    fn test_missing_function_names_the_signature() {
        let outcome = execute_blocking(
            request(
                "def other():\n    pass\n",
                ResultSlot::call("twoSum", &["nums", "target"]),
                FixtureSpec::new().with("nums", Value::int_list(&[1])).with("target", 1i64),
            ),
            &ExecutionLimits::default(),
        );
        assert_eq!(
            outcome,
            ExecutionOutcome::runtime_failure(
                "NameError: 'twoSum' was never defined; define a function named twoSum(nums, target)"
            )
        );
    }

    #[test]
    fn test_call_slot_receives_fresh_copies() {
        let source = "nums.append(99)\ndef f(nums):\n    return len(nums)\n";
        let outcome = execute_blocking(
            request(source, ResultSlot::call("f", &["nums"]), FixtureSpec::new().with("nums", Value::int_list(&[1, 2]))),
            &ExecutionLimits::default(),
        );
        assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Int(2) });
    }

    #[test]
    fn test_function_result_is_not_gradable() {
        let outcome = execute_blocking(
            request("def f():\n    pass\nresult = f\n", ResultSlot::binding("result"), FixtureSpec::new()),
            &ExecutionLimits::default(),
        );
        let ExecutionOutcome::RuntimeFailure { message } = outcome else {
            panic!("expected a runtime failure");
        };
        assert!(message.contains("not a value that can be graded"));
    }

    #[tokio::test]
    async fn test_async_execute_reports_step_ceiling() {
        let evaluator = InterpretedEvaluator::new(ExecutionLimits {
            max_steps: 10_000,
            ..Default::default()
        });
        let outcome = evaluator
            .execute(request("while True:\n    pass\n", ResultSlot::binding("result"), FixtureSpec::new()))
            .await;
        let ExecutionOutcome::RuntimeFailure { message } = outcome else {
            panic!("expected a runtime failure");
        };
        assert!(message.contains("StepLimitExceeded"), "{message}");
    }
}
