//! Evaluation coordinator.
//!
//! One submission in, one [`EvaluationResult`] out:
//!
//! ```text
//! Idle -> ContextBuilt -> Executed -> Compared -> Passed | Failed
//!                            \-> Errored (runtime or query failure)
//! ```
//!
//! Nothing is remembered between calls. Every failure mode, including an
//! unknown exercise key, ends in a terminal result rather than an `Err`.

use std::sync::Arc;
use std::time::Instant;

use crate::domain::{EvaluationResult, ExecutionOutcome, ExerciseKind, Submission};
use crate::equivalence::{self, Verdict};
use crate::executor::{Evaluator, QueryEngine, ScriptRequest};
use crate::metrics::METRICS;
use crate::obs::{self, EvaluationSpan};
use crate::registry::ExerciseRegistry;

/// Per-evaluation state-machine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ContextBuilt,
    Executed,
    Compared,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::ContextBuilt => "context_built",
            Stage::Executed => "executed",
            Stage::Compared => "compared",
        }
    }
}

/// Orchestrates fixture materialisation, execution and comparison.
#[derive(Debug, Clone)]
pub struct Coordinator {
    registry: Arc<ExerciseRegistry>,
    evaluator: Arc<dyn Evaluator>,
    query_engine: Option<Arc<dyn QueryEngine>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<ExerciseRegistry>,
        evaluator: Arc<dyn Evaluator>,
        query_engine: Option<Arc<dyn QueryEngine>>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            query_engine,
        }
    }

    pub fn registry(&self) -> &ExerciseRegistry {
        &self.registry
    }

    pub fn evaluator_name(&self) -> &'static str {
        self.evaluator.name()
    }

    /// Grade one submission. Always returns a terminal result.
    pub async fn evaluate(&self, submission: &Submission) -> EvaluationResult {
        let evaluation_id = uuid::Uuid::new_v4().to_string();
        let key = submission.exercise_key.as_str();
        let start = Instant::now();

        obs::emit_evaluation_started(key, &evaluation_id, &submission.digest());
        let result = EvaluationSpan::new(key, &evaluation_id)
            .instrument(self.run(submission))
            .await;

        METRICS.record(&result);
        obs::emit_evaluation_finished(
            key,
            &evaluation_id,
            result.label(),
            start.elapsed().as_millis() as u64,
        );
        result
    }

    async fn run(&self, submission: &Submission) -> EvaluationResult {
        let key = submission.exercise_key.as_str();
        let stage = |s: Stage| obs::emit_evaluation_stage(key, s.as_str());
        stage(Stage::Idle);

        let Some(exercise) = self.registry.get(key) else {
            return EvaluationResult::errored(format!("unknown exercise '{key}'"));
        };

        let context = exercise.fixture.materialize();
        stage(Stage::ContextBuilt);

        let outcome = match &exercise.kind {
            ExerciseKind::Scripted { slot, helpers } => {
                let request = ScriptRequest {
                    source: submission.text.clone(),
                    context,
                    slot: slot.clone(),
                    helpers: helpers.clone(),
                };
                self.evaluator.execute(request).await
            }
            ExerciseKind::Query => match &self.query_engine {
                Some(engine) => engine.execute(&submission.text).await,
                None => {
                    return EvaluationResult::errored(
                        "query exercises are unavailable: no query engine is configured",
                    )
                }
            },
        };
        stage(Stage::Executed);

        let actual = match outcome {
            ExecutionOutcome::Completed { value } => value,
            ExecutionOutcome::RuntimeFailure { message }
            | ExecutionOutcome::QueryFailure { message } => {
                return EvaluationResult::Errored { message }
            }
        };

        let expected = match self.registry.reference(key) {
            Some(Ok(value)) => value,
            Some(Err(reason)) => {
                tracing::error!(exercise = %key, error = %reason, "reference computation failed");
                return EvaluationResult::errored(format!(
                    "the reference answer for '{key}' is unavailable: {reason}"
                ));
            }
            None => return EvaluationResult::errored(format!("unknown exercise '{key}'")),
        };

        let verdict = equivalence::check(&exercise.comparator, expected, &actual);
        stage(Stage::Compared);

        match verdict {
            Verdict::Match => EvaluationResult::Passed,
            Verdict::Mismatch(explanation) => EvaluationResult::Failed { explanation },
        }
    }
}
