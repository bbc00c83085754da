//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - Evaluation-scoped tracing spans via [`EvaluationSpan`]
//! - Emission functions for lifecycle events: start, stage transition, finish,
//!   reference computation and registry load
//!
//! Submission text is never logged; its SHA-256 digest is.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, Instrument};

/// Evaluation-scoped span tagged with exercise key and evaluation id.
///
/// Use [`EvaluationSpan::enter`] in synchronous code and
/// [`EvaluationSpan::instrument`] around futures, since an entered guard must
/// not be held across an `.await`.
pub struct EvaluationSpan {
    span: tracing::Span,
}

impl EvaluationSpan {
    pub fn new(exercise: &str, evaluation_id: &str) -> Self {
        Self {
            span: tracing::info_span!(
                "drill.evaluation",
                exercise = %exercise,
                evaluation_id = %evaluation_id
            ),
        }
    }

    /// Enter the span until the returned guard is dropped.
    pub fn enter(self) -> tracing::span::EnteredSpan {
        self.span.entered()
    }

    /// Attach the span to a future.
    pub fn instrument<F: Future>(self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span)
    }
}

/// Emit event: evaluation started.
pub fn emit_evaluation_started(exercise: &str, evaluation_id: &str, submission_digest: &str) {
    info!(
        event = "evaluation.started",
        exercise = %exercise,
        evaluation_id = %evaluation_id,
        submission_sha256 = %submission_digest,
    );
}

/// Emit event: state-machine transition.
pub fn emit_evaluation_stage(exercise: &str, stage: &str) {
    tracing::debug!(event = "evaluation.stage", exercise = %exercise, stage = %stage);
}

/// Emit event: evaluation finished with verdict and duration.
pub fn emit_evaluation_finished(exercise: &str, evaluation_id: &str, verdict: &str, duration_ms: u64) {
    info!(
        event = "evaluation.finished",
        exercise = %exercise,
        evaluation_id = %evaluation_id,
        verdict = %verdict,
        duration_ms = duration_ms,
    );
}

/// Emit event: a reference answer was computed (or failed to compute).
pub fn emit_reference_computed(exercise: &str, duration_ms: u64, ok: bool) {
    if ok {
        info!(event = "reference.computed", exercise = %exercise, duration_ms = duration_ms);
    } else {
        tracing::warn!(event = "reference.failed", exercise = %exercise, duration_ms = duration_ms);
    }
}

/// Emit event: the exercise registry was built.
pub fn emit_registry_loaded(exercises: usize, scripted: usize, query: usize) {
    info!(
        event = "registry.loaded",
        exercises = exercises,
        scripted = scripted,
        query = query,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_evaluation_span_create() {
        let _guard = EvaluationSpan::new("pair-sum", "eval-1").enter();
    }

    #[traced_test]
    #[test]
    fn test_finished_event_is_logged() {
        emit_evaluation_finished("pair-sum", "eval-1", "passed", 3);
        assert!(logs_contain("evaluation.finished"));
        assert!(logs_contain("verdict=passed"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_instrumented_future_runs() {
        let value = EvaluationSpan::new("pair-sum", "eval-2")
            .instrument(async { 7 })
            .await;
        assert_eq!(value, 7);
        emit_evaluation_started("pair-sum", "eval-2", "abc");
        assert!(logs_contain("submission_sha256=abc"));
    }
}
