//! Submissions and the tagged results that flow back out of the engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::value::Value;

/// Raw learner text aimed at one exercise. Lives for one evaluation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub exercise_key: String,
    pub text: String,
}

impl Submission {
    pub fn new(exercise_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            exercise_key: exercise_key.into(),
            text: text.into(),
        }
    }

    /// SHA-256 hex digest of the submitted text.
    ///
    /// Logged in place of the text itself.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Result of running a submission through an evaluator or the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed { value: Value },
    RuntimeFailure { message: String },
    QueryFailure { message: String },
}

impl ExecutionOutcome {
    pub fn runtime_failure(message: impl Into<String>) -> Self {
        ExecutionOutcome::RuntimeFailure {
            message: message.into(),
        }
    }

    pub fn query_failure(message: impl Into<String>) -> Self {
        ExecutionOutcome::QueryFailure {
            message: message.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }
}

/// The terminal verdict handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationResult {
    Passed,
    Failed { explanation: String },
    Errored { message: String },
}

impl EvaluationResult {
    pub fn errored(message: impl Into<String>) -> Self {
        EvaluationResult::Errored {
            message: message.into(),
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, EvaluationResult::Passed)
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationResult::Passed => "passed",
            EvaluationResult::Failed { .. } => "failed",
            EvaluationResult::Errored { .. } => "errored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_result_serde_tags() {
        let json = serde_json::to_string(&EvaluationResult::Failed {
            explanation: "index 0 differs".to_string(),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"status":"failed","explanation":"index 0 differs"}"#);

        let passed: EvaluationResult =
            serde_json::from_str(r#"{"status":"passed"}"#).expect("deserialize");
        assert!(passed.passed());
    }

    #[test]
    fn test_submission_digest_is_stable() {
        let a = Submission::new("pair-sum", "result = 1");
        let b = Submission::new("other", "result = 1");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(!ExecutionOutcome::runtime_failure("boom").is_completed());
        assert!(ExecutionOutcome::Completed { value: Value::Null }.is_completed());
    }
}
