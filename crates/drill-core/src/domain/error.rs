//! Error taxonomy for Drillbench.
//!
//! Only [`ConfigurationError`] is ever returned as an `Err`. Learner-caused
//! conditions (runtime failures, rejected queries, mismatches) are values of
//! [`ExecutionOutcome`](super::outcome::ExecutionOutcome) and
//! [`EvaluationResult`](super::outcome::EvaluationResult).

/// A fatal problem with the static exercise definitions. Raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("duplicate exercise key: {0}")]
    DuplicateExercise(String),

    #[error("exercise {exercise}: malformed fixture entry '{entry}': {reason}")]
    MalformedFixture {
        exercise: String,
        entry: String,
        reason: String,
    },

    #[error("exercise {exercise}: invalid result slot: {reason}")]
    InvalidSlot { exercise: String, reason: String },

    #[error("exercise {exercise}: invalid comparator: {reason}")]
    InvalidComparator { exercise: String, reason: String },

    #[error("exercise {exercise}: reference computation failed: {reason}")]
    Reference { exercise: String, reason: String },

    #[error("query schema: {0}")]
    QuerySchema(String),
}

/// Result type for configuration-time operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::MalformedFixture {
            exercise: "pair-sum".to_string(),
            entry: "nums".to_string(),
            reason: "row 0 has 1 cells, expected 2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pair-sum"));
        assert!(msg.contains("'nums'"));
        assert!(msg.contains("row 0"));
    }

    #[test]
    fn test_duplicate_exercise_display() {
        let err = ConfigurationError::DuplicateExercise("log-loss".to_string());
        assert_eq!(err.to_string(), "duplicate exercise key: log-loss");
    }
}
