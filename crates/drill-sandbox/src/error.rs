//! Failures of the sandbox machinery itself.
//!
//! None of these escape the crate as `Err`: [`crate::ProcessEvaluator`]
//! folds each one into an `ExecutionOutcome::RuntimeFailure`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("could not prepare the working directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("could not start {}: {source}", python.display())]
    Spawn {
        python: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lost contact with the harness process: {0}")]
    Io(#[source] std::io::Error),

    #[error("could not encode the run payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("execution exceeded the {0} ms time limit")]
    Timeout(u64),

    #[error("the harness exited without reporting a result (exit code {code}){detail}")]
    MissingResult { code: i32, detail: String },

    #[error("the harness reported an unreadable result: {0}")]
    MalformedResult(#[source] serde_json::Error),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Build a [`SandboxError::MissingResult`] from the process exit code and
    /// the tail of its stderr.
    pub(crate) fn missing_result(code: Option<i32>, stderr: &str) -> Self {
        let tail = stderr.trim().lines().last().unwrap_or("").trim();
        let detail = if tail.is_empty() {
            String::new()
        } else {
            format!(": {tail}")
        };
        SandboxError::MissingResult {
            code: code.unwrap_or(-1),
            detail,
        }
    }
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_result_keeps_last_stderr_line() {
        let err = SandboxError::missing_result(Some(137), "Traceback\nMemoryError\n");
        assert_eq!(
            err.to_string(),
            "the harness exited without reporting a result (exit code 137): MemoryError"
        );
    }

    #[test]
    fn test_missing_result_without_stderr() {
        let err = SandboxError::missing_result(None, "  \n");
        assert_eq!(
            err.to_string(),
            "the harness exited without reporting a result (exit code -1)"
        );
        assert!(!err.is_timeout());
        assert!(SandboxError::Timeout(10).is_timeout());
    }
}
