//! Execution seams.
//!
//! The coordinator never runs learner text itself. Scripted submissions go to
//! an [`Evaluator`] (in-process interpreter or external process) and query
//! submissions go to a [`QueryEngine`]. Both fold every learner-caused problem
//! into an [`ExecutionOutcome`]; neither returns `Err`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionOutcome, Helper, ResultSlot};
use crate::fixture::FixtureContext;

/// Everything an evaluator needs for one scripted run.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub source: String,
    /// A fresh context owned by this run.
    pub context: FixtureContext,
    pub slot: ResultSlot,
    pub helpers: Vec<Helper>,
}

/// Runs one scripted submission to completion.
#[async_trait]
pub trait Evaluator: Send + Sync + fmt::Debug {
    /// Short identifier used in logs (`interpreted`, `process`).
    fn name(&self) -> &'static str;

    /// Execute the request. Syntax errors, exceptions, ceiling breaches and a
    /// slot that was never defined all come back as
    /// [`ExecutionOutcome::RuntimeFailure`].
    async fn execute(&self, request: ScriptRequest) -> ExecutionOutcome;
}

/// Runs one read-only query against the pre-loaded schema.
#[async_trait]
pub trait QueryEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Execute `sql`. Parse, planning and execution errors come back as
    /// [`ExecutionOutcome::QueryFailure`].
    async fn execute(&self, sql: &str) -> ExecutionOutcome;
}

/// Resource ceilings applied to scripted submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Wall-clock ceiling for one run.
    pub timeout_ms: u64,
    /// Interpreter step budget.
    pub max_steps: u64,
    /// Maximum nesting of function calls.
    pub max_call_depth: usize,
    /// Maximum number of elements in one list, dict, set or string.
    pub max_collection_len: usize,
    /// Address-space ceiling for the external process.
    pub memory_limit_mb: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_steps: 5_000_000,
            max_call_depth: 200,
            max_collection_len: 1_000_000,
            memory_limit_mb: 256,
        }
    }
}

impl ExecutionLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The learner-facing message for a wall-clock breach.
    pub fn timeout_message(&self) -> String {
        format!(
            "TimeoutError: execution exceeded the {} ms time limit",
            self.timeout_ms
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than zero".into());
        }
        if self.max_steps == 0 {
            return Err("max_steps must be greater than zero".into());
        }
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be greater than zero".into());
        }
        if self.max_collection_len == 0 {
            return Err("max_collection_len must be greater than zero".into());
        }
        if self.memory_limit_mb < 16 {
            return Err(format!(
                "memory_limit_mb must be at least 16, got {}",
                self.memory_limit_mb
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.timeout(), Duration::from_secs(5));
        assert!(limits.validate().is_ok());
        assert!(limits.timeout_message().contains("5000 ms"));
    }

    #[test]
    fn test_limits_partial_deserialize_uses_defaults() {
        let limits: ExecutionLimits = serde_json::from_str(r#"{"timeout_ms": 250}"#).expect("de");
        assert_eq!(limits.timeout_ms, 250);
        assert_eq!(limits.max_steps, ExecutionLimits::default().max_steps);
    }

    #[test]
    fn test_validate_rejects_zero_ceilings() {
        let limits = ExecutionLimits {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }
}
