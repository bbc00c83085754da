//! Scripted-submission evaluator that runs learner code in a separate
//! `python3` process.
//!
//! Each run gets a private temporary directory holding the submission, a
//! JSON payload and the embedded harness. The child starts with a cleared
//! environment and no stdin, is killed when its handle drops, and is bounded
//! by a wall-clock timeout here plus an address-space ceiling applied by the
//! harness itself.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use drill_core::{
    Evaluator, ExecutionLimits, ExecutionOutcome, Helper, ResultSlot, ScriptRequest, Value,
    METRICS,
};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{SandboxError, SandboxResult};

/// Harness source, written next to every submission.
const HARNESS: &str = include_str!("harness.py");

/// Prefix of the single stdout line carrying the run's outcome.
pub const RESULT_MARKER: &str = "__DRILL_RESULT__ ";

/// Interpreter used when none is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// What the harness reads from `payload.json`.
#[derive(Debug, Serialize)]
struct Payload<'a> {
    bindings: Vec<(&'a str, &'a Value)>,
    slot: &'a ResultSlot,
    helpers: &'a [Helper],
    memory_limit_mb: u64,
    max_call_depth: usize,
}

/// Runs scripted submissions through the embedded harness.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    python: PathBuf,
    limits: ExecutionLimits,
}

impl ProcessEvaluator {
    pub fn new(python: impl Into<PathBuf>, limits: ExecutionLimits) -> Self {
        Self {
            python: python.into(),
            limits,
        }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Whether the configured interpreter can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.python)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run(&self, request: &ScriptRequest) -> SandboxResult<ExecutionOutcome> {
        let workdir = tempfile::Builder::new()
            .prefix("drill-run-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;

        let payload = Payload {
            bindings: request.context.iter().collect(),
            slot: &request.slot,
            helpers: &request.helpers,
            memory_limit_mb: self.limits.memory_limit_mb,
            max_call_depth: self.limits.max_call_depth,
        };
        let payload = serde_json::to_vec(&payload).map_err(SandboxError::Payload)?;

        let harness_path = workdir.path().join("harness.py");
        let payload_path = workdir.path().join("payload.json");
        let submission_path = workdir.path().join("submission.py");
        tokio::fs::write(&harness_path, HARNESS)
            .await
            .map_err(SandboxError::Workspace)?;
        tokio::fs::write(&payload_path, payload)
            .await
            .map_err(SandboxError::Workspace)?;
        tokio::fs::write(&submission_path, &request.source)
            .await
            .map_err(SandboxError::Workspace)?;

        let child = Command::new(&self.python)
            .arg("-I")
            .arg(&harness_path)
            .arg(&payload_path)
            .arg(&submission_path)
            .current_dir(workdir.path())
            .env_clear()
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                python: self.python.clone(),
                source,
            })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = tokio::time::timeout(self.limits.timeout(), child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout(self.limits.timeout_ms))?
            .map_err(SandboxError::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_report(&stdout).unwrap_or_else(|| {
            Err(SandboxError::missing_result(output.status.code(), &stderr))
        })
    }
}

#[async_trait]
impl Evaluator for ProcessEvaluator {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute(&self, request: ScriptRequest) -> ExecutionOutcome {
        let start = Instant::now();
        let result = self.run(&request).await;
        debug!(
            python = %self.python.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "harness run finished"
        );

        match result {
            Ok(ExecutionOutcome::QueryFailure { message }) => {
                ExecutionOutcome::RuntimeFailure { message }
            }
            Ok(outcome) => outcome,
            Err(e) if e.is_timeout() => {
                METRICS.inc_timeouts();
                warn!(timeout_ms = self.limits.timeout_ms, "harness process timed out");
                ExecutionOutcome::runtime_failure(self.limits.timeout_message())
            }
            Err(e) => {
                warn!(error = %e, "harness process failed");
                ExecutionOutcome::runtime_failure(format!("RuntimeError: {e}"))
            }
        }
    }
}

/// Find the last marker line on stdout and decode it.
///
/// Returns `None` when no marker line is present.
fn parse_report(stdout: &str) -> Option<SandboxResult<ExecutionOutcome>> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))?;
    Some(serde_json::from_str(line.trim()).map_err(SandboxError::MalformedResult))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::FixtureSpec;

    #[test]
    fn test_parse_report_completed() {
        let stdout = "__DRILL_RESULT__ {\"status\": \"completed\", \"value\": {\"type\": \"int\", \"value\": 3}}\n";
        let outcome = parse_report(stdout).expect("marker").expect("json");
        assert_eq!(outcome, ExecutionOutcome::Completed { value: Value::Int(3) });
    }

    #[test]
    fn test_parse_report_uses_last_marker() {
        let stdout = concat!(
            "__DRILL_RESULT__ {\"status\": \"completed\", \"value\": {\"type\": \"null\"}}\n",
            "__DRILL_RESULT__ {\"status\": \"runtime_failure\", \"message\": \"line 1: ValueError: x\"}\n",
        );
        let outcome = parse_report(stdout).expect("marker").expect("json");
        assert_eq!(
            outcome,
            ExecutionOutcome::runtime_failure("line 1: ValueError: x")
        );
    }

    #[test]
    fn test_parse_report_without_marker() {
        assert!(parse_report("Traceback (most recent call last):\n").is_none());
    }

    #[test]
    fn test_parse_report_malformed_json() {
        let result = parse_report("__DRILL_RESULT__ {not json}\n").expect("marker");
        assert!(matches!(result, Err(SandboxError::MalformedResult(_))));
    }

    #[test]
    fn test_payload_shape() {
        let context = FixtureSpec::new()
            .with("nums", Value::int_list(&[1, 2]))
            .materialize();
        let slot = ResultSlot::call("f", &["nums"]);
        let payload = Payload {
            bindings: context.iter().collect(),
            slot: &slot,
            helpers: &[Helper::Heapq],
            memory_limit_mb: 64,
            max_call_depth: 100,
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["bindings"][0][0], "nums");
        assert_eq!(json["bindings"][0][1]["type"], "list");
        assert_eq!(json["slot"]["kind"], "call");
        assert_eq!(json["helpers"][0], "heapq");
        assert_eq!(json["memory_limit_mb"], 64);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_a_runtime_failure() {
        let evaluator = ProcessEvaluator::new(
            "/nonexistent/drill-python",
            ExecutionLimits::default(),
        );
        assert!(!evaluator.is_available().await);
        let outcome = evaluator
            .execute(ScriptRequest {
                source: "result = 1\n".into(),
                context: FixtureSpec::new().materialize(),
                slot: ResultSlot::binding("result"),
                helpers: Vec::new(),
            })
            .await;
        let ExecutionOutcome::RuntimeFailure { message } = outcome else {
            panic!("expected a runtime failure, got {outcome:?}");
        };
        assert!(message.starts_with("RuntimeError: could not start"), "{message}");
    }
}
