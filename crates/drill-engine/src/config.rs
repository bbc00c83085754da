//! Engine configuration.
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file, then
//! `DRILL_*` environment variables. Command-line flags are applied on top by
//! the binary.
//!
//! ```toml
//! evaluator = "process"
//! python = "/usr/bin/python3"
//! validate_references = true
//!
//! [limits]
//! timeout_ms = 2000
//! memory_limit_mb = 128
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use drill_core::ExecutionLimits;
use drill_sandbox::DEFAULT_PYTHON;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const ENV_EVALUATOR: &str = "DRILL_EVALUATOR";
pub const ENV_TIMEOUT_MS: &str = "DRILL_TIMEOUT_MS";
pub const ENV_MAX_STEPS: &str = "DRILL_MAX_STEPS";
pub const ENV_MEMORY_LIMIT_MB: &str = "DRILL_MEMORY_LIMIT_MB";
pub const ENV_PYTHON: &str = "DRILL_PYTHON";

/// Which evaluator runs scripted submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// The in-process interpreter.
    #[default]
    Interpreted,
    /// A `python3` child process per submission.
    Process,
}

impl EvaluatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::Interpreted => "interpreted",
            EvaluatorKind::Process => "process",
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpreted" => Ok(EvaluatorKind::Interpreted),
            "process" => Ok(EvaluatorKind::Process),
            other => Err(format!(
                "unknown evaluator '{other}', expected 'interpreted' or 'process'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub evaluator: EvaluatorKind,
    pub limits: ExecutionLimits,
    /// Interpreter used by the process evaluator.
    pub python: PathBuf,
    /// Compute every reference answer at startup so a broken definition
    /// fails fast instead of on first use.
    pub validate_references: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorKind::default(),
            limits: ExecutionLimits::default(),
            python: PathBuf::from(DEFAULT_PYTHON),
            validate_references: true,
        }
    }
}

impl EngineConfig {
    /// Defaults, overlaid with `path` when given, then the process environment.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `DRILL_*` variables from the process environment.
    pub fn apply_env(&mut self) -> EngineResult<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay `DRILL_*` variables read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_vars<F>(&mut self, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_EVALUATOR) {
            self.evaluator = value.parse().map_err(|reason| EngineError::Env {
                var: ENV_EVALUATOR.to_string(),
                reason,
            })?;
        }
        if let Some(value) = get(ENV_TIMEOUT_MS) {
            self.limits.timeout_ms = parse_number(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = get(ENV_MAX_STEPS) {
            self.limits.max_steps = parse_number(ENV_MAX_STEPS, &value)?;
        }
        if let Some(value) = get(ENV_MEMORY_LIMIT_MB) {
            self.limits.memory_limit_mb = parse_number(ENV_MEMORY_LIMIT_MB, &value)?;
        }
        if let Some(value) = get(ENV_PYTHON) {
            self.python = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.limits.validate().map_err(EngineError::Invalid)?;
        if self.python.as_os_str().is_empty() {
            return Err(EngineError::Invalid("python must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_number(var: &str, value: &str) -> EngineResult<u64> {
    value.trim().parse().map_err(|_| EngineError::Env {
        var: var.to_string(),
        reason: format!("expected a non-negative integer, got '{value}'"),
    })
}
