//! Startup failures. Every variant is fatal.

use std::path::PathBuf;

use drill_core::ConfigurationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    Env { var: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("python interpreter '{}' cannot be started", .0.display())]
    PythonUnavailable(PathBuf),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_error_display() {
        let err = EngineError::Env {
            var: "DRILL_TIMEOUT_MS".into(),
            reason: "expected an integer, got 'soon'".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for DRILL_TIMEOUT_MS: expected an integer, got 'soon'"
        );
    }

    #[test]
    fn test_configuration_error_is_transparent() {
        let err: EngineError = ConfigurationError::DuplicateExercise("pair-sum".into()).into();
        assert_eq!(err.to_string(), "duplicate exercise key: pair-sum");
    }
}
