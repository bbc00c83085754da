//! The assembled grading engine.
//!
//! [`Engine::bootstrap`] is the only place where the registry, an evaluator
//! and the query engine meet. Everything it builds is owned by the returned
//! value and handed to the coordinator explicitly.

use std::sync::Arc;
use std::time::Instant;

use drill_core::{
    catalog, ConfigurationError, Coordinator, EvaluationResult, Evaluator, Exercise,
    ExerciseRegistry, QueryEngine, Submission,
};
use drill_query::DataFusionEngine;
use drill_sandbox::ProcessEvaluator;
use drill_script::InterpretedEvaluator;
use tracing::info;

use crate::config::{EngineConfig, EvaluatorKind};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    coordinator: Coordinator,
}

impl Engine {
    /// Build the engine over the built-in catalogue.
    pub async fn bootstrap(config: EngineConfig) -> EngineResult<Self> {
        Self::bootstrap_with(config, catalog::builtin()).await
    }

    /// Build the engine over an explicit set of exercises. Query exercises
    /// always run against [`catalog::sql_schema`].
    pub async fn bootstrap_with(config: EngineConfig, exercises: Vec<Exercise>) -> EngineResult<Self> {
        let start = Instant::now();
        config.validate()?;

        let registry = Arc::new(ExerciseRegistry::new(exercises)?);
        if config.validate_references {
            registry.prime()?;
        }

        let evaluator = build_evaluator(&config).await?;
        let query_engine: Arc<dyn QueryEngine> = Arc::new(
            DataFusionEngine::from_fixture(&catalog::sql_schema())
                .map_err(|e| ConfigurationError::QuerySchema(e.to_string()))?,
        );

        info!(
            evaluator = evaluator.name(),
            query_engine = query_engine.name(),
            exercises = registry.len(),
            timeout_ms = config.limits.timeout_ms,
            duration_ms = start.elapsed().as_millis() as u64,
            "engine ready"
        );

        Ok(Self {
            coordinator: Coordinator::new(registry, evaluator, Some(query_engine)),
            config,
        })
    }

    /// Grade one submission. Never fails; see [`EvaluationResult`].
    pub async fn evaluate(&self, submission: &Submission) -> EvaluationResult {
        self.coordinator.evaluate(submission).await
    }

    pub fn registry(&self) -> &ExerciseRegistry {
        self.coordinator.registry()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator_name(&self) -> &'static str {
        self.coordinator.evaluator_name()
    }
}

async fn build_evaluator(config: &EngineConfig) -> EngineResult<Arc<dyn Evaluator>> {
    match config.evaluator {
        EvaluatorKind::Interpreted => Ok(Arc::new(InterpretedEvaluator::new(config.limits.clone()))),
        EvaluatorKind::Process => {
            let evaluator = ProcessEvaluator::new(&config.python, config.limits.clone());
            if !evaluator.is_available().await {
                return Err(EngineError::PythonUnavailable(config.python.clone()));
            }
            Ok(Arc::new(evaluator))
        }
    }
}
