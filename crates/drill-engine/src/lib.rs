//! Drillbench composition root.
//!
//! Loads [`EngineConfig`], builds the exercise registry, the selected
//! scripted-submission evaluator and the query engine, and exposes the
//! result as one [`Engine`] value.

pub mod config;
pub mod engine;
pub mod error;

pub use config::{EngineConfig, EvaluatorKind};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
