//! Domain models for Drillbench.
//!
//! Canonical definitions for the core entities:
//! - `Value` / `Table`: what submissions produce and references expect
//! - `Exercise`: immutable grading scenario
//! - `Submission`: one learner attempt
//! - `ExecutionOutcome` / `EvaluationResult`: tagged results

pub mod error;
pub mod exercise;
pub mod outcome;
pub mod table;
pub mod value;

// Re-export main types and errors
pub use error::{ConfigResult, ConfigurationError};
pub use exercise::{Exercise, ExerciseKind, Helper, Reference, ReferenceFn, ResultSlot};
pub use outcome::{EvaluationResult, ExecutionOutcome, Submission};
pub use table::Table;
pub use value::{format_float, Value};
