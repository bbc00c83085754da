//! Drillbench core library.
//!
//! Domain model, fixture materialisation, equivalence checking, the
//! evaluator/query seams, the exercise registry and the evaluation
//! coordinator. Concrete evaluators and the query engine live in sibling
//! crates and are wired together by `drill-engine`.

pub mod catalog;
pub mod coordinator;
pub mod domain;
pub mod equivalence;
pub mod executor;
pub mod fixture;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use coordinator::{Coordinator, Stage};
pub use domain::{
    format_float, ConfigResult, ConfigurationError, EvaluationResult, ExecutionOutcome, Exercise,
    ExerciseKind, Helper, Reference, ReferenceFn, ResultSlot, Submission, Table, Value,
};
pub use equivalence::{check, Comparator, RowOrdering, Verdict};
pub use executor::{Evaluator, ExecutionLimits, QueryEngine, ScriptRequest};
pub use fixture::{FixtureContext, FixtureEntry, FixtureError, FixtureSpec};
pub use metrics::METRICS;
pub use registry::ExerciseRegistry;
pub use telemetry::init_tracing;
