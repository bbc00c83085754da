//! Read-only SQL for Drillbench query exercises.
//!
//! [`DataFusionEngine`] loads the fixture tables into an embedded DataFusion
//! session once and answers learner queries with [`drill_core::Table`]
//! results.

pub mod convert;
pub mod engine;
pub mod error;
pub mod schema;

pub use engine::DataFusionEngine;
pub use error::{QueryError, QueryResult};
