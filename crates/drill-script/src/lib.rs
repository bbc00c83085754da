//! In-process interpreter for the Python-flavoured subset learners write in
//! scripted exercises.
//!
//! The pipeline is lexer → parser → tree-walking interpreter. Every run
//! starts from a fresh global scope holding copies of the fixture values, and
//! is bounded by a step budget, a call-depth limit, a collection-size limit
//! and a wall-clock deadline. [`InterpretedEvaluator`] plugs the interpreter
//! into the `drill_core::Evaluator` seam.

// ── Front end ─────────────────────────────────────────────────
pub mod ast;
pub mod lexer;
mod parse_expr;
mod parse_stmt;
pub mod parser;
pub mod token;

// ── Runtime ───────────────────────────────────────────────────
mod builtins;
pub mod error;
mod format;
pub mod interpreter;
mod modules;
pub mod value;

// ── Evaluator seam ────────────────────────────────────────────
pub mod evaluator;

pub use error::{ScriptError, ScriptResult};
pub use evaluator::{execute_blocking, InterpretedEvaluator};
pub use interpreter::Interpreter;
pub use parser::parse_program;
pub use value::Value;
