//! External-process evaluator for Drillbench.
//!
//! [`ProcessEvaluator`] runs a scripted submission under a real `python3`
//! in a throwaway working directory, with an embedded harness that restricts
//! imports, applies a memory ceiling and reports the answer as one line of
//! JSON.

pub mod error;
pub mod process;

pub use error::{SandboxError, SandboxResult};
pub use process::{ProcessEvaluator, DEFAULT_PYTHON, RESULT_MARKER};
