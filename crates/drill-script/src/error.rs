//! Interpreter errors.
//!
//! Every variant renders the way a learner expects to read it: the Python
//! exception name followed by a message. [`ScriptError::At`] wraps an error
//! with the source line it was raised on.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("NameError: {0}")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("ImportError: {0}")]
    Import(String),

    #[error("AssertionError{}", assertion_suffix(.0))]
    Assertion(String),

    #[error("RecursionError: maximum call depth of {0} exceeded")]
    Recursion(usize),

    /// Comparison or hashing of containers nested too deeply.
    #[error("RecursionError: maximum recursion depth exceeded {0}")]
    Nesting(&'static str),

    #[error("OverflowError: {0}")]
    Overflow(String),

    #[error("StepLimitExceeded: execution used more than {0} interpreter steps")]
    StepBudget(u64),

    #[error("TimeoutError: execution exceeded the {0} ms time limit")]
    Timeout(u64),

    #[error("MemoryError: {0}")]
    Memory(String),

    /// A user-raised exception (`raise ValueError("...")`).
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },

    #[error("RuntimeError: {0}")]
    Runtime(String),

    #[error("line {line}: {source}")]
    At {
        line: usize,
        #[source]
        source: Box<ScriptError>,
    },
}

fn assertion_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl ScriptError {
    /// Attach a line number unless one is already attached.
    pub fn at(self, line: usize) -> Self {
        match self {
            ScriptError::At { .. } => self,
            other if line == 0 => other,
            other => ScriptError::At {
                line,
                source: Box::new(other),
            },
        }
    }

    /// The error without its line wrapper.
    pub fn root(&self) -> &ScriptError {
        match self {
            ScriptError::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// Exception class name, used by `except` clauses.
    pub fn kind(&self) -> &str {
        match self.root() {
            ScriptError::Syntax(_) => "SyntaxError",
            ScriptError::Name(_) => "NameError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Value(_) => "ValueError",
            ScriptError::Index(_) => "IndexError",
            ScriptError::Key(_) => "KeyError",
            ScriptError::ZeroDivision(_) => "ZeroDivisionError",
            ScriptError::Attribute(_) => "AttributeError",
            ScriptError::Import(_) => "ImportError",
            ScriptError::Assertion(_) => "AssertionError",
            ScriptError::Recursion(_) | ScriptError::Nesting(_) => "RecursionError",
            ScriptError::Overflow(_) => "OverflowError",
            ScriptError::StepBudget(_) => "StepLimitExceeded",
            ScriptError::Timeout(_) => "TimeoutError",
            ScriptError::Memory(_) => "MemoryError",
            ScriptError::Raised { kind, .. } => kind,
            ScriptError::Runtime(_) => "RuntimeError",
            ScriptError::At { .. } => "RuntimeError",
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> String {
        match self.root() {
            ScriptError::Raised { message, .. } => message.clone(),
            ScriptError::Recursion(_)
            | ScriptError::StepBudget(_)
            | ScriptError::Timeout(_) => self.root().to_string(),
            ScriptError::Nesting(context) => {
                format!("maximum recursion depth exceeded {context}")
            }
            ScriptError::Assertion(m)
            | ScriptError::Syntax(m)
            | ScriptError::Name(m)
            | ScriptError::Type(m)
            | ScriptError::Value(m)
            | ScriptError::Index(m)
            | ScriptError::Key(m)
            | ScriptError::ZeroDivision(m)
            | ScriptError::Attribute(m)
            | ScriptError::Import(m)
            | ScriptError::Overflow(m)
            | ScriptError::Memory(m)
            | ScriptError::Runtime(m) => m.clone(),
            ScriptError::At { .. } => String::new(),
        }
    }

    /// Resource ceilings cannot be caught by `try`/`except`.
    pub fn is_ceiling(&self) -> bool {
        matches!(
            self.root(),
            ScriptError::Recursion(_)
                | ScriptError::Nesting(_)
                | ScriptError::StepBudget(_)
                | ScriptError::Timeout(_)
                | ScriptError::Memory(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), ScriptError::Timeout(_))
    }

    /// Build an error from an exception class name, as `raise` does.
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "TypeError" => ScriptError::Type(message),
            "ValueError" => ScriptError::Value(message),
            "IndexError" => ScriptError::Index(message),
            "KeyError" => ScriptError::Key(message),
            "ZeroDivisionError" => ScriptError::ZeroDivision(message),
            "AssertionError" => ScriptError::Assertion(message),
            "RuntimeError" => ScriptError::Runtime(message),
            other => ScriptError::Raised {
                kind: other.to_string(),
                message,
            },
        }
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_prefix_is_applied_once() {
        let err = ScriptError::Name("name 'x' is not defined".into()).at(3).at(9);
        assert_eq!(err.to_string(), "line 3: NameError: name 'x' is not defined");
        assert_eq!(err.kind(), "NameError");
    }

    #[test]
    fn test_bare_assertion_has_no_colon() {
        assert_eq!(ScriptError::Assertion(String::new()).to_string(), "AssertionError");
        assert_eq!(
            ScriptError::Assertion("bad".into()).to_string(),
            "AssertionError: bad"
        );
    }

    #[test]
    fn test_ceilings_are_not_catchable() {
        assert!(ScriptError::StepBudget(10).at(2).is_ceiling());
        assert!(!ScriptError::Value("x".into()).is_ceiling());
    }
}
