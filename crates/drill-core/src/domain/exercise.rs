//! Exercise definitions: what a submission runs against and how it is graded.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{ConfigResult, ConfigurationError};
use super::value::Value;
use crate::equivalence::{Comparator, RowOrdering};
use crate::fixture::{is_identifier, FixtureContext, FixtureSpec};

/// Where a scripted submission hands back its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSlot {
    /// A top-level variable the submission must assign, e.g. `result`.
    Binding { name: String },
    /// A function the submission must define. It is called once with the
    /// named fixture values as positional arguments and its return value is
    /// the answer.
    Call { function: String, args: Vec<String> },
}

impl ResultSlot {
    pub fn binding(name: &str) -> Self {
        ResultSlot::Binding {
            name: name.to_string(),
        }
    }

    pub fn call(function: &str, args: &[&str]) -> Self {
        ResultSlot::Call {
            function: function.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// The name the submission must define.
    pub fn name(&self) -> &str {
        match self {
            ResultSlot::Binding { name } => name,
            ResultSlot::Call { function, .. } => function,
        }
    }

    /// Check the slot against the fixture it will read from.
    pub fn validate(&self, fixture: &FixtureSpec) -> Result<(), String> {
        if !is_identifier(self.name()) {
            return Err(format!("'{}' is not a valid identifier", self.name()));
        }
        if let ResultSlot::Call { args, .. } = self {
            if let Some(missing) = args.iter().find(|a| !fixture.contains(a)) {
                return Err(format!("argument '{missing}' is not a fixture entry"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResultSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSlot::Binding { name } => write!(f, "{name}"),
            ResultSlot::Call { function, args } => write!(f, "{function}({})", args.join(", ")),
        }
    }
}

/// A whitelisted module a scripted exercise may import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Helper {
    Math,
    Collections,
    Heapq,
    /// Tabular constructor and row access (`table(columns, rows)`).
    Table,
}

impl Helper {
    pub fn module_name(&self) -> &'static str {
        match self {
            Helper::Math => "math",
            Helper::Collections => "collections",
            Helper::Heapq => "heapq",
            Helper::Table => "table",
        }
    }

    pub fn from_module(name: &str) -> Option<Self> {
        match name {
            "math" => Some(Helper::Math),
            "collections" => Some(Helper::Collections),
            "heapq" => Some(Helper::Heapq),
            "table" => Some(Helper::Table),
            _ => None,
        }
    }
}

/// Scripted exercises run learner code; query exercises run learner SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseKind {
    Scripted {
        slot: ResultSlot,
        helpers: Vec<Helper>,
    },
    Query,
}

impl ExerciseKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::Scripted { .. } => "scripted",
            ExerciseKind::Query => "query",
        }
    }
}

/// Computes the expected answer from a freshly materialised fixture.
pub type ReferenceFn = dyn Fn(&FixtureContext) -> Result<Value, String> + Send + Sync;

/// How the expected answer is obtained.
#[derive(Clone)]
pub enum Reference {
    Computed(Arc<ReferenceFn>),
    Expected(Value),
}

impl Reference {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&FixtureContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        Reference::Computed(Arc::new(f))
    }

    /// Produce the expected value. `context` must not be shared with any
    /// submission.
    pub fn resolve(&self, context: &FixtureContext) -> Result<Value, String> {
        match self {
            Reference::Computed(f) => f(context),
            Reference::Expected(v) => Ok(v.clone()),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Computed(_) => f.write_str("Computed(<fn>)"),
            Reference::Expected(v) => f.debug_tuple("Expected").field(v).finish(),
        }
    }
}

/// A static grading scenario. Built at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Exercise {
    pub key: String,
    pub title: String,
    pub prompt: String,
    pub kind: ExerciseKind,
    pub fixture: FixtureSpec,
    pub reference: Reference,
    pub comparator: Comparator,
    /// Canonical solution text; always expected to pass.
    pub solution: String,
    /// Optional skeleton shown to the learner.
    pub starter: Option<String>,
}

impl Exercise {
    fn new(key: &str, kind: ExerciseKind) -> Self {
        Self {
            key: key.to_string(),
            title: key.to_string(),
            prompt: String::new(),
            kind,
            fixture: FixtureSpec::new(),
            reference: Reference::Expected(Value::Null),
            comparator: Comparator::Exact,
            solution: String::new(),
            starter: None,
        }
    }

    /// A scripted exercise answering through `slot`.
    pub fn scripted(key: &str, slot: ResultSlot) -> Self {
        Self::new(
            key,
            ExerciseKind::Scripted {
                slot,
                helpers: Vec::new(),
            },
        )
    }

    /// A query exercise graded on the tabular result of the submitted SQL.
    pub fn query(key: &str) -> Self {
        Self::new(key, ExerciseKind::Query)
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.trim().to_string();
        self
    }

    /// Declare whitelisted helper modules. Ignored for query exercises.
    pub fn helpers(mut self, modules: &[Helper]) -> Self {
        if let ExerciseKind::Scripted { helpers, .. } = &mut self.kind {
            *helpers = modules.to_vec();
        }
        self
    }

    pub fn fixture(mut self, fixture: FixtureSpec) -> Self {
        self.fixture = fixture;
        self
    }

    pub fn expected(mut self, value: impl Into<Value>) -> Self {
        self.reference = Reference::Expected(value.into());
        self
    }

    pub fn reference<F>(mut self, f: F) -> Self
    where
        F: Fn(&FixtureContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.reference = Reference::computed(f);
        self
    }

    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn solution(mut self, text: &str) -> Self {
        self.solution = dedent(text);
        self
    }

    pub fn starter(mut self, text: &str) -> Self {
        self.starter = Some(dedent(text));
        self
    }

    /// Check every static part of the definition.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.key.is_empty() {
            return Err(ConfigurationError::InvalidSlot {
                exercise: "<unnamed>".into(),
                reason: "exercise key is empty".into(),
            });
        }

        self.fixture
            .validate()
            .map_err(|e| ConfigurationError::MalformedFixture {
                exercise: self.key.clone(),
                entry: e.entry,
                reason: e.reason,
            })?;

        if let ExerciseKind::Scripted { slot, helpers } = &self.kind {
            slot.validate(&self.fixture)
                .map_err(|reason| ConfigurationError::InvalidSlot {
                    exercise: self.key.clone(),
                    reason,
                })?;
            if self.fixture.contains(slot.name()) {
                return Err(ConfigurationError::InvalidSlot {
                    exercise: self.key.clone(),
                    reason: format!("'{}' shadows a fixture entry", slot.name()),
                });
            }
            for (i, h) in helpers.iter().enumerate() {
                if helpers[..i].contains(h) {
                    return Err(ConfigurationError::InvalidSlot {
                        exercise: self.key.clone(),
                        reason: format!("helper '{}' declared twice", h.module_name()),
                    });
                }
            }
        }

        self.comparator
            .validate()
            .map_err(|reason| ConfigurationError::InvalidComparator {
                exercise: self.key.clone(),
                reason,
            })?;

        if let (Comparator::TabularEquivalence { .. }, Reference::Expected(v)) =
            (&self.comparator, &self.reference)
        {
            if !matches!(v, Value::Table(_)) {
                return Err(ConfigurationError::InvalidComparator {
                    exercise: self.key.clone(),
                    reason: format!("tabular comparator needs a table reference, got {}", v.type_name()),
                });
            }
        }
        if let (
            Comparator::TabularEquivalence {
                ordering: RowOrdering::SortedBy { keys },
                ..
            },
            Reference::Expected(Value::Table(t)),
        ) = (&self.comparator, &self.reference)
        {
            if let Some(k) = keys.iter().find(|k| t.column_index(k).is_none()) {
                return Err(ConfigurationError::InvalidComparator {
                    exercise: self.key.clone(),
                    reason: format!("sort key '{k}' is not a column of the reference table"),
                });
            }
        }

        Ok(())
    }
}

/// Strip the common leading indentation from an indented raw string literal.
fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let body: Vec<&str> = lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect();
    let mut out = body.join("\n").trim_matches('\n').to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_sum() -> Exercise {
        Exercise::scripted("pair-sum", ResultSlot::call("twoSum", &["nums", "target"]))
            .fixture(
                FixtureSpec::new()
                    .with("nums", Value::int_list(&[2, 7, 11, 15]))
                    .with("target", 9i64),
            )
            .expected(Value::int_list(&[0, 1]))
    }

    #[test]
    fn test_valid_exercise() {
        assert!(pair_sum().validate().is_ok());
        assert_eq!(pair_sum().kind.label(), "scripted");
    }

    #[test]
    fn test_call_slot_args_must_exist() {
        let ex = Exercise::scripted("x", ResultSlot::call("f", &["missing"]));
        let err = ex.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSlot { .. }));
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_slot_may_not_shadow_fixture() {
        let ex = Exercise::scripted("x", ResultSlot::binding("df"))
            .fixture(FixtureSpec::new().with("df", 1i64));
        assert!(ex.validate().unwrap_err().to_string().contains("shadows"));
    }

    #[test]
    fn test_tabular_comparator_needs_table_reference() {
        let ex = Exercise::query("q")
            .expected(Value::Int(1))
            .comparator(Comparator::tabular_sorted_by(&["id"]));
        assert!(matches!(
            ex.validate(),
            Err(ConfigurationError::InvalidComparator { .. })
        ));
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(
            ResultSlot::call("twoSum", &["nums", "target"]).to_string(),
            "twoSum(nums, target)"
        );
        assert_eq!(ResultSlot::binding("result").to_string(), "result");
    }

    #[test]
    fn test_reference_resolves_from_context() {
        let reference = Reference::computed(|ctx| {
            ctx.get("n").cloned().ok_or_else(|| "missing n".to_string())
        });
        let ctx = FixtureSpec::new().with("n", 5i64).materialize();
        assert_eq!(reference.resolve(&ctx), Ok(Value::Int(5)));
        assert_eq!(format!("{reference:?}"), "Computed(<fn>)");
    }

    #[test]
    fn test_dedent_solution_text() {
        let ex = Exercise::query("q").solution(
            "
            SELECT name
            FROM employees
        ",
        );
        assert_eq!(ex.solution, "SELECT name\nFROM employees\n");
    }

    #[test]
    fn test_helper_module_names_round_trip() {
        for h in [Helper::Math, Helper::Collections, Helper::Heapq, Helper::Table] {
            assert_eq!(Helper::from_module(h.module_name()), Some(h));
        }
        assert_eq!(Helper::from_module("os"), None);
    }
}
