//! Exercise registry.
//!
//! The registry is built once at startup from static definitions and shared
//! read-only afterwards. Construction validates every exercise; any problem
//! is a [`ConfigurationError`]. Reference answers are computed at most once
//! per exercise, each from its own freshly materialised fixture.

use std::sync::OnceLock;
use std::time::Instant;

use crate::domain::{ConfigResult, ConfigurationError, Exercise, ExerciseKind, Value};
use crate::obs;

struct Entry {
    exercise: Exercise,
    reference: OnceLock<Result<Value, String>>,
}

impl Entry {
    fn reference(&self) -> &Result<Value, String> {
        self.reference.get_or_init(|| {
            let start = Instant::now();
            let context = self.exercise.fixture.materialize();
            let result = self.exercise.reference.resolve(&context);
            obs::emit_reference_computed(
                &self.exercise.key,
                start.elapsed().as_millis() as u64,
                result.is_ok(),
            );
            result
        })
    }
}

/// Immutable collection of exercises, keyed by exercise key.
pub struct ExerciseRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for ExerciseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseRegistry")
            .field("exercises", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExerciseRegistry {
    /// Validate and register `exercises`, preserving their order.
    pub fn new(exercises: Vec<Exercise>) -> ConfigResult<Self> {
        let mut entries: Vec<Entry> = Vec::with_capacity(exercises.len());
        for exercise in exercises {
            exercise.validate()?;
            if entries.iter().any(|e| e.exercise.key == exercise.key) {
                return Err(ConfigurationError::DuplicateExercise(exercise.key));
            }
            entries.push(Entry {
                exercise,
                reference: OnceLock::new(),
            });
        }

        let query = entries
            .iter()
            .filter(|e| matches!(e.exercise.kind, ExerciseKind::Query))
            .count();
        obs::emit_registry_loaded(entries.len(), entries.len() - query, query);

        Ok(Self { entries })
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.exercise.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&Exercise> {
        self.entry(key).map(|e| &e.exercise)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exercise> {
        self.entries.iter().map(|e| &e.exercise)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.exercise.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The expected answer for `key`, computed on first use.
    ///
    /// Returns `None` for unknown keys.
    pub fn reference(&self, key: &str) -> Option<Result<&Value, String>> {
        let entry = self.entry(key)?;
        Some(entry.reference().as_ref().map_err(Clone::clone))
    }

    /// Compute every reference now so that a broken one aborts startup.
    pub fn prime(&self) -> ConfigResult<()> {
        for entry in &self.entries {
            if let Err(reason) = entry.reference() {
                return Err(ConfigurationError::Reference {
                    exercise: entry.exercise.key.clone(),
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::domain::ResultSlot;
    use crate::fixture::FixtureSpec;

    fn counting(key: &str, calls: Arc<AtomicUsize>) -> Exercise {
        Exercise::scripted(key, ResultSlot::binding("result"))
            .fixture(FixtureSpec::new().with("n", 4i64))
            .reference(move |ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                match ctx.get("n") {
                    Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                    _ => Err("n is missing".into()),
                }
            })
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = ExerciseRegistry::new(vec![
            counting("double", calls.clone()),
            counting("double", calls),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateExercise(k) if k == "double"));
    }

    #[test]
    fn test_malformed_fixture_is_fatal() {
        let bad = Exercise::scripted("bad", ResultSlot::binding("result"))
            .fixture(FixtureSpec::new().with("not valid", 1i64));
        assert!(matches!(
            ExerciseRegistry::new(vec![bad]),
            Err(ConfigurationError::MalformedFixture { .. })
        ));
    }

    #[test]
    fn test_reference_is_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ExerciseRegistry::new(vec![counting("double", calls.clone())]).expect("registry");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.reference("double"), Some(Ok(&Value::Int(8))));
        assert_eq!(registry.reference("double"), Some(Ok(&Value::Int(8))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.reference("missing").is_none());
    }

    #[test]
    fn test_prime_reports_failing_reference() {
        let broken = Exercise::scripted("broken", ResultSlot::binding("result"))
            .reference(|_| Err("division by zero".into()));
        let registry = ExerciseRegistry::new(vec![broken]).expect("registry");
        let err = registry.prime().unwrap_err();
        assert_eq!(
            err.to_string(),
            "exercise broken: reference computation failed: division by zero"
        );
    }

    #[test]
    fn test_lookup_and_iteration_keep_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ExerciseRegistry::new(vec![
            counting("b", calls.clone()),
            counting("a", calls),
        ])
        .expect("registry");
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }
}
