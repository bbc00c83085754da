//! Global atomic counters for evaluation outcomes.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI run).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::EvaluationResult;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    evaluations: AtomicU64,
    passed: AtomicU64,
    failed: AtomicU64,
    errored: AtomicU64,
    timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            passed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// Count one finished evaluation under its verdict.
    pub fn record(&self, result: &EvaluationResult) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            EvaluationResult::Passed => &self.passed,
            EvaluationResult::Failed { .. } => &self.failed,
            EvaluationResult::Errored { .. } => &self.errored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = result.label(), "counter incremented");
    }

    /// Increment the timeouts counter by one.
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations = self.evaluations(),
            passed = self.passed(),
            failed = self.failed(),
            errored = self.errored(),
            timeouts = self.timeouts(),
        );
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations.store(0, Ordering::Relaxed);
        self.passed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.errored.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_verdicts() {
        let m = Metrics::new();
        m.record(&EvaluationResult::Passed);
        m.record(&EvaluationResult::Failed {
            explanation: "x".into(),
        });
        m.record(&EvaluationResult::errored("boom"));
        m.record(&EvaluationResult::Passed);
        m.inc_timeouts();

        assert_eq!(m.evaluations(), 4);
        assert_eq!(m.passed(), 2);
        assert_eq!(m.failed(), 1);
        assert_eq!(m.errored(), 1);
        assert_eq!(m.timeouts(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.record(&EvaluationResult::Passed);
        m.inc_timeouts();
        m.reset();
        assert_eq!(m.evaluations(), 0);
        assert_eq!(m.passed(), 0);
        assert_eq!(m.timeouts(), 0);
    }
}
