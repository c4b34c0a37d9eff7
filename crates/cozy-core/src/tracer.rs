//! Synthesis progress tracing.
//!
//! Provides a trait-based tracing system for the [`crate::driver`] search loop
//! with zero-cost abstraction. When using [`NoopTracer`], all trace methods
//! compile away entirely via monomorphization.
//!
//! # Architecture
//!
//! The [`SynthTracer`] trait defines hook points at key search events (a
//! minor iteration starting, a candidate being evicted, an improvement being
//! found, a new counterexample arriving). Concrete implementations collect
//! different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (library default) |
//! | [`StderrTracer`] | Human-readable progress log to stderr |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |
//!
//! # Usage
//!
//! [`crate::driver::improve`] is generic over `Tr: SynthTracer`. Callers
//! choose the tracer at the call site:
//!
//! ```ignore
//! // Library default (zero overhead):
//! improve(target, &mut learner, &solver, &limits, NoopTracer);
//!
//! // Debugging:
//! improve(target, &mut learner, &solver, &limits, StderrTracer::new());
//! ```

use crate::expr::Exp;

/// Trace event emitted during a synthesis run.
///
/// Used by [`RecordingTracer`] to capture a full run for deterministic
/// inspection in tests, or for dumping a run's history to JSON for
/// post-mortem inspection outside the process (`serde_json::to_string` over
/// [`RecordingTracer::events`]).
#[derive(Debug, Clone, serde::Serialize)]
pub enum SynthTraceEvent {
    /// A new round of candidate enumeration began at the given candidate size.
    MinorIteration { size: usize, cache_len: usize },
    /// The cache evicted candidates whose cost exceeded the current ceiling.
    CacheEvictedByCeiling { evicted: usize },
    /// A candidate was rejected by [`crate::builder::FixedBuilder`] before
    /// ever reaching the cache.
    CandidateRejected { reason: &'static str },
    /// A strictly cheaper, verified-equivalent candidate was found.
    ImprovementFound { cost_before: String, cost_after: String },
    /// The solver returned a counterexample; the example set grew.
    NewCounterexample { example_count: usize },
    /// The search loop terminated.
    Stopped { reason: &'static str },
}

/// Trait for synthesis progress tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
pub trait SynthTracer {
    /// Called once per size-class of candidate enumeration.
    #[inline(always)]
    fn minor_iteration(&mut self, _size: usize, _cache_len: usize) {}

    /// Called when the cache drops candidates that can no longer beat the
    /// current best known cost.
    #[inline(always)]
    fn cache_evicted_by_ceiling(&mut self, _evicted: usize) {}

    /// Called when [`crate::builder::FixedBuilder`] rejects a built candidate
    /// before it reaches the cache.
    #[inline(always)]
    fn candidate_rejected(&mut self, _reason: &'static str) {}

    /// Called when the driver emits a strictly cheaper, verified-equivalent
    /// rewrite of (a subexpression of) the target.
    #[inline(always)]
    fn improvement_found(&mut self, _cost_before: &str, _cost_after: &str) {}

    /// Called when the solver refutes a candidate and the example set grows.
    #[inline(always)]
    fn new_counterexample(&mut self, _example_count: usize) {}

    /// Called once, when the search loop terminates.
    #[inline(always)]
    fn stopped(&mut self, _reason: &'static str) {}
}

// ============================================================================
// NoopTracer — zero-cost library default
// ============================================================================

/// A tracer that does nothing.
///
/// Because [`crate::driver::improve`] carries the tracer as a type parameter,
/// the compiler monomorphizes the search loop against `NoopTracer` and
/// inlines every hook to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl SynthTracer for NoopTracer {}

// ============================================================================
// StderrTracer — human-readable progress log
// ============================================================================

/// Tracer that prints a human-readable progress log to stderr, in the same
/// shape as the original implementation's `print`/`eprint` diagnostics.
#[derive(Debug, Default)]
pub struct StderrTracer {
    verbose: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Also logs per-candidate rejections, which can be very chatty.
    #[must_use]
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl SynthTracer for StderrTracer {
    fn minor_iteration(&mut self, size: usize, cache_len: usize) {
        eprintln!("minor iteration {size}, |cache|={cache_len}");
    }

    fn cache_evicted_by_ceiling(&mut self, evicted: usize) {
        if evicted > 0 {
            eprintln!("evicted {evicted} elements");
        }
    }

    fn candidate_rejected(&mut self, reason: &'static str) {
        if self.verbose {
            eprintln!("  rejected: {reason}");
        }
    }

    fn improvement_found(&mut self, cost_before: &str, cost_after: &str) {
        eprintln!("Found potential improvement [{cost_after}] for [{cost_before}]");
    }

    fn new_counterexample(&mut self, example_count: usize) {
        eprintln!("new example, now have {example_count}");
    }

    fn stopped(&mut self, reason: &'static str) {
        eprintln!("stopped: {reason}");
    }
}

// ============================================================================
// RecordingTracer — full event recording for tests and post-mortem
// ============================================================================

/// Tracer that records all events into a `Vec<SynthTraceEvent>`.
///
/// Used by driver scenario tests to assert on search shape (e.g. "found
/// exactly one improvement, after exactly one counterexample") without
/// scraping stderr.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<SynthTraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[must_use]
    pub fn events(&self) -> &[SynthTraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<SynthTraceEvent> {
        self.events
    }
}

impl SynthTracer for RecordingTracer {
    fn minor_iteration(&mut self, size: usize, cache_len: usize) {
        self.events.push(SynthTraceEvent::MinorIteration { size, cache_len });
    }

    fn cache_evicted_by_ceiling(&mut self, evicted: usize) {
        self.events.push(SynthTraceEvent::CacheEvictedByCeiling { evicted });
    }

    fn candidate_rejected(&mut self, reason: &'static str) {
        self.events.push(SynthTraceEvent::CandidateRejected { reason });
    }

    fn improvement_found(&mut self, cost_before: &str, cost_after: &str) {
        self.events.push(SynthTraceEvent::ImprovementFound {
            cost_before: cost_before.to_string(),
            cost_after: cost_after.to_string(),
        });
    }

    fn new_counterexample(&mut self, example_count: usize) {
        self.events.push(SynthTraceEvent::NewCounterexample { example_count });
    }

    fn stopped(&mut self, reason: &'static str) {
        self.events.push(SynthTraceEvent::Stopped { reason });
    }
}

/// Renders an expression the way [`StderrTracer`] wants it in a progress
/// line: compact, not pretty-printed.
pub fn fmt_exp(e: &Exp) -> String {
    e.to_string()
}
