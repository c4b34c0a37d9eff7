//! Explicit, plain-struct configuration for a synthesis run.
//!
//! There is no config-file or environment-variable layer: every knob the
//! search loop reads is a field here, passed in by the caller, the same way
//! the teacher threads resource limits through as a concrete struct rather
//! than a global.

/// Bounds and thresholds for one [`crate::driver::improve`] run.
///
/// Cloning is cheap; callers typically build one `SynthesisLimits` per
/// synthesis request and hand it to the learner and driver by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisLimits {
    /// Candidates larger than this (by [`crate::expr::Exp::size`]) are never
    /// built, bounding how far enumeration can run even without a cost
    /// ceiling from an already-found improvement.
    pub max_candidate_size: usize,
    /// Number of counterexamples to keep before the oldest are discarded.
    /// `None` means unbounded (grow the example set for the life of the run).
    pub max_examples: Option<usize>,
    /// Overrides [`crate::cost::EXTREME_COST`] for this run; `None` uses the
    /// crate default.
    pub extreme_cost_override: Option<i64>,
    /// Upper bound on minor iterations (candidate-size rounds) before the
    /// search gives up even if it has not exhausted the search space.
    pub max_minor_iterations: Option<usize>,
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        Self {
            max_candidate_size: 10,
            max_examples: None,
            extreme_cost_override: None,
            max_minor_iterations: None,
        }
    }
}

impl SynthesisLimits {
    #[must_use]
    pub fn with_max_candidate_size(mut self, size: usize) -> Self {
        self.max_candidate_size = size;
        self
    }

    #[must_use]
    pub fn with_max_examples(mut self, max: usize) -> Self {
        self.max_examples = Some(max);
        self
    }

    #[must_use]
    pub fn with_max_minor_iterations(mut self, max: usize) -> Self {
        self.max_minor_iterations = Some(max);
        self
    }
}
