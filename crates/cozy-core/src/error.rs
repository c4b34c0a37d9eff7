//! Top-level error type for the crate, separating failures by pipeline stage.
//!
//! Keeping eval/solver/search failures distinct lets callers handle recovery
//! accurately without string matching, the same shape as the teacher's own
//! `ReplError`.

use std::fmt;

use crate::eval::EvalError;
use crate::solver::SolverError;

/// Error type for a synthesis run.
#[derive(Debug, Clone)]
pub enum SynthesisError {
    /// The target expression (or a substituted candidate) failed to
    /// evaluate against a concrete example.
    Eval(EvalError),
    /// The SMT backend failed or hit an unsupported construct.
    Solver(SolverError),
    /// A candidate, once substituted into the target, had a free variable
    /// that escaped its binder - see the driver's ill-formedness check.
    IllFormedCandidate { candidate: String },
    /// A candidate passed the pre-verification cost check but, on the
    /// re-check done right before accepting it, compared as more expensive
    /// than the target it replaces - the cost model disagrees with itself
    /// on the same pair of expressions.
    CostRegression { target: String, candidate: String },
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eval(error) => write!(f, "evaluation error: {error}"),
            Self::Solver(error) => write!(f, "solver error: {error}"),
            Self::IllFormedCandidate { candidate } => {
                write!(f, "candidate would capture a free variable after substitution: {candidate}")
            }
            Self::CostRegression { target, candidate } => {
                write!(f, "cost model contradiction: {candidate} was accepted as cheaper than {target} but compares as more expensive on re-check")
            }
        }
    }
}

impl std::error::Error for SynthesisError {}

impl From<EvalError> for SynthesisError {
    fn from(error: EvalError) -> Self {
        Self::Eval(error)
    }
}

impl From<SolverError> for SynthesisError {
    fn from(error: SolverError) -> Self {
        Self::Solver(error)
    }
}
