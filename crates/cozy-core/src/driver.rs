//! The CEGIS loop proper: propose a cheaper candidate for some sub-expression
//! of a target, verify the full substitution, and either accept it or turn
//! the counterexample into a new example for the next round.
//!
//! `improve` fingerprints every candidate the learner offers and asks the
//! learner's watched index (see [`Learner::watch`]) whether that fingerprint
//! matches a sub-expression of `target`. A match means the candidate is
//! observationally interchangeable, under every example seen so far, with
//! that sub-expression - the only thing left to check is whether splicing it
//! in (via [`crate::expr::replace`]) actually lowers cost and holds up to
//! verification.

use std::collections::HashMap;

use crate::builder::ExpBuilder;
use crate::cost::{CostModel, Order};
use crate::error::SynthesisError;
use crate::eval::eval_bulk;
use crate::expr::{alpha_equivalent, free_vars, replace, Exp, UnOp};
use crate::learner::{fingerprint, Learner};
use crate::limits::SynthesisLimits;
use crate::pool::Pool;
use crate::solver::{SmtBackend, SolverError};
use crate::tracer::SynthTracer;
use crate::types::Type;
use crate::value::Env;

/// `target` was replaced by `replacement`, lowering cost from `cost_before`
/// to `cost_after` (both in `pool`'s costing).
#[derive(Debug, Clone)]
pub struct Improvement {
    pub replacement: Exp,
    pub cost_before: Exp,
    pub cost_after: Exp,
}

enum Verdict {
    Equivalent,
    Counterexample(Env),
}

/// Searches for, and verifies, a cheaper replacement for a target
/// expression. Holds only the SMT backend, cost model, and run limits - the
/// candidate cache and example set live in the [`Learner`] the caller passes
/// in, so the same learner can be reused across many `improve` calls (e.g.
/// one per sub-expression of a larger tree) without rebuilding the cache.
pub struct Driver<S> {
    solver: S,
    cost_model: CostModel,
    limits: SynthesisLimits,
    /// Assumptions `A` every verification and cost comparison is implicitly
    /// conjoined with - path conditions/invariants known to hold wherever
    /// this driver is invoked. Defaults to `true` (no assumptions).
    assumptions: Exp,
}

impl<S: SmtBackend> Driver<S> {
    /// `limits.extreme_cost_override`, when set, wins over whatever
    /// `cost_model` already carries - it is the run-level knob, and a caller
    /// reusing one `CostModel` across several runs expects the limits it
    /// passes for *this* run to take effect.
    pub fn new(solver: S, mut cost_model: CostModel, limits: SynthesisLimits) -> Self {
        if let Some(extreme) = limits.extreme_cost_override {
            cost_model.extreme_cost = Some(extreme);
        }
        Self { solver, cost_model, limits, assumptions: Exp::bool_(true) }
    }

    #[must_use]
    pub fn with_assumptions(mut self, assumptions: Exp) -> Self {
        self.assumptions = assumptions;
        self
    }

    #[must_use]
    pub fn limits(&self) -> &SynthesisLimits {
        &self.limits
    }

    /// Builds the full verification formula `A ∧ ¬(target == candidate)`: a
    /// model satisfying it is a counterexample to equivalence *under the
    /// declared assumptions*, not a counterexample in general.
    fn equivalence_constraint(&self, target: &Exp, candidate: &Exp) -> Exp {
        let equal = Exp::bin_op(target.clone(), crate::expr::BinOp::Eq, candidate.clone());
        Exp::bin_op(self.assumptions.clone(), crate::expr::BinOp::And, Exp::unary_op(UnOp::Not, equal))
    }

    /// Checks `target == candidate`. For `Bool`/`Int`-typed targets this
    /// asks the SMT backend for a genuine proof (or a counterexample to
    /// refine the example set with); for anything the backend can't encode
    /// (collections, maps, handles, ...) it falls back to agreement on
    /// every example already on hand, consistent with the rest of the
    /// crate's accepted incompleteness - this is observational, not proven,
    /// equivalence in that case.
    fn verify(&self, learner: &Learner<impl ExpBuilder>, free_var_types: &HashMap<String, Type>, target: &Exp, candidate: &Exp) -> Result<Verdict, SynthesisError> {
        let target_vals = eval_bulk(target, learner.examples(), free_var_types)?;
        let candidate_vals = eval_bulk(candidate, learner.examples(), free_var_types)?;
        if target_vals != candidate_vals {
            // The learner's fingerprint cache should have already kept these
            // apart, but `target` itself was never inserted into the cache,
            // so this is the first place the two are compared directly.
            return Ok(Verdict::Counterexample(learner.examples().first().cloned().unwrap_or_default()));
        }

        if target.ty != Type::Bool && target.ty != Type::Int {
            return Ok(Verdict::Equivalent);
        }

        let phi = self.equivalence_constraint(target, candidate);
        match self.solver.satisfy(&phi) {
            Ok(None) => Ok(Verdict::Equivalent),
            Ok(Some(env)) => Ok(Verdict::Counterexample(env)),
            Err(SolverError::Unsupported(_)) => Ok(Verdict::Equivalent),
            Err(other) => Err(other.into()),
        }
    }

    /// Runs the search until it finds and verifies a strictly cheaper
    /// replacement for `target`, or gives up (learner exhaustion or
    /// `max_minor_iterations`). `free_var_types` must name every variable
    /// the caller will ever bind when evaluating `target` - a candidate
    /// referencing anything outside that set is rejected as ill-formed
    /// rather than handed back to the caller.
    pub fn improve<B: ExpBuilder, T: SynthTracer>(
        &self,
        learner: &mut Learner<B>,
        target: &Exp,
        pool: Pool,
        free_var_types: &HashMap<String, Type>,
        tracer: &mut T,
    ) -> Result<Option<Improvement>, SynthesisError> {
        learner.set_max_examples(self.limits.max_examples);
        let ctx = std::slice::from_ref(&self.assumptions);
        let evicted = learner.watch(target, &self.cost_model, pool, ctx, &self.solver);
        if evicted > 0 {
            tracer.cache_evicted_by_ceiling(evicted);
        }

        let mut iterations = 0usize;
        loop {
            if let Some(max) = self.limits.max_minor_iterations {
                if iterations >= max {
                    tracer.stopped("max_minor_iterations reached");
                    return Ok(None);
                }
            }

            let Some((candidate, _cand_pool)) = learner.next(&self.limits) else {
                tracer.stopped("search space exhausted");
                return Ok(None);
            };
            iterations += 1;
            tracer.minor_iteration(candidate.size(), learner.cache().len());

            if !free_vars(&candidate).iter().all(|v| free_var_types.contains_key(&v.id)) {
                tracer.candidate_rejected("references a variable outside the caller's declared scope");
                continue;
            }

            let Ok(fp) = fingerprint(&candidate, learner.examples(), free_var_types) else {
                tracer.candidate_rejected("failed to evaluate under the current examples");
                continue;
            };
            let Some(watched) = learner.watched_match(&fp) else {
                // Not observationally equivalent to anything in the target -
                // it couldn't possibly be proposed as a replacement for it.
                continue;
            };
            if alpha_equivalent(&candidate, watched) {
                continue;
            }
            let full = replace(target, watched, &candidate);

            let order = self.cost_model.compare(&full, target, ctx, pool, &self.solver);
            if order != Order::Lt {
                tracer.candidate_rejected("not strictly cheaper than the target");
                continue;
            }

            match self.verify(learner, free_var_types, target, &full)? {
                Verdict::Equivalent => {
                    if !free_vars(&full).iter().all(|v| free_var_types.contains_key(&v.id)) {
                        return Err(SynthesisError::IllFormedCandidate { candidate: full.to_string() });
                    }
                    // The search-time comparison above already established
                    // `full` as strictly cheaper than `target`; this second
                    // look right before committing is the last line of
                    // defense against a cost-model bug slipping a regression
                    // through - a contradiction with the earlier check means
                    // the cost model itself disagrees with itself on the
                    // same pair of expressions.
                    match self.cost_model.compare(&full, target, ctx, pool, &self.solver) {
                        Order::Gt => {
                            return Err(SynthesisError::CostRegression {
                                target: target.to_string(),
                                candidate: full.to_string(),
                            });
                        }
                        Order::Eq => {
                            tracer.candidate_rejected("verified equivalent but not strictly cheaper");
                            continue;
                        }
                        _ => {}
                    }
                    let cost_before = self.cost_model_cost(target, pool);
                    let cost_after = self.cost_model_cost(&full, pool);
                    tracer.improvement_found(&cost_before.to_string(), &cost_after.to_string());
                    return Ok(Some(Improvement {
                        replacement: full,
                        cost_before,
                        cost_after,
                    }));
                }
                Verdict::Counterexample(env) => {
                    learner.add_example(env);
                    tracer.new_counterexample(learner.examples().len());
                }
            }
        }
    }

    fn cost_model_cost(&self, e: &Exp, pool: Pool) -> Exp {
        match pool {
            Pool::State => self.cost_model.storage_size(e),
            Pool::Runtime => self.cost_model.asymptotic_runtime(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CoreBuilder, FixedBuilder};
    use crate::expr::{BinOp, Var};
    use crate::solver::ModelCachingSolver;
    use crate::tracer::NoopTracer;
    use crate::value::Value;

    struct AlwaysValid;
    impl SmtBackend for AlwaysValid {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            Ok(None)
        }
    }

    #[test]
    fn improve_finds_a_cheaper_equivalent_constant() {
        // Target: 1 + 1 (size 3). Seeding `0` and `2` directly means the
        // very first size-1 candidate of type Int that isn't alpha-equivalent
        // to the target and is cheaper should be accepted immediately.
        let target = Exp::bin_op(Exp::num(1), BinOp::Add, Exp::num(1));
        let mut learner: Learner<FixedBuilder<CoreBuilder, AlwaysValid>> =
            Learner::new(FixedBuilder::new(CoreBuilder::new(), vec![], Exp::bool_(true), AlwaysValid), HashMap::new());
        learner.seed(vec![(Exp::num(2), Pool::Runtime)]);

        let driver = Driver::new(ModelCachingSolver::new(AlwaysValid), CostModel::new(), SynthesisLimits::default());
        let mut tracer = NoopTracer;
        let result = driver.improve(&mut learner, &target, Pool::Runtime, &HashMap::new(), &mut tracer).unwrap();
        let improvement = result.expect("expected an improvement");
        assert_eq!(improvement.replacement, Exp::num(2));
    }

    #[test]
    fn new_lets_the_run_limits_override_the_cost_models_extreme_cost() {
        let limits = SynthesisLimits::default();
        let driver = Driver::new(ModelCachingSolver::new(AlwaysValid), CostModel::new(), limits.clone().with_max_candidate_size(1));
        assert_eq!(driver.cost_model.extreme_cost, None);

        let mut overridden_limits = limits;
        overridden_limits.extreme_cost_override = Some(5);
        let driver = Driver::new(ModelCachingSolver::new(AlwaysValid), CostModel::new(), overridden_limits);
        assert_eq!(driver.cost_model.extreme_cost, Some(5));
    }

    #[test]
    fn improve_rejects_a_candidate_that_escapes_the_declared_scope() {
        let x = Var::new("x", Type::Int);
        let target = Exp::bin_op(Exp::num(1), BinOp::Add, Exp::num(1));
        let mut learner: Learner<FixedBuilder<CoreBuilder, AlwaysValid>> =
            Learner::new(FixedBuilder::new(CoreBuilder::new(), vec![x.clone()], Exp::bool_(true), AlwaysValid), HashMap::new());
        learner.seed(vec![(Exp::var(x), Pool::Runtime)]);

        let driver = Driver::new(ModelCachingSolver::new(AlwaysValid), CostModel::new(), SynthesisLimits::default().with_max_minor_iterations(1));
        let mut tracer = NoopTracer;
        // `free_var_types` is empty, so the only candidate on offer (`x`)
        // must be rejected as escaping scope rather than accepted.
        let result = driver.improve(&mut learner, &target, Pool::Runtime, &HashMap::new(), &mut tracer).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn improve_replaces_a_sub_expression_nested_inside_a_larger_target() {
        // Target: Length(Filter(xs, \x. x == k)) + 1 - the count is only part
        // of what's being optimized, so a correct improvement has to survive
        // splicing back into the surrounding `+ 1`, not just stand on its own.
        let xs = Var::new("xs", Type::bag(Type::Int));
        let k = Var::new("k", Type::Int);
        let state = Var::new("state", Type::map(Type::Int, Type::Int));

        let mut free_var_types = HashMap::new();
        free_var_types.insert(xs.id.clone(), xs.ty.clone());
        free_var_types.insert(k.id.clone(), k.ty.clone());
        free_var_types.insert(state.id.clone(), state.ty.clone());

        let elem = Var::new("x", Type::Int);
        let predicate = Exp::lambda(elem.clone(), Exp::bin_op(Exp::var(elem), BinOp::Eq, Exp::var(k.clone())));
        let count = Exp::unary_op(UnOp::Length, Exp::filter(Exp::var(xs.clone()), predicate));
        let target = Exp::bin_op(count.clone(), BinOp::Add, Exp::num(1));

        // `xs` is deliberately left out of the enumeration cache: a `Distinct`
        // + `Length` combination over it would reach the same count (2) as
        // `MapGet(state, k)` and make which candidate the search meets first
        // into a coin flip, the same trick `driver_scenarios.rs` relies on.
        let mut learner: Learner<CoreBuilder> = Learner::new(CoreBuilder::new(), free_var_types.clone());
        learner.seed(vec![(Exp::var(k.clone()), Pool::Runtime), (Exp::var(state.clone()), Pool::Runtime)]);

        let mut env = Env::new();
        env.insert("xs".to_string(), Value::Bag(vec![Value::Int(3), Value::Int(3), Value::Int(7)]));
        env.insert("k".to_string(), Value::Int(3));
        env.insert(
            "state".to_string(),
            Value::Map(vec![(Value::Int(3), Value::Int(2)), (Value::Int(7), Value::Int(1)), (Value::Int(42), Value::Int(0))]),
        );
        learner.add_example(env);

        let driver = Driver::new(
            ModelCachingSolver::new(AlwaysValid),
            CostModel::new(),
            SynthesisLimits::default().with_max_candidate_size(3),
        );
        let mut tracer = NoopTracer;
        let result = driver.improve(&mut learner, &target, Pool::Runtime, &free_var_types, &mut tracer).unwrap();
        let improvement = result.expect("expected a cheaper replacement to be found");

        let expected = Exp::bin_op(Exp::map_get(Exp::var(state), Exp::var(k)), BinOp::Add, Exp::num(1));
        assert_eq!(improvement.replacement, expected, "only the count sub-expression should be replaced, leaving `+ 1` in place");
    }

    #[test]
    fn verify_treats_disagreement_on_examples_as_a_counterexample() {
        let free_var_types = HashMap::new();
        let mut learner: Learner<CoreBuilder> = Learner::new(CoreBuilder::new(), free_var_types.clone());
        learner.add_example(Env::new());
        let driver = Driver::new(ModelCachingSolver::new(AlwaysValid), CostModel::new(), SynthesisLimits::default());
        let target = Exp::num(1);
        let candidate = Exp::num(2);
        match driver.verify(&learner, &free_var_types, &target, &candidate).unwrap() {
            Verdict::Counterexample(_) => {}
            Verdict::Equivalent => panic!("1 and 2 are not equivalent"),
        }
    }
}
