//! Drives enumeration size by size, deduplicating candidates that are
//! observationally equivalent (same fingerprint) to something already kept.
//!
//! A fingerprint is an expression's type plus its value under every current
//! example - two expressions with the same fingerprint agree on every input
//! tried so far, so only the first (necessarily the smallest, since sizes
//! are enumerated in increasing order) is worth keeping around. Growing the
//! example set can only ever split an equivalence class further, never
//! merge two; see [`Learner::add_example`].

use std::collections::{HashMap, HashSet};

use crate::builder::{Cache, ExpBuilder};
use crate::cost::{CostModel, Order};
use crate::eval::{eval_bulk, EvalError};
use crate::expr::Exp;
use crate::limits::SynthesisLimits;
use crate::pool::Pool;
use crate::solver::SmtBackend;
use crate::types::Type;
use crate::value::{Env, Value};

/// An expression's observable behavior: its type plus its value under every
/// example currently known. Two expressions sharing a fingerprint are
/// indistinguishable by anything tried so far.
pub type Fingerprint = (Type, Vec<Value>);

pub fn fingerprint(e: &Exp, examples: &[Env], free_var_types: &HashMap<String, Type>) -> Result<Fingerprint, EvalError> {
    Ok((e.ty.clone(), eval_bulk(e, examples, free_var_types)?))
}

/// Enumerates candidates of increasing size, keeping the cache populated
/// with exactly one representative per fingerprint.
pub struct Learner<B> {
    builder: B,
    cache: Cache,
    examples: Vec<Env>,
    free_var_types: HashMap<String, Type>,
    seen: HashSet<Fingerprint>,
    /// Every expression ever handed back by `next()`, by rendered form.
    /// `seen` alone is not enough to guarantee a size class eventually
    /// exhausts: `add_example` clears `seen` so duplicate-fingerprint
    /// candidates get a chance to be told apart under the bigger example
    /// set, but that would also let an already-rejected candidate earlier in
    /// `build`'s output order keep winning the "first fresh fingerprint"
    /// race forever, starving everything after it in the same size class.
    /// Once something has been offered, a past or future counterexample
    /// can only confirm it's still wrong (examples never shrink), so there
    /// is no reason to offer it twice.
    offered: HashSet<String>,
    next_size: usize,
    /// Fingerprint -> the most-in-need-of-replacement sub-expression of the
    /// current target sharing that fingerprint. Rebuilt by [`Self::watch`]
    /// whenever the driver starts optimizing a (new) target; consulted by
    /// the driver to recognize when a freshly-cached candidate matches the
    /// observable behavior of some part of that target at lower cost.
    watched: HashMap<Fingerprint, Exp>,
    exhausted: bool,
    /// Cap on how many examples `add_example` keeps; `None` is unbounded.
    /// Set by the driver from `SynthesisLimits::max_examples`.
    max_examples: Option<usize>,
    /// The largest `next_size` at which `next()` last actually found a new
    /// fingerprint. Drives the progress-exhaustion stop condition: once a
    /// size class turns up nothing new, enumeration only keeps growing if
    /// progress has been recent enough to make that plausible.
    last_progress: usize,
}

impl<B: ExpBuilder> Learner<B> {
    pub fn new(builder: B, free_var_types: HashMap<String, Type>) -> Self {
        Self {
            builder,
            cache: Cache::new(),
            examples: Vec::new(),
            free_var_types,
            seen: HashSet::new(),
            offered: HashSet::new(),
            next_size: 1,
            watched: HashMap::new(),
            exhausted: false,
            max_examples: None,
            last_progress: 0,
        }
    }

    /// Bounds how many examples `add_example` keeps, discarding the oldest
    /// once the cap is exceeded. `None` keeps every example for the life of
    /// the run.
    pub fn set_max_examples(&mut self, max_examples: Option<usize>) {
        self.max_examples = max_examples;
    }

    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    #[must_use]
    pub fn examples(&self) -> &[Env] {
        &self.examples
    }

    /// Clears the cache and restarts enumeration from size 1. Does not
    /// touch the example set.
    pub fn reset(&mut self) {
        self.cache = Cache::new();
        self.seen.clear();
        self.offered.clear();
        self.next_size = 1;
        self.exhausted = false;
        self.last_progress = 0;
    }

    /// Seeds the cache with size-1 leaves: literals, pool variables, and
    /// any `StateVar`s the target itself contains.
    pub fn seed(&mut self, roots: Vec<(Exp, Pool)>) {
        for (e, pool) in roots {
            self.cache.add(e, pool);
        }
    }

    /// Rebuilds the watched index from every non-lambda sub-expression of
    /// `target`, fingerprinted against the current example set. On a
    /// fingerprint collision between two sub-expressions of `target` itself,
    /// the costlier representative under `pool` wins - that's the one most
    /// in need of replacement, per the cache's "keep what needs fixing most"
    /// rule.
    ///
    /// Also evicts, from `cache`, every `pool`-pool entry whose cost now
    /// exceeds `target`'s own cost: nothing costlier than the thing being
    /// optimized could ever be offered as an improvement to it. Returns the
    /// number of cache entries evicted, for the caller to report through its
    /// tracer.
    pub fn watch(&mut self, target: &Exp, cost_model: &CostModel, pool: Pool, ctx: &[Exp], solver: &impl SmtBackend) -> usize {
        self.watched.clear();
        for sub in target.all_subexps() {
            if sub.is_lambda() {
                continue;
            }
            let Ok(fp) = self.fingerprint_of(sub) else { continue };
            let replace_existing = match self.watched.get(&fp) {
                None => true,
                Some(existing) => cost_model.compare(sub, existing, ctx, pool, solver) == Order::Gt,
            };
            if replace_existing {
                self.watched.insert(fp, sub.clone());
            }
        }
        self.cache.evict(cost_model, target, pool, ctx, solver)
    }

    /// The watched sub-expression sharing `fp`'s fingerprint, if any - the
    /// thing a candidate with that fingerprint would be proposed in place of.
    #[must_use]
    pub fn watched_match(&self, fp: &Fingerprint) -> Option<&Exp> {
        self.watched.get(fp)
    }

    /// Records a new counterexample. Fingerprints computed against the
    /// larger example set are strictly more discriminating, so the `seen`
    /// set is cleared: every cache entry survives (nothing already kept was
    /// ever *wrong*, only possibly coarser than it could be), but
    /// enumeration gets a chance to tell apart candidates the old,
    /// smaller example set had conflated.
    pub fn add_example(&mut self, env: Env) {
        self.examples.push(env);
        if let Some(max) = self.max_examples {
            while self.examples.len() > max {
                self.examples.remove(0);
            }
        }
        self.seen.clear();
    }

    fn fingerprint_of(&self, e: &Exp) -> Result<Fingerprint, EvalError> {
        fingerprint(e, &self.examples, &self.free_var_types)
    }

    /// Returns the next candidate not observationally equivalent to
    /// anything already cached, or `None` once either `limits.max_candidate_size`
    /// is exhausted or progress has stalled (see the `last_progress` check
    /// below) with nothing left to try.
    pub fn next(&mut self, limits: &SynthesisLimits) -> Option<(Exp, Pool)> {
        if self.exhausted {
            return None;
        }
        loop {
            if self.next_size > limits.max_candidate_size {
                self.exhausted = true;
                return None;
            }
            // Nothing can be *built* at size 1 - there is nothing smaller to
            // build it from. The size-1 candidates are exactly the pool
            // roots and literals `seed` already put in the cache.
            let candidates: Vec<(Exp, Pool)> = if self.next_size == 1 {
                self.cache.types().cloned().collect::<Vec<_>>().into_iter().flat_map(|ty| self.cache.find(&ty, 1).to_vec()).collect()
            } else {
                self.builder.build(&self.cache, self.next_size)
            };
            let mut found = None;
            for (e, pool) in candidates {
                if self.offered.contains(&e.to_string()) {
                    continue;
                }
                let Ok(fp) = self.fingerprint_of(&e) else { continue };
                if self.seen.insert(fp) {
                    self.offered.insert(e.to_string());
                    if self.next_size != 1 {
                        self.cache.add(e.clone(), pool);
                    }
                    found = Some((e, pool));
                    break;
                }
            }
            match found {
                Some(result) => {
                    self.last_progress = self.next_size;
                    return Some(result);
                }
                None => {
                    // This size class is exhausted with nothing new. Growing
                    // further is only worth it if progress has been recent
                    // enough - a size class that hasn't found anything fresh
                    // in a while is a sign the search has genuinely run dry,
                    // not just hit an unlucky size.
                    if self.last_progress < (self.next_size + 1) / 2 {
                        self.exhausted = true;
                        return None;
                    }
                    self.next_size += 1;
                }
            }
        }
    }

    /// Undoes the most recent `next()`'s cache insertion - used when the
    /// driver determines the candidate it was just handed cannot actually
    /// be used (e.g. substituting it produces an ill-formed expression).
    /// The fingerprint stays in `seen` so the same dead end isn't retried.
    pub fn forget_most_recent(&mut self) {
        self.cache.forget_last();
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CoreBuilder;
    use crate::expr::{ExpKind, UnOp, Var};
    use crate::solver::SolverError;

    #[derive(Default)]
    struct AlwaysValid;
    impl SmtBackend for AlwaysValid {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            Ok(None)
        }
    }

    #[test]
    fn duplicate_fingerprints_are_filtered() {
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.seed(vec![(Exp::num(1), Pool::Runtime), (Exp::num(1), Pool::Runtime)]);
        let limits = SynthesisLimits::default().with_max_candidate_size(4);
        // Even though two identical literals were seeded, the size-2 `+`
        // combinations that would be fingerprint-duplicates of each other
        // should only ever surface once per distinct fingerprint.
        let mut seen_fingerprints = HashSet::new();
        while let Some((e, _)) = learner.next(&limits) {
            let fp = fingerprint(&e, learner.examples(), &HashMap::new()).unwrap();
            assert!(seen_fingerprints.insert(fp), "fingerprint {e} yielded twice");
        }
    }

    #[test]
    fn rejected_candidates_do_not_starve_later_candidates_of_the_same_size() {
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.seed(vec![(Exp::num(1), Pool::Runtime), (Exp::num(2), Pool::Runtime)]);
        let limits = SynthesisLimits::default().with_max_candidate_size(1);
        // A driver that rejects whatever it's handed (as if every candidate
        // disagreed with some target) and immediately records a new
        // example, the way `Driver::improve` does on a counterexample. Both
        // seeded leaves must still surface exactly once each rather than
        // the first one winning the race forever.
        let mut offered = Vec::new();
        for _ in 0..2 {
            let (e, _) = learner.next(&limits).expect("a candidate");
            offered.push(e);
            learner.add_example(Env::new());
        }
        assert_ne!(offered[0], offered[1], "a rejected candidate must not be re-offered after the example set grows");
    }

    #[test]
    fn add_example_clears_seen_but_keeps_cache() {
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        let x = Var::new("x", Type::Int);
        learner.seed(vec![(Exp::var(x.clone()), Pool::Runtime)]);
        let before = learner.cache().len();
        let mut env = Env::new();
        env.insert("x".to_string(), Value::Int(1));
        learner.add_example(env);
        assert_eq!(learner.cache().len(), before);
    }

    #[test]
    fn max_examples_caps_the_example_set_by_dropping_the_oldest() {
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.set_max_examples(Some(2));
        for i in 0..5 {
            let mut env = Env::new();
            env.insert("x".to_string(), Value::Int(i));
            learner.add_example(env);
        }
        assert_eq!(learner.examples().len(), 2);
        // The two survivors are the most recent ones pushed.
        assert_eq!(learner.examples()[0].get("x"), Some(&Value::Int(3)));
        assert_eq!(learner.examples()[1].get("x"), Some(&Value::Int(4)));
    }

    #[test]
    fn watch_keeps_the_costlier_representative_on_a_fingerprint_collision() {
        use crate::expr::BinOp;

        // `(1 + 1) + 0` and `1 + 1` both fold to the constant 2 under an
        // empty example set, so they share a fingerprint; the larger one is
        // what's worth replacing.
        let small = Exp::bin_op(Exp::num(1), BinOp::Add, Exp::num(1));
        let big = Exp::bin_op(small.clone(), BinOp::Add, Exp::num(0));

        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.watch(&big, &CostModel::new(), Pool::Runtime, &[], &AlwaysValid);

        let fp = fingerprint(&small, &[], &HashMap::new()).unwrap();
        let matched = learner.watched_match(&fp).expect("a watched entry for this fingerprint");
        assert_eq!(matched, &big, "the costlier sub-expression should win the fingerprint collision");
    }

    #[test]
    fn watch_evicts_cache_entries_costlier_than_the_new_target() {
        use crate::expr::BinOp;

        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        let expensive = Exp::bin_op(Exp::bin_op(Exp::num(1), BinOp::Add, Exp::num(2)), BinOp::Add, Exp::num(3));
        learner.seed(vec![(expensive, Pool::Runtime)]);

        let cheap_target = Exp::num(0);
        let evicted = learner.watch(&cheap_target, &CostModel::new(), Pool::Runtime, &[], &AlwaysValid);
        assert_eq!(evicted, 1);
        assert_eq!(learner.cache().len(), 0);
    }

    #[test]
    fn watched_match_is_none_for_an_unrelated_fingerprint() {
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.watch(&Exp::num(1), &CostModel::new(), Pool::Runtime, &[], &AlwaysValid);
        let fp = fingerprint(&Exp::bool_(true), &[], &HashMap::new()).unwrap();
        assert!(learner.watched_match(&fp).is_none());
    }

    #[test]
    fn next_stops_on_progress_exhaustion_well_under_the_size_cap() {
        // Nothing seeded: size 1 has no candidates at all, so `next()` never
        // makes progress. The hard `max_candidate_size` cap is set far above
        // 1, so if the search still stopped exactly on this first call, it
        // must be the last_progress-driven stop condition doing it, not the
        // cap.
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        let limits = SynthesisLimits::default().with_max_candidate_size(100);
        assert!(learner.next(&limits).is_none());
        assert!(learner.is_exhausted());
    }

    #[test]
    fn next_keeps_growing_past_a_size_with_no_new_fingerprints_while_progress_is_recent() {
        // One Bool literal seeded: size 1 finds it immediately (last_progress
        // = 1), size 2 builds `Not(true)` - a genuinely new fingerprint - so
        // progress stays recent enough to keep the search going rather than
        // stopping the first time a size class comes up empty.
        let mut learner = Learner::new(CoreBuilder::new(), HashMap::new());
        learner.seed(vec![(Exp::bool_(true), Pool::Runtime)]);
        let limits = SynthesisLimits::default().with_max_candidate_size(3);
        let mut found = Vec::new();
        while let Some((e, _)) = learner.next(&limits) {
            found.push(e);
        }
        assert!(found.iter().any(|e| matches!(&e.kind, ExpKind::UnaryOp(UnOp::Not, _))), "expected Not(true) to be offered before the search gave up");
    }
}
