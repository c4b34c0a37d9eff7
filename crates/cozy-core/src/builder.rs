//! Enumerative candidate construction: the [`Cache`] that holds every
//! expression built so far, indexed by type and size, and the builders that
//! combine cached expressions into the next size class.
//!
//! Lambda bodies are not enumerated through a separate nested search. A
//! fixed "binder pool" of named variables (the `pool_vars` passed to
//! [`FixedBuilder::new`]) is registered into the cache once, up front, as
//! ordinary free-variable roots; a candidate `Filter`/`Map`/... lambda's
//! argument is literally one of those pool variables, so any cached
//! expression already mentioning it is a ready-made lambda body.
//! [`FixedBuilder`] is what makes this sound: it rejects any candidate whose
//! lambda body reaches outside the pool.

use std::collections::HashMap;

use crate::cost::{implies, try_fold_to_i64, CostModel, Order};
use crate::expr::{alpha_equivalent, free_vars, BinOp, Exp, ExpKind, UnOp, Var};
use crate::pool::Pool;
use crate::solver::SmtBackend;
use crate::types::Type;

/// All expressions discovered so far, bucketed by type and then by
/// [`Exp::size`] (1-indexed; `sizes[0]` holds size-1 expressions).
#[derive(Debug, Default)]
pub struct Cache {
    by_type: HashMap<Type, Vec<Vec<(Exp, Pool)>>>,
    last_inserted: Option<(Type, usize)>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, e: Exp, pool: Pool) {
        let size = e.size();
        let ty = e.ty.clone();
        let bucket = self.by_type.entry(ty.clone()).or_default();
        while bucket.len() < size {
            bucket.push(Vec::new());
        }
        bucket[size - 1].push((e, pool));
        self.last_inserted = Some((ty, size));
    }

    /// Removes the single entry added by the most recent `add` call. A
    /// no-op if nothing has been added since the cache was created or since
    /// the last `forget_last`.
    pub fn forget_last(&mut self) {
        if let Some((ty, size)) = self.last_inserted.take() {
            if let Some(bucket) = self.by_type.get_mut(&ty).and_then(|b| b.get_mut(size - 1)) {
                bucket.pop();
            }
        }
    }

    /// Expressions of exactly `ty` and exactly `size`.
    #[must_use]
    pub fn find(&self, ty: &Type, size: usize) -> &[(Exp, Pool)] {
        self.by_type.get(ty).and_then(|b| b.get(size.checked_sub(1)?)).map_or(&[], Vec::as_slice)
    }

    /// Expressions of exactly `ty` and any size in `1..=max_size`.
    pub fn find_up_to(&self, ty: &Type, max_size: usize) -> impl Iterator<Item = &(Exp, Pool)> {
        self.by_type.get(ty).into_iter().flat_map(move |buckets| buckets.iter().take(max_size).flatten())
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.by_type.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Exp, Pool)> {
        self.by_type.values().flat_map(|buckets| buckets.iter().flatten())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.values().map(|buckets| buckets.iter().map(Vec::len).sum::<usize>()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every `pool`-pool entry whose cost already exceeds `ceiling`
    /// under `pool`-appropriate costing and the path conditions `ctx`;
    /// nothing built from it could ever beat the current best solution, by
    /// the cost model's monotonicity. Returns the number of entries removed.
    pub fn evict(&mut self, cost_model: &CostModel, ceiling: &Exp, pool: Pool, ctx: &[Exp], solver: &impl SmtBackend) -> usize {
        let mut removed = 0;
        for buckets in self.by_type.values_mut() {
            for bucket in buckets.iter_mut() {
                let before = bucket.len();
                bucket.retain(|(e, p)| *p != pool || cost_model.compare(e, ceiling, ctx, pool, solver) != Order::Gt);
                removed += before - bucket.len();
            }
        }
        removed
    }
}

/// Produces the canonical smallest-possible literal of `ty`, used to seed
/// the cache with at least one value per type even before any target-driven
/// constant appears in the search.
#[must_use]
pub fn make_constant_of_type(ty: &Type) -> Option<Exp> {
    match ty {
        Type::Bool => Some(Exp::bool_(false)),
        Type::Int => Some(Exp::num(0)),
        Type::Str => Some(Exp::str_("")),
        Type::Enum(cases) => cases.first().map(|c| Exp::new(ExpKind::EnumEntry(c.clone()), ty.clone())),
        Type::Bag(elem) | Type::Set(elem) | Type::List(elem) => Some(Exp::empty_list((**elem).clone())),
        _ => None,
    }
}

/// Something that can propose new candidates of a given size from the
/// cache's smaller entries.
pub trait ExpBuilder {
    /// Every candidate of exactly `size`, built from `cache`'s entries of
    /// size `< size`. Must not consult `cache`'s own `size`-bucket (it is
    /// being built).
    fn build(&self, cache: &Cache, size: usize) -> Vec<(Exp, Pool)>;
}

const ALL_UNOPS: &[UnOp] = &[
    UnOp::Sum,
    UnOp::Length,
    UnOp::Distinct,
    UnOp::AreUnique,
    UnOp::All,
    UnOp::Any,
    UnOp::Reversed,
    UnOp::Empty,
    UnOp::Exists,
    UnOp::The,
    UnOp::Not,
];

const ALL_BINOPS: &[BinOp] = &[
    BinOp::Add,
    BinOp::Sub,
    BinOp::Mul,
    BinOp::Eq,
    BinOp::HandleEq,
    BinOp::Ne,
    BinOp::Lt,
    BinOp::Le,
    BinOp::Gt,
    BinOp::Ge,
    BinOp::And,
    BinOp::Or,
    BinOp::In,
];

fn unop_applicable(op: UnOp, operand_ty: &Type) -> bool {
    match op {
        UnOp::Sum | UnOp::Length | UnOp::Distinct | UnOp::AreUnique | UnOp::All | UnOp::Any | UnOp::Empty | UnOp::Exists | UnOp::The => operand_ty.is_collection(),
        UnOp::Reversed => matches!(operand_ty, Type::List(_)),
        UnOp::Not => matches!(operand_ty, Type::Bool),
    }
}

fn binop_applicable(op: BinOp, l: &Type, r: &Type) -> bool {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => l == &Type::Int && r == &Type::Int,
        BinOp::Eq | BinOp::HandleEq | BinOp::Ne => l == r,
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => l == r && (l == &Type::Int || l == &Type::Str),
        BinOp::And | BinOp::Or => l == &Type::Bool && r == &Type::Bool,
        BinOp::In => r.element() == Some(l),
    }
}

/// The core enumerator: unary/binary operators, collection combinators, and
/// structural constructors, built purely from type-applicability rules -
/// no knowledge of which candidates are well-formed lambdas or otherwise
/// sensible (that is [`FixedBuilder`]'s job).
#[derive(Debug, Default)]
pub struct CoreBuilder;

impl CoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn build_unary(&self, cache: &Cache, size: usize, out: &mut Vec<(Exp, Pool)>) {
        if size < 2 {
            return;
        }
        for ty in cache.types().cloned().collect::<Vec<_>>() {
            for (operand, pool) in cache.find(&ty, size - 1) {
                for &op in ALL_UNOPS {
                    if unop_applicable(op, &operand.ty) {
                        out.push((Exp::unary_op(op, operand.clone()), *pool));
                    }
                }
            }
        }
    }

    fn build_binary(&self, cache: &Cache, size: usize, out: &mut Vec<(Exp, Pool)>) {
        if size < 3 {
            return;
        }
        let types: Vec<Type> = cache.types().cloned().collect();
        for lsize in 1..size.saturating_sub(1) {
            let rsize = size - 1 - lsize;
            if rsize == 0 {
                continue;
            }
            for lty in &types {
                for (l, lpool) in cache.find(lty, lsize) {
                    for rty in &types {
                        for (r, rpool) in cache.find(rty, rsize) {
                            for &op in ALL_BINOPS {
                                if binop_applicable(op, &l.ty, &r.ty) {
                                    let pool = if *lpool == Pool::State && *rpool == Pool::State { Pool::State } else { Pool::Runtime };
                                    out.push((Exp::bin_op(l.clone(), op, r.clone()), pool));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// `MapGet`/`HasKey` (one `Map`-typed source plus a key of its key type)
    /// and `MapKeys` (peeling a `Map` down to its key set).
    fn build_map_ops(&self, cache: &Cache, size: usize, out: &mut Vec<(Exp, Pool)>) {
        if size < 2 {
            return;
        }
        for ty in cache.types().cloned().collect::<Vec<_>>() {
            let Type::Map(key_ty, _) = &ty else { continue };
            for (m, m_pool) in cache.find(&ty, size - 1) {
                out.push((Exp::map_keys(m.clone()), *m_pool));
            }
            if size < 3 {
                continue;
            }
            for msize in 1..size.saturating_sub(1) {
                let ksize = size - 1 - msize;
                if ksize == 0 {
                    continue;
                }
                for (m, m_pool) in cache.find(&ty, msize) {
                    for (k, k_pool) in cache.find(key_ty, ksize) {
                        let pool = if *m_pool == Pool::State && *k_pool == Pool::State { Pool::State } else { Pool::Runtime };
                        out.push((Exp::map_get(m.clone(), k.clone()), pool));
                        out.push((Exp::has_key(m.clone(), k.clone()), pool));
                    }
                }
            }
        }
    }

    fn build_singleton_and_flatten(&self, cache: &Cache, size: usize, out: &mut Vec<(Exp, Pool)>) {
        if size < 2 {
            return;
        }
        for ty in cache.types().cloned().collect::<Vec<_>>() {
            for (e, pool) in cache.find(&ty, size - 1) {
                out.push((Exp::singleton(e.clone()), *pool));
                if let Type::Bag(inner) | Type::Set(inner) | Type::List(inner) = &e.ty {
                    if inner.is_collection() {
                        out.push((Exp::flatten(e.clone()), *pool));
                    }
                }
            }
        }
    }

    /// `Filter`/`Map`/`ArgMin`/`ArgMax`/`MakeMap2`: the source is any cached
    /// collection; the lambda body is any cached expression that already
    /// uses the source's element type as its own type (for the arg's
    /// position) - which `FixedBuilder` then double-checks is drawn from
    /// the binder pool, not an arbitrary fresh variable.
    fn build_combinators(&self, cache: &Cache, size: usize, out: &mut Vec<(Exp, Pool)>) {
        if size < 3 {
            return;
        }
        let types: Vec<Type> = cache.types().cloned().collect();
        for src_size in 1..size.saturating_sub(1) {
            let body_size = size - 1 - src_size;
            if body_size == 0 {
                continue;
            }
            for ty in &types {
                let Some(elem_ty) = ty.element() else { continue };
                for (src, src_pool) in cache.find(ty, src_size) {
                    // Candidate binder: any pool root of the element type
                    // already sitting in the cache at size 1.
                    for (arg_candidate, _) in cache.find(elem_ty, 1) {
                        let ExpKind::Var(arg) = &arg_candidate.kind else { continue };
                        for body_ty in &types {
                            for (body, body_pool) in cache.find(body_ty, body_size) {
                                if !free_vars(body).contains(arg) {
                                    continue;
                                }
                                let pool = if *src_pool == Pool::State && *body_pool == Pool::State { Pool::State } else { Pool::Runtime };
                                let lam = Exp::lambda(arg.clone(), body.clone());
                                match body_ty {
                                    Type::Bool => out.push((Exp::filter(src.clone(), lam), pool)),
                                    _ => {
                                        out.push((Exp::map(src.clone(), Exp::lambda(arg.clone(), body.clone())), pool));
                                        if body_ty.is_numeric() || matches!(body_ty, Type::Str) {
                                            out.push((Exp::arg_min(src.clone(), Exp::lambda(arg.clone(), body.clone())), pool));
                                            out.push((Exp::arg_max(src.clone(), Exp::lambda(arg.clone(), body.clone())), pool));
                                        }
                                        out.push((Exp::make_map2(src.clone(), Exp::lambda(arg.clone(), body.clone())), pool));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

impl ExpBuilder for CoreBuilder {
    fn build(&self, cache: &Cache, size: usize) -> Vec<(Exp, Pool)> {
        let mut out = Vec::new();
        self.build_unary(cache, size, &mut out);
        self.build_binary(cache, size, &mut out);
        self.build_singleton_and_flatten(cache, size, &mut out);
        self.build_combinators(cache, size, &mut out);
        self.build_map_ops(cache, size, &mut out);
        out
    }
}

/// Wraps an inner [`ExpBuilder`] and throws away anything that would not be
/// a sensible synthesis candidate, per five criteria:
///
/// 1. A lambda's own argument must itself be a binder-pool variable, and its
///    body may only reference the binder pool plus that argument - never
///    some other free variable it has no business seeing.
/// 2. Every `Bag(Handle(_))`-typed candidate must be provably unique under
///    `assumptions` (`valid(assumptions => AreUnique(e))`) - anything the
///    solver can't prove unique is rejected, since the data model treats
///    such a bag as a malformed duplicate-handle collection.
/// 3. `Set`-typed candidates must not be producible more cheaply as a
///    `Distinct` of something already in the cache.
/// 4. `UnOp::The` is only built over a source `e` where `|e| <= 1` is valid
///    and both `|e| = 0` and `|e| = 1` are satisfiable under `assumptions` -
///    otherwise picking "the" element is either unsound or never exercises
///    both branches.
/// 5. `Filter` is rejected when its predicate folds to the literal `true`
///    (a no-op filter is never an improvement over its source).
pub struct FixedBuilder<B, S> {
    inner: B,
    pool_vars: Vec<Var>,
    assumptions: Exp,
    solver: S,
}

impl<B: ExpBuilder, S: SmtBackend> FixedBuilder<B, S> {
    pub fn new(inner: B, pool_vars: Vec<Var>, assumptions: Exp, solver: S) -> Self {
        Self { inner, pool_vars, assumptions, solver }
    }

    fn lambda_body_well_scoped(&self, body: &Exp, arg: &Var) -> bool {
        self.pool_vars.contains(arg) && free_vars(body).iter().all(|v| v == arg || self.pool_vars.contains(v))
    }

    /// Whether `assumptions => formula` is valid, treating a solver that
    /// can't decide as "no" - accepting only what's provably sound.
    fn valid_under_assumptions(&self, formula: &Exp) -> bool {
        self.solver.valid(&implies(&self.assumptions, formula)).unwrap_or(false)
    }

    /// Whether `assumptions && formula` is satisfiable, treating a solver
    /// that can't decide as "no".
    fn satisfiable_under_assumptions(&self, formula: &Exp) -> bool {
        self.solver.satisfiable(&Exp::bin_op(self.assumptions.clone(), BinOp::And, formula.clone())).unwrap_or(false)
    }

    /// Criteria 1 and 5: a lambda-carrying combinator must stay inside the
    /// binder pool, and `Filter` must not be a no-op.
    fn rejects_lambda_issues(&self, e: &Exp) -> Option<&'static str> {
        match &e.kind {
            ExpKind::Filter(_, lam) => {
                if !self.lambda_body_well_scoped(&lam.body, &lam.arg) {
                    return Some("binder-pool-only lambdas");
                }
                if let ExpKind::Bool(true) = &lam.body.kind {
                    return Some("non-trivial Filter");
                }
                None
            }
            ExpKind::Map(_, lam) | ExpKind::ArgMin(_, lam) | ExpKind::ArgMax(_, lam) | ExpKind::MakeMap2(_, lam) | ExpKind::FlatMap(_, lam) => {
                if !self.lambda_body_well_scoped(&lam.body, &lam.arg) {
                    return Some("binder-pool-only lambdas");
                }
                None
            }
            _ => None,
        }
    }

    /// Criterion 2: any `Bag(Handle(_))`-typed candidate, however it was
    /// built, must be provably unique under the declared assumptions.
    fn rejects_non_unique_bag_of_handles(&self, e: &Exp) -> Option<&'static str> {
        if matches!(&e.ty, Type::Bag(elem) if matches!(&**elem, Type::Handle(_))) {
            let unique = Exp::unary_op(UnOp::AreUnique, e.clone());
            if !self.valid_under_assumptions(&unique) {
                return Some("unique bags-of-handles");
            }
        }
        None
    }

    /// Criterion 3: a `Set` built by `Distinct`-ing something that's already
    /// a `Distinct` is redundant - the inner one already did the work.
    fn rejects_redundant_distinct(&self, e: &Exp) -> Option<&'static str> {
        if let ExpKind::UnaryOp(UnOp::Distinct, inner) = &e.kind {
            if matches!(&e.ty, Type::Set(_)) && matches!(&inner.kind, ExpKind::UnaryOp(UnOp::Distinct, _)) {
                return Some("unique sets");
            }
        }
        None
    }

    /// Criterion 4: `The(inner)` is only sound, and only worth building, when
    /// `|inner| <= 1` is provably always true and both the empty and
    /// singleton cases are actually reachable under the assumptions.
    fn rejects_ill_formed_the(&self, e: &Exp) -> Option<&'static str> {
        let ExpKind::UnaryOp(UnOp::The, inner) = &e.kind else { return None };
        let card = Exp::unary_op(UnOp::Length, (**inner).clone());
        let le_one = Exp::bin_op(card.clone(), BinOp::Le, Exp::num(1));
        let eq_zero = Exp::bin_op(card.clone(), BinOp::Eq, Exp::num(0));
        let eq_one = Exp::bin_op(card, BinOp::Eq, Exp::num(1));
        if self.valid_under_assumptions(&le_one) && self.satisfiable_under_assumptions(&eq_zero) && self.satisfiable_under_assumptions(&eq_one) {
            None
        } else {
            Some("well-formed The")
        }
    }

    fn rejects(&self, e: &Exp) -> Option<&'static str> {
        self.rejects_lambda_issues(e)
            .or_else(|| self.rejects_non_unique_bag_of_handles(e))
            .or_else(|| self.rejects_redundant_distinct(e))
            .or_else(|| self.rejects_ill_formed_the(e))
    }
}

impl<B: ExpBuilder, S: SmtBackend> ExpBuilder for FixedBuilder<B, S> {
    fn build(&self, cache: &Cache, size: usize) -> Vec<(Exp, Pool)> {
        self.inner
            .build(cache, size)
            .into_iter()
            .filter(|(e, _)| self.rejects(e).is_none())
            .collect()
    }
}

/// Renames every free occurrence of `old_binder` inside `e` to `new_binder`,
/// preserving type. Used when a cached lambda body is repurposed under a
/// differently-named (but same-typed) binder than the one it was originally
/// built against, so the pool's canonical variable name always lines up
/// with whatever the body actually references.
#[must_use]
pub fn fixup_binders(e: &Exp, old_binder: &Var, new_binder: &Var) -> Exp {
    if old_binder.id == new_binder.id {
        return e.clone();
    }
    assert_eq!(old_binder.ty, new_binder.ty, "fixup_binders: binder type mismatch");
    let mut sigma = HashMap::new();
    sigma.insert(old_binder.id.clone(), Exp::var(new_binder.clone()));
    crate::expr::subst(e, &sigma)
}

/// True iff `e` is already present (up to α-equivalence) in `cache` at its
/// own size - used by the learner to avoid re-adding structurally
/// duplicate candidates under different variable names.
#[must_use]
pub fn already_cached(cache: &Cache, e: &Exp) -> bool {
    cache.find(&e.ty, e.size()).iter().any(|(cached, _)| alpha_equivalent(cached, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverError;

    /// Treats every query as provably valid - for tests exercising paths
    /// unrelated to the solver-backed criteria.
    #[derive(Default)]
    struct AlwaysValid;
    impl SmtBackend for AlwaysValid {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<crate::value::Env>, SolverError> {
            Ok(None)
        }
    }

    #[test]
    fn cache_buckets_by_type_and_size() {
        let mut cache = Cache::new();
        cache.add(Exp::num(1), Pool::Runtime);
        cache.add(Exp::num(2), Pool::Runtime);
        cache.add(Exp::bool_(true), Pool::Runtime);
        assert_eq!(cache.find(&Type::Int, 1).len(), 2);
        assert_eq!(cache.find(&Type::Bool, 1).len(), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn evict_drops_only_entries_over_the_ceiling() {
        let mut cache = Cache::new();
        cache.add(Exp::num(1), Pool::State);
        cache.add(Exp::singleton(Exp::str_("x")), Pool::State);
        let model = CostModel::new();
        let removed = cache.evict(&model, &Exp::num(1), Pool::State, &[], &AlwaysValid);
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fixup_binders_renames_free_occurrences() {
        let old = Var::new("a", Type::Int);
        let new = Var::new("b", Type::Int);
        let e = Exp::bin_op(Exp::var(old.clone()), BinOp::Add, Exp::num(1));
        let renamed = fixup_binders(&e, &old, &new);
        assert!(free_vars(&renamed).contains(&new));
        assert!(!free_vars(&renamed).contains(&old));
    }

    #[test]
    fn fixed_builder_rejects_trivial_filter() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let mut cache = Cache::new();
        cache.add(Exp::var(xs.clone()), Pool::Runtime);
        cache.add(Exp::bool_(true), Pool::Runtime);

        let raw = CoreBuilder::new();
        let fixed = FixedBuilder::new(raw, vec![], Exp::bool_(true), AlwaysValid);
        // Filter(xs, \_ -> true) is well-scoped (no free vars in the body at
        // all) but must still be rejected as non-improving.
        let candidates = fixed.build(&cache, 3);
        assert!(candidates.iter().all(|(e, _)| !matches!(&e.kind, ExpKind::Filter(_, lam) if matches!(&lam.body.kind, ExpKind::Bool(true)))));
    }

    #[test]
    fn fixed_builder_rejects_a_lambda_argument_outside_the_binder_pool() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let x = Var::new("x", Type::Int);
        let mut cache = Cache::new();
        cache.add(Exp::var(xs.clone()), Pool::Runtime);
        cache.add(Exp::var(x.clone()), Pool::Runtime);

        let raw = CoreBuilder::new();
        // `x` is never declared as a pool variable, so even a well-scoped
        // lambda body built from it must be rejected.
        let fixed = FixedBuilder::new(raw, vec![], Exp::bool_(true), AlwaysValid);
        let candidates = fixed.build(&cache, 3);
        assert!(candidates.iter().all(|(e, _)| !matches!(&e.kind, ExpKind::Map(_, lam) if lam.arg == x)));
    }

    #[test]
    fn fixed_builder_rejects_a_bag_of_handles_the_solver_cant_prove_unique() {
        #[derive(Default)]
        struct NeverValid;
        impl SmtBackend for NeverValid {
            fn satisfy(&self, _constraint: &Exp) -> Result<Option<crate::value::Env>, SolverError> {
                Ok(Some(crate::value::Env::new()))
            }
        }

        let handle_ty = Type::Handle(Box::new(Type::Int));
        let h = Var::new("h", handle_ty.clone());
        let candidate = Exp::singleton(Exp::var(h));
        let fixed = FixedBuilder::new(CoreBuilder::new(), vec![], Exp::bool_(true), NeverValid);
        assert_eq!(fixed.rejects(&candidate), Some("unique bags-of-handles"));
    }
}
