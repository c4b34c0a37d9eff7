//! The symbolic cost model: how the search compares two candidate
//! expressions for "which is cheaper" without ever running either one.
//!
//! Costs are themselves [`Exp`] trees (see [`sum_exprs`], the `ESum`-style
//! constant-folding sum builder), not bare numbers - in principle a cost can
//! depend on a free variable (e.g. the cardinality of an unbounded state
//! collection), in which case it folds down only as far as
//! [`try_fold_to_i64`] can take it. Whatever doesn't fold is handed to the
//! solver as `path_conditions(ctx) => lhs <= rhs` / `>= rhs` (mirroring the
//! original `_compare`'s `self.solver.valid(EImplies(...))` queries); only
//! once the solver can't decide either direction does the comparison settle
//! for [`Order::Ambiguous`] rather than guessing.
//!
//! [`CostModel::compare`] has one invariant everything else here leans on:
//! replacing a sub-expression with something of lesser-or-equal cost never
//! increases the cost of the whole. That monotonicity is what lets
//! [`crate::builder::Cache`] evict candidates once their cost exceeds the
//! current best known solution - nothing built from them could possibly win.

use std::fmt;

use crate::expr::{alpha_equivalent, BinOp, Exp, ExpKind, UnOp, LINEAR_TIME_UOPS};
use crate::pool::Pool;
use crate::solver::SmtBackend;
use crate::types::Type;

/// Default fallback cost for anything this model cannot bound precisely:
/// an unknown-cardinality collection, a call to an external function, an
/// un-evaluable symbolic term. Deliberately large enough that it dominates
/// any realistic concrete cost, without being `i64::MAX` (which would make
/// arithmetic on it overflow-prone).
pub const EXTREME_COST: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Lt,
    Eq,
    Gt,
    /// Neither side is provably cheaper - e.g. both costs contain a free
    /// variable with no known relationship between them.
    Ambiguous,
}

impl Order {
    #[must_use]
    pub fn reverse(self) -> Order {
        match self {
            Order::Lt => Order::Gt,
            Order::Gt => Order::Lt,
            Order::Eq | Order::Ambiguous => self,
        }
    }
}

/// Lexicographic fold: the first non-`Eq` order in `orders` wins (including
/// an `Ambiguous`, which is itself a decisive "don't know" for the whole
/// comparison); if every entry is `Eq`, the composite is `Eq`.
pub fn composite_order(orders: impl IntoIterator<Item = Order>) -> Order {
    for o in orders {
        if o != Order::Eq {
            return o;
        }
    }
    Order::Eq
}

/// Compares `a` and `b` field-by-field using `fields`, in priority order,
/// combining with [`composite_order`]. Used to build lexicographic
/// comparisons like "cost, then break ties by constant-factor cost, then
/// break remaining ties syntactically."
pub fn order_objects<T>(a: &T, b: &T, fields: &[fn(&T, &T) -> Order]) -> Order {
    composite_order(fields.iter().map(|f| f(a, b)))
}

/// Builds a single `Int`-typed expression equivalent to the sum of `terms`,
/// folding numeric literals together into one trailing constant and
/// dropping terms that fold to zero. Mirrors the original implementation's
/// `ESum` helper: the point is a readable, already-partially-evaluated cost
/// expression, not a generic arithmetic simplifier.
pub fn sum_exprs(terms: Vec<Exp>) -> Exp {
    let mut constant: i64 = 0;
    let mut symbolic: Vec<Exp> = Vec::new();
    for t in terms {
        match try_fold_to_i64(&t) {
            Some(n) => constant += n,
            None => symbolic.push(t),
        }
    }
    if symbolic.is_empty() {
        return Exp::num(constant);
    }
    let mut iter = symbolic.into_iter();
    let mut acc = iter.next().expect("non-empty by construction");
    for t in iter {
        acc = Exp::bin_op(acc, BinOp::Add, t);
    }
    if constant != 0 {
        acc = Exp::bin_op(acc, BinOp::Add, Exp::num(constant));
    }
    acc
}

/// Constant-folds a closed, `Int`-typed cost expression built only from
/// [`ExpKind::Num`] and `+`/`-`/`*`. Returns `None` as soon as it hits
/// anything else (a free variable, a call, ...) - the caller treats that as
/// "can't compare precisely" rather than trying to guess a bound.
pub fn try_fold_to_i64(e: &Exp) -> Option<i64> {
    match &e.kind {
        ExpKind::Num(n) => Some(*n),
        ExpKind::BinOp(l, BinOp::Add, r) => Some(try_fold_to_i64(l)? + try_fold_to_i64(r)?),
        ExpKind::BinOp(l, BinOp::Sub, r) => Some(try_fold_to_i64(l)? - try_fold_to_i64(r)?),
        ExpKind::BinOp(l, BinOp::Mul, r) => Some(try_fold_to_i64(l)? * try_fold_to_i64(r)?),
        _ => None,
    }
}

/// Returns the larger of two cost expressions when both fold to a concrete
/// number; otherwise picks whichever looks less certain to be small, which
/// in practice means falling back to `extreme`.
fn max_of(a: Exp, b: Exp, extreme: i64) -> Exp {
    match (try_fold_to_i64(&a), try_fold_to_i64(&b)) {
        (Some(x), Some(y)) => Exp::num(x.max(y)),
        _ => Exp::num(extreme),
    }
}

/// Worst-case cardinality of a collection-typed expression: an upper bound
/// on how many elements it can ever hold, expressed as a cost expression.
///
/// Collections built by narrowing an existing one (`Filter`, `Distinct`,
/// `MapKeys`) can never exceed their source's cardinality. Anything whose
/// cardinality isn't statically bounded - a bare state variable with no
/// known schema bound, a `FlatMap`/`Flatten` over an unbounded nesting -
/// falls back to [`EXTREME_COST`], consistent with the rest of the crate
/// accepting incompleteness rather than fabricating a bound.
pub fn wc_card(e: &Exp) -> Exp {
    wc_card_with(e, EXTREME_COST)
}

fn wc_card_with(e: &Exp, extreme: i64) -> Exp {
    match &e.kind {
        ExpKind::EmptyList => Exp::num(0),
        ExpKind::Singleton(_) => Exp::num(1),
        ExpKind::Filter(src, _) => wc_card_with(src, extreme),
        ExpKind::Map(src, _) => wc_card_with(src, extreme),
        ExpKind::FlatMap(src, _) => wc_card_with(src, extreme),
        ExpKind::MakeMap2(src, _) => wc_card_with(src, extreme),
        ExpKind::UnaryOp(UnOp::Distinct, src) => wc_card_with(src, extreme),
        ExpKind::MapKeys(m) => wc_card_with(m, extreme),
        ExpKind::BinOp(l, BinOp::Add, r) => sum_exprs(vec![wc_card_with(l, extreme), wc_card_with(r, extreme)]),
        ExpKind::BinOp(l, BinOp::Sub, _) => wc_card_with(l, extreme),
        ExpKind::Cond(_, t, f) => max_of(wc_card_with(t, extreme), wc_card_with(f, extreme), extreme),
        ExpKind::StateVar(inner) => wc_card_with(inner, extreme),
        _ => Exp::num(extreme),
    }
}

/// The storage footprint of materializing `e`'s value, for a `State`-pool
/// expression. Scalars cost a fixed small constant; composites sum their
/// parts; collections multiply worst-case cardinality by per-element cost.
pub fn storage_size(e: &Exp) -> Exp {
    storage_size_of_type_with(&e.ty, Some(e), EXTREME_COST)
}

fn storage_size_of_type(ty: &Type, card_source: Option<&Exp>) -> Exp {
    storage_size_of_type_with(ty, card_source, EXTREME_COST)
}

fn storage_size_of_type_with(ty: &Type, card_source: Option<&Exp>, extreme: i64) -> Exp {
    match ty {
        Type::Bool => Exp::num(1),
        Type::Int | Type::Native(_) | Type::Handle(_) => Exp::num(4),
        Type::Enum(_) => Exp::num(2),
        Type::Str => Exp::num(20),
        Type::Tuple(ts) => sum_exprs(ts.iter().map(|t| storage_size_of_type_with(t, None, extreme)).collect()),
        Type::Record(fields) => sum_exprs(fields.iter().map(|(_, t)| storage_size_of_type_with(t, None, extreme)).collect()),
        Type::Bag(elem) | Type::Set(elem) | Type::List(elem) => {
            let card = card_source.map_or_else(|| Exp::num(extreme), |e| wc_card_with(e, extreme));
            sum_exprs(vec![Exp::bin_op(card, BinOp::Mul, storage_size_of_type_with(elem, None, extreme))])
        }
        Type::Map(key, value) => {
            let card = card_source.map_or_else(|| Exp::num(extreme), |e| wc_card_with(e, extreme));
            let per_entry = sum_exprs(vec![storage_size_of_type_with(key, None, extreme), storage_size_of_type_with(value, None, extreme)]);
            sum_exprs(vec![Exp::bin_op(card, BinOp::Mul, per_entry)])
        }
        Type::Function(..) => Exp::num(extreme),
    }
}

/// Storage footprint of the *largest possible* value of `ty`, independent of
/// any concrete expression - used when no source cardinality is available
/// (e.g. bounding the cost of a handle's payload).
pub fn max_storage_size(ty: &Type) -> Exp {
    storage_size_of_type(ty, None)
}

/// Cost of hashing a value of type `ty` once. Scalars are cheap; any
/// collection or map is charged [`EXTREME_COST`] since its contribution
/// depends on a cardinality this function has no expression to read from.
pub fn hash_cost(ty: &Type) -> Exp {
    hash_cost_with(ty, EXTREME_COST)
}

fn hash_cost_with(ty: &Type, extreme: i64) -> Exp {
    match ty {
        Type::Bool | Type::Int | Type::Enum(_) | Type::Native(_) | Type::Handle(_) => Exp::num(1),
        Type::Str => Exp::num(2),
        Type::Tuple(ts) => sum_exprs(ts.iter().map(|t| hash_cost_with(t, extreme)).collect()),
        Type::Record(fields) => sum_exprs(fields.iter().map(|(_, t)| hash_cost_with(t, extreme)).collect()),
        Type::Bag(_) | Type::Set(_) | Type::List(_) | Type::Map(..) | Type::Function(..) => Exp::num(extreme),
    }
}

/// Cost of comparing two values of type `ty` for equality/ordering once.
pub fn comparison_cost(ty: &Type) -> Exp {
    comparison_cost_with(ty, EXTREME_COST)
}

fn comparison_cost_with(ty: &Type, extreme: i64) -> Exp {
    match ty {
        Type::Bool | Type::Int | Type::Enum(_) | Type::Native(_) | Type::Handle(_) => Exp::num(1),
        Type::Str => Exp::num(2),
        Type::Tuple(ts) => sum_exprs(ts.iter().map(|t| comparison_cost_with(t, extreme)).collect()),
        Type::Record(fields) => sum_exprs(fields.iter().map(|(_, t)| comparison_cost_with(t, extreme)).collect()),
        Type::Bag(_) | Type::Set(_) | Type::List(_) | Type::Map(..) | Type::Function(..) => Exp::num(extreme),
    }
}

/// Asymptotic runtime cost of evaluating `e` once, as a cost expression.
/// This is the coarse-grained half of [`rt`]: it distinguishes "one pass
/// over the collection" from "constant work" but not, say, the cost of one
/// string comparison from one integer comparison - that distinction only
/// matters for tie-breaking and lives in `rt`'s constant-factor terms.
pub fn asymptotic_runtime(e: &Exp) -> Exp {
    rt(e, false)
}

/// Runtime cost of evaluating `e` once. With `account_for_constant_factors`
/// set, per-element work inside a combinator is weighted by the element
/// type's [`hash_cost`]/[`comparison_cost`] instead of being treated as
/// O(1); this is only used to break ties when two candidates have the same
/// [`asymptotic_runtime`].
pub fn rt(e: &Exp, account_for_constant_factors: bool) -> Exp {
    rt_with(e, account_for_constant_factors, EXTREME_COST)
}

fn rt_with(e: &Exp, account_for_constant_factors: bool, extreme: i64) -> Exp {
    let children_cost = || sum_exprs(e.children().iter().map(|c| rt_with(c, account_for_constant_factors, extreme)).collect());

    match &e.kind {
        ExpKind::Num(_) | ExpKind::Bool(_) | ExpKind::Str(_) | ExpKind::EnumEntry(_) | ExpKind::EmptyList | ExpKind::Var(_) => Exp::num(0),
        ExpKind::StateVar(_) => Exp::num(1),
        ExpKind::Lambda(_) => Exp::num(0),
        ExpKind::Call(_, args) => {
            sum_exprs(vec![Exp::num(extreme), sum_exprs(args.iter().map(|a| rt_with(a, account_for_constant_factors, extreme)).collect())])
        }
        ExpKind::UnaryOp(op, inner) => {
            let base = rt_with(inner, account_for_constant_factors, extreme);
            if LINEAR_TIME_UOPS.contains(op) {
                let per_elem = if account_for_constant_factors { comparison_cost_with(inner.ty.element().unwrap_or(&Type::Int), extreme) } else { Exp::num(1) };
                sum_exprs(vec![base, Exp::bin_op(wc_card_with(inner, extreme), BinOp::Mul, per_elem)])
            } else {
                // The/Empty/Exists/Not: O(1) worst case (or, for The/Empty/Exists, effectively
                // bounded by inspecting at most the first element).
                sum_exprs(vec![base, Exp::num(1)])
            }
        }
        ExpKind::BinOp(l, BinOp::In, r) => {
            let per_elem = if account_for_constant_factors { comparison_cost_with(&l.ty, extreme) } else { Exp::num(1) };
            sum_exprs(vec![
                rt_with(l, account_for_constant_factors, extreme),
                rt_with(r, account_for_constant_factors, extreme),
                Exp::bin_op(wc_card_with(r, extreme), BinOp::Mul, per_elem),
            ])
        }
        ExpKind::BinOp(l, BinOp::Sub, r) if l.ty.is_collection() => {
            // Multiset difference has to hash every element of one side
            // against the other, not just subtract in constant time.
            sum_exprs(vec![
                rt_with(l, account_for_constant_factors, extreme),
                rt_with(r, account_for_constant_factors, extreme),
                Exp::num(extreme),
                Exp::bin_op(wc_card_with(l, extreme), BinOp::Mul, wc_card_with(r, extreme)),
            ])
        }
        ExpKind::BinOp(l, _, r) => sum_exprs(vec![rt_with(l, account_for_constant_factors, extreme), rt_with(r, account_for_constant_factors, extreme), Exp::num(1)]),
        ExpKind::Filter(src, pred) => combinator_cost_with(src, &pred.body, account_for_constant_factors, extreme),
        ExpKind::Map(src, f) => combinator_cost_with(src, &f.body, account_for_constant_factors, extreme),
        ExpKind::FlatMap(src, f) => sum_exprs(vec![combinator_cost_with(src, &f.body, account_for_constant_factors, extreme), Exp::num(extreme)]),
        ExpKind::Flatten(src) => sum_exprs(vec![rt_with(src, account_for_constant_factors, extreme), Exp::num(extreme)]),
        ExpKind::ArgMin(src, key) | ExpKind::ArgMax(src, key) => combinator_cost_with(src, &key.body, account_for_constant_factors, extreme),
        ExpKind::MakeMap2(src, value) => combinator_cost_with(src, &value.body, account_for_constant_factors, extreme),
        ExpKind::MapGet(m, k) => {
            let per_lookup = if account_for_constant_factors { comparison_cost_with(&k.ty, extreme) } else { Exp::num(1) };
            sum_exprs(vec![
                rt_with(m, account_for_constant_factors, extreme),
                rt_with(k, account_for_constant_factors, extreme),
                Exp::bin_op(wc_card_with(m, extreme), BinOp::Mul, per_lookup),
            ])
        }
        ExpKind::HasKey(m, k) => {
            let per_lookup = if account_for_constant_factors { comparison_cost_with(&k.ty, extreme) } else { Exp::num(1) };
            sum_exprs(vec![
                rt_with(m, account_for_constant_factors, extreme),
                rt_with(k, account_for_constant_factors, extreme),
                Exp::bin_op(wc_card_with(m, extreme), BinOp::Mul, per_lookup),
            ])
        }
        ExpKind::MapKeys(m) => rt_with(m, account_for_constant_factors, extreme),
        ExpKind::Tuple(_) | ExpKind::TupleGet(_, _) | ExpKind::GetField(_, _) => sum_exprs(vec![children_cost(), Exp::num(1)]),
        ExpKind::Cond(c, t, f) => sum_exprs(vec![
            rt_with(c, account_for_constant_factors, extreme),
            max_of(rt_with(t, account_for_constant_factors, extreme), rt_with(f, account_for_constant_factors, extreme), extreme),
        ]),
    }
}

fn combinator_cost_with(src: &Exp, body: &Exp, account_for_constant_factors: bool, extreme: i64) -> Exp {
    sum_exprs(vec![rt_with(src, account_for_constant_factors, extreme), Exp::bin_op(wc_card_with(src, extreme), BinOp::Mul, rt_with(body, account_for_constant_factors, extreme))])
}

/// The cost comparator itself. Charges storage for `State`-pool expressions
/// and runtime for `Runtime`-pool expressions, breaking ties first by the
/// constant-factor-aware [`rt`] and finally leaving genuine ties as `Eq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostModel {
    pub extreme_cost: Option<i64>,
}

impl CostModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_extreme_cost(extreme_cost: i64) -> Self {
        Self { extreme_cost: Some(extreme_cost) }
    }

    /// The fallback cost this model substitutes for anything it cannot bound
    /// precisely, honoring [`Self::with_extreme_cost`] when set.
    fn effective_extreme_cost(&self) -> i64 {
        self.extreme_cost.unwrap_or(EXTREME_COST)
    }

    /// Storage footprint of materializing `e`'s value, per this model's
    /// [`EXTREME_COST`] override.
    #[must_use]
    pub fn storage_size(&self, e: &Exp) -> Exp {
        storage_size_of_type_with(&e.ty, Some(e), self.effective_extreme_cost())
    }

    /// Asymptotic runtime cost of evaluating `e` once, per this model's
    /// [`EXTREME_COST`] override.
    #[must_use]
    pub fn asymptotic_runtime(&self, e: &Exp) -> Exp {
        rt_with(e, false, self.effective_extreme_cost())
    }

    fn coarse_cost(&self, e: &Exp, pool: Pool) -> Exp {
        match pool {
            Pool::State => self.storage_size(e),
            Pool::Runtime => self.asymptotic_runtime(e),
        }
    }

    fn fine_cost(&self, e: &Exp, pool: Pool) -> Exp {
        match pool {
            Pool::State => self.storage_size(e),
            Pool::Runtime => rt_with(e, true, self.effective_extreme_cost()),
        }
    }

    fn compare_folded(&self, a: &Exp, b: &Exp) -> Order {
        match (try_fold_to_i64(a), try_fold_to_i64(b)) {
            (Some(x), Some(y)) => {
                if x < y {
                    Order::Lt
                } else if x > y {
                    Order::Gt
                } else {
                    Order::Eq
                }
            }
            _ => Order::Ambiguous,
        }
    }

    /// Compares two cost expressions that may not fold to a concrete number
    /// (e.g. the cardinality of a free-variable-typed collection). Mirrors
    /// the original `_compare`: try the cheap constant fold first, then an
    /// alpha-equivalence check, and only then ask the solver whether
    /// `ctx => a <= b` and `ctx => a >= b` hold, deciding `Lt`/`Gt`/`Eq` from
    /// whichever combination of those two queries comes back valid. A
    /// solver that can't validate either direction leaves the comparison
    /// genuinely `Ambiguous` rather than guessing.
    fn compare_costs(&self, a: &Exp, b: &Exp, ctx: &[Exp], solver: &impl SmtBackend) -> Order {
        let folded = self.compare_folded(a, b);
        if folded != Order::Ambiguous {
            return folded;
        }
        if alpha_equivalent(a, b) {
            return Order::Eq;
        }
        let antecedent = conjunction(ctx);
        let le_valid = solver.valid(&implies(&antecedent, &Exp::bin_op(a.clone(), BinOp::Le, b.clone()))).unwrap_or(false);
        let ge_valid = solver.valid(&implies(&antecedent, &Exp::bin_op(a.clone(), BinOp::Ge, b.clone()))).unwrap_or(false);
        match (le_valid, ge_valid) {
            (true, true) => Order::Eq,
            (true, false) => Order::Lt,
            (false, true) => Order::Gt,
            (false, false) => Order::Ambiguous,
        }
    }

    /// Compares two same-typed expressions living in `pool` under the path
    /// conditions `ctx`. Ties on the coarse cost are broken by the finer,
    /// constant-factor-aware cost; ties that survive that are genuine equal
    /// cost. Either cost may fail to fold to a concrete number, in which case
    /// `solver` is consulted (see [`Self::compare_costs`]).
    pub fn compare(&self, a: &Exp, b: &Exp, ctx: &[Exp], pool: Pool, solver: &impl SmtBackend) -> Order {
        let coarse = self.compare_costs(&self.coarse_cost(a, pool), &self.coarse_cost(b, pool), ctx, solver);
        if coarse != Order::Eq {
            return coarse;
        }
        self.compare_costs(&self.fine_cost(a, pool), &self.fine_cost(b, pool), ctx, solver)
    }

    /// Human-readable breakdown of how `compare` reached its verdict, for
    /// manual debugging - not on any hot path.
    pub fn debug_compare(&self, a: &Exp, b: &Exp, ctx: &[Exp], pool: Pool, solver: &impl SmtBackend) -> String {
        format!(
            "pool={pool} | a: coarse={} fine={} | b: coarse={} fine={} | verdict={:?}",
            self.coarse_cost(a, pool),
            self.fine_cost(a, pool),
            self.coarse_cost(b, pool),
            self.fine_cost(b, pool),
            self.compare(a, b, ctx, pool, solver)
        )
    }
}

/// Builds `antecedent => consequent` as `Not(antecedent) || consequent`.
pub(crate) fn implies(antecedent: &Exp, consequent: &Exp) -> Exp {
    Exp::bin_op(Exp::unary_op(UnOp::Not, antecedent.clone()), BinOp::Or, consequent.clone())
}

/// Conjoins the active path conditions `ctx` into one `Bool`-typed
/// expression, defaulting to `true` when there are none.
pub(crate) fn conjunction(ctx: &[Exp]) -> Exp {
    ctx.iter().cloned().fold(Exp::bool_(true), |acc, c| Exp::bin_op(acc, BinOp::And, c))
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Lt => write!(f, "<"),
            Order::Eq => write!(f, "="),
            Order::Gt => write!(f, ">"),
            Order::Ambiguous => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::expr::Var;
    use crate::solver::SolverError;
    use crate::value::Env;

    /// Never actually reaches the solver - used where folding alone must
    /// decide the comparison, so that a call here would mean the fold path
    /// regressed.
    #[derive(Default)]
    struct NoopSolver;
    impl SmtBackend for NoopSolver {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            panic!("solver should not be consulted when both costs fold to a concrete number");
        }
    }

    /// Answers `valid` true the first time it's asked and false every time
    /// after, modeling a solver that's sure of one direction of a comparison
    /// (`a <= b`) and unsure of the other (`a >= b`) - `compare_costs` queries
    /// them in that order.
    #[derive(Default)]
    struct SureOfLeOnly {
        call_count: Cell<usize>,
    }
    impl SmtBackend for SureOfLeOnly {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            let n = self.call_count.get();
            self.call_count.set(n + 1);
            if n == 0 { Ok(None) } else { Ok(Some(Env::new())) }
        }
    }

    /// Never rules anything out - models a solver that can't validate either
    /// direction of a comparison.
    #[derive(Default)]
    struct NeverValid;
    impl SmtBackend for NeverValid {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            Ok(Some(Env::new()))
        }
    }

    #[test]
    fn sum_exprs_folds_numeric_literals() {
        let e = sum_exprs(vec![Exp::num(1), Exp::num(2), Exp::num(3)]);
        assert_eq!(try_fold_to_i64(&e), Some(6));
    }

    #[test]
    fn filter_never_costs_more_than_its_source_cardinality() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let x = Var::new("x", Type::Int);
        let pred = Exp::lambda(x.clone(), Exp::bin_op(Exp::var(x), BinOp::Gt, Exp::num(0)));
        let filtered = Exp::filter(Exp::var(xs.clone()), pred);
        // Both are unbounded state-free bags, so their cardinalities fold
        // to the same EXTREME_COST placeholder.
        assert_eq!(try_fold_to_i64(&wc_card(&filtered)), try_fold_to_i64(&wc_card(&Exp::var(xs))));
    }

    #[test]
    fn storage_size_of_int_is_smaller_than_storage_size_of_singleton_bag_of_str() {
        let model = CostModel::new();
        let int_e = Exp::num(1);
        let str_singleton = Exp::singleton(Exp::str_("x"));
        assert_eq!(model.compare(&int_e, &str_singleton, &[], Pool::State, &NoopSolver), Order::Lt);
    }

    #[test]
    fn membership_test_folds_to_the_extreme_cost_placeholder() {
        // `xs` is a bare free variable with no statically-known cardinality
        // bound, so its worst-case cardinality - and therefore this
        // membership test's cost - folds to the EXTREME_COST placeholder
        // rather than staying symbolic. A collection whose bound *is*
        // statically known (e.g. built from a Filter over it) would cost the
        // same or less, never more - see `filter_never_costs_more_than_its_source_cardinality`.
        let xs = Var::new("xs", Type::bag(Type::Int));
        let i = Var::new("i", Type::Int);
        let membership = Exp::bin_op(Exp::var(i), BinOp::In, Exp::var(xs));
        assert_eq!(try_fold_to_i64(&rt(&membership, false)), Some(EXTREME_COST));
    }

    #[test]
    fn with_extreme_cost_overrides_the_fallback_used_by_storage_size() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let default_model = CostModel::new();
        let overridden_model = CostModel::with_extreme_cost(7);
        let target = Exp::var(xs);
        assert_eq!(try_fold_to_i64(&default_model.storage_size(&target)), Some(4 * EXTREME_COST));
        assert_eq!(try_fold_to_i64(&overridden_model.storage_size(&target)), Some(4 * 7));
    }

    #[test]
    fn with_extreme_cost_overrides_the_fallback_used_by_asymptotic_runtime() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let i = Var::new("i", Type::Int);
        let membership = Exp::bin_op(Exp::var(i), BinOp::In, Exp::var(xs));
        let default_model = CostModel::new();
        let overridden_model = CostModel::with_extreme_cost(3);
        assert_eq!(try_fold_to_i64(&default_model.asymptotic_runtime(&membership)), Some(EXTREME_COST));
        assert_eq!(try_fold_to_i64(&overridden_model.asymptotic_runtime(&membership)), Some(3));
    }

    #[test]
    fn compare_is_reflexively_equal() {
        let model = CostModel::new();
        let e = Exp::num(1);
        assert_eq!(model.compare(&e, &e, &[], Pool::State, &NoopSolver), Order::Eq);
    }

    #[test]
    fn composite_order_picks_first_decisive_field() {
        assert_eq!(composite_order([Order::Eq, Order::Lt, Order::Gt]), Order::Lt);
        assert_eq!(composite_order([Order::Eq, Order::Eq]), Order::Eq);
    }

    #[test]
    fn compare_costs_consults_the_solver_when_folding_cant_decide() {
        // Two free variables with no numeric relationship: try_fold_to_i64
        // can't resolve either side, and they aren't alpha-equivalent, so the
        // only way to reach a non-Ambiguous verdict is through the solver.
        let model = CostModel::new();
        let n = Var::new("n", Type::Int);
        let m = Var::new("m", Type::Int);
        let order = model.compare_costs(&Exp::var(n), &Exp::var(m), &[], &SureOfLeOnly::default());
        assert_eq!(order, Order::Lt, "a solver sure of `a <= b` but unsure of `a >= b` must settle the comparison as Lt, not stay Ambiguous");
    }

    #[test]
    fn compare_costs_stays_ambiguous_when_the_solver_cant_decide_either_direction() {
        let model = CostModel::new();
        let n = Var::new("n", Type::Int);
        let m = Var::new("m", Type::Int);
        let order = model.compare_costs(&Exp::var(n), &Exp::var(m), &[], &NeverValid);
        assert_eq!(order, Order::Ambiguous);
    }

    #[test]
    fn compare_costs_short_circuits_alpha_equivalent_terms_before_the_solver() {
        let model = CostModel::new();
        let n = Var::new("n", Type::Int);
        let order = model.compare_costs(&Exp::var(n.clone()), &Exp::var(n), &[], &NoopSolver);
        assert_eq!(order, Order::Eq);
    }
}
