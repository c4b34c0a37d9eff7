//! Tiny demonstration binary: builds a toy target expression, wires up an
//! in-process solver-backed [`CostModel`], and drives [`Driver::improve`]
//! to stdout. Not part of the library's contract - just a thin consumer,
//! the same way the teacher always ships one next to its VM library.

use std::collections::HashMap;

use cozy_core::{
    BinOp, Cache, CoreBuilder, CostModel, Driver, Exp, FixedBuilder, Learner, ModelCachingSolver, Pool,
    SynthesisLimits, Type, UnOp, Var, Z3Backend,
};
use cozy_core::tracer::StderrTracer;

fn main() {
    // xs: Bag<Int>, k: Int, state: a materialized MakeMap2(xs, \x. true) kept
    // around as a State-pool expression.
    let xs = Var::new("xs", Type::bag(Type::Int));
    let k = Var::new("k", Type::Int);
    let state = Var::new("state", Type::map(Type::Int, Type::Int));

    let mut free_var_types = HashMap::new();
    free_var_types.insert(xs.id.clone(), xs.ty.clone());
    free_var_types.insert(k.id.clone(), k.ty.clone());
    free_var_types.insert(state.id.clone(), state.ty.clone());

    // Length(Filter(xs, \x. x == k)): recomputed in full on every access.
    let elem = Var::new("x", Type::Int);
    let predicate = Exp::lambda(elem.clone(), Exp::bin_op(Exp::var(elem), BinOp::Eq, Exp::var(k.clone())));
    let target = Exp::unary_op(UnOp::Length, Exp::filter(Exp::var(xs.clone()), predicate));

    let pool_vars = vec![xs.clone(), k.clone(), state.clone()];
    let assumptions = Exp::bool_(true);
    let builder = FixedBuilder::new(CoreBuilder::new(), pool_vars, assumptions.clone(), ModelCachingSolver::new(Z3Backend::new()));
    let mut learner: Learner<FixedBuilder<CoreBuilder, ModelCachingSolver<Z3Backend>>> = Learner::new(builder, free_var_types.clone());

    // Seed the cache with the leaves a rewrite would actually want to reach
    // for: the free variables themselves, state included.
    let mut cache = Cache::new();
    for v in [&xs, &k, &state] {
        cache.add(Exp::var(v.clone()), Pool::Runtime);
    }
    learner.seed(cache.iter().cloned().collect());

    let driver =
        Driver::new(ModelCachingSolver::new(Z3Backend::new()), CostModel::new(), SynthesisLimits::default()).with_assumptions(assumptions);

    let mut tracer = StderrTracer::verbose();
    println!("target:  {target}");
    match driver.improve(&mut learner, &target, Pool::Runtime, &free_var_types, &mut tracer) {
        Ok(Some(improvement)) => {
            println!("found a cheaper equivalent:");
            println!("  replacement: {}", improvement.replacement);
            println!("  cost before: {}", improvement.cost_before);
            println!("  cost after:  {}", improvement.cost_after);
        }
        Ok(None) => println!("no cheaper equivalent found within the configured limits"),
        Err(err) => eprintln!("error: {err}"),
    }
}
