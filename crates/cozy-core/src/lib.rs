#![doc = include_str!("../../../README.md")]

mod builder;
mod cost;
mod driver;
mod error;
mod eval;
mod expr;
mod learner;
mod limits;
mod pool;
mod solver;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    builder::{already_cached, fixup_binders, make_constant_of_type, Cache, CoreBuilder, ExpBuilder, FixedBuilder},
    cost::{asymptotic_runtime, storage_size, CostModel, Order, EXTREME_COST},
    driver::{Driver, Improvement},
    error::SynthesisError,
    eval::{eval, eval_bulk, EvalError},
    expr::{
        alpha_equivalent, free_funcs, free_vars, fresh_var, replace, subst, BinOp, Exp, ExpKind, Lambda, UnOp, Var,
    },
    learner::{fingerprint, Fingerprint, Learner},
    limits::SynthesisLimits,
    pool::Pool,
    solver::{ModelCachingSolver, SmtBackend, SolverError, Z3Backend},
    types::Type,
    value::{Closure, Env, HandleId, Value},
};
