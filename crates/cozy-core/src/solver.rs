//! SMT-backed satisfiability/validity checking, behind a small trait so the
//! driver never talks to `z3` directly.
//!
//! [`Z3Backend`] encodes the closed-world, quantifier-free fragment of the
//! expression language (booleans, integers, tuples, conditionals) into
//! `z3` terms. Anything outside that fragment - in particular the
//! collection and map theories, which this crate reasons about only through
//! concrete example evaluation, never symbolically - returns
//! [`SolverError::Unsupported`] rather than pretending to encode it. This
//! mirrors the accepted incompleteness in the cost model and the example-
//! driven counterexample search: the driver falls back to growing the
//! example set by direct evaluation when validity can't be decided
//! symbolically.
//!
//! [`ModelCachingSolver`] wraps any backend and checks previously-seen
//! counterexamples by direct evaluation before paying for a solver call -
//! most candidates in a CEGIS loop are refuted by an example already on
//! hand.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use z3::ast::{Ast, Bool as Z3Bool, Int as Z3Int};
use z3::{Config, Context, SatResult, Solver as Z3NativeSolver};

use crate::eval::eval;
use crate::expr::{BinOp, Exp, ExpKind, UnOp};
use crate::types::Type;
use crate::value::{Env, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The constraint uses a construct this backend cannot encode
    /// (collections, maps, handles, records, function values, ...).
    Unsupported(String),
    /// The solver could not decide satisfiability within its resource budget.
    Unknown,
    /// Something about the constraint or the returned model was inconsistent.
    Internal(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Unsupported(what) => write!(f, "unsupported by the SMT encoder: {what}"),
            SolverError::Unknown => write!(f, "solver returned unknown"),
            SolverError::Internal(msg) => write!(f, "internal solver error: {msg}"),
        }
    }
}

impl std::error::Error for SolverError {}

/// A backend capable of deciding satisfiability of a closed, `Bool`-typed
/// expression and, on success, producing a witnessing environment.
pub trait SmtBackend {
    /// Finds an environment under which `constraint` evaluates to `true`, or
    /// `None` if it is unsatisfiable.
    fn satisfy(&self, constraint: &Exp) -> Result<Option<Env>, SolverError>;

    /// Whether `constraint` has any satisfying environment.
    fn satisfiable(&self, constraint: &Exp) -> Result<bool, SolverError> {
        Ok(self.satisfy(constraint)?.is_some())
    }

    /// Whether `constraint` holds under every environment (its negation is
    /// unsatisfiable).
    fn valid(&self, constraint: &Exp) -> Result<bool, SolverError> {
        let negated = crate::expr::Exp::unary_op(UnOp::Not, constraint.clone());
        Ok(!self.satisfiable(&negated)?)
    }
}

/// The default backend: `z3`, behind a from-scratch `Context` per query.
///
/// A fresh context per call is simpler than threading a shared one through
/// the learner and is cheap relative to the enumeration work around it;
/// revisit if profiling ever shows otherwise.
#[derive(Debug)]
pub struct Z3Backend {
    config: Config,
}

impl Z3Backend {
    #[must_use]
    pub fn new() -> Self {
        Self { config: Config::new() }
    }
}

impl Default for Z3Backend {
    fn default() -> Self {
        Self::new()
    }
}

/// A dynamically-typed z3 term: exactly the two sorts this encoder supports.
enum DynAst<'ctx> {
    Bool(Z3Bool<'ctx>),
    Int(Z3Int<'ctx>),
}

impl<'ctx> DynAst<'ctx> {
    fn as_bool(&self, op: &str) -> Result<&Z3Bool<'ctx>, SolverError> {
        match self {
            DynAst::Bool(b) => Ok(b),
            DynAst::Int(_) => Err(SolverError::Internal(format!("{op}: expected Bool, found Int"))),
        }
    }

    fn as_int(&self, op: &str) -> Result<&Z3Int<'ctx>, SolverError> {
        match self {
            DynAst::Int(i) => Ok(i),
            DynAst::Bool(_) => Err(SolverError::Internal(format!("{op}: expected Int, found Bool"))),
        }
    }
}

impl SmtBackend for Z3Backend {
    fn satisfy(&self, constraint: &Exp) -> Result<Option<Env>, SolverError> {
        if constraint.ty != Type::Bool {
            return Err(SolverError::Internal("satisfy: constraint must be Bool-typed".to_string()));
        }
        let ctx = Context::new(&self.config);
        let solver = Z3NativeSolver::new(&ctx);
        let mut decls: HashMap<String, (Type, DynAst<'_>)> = HashMap::new();

        let encoded = encode_bool(&ctx, constraint, &mut decls)?;
        solver.assert(&encoded);

        match solver.check() {
            SatResult::Unsat => Ok(None),
            SatResult::Unknown => Err(SolverError::Unknown),
            SatResult::Sat => {
                let model = solver.get_model().ok_or_else(|| SolverError::Internal("sat but no model".to_string()))?;
                let mut env = Env::new();
                for (name, (ty, ast)) in &decls {
                    let value = match ast {
                        DynAst::Bool(b) => model
                            .eval(b, true)
                            .and_then(|v| v.as_bool())
                            .map(Value::Bool)
                            .unwrap_or_else(|| Value::default_for_type(ty)),
                        DynAst::Int(i) => model
                            .eval(i, true)
                            .and_then(|v| v.as_i64())
                            .map(Value::Int)
                            .unwrap_or_else(|| Value::default_for_type(ty)),
                    };
                    env.insert(name.clone(), value);
                }
                Ok(Some(env))
            }
        }
    }
}

fn encode_bool<'ctx>(ctx: &'ctx Context, e: &Exp, decls: &mut HashMap<String, (Type, DynAst<'ctx>)>) -> Result<Z3Bool<'ctx>, SolverError> {
    Ok(encode(ctx, e, decls)?.as_bool("encode_bool")?.clone())
}

fn encode_int<'ctx>(ctx: &'ctx Context, e: &Exp, decls: &mut HashMap<String, (Type, DynAst<'ctx>)>) -> Result<Z3Int<'ctx>, SolverError> {
    Ok(encode(ctx, e, decls)?.as_int("encode_int")?.clone())
}

fn encode<'ctx>(ctx: &'ctx Context, e: &Exp, decls: &mut HashMap<String, (Type, DynAst<'ctx>)>) -> Result<DynAst<'ctx>, SolverError> {
    match &e.kind {
        ExpKind::Num(i) => Ok(DynAst::Int(Z3Int::from_i64(ctx, *i))),
        ExpKind::Bool(b) => Ok(DynAst::Bool(Z3Bool::from_bool(ctx, *b))),
        ExpKind::Var(v) => {
            if let Some((_, ast)) = decls.get(&v.id) {
                return Ok(match ast {
                    DynAst::Bool(b) => DynAst::Bool(b.clone()),
                    DynAst::Int(i) => DynAst::Int(i.clone()),
                });
            }
            let ast = match &v.ty {
                Type::Bool => DynAst::Bool(Z3Bool::new_const(ctx, v.id.as_str())),
                Type::Int => DynAst::Int(Z3Int::new_const(ctx, v.id.as_str())),
                other => return Err(SolverError::Unsupported(format!("free variable of type {other}"))),
            };
            let stored = match &ast {
                DynAst::Bool(b) => DynAst::Bool(b.clone()),
                DynAst::Int(i) => DynAst::Int(i.clone()),
            };
            decls.insert(v.id.clone(), (v.ty.clone(), stored));
            Ok(ast)
        }
        ExpKind::UnaryOp(UnOp::Not, inner) => Ok(DynAst::Bool(encode_bool(ctx, inner, decls)?.not())),
        ExpKind::BinOp(l, op, r) => encode_binop(ctx, *op, l, r, decls),
        ExpKind::Cond(c, t, f) => {
            let cond = encode_bool(ctx, c, decls)?;
            match (&t.ty, &f.ty) {
                (Type::Bool, Type::Bool) => Ok(DynAst::Bool(cond.ite(&encode_bool(ctx, t, decls)?, &encode_bool(ctx, f, decls)?))),
                (Type::Int, Type::Int) => Ok(DynAst::Int(cond.ite(&encode_int(ctx, t, decls)?, &encode_int(ctx, f, decls)?))),
                _ => Err(SolverError::Unsupported("Cond over a non-scalar type".to_string())),
            }
        }
        other => Err(SolverError::Unsupported(format!("{other:?}"))),
    }
}

fn encode_binop<'ctx>(ctx: &'ctx Context, op: BinOp, l: &Exp, r: &Exp, decls: &mut HashMap<String, (Type, DynAst<'ctx>)>) -> Result<DynAst<'ctx>, SolverError> {
    match op {
        BinOp::Add => Ok(DynAst::Int(Z3Int::add(ctx, &[&encode_int(ctx, l, decls)?, &encode_int(ctx, r, decls)?]))),
        BinOp::Sub => Ok(DynAst::Int(Z3Int::sub(ctx, &[&encode_int(ctx, l, decls)?, &encode_int(ctx, r, decls)?]))),
        BinOp::Mul => Ok(DynAst::Int(Z3Int::mul(ctx, &[&encode_int(ctx, l, decls)?, &encode_int(ctx, r, decls)?]))),
        BinOp::Lt => Ok(DynAst::Bool(encode_int(ctx, l, decls)?.lt(&encode_int(ctx, r, decls)?))),
        BinOp::Le => Ok(DynAst::Bool(encode_int(ctx, l, decls)?.le(&encode_int(ctx, r, decls)?))),
        BinOp::Gt => Ok(DynAst::Bool(encode_int(ctx, l, decls)?.gt(&encode_int(ctx, r, decls)?))),
        BinOp::Ge => Ok(DynAst::Bool(encode_int(ctx, l, decls)?.ge(&encode_int(ctx, r, decls)?))),
        BinOp::And => Ok(DynAst::Bool(Z3Bool::and(ctx, &[&encode_bool(ctx, l, decls)?, &encode_bool(ctx, r, decls)?]))),
        BinOp::Or => Ok(DynAst::Bool(Z3Bool::or(ctx, &[&encode_bool(ctx, l, decls)?, &encode_bool(ctx, r, decls)?]))),
        BinOp::Eq | BinOp::HandleEq => match &l.ty {
            Type::Bool => Ok(DynAst::Bool(encode_bool(ctx, l, decls)?._eq(&encode_bool(ctx, r, decls)?))),
            Type::Int => Ok(DynAst::Bool(encode_int(ctx, l, decls)?._eq(&encode_int(ctx, r, decls)?))),
            other => Err(SolverError::Unsupported(format!("equality over {other}"))),
        },
        BinOp::Ne => match &l.ty {
            Type::Bool => Ok(DynAst::Bool(encode_bool(ctx, l, decls)?._eq(&encode_bool(ctx, r, decls)?).not())),
            Type::Int => Ok(DynAst::Bool(encode_int(ctx, l, decls)?._eq(&encode_int(ctx, r, decls)?).not())),
            other => Err(SolverError::Unsupported(format!("inequality over {other}"))),
        },
        BinOp::In => Err(SolverError::Unsupported("`in` over a collection".to_string())),
    }
}

/// Wraps a backend with assumptions `A`, a function signature table, and a
/// cache of previously discovered counterexamples, checked by direct
/// evaluation before falling back to the inner backend. Any counterexample
/// the inner backend finds is folded back into the cache, so the next query
/// that would have hit the same example is answered without a solver call -
/// this is the whole point of the wrapper, not an optimization bolted on
/// afterward.
///
/// `examples` is `RefCell`-wrapped so `satisfy` can grow the cache from
/// `&self`, matching [`SmtBackend::satisfy`]'s signature - callers (the
/// driver, the builder) never need to remember to call [`Self::add_example`]
/// themselves for the counterexamples the solver itself turns up.
pub struct ModelCachingSolver<S> {
    inner: S,
    assumptions: Exp,
    function_signatures: HashMap<String, (Vec<Type>, Type)>,
    examples: RefCell<Vec<Env>>,
}

impl<S: SmtBackend> ModelCachingSolver<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, assumptions: Exp::bool_(true), function_signatures: HashMap::new(), examples: RefCell::new(Vec::new()) }
    }

    /// Sets the assumptions `A` every query is implicitly conjoined with.
    #[must_use]
    pub fn with_assumptions(mut self, assumptions: Exp) -> Self {
        self.assumptions = assumptions;
        self
    }

    /// Seeds the example cache.
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<Env>) -> Self {
        self.examples = RefCell::new(examples);
        self
    }

    /// Sets the function signature table, keyed by function name.
    #[must_use]
    pub fn with_function_signatures(mut self, function_signatures: HashMap<String, (Vec<Type>, Type)>) -> Self {
        self.function_signatures = function_signatures;
        self
    }

    #[must_use]
    pub fn assumptions(&self) -> &Exp {
        &self.assumptions
    }

    #[must_use]
    pub fn function_signatures(&self) -> &HashMap<String, (Vec<Type>, Type)> {
        &self.function_signatures
    }

    pub fn add_example(&self, env: Env) {
        self.examples.borrow_mut().push(env);
    }

    #[must_use]
    pub fn examples(&self) -> Vec<Env> {
        self.examples.borrow().clone()
    }
}

impl<S: SmtBackend> SmtBackend for ModelCachingSolver<S> {
    fn satisfy(&self, constraint: &Exp) -> Result<Option<Env>, SolverError> {
        for env in self.examples.borrow().iter() {
            if matches!(eval(constraint, env), Ok(Value::Bool(true))) {
                return Ok(Some(env.clone()));
            }
        }
        let found = self.inner.satisfy(constraint)?;
        if let Some(env) = &found {
            self.examples.borrow_mut().push(env.clone());
        }
        Ok(found)
    }

    fn valid(&self, constraint: &Exp) -> Result<bool, SolverError> {
        for env in self.examples.borrow().iter() {
            if matches!(eval(constraint, env), Ok(Value::Bool(false))) {
                return Ok(false);
            }
        }
        // Route through `satisfy` (rather than `self.inner.valid` directly)
        // so a counterexample the inner backend turns up here is cached too.
        let negated = Exp::unary_op(UnOp::Not, constraint.clone());
        Ok(self.satisfy(&negated)?.is_none())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::expr::Var;

    #[derive(Default)]
    struct AlwaysUnsupported;
    impl SmtBackend for AlwaysUnsupported {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            Err(SolverError::Unsupported("test stub".to_string()))
        }
    }

    #[test]
    fn model_caching_solver_refutes_via_cached_example_without_calling_inner() {
        let solver = ModelCachingSolver::new(AlwaysUnsupported);
        let x = Var::new("x", Type::Int);
        let mut env = Env::new();
        env.insert("x".to_string(), Value::Int(5));
        solver.add_example(env);

        let constraint = Exp::bin_op(Exp::var(x), BinOp::Eq, Exp::num(6));
        // The cached example makes this false; `valid` must short-circuit
        // without ever reaching `AlwaysUnsupported::satisfy`.
        assert_eq!(solver.valid(&constraint), Ok(false));
    }

    #[derive(Default)]
    struct CountingBackend {
        calls: Cell<usize>,
    }
    impl SmtBackend for CountingBackend {
        fn satisfy(&self, _constraint: &Exp) -> Result<Option<Env>, SolverError> {
            self.calls.set(self.calls.get() + 1);
            let mut env = Env::new();
            env.insert("y".to_string(), Value::Int(9));
            Ok(Some(env))
        }
    }

    #[test]
    fn model_caching_solver_caches_a_counterexample_the_inner_backend_finds() {
        let solver = ModelCachingSolver::new(CountingBackend::default());
        let y = Var::new("y", Type::Int);
        let constraint = Exp::bin_op(Exp::var(y), BinOp::Eq, Exp::num(9));

        let found = solver.satisfy(&constraint).expect("inner backend always answers Sat here");
        assert!(found.is_some());
        assert_eq!(solver.inner.calls.get(), 1);
        assert_eq!(solver.examples().len(), 1);

        // Same constraint again: the example just cached must answer it
        // without a second call into the inner backend.
        assert!(solver.satisfy(&constraint).unwrap().is_some());
        assert_eq!(solver.inner.calls.get(), 1);
        assert_eq!(solver.examples().len(), 1);
    }
}
