//! The typed expression AST (`Exp`) and the handful of structural operations
//! (substitution, free-variable analysis, α-equivalence, replacement) that
//! every other component in this crate is built on top of.
//!
//! Every [`Exp`] node carries its own [`Type`]; there is no separate
//! typing pass. Nodes are immutable: rewriting always produces a new tree,
//! never mutates one in place (see [`subst`] and [`replace`]).

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::Type;

/// A variable: a name plus the type it is declared at.
///
/// Two `Var`s are equal iff both the name and the type match - this is what
/// lets [`free_vars`] and the substitution machinery use `Var` as a hash key
/// without a separate "same variable" predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub id: String,
    pub ty: Type,
}

impl Var {
    pub fn new(id: impl Into<String>, ty: Type) -> Self {
        Self { id: id.into(), ty }
    }
}

/// A lambda: a binder plus a body. Lambdas only ever appear as the second
/// argument of a collection combinator (`Filter`, `Map`, ...) in this
/// language - there is no first-class function literal at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    pub arg: Var,
    pub body: Box<Exp>,
}

impl Lambda {
    pub fn new(arg: Var, body: Exp) -> Self {
        Self {
            arg,
            body: Box::new(body),
        }
    }

    /// The lambda's own function type, given the type of whatever it will be applied to.
    pub fn fn_type(&self) -> Type {
        Type::Function(vec![self.arg.ty.clone()], Box::new(self.body.ty.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Sum,
    Length,
    Distinct,
    AreUnique,
    All,
    Any,
    Reversed,
    Empty,
    Exists,
    The,
    Not,
}

/// Operators requiring a full pass over the collection at runtime; used by
/// the cost model (`asymptotic_runtime`) to charge linear cost.
pub const LINEAR_TIME_UOPS: &[UnOp] = &[
    UnOp::Sum,
    UnOp::Length,
    UnOp::Distinct,
    UnOp::AreUnique,
    UnOp::All,
    UnOp::Any,
    UnOp::Reversed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
    /// `===`: handle-identity equality, distinct from value equality (`Eq`).
    HandleEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Eq => "==",
            BinOp::HandleEq => "===",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::In => "in",
        };
        write!(f, "{s}")
    }
}

/// The expression node itself, without its type annotation.
///
/// Boxed recursively, same as the teacher's `ExprLoc`/`Expr` split - the
/// type annotation (and any future metadata) lives on the wrapping [`Exp`],
/// keeping `ExpKind` focused on shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpKind {
    Num(i64),
    Bool(bool),
    Str(String),
    EnumEntry(String),
    /// An empty collection literal; element type comes from the outer `Exp::ty`.
    EmptyList,
    Singleton(Box<Exp>),
    Var(Var),
    /// Marks `e` as materialized state: free at runtime, charged in storage.
    StateVar(Box<Exp>),
    Lambda(Lambda),
    Call(String, Vec<Exp>),
    UnaryOp(UnOp, Box<Exp>),
    BinOp(Box<Exp>, BinOp, Box<Exp>),
    Filter(Box<Exp>, Lambda),
    Map(Box<Exp>, Lambda),
    FlatMap(Box<Exp>, Lambda),
    Flatten(Box<Exp>),
    ArgMin(Box<Exp>, Lambda),
    ArgMax(Box<Exp>, Lambda),
    MakeMap2(Box<Exp>, Lambda),
    MapGet(Box<Exp>, Box<Exp>),
    MapKeys(Box<Exp>),
    HasKey(Box<Exp>, Box<Exp>),
    Tuple(Vec<Exp>),
    TupleGet(Box<Exp>, usize),
    GetField(Box<Exp>, String),
    Cond(Box<Exp>, Box<Exp>, Box<Exp>),
}

/// A typed expression node: an [`ExpKind`] plus the [`Type`] it evaluates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exp {
    pub kind: ExpKind,
    pub ty: Type,
}

impl Exp {
    pub fn new(kind: ExpKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn num(i: i64) -> Exp {
        Exp::new(ExpKind::Num(i), Type::Int)
    }

    pub fn bool_(b: bool) -> Exp {
        Exp::new(ExpKind::Bool(b), Type::Bool)
    }

    pub fn str_(s: impl Into<String>) -> Exp {
        Exp::new(ExpKind::Str(s.into()), Type::Str)
    }

    pub fn var(v: Var) -> Exp {
        let ty = v.ty.clone();
        Exp::new(ExpKind::Var(v), ty)
    }

    pub fn empty_list(elem: Type) -> Exp {
        Exp::new(ExpKind::EmptyList, Type::bag(elem))
    }

    pub fn singleton(e: Exp) -> Exp {
        let ty = Type::bag(e.ty.clone());
        Exp::new(ExpKind::Singleton(Box::new(e)), ty)
    }

    pub fn state_var(e: Exp) -> Exp {
        let ty = e.ty.clone();
        Exp::new(ExpKind::StateVar(Box::new(e)), ty)
    }

    pub fn lambda(arg: Var, body: Exp) -> Lambda {
        Lambda::new(arg, body)
    }

    pub fn unary_op(op: UnOp, e: Exp) -> Exp {
        let ty = match op {
            UnOp::Sum | UnOp::Length => Type::Int,
            UnOp::Distinct => match &e.ty {
                Type::Bag(t) | Type::Set(t) | Type::List(t) => Type::set((**t).clone()),
                other => panic!("unary_op Distinct: not a collection: {other}"),
            },
            UnOp::AreUnique | UnOp::All | UnOp::Any | UnOp::Empty | UnOp::Exists | UnOp::Not => Type::Bool,
            UnOp::Reversed => e.ty.clone(),
            UnOp::The => e.ty.element().cloned().unwrap_or_else(|| panic!("unary_op The: not a collection: {}", e.ty)),
        };
        Exp::new(ExpKind::UnaryOp(op, Box::new(e)), ty)
    }

    pub fn bin_op(l: Exp, op: BinOp, r: Exp) -> Exp {
        let ty = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                assert_eq!(l.ty, r.ty, "bin_op {op}: operand type mismatch");
                l.ty.clone()
            }
            BinOp::Eq | BinOp::HandleEq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or => {
                Type::Bool
            }
            BinOp::In => Type::Bool,
        };
        Exp::new(ExpKind::BinOp(Box::new(l), op, Box::new(r)), ty)
    }

    pub fn filter(e: Exp, p: Lambda) -> Exp {
        let ty = e.ty.clone();
        Exp::new(ExpKind::Filter(Box::new(e), p), ty)
    }

    pub fn map(e: Exp, f: Lambda) -> Exp {
        let ty = match &e.ty {
            Type::Bag(_) => Type::bag(f.body.ty.clone()),
            Type::Set(_) => Type::set(f.body.ty.clone()),
            Type::List(_) => Type::list(f.body.ty.clone()),
            other => panic!("map: not a collection: {other}"),
        };
        Exp::new(ExpKind::Map(Box::new(e), f), ty)
    }

    pub fn flat_map(e: Exp, f: Lambda) -> Exp {
        let ty = f.body.ty.clone();
        assert!(ty.is_collection(), "flat_map: lambda body must be a collection");
        Exp::new(ExpKind::FlatMap(Box::new(e), f), ty)
    }

    pub fn flatten(e: Exp) -> Exp {
        let inner = e.ty.element().cloned().expect("flatten: not a collection of collections");
        Exp::new(ExpKind::Flatten(Box::new(e)), inner)
    }

    pub fn arg_min(e: Exp, f: Lambda) -> Exp {
        let ty = e.ty.element().cloned().expect("arg_min: not a collection");
        Exp::new(ExpKind::ArgMin(Box::new(e), f), ty)
    }

    pub fn arg_max(e: Exp, f: Lambda) -> Exp {
        let ty = e.ty.element().cloned().expect("arg_max: not a collection");
        Exp::new(ExpKind::ArgMax(Box::new(e), f), ty)
    }

    pub fn make_map2(e: Exp, value: Lambda) -> Exp {
        let k = e.ty.element().cloned().expect("make_map2: not a collection");
        let ty = Type::map(k, value.body.ty.clone());
        Exp::new(ExpKind::MakeMap2(Box::new(e), value), ty)
    }

    pub fn map_get(m: Exp, k: Exp) -> Exp {
        let ty = match &m.ty {
            Type::Map(_, v) => (**v).clone(),
            other => panic!("map_get: not a map: {other}"),
        };
        Exp::new(ExpKind::MapGet(Box::new(m), Box::new(k)), ty)
    }

    pub fn map_keys(m: Exp) -> Exp {
        let ty = match &m.ty {
            Type::Map(k, _) => Type::set((**k).clone()),
            other => panic!("map_keys: not a map: {other}"),
        };
        Exp::new(ExpKind::MapKeys(Box::new(m)), ty)
    }

    pub fn has_key(m: Exp, k: Exp) -> Exp {
        Exp::new(ExpKind::HasKey(Box::new(m), Box::new(k)), Type::Bool)
    }

    pub fn tuple(es: Vec<Exp>) -> Exp {
        let ty = Type::Tuple(es.iter().map(|e| e.ty.clone()).collect());
        Exp::new(ExpKind::Tuple(es), ty)
    }

    pub fn tuple_get(e: Exp, i: usize) -> Exp {
        let ty = match &e.ty {
            Type::Tuple(ts) => ts.get(i).cloned().unwrap_or_else(|| panic!("tuple_get: index {i} out of range")),
            other => panic!("tuple_get: not a tuple: {other}"),
        };
        Exp::new(ExpKind::TupleGet(Box::new(e), i), ty)
    }

    pub fn get_field(e: Exp, field: impl Into<String>) -> Exp {
        let field = field.into();
        let ty = match &e.ty {
            Type::Record(fields) => fields
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(|| panic!("get_field: no field {field}")),
            other => panic!("get_field: not a record: {other}"),
        };
        Exp::new(ExpKind::GetField(Box::new(e), field), ty)
    }

    pub fn cond(c: Exp, t: Exp, f: Exp) -> Exp {
        assert_eq!(t.ty, f.ty, "cond: branch type mismatch");
        let ty = t.ty.clone();
        Exp::new(ExpKind::Cond(Box::new(c), Box::new(t), Box::new(f)), ty)
    }

    /// Direct sub-terms. A lambda exposes only its body - the bound argument
    /// is not itself a sub-expression of the lambda.
    pub fn children(&self) -> Vec<&Exp> {
        match &self.kind {
            ExpKind::Num(_) | ExpKind::Bool(_) | ExpKind::Str(_) | ExpKind::EnumEntry(_) | ExpKind::EmptyList | ExpKind::Var(_) => {
                vec![]
            }
            ExpKind::Singleton(e) | ExpKind::StateVar(e) | ExpKind::UnaryOp(_, e) | ExpKind::Flatten(e) | ExpKind::MapKeys(e) => {
                vec![e]
            }
            ExpKind::Lambda(lam) => vec![&lam.body],
            ExpKind::Call(_, args) => args.iter().collect(),
            ExpKind::BinOp(l, _, r) | ExpKind::MapGet(l, r) | ExpKind::HasKey(l, r) => vec![l, r],
            ExpKind::Filter(e, lam) | ExpKind::Map(e, lam) | ExpKind::FlatMap(e, lam) | ExpKind::ArgMin(e, lam) | ExpKind::ArgMax(e, lam) | ExpKind::MakeMap2(e, lam) => {
                vec![e, &lam.body]
            }
            ExpKind::Tuple(es) => es.iter().collect(),
            ExpKind::TupleGet(e, _) | ExpKind::GetField(e, _) => vec![e],
            ExpKind::Cond(c, t, f) => vec![c, t, f],
        }
    }

    /// Node count, including this node.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }

    /// Depth-first traversal of every sub-expression, this node included.
    /// Lambda arguments themselves are not yielded (they are not `Exp`s).
    pub fn all_subexps(&self) -> AllSubexps<'_> {
        AllSubexps { stack: vec![self] }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.kind, ExpKind::Lambda(_))
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpKind::Num(i) => write!(f, "{i}"),
            ExpKind::Bool(b) => write!(f, "{b}"),
            ExpKind::Str(s) => write!(f, "{s:?}"),
            ExpKind::EnumEntry(name) => write!(f, "{name}"),
            ExpKind::EmptyList => write!(f, "[]"),
            ExpKind::Singleton(e) => write!(f, "[{e}]"),
            ExpKind::Var(v) => write!(f, "{}", v.id),
            ExpKind::StateVar(e) => write!(f, "state({e})"),
            ExpKind::Lambda(lam) => write!(f, "(\\{} -> {})", lam.arg.id, lam.body),
            ExpKind::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExpKind::UnaryOp(op, e) => write!(f, "{op:?}({e})"),
            ExpKind::BinOp(l, op, r) => write!(f, "({l} {op} {r})"),
            ExpKind::Filter(e, p) => write!(f, "Filter({e}, {p})", p = fmt_lambda(p)),
            ExpKind::Map(e, m) => write!(f, "Map({e}, {m})", m = fmt_lambda(m)),
            ExpKind::FlatMap(e, m) => write!(f, "FlatMap({e}, {m})", m = fmt_lambda(m)),
            ExpKind::Flatten(e) => write!(f, "Flatten({e})"),
            ExpKind::ArgMin(e, m) => write!(f, "ArgMin({e}, {m})", m = fmt_lambda(m)),
            ExpKind::ArgMax(e, m) => write!(f, "ArgMax({e}, {m})", m = fmt_lambda(m)),
            ExpKind::MakeMap2(e, v) => write!(f, "MakeMap2({e}, {v})", v = fmt_lambda(v)),
            ExpKind::MapGet(m, k) => write!(f, "{m}[{k}]"),
            ExpKind::MapKeys(m) => write!(f, "MapKeys({m})"),
            ExpKind::HasKey(m, k) => write!(f, "HasKey({m}, {k})"),
            ExpKind::Tuple(es) => {
                write!(f, "(")?;
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            ExpKind::TupleGet(e, i) => write!(f, "{e}.{i}"),
            ExpKind::GetField(e, field) => write!(f, "{e}.{field}"),
            ExpKind::Cond(c, t, e) => write!(f, "(if {c} then {t} else {e})"),
        }
    }
}

fn fmt_lambda(lam: &Lambda) -> String {
    format!("(\\{} -> {})", lam.arg.id, lam.body)
}

/// Iterator produced by [`Exp::all_subexps`]; traverses the tree depth-first
/// using an explicit stack, same shape as the teacher's traversal helpers
/// (`asymptotic_runtime`/`rt` each keep their own `stk = [e]` loop).
pub struct AllSubexps<'a> {
    stack: Vec<&'a Exp>,
}

impl<'a> Iterator for AllSubexps<'a> {
    type Item = &'a Exp;

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.stack.pop()?;
        self.stack.extend(e.children());
        Some(e)
    }
}

/// The set of free variables of `e`: every `Var` that is not bound by an
/// enclosing `Lambda`.
pub fn free_vars(e: &Exp) -> HashSet<Var> {
    let mut out = HashSet::new();
    free_vars_into(e, &mut out);
    out
}

fn free_vars_into(e: &Exp, out: &mut HashSet<Var>) {
    match &e.kind {
        ExpKind::Var(v) => {
            out.insert(v.clone());
        }
        ExpKind::Lambda(lam) => {
            let mut inner = HashSet::new();
            free_vars_into(&lam.body, &mut inner);
            inner.remove(&lam.arg);
            out.extend(inner);
        }
        ExpKind::Filter(e, lam) | ExpKind::Map(e, lam) | ExpKind::FlatMap(e, lam) | ExpKind::ArgMin(e, lam) | ExpKind::ArgMax(e, lam) | ExpKind::MakeMap2(e, lam) => {
            free_vars_into(e, out);
            let mut inner = HashSet::new();
            free_vars_into(&lam.body, &mut inner);
            inner.remove(&lam.arg);
            out.extend(inner);
        }
        _ => {
            for c in e.children() {
                free_vars_into(c, out);
            }
        }
    }
}

/// The set of free function names referenced via [`ExpKind::Call`].
pub fn free_funcs(e: &Exp) -> HashSet<String> {
    let mut out = HashSet::new();
    for sub in e.all_subexps() {
        if let ExpKind::Call(name, _) = &sub.kind {
            out.insert(name.clone());
        }
    }
    out
}

/// Picks a variable name that does not collide with anything in `avoid`,
/// by appending an increasing numeric suffix to `base.id`.
pub fn fresh_var(ty: &Type, base_name: &str, avoid: &HashSet<String>) -> Var {
    if !avoid.contains(base_name) {
        return Var::new(base_name, ty.clone());
    }
    let mut n = 0usize;
    loop {
        let candidate = format!("{base_name}{n}");
        if !avoid.contains(&candidate) {
            return Var::new(candidate, ty.clone());
        }
        n += 1;
    }
}

/// Capture-avoiding substitution: replaces every free occurrence of a
/// variable named in `sigma`'s domain with the corresponding expression.
///
/// If a lambda's bound variable would be captured by a substituted
/// expression's free variables, the lambda is first α-renamed to a fresh
/// binder. Substituting a variable whose declared type does not match the
/// replacement's type is a programmer error (see module docs).
pub fn subst(e: &Exp, sigma: &HashMap<String, Exp>) -> Exp {
    if sigma.is_empty() {
        return e.clone();
    }
    match &e.kind {
        ExpKind::Var(v) => match sigma.get(&v.id) {
            Some(repl) => {
                assert_eq!(repl.ty, e.ty, "subst: replacement for {} has the wrong type", v.id);
                repl.clone()
            }
            None => e.clone(),
        },
        ExpKind::Lambda(lam) => Exp::new(ExpKind::Lambda(subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::Filter(body, lam) => Exp::new(ExpKind::Filter(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::Map(body, lam) => Exp::new(ExpKind::Map(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::FlatMap(body, lam) => Exp::new(ExpKind::FlatMap(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::ArgMin(body, lam) => Exp::new(ExpKind::ArgMin(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::ArgMax(body, lam) => Exp::new(ExpKind::ArgMax(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        ExpKind::MakeMap2(body, lam) => Exp::new(ExpKind::MakeMap2(Box::new(subst(body, sigma)), subst_lambda(lam, sigma)), e.ty.clone()),
        _ => {
            let kind = map_children(&e.kind, |c| subst(c, sigma));
            Exp::new(kind, e.ty.clone())
        }
    }
}

fn subst_lambda(lam: &Lambda, sigma: &HashMap<String, Exp>) -> Lambda {
    let mut body_sigma = sigma.clone();
    body_sigma.remove(&lam.arg.id);

    let codomain_free: HashSet<String> = body_sigma.values().flat_map(|v| free_vars(v).into_iter().map(|var| var.id)).collect();

    if codomain_free.contains(&lam.arg.id) {
        let mut avoid: HashSet<String> = codomain_free;
        avoid.extend(free_vars(&lam.body).into_iter().map(|v| v.id));
        let fresh = fresh_var(&lam.arg.ty, &lam.arg.id, &avoid);
        let mut rename = HashMap::new();
        rename.insert(lam.arg.id.clone(), Exp::var(fresh.clone()));
        let renamed_body = subst(&lam.body, &rename);
        Lambda::new(fresh, subst(&renamed_body, &body_sigma))
    } else {
        Lambda::new(lam.arg.clone(), subst(&lam.body, &body_sigma))
    }
}

/// Applies `f` to every direct sub-expression of `kind`, preserving shape.
fn map_children(kind: &ExpKind, f: impl Fn(&Exp) -> Exp) -> ExpKind {
    match kind {
        ExpKind::Num(i) => ExpKind::Num(*i),
        ExpKind::Bool(b) => ExpKind::Bool(*b),
        ExpKind::Str(s) => ExpKind::Str(s.clone()),
        ExpKind::EnumEntry(s) => ExpKind::EnumEntry(s.clone()),
        ExpKind::EmptyList => ExpKind::EmptyList,
        ExpKind::Var(v) => ExpKind::Var(v.clone()),
        ExpKind::Singleton(e) => ExpKind::Singleton(Box::new(f(e))),
        ExpKind::StateVar(e) => ExpKind::StateVar(Box::new(f(e))),
        ExpKind::Lambda(lam) => ExpKind::Lambda(Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::Call(name, args) => ExpKind::Call(name.clone(), args.iter().map(&f).collect()),
        ExpKind::UnaryOp(op, e) => ExpKind::UnaryOp(*op, Box::new(f(e))),
        ExpKind::BinOp(l, op, r) => ExpKind::BinOp(Box::new(f(l)), *op, Box::new(f(r))),
        ExpKind::Filter(e, lam) => ExpKind::Filter(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::Map(e, lam) => ExpKind::Map(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::FlatMap(e, lam) => ExpKind::FlatMap(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::Flatten(e) => ExpKind::Flatten(Box::new(f(e))),
        ExpKind::ArgMin(e, lam) => ExpKind::ArgMin(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::ArgMax(e, lam) => ExpKind::ArgMax(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::MakeMap2(e, lam) => ExpKind::MakeMap2(Box::new(f(e)), Lambda::new(lam.arg.clone(), f(&lam.body))),
        ExpKind::MapGet(m, k) => ExpKind::MapGet(Box::new(f(m)), Box::new(f(k))),
        ExpKind::MapKeys(m) => ExpKind::MapKeys(Box::new(f(m))),
        ExpKind::HasKey(m, k) => ExpKind::HasKey(Box::new(f(m)), Box::new(f(k))),
        ExpKind::Tuple(es) => ExpKind::Tuple(es.iter().map(&f).collect()),
        ExpKind::TupleGet(e, i) => ExpKind::TupleGet(Box::new(f(e)), *i),
        ExpKind::GetField(e, field) => ExpKind::GetField(Box::new(f(e)), field.clone()),
        ExpKind::Cond(c, t, e) => ExpKind::Cond(Box::new(f(c)), Box::new(f(t)), Box::new(f(e))),
    }
}

/// Structural equality up to renaming of lambda binders.
pub fn alpha_equivalent(a: &Exp, b: &Exp) -> bool {
    alpha_equivalent_under(a, b, &HashMap::new())
}

fn alpha_equivalent_under(a: &Exp, b: &Exp, renaming: &HashMap<String, String>) -> bool {
    if a.ty != b.ty {
        return false;
    }
    match (&a.kind, &b.kind) {
        (ExpKind::Var(v1), ExpKind::Var(v2)) => match renaming.get(&v1.id) {
            Some(expected) => expected == &v2.id,
            None => v1.id == v2.id,
        },
        (ExpKind::Lambda(l1), ExpKind::Lambda(l2)) => {
            if l1.arg.ty != l2.arg.ty {
                return false;
            }
            let mut renaming = renaming.clone();
            renaming.insert(l1.arg.id.clone(), l2.arg.id.clone());
            alpha_equivalent_under(&l1.body, &l2.body, &renaming)
        }
        (ExpKind::Filter(e1, l1), ExpKind::Filter(e2, l2))
        | (ExpKind::Map(e1, l1), ExpKind::Map(e2, l2))
        | (ExpKind::FlatMap(e1, l1), ExpKind::FlatMap(e2, l2))
        | (ExpKind::ArgMin(e1, l1), ExpKind::ArgMin(e2, l2))
        | (ExpKind::ArgMax(e1, l1), ExpKind::ArgMax(e2, l2))
        | (ExpKind::MakeMap2(e1, l1), ExpKind::MakeMap2(e2, l2)) => {
            alpha_equivalent_under(e1, e2, renaming)
                && l1.arg.ty == l2.arg.ty
                && alpha_equivalent_under(&l1.body, &l2.body, &{
                    let mut r = renaming.clone();
                    r.insert(l1.arg.id.clone(), l2.arg.id.clone());
                    r
                })
        }
        (ExpKind::Num(x), ExpKind::Num(y)) => x == y,
        (ExpKind::Bool(x), ExpKind::Bool(y)) => x == y,
        (ExpKind::Str(x), ExpKind::Str(y)) => x == y,
        (ExpKind::EnumEntry(x), ExpKind::EnumEntry(y)) => x == y,
        (ExpKind::EmptyList, ExpKind::EmptyList) => true,
        (ExpKind::Singleton(x), ExpKind::Singleton(y)) | (ExpKind::StateVar(x), ExpKind::StateVar(y)) | (ExpKind::Flatten(x), ExpKind::Flatten(y)) | (ExpKind::MapKeys(x), ExpKind::MapKeys(y)) => {
            alpha_equivalent_under(x, y, renaming)
        }
        (ExpKind::Call(n1, a1), ExpKind::Call(n2, a2)) => {
            n1 == n2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| alpha_equivalent_under(x, y, renaming))
        }
        (ExpKind::UnaryOp(o1, x), ExpKind::UnaryOp(o2, y)) => o1 == o2 && alpha_equivalent_under(x, y, renaming),
        (ExpKind::BinOp(l1, o1, r1), ExpKind::BinOp(l2, o2, r2)) => {
            o1 == o2 && alpha_equivalent_under(l1, l2, renaming) && alpha_equivalent_under(r1, r2, renaming)
        }
        (ExpKind::MapGet(m1, k1), ExpKind::MapGet(m2, k2)) | (ExpKind::HasKey(m1, k1), ExpKind::HasKey(m2, k2)) => {
            alpha_equivalent_under(m1, m2, renaming) && alpha_equivalent_under(k1, k2, renaming)
        }
        (ExpKind::Tuple(xs), ExpKind::Tuple(ys)) => xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| alpha_equivalent_under(x, y, renaming)),
        (ExpKind::TupleGet(x, i), ExpKind::TupleGet(y, j)) => i == j && alpha_equivalent_under(x, y, renaming),
        (ExpKind::GetField(x, f1), ExpKind::GetField(y, f2)) => f1 == f2 && alpha_equivalent_under(x, y, renaming),
        (ExpKind::Cond(c1, t1, e1), ExpKind::Cond(c2, t2, e2)) => {
            alpha_equivalent_under(c1, c2, renaming) && alpha_equivalent_under(t1, t2, renaming) && alpha_equivalent_under(e1, e2, renaming)
        }
        _ => false,
    }
}

/// Replaces every subtree α-equivalent to `old` with `new`, everywhere in `e`.
pub fn replace(e: &Exp, old: &Exp, new: &Exp) -> Exp {
    if alpha_equivalent(e, old) {
        return new.clone();
    }
    let kind = map_children(&e.kind, |c| replace(c, old, new));
    Exp::new(kind, e.ty.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(name: &str) -> Var {
        Var::new(name, Type::Int)
    }

    #[test]
    fn free_vars_excludes_bound_lambda_argument() {
        let x = int_var("x");
        let lam = Exp::lambda(x.clone(), Exp::bin_op(Exp::var(x), BinOp::Add, Exp::num(1)));
        let body = Exp::new(ExpKind::Lambda(lam), Type::Function(vec![Type::Int], Box::new(Type::Int)));
        assert!(free_vars(&body).is_empty());
    }

    #[test]
    fn free_vars_includes_outer_variable() {
        let x = int_var("x");
        let y = int_var("y");
        let lam = Exp::lambda(x.clone(), Exp::bin_op(Exp::var(x), BinOp::Add, Exp::var(y.clone())));
        let body = Exp::new(ExpKind::Lambda(lam), Type::Function(vec![Type::Int], Box::new(Type::Int)));
        let fv = free_vars(&body);
        assert_eq!(fv.len(), 1);
        assert!(fv.contains(&y));
    }

    #[test]
    fn replace_identity_is_a_no_op() {
        let xs = Var::new("xs", Type::bag(Type::Int));
        let e = Exp::unary_op(UnOp::Length, Exp::var(xs));
        let replaced = replace(&e, &e, &e);
        assert_eq!(replaced, e);
    }

    #[test]
    fn alpha_equivalent_ignores_binder_names() {
        let x = int_var("x");
        let y = int_var("y");
        let a = Exp::lambda(x.clone(), Exp::bin_op(Exp::var(x), BinOp::Add, Exp::num(1)));
        let b = Exp::lambda(y.clone(), Exp::bin_op(Exp::var(y), BinOp::Add, Exp::num(1)));
        let ea = Exp::new(ExpKind::Lambda(a), Type::Function(vec![Type::Int], Box::new(Type::Int)));
        let eb = Exp::new(ExpKind::Lambda(b), Type::Function(vec![Type::Int], Box::new(Type::Int)));
        assert!(alpha_equivalent(&ea, &eb));
        assert_ne!(ea, eb, "structurally they still differ by binder name");
    }

    #[test]
    fn subst_is_capture_avoiding() {
        // subst (\y -> x + y) with {x -> y} must not let the substituted `y`
        // be captured by the lambda's own bound `y`.
        let x = int_var("x");
        let y = int_var("y");
        let lam = Exp::lambda(y.clone(), Exp::bin_op(Exp::var(x.clone()), BinOp::Add, Exp::var(y.clone())));
        let e = Exp::new(ExpKind::Lambda(lam), Type::Function(vec![Type::Int], Box::new(Type::Int)));

        let mut sigma = HashMap::new();
        sigma.insert(x.id.clone(), Exp::var(y.clone()));
        let renamed = subst(&e, &sigma);

        let ExpKind::Lambda(new_lam) = &renamed.kind else { panic!("expected lambda") };
        assert_ne!(new_lam.arg.id, "y", "binder should have been renamed away from the captured name");
        assert!(free_vars(&renamed).contains(&y));
    }

    #[test]
    fn size_counts_every_node() {
        let e = Exp::bin_op(Exp::num(1), BinOp::Add, Exp::num(2));
        assert_eq!(e.size(), 3);
    }
}
