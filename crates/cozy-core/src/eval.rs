//! Reference evaluator: `eval(exp, env)` is the ground truth the rest of the
//! crate's cost model and search are allowed to assume agrees with whatever
//! target semantics the user is trying to synthesize an equivalent for.
//!
//! Deliberately simple and unoptimized - a tree-walker over [`Exp`], with no
//! caching beyond what [`eval_bulk`] gets for free by sharing one evaluation
//! of the target per example. Performance of the evaluator itself is out of
//! scope (see the Non-goals on the cost model: asymptotic cost is reasoned
//! about symbolically, never measured by running this evaluator).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::expr::{BinOp, Exp, ExpKind, Lambda, UnOp};
use crate::types::Type;
use crate::value::{value_cmp, Closure, Env, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    UnboundVariable(String),
    UnboundFunction(String),
    TypeMismatch { op: String, found: String },
    EmptyCollection { op: String },
    KeyNotFound { op: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnboundVariable(name) => write!(f, "unbound variable: {name}"),
            EvalError::UnboundFunction(name) => write!(f, "unbound function: {name}"),
            EvalError::TypeMismatch { op, found } => write!(f, "{op}: unexpected operand shape: {found}"),
            EvalError::EmptyCollection { op } => write!(f, "{op}: collection is empty"),
            EvalError::KeyNotFound { op } => write!(f, "{op}: key not present"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Table of externally-defined functions (`ExpKind::Call` targets) available
/// to the evaluator. Kept separate from `Env` because functions are looked
/// up by name globally, not lexically scoped like variables.
pub type FuncTable = HashMap<String, Rc<dyn Fn(&[Value]) -> Result<Value, EvalError>>>;

pub fn eval(exp: &Exp, env: &Env) -> Result<Value, EvalError> {
    eval_with(exp, env, &FuncTable::new())
}

pub fn eval_with(exp: &Exp, env: &Env, funcs: &FuncTable) -> Result<Value, EvalError> {
    match &exp.kind {
        ExpKind::Num(i) => Ok(Value::Int(*i)),
        ExpKind::Bool(b) => Ok(Value::Bool(*b)),
        ExpKind::Str(s) => Ok(Value::Str(s.clone())),
        ExpKind::EnumEntry(name) => Ok(Value::Enum(name.clone())),
        ExpKind::EmptyList => Ok(Value::Bag(Vec::new())),
        ExpKind::Singleton(e) => Ok(Value::Bag(vec![eval_with(e, env, funcs)?])),
        ExpKind::Var(v) => env.get(&v.id).cloned().ok_or_else(|| EvalError::UnboundVariable(v.id.clone())),
        ExpKind::StateVar(e) => eval_with(e, env, funcs),
        ExpKind::Lambda(lam) => Ok(close_over(lam, env)),
        ExpKind::Call(name, args) => {
            let f = funcs.get(name).ok_or_else(|| EvalError::UnboundFunction(name.clone()))?;
            let vs: Vec<Value> = args.iter().map(|a| eval_with(a, env, funcs)).collect::<Result<_, _>>()?;
            f(&vs)
        }
        ExpKind::UnaryOp(op, e) => eval_unary(*op, &eval_with(e, env, funcs)?),
        ExpKind::BinOp(l, op, r) => eval_binop(*op, &eval_with(l, env, funcs)?, &eval_with(r, env, funcs)?),
        ExpKind::Filter(e, pred) => {
            let items = as_items(&eval_with(e, env, funcs)?)?;
            let mut kept = Vec::new();
            for item in items.into_iter() {
                if apply(pred, &item, env, funcs)?.as_bool().ok_or_else(|| type_mismatch("Filter", "predicate must be Bool"))? {
                    kept.push(item);
                }
            }
            Ok(rewrap(&exp.ty, kept))
        }
        ExpKind::Map(e, f) => {
            let items = as_items(&eval_with(e, env, funcs)?)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(apply(f, &item, env, funcs)?);
            }
            Ok(rewrap(&exp.ty, out))
        }
        ExpKind::FlatMap(e, f) => {
            let items = as_items(&eval_with(e, env, funcs)?)?;
            let mut out = Vec::new();
            for item in items {
                let sub = apply(f, &item, env, funcs)?;
                out.extend(as_items(&sub)?);
            }
            Ok(rewrap(&exp.ty, out))
        }
        ExpKind::Flatten(e) => {
            let outer = as_items(&eval_with(e, env, funcs)?)?;
            let mut out = Vec::new();
            for inner in outer {
                out.extend(as_items(&inner)?);
            }
            Ok(rewrap(&exp.ty, out))
        }
        ExpKind::ArgMin(e, key) => arg_best(e, key, env, funcs, Ordering::Less),
        ExpKind::ArgMax(e, key) => arg_best(e, key, env, funcs, Ordering::Greater),
        ExpKind::MakeMap2(e, value) => {
            let keys = as_items(&eval_with(e, env, funcs)?)?;
            let mut out = Vec::with_capacity(keys.len());
            for k in keys {
                let v = apply(value, &k, env, funcs)?;
                out.push((k, v));
            }
            Ok(Value::Map(out))
        }
        ExpKind::MapGet(m, k) => {
            let value_ty = match &m.ty {
                Type::Map(_, v) => (**v).clone(),
                other => return Err(type_mismatch("MapGet", &format!("{other}"))),
            };
            let map = eval_with(m, env, funcs)?;
            let key = eval_with(k, env, funcs)?;
            match map {
                // A map is conceptually total over its key type; a missing
                // entry reads back as the value type's default, not an error.
                Value::Map(kvs) => Ok(kvs.into_iter().find(|(mk, _)| mk == &key).map_or_else(|| Value::default_for_type(&value_ty), |(_, v)| v)),
                other => Err(type_mismatch("MapGet", &format!("{other}"))),
            }
        }
        ExpKind::MapKeys(m) => match eval_with(m, env, funcs)? {
            Value::Map(kvs) => Ok(Value::Set(kvs.into_iter().map(|(k, _)| k).collect())),
            other => Err(type_mismatch("MapKeys", &format!("{other}"))),
        },
        ExpKind::HasKey(m, k) => {
            let map = eval_with(m, env, funcs)?;
            let key = eval_with(k, env, funcs)?;
            match map {
                Value::Map(kvs) => Ok(Value::Bool(kvs.iter().any(|(mk, _)| mk == &key))),
                other => Err(type_mismatch("HasKey", &format!("{other}"))),
            }
        }
        ExpKind::Tuple(es) => Ok(Value::Tuple(es.iter().map(|e| eval_with(e, env, funcs)).collect::<Result<_, _>>()?)),
        ExpKind::TupleGet(e, i) => match eval_with(e, env, funcs)? {
            Value::Tuple(vs) => vs.into_iter().nth(*i).ok_or_else(|| type_mismatch("TupleGet", "index out of range")),
            other => Err(type_mismatch("TupleGet", &format!("{other}"))),
        },
        ExpKind::GetField(e, field) => match eval_with(e, env, funcs)? {
            Value::Record(fs) => fs.into_iter().find(|(n, _)| n == field).map(|(_, v)| v).ok_or_else(|| type_mismatch("GetField", field)),
            other => Err(type_mismatch("GetField", &format!("{other}"))),
        },
        ExpKind::Cond(c, t, f) => {
            if eval_with(c, env, funcs)?.as_bool().ok_or_else(|| type_mismatch("Cond", "condition must be Bool"))? {
                eval_with(t, env, funcs)
            } else {
                eval_with(f, env, funcs)
            }
        }
    }
}

fn type_mismatch(op: &str, found: &str) -> EvalError {
    EvalError::TypeMismatch { op: op.to_string(), found: found.to_string() }
}

fn as_items(v: &Value) -> Result<Vec<Value>, EvalError> {
    v.as_collection().map(<[Value]>::to_vec).ok_or_else(|| type_mismatch("collection op", &format!("{v}")))
}

/// Rewraps a list of elements in the collection kind demanded by `ty`
/// (deduplicating for `Set`), after a combinator has produced plain items.
fn rewrap(ty: &Type, items: Vec<Value>) -> Value {
    match ty {
        Type::Set(_) => {
            let mut out: Vec<Value> = Vec::new();
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Value::Set(out)
        }
        Type::List(_) => Value::List(items),
        _ => Value::Bag(items),
    }
}

fn close_over(lam: &Lambda, env: &Env) -> Value {
    Value::Function(Rc::new(Closure { arg: lam.arg.clone(), body: lam.clone(), captured: env.clone() }))
}

fn apply(lam: &Lambda, arg: &Value, env: &Env, funcs: &FuncTable) -> Result<Value, EvalError> {
    let mut inner = env.clone();
    inner.insert(lam.arg.id.clone(), arg.clone());
    eval_with(&lam.body, &inner, funcs)
}

fn arg_best(e: &Exp, key: &Lambda, env: &Env, funcs: &FuncTable, want: Ordering) -> Result<Value, EvalError> {
    let items = as_items(&eval_with(e, env, funcs)?)?;
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = apply(key, &item, env, funcs)?;
        match &best {
            None => best = Some((item, k)),
            Some((_, best_key)) => {
                if value_cmp(&k, best_key) == want {
                    best = Some((item, k));
                }
            }
        }
    }
    best.map(|(item, _)| item).ok_or_else(|| EvalError::EmptyCollection { op: if want == Ordering::Less { "ArgMin".into() } else { "ArgMax".into() } })
}

fn eval_unary(op: UnOp, v: &Value) -> Result<Value, EvalError> {
    match op {
        UnOp::Sum => {
            let items = as_items(v)?;
            let mut total = 0i64;
            for item in items {
                total += item.as_int().ok_or_else(|| type_mismatch("Sum", "element must be Int"))?;
            }
            Ok(Value::Int(total))
        }
        UnOp::Length => Ok(Value::Int(as_items(v)?.len() as i64)),
        UnOp::Distinct => {
            let items = as_items(v)?;
            let mut out = Vec::new();
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(Value::Set(out))
        }
        UnOp::AreUnique => {
            let items = as_items(v)?;
            let mut seen: Vec<&Value> = Vec::new();
            for item in &items {
                if seen.contains(&item) {
                    return Ok(Value::Bool(false));
                }
                seen.push(item);
            }
            Ok(Value::Bool(true))
        }
        UnOp::All => {
            let items = as_items(v)?;
            for item in items {
                if !item.as_bool().ok_or_else(|| type_mismatch("All", "element must be Bool"))? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        UnOp::Any => {
            let items = as_items(v)?;
            for item in items {
                if item.as_bool().ok_or_else(|| type_mismatch("Any", "element must be Bool"))? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        UnOp::Reversed => match v {
            Value::List(xs) => {
                let mut xs = xs.clone();
                xs.reverse();
                Ok(Value::List(xs))
            }
            other => Err(type_mismatch("Reversed", &format!("{other}"))),
        },
        UnOp::Empty => Ok(Value::Bool(as_items(v)?.is_empty())),
        UnOp::Exists => Ok(Value::Bool(!as_items(v)?.is_empty())),
        UnOp::The => {
            let items = as_items(v)?;
            Ok(items.into_iter().next().unwrap_or(Value::Bool(false)))
        }
        UnOp::Not => Ok(Value::Bool(!v.as_bool().ok_or_else(|| type_mismatch("Not", "operand must be Bool"))?)),
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => match (l, r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            // Bag union: a multiset sum, not deduplicated - matches the cost
            // model charging `wc_card(l) + wc_card(r)` for `xs + ys`.
            (Value::Bag(a), Value::Bag(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::Bag(out))
            }
            _ => Err(type_mismatch("+", "operands must be Int or Bag")),
        },
        BinOp::Sub => match (l, r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            // Multiset difference: each element of `r` cancels one matching
            // occurrence in `l`.
            (Value::Bag(a), Value::Bag(b)) => {
                let mut remaining = b.clone();
                let mut out = Vec::new();
                for item in a {
                    if let Some(pos) = remaining.iter().position(|x| x == item) {
                        remaining.remove(pos);
                    } else {
                        out.push(item.clone());
                    }
                }
                Ok(Value::Bag(out))
            }
            _ => Err(type_mismatch("-", "operands must be Int or Bag")),
        },
        BinOp::Mul => Ok(Value::Int(l.as_int().ok_or_else(|| type_mismatch("*", "operand must be Int"))? * r.as_int().ok_or_else(|| type_mismatch("*", "operand must be Int"))?)),
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::HandleEq => match (l, r) {
            (Value::Handle(id_a, _), Value::Handle(id_b, _)) => Ok(Value::Bool(id_a == id_b)),
            _ => Ok(Value::Bool(l == r)),
        },
        BinOp::Ne => Ok(Value::Bool(l != r)),
        BinOp::Lt => Ok(Value::Bool(value_cmp(l, r) == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(value_cmp(l, r) != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(value_cmp(l, r) == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(value_cmp(l, r) != Ordering::Less)),
        BinOp::And => Ok(Value::Bool(l.as_bool().ok_or_else(|| type_mismatch("and", "operand must be Bool"))? && r.as_bool().ok_or_else(|| type_mismatch("and", "operand must be Bool"))?)),
        BinOp::Or => Ok(Value::Bool(l.as_bool().ok_or_else(|| type_mismatch("or", "operand must be Bool"))? || r.as_bool().ok_or_else(|| type_mismatch("or", "operand must be Bool"))?)),
        BinOp::In => {
            let items = as_items(r)?;
            Ok(Value::Bool(items.iter().any(|item| item == l)))
        }
    }
}

/// Evaluates `exp` against each environment in `examples`, substituting a
/// type-appropriate default value for any variable an example leaves
/// unbound. Used by the learner to compute fingerprints over a growing
/// example set without every example needing to bind every free variable.
pub fn eval_bulk(exp: &Exp, examples: &[Env], free_var_types: &HashMap<String, Type>) -> Result<Vec<Value>, EvalError> {
    examples
        .iter()
        .map(|env| {
            let mut full_env = env.clone();
            for (name, ty) in free_var_types {
                full_env.entry(name.clone()).or_insert_with(|| Value::default_for_type(ty));
            }
            eval(exp, &full_env)
        })
        .collect()
}
