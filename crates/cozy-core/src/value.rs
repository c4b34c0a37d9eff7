//! Runtime values: what expressions evaluate to.
//!
//! Unlike the teacher's `Value`, which indirects heap-allocated variants
//! through an arena (`Ref(HeapId)`) because it backs a long-lived VM, values
//! here are small, short-lived example data, so every variant owns its data
//! directly. There is no garbage collector to avoid running.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::expr::{Lambda, Var};
use crate::types::Type;

/// Opaque identity for a [`Value::Handle`]. Two handles are the same object
/// iff their ids match, regardless of the value they currently wrap.
pub type HandleId = u64;

/// The environment an expression is evaluated in: variable name -> value.
pub type Env = HashMap<String, Value>;

/// A captured lambda, ready to be applied by the evaluator.
///
/// Wrapped in `Rc` (not boxed) because the same closure is often applied to
/// every element of a collection without needing to be cloned deeply.
#[derive(Debug, Clone)]
pub struct Closure {
    pub arg: Var,
    pub body: Lambda,
    pub captured: Env,
}

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    /// An opaque foreign value, identified by an opaque debug label only -
    /// two native values are equal iff their labels match.
    Native(String),
    Enum(String),
    /// `===` compares only the id; `==` compares the id and the wrapped value.
    Handle(HandleId, Box<Value>),
    Tuple(Vec<Value>),
    Record(Vec<(String, Value)>),
    /// A multiset: order does not matter, duplicates do.
    Bag(Vec<Value>),
    /// A deduplicated collection: neither order nor duplicates matter.
    Set(Vec<Value>),
    /// An ordered collection: both order and duplicates matter.
    List(Vec<Value>),
    /// Association list rather than a hash map - lookups are O(n) by design,
    /// matching the "no incidental performance advantage over what the cost
    /// model can see" rule examples rely on.
    Map(Vec<(Value, Value)>),
    Function(Rc<Closure>),
}

impl Value {
    pub fn default_for_type(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Str => Value::Str(String::new()),
            Type::Native(name) => Value::Native(format!("<default {name}>")),
            Type::Enum(cases) => Value::Enum(cases.first().cloned().unwrap_or_default()),
            Type::Handle(inner) => Value::Handle(0, Box::new(Value::default_for_type(inner))),
            Type::Tuple(ts) => Value::Tuple(ts.iter().map(Value::default_for_type).collect()),
            Type::Record(fields) => Value::Record(fields.iter().map(|(n, t)| (n.clone(), Value::default_for_type(t))).collect()),
            Type::Bag(_) => Value::Bag(Vec::new()),
            Type::Set(_) => Value::Set(Vec::new()),
            Type::List(_) => Value::List(Vec::new()),
            Type::Map(_, _) => Value::Map(Vec::new()),
            Type::Function(..) => panic!("default_for_type: no default value for a function type"),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The elements of a bag/set/list, in storage order.
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Bag(xs) | Value::Set(xs) | Value::List(xs) => Some(xs),
            _ => None,
        }
    }

    /// A string used to bucket and order values that have no natural `Ord`
    /// (e.g. to canonicalize a bag for multiset comparison). Cheap enough for
    /// example-sized data; not meant to be a performance-sensitive path.
    fn sort_key(&self) -> String {
        match self {
            Value::Bool(b) => format!("b{b}"),
            Value::Int(i) => format!("i{i:020}"),
            Value::Str(s) => format!("s{s}"),
            Value::Native(s) => format!("n{s}"),
            Value::Enum(s) => format!("e{s}"),
            Value::Handle(id, v) => format!("h{id:020}{}", v.sort_key()),
            Value::Tuple(vs) => format!("t({})", vs.iter().map(Value::sort_key).collect::<Vec<_>>().join(",")),
            Value::Record(fs) => format!("r{{{}}}", fs.iter().map(|(n, v)| format!("{n}:{}", v.sort_key())).collect::<Vec<_>>().join(",")),
            Value::Bag(vs) => format!("bag[{}]", canonical_order(vs).iter().map(|v| v.sort_key()).collect::<Vec<_>>().join(",")),
            Value::Set(vs) => format!("set[{}]", canonical_order(vs).iter().map(|v| v.sort_key()).collect::<Vec<_>>().join(",")),
            Value::List(vs) => format!("list[{}]", vs.iter().map(Value::sort_key).collect::<Vec<_>>().join(",")),
            Value::Map(kvs) => {
                let mut entries: Vec<String> = kvs.iter().map(|(k, v)| format!("{}={}", k.sort_key(), v.sort_key())).collect();
                entries.sort();
                format!("map{{{}}}", entries.join(","))
            }
            Value::Function(_) => "fn".to_string(),
        }
    }
}

fn canonical_order(vs: &[Value]) -> Vec<&Value> {
    let mut out: Vec<&Value> = vs.iter().collect();
    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            // value equality on handles: same id and same pointee.
            (Value::Handle(id_a, a), Value::Handle(id_b, b)) => id_a == id_b && a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Bag(a), Value::Bag(b)) => multiset_eq(a, b),
            (Value::Set(a), Value::Set(b)) => set_eq(a, b),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => map_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

fn multiset_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    canonical_order(a) == canonical_order(b)
}

fn set_eq(a: &[Value], b: &[Value]) -> bool {
    let dedup = |xs: &[Value]| -> Vec<&Value> {
        let mut out: Vec<&Value> = Vec::new();
        for x in xs {
            if !out.iter().any(|y| *y == x) {
                out.push(x);
            }
        }
        out
    };
    let mut da = dedup(a);
    let mut db = dedup(b);
    if da.len() != db.len() {
        return false;
    }
    da.sort_by_key(|v| v.sort_key());
    db.sort_by_key(|v| v.sort_key());
    da == db
}

fn map_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
}

/// Consistent with the custom `Eq` above: canonical multisets/sets hash the
/// same regardless of storage order.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Native(s) => s.hash(state),
            Value::Enum(s) => s.hash(state),
            Value::Handle(id, v) => {
                id.hash(state);
                v.hash(state);
            }
            Value::Tuple(vs) => vs.hash(state),
            Value::Record(fs) => fs.hash(state),
            Value::Bag(vs) | Value::Set(vs) => {
                for v in canonical_order(vs) {
                    v.hash(state);
                }
            }
            Value::List(vs) => vs.hash(state),
            Value::Map(kvs) => {
                // Hash by the sorted entry keys so insertion order never changes the hash.
                let mut entries: Vec<String> = kvs.iter().map(|(k, v)| format!("{}={}", k.sort_key(), v.sort_key())).collect();
                entries.sort();
                for entry in entries {
                    entry.hash(state);
                }
            }
            Value::Function(rc) => (Rc::as_ptr(rc) as usize).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Native(s) => write!(f, "<{s}>"),
            Value::Enum(s) => write!(f, "{s}"),
            Value::Handle(id, v) => write!(f, "Handle#{id}({v})"),
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Record(fs) => {
                write!(f, "{{")?;
                for (i, (n, v)) in fs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Bag(vs) => write_seq(f, "Bag", vs),
            Value::Set(vs) => write_seq(f, "Set", vs),
            Value::List(vs) => write_seq(f, "List", vs),
            Value::Map(kvs) => {
                write!(f, "Map{{")?;
                for (i, (k, v)) in kvs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "<function>"),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, name: &str, vs: &[Value]) -> fmt::Result {
    write!(f, "{name}[")?;
    for (i, v) in vs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "]")
}

/// A strict weak order over values, used by `ArgMin`/`ArgMax` and anywhere
/// else a total order is required (`Lt`/`Le`/`Gt`/`Ge`). Not every pair of
/// values is comparable in principle (e.g. two distinct native handles);
/// those fall back to comparing by [`Value::sort_key`] so the order is at
/// least total and stable.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => a.sort_key().cmp(&b.sort_key()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_equality_ignores_order_but_not_duplicates() {
        let a = Value::Bag(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        let b = Value::Bag(vec![Value::Int(2), Value::Int(1), Value::Int(1)]);
        let c = Value::Bag(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn set_equality_ignores_order_and_duplicates() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Set(vec![Value::Int(2), Value::Int(1), Value::Int(1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn list_equality_is_order_sensitive() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn handle_equality_requires_matching_id_and_payload() {
        let a = Value::Handle(1, Box::new(Value::Int(5)));
        let b = Value::Handle(1, Box::new(Value::Int(5)));
        let c = Value::Handle(2, Box::new(Value::Int(5)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
