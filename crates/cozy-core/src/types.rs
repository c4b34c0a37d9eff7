//! The closed set of value types `T` that every expression is typed over.
//!
//! Mirrors the shape of a small nominal type system: a handful of scalar
//! leaves, a few structural constructors (tuple/record), and the collection
//! family (bag/set/list/map) that the rest of the crate spends most of its
//! effort reasoning about the cost of.

use std::fmt;

/// A type in the expression language.
///
/// Cloning a `Type` is O(size of the type), which is fine: types are small
/// and short-lived compared to the expressions they annotate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    Str,
    /// An opaque foreign type identified by name (e.g. a host-language class).
    Native(String),
    /// An enumeration with a fixed, ordered set of case names.
    Enum(Vec<String>),
    /// A handle: identity-comparable reference to a value of the wrapped type.
    Handle(Box<Type>),
    Tuple(Vec<Type>),
    /// Field name -> field type, in declaration order.
    Record(Vec<(String, Type)>),
    /// A multiset.
    Bag(Box<Type>),
    /// A deduplicated collection.
    Set(Box<Type>),
    /// An order-preserving collection.
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Function(Vec<Type>, Box<Type>),
}

impl Type {
    pub fn handle(t: Type) -> Type {
        Type::Handle(Box::new(t))
    }

    pub fn bag(t: Type) -> Type {
        Type::Bag(Box::new(t))
    }

    pub fn set(t: Type) -> Type {
        Type::Set(Box::new(t))
    }

    pub fn list(t: Type) -> Type {
        Type::List(Box::new(t))
    }

    pub fn map(k: Type, v: Type) -> Type {
        Type::Map(Box::new(k), Box::new(v))
    }

    /// Element type of a collection, or `None` for non-collections.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Bag(t) | Type::Set(t) | Type::List(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::Bag(_) | Type::Set(_) | Type::List(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Int => write!(f, "Int"),
            Type::Str => write!(f, "String"),
            Type::Native(name) => write!(f, "Native<{name}>"),
            Type::Enum(cases) => write!(f, "Enum({})", cases.join(", ")),
            Type::Handle(t) => write!(f, "Handle<{t}>"),
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Type::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {t}")?;
                }
                write!(f, "}}")
            }
            Type::Bag(t) => write!(f, "Bag<{t}>"),
            Type::Set(t) => write!(f, "Set<{t}>"),
            Type::List(t) => write!(f, "List<{t}>"),
            Type::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Type::Function(args, ret) => {
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}
