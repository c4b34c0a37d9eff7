//! The two pools a candidate sub-expression can be drawn from.

use std::fmt;

/// Whether an expression is meant to be recomputed on every access
/// (`Runtime`) or materialized once and kept around as part of the
/// synthesized data structure's state (`State`).
///
/// The cost model charges `State`-pool expressions for storage and
/// `Runtime`-pool expressions for the work of recomputing them; see
/// `CostModel::compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    Runtime,
    State,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Runtime => write!(f, "runtime"),
            Pool::State => write!(f, "state"),
        }
    }
}
