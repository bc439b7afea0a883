//! rheo_milp — backend-independent mixed-integer linear programming.
//!
//! A [`Model`] collects variables, constraint rows, and an objective, and is
//! serialized to CPLEX-LP text for an external solver. The [`lp::LpLayout`]
//! returned by serialization carries the positional information solution
//! parsers need.

#![warn(missing_docs)]

pub mod lp;
mod model;

pub use model::{
    MilpError, Model, Rel, Row, RowId, Sense, Status, Var, VarId, VarKind, DEFAULT_EPSILON,
};
