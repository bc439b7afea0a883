//! Backend-independent MILP description.
//!
//! A [`Model`] accumulates variables, linear constraint rows, and an
//! objective, then is serialized to CPLEX-LP text (see [`crate::lp`]) and
//! handed to an external solver. Solution values flow back into the model so
//! callers read results through the same variable IDs they built constraints
//! with.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a model variable.
    VarId
);

define_id!(
    /// Opaque, copyable ID for a constraint row.
    RowId
);

/// Errors produced while building or querying a model.
#[derive(Debug, Error)]
pub enum MilpError {
    /// An explicit variable or row name is already taken.
    #[error("name `{0}` is already taken")]
    DuplicateName(String),

    /// A variable ID does not belong to this model.
    #[error("invalid variable id")]
    InvalidVar,

    /// A row ID does not belong to this model.
    #[error("invalid row id")]
    InvalidRow,

    /// Solution values were requested but the model has no feasible solution.
    #[error("no solution values available (status {0:?})")]
    NoSolution(Status),
}

/// The kind of a decision variable.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum VarKind {
    /// Real-valued.
    Continuous,
    /// Integer-valued.
    Integer,
    /// Integer restricted to {0, 1}.
    Boolean,
}

/// Relational operator of a constraint row.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Rel {
    /// Less than or equal.
    Le,
    /// Greater than or equal.
    Ge,
    /// Equal.
    Eq,
}

/// Optimization direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Sense {
    /// Minimize the objective.
    #[default]
    Minimize,
    /// Maximize the objective.
    Maximize,
}

/// Outcome reported by a solver run.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Status {
    /// The model has not been solved yet.
    #[default]
    Unsolved,
    /// Proven optimal; values are available.
    Optimal,
    /// Feasible but not proven optimal (e.g. a time limit hit); values are
    /// available.
    Feasible,
    /// Proven infeasible; no values.
    Infeasible,
    /// Proven unbounded; no values.
    Unbounded,
    /// The solver finished without a classifiable verdict; no values.
    Unknown,
    /// The solver failed outright; no values.
    Error,
}

impl Status {
    /// Whether solution values may be read.
    pub fn has_solution(self) -> bool {
        matches!(self, Status::Optimal | Status::Feasible)
    }
}

/// A decision variable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Var {
    /// Name as written to the LP file (no whitespace).
    pub name: String,
    /// Kind.
    pub kind: VarKind,
    /// Lower bound.
    pub lo: f64,
    /// Upper bound; `None` means unbounded above.
    pub hi: Option<f64>,
}

/// A linear constraint row: `terms rel rhs`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    /// Name as written to the LP file.
    pub name: String,
    /// Coefficient/variable terms.
    pub terms: Vec<(f64, VarId)>,
    /// Relational operator.
    pub rel: Rel,
    /// Right-hand side.
    pub rhs: f64,
}

/// Coefficients below this magnitude are dropped during normalization.
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// A mixed-integer linear program under construction, plus the solution
/// state written back by a solver.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    vars: Vec<Var>,
    rows: Vec<Row>,
    objective: Vec<(f64, VarId)>,
    sense: Sense,
    names: HashSet<String>,
    status: Status,
    values: Vec<f64>,
    objective_value: Option<f64>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- variables --------------------------------------------------------

    /// Adds a variable. A `None` name auto-generates `x{index}`.
    pub fn new_var(
        &mut self,
        kind: VarKind,
        name: Option<&str>,
        lo: f64,
        hi: Option<f64>,
    ) -> Result<VarId, MilpError> {
        let name = match name {
            Some(n) => {
                if self.names.contains(n) {
                    return Err(MilpError::DuplicateName(n.to_string()));
                }
                n.to_string()
            }
            None => format!("x{}", self.vars.len()),
        };
        self.names.insert(name.clone());
        let id = VarId::from_raw(self.vars.len() as u32);
        self.vars.push(Var {
            name,
            kind,
            lo,
            hi,
        });
        Ok(id)
    }

    /// Adds a continuous variable.
    pub fn new_continuous(
        &mut self,
        name: Option<&str>,
        lo: f64,
        hi: Option<f64>,
    ) -> Result<VarId, MilpError> {
        self.new_var(VarKind::Continuous, name, lo, hi)
    }

    /// Adds an integer variable.
    pub fn new_integer(
        &mut self,
        name: Option<&str>,
        lo: f64,
        hi: Option<f64>,
    ) -> Result<VarId, MilpError> {
        self.new_var(VarKind::Integer, name, lo, hi)
    }

    /// Adds a boolean (0/1) variable.
    pub fn new_boolean(&mut self, name: Option<&str>) -> Result<VarId, MilpError> {
        self.new_var(VarKind::Boolean, name, 0.0, Some(1.0))
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// The variable for an ID.
    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.as_raw() as usize]
    }

    /// Iterates over `(ID, &Var)` pairs in creation order.
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Var)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId::from_raw(i as u32), v))
    }

    /// Looks a variable up by name.
    pub fn find_var(&self, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .position(|v| v.name == name)
            .map(|i| VarId::from_raw(i as u32))
    }

    fn check_var(&self, id: VarId) -> Result<(), MilpError> {
        if (id.as_raw() as usize) < self.vars.len() {
            Ok(())
        } else {
            Err(MilpError::InvalidVar)
        }
    }

    // ---- rows -------------------------------------------------------------

    /// Adds a constraint row. A `None` name auto-generates `c{index}`.
    pub fn new_row(
        &mut self,
        terms: &[(f64, VarId)],
        rel: Rel,
        rhs: f64,
        name: Option<&str>,
    ) -> Result<RowId, MilpError> {
        for &(_, v) in terms {
            self.check_var(v)?;
        }
        let name = match name {
            Some(n) => {
                if self.names.contains(n) {
                    return Err(MilpError::DuplicateName(n.to_string()));
                }
                n.to_string()
            }
            None => format!("c{}", self.rows.len()),
        };
        self.names.insert(name.clone());
        let id = RowId::from_raw(self.rows.len() as u32);
        self.rows.push(Row {
            name,
            terms: terms.to_vec(),
            rel,
            rhs,
        });
        Ok(id)
    }

    /// Appends a term to an existing row.
    pub fn add_term(&mut self, row: RowId, coeff: f64, var: VarId) -> Result<(), MilpError> {
        self.check_var(var)?;
        let row = self
            .rows
            .get_mut(row.as_raw() as usize)
            .ok_or(MilpError::InvalidRow)?;
        row.terms.push((coeff, var));
        Ok(())
    }

    /// Replaces the right-hand side of a row.
    pub fn set_rhs(&mut self, row: RowId, rhs: f64) -> Result<(), MilpError> {
        self.rows
            .get_mut(row.as_raw() as usize)
            .ok_or(MilpError::InvalidRow)?
            .rhs = rhs;
        Ok(())
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterates over rows in creation order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    // ---- objective --------------------------------------------------------

    /// Appends a term to the objective.
    pub fn add_objective_term(&mut self, coeff: f64, var: VarId) -> Result<(), MilpError> {
        self.check_var(var)?;
        self.objective.push((coeff, var));
        Ok(())
    }

    /// Sets the optimization direction to minimize.
    pub fn set_minimize(&mut self) {
        self.sense = Sense::Minimize;
    }

    /// Sets the optimization direction to maximize.
    pub fn set_maximize(&mut self) {
        self.sense = Sense::Maximize;
    }

    /// The optimization direction.
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// The objective terms.
    pub fn objective(&self) -> &[(f64, VarId)] {
        &self.objective
    }

    // ---- convenience constraints ------------------------------------------

    /// At most one of `xs` is 1.
    pub fn at_most_one(&mut self, xs: &[VarId]) -> Result<RowId, MilpError> {
        let terms: Vec<_> = xs.iter().map(|&v| (1.0, v)).collect();
        self.new_row(&terms, Rel::Le, 1.0, None)
    }

    /// At least one of `xs` is 1.
    pub fn at_least_one(&mut self, xs: &[VarId]) -> Result<RowId, MilpError> {
        let terms: Vec<_> = xs.iter().map(|&v| (1.0, v)).collect();
        self.new_row(&terms, Rel::Ge, 1.0, None)
    }

    /// Exactly one of `xs` is 1.
    pub fn exactly_one(&mut self, xs: &[VarId]) -> Result<RowId, MilpError> {
        let terms: Vec<_> = xs.iter().map(|&v| (1.0, v)).collect();
        self.new_row(&terms, Rel::Eq, 1.0, None)
    }

    /// The sum of `xs` equals the sum of `ys`.
    pub fn equal_sum(&mut self, xs: &[VarId], ys: &[VarId]) -> Result<RowId, MilpError> {
        let terms: Vec<_> = xs
            .iter()
            .map(|&v| (1.0, v))
            .chain(ys.iter().map(|&v| (-1.0, v)))
            .collect();
        self.new_row(&terms, Rel::Eq, 0.0, None)
    }

    /// All of `xs` take the same value (pairwise chained equalities).
    pub fn all_equal(&mut self, xs: &[VarId]) -> Result<(), MilpError> {
        for pair in xs.windows(2) {
            self.new_row(&[(1.0, pair[0]), (-1.0, pair[1])], Rel::Eq, 0.0, None)?;
        }
        Ok(())
    }

    /// Boolean implication `x -> (y1 or y2 or ...)`.
    pub fn implies(&mut self, x: VarId, ys: &[VarId]) -> Result<RowId, MilpError> {
        let terms: Vec<_> = ys
            .iter()
            .map(|&v| (1.0, v))
            .chain(std::iter::once((-1.0, x)))
            .collect();
        self.new_row(&terms, Rel::Ge, 0.0, None)
    }

    /// Boolean implication `(x1 or x2 or ...) -> y`.
    pub fn implied_by(&mut self, xs: &[VarId], y: VarId) -> Result<RowId, MilpError> {
        let terms: Vec<_> = std::iter::once((xs.len() as f64, y))
            .chain(xs.iter().map(|&v| (-1.0, v)))
            .collect();
        self.new_row(&terms, Rel::Ge, 0.0, None)
    }

    // ---- normalization ----------------------------------------------------

    fn normalize_terms(terms: &mut Vec<(f64, VarId)>, epsilon: f64) {
        terms.sort_by_key(|&(_, v)| v.as_raw());
        let mut folded: Vec<(f64, VarId)> = Vec::with_capacity(terms.len());
        for &(c, v) in terms.iter() {
            match folded.last_mut() {
                Some(last) if last.1 == v => last.0 += c,
                _ => folded.push((c, v)),
            }
        }
        folded.retain(|&(c, _)| c.abs() >= epsilon);
        *terms = folded;
    }

    /// Sorts terms by variable, folds duplicates, and drops coefficients
    /// below `epsilon`, in every row and the objective. Idempotent.
    pub fn normalize(&mut self, epsilon: f64) {
        for row in &mut self.rows {
            Self::normalize_terms(&mut row.terms, epsilon);
        }
        Self::normalize_terms(&mut self.objective, epsilon);
    }

    // ---- solution state ---------------------------------------------------

    /// The solver verdict.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Records the solver verdict.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        if status.has_solution() && self.values.len() != self.vars.len() {
            self.values = vec![0.0; self.vars.len()];
        }
    }

    /// Records a solved variable value.
    pub fn set_value(&mut self, var: VarId, value: f64) -> Result<(), MilpError> {
        self.check_var(var)?;
        if self.values.len() != self.vars.len() {
            self.values = vec![0.0; self.vars.len()];
        }
        self.values[var.as_raw() as usize] = value;
        Ok(())
    }

    /// Records the solved objective value.
    pub fn set_objective_value(&mut self, value: f64) {
        self.objective_value = Some(value);
    }

    /// The solved value of a variable.
    pub fn value(&self, var: VarId) -> Result<f64, MilpError> {
        self.check_var(var)?;
        if !self.status.has_solution() {
            return Err(MilpError::NoSolution(self.status));
        }
        Ok(self.values[var.as_raw() as usize])
    }

    /// Whether a boolean variable solved to true (value above 0.5).
    pub fn is_true(&self, var: VarId) -> Result<bool, MilpError> {
        Ok(self.value(var)? > 0.5)
    }

    /// The solved objective value, if the solver reported one.
    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }
}
