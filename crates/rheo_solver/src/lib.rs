//! rheo_solver — external MILP solver adapter.
//!
//! Discovers an installed solver (`cbc`, `glpsol`, or `gurobi_cl`), writes a
//! [`rheo_milp::Model`] to a temporary LP file, runs the solver as a
//! subprocess, and parses its native solution format back into the model.

#![warn(missing_docs)]

mod kind;
mod parse;
mod run;

use std::io;
use thiserror::Error;

pub use kind::{find_solver, SolverKind};
pub use parse::{parse_cbc_solution, parse_glpsol_solution, parse_gurobi_solution};
pub use run::{MilpBackend, SubprocessSolver};

/// Errors produced while locating, running, or reading back a solver.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The explicitly requested solver is not installed.
    #[error("solver `{0}` not found on PATH")]
    SolverNotFound(&'static str),

    /// No supported solver is installed.
    #[error("no MILP solver found on PATH (tried cbc, glpsol, gurobi_cl)")]
    NoSolverFound,

    /// The solver process could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The executable that failed to start.
        command: String,
        /// The underlying OS error.
        source: io::Error,
    },

    /// The solver process exited with a failure status.
    #[error("solver `{0}` exited with failure")]
    SolverFailed(String),

    /// Reading or writing a scratch file failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The solution file did not match the expected format.
    #[error("malformed solution file: {0}")]
    MalformedSolution(String),

    /// The model rejected a value being written back.
    #[error(transparent)]
    Milp(#[from] rheo_milp::MilpError),
}
