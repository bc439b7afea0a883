//! Known external solvers and PATH discovery.

use crate::SolverError;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// The external MILP solvers this crate can drive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SolverKind {
    /// COIN-OR branch and cut (`cbc`).
    Cbc,
    /// GLPK's standalone solver (`glpsol`).
    Glpsol,
    /// Gurobi's command-line runner (`gurobi_cl`).
    Gurobi,
}

impl SolverKind {
    /// Probe order for auto-detection.
    pub const ALL: [SolverKind; 3] = [SolverKind::Cbc, SolverKind::Glpsol, SolverKind::Gurobi];

    /// The executable name looked up on `PATH`.
    pub fn executable(self) -> &'static str {
        match self {
            SolverKind::Cbc => "cbc",
            SolverKind::Glpsol => "glpsol",
            SolverKind::Gurobi => "gurobi_cl",
        }
    }

    /// Parses a user-facing solver name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cbc" => Some(SolverKind::Cbc),
            "glpsol" | "glpk" => Some(SolverKind::Glpsol),
            "gurobi" | "gurobi_cl" => Some(SolverKind::Gurobi),
            _ => None,
        }
    }

    /// Composes the command that solves `lp` and leaves the solution at `sol`.
    pub(crate) fn command(
        self,
        lp: &Path,
        sol: &Path,
        time_limit: Option<Duration>,
    ) -> Command {
        let mut cmd = Command::new(self.executable());
        match self {
            SolverKind::Cbc => {
                cmd.arg(lp);
                if let Some(limit) = time_limit {
                    cmd.arg("sec").arg(limit.as_secs().max(1).to_string());
                }
                cmd.arg("solve").arg("gsolution").arg(sol);
            }
            SolverKind::Glpsol => {
                cmd.arg("--lp").arg(lp);
                if let Some(limit) = time_limit {
                    cmd.arg("--tmlim").arg(limit.as_secs().max(1).to_string());
                }
                cmd.arg("-w").arg(sol);
            }
            SolverKind::Gurobi => {
                if let Some(limit) = time_limit {
                    cmd.arg(format!("TimeLimit={}", limit.as_secs().max(1)));
                }
                cmd.arg(format!("ResultFile={}", sol.display()));
                cmd.arg(lp);
            }
        }
        cmd
    }
}

fn on_path(executable: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(executable).is_file())
}

/// Finds an installed solver.
///
/// With a preferred kind, checks only that one; otherwise probes
/// [`SolverKind::ALL`] in order.
pub fn find_solver(preferred: Option<SolverKind>) -> Result<SolverKind, SolverError> {
    match preferred {
        Some(kind) => {
            if on_path(kind.executable()) {
                Ok(kind)
            } else {
                Err(SolverError::SolverNotFound(kind.executable()))
            }
        }
        None => SolverKind::ALL
            .into_iter()
            .find(|k| on_path(k.executable()))
            .ok_or(SolverError::NoSolverFound),
    }
}
