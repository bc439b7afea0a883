//! Subprocess execution of an external solver.

use crate::kind::{find_solver, SolverKind};
use crate::parse::{parse_cbc_solution, parse_glpsol_solution, parse_gurobi_solution};
use crate::SolverError;
use rheo_milp::lp::write_lp;
use rheo_milp::{Model, Status};
use std::fs;
use std::io::Write as _;
use std::process::Stdio;
use std::time::Duration;

/// A MILP solving backend.
///
/// The one implementation shells out to an installed solver; tests substitute
/// their own to exercise placement logic without a solver on the machine.
pub trait MilpBackend {
    /// Solves the model in place: writes the verdict and, when feasible, the
    /// variable values back into `model`.
    fn solve(&self, model: &mut Model, time_limit: Option<Duration>)
        -> Result<Status, SolverError>;
}

/// Drives an external solver through temporary files.
#[derive(Clone, Copy, Debug)]
pub struct SubprocessSolver {
    kind: SolverKind,
}

impl SubprocessSolver {
    /// Creates a backend for a specific solver.
    pub fn new(kind: SolverKind) -> Self {
        Self { kind }
    }

    /// Probes `PATH` and returns a backend for the first solver found, or
    /// for `preferred` alone when one is named.
    pub fn detect(preferred: Option<SolverKind>) -> Result<Self, SolverError> {
        Ok(Self {
            kind: find_solver(preferred)?,
        })
    }

    /// The solver this backend drives.
    pub fn kind(&self) -> SolverKind {
        self.kind
    }
}

impl MilpBackend for SubprocessSolver {
    fn solve(
        &self,
        model: &mut Model,
        time_limit: Option<Duration>,
    ) -> Result<Status, SolverError> {
        let dir = tempfile::Builder::new().prefix("rheo-milp-").tempdir()?;
        let lp_path = dir.path().join("model.lp");
        let sol_path = dir.path().join("model.sol");
        let layout = {
            let mut file = fs::File::create(&lp_path)?;
            let layout = write_lp(model, &mut file)?;
            file.flush()?;
            layout
        };

        let mut cmd = self.kind.command(&lp_path, &sol_path, time_limit);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let exit = cmd.status().map_err(|source| SolverError::Spawn {
            command: self.kind.executable().to_string(),
            source,
        })?;
        if !exit.success() {
            model.set_status(Status::Error);
            return Err(SolverError::SolverFailed(
                self.kind.executable().to_string(),
            ));
        }

        // Gurobi writes no result file when the model has no solution.
        if self.kind == SolverKind::Gurobi && !sol_path.is_file() {
            model.set_status(Status::Infeasible);
            return Ok(Status::Infeasible);
        }
        let text = fs::read_to_string(&sol_path)?;
        match self.kind {
            SolverKind::Cbc => parse_cbc_solution(&text, model, &layout),
            SolverKind::Glpsol => parse_glpsol_solution(&text, model, &layout),
            SolverKind::Gurobi => parse_gurobi_solution(&text, model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rheo_milp::Rel;

    // End-to-end solves need an installed solver; everything else about the
    // subprocess boundary (commands, parsers) is covered by unit tests.
    #[test]
    #[ignore = "requires a MILP solver on PATH"]
    fn solves_small_mixed_model() {
        let mut m = Model::new();
        let r1 = m.new_continuous(Some("r1"), 0.0, None).unwrap();
        let b1 = m.new_boolean(Some("b1")).unwrap();
        let b2 = m.new_boolean(Some("b2")).unwrap();
        let i1 = m.new_integer(Some("i1"), 1.0, Some(5.0)).unwrap();
        m.new_row(&[(1.0, b1), (1.0, b2)], Rel::Le, 1.0, None).unwrap();
        m.new_row(&[(4.0, r1), (-2.0, i1), (-1.36, b2)], Rel::Ge, -2.0, None)
            .unwrap();
        m.add_objective_term(2.0, r1).unwrap();
        m.add_objective_term(1.0, b1).unwrap();
        m.add_objective_term(3.0, i1).unwrap();
        m.set_minimize();

        let backend = SubprocessSolver::detect(None).unwrap();
        let status = backend.solve(&mut m, Some(Duration::from_secs(60))).unwrap();
        assert_eq!(status, Status::Optimal);
        // b1 costs 1 and buys nothing, so it stays 0; i1 sits at its lower
        // bound and r1 covers the remaining slack of the second row.
        assert!(!m.is_true(b1).unwrap());
        assert_eq!(m.value(i1).unwrap().round(), 1.0);
        let obj = m.objective_value().unwrap();
        assert!(obj >= 3.0 - 1e-6);
    }
}
