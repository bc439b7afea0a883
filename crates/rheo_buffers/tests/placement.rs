//! End-to-end placement scenarios.
//!
//! Formulation properties are verified with a small independent checker that
//! asks: is the all-zero decision assignment (no buffers anywhere) feasible?
//! It fixes every integer and boolean variable at zero, propagates the
//! remaining difference constraints longest-path style, and then checks every
//! row and bound. Solver-dependent tests are ignored unless a MILP solver is
//! installed.

use rheo_buffers::{formulate, place_buffers, PlaceError, PlacementConfig, PlacementGoal};
use rheo_milp::{Model, Rel, Status, VarId, VarKind};
use rheo_netlist::regions::extract_regions;
use rheo_netlist::{BlockKind, Netlist, PortDir, PortId, PortRole};
use rheo_solver::{MilpBackend, SolverError, SubprocessSolver};
use std::time::Duration;

/// Whether the model is satisfiable with every integer/boolean variable at 0.
fn zero_assignment_feasible(model: &Model) -> bool {
    let fixed: Vec<bool> = model
        .vars()
        .map(|(_, v)| v.kind != VarKind::Continuous)
        .collect();
    let lo: Vec<f64> = model.vars().map(|(_, v)| v.lo).collect();
    let hi: Vec<Option<f64>> = model.vars().map(|(_, v)| v.hi).collect();
    let mut val = lo.clone();

    // Rows with the fixed variables substituted away.
    let rows: Vec<(Vec<(f64, usize)>, Rel, f64)> = model
        .rows()
        .map(|row| {
            let terms: Vec<(f64, usize)> = row
                .terms
                .iter()
                .filter(|&&(_, v)| !fixed[v.as_raw() as usize])
                .map(|&(c, v)| (c, v.as_raw() as usize))
                .collect();
            (terms, row.rel, row.rhs)
        })
        .collect();

    let raise = |val: &mut Vec<f64>, rows: &[(Vec<(f64, usize)>, Rel, f64)]| -> bool {
        let mut changed = false;
        for (terms, rel, rhs) in rows {
            match (rel, terms.as_slice()) {
                (Rel::Ge | Rel::Eq, [(a, v)]) if *a > 0.0 => {
                    let need = rhs / a;
                    if val[*v] < need - 1e-9 {
                        val[*v] = need;
                        changed = true;
                    }
                }
                (Rel::Ge, [t1, t2]) => {
                    let (pos, neg) = if t1.0 > 0.0 { (t1, t2) } else { (t2, t1) };
                    if pos.0 > 0.0 && neg.0 < 0.0 {
                        let need = (rhs - neg.0 * val[neg.1]) / pos.0;
                        if val[pos.1] < need - 1e-9 {
                            val[pos.1] = need;
                            changed = true;
                        }
                    }
                }
                _ => {}
            }
        }
        changed
    };

    // Longest-path propagation converges within a pass per variable unless a
    // positive cycle keeps pushing values up.
    let passes = model.num_vars() + 2;
    for _ in 0..passes {
        if !raise(&mut val, &rows) {
            break;
        }
    }
    if raise(&mut val, &rows) {
        return false;
    }

    for (i, v) in val.iter().enumerate() {
        if let Some(h) = hi[i] {
            if *v > h + 1e-9 {
                return false;
            }
        }
    }
    for (terms, rel, rhs) in &rows {
        let lhs: f64 = terms.iter().map(|&(c, v)| c * val[v]).sum();
        let ok = match rel {
            Rel::Ge => lhs >= rhs - 1e-9,
            Rel::Le => lhs <= rhs + 1e-9,
            Rel::Eq => (lhs - rhs).abs() <= 1e-9,
        };
        if !ok {
            return false;
        }
    }
    true
}

/// A backend that "solves" by reporting every variable at its zero default.
/// Valid exactly when the zero assignment is feasible, which the tests using
/// it establish first.
struct ZeroBackend;

impl MilpBackend for ZeroBackend {
    fn solve(
        &self,
        model: &mut Model,
        _time_limit: Option<Duration>,
    ) -> Result<Status, SolverError> {
        model.set_status(Status::Optimal);
        let ids: Vec<VarId> = model.vars().map(|(id, _)| id).collect();
        for id in ids {
            model.set_value(id, 0.0)?;
        }
        Ok(Status::Optimal)
    }
}

/// A backend that always reports infeasibility.
struct InfeasibleBackend;

impl MilpBackend for InfeasibleBackend {
    fn solve(
        &self,
        model: &mut Model,
        _time_limit: Option<Duration>,
    ) -> Result<Status, SolverError> {
        model.set_status(Status::Infeasible);
        Ok(Status::Infeasible)
    }
}

fn chain(delays: &[f64]) -> Netlist {
    let mut nl = Netlist::new("chain");
    let mut prev_out: Option<PortId> = None;
    for (i, &d) in delays.iter().enumerate() {
        let b = nl
            .add_block(BlockKind::Operator, Some(&format!("b{i}")))
            .unwrap();
        nl.block_mut(b).delays = vec![d];
        if let Some(prev) = prev_out {
            let bi = nl
                .add_port(b, PortDir::In, None, 32, PortRole::Generic)
                .unwrap();
            nl.connect(prev, bi).unwrap();
        }
        prev_out = Some(
            nl.add_port(b, PortDir::Out, None, 32, PortRole::Generic)
                .unwrap(),
        );
    }
    nl
}

fn two_block_cycle() -> Netlist {
    let mut nl = Netlist::new("cycle");
    let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
    let b = nl.add_block(BlockKind::Operator, Some("b")).unwrap();
    for blk in [a, b] {
        nl.add_port(blk, PortDir::In, None, 32, PortRole::Generic)
            .unwrap();
        nl.add_port(blk, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
    }
    let ao = nl.find_port(a, "out1").unwrap();
    let bi = nl.find_port(b, "in1").unwrap();
    let bo = nl.find_port(b, "out1").unwrap();
    let ai = nl.find_port(a, "in1").unwrap();
    nl.connect(ao, bi).unwrap();
    let back = nl.connect(bo, ai).unwrap();
    nl.channel_mut(back).back_edge = true;
    nl
}

#[test]
fn relaxed_chain_needs_no_buffers() {
    // A zero-delay source feeding two 2 ns blocks at a 5 ns period: the
    // longest path is 4 ns, so no cut needs a register.
    let nl = chain(&[0.0, 2.0, 2.0]);
    let f = formulate(
        &nl,
        &[],
        &PlacementConfig::new(5.0),
        PlacementGoal::MinimizeBuffers,
        None,
    )
    .unwrap();
    assert!(zero_assignment_feasible(&f.model));
}

#[test]
fn tight_chain_needs_a_buffer() {
    // The same chain at a 3 ns period: 2 + 2 exceeds the period, so the
    // unbuffered assignment violates the path constraints.
    let nl = chain(&[0.0, 2.0, 2.0]);
    let f = formulate(
        &nl,
        &[],
        &PlacementConfig::new(3.0),
        PlacementGoal::MinimizeBuffers,
        None,
    )
    .unwrap();
    assert!(!zero_assignment_feasible(&f.model));
}

#[test]
fn cycle_without_buffers_is_not_elastic() {
    let nl = two_block_cycle();
    let set = extract_regions(&nl, 1.0);
    let f = formulate(
        &nl,
        &set.regions,
        &PlacementConfig::new(10.0),
        PlacementGoal::MinimizeBuffers,
        None,
    )
    .unwrap();
    assert!(!zero_assignment_feasible(&f.model));
}

#[test]
fn self_loop_without_a_register_is_infeasible() {
    let mut nl = Netlist::new("acc");
    let b = nl.add_block(BlockKind::Operator, Some("acc")).unwrap();
    let o = nl
        .add_port(b, PortDir::Out, None, 32, PortRole::Generic)
        .unwrap();
    let i = nl
        .add_port(b, PortDir::In, None, 32, PortRole::Generic)
        .unwrap();
    let ch = nl.connect(o, i).unwrap();
    nl.channel_mut(ch).back_edge = true;
    let set = extract_regions(&nl, 1.0);
    let f = formulate(
        &nl,
        &set.regions,
        &PlacementConfig::new(10.0),
        PlacementGoal::MinimizeBuffers,
        None,
    )
    .unwrap();
    assert!(!zero_assignment_feasible(&f.model));
}

#[test]
fn placement_on_relaxed_chain_inserts_nothing() {
    let mut nl = chain(&[0.0, 2.0, 2.0]);
    let report = place_buffers(&mut nl, &PlacementConfig::new(5.0), &ZeroBackend).unwrap();
    assert_eq!(report.num_buffers, 0);
    assert_eq!(report.total_slots, 0);
    assert_eq!(nl.num_blocks(), 3);
    assert!(nl.check().is_ok());
}

#[test]
fn infeasible_verdict_aborts_without_touching_the_netlist() {
    let mut nl = chain(&[0.0, 2.0, 2.0]);
    let err = place_buffers(&mut nl, &PlacementConfig::new(5.0), &InfeasibleBackend).unwrap_err();
    assert!(matches!(err, PlaceError::Infeasible(Status::Infeasible)));
    assert_eq!(nl.num_blocks(), 3);
    assert!(nl.check().is_ok());
}

#[test]
fn memory_channels_are_left_unbuffered() {
    // 2 ns into a 2 ns memory controller at a 3 ns period would need a cut,
    // but channels touching memory are exempt and never receive buffers.
    let mut nl = Netlist::new("mem");
    let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
    nl.block_mut(a).delays = vec![2.0];
    let ao = nl
        .add_port(a, PortDir::Out, None, 32, PortRole::Generic)
        .unwrap();
    let mc = nl
        .add_block(BlockKind::MemoryController, Some("mc"))
        .unwrap();
    nl.block_mut(mc).delays = vec![2.0];
    let mi = nl
        .add_port(mc, PortDir::In, None, 32, PortRole::Generic)
        .unwrap();
    let mo = nl
        .add_port(mc, PortDir::Out, None, 32, PortRole::Generic)
        .unwrap();
    let b = nl.add_block(BlockKind::Operator, Some("b")).unwrap();
    let bi = nl
        .add_port(b, PortDir::In, None, 32, PortRole::Generic)
        .unwrap();
    nl.connect(ao, mi).unwrap();
    nl.connect(mo, bi).unwrap();

    let f = formulate(
        &nl,
        &[],
        &PlacementConfig::new(3.0),
        PlacementGoal::MinimizeBuffers,
        None,
    )
    .unwrap();
    assert!(f.channels.is_empty());
    assert!(zero_assignment_feasible(&f.model));

    let report = place_buffers(&mut nl, &PlacementConfig::new(3.0), &ZeroBackend).unwrap();
    assert_eq!(report.num_buffers, 0);
    assert_eq!(nl.num_blocks(), 3);
    assert!(nl.check().is_ok());
}

#[test]
fn placement_is_idempotent_over_reruns() {
    // A second run folds the first run's buffers away before re-solving, so
    // buffer blocks never accumulate.
    let mut nl = chain(&[0.0, 2.0, 2.0]);
    let ids: Vec<_> = nl.channels().map(|(id, _)| id).collect();
    nl.insert_buffer(ids[0], 2, false).unwrap();
    assert_eq!(nl.num_blocks(), 4);
    place_buffers(&mut nl, &PlacementConfig::new(5.0), &ZeroBackend).unwrap();
    assert_eq!(nl.num_blocks(), 3);
    assert!(nl.check().is_ok());
}

#[test]
#[ignore = "requires a MILP solver on PATH"]
fn solver_buffers_a_tight_chain() {
    let mut nl = chain(&[0.0, 2.0, 2.0]);
    let backend = SubprocessSolver::detect(None).unwrap();
    let report = place_buffers(&mut nl, &PlacementConfig::new(3.0), &backend).unwrap();
    assert!(report.num_buffers >= 1);
    assert!(nl.check().is_ok());
    assert!(nl.blocks().any(|(_, b)| b.kind == BlockKind::Buffer));
}

#[test]
#[ignore = "requires a MILP solver on PATH"]
fn solver_sustains_loop_throughput() {
    let mut nl = two_block_cycle();
    let mut config = PlacementConfig::new(10.0);
    config.max_throughput = true;
    let backend = SubprocessSolver::detect(None).unwrap();
    let report = place_buffers(&mut nl, &config, &backend).unwrap();
    assert_eq!(report.regions.len(), 1);
    assert!(report.regions[0].throughput > 0.0);
    assert!(report.num_buffers >= 1);
    assert!(nl.check().is_ok());
}
