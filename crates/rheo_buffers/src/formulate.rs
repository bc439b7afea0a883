//! MILP formulation of buffer placement.
//!
//! Three constraint families are emitted:
//!
//! * **Timing**: continuous arrival times per port, bounded by the clock
//!   period. An opaque buffer on a channel breaks the combinational path via
//!   the register disjunction `t_dst - t_src + 2·P·flop >= 0` (with both
//!   times in `[0, P]`, the term only bites when `flop = 0`).
//! * **Elasticity**: hop counts that force every cycle to carry at least one
//!   buffer with at least one slot.
//! * **Throughput**: per strongly connected region, marked-graph retiming
//!   with one token per back-edge channel, relating achieved throughput to
//!   slot counts.
//!
//! Channels into or out of memory blocks carry no decision variables and are
//! never buffered; the rarely taken input of a select block is left out of
//! the throughput family.

use crate::{PlaceError, PlacementConfig};
use rheo_milp::{Model, Rel, VarId};
use rheo_netlist::regions::Region;
use rheo_netlist::{BlockKind, ChannelId, Netlist, PortId, PortRole};
use std::collections::HashMap;

/// What the objective optimizes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlacementGoal {
    /// Minimize buffer count, slots as a tie-breaker.
    MinimizeBuffers,
    /// Maximize frequency-weighted region throughput.
    MaximizeThroughput,
}

/// The decision variables attached to one channel.
#[derive(Clone, Copy, Debug)]
pub struct ChannelVars {
    /// 1 when the channel's buffer is opaque (breaks the combinational path).
    pub flop: VarId,
    /// Number of FIFO slots.
    pub slots: VarId,
    /// 1 when the channel carries any buffer at all.
    pub has_buffer: VarId,
}

/// A built model plus the variable maps needed to read the solution back.
#[derive(Debug)]
pub struct Formulation {
    /// The MILP.
    pub model: Model,
    /// Per-channel decision variables.
    pub channels: HashMap<ChannelId, ChannelVars>,
    /// Per-port arrival times.
    pub time_path: HashMap<PortId, VarId>,
    /// Per-port elastic hop counts.
    pub time_elastic: HashMap<PortId, VarId>,
    /// Per-region throughput variables, parallel to the region slice.
    pub throughput: Vec<VarId>,
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Channels into or out of a load-store queue or memory controller never
/// carry buffers.
pub(crate) fn memory_channel(nl: &Netlist, id: ChannelId) -> bool {
    let memory = |k: BlockKind| {
        matches!(k, BlockKind::LoadStoreQueue | BlockKind::MemoryController)
    };
    memory(nl.block(nl.channel_src_block(id)).kind)
        || memory(nl.block(nl.channel_dst_block(id)).kind)
}

/// Builds the placement MILP over the netlist and the selected regions.
///
/// `throughput_floor`, when given, pins each region's throughput to at least
/// the value achieved by a previous maximizing solve (minus a small slack),
/// which is how the two-phase max-throughput flow chains its solves.
pub fn formulate(
    nl: &Netlist,
    regions: &[Region],
    config: &PlacementConfig,
    goal: PlacementGoal,
    throughput_floor: Option<&[f64]>,
) -> Result<Formulation, PlaceError> {
    let mut model = Model::new();
    let period = config.period;
    let big = (nl.num_blocks() + 1) as f64;

    // Channel decision variables.
    let mut channels: HashMap<ChannelId, ChannelVars> = HashMap::new();
    for (id, _) in nl.channels() {
        if memory_channel(nl, id) {
            continue;
        }
        let label = format!(
            "{}_{}_{}",
            sanitize(&nl.block(nl.channel_src_block(id)).name),
            sanitize(&nl.block(nl.channel_dst_block(id)).name),
            id.as_raw()
        );
        let flop = model.new_boolean(Some(&format!("flop_{label}")))?;
        let slots = model.new_integer(Some(&format!("slots_{label}")), 0.0, None)?;
        let has_buffer = model.new_boolean(Some(&format!("buf_{label}")))?;
        channels.insert(
            id,
            ChannelVars {
                flop,
                slots,
                has_buffer,
            },
        );
    }

    // Arrival-time and hop-count variables per port.
    let mut time_path: HashMap<PortId, VarId> = HashMap::new();
    let mut time_elastic: HashMap<PortId, VarId> = HashMap::new();
    for (_, block) in nl.blocks() {
        for p in block.ports() {
            let label = format!(
                "{}_{}_{}",
                sanitize(&block.name),
                sanitize(&nl.port(p).name),
                p.as_raw()
            );
            let tp = model.new_continuous(Some(&format!("tp_{label}")), 0.0, Some(period))?;
            let te = model.new_continuous(Some(&format!("te_{label}")), 0.0, None)?;
            time_path.insert(p, tp);
            time_elastic.insert(p, te);
        }
    }

    // Per-channel timing and elasticity. Channels without decision
    // variables are exempt and impose nothing.
    for (id, ch) in nl.channels() {
        let Some(vars) = channels.get(&id) else {
            continue;
        };
        let v1 = time_path[&ch.src];
        let v2 = time_path[&ch.dst];
        model.new_row(
            &[(1.0, v2), (-1.0, v1), (2.0 * period, vars.flop)],
            Rel::Ge,
            0.0,
            None,
        )?;
        if config.buffer_delay > 0.0 {
            model.new_row(&[(1.0, v2)], Rel::Ge, config.buffer_delay, None)?;
        }
        let e1 = time_elastic[&ch.src];
        let e2 = time_elastic[&ch.dst];
        model.new_row(
            &[(1.0, e2), (-1.0, e1), (big, vars.flop)],
            Rel::Ge,
            0.0,
            None,
        )?;
        model.new_row(&[(1.0, vars.slots), (-1.0, vars.flop)], Rel::Ge, 0.0, None)?;
        model.new_row(
            &[(1.0, vars.has_buffer), (-0.01, vars.slots)],
            Rel::Ge,
            0.0,
            None,
        )?;
    }

    // Per-block propagation.
    for (_, block) in nl.blocks() {
        if block.latency == 0 {
            for (oi, &op) in block.outputs.iter().enumerate() {
                if block.inputs.is_empty() {
                    let d = block.delay_at(oi) + nl.port(op).delay;
                    check_period(&block.name, d, config)?;
                    if d > 0.0 {
                        model.new_row(&[(1.0, time_path[&op])], Rel::Ge, d, None)?;
                    }
                } else {
                    for &ip in &block.inputs {
                        let d = nl.combinational_delay(ip, op)?;
                        check_period(&block.name, d, config)?;
                        model.new_row(
                            &[(1.0, time_path[&op]), (-1.0, time_path[&ip])],
                            Rel::Ge,
                            d,
                            None,
                        )?;
                    }
                }
            }
        } else {
            // Pipelined: registers sit at the block boundary, so outputs
            // launch at their port delay and inputs must arrive in time.
            for &op in &block.outputs {
                let d = nl.port(op).delay;
                check_period(&block.name, d, config)?;
                model.new_row(&[(1.0, time_path[&op])], Rel::Eq, d, None)?;
            }
            for &ip in &block.inputs {
                let d = nl.port(ip).delay;
                check_period(&block.name, d, config)?;
                if d > 0.0 {
                    model.new_row(&[(1.0, time_path[&ip])], Rel::Le, period - d, None)?;
                }
            }
        }
        // A token spends at least one hop crossing any block.
        for &op in &block.outputs {
            for &ip in &block.inputs {
                model.new_row(
                    &[(1.0, time_elastic[&op]), (-1.0, time_elastic[&ip])],
                    Rel::Ge,
                    1.0,
                    None,
                )?;
            }
        }
    }

    // Per-region throughput.
    let mut throughput = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let th = model.new_continuous(Some(&format!("th_{i}")), 0.0, Some(1.0))?;
        throughput.push(th);
        let mut ret_in = HashMap::new();
        let mut ret_out = HashMap::new();
        for &b in &region.blocks {
            let block = nl.block(b);
            let label = format!("{}_{i}", sanitize(&block.name));
            if block.latency == 0 {
                let r = model.new_continuous(Some(&format!("ret_{label}")), 0.0, None)?;
                ret_in.insert(b, r);
                ret_out.insert(b, r);
            } else {
                let ri = model.new_continuous(Some(&format!("retIn_{label}")), 0.0, None)?;
                let ro = model.new_continuous(Some(&format!("retOut_{label}")), 0.0, None)?;
                let lat = block.latency as f64;
                let ii = block.initiation_interval.max(1) as f64;
                model.new_row(&[(1.0, ro), (-1.0, ri)], Rel::Le, lat / ii, None)?;
                model.new_row(
                    &[(1.0, ro), (-1.0, ri), (-lat, th)],
                    Rel::Ge,
                    0.0,
                    None,
                )?;
                ret_in.insert(b, ri);
                ret_out.insert(b, ro);
            }
        }
        for &c in &region.channels {
            let Some(vars) = channels.get(&c) else {
                continue;
            };
            let sb = nl.channel_src_block(c);
            let db = nl.channel_dst_block(c);
            let dst = nl.block(db);
            if dst.kind == BlockKind::Select {
                // The rarely taken select input does not gate steady-state
                // throughput.
                let rare = match nl.port(nl.channel(c).dst).role {
                    PortRole::True => dst.true_fraction < 0.5,
                    PortRole::False => dst.true_fraction > 0.5,
                    _ => false,
                };
                if rare {
                    continue;
                }
            }
            let token = if nl.channel(c).back_edge { 1.0 } else { 0.0 };
            let tok = model.new_continuous(Some(&format!("thTok_{i}_{}", c.as_raw())), 0.0, None)?;
            model.new_row(
                &[(1.0, ret_out[&sb]), (-1.0, ret_in[&db]), (1.0, tok)],
                Rel::Eq,
                token,
                None,
            )?;
            model.new_row(
                &[(1.0, th), (1.0, vars.flop), (-1.0, tok)],
                Rel::Le,
                1.0,
                None,
            )?;
            model.new_row(
                &[(1.0, tok), (1.0, th), (1.0, vars.flop), (-1.0, vars.slots)],
                Rel::Le,
                1.0,
                None,
            )?;
            model.new_row(&[(1.0, tok), (-1.0, vars.slots)], Rel::Le, 0.0, None)?;
            if sb == db {
                // A one-block cycle needs a register no matter how fast it is.
                model.new_row(&[(1.0, vars.flop)], Rel::Eq, 1.0, None)?;
            }
        }
        if let Some(floors) = throughput_floor {
            if let Some(&floor) = floors.get(i) {
                model.new_row(&[(1.0, th)], Rel::Ge, floor - 1e-6, None)?;
            }
        }
    }

    // Objective.
    match goal {
        PlacementGoal::MinimizeBuffers => {
            for vars in channels.values() {
                model.add_objective_term(1.0, vars.has_buffer)?;
                model.add_objective_term(config.slot_weight, vars.slots)?;
            }
            model.set_minimize();
        }
        PlacementGoal::MaximizeThroughput => {
            let total: f64 = regions.iter().map(Region::weight).sum();
            for (i, region) in regions.iter().enumerate() {
                let w = if total > 0.0 {
                    region.weight() / total
                } else {
                    1.0
                };
                model.add_objective_term(w, throughput[i])?;
            }
            model.set_maximize();
        }
    }

    Ok(Formulation {
        model,
        channels,
        time_path,
        time_elastic,
        throughput,
    })
}

fn check_period(block: &str, delay: f64, config: &PlacementConfig) -> Result<(), PlaceError> {
    if delay + config.buffer_delay > config.period {
        Err(PlaceError::PeriodUnsatisfiable {
            block: block.to_string(),
            needed: delay + config.buffer_delay,
            period: config.period,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rheo_netlist::regions::extract_regions;
    use rheo_netlist::{BlockKind, PortDir, PortRole};

    fn chain(delays: [f64; 3]) -> Netlist {
        let mut nl = Netlist::new("chain");
        let mut prev_out = None;
        for (i, d) in delays.into_iter().enumerate() {
            let b = nl
                .add_block(BlockKind::Operator, Some(&format!("b{i}")))
                .unwrap();
            nl.block_mut(b).delays = vec![d];
            if i > 0 {
                let bi = nl
                    .add_port(b, PortDir::In, None, 32, PortRole::Generic)
                    .unwrap();
                nl.connect(prev_out.unwrap(), bi).unwrap();
            }
            let bo = nl
                .add_port(b, PortDir::Out, None, 32, PortRole::Generic)
                .unwrap();
            prev_out = Some(bo);
        }
        nl
    }

    #[test]
    fn chain_formulates_expected_shape() {
        let nl = chain([2.0, 2.0, 2.0]);
        let f = formulate(&nl, &[], &PlacementConfig::new(5.0), PlacementGoal::MinimizeBuffers, None)
            .unwrap();
        assert_eq!(f.channels.len(), 2);
        // Two time variables per port, three decision variables per channel.
        assert_eq!(f.model.num_vars(), 2 * f.time_path.len() + 3 * 2);
        assert!(f.throughput.is_empty());
        // Objective covers has_buffer and slots of both channels.
        assert_eq!(f.model.objective().len(), 4);
    }

    #[test]
    fn slow_block_is_rejected_up_front() {
        let nl = chain([2.0, 6.0, 2.0]);
        let err = formulate(&nl, &[], &PlacementConfig::new(5.0), PlacementGoal::MinimizeBuffers, None)
            .unwrap_err();
        match err {
            PlaceError::PeriodUnsatisfiable { block, needed, .. } => {
                assert_eq!(block, "b1");
                assert_eq!(needed, 6.0);
            }
            other => panic!("expected PeriodUnsatisfiable, got {other}"),
        }
    }

    #[test]
    fn buffer_delay_counts_against_the_period() {
        let nl = chain([2.0, 4.5, 2.0]);
        let mut config = PlacementConfig::new(5.0);
        config.buffer_delay = 1.0;
        let err = formulate(&nl, &[], &config, PlacementGoal::MinimizeBuffers, None).unwrap_err();
        assert!(matches!(err, PlaceError::PeriodUnsatisfiable { .. }));
    }

    #[test]
    fn self_loop_forces_a_register() {
        let mut nl = Netlist::new("loop");
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
            &PlacementConfig::new(5.0),
            PlacementGoal::MinimizeBuffers,
            None,
        )
        .unwrap();
        let flop = f.channels[&ch].flop;
        let forced = f
            .model
            .rows()
            .any(|r| r.rel == Rel::Eq && r.rhs == 1.0 && r.terms == vec![(1.0, flop)]);
        assert!(forced);
    }

    #[test]
    fn memory_channels_carry_no_decision_variables() {
        let mut nl = Netlist::new("mem");
        let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
        let ao = nl
            .add_port(a, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
        let mc = nl
            .add_block(BlockKind::MemoryController, Some("mc"))
            .unwrap();
        let mi = nl
            .add_port(mc, PortDir::In, None, 32, PortRole::Generic)
            .unwrap();
        let ch = nl.connect(ao, mi).unwrap();
        let f = formulate(
            &nl,
            &[],
            &PlacementConfig::new(5.0),
            PlacementGoal::MinimizeBuffers,
            None,
        )
        .unwrap();
        assert!(memory_channel(&nl, ch));
        assert!(!f.channels.contains_key(&ch));
        // Only the per-port time variables remain.
        assert_eq!(f.model.num_vars(), 2 * f.time_path.len());
        assert!(f.model.objective().is_empty());
    }

    #[test]
    fn rare_select_input_skips_throughput_rows() {
        let mut nl = Netlist::new("sel");
        let s = nl.add_block(BlockKind::Select, Some("sel")).unwrap();
        let st = nl
            .add_port(s, PortDir::In, Some("inTrue"), 32, PortRole::True)
            .unwrap();
        let so = nl
            .add_port(s, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
        nl.block_mut(s).true_fraction = 0.2;
        let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
        let ai = nl
            .add_port(a, PortDir::In, None, 32, PortRole::Generic)
            .unwrap();
        let ao = nl
            .add_port(a, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
        let c1 = nl.connect(so, ai).unwrap();
        let c2 = nl.connect(ao, st).unwrap();
        nl.channel_mut(c2).back_edge = true;
        let set = extract_regions(&nl, 1.0);
        let f = formulate(
            &nl,
            &set.regions,
            &PlacementConfig::new(5.0),
            PlacementGoal::MinimizeBuffers,
            None,
        )
        .unwrap();
        // The frequent channel keeps its token variable, the rare input
        // of the select does not.
        assert!(f
            .model
            .find_var(&format!("thTok_0_{}", c1.as_raw()))
            .is_some());
        assert!(f
            .model
            .find_var(&format!("thTok_0_{}", c2.as_raw()))
            .is_none());
    }

    #[test]
    fn maximize_goal_weights_regions() {
        let mut nl = Netlist::new("loop");
        let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
        let ai = nl
            .add_port(a, PortDir::In, None, 32, PortRole::Generic)
            .unwrap();
        let ao = nl
            .add_port(a, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
        let b = nl.add_block(BlockKind::Operator, Some("b")).unwrap();
        let bi = nl
            .add_port(b, PortDir::In, None, 32, PortRole::Generic)
            .unwrap();
        let bo = nl
            .add_port(b, PortDir::Out, None, 32, PortRole::Generic)
            .unwrap();
        let c1 = nl.connect(ao, bi).unwrap();
        nl.connect(bo, ai).unwrap();
        nl.channel_mut(c1).back_edge = true;
        let set = extract_regions(&nl, 1.0);
        let f = formulate(
            &nl,
            &set.regions,
            &PlacementConfig::new(5.0),
            PlacementGoal::MaximizeThroughput,
            None,
        )
        .unwrap();
        assert_eq!(f.model.objective().len(), 1);
        assert_eq!(f.model.objective()[0].1, f.throughput[0]);
        assert_eq!(f.model.sense(), rheo_milp::Sense::Maximize);
    }
}
