//! Placement orchestration: solve the MILP and materialize buffers.

use crate::formulate::{formulate, memory_channel, PlacementGoal};
use crate::{PlaceError, PlacementConfig};
use rheo_common::InternalError;
use rheo_netlist::regions::extract_regions;
use rheo_netlist::{ChannelId, Netlist, NetlistError};
use rheo_solver::MilpBackend;
use serde::{Deserialize, Serialize};

/// Achieved throughput of one constrained region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionThroughput {
    /// Execution frequency of the region.
    pub frequency: f64,
    /// Number of channels in the region.
    pub num_channels: usize,
    /// Throughput the placement sustains, in tokens per cycle.
    pub throughput: f64,
}

/// Summary of a completed placement run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlacementReport {
    /// Number of buffers inserted.
    pub num_buffers: usize,
    /// Total FIFO slots across all inserted buffers.
    pub total_slots: u64,
    /// Per-region results, heaviest region first.
    pub regions: Vec<RegionThroughput>,
    /// Fraction of the region weight the throughput constraints covered.
    pub coverage: f64,
}

/// Places elastic buffers on the netlist.
///
/// Existing buffer blocks are folded away first so repeated runs start from
/// the bare circuit. In max-throughput mode two solves run back to back: the
/// first maximizes frequency-weighted region throughput, the second rebuilds
/// the model with the achieved throughputs as floors and minimizes buffering.
pub fn place_buffers(
    nl: &mut Netlist,
    config: &PlacementConfig,
    backend: &dyn MilpBackend,
) -> Result<PlacementReport, PlaceError> {
    nl.hide_buffers()?;
    nl.clear_buffer_annotations();

    let coverage = if config.max_throughput {
        config.coverage
    } else {
        1.0
    };
    let set = extract_regions(nl, coverage);

    let floors = if config.max_throughput && !set.regions.is_empty() {
        let mut f = formulate(
            nl,
            &set.regions,
            config,
            PlacementGoal::MaximizeThroughput,
            None,
        )?;
        let status = backend.solve(&mut f.model, config.time_limit)?;
        if !status.has_solution() {
            return Err(PlaceError::Infeasible(status));
        }
        let mut floors = Vec::with_capacity(f.throughput.len());
        for &th in &f.throughput {
            floors.push(f.model.value(th)?);
        }
        Some(floors)
    } else {
        None
    };

    let mut f = formulate(
        nl,
        &set.regions,
        config,
        PlacementGoal::MinimizeBuffers,
        floors.as_deref(),
    )?;
    let status = backend.solve(&mut f.model, config.time_limit)?;
    if !status.has_solution() {
        return Err(PlaceError::Infeasible(status));
    }

    let mut region_results = Vec::with_capacity(set.regions.len());
    for (i, region) in set.regions.iter().enumerate() {
        region_results.push(RegionThroughput {
            frequency: region.frequency,
            num_channels: region.channels.len(),
            throughput: f.model.value(f.throughput[i])?,
        });
    }

    // Annotate channels from the solution, then materialize.
    let ids: Vec<ChannelId> = nl.channels().map(|(id, _)| id).collect();
    for id in ids {
        let vars = match f.channels.get(&id).copied() {
            Some(vars) => vars,
            // Memory channels are never buffered and carry no variables.
            None if memory_channel(nl, id) => continue,
            None => {
                return Err(InternalError::new(format!(
                    "channel {} has no model variables",
                    id.as_raw()
                ))
                .into())
            }
        };
        // Slot counts come back as floats from the LP text; round to the
        // nearest integer.
        let slots = (f.model.value(vars.slots)? + 0.5).floor().max(0.0) as u32;
        let opaque = f.model.is_true(vars.flop)?;
        if slots > 0 {
            let ch = nl.channel_mut(id);
            ch.slots = slots;
            ch.transparent = !opaque;
        }
    }
    let (num_buffers, total_slots) = instantiate_buffers(nl)?;

    Ok(PlacementReport {
        num_buffers,
        total_slots,
        regions: region_results,
        coverage: set.coverage,
    })
}

/// Replaces every channel whose annotation requests slots with a materialized
/// buffer block, clearing the annotations it consumed.
pub fn instantiate_buffers(nl: &mut Netlist) -> Result<(usize, u64), NetlistError> {
    let pending: Vec<(ChannelId, u32, bool)> = nl
        .channels()
        .filter(|(_, ch)| ch.slots > 0)
        .map(|(id, ch)| (id, ch.slots, ch.transparent))
        .collect();
    let mut total = 0u64;
    for &(id, slots, transparent) in &pending {
        nl.insert_buffer(id, slots, transparent)?;
        total += u64::from(slots);
    }
    Ok((pending.len(), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rheo_netlist::{BlockKind, PortDir, PortRole};

    #[test]
    fn instantiate_materializes_annotations() {
        let mut nl = Netlist::new("t");
        let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
        let b = nl.add_block(BlockKind::Operator, Some("b")).unwrap();
        let ao = nl
            .add_port(a, PortDir::Out, None, 8, PortRole::Generic)
            .unwrap();
        let bi = nl
            .add_port(b, PortDir::In, None, 8, PortRole::Generic)
            .unwrap();
        let ch = nl.connect(ao, bi).unwrap();
        {
            let c = nl.channel_mut(ch);
            c.slots = 2;
            c.transparent = false;
        }
        let (count, slots) = instantiate_buffers(&mut nl).unwrap();
        assert_eq!((count, slots), (1, 2));
        let buf = nl
            .blocks()
            .find(|(_, blk)| blk.kind == BlockKind::Buffer)
            .map(|(id, _)| id)
            .unwrap();
        assert_eq!(nl.block(buf).slots, 2);
        assert!(!nl.block(buf).transparent);
        assert!(nl.check().is_ok());
    }

    #[test]
    fn instantiate_ignores_unannotated_channels() {
        let mut nl = Netlist::new("t");
        let a = nl.add_block(BlockKind::Operator, Some("a")).unwrap();
        let b = nl.add_block(BlockKind::Operator, Some("b")).unwrap();
        let ao = nl
            .add_port(a, PortDir::Out, None, 8, PortRole::Generic)
            .unwrap();
        let bi = nl
            .add_port(b, PortDir::In, None, 8, PortRole::Generic)
            .unwrap();
        nl.connect(ao, bi).unwrap();
        let (count, slots) = instantiate_buffers(&mut nl).unwrap();
        assert_eq!((count, slots), (0, 0));
        assert_eq!(nl.num_blocks(), 2);
    }
}
