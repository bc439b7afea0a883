//! Extraction of throughput-constrained regions.
//!
//! A region is a maximal strongly connected subgraph of the netlist, which
//! under steady state behaves as a marked graph: its throughput is limited by
//! the most constrained cycle. Buffer placement applies throughput
//! constraints per region, weighted by execution frequency.

use crate::ids::{BlockId, ChannelId};
use crate::netlist::Netlist;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A strongly connected region of the netlist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    /// Member blocks.
    pub blocks: BTreeSet<BlockId>,
    /// Channels with both endpoints inside the region.
    pub channels: BTreeSet<ChannelId>,
    /// Execution frequency: the minimum over member blocks.
    pub frequency: f64,
}

impl Region {
    /// Weight used for coverage ordering and throughput objectives.
    pub fn weight(&self) -> f64 {
        self.frequency * self.channels.len() as f64
    }
}

/// The regions selected for throughput constraints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionSet {
    /// Selected regions, heaviest first.
    pub regions: Vec<Region>,
    /// Fraction of the total region weight the selection covers.
    pub coverage: f64,
}

/// Extracts strongly connected regions and greedily selects the heaviest
/// until the requested weight fraction is covered.
///
/// `coverage` is clamped to `[0, 1]`; 0 selects only the single heaviest
/// region, 1 selects every cyclic region. Single-block components qualify
/// only when they carry a self-loop channel.
pub fn extract_regions(nl: &Netlist, coverage: f64) -> RegionSet {
    let coverage = coverage.clamp(0.0, 1.0);
    let mut graph: DiGraph<BlockId, ChannelId> = DiGraph::new();
    let mut nodes: HashMap<BlockId, NodeIndex> = HashMap::new();
    for (id, _) in nl.blocks() {
        nodes.insert(id, graph.add_node(id));
    }
    for (id, _) in nl.channels() {
        let s = nodes[&nl.channel_src_block(id)];
        let d = nodes[&nl.channel_dst_block(id)];
        graph.add_edge(s, d, id);
    }

    let mut candidates: Vec<Region> = Vec::new();
    for component in petgraph::algo::tarjan_scc(&graph) {
        let blocks: BTreeSet<BlockId> = component.iter().map(|&ix| graph[ix]).collect();
        let channels: BTreeSet<ChannelId> = nl
            .channels()
            .filter(|&(id, _)| {
                blocks.contains(&nl.channel_src_block(id))
                    && blocks.contains(&nl.channel_dst_block(id))
            })
            .map(|(id, _)| id)
            .collect();
        if channels.is_empty() {
            continue;
        }
        let frequency = blocks
            .iter()
            .map(|&b| nl.block(b).frequency)
            .fold(f64::INFINITY, f64::min);
        candidates.push(Region {
            blocks,
            channels,
            frequency: if frequency.is_finite() { frequency } else { 1.0 },
        });
    }

    candidates.sort_by(|a, b| {
        b.weight()
            .partial_cmp(&a.weight())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total: f64 = candidates.iter().map(Region::weight).sum();
    let mut selected = Vec::new();
    let mut covered = 0.0;
    for region in candidates {
        let done = !selected.is_empty()
            && (total <= 0.0 || covered / total >= coverage);
        if done {
            break;
        }
        covered += region.weight();
        selected.push(region);
    }
    RegionSet {
        regions: selected,
        coverage: if total > 0.0 { covered / total } else { 1.0 },
    }
}
