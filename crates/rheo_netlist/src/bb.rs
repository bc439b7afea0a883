//! Control-flow (basic-block) graph analysis.
//!
//! Blocks carry an optional basic-block tag assigned by the frontend that
//! produced the netlist. From those tags this module reconstructs the
//! control-flow graph, classifies its back arcs, assigns default branch
//! probabilities, and computes steady-state execution frequencies that the
//! buffer-placement MILP weighs regions by.

use crate::entity::BlockKind;
use crate::netlist::Netlist;
use serde::{Deserialize, Serialize};

/// Default probability that a loop's lone back arc is taken.
pub const DEFAULT_BACK_PROBABILITY: f64 = 0.9;

/// A control-flow arc between two basic blocks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasicBlockArc {
    /// Source basic block.
    pub src: u32,
    /// Destination basic block.
    pub dst: u32,
    /// Probability that control leaving `src` takes this arc.
    pub probability: f64,
    /// Steady-state traversal frequency.
    pub frequency: f64,
    /// Whether the arc closes a loop (destination dominates source in the
    /// depth-first forest).
    pub back: bool,
}

/// The control-flow graph over basic-block tags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasicBlockGraph {
    num_blocks: u32,
    entry: u32,
    arcs: Vec<BasicBlockArc>,
    frequencies: Vec<f64>,
}

impl BasicBlockGraph {
    /// Creates a graph over `num_blocks` basic blocks with the given entry.
    pub fn new(num_blocks: u32, entry: u32) -> Self {
        Self {
            num_blocks,
            entry,
            arcs: Vec::new(),
            frequencies: vec![0.0; num_blocks as usize],
        }
    }

    /// The entry basic block.
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Number of basic blocks.
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// All arcs.
    pub fn arcs(&self) -> &[BasicBlockArc] {
        &self.arcs
    }

    /// Returns the index of the arc `src -> dst`, adding it if absent.
    /// The graph grows to cover endpoints beyond the current block count.
    pub fn find_or_add_arc(&mut self, src: u32, dst: u32) -> usize {
        let needed = src.max(dst) + 1;
        if needed > self.num_blocks {
            self.num_blocks = needed;
            self.frequencies.resize(needed as usize, 0.0);
        }
        if let Some(i) = self
            .arcs
            .iter()
            .position(|a| a.src == src && a.dst == dst)
        {
            return i;
        }
        self.arcs.push(BasicBlockArc {
            src,
            dst,
            probability: 0.0,
            frequency: 0.0,
            back: false,
        });
        self.arcs.len() - 1
    }

    /// Whether the arc `src -> dst` exists and is a back arc.
    pub fn is_back_arc(&self, src: u32, dst: u32) -> bool {
        self.arcs
            .iter()
            .any(|a| a.src == src && a.dst == dst && a.back)
    }

    /// Steady-state execution frequency of a basic block
    /// (valid after [`compute_frequencies`](Self::compute_frequencies)).
    pub fn frequency(&self, bb: u32) -> f64 {
        self.frequencies.get(bb as usize).copied().unwrap_or(0.0)
    }

    /// Classifies every arc as back or forward by a depth-first traversal
    /// from the entry. An arc `u -> v` is a back arc when `v` is an ancestor
    /// of `u` in the depth-first forest.
    pub fn mark_back_arcs(&mut self) {
        let n = self.num_blocks as usize;
        let mut succ: Vec<Vec<u32>> = vec![Vec::new(); n];
        for arc in &self.arcs {
            succ[arc.src as usize].push(arc.dst);
        }
        let mut pre = vec![usize::MAX; n];
        let mut post = vec![0usize; n];
        let mut counter = 0usize;
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let roots = std::iter::once(self.entry as usize).chain(0..n);
        for root in roots {
            if pre[root] != usize::MAX {
                continue;
            }
            pre[root] = counter;
            counter += 1;
            stack.push((root, 0));
            while let Some(&mut (node, ref mut next)) = stack.last_mut() {
                if *next < succ[node].len() {
                    let child = succ[node][*next] as usize;
                    *next += 1;
                    if pre[child] == usize::MAX {
                        pre[child] = counter;
                        counter += 1;
                        stack.push((child, 0));
                    }
                } else {
                    post[node] = counter;
                    counter += 1;
                    stack.pop();
                }
            }
        }
        for arc in &mut self.arcs {
            let (u, v) = (arc.src as usize, arc.dst as usize);
            arc.back = pre[v] <= pre[u] && post[v] >= post[u];
        }
    }

    /// Assigns branch probabilities where the frontend supplied none: the
    /// back arcs of a block together take `back_prob`, forward arcs share the
    /// remainder uniformly.
    pub fn default_probabilities(&mut self, back_prob: f64) {
        for src in 0..self.num_blocks {
            let outgoing: Vec<usize> = (0..self.arcs.len())
                .filter(|&i| self.arcs[i].src == src)
                .collect();
            if outgoing.is_empty() {
                continue;
            }
            let n_back = outgoing.iter().filter(|&&i| self.arcs[i].back).count();
            let n_fwd = outgoing.len() - n_back;
            let (p_back, p_fwd) = if n_back == 0 {
                (0.0, 1.0 / n_fwd as f64)
            } else if n_fwd == 0 {
                (1.0 / n_back as f64, 0.0)
            } else {
                (back_prob / n_back as f64, (1.0 - back_prob) / n_fwd as f64)
            };
            for i in outgoing {
                self.arcs[i].probability = if self.arcs[i].back { p_back } else { p_fwd };
            }
        }
    }

    /// Computes steady-state execution frequencies: the entry executes once
    /// per invocation and every other block receives the probability-weighted
    /// inflow of its predecessors, loops included. Solved by fixed-point
    /// iteration, which converges whenever every cycle leaks probability mass
    /// toward an exit.
    pub fn compute_frequencies(&mut self) {
        let n = self.num_blocks as usize;
        let mut f = vec![0.0f64; n];
        for _ in 0..10_000 {
            let mut delta = 0.0f64;
            for v in 0..n {
                let mut x = if v as u32 == self.entry { 1.0 } else { 0.0 };
                for arc in &self.arcs {
                    if arc.dst as usize == v {
                        x += f[arc.src as usize] * arc.probability;
                    }
                }
                delta = delta.max((x - f[v]).abs());
                f[v] = x;
            }
            if delta < 1e-9 {
                break;
            }
        }
        for arc in &mut self.arcs {
            arc.frequency = f[arc.src as usize] * arc.probability;
        }
        self.frequencies = f;
    }
}

/// Reconstructs the control-flow graph from the netlist's basic-block tags.
///
/// Arcs are added for channels crossing distinct tags, plus a self arc when a
/// branch feeds its own basic block (a single-block loop). Returns `None`
/// when no block carries a tag. Back arcs are classified on the result;
/// probabilities and frequencies are left for the caller to assign or
/// default.
pub fn build_basic_blocks(nl: &Netlist) -> Option<BasicBlockGraph> {
    let mut max_tag = None;
    for (_, b) in nl.blocks() {
        if let Some(t) = b.basic_block {
            max_tag = Some(max_tag.map_or(t, |m: u32| m.max(t)));
        }
    }
    let num = max_tag? + 1;
    let entry = nl
        .blocks()
        .find(|(_, b)| b.kind == BlockKind::Entry)
        .and_then(|(_, b)| b.basic_block)
        .unwrap_or(0);
    let mut bbg = BasicBlockGraph::new(num, entry);
    for (id, _) in nl.channels() {
        let src_block = nl.block(nl.channel_src_block(id));
        let dst_block = nl.block(nl.channel_dst_block(id));
        let (Some(s), Some(d)) = (src_block.basic_block, dst_block.basic_block) else {
            continue;
        };
        if s != d || src_block.kind == BlockKind::Branch {
            bbg.find_or_add_arc(s, d);
        }
    }
    bbg.mark_back_arcs();
    Some(bbg)
}

/// Pushes analysis results back onto the netlist: block and channel
/// frequencies from the basic-block frequencies, and channel back-edge flags
/// from the arc classification. Channels forming a structural self-loop on a
/// single block are back edges regardless of tags.
pub fn annotate_from_basic_blocks(nl: &mut Netlist, bbg: &BasicBlockGraph) {
    let tags: Vec<(crate::ids::BlockId, Option<u32>)> =
        nl.blocks().map(|(id, b)| (id, b.basic_block)).collect();
    for (id, tag) in tags {
        if let Some(t) = tag {
            nl.block_mut(id).frequency = bbg.frequency(t);
        }
    }
    let updates: Vec<(crate::ids::ChannelId, f64, bool)> = nl
        .channels()
        .map(|(id, _)| {
            let sb = nl.channel_src_block(id);
            let db = nl.channel_dst_block(id);
            let s_tag = nl.block(sb).basic_block;
            let d_tag = nl.block(db).basic_block;
            let freq = s_tag.map_or(1.0, |t| bbg.frequency(t));
            let back = sb == db
                || matches!((s_tag, d_tag), (Some(s), Some(d)) if s != d && bbg.is_back_arc(s, d))
                || matches!((s_tag, d_tag), (Some(s), Some(d)) if s == d
                    && nl.block(sb).kind == BlockKind::Branch
                    && bbg.is_back_arc(s, d));
            (id, freq, back)
        })
        .collect();
    for (id, freq, back) in updates {
        let ch = nl.channel_mut(id);
        ch.frequency = freq;
        ch.back_edge = back;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PortDir, PortRole};

    #[test]
    fn diamond_has_no_back_arcs() {
        let mut g = BasicBlockGraph::new(4, 0);
        g.find_or_add_arc(0, 1);
        g.find_or_add_arc(0, 2);
        g.find_or_add_arc(1, 3);
        g.find_or_add_arc(2, 3);
        g.mark_back_arcs();
        assert!(g.arcs().iter().all(|a| !a.back));
    }

    #[test]
    fn loop_closing_arc_is_back() {
        // 0 -> 1 -> 3 -> 1 (loop), 0 -> 2 -> 3 (cross edge into the loop body).
        let mut g = BasicBlockGraph::new(4, 0);
        g.find_or_add_arc(0, 1);
        g.find_or_add_arc(0, 2);
        g.find_or_add_arc(1, 3);
        g.find_or_add_arc(2, 3);
        g.find_or_add_arc(3, 1);
        g.mark_back_arcs();
        assert!(g.is_back_arc(3, 1));
        assert!(!g.is_back_arc(2, 3));
        assert!(!g.is_back_arc(0, 1));
    }

    #[test]
    fn self_arc_is_back() {
        let mut g = BasicBlockGraph::new(2, 0);
        g.find_or_add_arc(0, 1);
        g.find_or_add_arc(1, 1);
        g.mark_back_arcs();
        assert!(g.is_back_arc(1, 1));
    }

    #[test]
    fn out_of_range_arc_grows_the_graph() {
        let mut g = BasicBlockGraph::new(2, 0);
        g.find_or_add_arc(0, 1);
        g.find_or_add_arc(1, 5);
        assert_eq!(g.num_blocks(), 6);
        g.mark_back_arcs();
        assert!(!g.is_back_arc(1, 5));
        assert_eq!(g.frequency(5), 0.0);
    }

    #[test]
    fn default_probabilities_split_mass() {
        let mut g = BasicBlockGraph::new(3, 0);
        g.find_or_add_arc(0, 1);
        let back = g.find_or_add_arc(1, 1);
        let exit = g.find_or_add_arc(1, 2);
        g.mark_back_arcs();
        g.default_probabilities(DEFAULT_BACK_PROBABILITY);
        assert!((g.arcs()[back].probability - 0.9).abs() < 1e-12);
        assert!((g.arcs()[exit].probability - 0.1).abs() < 1e-12);
        assert!((g.arcs()[0].probability - 1.0).abs() < 1e-12);
    }

    #[test]
    fn loop_frequencies_amplify() {
        // entry -> header, header loops on itself with p = 0.9 and exits with
        // p = 0.1: the header runs 10x per invocation.
        let mut g = BasicBlockGraph::new(3, 0);
        g.find_or_add_arc(0, 1);
        g.find_or_add_arc(1, 1);
        g.find_or_add_arc(1, 2);
        g.mark_back_arcs();
        g.default_probabilities(DEFAULT_BACK_PROBABILITY);
        g.compute_frequencies();
        assert!((g.frequency(0) - 1.0).abs() < 1e-6);
        assert!((g.frequency(1) - 10.0).abs() < 1e-5);
        assert!((g.frequency(2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn netlist_reconstruction_tags_back_channels() {
        let mut nl = Netlist::new("t");
        let entry = nl.add_block(BlockKind::Entry, Some("entry")).unwrap();
        let body = nl.add_block(BlockKind::Branch, Some("body")).unwrap();
        let exit = nl.add_block(BlockKind::Exit, Some("exit")).unwrap();
        nl.block_mut(entry).basic_block = Some(0);
        nl.block_mut(body).basic_block = Some(1);
        nl.block_mut(exit).basic_block = Some(2);
        let eo = nl
            .add_port(entry, PortDir::Out, None, 0, PortRole::Generic)
            .unwrap();
        let bi = nl
            .add_port(body, PortDir::In, None, 0, PortRole::Generic)
            .unwrap();
        let bt = nl
            .add_port(body, PortDir::Out, None, 0, PortRole::True)
            .unwrap();
        let bf = nl
            .add_port(body, PortDir::Out, None, 0, PortRole::False)
            .unwrap();
        let bi2 = nl
            .add_port(body, PortDir::In, None, 0, PortRole::Generic)
            .unwrap();
        let xi = nl
            .add_port(exit, PortDir::In, None, 0, PortRole::Generic)
            .unwrap();
        nl.connect(eo, bi).unwrap();
        let loop_ch = nl.connect(bt, bi2).unwrap();
        let exit_ch = nl.connect(bf, xi).unwrap();

        let mut bbg = build_basic_blocks(&nl).unwrap();
        bbg.default_probabilities(DEFAULT_BACK_PROBABILITY);
        bbg.compute_frequencies();
        annotate_from_basic_blocks(&mut nl, &bbg);

        assert!(nl.channel(loop_ch).back_edge);
        assert!(!nl.channel(exit_ch).back_edge);
        assert!((nl.block(body).frequency - 10.0).abs() < 1e-5);
        assert!((nl.channel(exit_ch).frequency - 10.0).abs() < 1e-5);
    }
}
