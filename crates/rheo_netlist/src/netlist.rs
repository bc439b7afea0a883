//! The netlist graph: blocks, ports, and channels with structural invariants.

use crate::entity::{Block, BlockKind, Channel, Port, PortDir, PortRole};
use crate::error::NetlistError;
use crate::ids::{BlockId, ChannelId, PortId};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dataflow-circuit netlist.
///
/// The graph owns all entities; callers hold opaque IDs. Every mutator either
/// succeeds atomically or returns an error with the graph unchanged. IDs of
/// removed entities are never reissued.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Netlist {
    /// Name of the circuit.
    pub name: String,
    blocks: Store<BlockId, Block>,
    ports: Store<PortId, Port>,
    channels: Store<ChannelId, Channel>,
    names: HashMap<String, BlockId>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Store::new(),
            ports: Store::new(),
            channels: Store::new(),
            names: HashMap::new(),
        }
    }

    // ---- lookup -----------------------------------------------------------

    /// Returns the block for a live ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is dead; use [`valid_block`](Self::valid_block) first
    /// when liveness is in question.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Returns the port for a live ID. Panics on a dead ID.
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id]
    }

    /// Returns the channel for a live ID. Panics on a dead ID.
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id]
    }

    /// Mutable access to a live block. Panics on a dead ID.
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    /// Mutable access to a live channel. Panics on a dead ID.
    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id]
    }

    /// Whether the ID refers to a live block. Never panics.
    pub fn valid_block(&self, id: BlockId) -> bool {
        self.blocks.contains(id)
    }

    /// Whether the ID refers to a live port. Never panics.
    pub fn valid_port(&self, id: PortId) -> bool {
        self.ports.contains(id)
    }

    /// Whether the ID refers to a live channel. Never panics.
    pub fn valid_channel(&self, id: ChannelId) -> bool {
        self.channels.contains(id)
    }

    /// Looks a block up by name.
    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.names.get(name).copied()
    }

    /// Looks a port up by name within a block.
    pub fn find_port(&self, block: BlockId, name: &str) -> Option<PortId> {
        self.blocks
            .get(block)?
            .ports()
            .find(|&p| self.ports[p].name == name)
    }

    /// Iterates over live blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter()
    }

    /// Iterates over live ports.
    pub fn ports(&self) -> impl Iterator<Item = (PortId, &Port)> {
        self.ports.iter()
    }

    /// Iterates over live channels.
    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels.iter()
    }

    /// Number of live blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of live channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// The block owning the source port of a channel.
    pub fn channel_src_block(&self, id: ChannelId) -> BlockId {
        self.port(self.channel(id).src).block
    }

    /// The block owning the destination port of a channel.
    pub fn channel_dst_block(&self, id: ChannelId) -> BlockId {
        self.port(self.channel(id).dst).block
    }

    // ---- construction -----------------------------------------------------

    /// Adds a block. A `None` name auto-generates `{kind}_{n}`.
    pub fn add_block(
        &mut self,
        kind: BlockKind,
        name: Option<&str>,
    ) -> Result<BlockId, NetlistError> {
        let name = match name {
            Some(n) => {
                if self.names.contains_key(n) {
                    return Err(NetlistError::NameCollision(n.to_string()));
                }
                n.to_string()
            }
            None => {
                let mut n = self.blocks.len();
                loop {
                    let candidate = format!("{}_{n}", kind.as_str().to_lowercase());
                    if !self.names.contains_key(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        let id = self.blocks.insert(Block::new(name.clone(), kind));
        self.names.insert(name, id);
        Ok(id)
    }

    /// Adds a port to a block. A `None` name auto-generates `in{n}`/`out{n}`.
    pub fn add_port(
        &mut self,
        block: BlockId,
        dir: PortDir,
        name: Option<&str>,
        width: u32,
        role: PortRole,
    ) -> Result<PortId, NetlistError> {
        let owner = self.blocks.get(block).ok_or(NetlistError::InvalidBlock)?;
        let taken = |nl: &Self, b: &Block, candidate: &str| {
            b.ports().any(|p| nl.ports[p].name == candidate)
        };
        let name = match name {
            Some(n) => {
                if taken(self, owner, n) {
                    return Err(NetlistError::NameCollision(n.to_string()));
                }
                n.to_string()
            }
            None => {
                let prefix = match dir {
                    PortDir::In => "in",
                    PortDir::Out => "out",
                };
                let mut n = match dir {
                    PortDir::In => owner.inputs.len(),
                    PortDir::Out => owner.outputs.len(),
                } + 1;
                loop {
                    let candidate = format!("{prefix}{n}");
                    if !taken(self, owner, &candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        let id = self.ports.insert(Port {
            block,
            dir,
            name,
            width,
            role,
            delay: 0.0,
            channel: None,
        });
        let owner = &mut self.blocks[block];
        match dir {
            PortDir::In => owner.inputs.push(id),
            PortDir::Out => owner.outputs.push(id),
        }
        Ok(id)
    }

    /// Sets the propagation delay of a port.
    pub fn set_port_delay(&mut self, port: PortId, delay: f64) -> Result<(), NetlistError> {
        self.ports
            .get_mut(port)
            .ok_or(NetlistError::InvalidPort)?
            .delay = delay;
        Ok(())
    }

    /// Connects an output port to an input port.
    pub fn connect(&mut self, src: PortId, dst: PortId) -> Result<ChannelId, NetlistError> {
        let sp = self.ports.get(src).ok_or(NetlistError::InvalidPort)?;
        let dp = self.ports.get(dst).ok_or(NetlistError::InvalidPort)?;
        if sp.dir != PortDir::Out || dp.dir != PortDir::In {
            return Err(NetlistError::DirectionMismatch);
        }
        if sp.channel.is_some() {
            return Err(NetlistError::PortOccupied(sp.name.clone()));
        }
        if dp.channel.is_some() {
            return Err(NetlistError::PortOccupied(dp.name.clone()));
        }
        let id = self.channels.insert(Channel {
            src,
            dst,
            slots: 0,
            transparent: true,
            explicit_buffer: false,
            frequency: 1.0,
            back_edge: false,
        });
        self.ports[src].channel = Some(id);
        self.ports[dst].channel = Some(id);
        Ok(id)
    }

    /// Removes a channel, leaving both endpoints disconnected.
    pub fn disconnect(&mut self, channel: ChannelId) -> Result<(), NetlistError> {
        let ch = self
            .channels
            .remove(channel)
            .ok_or(NetlistError::InvalidChannel)?;
        if let Some(p) = self.ports.get_mut(ch.src) {
            p.channel = None;
        }
        if let Some(p) = self.ports.get_mut(ch.dst) {
            p.channel = None;
        }
        Ok(())
    }

    /// Removes a port, disconnecting its channel first.
    pub fn remove_port(&mut self, port: PortId) -> Result<(), NetlistError> {
        let p = self.ports.get(port).ok_or(NetlistError::InvalidPort)?;
        let owner = p.block;
        if let Some(ch) = p.channel {
            self.disconnect(ch)?;
        }
        let removed = self.ports.remove(port).ok_or(NetlistError::InvalidPort)?;
        if let Some(b) = self.blocks.get_mut(owner) {
            match removed.dir {
                PortDir::In => b.inputs.retain(|&q| q != port),
                PortDir::Out => b.outputs.retain(|&q| q != port),
            }
        }
        Ok(())
    }

    /// Removes a block together with all its ports and their channels.
    pub fn remove_block(&mut self, block: BlockId) -> Result<(), NetlistError> {
        let b = self.blocks.get(block).ok_or(NetlistError::InvalidBlock)?;
        let ports: Vec<PortId> = b.ports().collect();
        for p in ports {
            self.remove_port(p)?;
        }
        let removed = self.blocks.remove(block).ok_or(NetlistError::InvalidBlock)?;
        self.names.remove(&removed.name);
        Ok(())
    }

    // ---- buffers ----------------------------------------------------------

    /// Replaces a channel with `src -> buffer -> dst`, materializing an
    /// elastic buffer of the given size and transparency.
    ///
    /// The new upstream channel inherits the old frequency; the downstream
    /// channel additionally keeps the back-edge flag.
    pub fn insert_buffer(
        &mut self,
        channel: ChannelId,
        slots: u32,
        transparent: bool,
    ) -> Result<BlockId, NetlistError> {
        let ch = self
            .channels
            .get(channel)
            .ok_or(NetlistError::InvalidChannel)?;
        let (src, dst) = (ch.src, ch.dst);
        let (frequency, back_edge) = (ch.frequency, ch.back_edge);
        let width = self.port(src).width;
        self.disconnect(channel)?;
        let buf = self.add_block(BlockKind::Buffer, None)?;
        {
            let b = &mut self.blocks[buf];
            b.slots = slots;
            b.transparent = transparent;
        }
        let bin = self.add_port(buf, PortDir::In, Some("in1"), width, PortRole::Generic)?;
        let bout = self.add_port(buf, PortDir::Out, Some("out1"), width, PortRole::Generic)?;
        let up = self.connect(src, bin)?;
        self.channels[up].frequency = frequency;
        let down = self.connect(bout, dst)?;
        {
            let ch = &mut self.channels[down];
            ch.frequency = frequency;
            ch.back_edge = back_edge;
        }
        Ok(buf)
    }

    /// Removes an elastic-buffer block, reconnecting its neighbors and folding
    /// the buffer parameters back into the restored channel's annotation.
    pub fn remove_buffer(&mut self, block: BlockId) -> Result<ChannelId, NetlistError> {
        let b = self.blocks.get(block).ok_or(NetlistError::InvalidBlock)?;
        if b.kind != BlockKind::Buffer || b.inputs.len() != 1 || b.outputs.len() != 1 {
            return Err(NetlistError::NotABuffer(b.name.clone()));
        }
        let (slots, transparent) = (b.slots, b.transparent);
        let up = self.port(b.inputs[0]).channel.ok_or_else(|| {
            NetlistError::Malformed(format!("buffer `{}` has a dangling input", b.name))
        })?;
        let down = self.port(b.outputs[0]).channel.ok_or_else(|| {
            NetlistError::Malformed(format!("buffer `{}` has a dangling output", b.name))
        })?;
        let outer_src = self.channel(up).src;
        let outer_dst = self.channel(down).dst;
        let frequency = self.channel(down).frequency;
        let back_edge = self.channel(up).back_edge || self.channel(down).back_edge;
        self.remove_block(block)?;
        let restored = self.connect(outer_src, outer_dst)?;
        {
            let ch = &mut self.channels[restored];
            ch.frequency = frequency;
            ch.back_edge = back_edge;
            ch.slots = slots;
            ch.transparent = transparent;
            ch.explicit_buffer = true;
        }
        Ok(restored)
    }

    /// Folds every materialized buffer block back into channel annotations.
    pub fn hide_buffers(&mut self) -> Result<(), NetlistError> {
        let bufs: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.kind == BlockKind::Buffer)
            .map(|(id, _)| id)
            .collect();
        for b in bufs {
            self.remove_buffer(b)?;
        }
        Ok(())
    }

    /// Resets every channel's buffer annotation.
    pub fn clear_buffer_annotations(&mut self) {
        for (_, ch) in self.channels.iter_mut() {
            ch.slots = 0;
            ch.transparent = true;
            ch.explicit_buffer = false;
        }
    }

    // ---- queries ----------------------------------------------------------

    /// Combinational delay from an input port to an output port of one block:
    /// input port delay + block delay at the output's index + output port delay.
    pub fn combinational_delay(
        &self,
        in_port: PortId,
        out_port: PortId,
    ) -> Result<f64, NetlistError> {
        let pi = self.ports.get(in_port).ok_or(NetlistError::InvalidPort)?;
        let po = self.ports.get(out_port).ok_or(NetlistError::InvalidPort)?;
        if pi.block != po.block || pi.dir != PortDir::In || po.dir != PortDir::Out {
            return Err(NetlistError::DirectionMismatch);
        }
        let block = self.block(pi.block);
        let out_index = block
            .outputs
            .iter()
            .position(|&p| p == out_port)
            .ok_or(NetlistError::InvalidPort)?;
        Ok(pi.delay + block.delay_at(out_index) + po.delay)
    }

    /// Verifies structural well-formedness, returning the first violation.
    pub fn check(&self) -> Result<(), NetlistError> {
        for (id, port) in self.ports.iter() {
            let Some(owner) = self.blocks.get(port.block) else {
                return Err(NetlistError::Malformed(format!(
                    "port `{}` belongs to a dead block",
                    port.name
                )));
            };
            let listed = match port.dir {
                PortDir::In => owner.inputs.contains(&id),
                PortDir::Out => owner.outputs.contains(&id),
            };
            if !listed {
                return Err(NetlistError::Malformed(format!(
                    "port `{}` is not listed by block `{}`",
                    port.name, owner.name
                )));
            }
            if let Some(ch) = port.channel {
                let Some(channel) = self.channels.get(ch) else {
                    return Err(NetlistError::Malformed(format!(
                        "port `{}` references a dead channel",
                        port.name
                    )));
                };
                if channel.src != id && channel.dst != id {
                    return Err(NetlistError::Malformed(format!(
                        "port `{}` references a channel it is not an endpoint of",
                        port.name
                    )));
                }
            }
        }
        for (id, ch) in self.channels.iter() {
            let Some(src) = self.ports.get(ch.src) else {
                return Err(NetlistError::Malformed("channel with dead source".into()));
            };
            let Some(dst) = self.ports.get(ch.dst) else {
                return Err(NetlistError::Malformed(
                    "channel with dead destination".into(),
                ));
            };
            if src.dir != PortDir::Out || dst.dir != PortDir::In {
                return Err(NetlistError::Malformed(format!(
                    "channel `{}` -> `{}` has wrong port directions",
                    src.name, dst.name
                )));
            }
            if src.channel != Some(id) || dst.channel != Some(id) {
                return Err(NetlistError::Malformed(format!(
                    "channel `{}` -> `{}` is not referenced by its endpoints",
                    src.name, dst.name
                )));
            }
        }
        for (_, block) in self.blocks.iter() {
            for p in block.ports() {
                if !self.ports.contains(p) {
                    return Err(NetlistError::Malformed(format!(
                        "block `{}` lists a dead port",
                        block.name
                    )));
                }
            }
        }
        Ok(())
    }
}
