//! Netlist entity types: blocks, ports, and channels.

use crate::ids::{BlockId, ChannelId, PortId};
use serde::{Deserialize, Serialize};

/// The functional kind of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BlockKind {
    /// A generic combinational or pipelined operator (add, mul, cmp, ...).
    Operator,
    /// An elastic buffer: a FIFO of one or more slots on a channel.
    Buffer,
    /// Replicates one input token onto every output.
    Fork,
    /// Routes the data input to the true or false output by the selection input.
    Branch,
    /// Forwards whichever input arrives (confluence without a select).
    Merge,
    /// Forwards the data input chosen by the selection input.
    Mux,
    /// Routes one input to the output chosen by the selection input.
    Demux,
    /// Chooses between the true and false data inputs.
    Select,
    /// Emits a compile-time constant each time it fires.
    Constant,
    /// Circuit entry point (one per netlist at most).
    Entry,
    /// Circuit exit point.
    Exit,
    /// Produces an endless stream of tokens.
    Source,
    /// Consumes tokens.
    Sink,
    /// Merge that also reports which input fired.
    ControlMerge,
    /// Load/store queue.
    LoadStoreQueue,
    /// Memory controller.
    MemoryController,
    /// Sends each input token to one dynamically chosen output.
    Distributor,
    /// Picks one of several input tokens by priority.
    Selector,
    /// Placeholder for kinds this tool does not interpret.
    Unknown,
}

impl BlockKind {
    /// The canonical attribute spelling used by the dot format.
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Operator => "Operator",
            BlockKind::Buffer => "Buffer",
            BlockKind::Fork => "Fork",
            BlockKind::Branch => "Branch",
            BlockKind::Merge => "Merge",
            BlockKind::Mux => "Mux",
            BlockKind::Demux => "Demux",
            BlockKind::Select => "Select",
            BlockKind::Constant => "Constant",
            BlockKind::Entry => "Entry",
            BlockKind::Exit => "Exit",
            BlockKind::Source => "Source",
            BlockKind::Sink => "Sink",
            BlockKind::ControlMerge => "CntrlMerge",
            BlockKind::LoadStoreQueue => "LSQ",
            BlockKind::MemoryController => "MC",
            BlockKind::Distributor => "Distributor",
            BlockKind::Selector => "Selector",
            BlockKind::Unknown => "Unknown",
        }
    }

    /// Parses the dot-format spelling. Unrecognized kinds map to `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text {
            "Operator" => BlockKind::Operator,
            "Buffer" => BlockKind::Buffer,
            "Fork" => BlockKind::Fork,
            "Branch" => BlockKind::Branch,
            "Merge" => BlockKind::Merge,
            "Mux" => BlockKind::Mux,
            "Demux" => BlockKind::Demux,
            "Select" => BlockKind::Select,
            "Constant" => BlockKind::Constant,
            "Entry" => BlockKind::Entry,
            "Exit" => BlockKind::Exit,
            "Source" => BlockKind::Source,
            "Sink" => BlockKind::Sink,
            "CntrlMerge" => BlockKind::ControlMerge,
            "LSQ" => BlockKind::LoadStoreQueue,
            "MC" => BlockKind::MemoryController,
            "Distributor" => BlockKind::Distributor,
            "Selector" => BlockKind::Selector,
            _ => BlockKind::Unknown,
        }
    }
}

/// Direction of a port relative to its block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PortDir {
    /// Data flows into the block.
    In,
    /// Data flows out of the block.
    Out,
}

/// Role of a port within its block's handshake protocol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum PortRole {
    /// Ordinary data port.
    #[default]
    Generic,
    /// Selection input of a mux/demux/control merge.
    Selection,
    /// True-side port of a branch or select.
    True,
    /// False-side port of a branch or select.
    False,
}

/// A functional unit of the dataflow circuit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Unique non-empty name.
    pub name: String,
    /// Functional kind.
    pub kind: BlockKind,
    /// Combinational delay per output index. A missing index means 0.0.
    pub delays: Vec<f64>,
    /// Pipeline latency in cycles (0 = purely combinational).
    pub latency: u32,
    /// Initiation interval in cycles (>= 1).
    pub initiation_interval: u32,
    /// Steady-state execution frequency (executions per outermost iteration).
    pub frequency: f64,
    /// For select/branch blocks, the fraction of tokens taking the true side.
    pub true_fraction: f64,
    /// For buffer blocks, the number of FIFO slots.
    pub slots: u32,
    /// For buffer blocks, whether the buffer is transparent (combinational
    /// bypass) rather than opaque (registered).
    pub transparent: bool,
    /// Basic-block tag assigned by an external frontend, if any.
    pub basic_block: Option<u32>,
    /// For constant blocks, the emitted value.
    pub value: i64,
    /// Input ports in creation order.
    pub inputs: Vec<PortId>,
    /// Output ports in creation order.
    pub outputs: Vec<PortId>,
}

impl Block {
    pub(crate) fn new(name: String, kind: BlockKind) -> Self {
        Self {
            name,
            kind,
            delays: Vec::new(),
            latency: 0,
            initiation_interval: 1,
            frequency: 1.0,
            true_fraction: 0.5,
            slots: 0,
            transparent: false,
            basic_block: None,
            value: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Combinational delay at the given output index (0.0 when unset).
    pub fn delay_at(&self, output_index: usize) -> f64 {
        self.delays.get(output_index).copied().unwrap_or(0.0)
    }

    /// Iterates over all ports of the block, inputs first.
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }
}

/// One endpoint of the handshaked interface of a block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Port {
    /// The owning block (immutable for the lifetime of the port).
    pub block: BlockId,
    /// Direction relative to the owning block.
    pub dir: PortDir,
    /// Name, unique among the ports of the owning block.
    pub name: String,
    /// Data width in bits (0 = control-only token).
    pub width: u32,
    /// Handshake role.
    pub role: PortRole,
    /// Propagation delay contributed by the port itself.
    pub delay: f64,
    /// The channel connected to this port, if any.
    pub channel: Option<ChannelId>,
}

/// A point-to-point connection from an output port to an input port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    /// Source (an output port).
    pub src: PortId,
    /// Destination (an input port).
    pub dst: PortId,
    /// Annotated buffer slots to be realized on this channel.
    pub slots: u32,
    /// Whether the annotated buffer is transparent.
    pub transparent: bool,
    /// Set when the annotation stems from a materialized buffer block that
    /// was folded back into the channel.
    pub explicit_buffer: bool,
    /// Steady-state token frequency.
    pub frequency: f64,
    /// Whether the channel crosses a control-flow back arc.
    pub back_edge: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_spelling_roundtrip() {
        for kind in [
            BlockKind::Operator,
            BlockKind::Buffer,
            BlockKind::Fork,
            BlockKind::Branch,
            BlockKind::Merge,
            BlockKind::Mux,
            BlockKind::Demux,
            BlockKind::Select,
            BlockKind::Constant,
            BlockKind::Entry,
            BlockKind::Exit,
            BlockKind::Source,
            BlockKind::Sink,
            BlockKind::ControlMerge,
            BlockKind::LoadStoreQueue,
            BlockKind::MemoryController,
            BlockKind::Distributor,
            BlockKind::Selector,
        ] {
            assert_eq!(BlockKind::parse(kind.as_str()), kind);
        }
        assert_eq!(BlockKind::parse("frobnicator"), BlockKind::Unknown);
    }

    #[test]
    fn delay_defaults_to_zero() {
        let mut b = Block::new("b".to_string(), BlockKind::Operator);
        b.delays = vec![1.5];
        assert_eq!(b.delay_at(0), 1.5);
        assert_eq!(b.delay_at(3), 0.0);
    }
}
