//! Error types for netlist construction and analysis.

use thiserror::Error;

/// Errors produced by netlist mutators and checks.
///
/// Every failing operation leaves the netlist unchanged.
#[derive(Debug, Error)]
pub enum NetlistError {
    /// A block or port name is already taken in its scope.
    #[error("name `{0}` is already taken")]
    NameCollision(String),

    /// A block ID refers to a removed or never-created block.
    #[error("invalid block id")]
    InvalidBlock,

    /// A port ID refers to a removed or never-created port.
    #[error("invalid port id")]
    InvalidPort,

    /// A channel ID refers to a removed or never-created channel.
    #[error("invalid channel id")]
    InvalidChannel,

    /// A channel must run from an output port to an input port.
    #[error("channel must connect an output port to an input port")]
    DirectionMismatch,

    /// The port already carries a channel.
    #[error("port `{0}` is already connected")]
    PortOccupied(String),

    /// The operation requires an elastic-buffer block.
    #[error("block `{0}` is not an elastic buffer")]
    NotABuffer(String),

    /// A structural well-formedness violation found by [`check`](crate::Netlist::check).
    #[error("malformed netlist: {0}")]
    Malformed(String),
}
