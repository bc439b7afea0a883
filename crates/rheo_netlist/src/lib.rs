//! rheo_netlist — the dataflow-circuit netlist model.
//!
//! Defines the graph of [`Block`]s, [`Port`]s, and [`Channel`]s that all
//! other crates operate on, together with control-flow (basic-block)
//! analysis, strongly-connected-region extraction, and dot-format
//! persistence.

#![warn(missing_docs)]

pub mod bb;
pub mod dot;
mod entity;
mod error;
mod ids;
mod netlist;
pub mod regions;
mod store;

pub use entity::{Block, BlockKind, Channel, Port, PortDir, PortRole};
pub use error::NetlistError;
pub use ids::{BlockId, ChannelId, PortId};
pub use netlist::Netlist;
pub use store::{Store, StoreId};
