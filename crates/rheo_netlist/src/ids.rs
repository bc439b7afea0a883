//! Opaque ID newtypes for netlist entities.
//!
//! Each ID is a thin `u32` wrapper that is `Copy`, `Hash`, and
//! `Serialize`/`Deserialize`. IDs are created by the netlist mutators and used
//! for O(1) lookup. A removed entity's ID is never reissued, so holding on to
//! a stale ID is safe: validity queries simply report it as dead.

use crate::store::StoreId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl StoreId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a block (functional unit) in the netlist.
    BlockId
);

define_id!(
    /// Opaque, copyable ID for a port on a block.
    PortId
);

define_id!(
    /// Opaque, copyable ID for a channel connecting two ports.
    ChannelId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_roundtrip() {
        let id = BlockId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
    }

    #[test]
    fn id_equality() {
        let a = PortId::from_raw(7);
        let b = PortId::from_raw(7);
        let c = PortId::from_raw(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(ChannelId::from_raw(1));
        set.insert(ChannelId::from_raw(2));
        set.insert(ChannelId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = BlockId::from_raw(99);
        let json = serde_json::to_string(&id).unwrap();
        let restored: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }
}
