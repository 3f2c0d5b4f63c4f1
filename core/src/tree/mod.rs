//! Expression trees rebuilt from a linear instruction sequence.
//!
//! Packets live in an arena and refer to their operands by [`PacketId`];
//! the builder never looks at branch structure, so the input must be a
//! straight-line sequence.

mod builder;
mod packet;
mod slots;

pub use builder::{TreeBuilder, build};
pub use packet::{Packet, PacketId, PacketTree};
pub use slots::LocalSlotIndex;
