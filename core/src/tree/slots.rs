use crate::util::{FastHashMap, fast_hash_map_new};

use super::packet::{PacketId, PacketTree};

/// Every packet that loads, stores or takes the address of each local slot.
#[derive(Debug, Clone, Default)]
pub struct LocalSlotIndex {
    slots: FastHashMap<u16, Vec<PacketId>>,
}

impl LocalSlotIndex {
    pub fn build(tree: &PacketTree) -> Self {
        let mut slots: FastHashMap<u16, Vec<PacketId>> = fast_hash_map_new();
        for id in tree.ids() {
            if let Some(slot) = tree.instruction(id).local_index() {
                slots.entry(slot).or_default().push(id);
            }
        }
        Self { slots }
    }

    pub fn refs(&self, slot: u16) -> &[PacketId] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ref_count(&self, slot: u16) -> usize {
        self.refs(slot).len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
