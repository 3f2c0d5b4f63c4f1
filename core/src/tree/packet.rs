use std::fmt;
use std::ops::Range;

use crate::il::Instruction;

/// Index of a packet inside its [`PacketTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub(crate) u32);

impl PacketId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One instruction together with the packets that produced its operands.
#[derive(Debug, Clone)]
pub struct Packet {
    pub(crate) instr: Instruction,
    /// Range into [`PacketTree::child_ids`], left-to-right operand order
    pub(crate) children: Range<u32>,
    /// Packet whose value a `dup` re-pushes
    pub(crate) dup_of: Option<PacketId>,
    /// Whether this packet leaves a value on the stack
    pub(crate) has_value: bool,
}

impl Packet {
    #[inline]
    pub fn instruction(&self) -> &Instruction {
        &self.instr
    }

    #[inline]
    pub fn dup_of(&self) -> Option<PacketId> {
        self.dup_of
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn child_count(&self) -> usize {
        (self.children.end - self.children.start) as usize
    }
}

/// Arena of packets produced by one simulated execution.
#[derive(Debug, Clone, Default)]
pub struct PacketTree {
    pub(crate) packets: Vec<Packet>,
    pub(crate) child_ids: Vec<PacketId>,
    /// Packets left on the stack at the end, bottom to top
    pub(crate) roots: Vec<PacketId>,
}

impl PacketTree {
    #[inline]
    pub fn get(&self, id: PacketId) -> &Packet {
        &self.packets[id.index()]
    }

    #[inline]
    pub fn instruction(&self, id: PacketId) -> &Instruction {
        &self.get(id).instr
    }

    pub fn children(&self, id: PacketId) -> &[PacketId] {
        let range = &self.get(id).children;
        &self.child_ids[range.start as usize..range.end as usize]
    }

    /// Top-level expressions in the order they completed.
    pub fn roots(&self) -> &[PacketId] {
        &self.roots
    }

    /// The final tail expression.
    pub fn top(&self) -> Option<PacketId> {
        self.roots.last().copied()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PacketId> + '_ {
        (0..self.packets.len() as u32).map(PacketId)
    }

    /// Packets of the subtree rooted at `id`, operands before their consumer.
    ///
    /// This is the order the instructions have to be emitted in to rebuild
    /// the subtree's value.
    pub fn post_order(&self, id: PacketId) -> Vec<PacketId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            for &child in self.children(node).iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    pub(crate) fn push(&mut self, instr: Instruction, children: &[PacketId], dup_of: Option<PacketId>, has_value: bool) -> PacketId {
        let start = self.child_ids.len() as u32;
        self.child_ids.extend_from_slice(children);
        let id = PacketId(self.packets.len() as u32);
        self.packets.push(Packet {
            instr,
            children: start..self.child_ids.len() as u32,
            dup_of,
            has_value,
        });
        id
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: PacketId, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.instruction(id), indent = depth * 2)?;
        for &child in self.children(id) {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PacketTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &root in &self.roots {
            self.fmt_node(f, root, 0)?;
        }
        Ok(())
    }
}
