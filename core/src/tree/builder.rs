use tracing::trace;

use crate::error::TreeError;
use crate::il::{Instruction, OpCode};

use super::packet::{PacketId, PacketTree};

/// Replays a straight-line instruction sequence over an abstract stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder {
    /// Whether the enclosing routine returns a value (drives `ret` arity)
    pub returns_value: bool,
    /// Emit a trace event for every packet pushed
    pub trace_packets: bool,
}

impl TreeBuilder {
    pub fn new(returns_value: bool) -> Self {
        Self {
            returns_value,
            trace_packets: false,
        }
    }

    pub fn trace_packets(mut self, on: bool) -> Self {
        self.trace_packets = on;
        self
    }

    pub fn build(&self, instrs: &[Instruction]) -> Result<PacketTree, TreeError> {
        let mut tree = PacketTree::default();
        // Everything currently on the abstract stack; value-less packets stay
        // in place as statements and are skipped when collecting operands.
        let mut stack: Vec<PacketId> = Vec::new();
        let mut operands: Vec<PacketId> = Vec::new();

        for instr in instrs {
            let opcode = instr.opcode();
            if opcode.is_tree_disallowed() {
                return Err(TreeError::Disallowed {
                    offset: instr.offset(),
                    opcode,
                });
            }

            let (id, children) = if opcode == OpCode::Dup {
                let top = stack
                    .iter()
                    .rev()
                    .copied()
                    .find(|id| tree.get(*id).has_value())
                    .ok_or(TreeError::StackUnderflow {
                        offset: instr.offset(),
                        opcode,
                        needed: 1,
                        available: 0,
                    })?;
                (tree.push(instr.clone(), &[], Some(top), true), 0)
            } else {
                let needed = instr.stack_pops(self.returns_value)?;
                take_operands(&tree, &mut stack, needed, &mut operands).map_err(|available| {
                    TreeError::StackUnderflow {
                        offset: instr.offset(),
                        opcode,
                        needed,
                        available,
                    }
                })?;
                let has_value = instr.stack_pushes()? > 0;
                (tree.push(instr.clone(), &operands, None, has_value), operands.len())
            };

            if self.trace_packets {
                trace!(target: "ilpartial::tree", packet = id.index(), children, "{instr}");
            }
            stack.push(id);
        }

        tree.roots = stack;
        Ok(tree)
    }
}

/// Remove the `needed` topmost value-producing packets from `stack`, writing
/// them to `out` in left-to-right order. On underflow returns how many
/// values were available.
fn take_operands(tree: &PacketTree, stack: &mut Vec<PacketId>, needed: u32, out: &mut Vec<PacketId>) -> Result<(), usize> {
    out.clear();
    if needed == 0 {
        return Ok(());
    }
    let mut positions = Vec::with_capacity(needed as usize);
    for (pos, id) in stack.iter().enumerate().rev() {
        if tree.get(*id).has_value() {
            positions.push(pos);
            if positions.len() == needed as usize {
                break;
            }
        }
    }
    if positions.len() < needed as usize {
        return Err(positions.len());
    }
    // `positions` runs top-down; remove from the top so earlier indices stay valid.
    for &pos in &positions {
        out.push(stack.remove(pos));
    }
    out.reverse();
    Ok(())
}

/// Build a packet tree with default settings.
pub fn build(instrs: &[Instruction], returns_value: bool) -> Result<PacketTree, TreeError> {
    TreeBuilder::new(returns_value).build(instrs)
}
