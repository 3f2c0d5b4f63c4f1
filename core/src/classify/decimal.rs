use crate::error::ClassifyError;
use crate::il::OpCode;
use crate::meta::{Decimal, TypeKind};
use crate::tree::{PacketId, PacketTree};

const FIELDS: [&str; 5] = ["lo", "mid", "hi", "sign", "scale"];

/// Decode a `newobj Decimal(lo, mid, hi, sign, scale)` whose five operands
/// are all integer literals. `Ok(None)` when the packet has another shape.
pub(crate) fn composite(tree: &PacketTree, packet: PacketId) -> Result<Option<Decimal>, ClassifyError> {
    let instr = tree.instruction(packet);
    if instr.opcode() != OpCode::Newobj {
        return Ok(None);
    }
    let Some(token) = instr.token() else {
        return Ok(None);
    };
    let ctor = token.method()?;
    if !matches!(ctor.declaring.kind(), TypeKind::Decimal) || ctor.params.len() != FIELDS.len() {
        return Ok(None);
    }
    let children = tree.children(packet);
    if children.len() != FIELDS.len() {
        return Ok(None);
    }

    let mut parts = [0i64; 5];
    for (part, &child) in parts.iter_mut().zip(children) {
        match tree.instruction(child).int_literal() {
            Some(v) => *part = v,
            None => return Ok(None),
        }
    }
    let [lo, mid, hi, sign, scale] = parts;
    if !(0..=1).contains(&sign) {
        return Err(ClassifyError::MalformedComposite {
            field: FIELDS[3],
            value: sign,
        });
    }
    if !(0..=Decimal::MAX_SCALE as i64).contains(&scale) {
        return Err(ClassifyError::MalformedComposite {
            field: FIELDS[4],
            value: scale,
        });
    }
    Ok(Some(Decimal::from_parts(
        lo as u32,
        mid as u32,
        hi as u32,
        sign == 1,
        scale as u8,
    )))
}
