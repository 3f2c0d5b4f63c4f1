//! Recognition of constructor arguments left at their declared default.
//!
//! A verdict of `false` means the call site is assumed to pass an
//! intentional value; only shapes the compiler emits for a default are
//! recognized.

mod decimal;

use crate::error::ClassifyError;
use crate::il::{Instruction, OpCode};
use crate::meta::{DefaultValue, IntWidth, TypeRef};
use crate::tree::{LocalSlotIndex, PacketId, PacketTree};

/// Classifies argument packets of one packet tree.
pub struct DefaultClassifier<'t> {
    tree: &'t PacketTree,
    slots: &'t LocalSlotIndex,
    recognize_struct_defaults: bool,
}

impl<'t> DefaultClassifier<'t> {
    pub fn new(tree: &'t PacketTree, slots: &'t LocalSlotIndex) -> Self {
        Self {
            tree,
            slots,
            recognize_struct_defaults: true,
        }
    }

    pub fn recognize_struct_defaults(mut self, on: bool) -> Self {
        self.recognize_struct_defaults = on;
        self
    }

    /// Whether `packet` evaluates to `default` for a parameter of type `ty`.
    pub fn is_default(&self, packet: PacketId, ty: &TypeRef, default: &DefaultValue) -> Result<bool, ClassifyError> {
        let instr = self.tree.instruction(packet);
        Ok(match default {
            DefaultValue::Int { value, width } => self.is_int(packet, *value, *width),
            DefaultValue::F32(v) => float_matches(instr, *v as f64),
            DefaultValue::F64(v) => float_matches(instr, *v),
            DefaultValue::Decimal(d) => decimal::composite(self.tree, packet)?.is_some_and(|lit| lit == *d),
            DefaultValue::Bool(b) => {
                let expected = if *b { OpCode::LdcI4_1 } else { OpCode::LdcI4_0 };
                instr.opcode() == expected
            }
            DefaultValue::Null if ty.is_value_type() => self.recognize_struct_defaults && self.is_struct_default(instr),
            DefaultValue::Null => instr.opcode() == OpCode::Ldnull,
        })
    }

    fn is_int(&self, packet: PacketId, value: i128, width: IntWidth) -> bool {
        let mut instr = self.tree.instruction(packet);
        let mut zero_extend = false;
        if let (OpCode::ConvI8 | OpCode::ConvU8 | OpCode::ConvI | OpCode::ConvU, [inner]) =
            (instr.opcode(), self.tree.children(packet))
        {
            zero_extend = matches!(instr.opcode(), OpCode::ConvU8 | OpCode::ConvU);
            instr = self.tree.instruction(*inner);
        }
        let Some(raw) = short_constant(instr.opcode()).or_else(|| instr.int_literal()) else {
            return false;
        };
        let raw = if zero_extend && instr.opcode() != OpCode::LdcI8 {
            raw as i32 as u32 as i64
        } else {
            raw
        };
        width.normalize(raw) == value
    }

    /// A local that is initialized once and read once: `ldloca; initobj; ldloc`.
    fn is_struct_default(&self, instr: &Instruction) -> bool {
        instr
            .local_index()
            .is_some_and(|slot| self.slots.ref_count(slot) == 2)
    }
}

fn short_constant(opcode: OpCode) -> Option<i64> {
    Some(match opcode {
        OpCode::LdcI4M1 => -1,
        OpCode::LdcI4_0 => 0,
        OpCode::LdcI4_1 => 1,
        OpCode::LdcI4_2 => 2,
        OpCode::LdcI4_3 => 3,
        OpCode::LdcI4_4 => 4,
        OpCode::LdcI4_5 => 5,
        OpCode::LdcI4_6 => 6,
        OpCode::LdcI4_7 => 7,
        OpCode::LdcI4_8 => 8,
        _ => return None,
    })
}

fn float_matches(instr: &Instruction, expected: f64) -> bool {
    instr
        .float_literal()
        .is_some_and(|v| v == expected || (v.is_nan() && expected.is_nan()))
}
