//! Byte-level IL assembler, the inverse of [`super::decode`].

use crate::error::SigError;
use crate::sig::codec::write_compressed;
use crate::sig::{ElementType, SigFlags};

use super::instruction::{Instruction, Operand};
use super::opcode::{EXTENDED_PREFIX, OpCode};

/// Appends encoded instructions to a growing buffer.
#[derive(Debug, Default, Clone)]
pub struct IlWriter {
    buf: Vec<u8>,
}

impl IlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be written at.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn opcode(&mut self, op: OpCode) {
        if op.is_two_byte() {
            self.buf.push(EXTENDED_PREFIX);
        }
        self.buf.push(op.value() as u8);
    }

    /// Operand-less instruction.
    pub fn op(&mut self, op: OpCode) -> &mut Self {
        self.opcode(op);
        self
    }

    pub fn op_i1(&mut self, op: OpCode, value: i8) -> &mut Self {
        self.opcode(op);
        self.buf.push(value as u8);
        self
    }

    pub fn op_i4(&mut self, op: OpCode, value: i32) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn op_i8(&mut self, op: OpCode, value: i64) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn op_r4(&mut self, op: OpCode, value: f32) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn op_r8(&mut self, op: OpCode, value: f64) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn op_var(&mut self, op: OpCode, index: u16) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&index.to_le_bytes());
        self
    }

    pub fn op_token(&mut self, op: OpCode, token: u32) -> &mut Self {
        self.opcode(op);
        self.buf.extend_from_slice(&token.to_le_bytes());
        self
    }

    pub fn op_switch(&mut self, deltas: &[i32]) -> &mut Self {
        self.opcode(OpCode::Switch);
        self.buf.extend_from_slice(&(deltas.len() as u32).to_le_bytes());
        for delta in deltas {
            self.buf.extend_from_slice(&delta.to_le_bytes());
        }
        self
    }

    /// Shortest encoding of an `int32` constant load.
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.op(OpCode::LdcI4M1),
            0 => self.op(OpCode::LdcI4_0),
            1 => self.op(OpCode::LdcI4_1),
            2 => self.op(OpCode::LdcI4_2),
            3 => self.op(OpCode::LdcI4_3),
            4 => self.op(OpCode::LdcI4_4),
            5 => self.op(OpCode::LdcI4_5),
            6 => self.op(OpCode::LdcI4_6),
            7 => self.op(OpCode::LdcI4_7),
            8 => self.op(OpCode::LdcI4_8),
            v if i8::try_from(v).is_ok() => self.op_i1(OpCode::LdcI4S, v as i8),
            v => self.op_i4(OpCode::LdcI4, v),
        }
    }

    pub fn ldarg(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Ldarg0),
            1 => self.op(OpCode::Ldarg1),
            2 => self.op(OpCode::Ldarg2),
            3 => self.op(OpCode::Ldarg3),
            i if i <= u8::MAX as u16 => self.op_i1(OpCode::LdargS, i as u8 as i8),
            i => self.op_var(OpCode::Ldarg, i),
        }
    }

    pub fn ldloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Ldloc0),
            1 => self.op(OpCode::Ldloc1),
            2 => self.op(OpCode::Ldloc2),
            3 => self.op(OpCode::Ldloc3),
            i if i <= u8::MAX as u16 => self.op_i1(OpCode::LdlocS, i as u8 as i8),
            i => self.op_var(OpCode::Ldloc, i),
        }
    }

    pub fn stloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.op(OpCode::Stloc0),
            1 => self.op(OpCode::Stloc1),
            2 => self.op(OpCode::Stloc2),
            3 => self.op(OpCode::Stloc3),
            i if i <= u8::MAX as u16 => self.op_i1(OpCode::StlocS, i as u8 as i8),
            i => self.op_var(OpCode::Stloc, i),
        }
    }

    pub fn ldloca(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.op_i1(OpCode::LdlocaS, index as u8 as i8)
        } else {
            self.op_var(OpCode::Ldloca, index)
        }
    }

    /// Re-encode a decoded instruction with its original operand shape.
    pub fn instruction(&mut self, instr: &Instruction) -> &mut Self {
        let op = instr.opcode();
        match instr.operand() {
            Operand::None => self.op(op),
            Operand::Int8(v) | Operand::ShortBranch(v) => self.op_i1(op, *v),
            Operand::ShortVar(v) => self.op_i1(op, *v as i8),
            Operand::Int32(v) | Operand::Branch(v) => self.op_i4(op, *v),
            Operand::Int64(v) => self.op_i8(op, *v),
            Operand::Float32(v) => self.op_r4(op, *v),
            Operand::Float64(v) => self.op_r8(op, *v),
            Operand::Var(v) => self.op_var(op, *v),
            Operand::Token(t) => self.op_token(op, t.token()),
            Operand::Switch(deltas) => self.op_switch(deltas),
        }
    }
}

/// Method signature blob over primitive element types, as referenced by
/// `calli` through a standalone signature token.
pub fn primitive_method_sig(has_this: bool, ret: ElementType, params: &[ElementType]) -> Result<Vec<u8>, SigError> {
    let mut flags = SigFlags::DEFAULT.bits();
    if has_this {
        flags |= SigFlags::HAS_THIS.bits();
    }
    let mut out = Vec::with_capacity(3 + params.len());
    write_compressed(&mut out, flags)?;
    write_compressed(&mut out, params.len() as u32)?;
    write_compressed(&mut out, ret as u32)?;
    for param in params {
        write_compressed(&mut out, *param as u32)?;
    }
    Ok(out)
}
