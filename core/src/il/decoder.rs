use std::sync::Arc;

use tracing::trace;

use crate::error::DecodeError;

use super::instruction::{Instruction, Operand};
use super::opcode::{EXTENDED_PREFIX, OpCode, OperandType};
use super::token::{TokenRef, TokenResolver};

/// A method body that can be decoded any number of times.
#[derive(Clone)]
pub struct InstructionStream {
    bytes: Arc<[u8]>,
    resolver: Arc<dyn TokenResolver>,
}

impl InstructionStream {
    pub fn new(bytes: impl Into<Arc<[u8]>>, resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            bytes: bytes.into(),
            resolver,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Start a fresh forward pass over the body.
    pub fn iter(&self) -> Decoder<'_> {
        Decoder::new(&self.bytes, self.resolver.clone())
    }

    /// Decode the whole body, requiring every byte to be consumed.
    pub fn decode_all(&self) -> Result<Vec<Instruction>, DecodeError> {
        decode(&self.bytes, self.resolver.clone())
    }
}

/// Forward-only decoder over a byte buffer.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    resolver: Arc<dyn TokenResolver>,
    failed: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8], resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            bytes,
            pos: 0,
            resolver,
            failed: false,
        }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.pos + N > self.bytes.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos as u32,
                needed: self.pos + N - self.bytes.len(),
            });
        }
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.take::<1>().map(|b| b[0])
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn read_opcode(&mut self) -> Result<OpCode, DecodeError> {
        let offset = self.pos as u32;
        let first = self.read_u8()?;
        if first != EXTENDED_PREFIX {
            return OpCode::from_primary(first).ok_or(DecodeError::UnknownOpcode {
                offset,
                byte: first,
                extended: false,
            });
        }
        let second = self.read_u8()?;
        OpCode::from_extended(second).ok_or(DecodeError::UnknownOpcode {
            offset,
            byte: second,
            extended: true,
        })
    }

    fn read_operand(&mut self, operand: OperandType) -> Result<Operand, DecodeError> {
        Ok(match operand {
            OperandType::InlineNone => Operand::None,
            OperandType::ShortInlineBrTarget => Operand::ShortBranch(self.read_u8()? as i8),
            OperandType::InlineBrTarget => Operand::Branch(self.read_i32()?),
            OperandType::ShortInlineI => Operand::Int8(self.read_u8()? as i8),
            OperandType::InlineI => Operand::Int32(self.read_i32()?),
            OperandType::InlineI8 => Operand::Int64(self.take::<8>().map(i64::from_le_bytes)?),
            OperandType::ShortInlineR => Operand::Float32(self.take::<4>().map(f32::from_le_bytes)?),
            OperandType::InlineR => Operand::Float64(self.take::<8>().map(f64::from_le_bytes)?),
            OperandType::ShortInlineVar => Operand::ShortVar(self.read_u8()?),
            OperandType::InlineVar => Operand::Var(self.take::<2>().map(u16::from_le_bytes)?),
            OperandType::InlineString
            | OperandType::InlineSig
            | OperandType::InlineMethod
            | OperandType::InlineField
            | OperandType::InlineType
            | OperandType::InlineTok => Operand::Token(TokenRef::new(self.read_u32()?, self.resolver.clone())),
            OperandType::InlineSwitch => {
                let count = self.read_u32()? as usize;
                // Bound the allocation by what the buffer can actually hold.
                let available = (self.bytes.len() - self.pos) / 4;
                if count > available {
                    return Err(DecodeError::Truncated {
                        offset: self.pos as u32,
                        needed: (count - available) * 4,
                    });
                }
                let mut deltas = Vec::with_capacity(count);
                for _ in 0..count {
                    deltas.push(self.read_i32()?);
                }
                Operand::Switch(deltas.into())
            }
        })
    }

    fn next_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.pos as u32;
        let opcode = self.read_opcode()?;
        let operand = self.read_operand(opcode.operand_type())?;
        let instr = Instruction::new(offset, opcode, operand);
        trace!(target: "ilpartial::decode", "{instr}");
        Ok(instr)
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let item = self.next_instruction();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Decode `bytes` into instructions, resolving tokens lazily through `resolver`.
pub fn decode(bytes: &[u8], resolver: Arc<dyn TokenResolver>) -> Result<Vec<Instruction>, DecodeError> {
    let mut decoder = Decoder::new(bytes, resolver);
    let mut out = Vec::new();
    for instr in decoder.by_ref() {
        out.push(instr?);
    }
    if decoder.consumed() != bytes.len() {
        return Err(DecodeError::LengthMismatch {
            consumed: decoder.consumed(),
            len: bytes.len(),
        });
    }
    Ok(out)
}
