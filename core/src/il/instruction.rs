use std::fmt;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::sig::SignatureReader;

use super::opcode::{OpCode, StackPop, StackPush};
use super::token::TokenRef;

/// Decoded operand payload.
#[derive(Debug, Clone)]
pub enum Operand {
    None,
    Int8(i8),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Branch delta relative to the next instruction.
    ShortBranch(i8),
    Branch(i32),
    ShortVar(u8),
    Var(u16),
    Token(TokenRef),
    /// Switch table deltas relative to the next instruction.
    Switch(Arc<[i32]>),
}

impl Operand {
    /// Encoded width of this operand in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Operand::None => 0,
            Operand::Int8(_) | Operand::ShortBranch(_) | Operand::ShortVar(_) => 1,
            Operand::Var(_) => 2,
            Operand::Int32(_) | Operand::Float32(_) | Operand::Branch(_) | Operand::Token(_) => 4,
            Operand::Int64(_) | Operand::Float64(_) => 8,
            Operand::Switch(targets) => 4 + 4 * targets.len(),
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    offset: u32,
    opcode: OpCode,
    operand: Operand,
}

impl Instruction {
    pub fn new(offset: u32, opcode: OpCode, operand: Operand) -> Self {
        Self { offset, opcode, operand }
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    #[inline]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Encoded size including the opcode bytes.
    pub fn size(&self) -> u32 {
        (self.opcode.encoded_len() + self.operand.encoded_len()) as u32
    }

    #[inline]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size()
    }

    /// Absolute target offset of a branch.
    pub fn branch_target(&self) -> Option<u32> {
        let delta = match self.operand {
            Operand::ShortBranch(d) => d as i64,
            Operand::Branch(d) => d as i64,
            _ => return None,
        };
        Some((self.next_offset() as i64 + delta) as u32)
    }

    /// Absolute targets of a switch table.
    pub fn switch_targets(&self) -> Option<Vec<u32>> {
        match &self.operand {
            Operand::Switch(deltas) => {
                let base = self.next_offset() as i64;
                Some(deltas.iter().map(|d| (base + *d as i64) as u32).collect())
            }
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&TokenRef> {
        match &self.operand {
            Operand::Token(t) => Some(t),
            _ => None,
        }
    }

    fn var_operand(&self) -> Option<u16> {
        match self.operand {
            Operand::ShortVar(v) => Some(v as u16),
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Local slot touched by a load, store or address-of instruction.
    pub fn local_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            OpCode::LdlocS
            | OpCode::LdlocaS
            | OpCode::StlocS
            | OpCode::Ldloc
            | OpCode::Ldloca
            | OpCode::Stloc => self.var_operand(),
            _ => None,
        }
    }

    /// Argument slot touched by a load, store or address-of instruction.
    pub fn arg_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            OpCode::LdargS
            | OpCode::LdargaS
            | OpCode::StargS
            | OpCode::Ldarg
            | OpCode::Ldarga
            | OpCode::Starg => self.var_operand(),
            _ => None,
        }
    }

    /// Value pushed by an integer constant load.
    pub fn int_literal(&self) -> Option<i64> {
        Some(match self.opcode {
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
            OpCode::LdcI4S | OpCode::LdcI4 | OpCode::LdcI8 => match self.operand {
                Operand::Int8(v) => v as i64,
                Operand::Int32(v) => v as i64,
                Operand::Int64(v) => v,
                _ => return None,
            },
            _ => return None,
        })
    }

    /// Value pushed by a floating-point constant load.
    pub fn float_literal(&self) -> Option<f64> {
        match (self.opcode, &self.operand) {
            (OpCode::LdcR4, Operand::Float32(v)) => Some(*v as f64),
            (OpCode::LdcR8, Operand::Float64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Values this instruction removes from the evaluation stack.
    ///
    /// `returns_value` describes the enclosing routine and only matters for `ret`.
    pub fn stack_pops(&self, returns_value: bool) -> Result<u32, DecodeError> {
        match self.opcode.info().pop {
            StackPop::Fixed(n) => Ok(n as u32),
            StackPop::Var => match self.opcode {
                OpCode::Ret => Ok(u32::from(returns_value)),
                OpCode::Newobj => Ok(self.expect_token()?.method()?.params.len() as u32),
                OpCode::Call | OpCode::Callvirt => Ok(self.expect_token()?.method()?.call_pops()),
                OpCode::Calli => {
                    let blob = self.expect_token()?.signature()?;
                    let sig = SignatureReader::new(blob).read_method()?;
                    // The function pointer itself sits on top of the arguments.
                    Ok(sig.stack_pops() + 1)
                }
                _ => Ok(0),
            },
        }
    }

    /// Values this instruction leaves on the evaluation stack.
    pub fn stack_pushes(&self) -> Result<u32, DecodeError> {
        match self.opcode.info().push {
            StackPush::Fixed(n) => Ok(n as u32),
            StackPush::Var => match self.opcode {
                OpCode::Call | OpCode::Callvirt => Ok(u32::from(self.expect_token()?.method()?.returns_value())),
                OpCode::Calli => {
                    let blob = self.expect_token()?.signature()?;
                    let sig = SignatureReader::new(blob).read_method()?;
                    Ok(u32::from(sig.returns_value()))
                }
                _ => Ok(0),
            },
        }
    }

    fn expect_token(&self) -> Result<&TokenRef, DecodeError> {
        self.token().ok_or(DecodeError::TokenKind {
            token: 0,
            expected: "token operand",
            found: "inline operand",
        })
    }
}

/// Width of the `IL_xxxx: ` offset label that starts every disassembled line.
pub const LABEL_WIDTH: usize = "IL_0000: ".len();

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(v) => write!(f, " {v}"),
            Operand::Int32(v) => write!(f, " {v}"),
            Operand::Int64(v) => write!(f, " {v}"),
            Operand::Float32(v) => write!(f, " {v}"),
            Operand::Float64(v) => write!(f, " {v}"),
            Operand::ShortBranch(_) | Operand::Branch(_) => {
                write!(f, " IL_{:04x}", self.branch_target().unwrap_or_default())
            }
            Operand::ShortVar(v) => write!(f, " {v}"),
            Operand::Var(v) => write!(f, " {v}"),
            Operand::Token(t) => write!(f, " {t}"),
            Operand::Switch(_) => {
                let targets = self.switch_targets().unwrap_or_default();
                f.write_str(" (")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "IL_{t:04x}")?;
                }
                f.write_str(")")
            }
        }
    }
}
