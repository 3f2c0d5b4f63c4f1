//! Instruction stream model: opcode tables, operands, token resolution, the
//! decoder and a matching writer.

mod decoder;
mod instruction;
mod opcode;
mod token;
pub mod writer;

pub use decoder::{Decoder, InstructionStream, decode};
pub use instruction::{Instruction, LABEL_WIDTH, Operand};
pub use opcode::{EXTENDED_PREFIX, OpCode, OpInfo, OperandType, StackPop, StackPush};
pub use token::{Member, Resolved, TokenRef, TokenResolver, TokenTable};
pub use writer::IlWriter;

#[cfg(test)]
mod decoder_test;
