use std::sync::Arc;

use super::*;
use crate::error::DecodeError;
use crate::meta::{MethodRef, ParamInfo, Primitive, TypeRef};
use crate::sig::ElementType;

fn empty() -> Arc<dyn TokenResolver> {
    Arc::new(TokenTable::new())
}

#[test]
fn decodes_every_operand_width() {
    let mut w = IlWriter::new();
    w.op(OpCode::Nop)
        .op_i1(OpCode::LdcI4S, -3)
        .op_i4(OpCode::LdcI4, 70_000)
        .op_i8(OpCode::LdcI8, -1)
        .op_r4(OpCode::LdcR4, 1.5)
        .op_r8(OpCode::LdcR8, 2.25)
        .op_var(OpCode::Ldloc, 300)
        .op_i1(OpCode::LdargS, 7)
        .op(OpCode::Ret);
    let bytes = w.finish();

    let instrs = decode(&bytes, empty()).expect("decode");
    let ops: Vec<_> = instrs.iter().map(|i| i.opcode()).collect();
    assert_eq!(
        ops,
        vec![
            OpCode::Nop,
            OpCode::LdcI4S,
            OpCode::LdcI4,
            OpCode::LdcI8,
            OpCode::LdcR4,
            OpCode::LdcR8,
            OpCode::Ldloc,
            OpCode::LdargS,
            OpCode::Ret
        ]
    );
    assert_eq!(instrs[1].int_literal(), Some(-3));
    assert_eq!(instrs[2].int_literal(), Some(70_000));
    assert_eq!(instrs[3].int_literal(), Some(-1));
    assert_eq!(instrs[4].float_literal(), Some(1.5));
    assert_eq!(instrs[5].float_literal(), Some(2.25));
    assert_eq!(instrs[6].local_index(), Some(300));
    assert_eq!(instrs[7].arg_index(), Some(7));

    // Offsets advance by the encoded size, two-byte opcodes included.
    assert_eq!(instrs[6].offset(), 1 + 2 + 5 + 9 + 5 + 9);
    assert_eq!(instrs[6].size(), 4);
    assert_eq!(instrs[8].next_offset() as usize, bytes.len());
}

#[test]
fn short_constant_forms_carry_their_value() {
    let mut w = IlWriter::new();
    for v in -1..=8 {
        w.ldc_i4(v);
    }
    let instrs = decode(&w.finish(), empty()).expect("decode");
    let values: Vec<_> = instrs.iter().map(|i| i.int_literal()).collect();
    assert_eq!(values, (-1..=8).map(|v| Some(v as i64)).collect::<Vec<_>>());
    assert!(instrs.iter().all(|i| i.size() == 1));
}

#[test]
fn unknown_primary_opcode_is_rejected() {
    let err = decode(&[0x00, 0x24], empty()).expect_err("0x24 is unassigned");
    assert!(matches!(
        err,
        DecodeError::UnknownOpcode {
            offset: 1,
            byte: 0x24,
            extended: false
        }
    ));
}

#[test]
fn unknown_extended_opcode_is_rejected() {
    let err = decode(&[EXTENDED_PREFIX, 0x08], empty()).expect_err("fe 08 is unassigned");
    assert!(matches!(
        err,
        DecodeError::UnknownOpcode {
            offset: 0,
            byte: 0x08,
            extended: true
        }
    ));
}

#[test]
fn truncated_operand_is_reported() {
    // ldc.i4 with only two of its four operand bytes.
    let err = decode(&[0x20, 0x01, 0x02], empty()).expect_err("truncated");
    assert!(matches!(err, DecodeError::Truncated { offset: 1, needed: 2 }));

    let err = decode(&[EXTENDED_PREFIX], empty()).expect_err("missing second byte");
    assert!(matches!(err, DecodeError::Truncated { offset: 1, needed: 1 }));
}

#[test]
fn switch_table_is_decoded_with_absolute_targets() {
    let mut w = IlWriter::new();
    w.op(OpCode::Ldarg0).op_switch(&[0, 2, -3]).op(OpCode::Ret);
    let instrs = decode(&w.finish(), empty()).expect("decode");
    let switch = &instrs[1];
    assert_eq!(switch.size(), 1 + 4 + 12);
    let next = switch.next_offset();
    assert_eq!(switch.switch_targets(), Some(vec![next, next + 2, next - 3]));
}

#[test]
fn oversized_switch_count_is_truncation() {
    let mut bytes = vec![0x45];
    bytes.extend_from_slice(&1000u32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    let err = decode(&bytes, empty()).expect_err("count exceeds buffer");
    assert!(matches!(err, DecodeError::Truncated { .. }));
}

#[test]
fn branch_targets_are_absolute() {
    let mut w = IlWriter::new();
    w.op_i1(OpCode::BrS, 0).op_i4(OpCode::Br, -5).op(OpCode::Ret);
    let instrs = decode(&w.finish(), empty()).expect("decode");
    assert_eq!(instrs[0].branch_target(), Some(instrs[0].next_offset()));
    assert_eq!(instrs[1].branch_target(), Some(2));
    assert_eq!(instrs[0].to_string(), "IL_0000: br.s IL_0002");
}

#[test]
fn tokens_resolve_lazily_and_once() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(TypeRef::class("App.Widget"), vec![]));
    let mut w = IlWriter::new();
    w.op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
    let instrs = decode(&w.finish(), Arc::new(table)).expect("decode");

    let token = instrs[0].token().expect("token operand");
    assert!(!token.is_resolved());
    assert_eq!(token.method().expect("method").declaring.name(), "App.Widget");
    assert!(token.is_resolved());
    assert_eq!(instrs[0].to_string(), "IL_0000: newobj App.Widget::.ctor()");
}

#[test]
fn unresolvable_token_surfaces_on_access() {
    let mut w = IlWriter::new();
    w.op_token(OpCode::Ldstr, 0x7000_0042);
    let instrs = decode(&w.finish(), empty()).expect("decoding does not resolve");
    let err = instrs[0].token().expect("token").string().expect_err("missing");
    assert!(matches!(err, DecodeError::Token { token: 0x7000_0042, .. }));
}

#[test]
fn token_of_the_wrong_kind_is_rejected() {
    let mut table = TokenTable::new();
    let s = table.string("hello");
    let mut w = IlWriter::new();
    w.op_token(OpCode::Call, s);
    let instrs = decode(&w.finish(), Arc::new(table)).expect("decode");
    let err = instrs[0].stack_pops(false).expect_err("not a method");
    assert!(matches!(
        err,
        DecodeError::TokenKind {
            expected: "method",
            found: "string",
            ..
        }
    ));
}

#[test]
fn stack_arity_follows_operands() {
    let int = TypeRef::primitive(Primitive::I4);
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(
        TypeRef::class("App.Pair"),
        vec![ParamInfo::required("a", int.clone()), ParamInfo::required("b", int.clone())],
    ));
    let getter = table.method(MethodRef {
        name: "get_Count".into(),
        declaring: TypeRef::class("App.Bag"),
        params: vec![],
        returns: int.clone(),
        has_this: true,
    });
    let sig = table.signature(
        &writer::primitive_method_sig(false, ElementType::Void, &[ElementType::I4, ElementType::I8]).expect("sig"),
    );

    let mut w = IlWriter::new();
    w.op_token(OpCode::Newobj, ctor)
        .op_token(OpCode::Callvirt, getter)
        .op_token(OpCode::Calli, sig)
        .op(OpCode::Ret)
        .op(OpCode::Dup);
    let instrs = decode(&w.finish(), Arc::new(table)).expect("decode");

    assert_eq!(instrs[0].stack_pops(false).expect("newobj"), 2);
    assert_eq!(instrs[0].stack_pushes().expect("newobj"), 1);
    assert_eq!(instrs[1].stack_pops(false).expect("callvirt"), 1);
    assert_eq!(instrs[1].stack_pushes().expect("callvirt"), 1);
    assert_eq!(instrs[2].stack_pops(false).expect("calli"), 3);
    assert_eq!(instrs[2].stack_pushes().expect("calli"), 0);
    assert_eq!(instrs[3].stack_pops(true).expect("ret"), 1);
    assert_eq!(instrs[3].stack_pops(false).expect("ret"), 0);
    assert_eq!(instrs[4].stack_pops(false).expect("dup"), 1);
    assert_eq!(instrs[4].stack_pushes().expect("dup"), 2);
}

#[test]
fn writer_reproduces_decoded_bytes() {
    let mut w = IlWriter::new();
    w.ldc_i4(100)
        .ldc_i4(100_000)
        .stloc(5)
        .ldloca(5)
        .op_token(OpCode::Initobj, 0x0100_0001)
        .op_i1(OpCode::BrS, 0)
        .op(OpCode::Ret);
    let bytes = w.finish();
    let instrs = decode(&bytes, empty()).expect("decode");

    let mut again = IlWriter::new();
    for instr in &instrs {
        again.instruction(instr);
    }
    assert_eq!(again.finish(), bytes);
}

#[test]
fn stream_can_be_restarted() {
    let mut w = IlWriter::new();
    w.op(OpCode::Ldnull).op(OpCode::Ret);
    let stream = InstructionStream::new(w.finish(), empty());
    assert_eq!(stream.iter().count(), 2);
    assert_eq!(stream.iter().count(), 2);
    assert_eq!(stream.decode_all().expect("decode").len(), 2);
}

#[test]
fn iterator_stops_after_first_error() {
    let bytes = [0x00, 0x24, 0x00];
    let items: Vec<_> = Decoder::new(&bytes, empty()).collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
}
