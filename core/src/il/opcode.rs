//! Opcode tables.
//!
//! Every opcode is declared once below together with its mnemonic, operand
//! shape and generic stack behaviour. The one-byte and `0xFE`-prefixed
//! two-byte lookup tables are built from that list on first use.

use std::fmt;

use once_cell::sync::Lazy;

/// Prefix byte selecting the two-byte opcode table.
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// Shape of the operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    InlineNone,
    ShortInlineBrTarget,
    InlineBrTarget,
    ShortInlineI,
    InlineI,
    InlineI8,
    ShortInlineR,
    InlineR,
    ShortInlineVar,
    InlineVar,
    InlineString,
    InlineSig,
    InlineMethod,
    InlineField,
    InlineType,
    InlineTok,
    InlineSwitch,
}

impl OperandType {
    /// Encoded operand width in bytes; `None` for the variable-length switch table.
    pub const fn fixed_size(self) -> Option<usize> {
        Some(match self {
            OperandType::InlineNone => 0,
            OperandType::ShortInlineBrTarget | OperandType::ShortInlineI | OperandType::ShortInlineVar => 1,
            OperandType::InlineVar => 2,
            OperandType::InlineBrTarget
            | OperandType::InlineI
            | OperandType::ShortInlineR
            | OperandType::InlineString
            | OperandType::InlineSig
            | OperandType::InlineMethod
            | OperandType::InlineField
            | OperandType::InlineType
            | OperandType::InlineTok => 4,
            OperandType::InlineI8 | OperandType::InlineR => 8,
            OperandType::InlineSwitch => return None,
        })
    }
}

/// Values an opcode removes from the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPop {
    Fixed(u8),
    /// Depends on the operand (calls) or on the enclosing routine (`ret`).
    Var,
}

/// Values an opcode leaves on the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPush {
    Fixed(u8),
    Var,
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub operand: OperandType,
    pub pop: StackPop,
    pub push: StackPush,
}

macro_rules! stack_pop {
    (var) => {
        StackPop::Var
    };
    ($n:literal) => {
        StackPop::Fixed($n)
    };
}

macro_rules! stack_push {
    (var) => {
        StackPush::Var
    };
    ($n:literal) => {
        StackPush::Fixed($n)
    };
}

macro_rules! opcodes {
    ($( $variant:ident = $code:literal, $name:literal, $operand:ident, $pop:tt, $push:tt; )*) => {
        /// An opcode; the discriminant is its encoded value (`0xFExx` for two-byte opcodes).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        #[allow(non_camel_case_types)]
        pub enum OpCode {
            $( $variant = $code, )*
        }

        impl OpCode {
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$variant, )* ];

            pub fn info(self) -> &'static OpInfo {
                match self {
                    $( OpCode::$variant => &OpInfo {
                        name: $name,
                        operand: OperandType::$operand,
                        pop: stack_pop!($pop),
                        push: stack_push!($push),
                    }, )*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", InlineNone, 0, 0;
    Break = 0x01, "break", InlineNone, 0, 0;
    Ldarg0 = 0x02, "ldarg.0", InlineNone, 0, 1;
    Ldarg1 = 0x03, "ldarg.1", InlineNone, 0, 1;
    Ldarg2 = 0x04, "ldarg.2", InlineNone, 0, 1;
    Ldarg3 = 0x05, "ldarg.3", InlineNone, 0, 1;
    Ldloc0 = 0x06, "ldloc.0", InlineNone, 0, 1;
    Ldloc1 = 0x07, "ldloc.1", InlineNone, 0, 1;
    Ldloc2 = 0x08, "ldloc.2", InlineNone, 0, 1;
    Ldloc3 = 0x09, "ldloc.3", InlineNone, 0, 1;
    Stloc0 = 0x0A, "stloc.0", InlineNone, 1, 0;
    Stloc1 = 0x0B, "stloc.1", InlineNone, 1, 0;
    Stloc2 = 0x0C, "stloc.2", InlineNone, 1, 0;
    Stloc3 = 0x0D, "stloc.3", InlineNone, 1, 0;
    LdargS = 0x0E, "ldarg.s", ShortInlineVar, 0, 1;
    LdargaS = 0x0F, "ldarga.s", ShortInlineVar, 0, 1;
    StargS = 0x10, "starg.s", ShortInlineVar, 1, 0;
    LdlocS = 0x11, "ldloc.s", ShortInlineVar, 0, 1;
    LdlocaS = 0x12, "ldloca.s", ShortInlineVar, 0, 1;
    StlocS = 0x13, "stloc.s", ShortInlineVar, 1, 0;
    Ldnull = 0x14, "ldnull", InlineNone, 0, 1;
    LdcI4M1 = 0x15, "ldc.i4.m1", InlineNone, 0, 1;
    LdcI4_0 = 0x16, "ldc.i4.0", InlineNone, 0, 1;
    LdcI4_1 = 0x17, "ldc.i4.1", InlineNone, 0, 1;
    LdcI4_2 = 0x18, "ldc.i4.2", InlineNone, 0, 1;
    LdcI4_3 = 0x19, "ldc.i4.3", InlineNone, 0, 1;
    LdcI4_4 = 0x1A, "ldc.i4.4", InlineNone, 0, 1;
    LdcI4_5 = 0x1B, "ldc.i4.5", InlineNone, 0, 1;
    LdcI4_6 = 0x1C, "ldc.i4.6", InlineNone, 0, 1;
    LdcI4_7 = 0x1D, "ldc.i4.7", InlineNone, 0, 1;
    LdcI4_8 = 0x1E, "ldc.i4.8", InlineNone, 0, 1;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInlineI, 0, 1;
    LdcI4 = 0x20, "ldc.i4", InlineI, 0, 1;
    LdcI8 = 0x21, "ldc.i8", InlineI8, 0, 1;
    LdcR4 = 0x22, "ldc.r4", ShortInlineR, 0, 1;
    LdcR8 = 0x23, "ldc.r8", InlineR, 0, 1;
    Dup = 0x25, "dup", InlineNone, 1, 2;
    Pop = 0x26, "pop", InlineNone, 1, 0;
    Jmp = 0x27, "jmp", InlineMethod, 0, 0;
    Call = 0x28, "call", InlineMethod, var, var;
    Calli = 0x29, "calli", InlineSig, var, var;
    Ret = 0x2A, "ret", InlineNone, var, 0;
    BrS = 0x2B, "br.s", ShortInlineBrTarget, 0, 0;
    BrfalseS = 0x2C, "brfalse.s", ShortInlineBrTarget, 1, 0;
    BrtrueS = 0x2D, "brtrue.s", ShortInlineBrTarget, 1, 0;
    BeqS = 0x2E, "beq.s", ShortInlineBrTarget, 2, 0;
    BgeS = 0x2F, "bge.s", ShortInlineBrTarget, 2, 0;
    BgtS = 0x30, "bgt.s", ShortInlineBrTarget, 2, 0;
    BleS = 0x31, "ble.s", ShortInlineBrTarget, 2, 0;
    BltS = 0x32, "blt.s", ShortInlineBrTarget, 2, 0;
    BneUnS = 0x33, "bne.un.s", ShortInlineBrTarget, 2, 0;
    BgeUnS = 0x34, "bge.un.s", ShortInlineBrTarget, 2, 0;
    BgtUnS = 0x35, "bgt.un.s", ShortInlineBrTarget, 2, 0;
    BleUnS = 0x36, "ble.un.s", ShortInlineBrTarget, 2, 0;
    BltUnS = 0x37, "blt.un.s", ShortInlineBrTarget, 2, 0;
    Br = 0x38, "br", InlineBrTarget, 0, 0;
    Brfalse = 0x39, "brfalse", InlineBrTarget, 1, 0;
    Brtrue = 0x3A, "brtrue", InlineBrTarget, 1, 0;
    Beq = 0x3B, "beq", InlineBrTarget, 2, 0;
    Bge = 0x3C, "bge", InlineBrTarget, 2, 0;
    Bgt = 0x3D, "bgt", InlineBrTarget, 2, 0;
    Ble = 0x3E, "ble", InlineBrTarget, 2, 0;
    Blt = 0x3F, "blt", InlineBrTarget, 2, 0;
    BneUn = 0x40, "bne.un", InlineBrTarget, 2, 0;
    BgeUn = 0x41, "bge.un", InlineBrTarget, 2, 0;
    BgtUn = 0x42, "bgt.un", InlineBrTarget, 2, 0;
    BleUn = 0x43, "ble.un", InlineBrTarget, 2, 0;
    BltUn = 0x44, "blt.un", InlineBrTarget, 2, 0;
    Switch = 0x45, "switch", InlineSwitch, 1, 0;
    LdindI1 = 0x46, "ldind.i1", InlineNone, 1, 1;
    LdindU1 = 0x47, "ldind.u1", InlineNone, 1, 1;
    LdindI2 = 0x48, "ldind.i2", InlineNone, 1, 1;
    LdindU2 = 0x49, "ldind.u2", InlineNone, 1, 1;
    LdindI4 = 0x4A, "ldind.i4", InlineNone, 1, 1;
    LdindU4 = 0x4B, "ldind.u4", InlineNone, 1, 1;
    LdindI8 = 0x4C, "ldind.i8", InlineNone, 1, 1;
    LdindI = 0x4D, "ldind.i", InlineNone, 1, 1;
    LdindR4 = 0x4E, "ldind.r4", InlineNone, 1, 1;
    LdindR8 = 0x4F, "ldind.r8", InlineNone, 1, 1;
    LdindRef = 0x50, "ldind.ref", InlineNone, 1, 1;
    StindRef = 0x51, "stind.ref", InlineNone, 2, 0;
    StindI1 = 0x52, "stind.i1", InlineNone, 2, 0;
    StindI2 = 0x53, "stind.i2", InlineNone, 2, 0;
    StindI4 = 0x54, "stind.i4", InlineNone, 2, 0;
    StindI8 = 0x55, "stind.i8", InlineNone, 2, 0;
    StindR4 = 0x56, "stind.r4", InlineNone, 2, 0;
    StindR8 = 0x57, "stind.r8", InlineNone, 2, 0;
    Add = 0x58, "add", InlineNone, 2, 1;
    Sub = 0x59, "sub", InlineNone, 2, 1;
    Mul = 0x5A, "mul", InlineNone, 2, 1;
    Div = 0x5B, "div", InlineNone, 2, 1;
    DivUn = 0x5C, "div.un", InlineNone, 2, 1;
    Rem = 0x5D, "rem", InlineNone, 2, 1;
    RemUn = 0x5E, "rem.un", InlineNone, 2, 1;
    And = 0x5F, "and", InlineNone, 2, 1;
    Or = 0x60, "or", InlineNone, 2, 1;
    Xor = 0x61, "xor", InlineNone, 2, 1;
    Shl = 0x62, "shl", InlineNone, 2, 1;
    Shr = 0x63, "shr", InlineNone, 2, 1;
    ShrUn = 0x64, "shr.un", InlineNone, 2, 1;
    Neg = 0x65, "neg", InlineNone, 1, 1;
    Not = 0x66, "not", InlineNone, 1, 1;
    ConvI1 = 0x67, "conv.i1", InlineNone, 1, 1;
    ConvI2 = 0x68, "conv.i2", InlineNone, 1, 1;
    ConvI4 = 0x69, "conv.i4", InlineNone, 1, 1;
    ConvI8 = 0x6A, "conv.i8", InlineNone, 1, 1;
    ConvR4 = 0x6B, "conv.r4", InlineNone, 1, 1;
    ConvR8 = 0x6C, "conv.r8", InlineNone, 1, 1;
    ConvU4 = 0x6D, "conv.u4", InlineNone, 1, 1;
    ConvU8 = 0x6E, "conv.u8", InlineNone, 1, 1;
    Callvirt = 0x6F, "callvirt", InlineMethod, var, var;
    Cpobj = 0x70, "cpobj", InlineType, 2, 0;
    Ldobj = 0x71, "ldobj", InlineType, 1, 1;
    Ldstr = 0x72, "ldstr", InlineString, 0, 1;
    Newobj = 0x73, "newobj", InlineMethod, var, 1;
    Castclass = 0x74, "castclass", InlineType, 1, 1;
    Isinst = 0x75, "isinst", InlineType, 1, 1;
    ConvRUn = 0x76, "conv.r.un", InlineNone, 1, 1;
    Unbox = 0x79, "unbox", InlineType, 1, 1;
    Throw = 0x7A, "throw", InlineNone, 1, 0;
    Ldfld = 0x7B, "ldfld", InlineField, 1, 1;
    Ldflda = 0x7C, "ldflda", InlineField, 1, 1;
    Stfld = 0x7D, "stfld", InlineField, 2, 0;
    Ldsfld = 0x7E, "ldsfld", InlineField, 0, 1;
    Ldsflda = 0x7F, "ldsflda", InlineField, 0, 1;
    Stsfld = 0x80, "stsfld", InlineField, 1, 0;
    Stobj = 0x81, "stobj", InlineType, 2, 0;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", InlineNone, 1, 1;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", InlineNone, 1, 1;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", InlineNone, 1, 1;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", InlineNone, 1, 1;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", InlineNone, 1, 1;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", InlineNone, 1, 1;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", InlineNone, 1, 1;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", InlineNone, 1, 1;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", InlineNone, 1, 1;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", InlineNone, 1, 1;
    Box = 0x8C, "box", InlineType, 1, 1;
    Newarr = 0x8D, "newarr", InlineType, 1, 1;
    Ldlen = 0x8E, "ldlen", InlineNone, 1, 1;
    Ldelema = 0x8F, "ldelema", InlineType, 2, 1;
    LdelemI1 = 0x90, "ldelem.i1", InlineNone, 2, 1;
    LdelemU1 = 0x91, "ldelem.u1", InlineNone, 2, 1;
    LdelemI2 = 0x92, "ldelem.i2", InlineNone, 2, 1;
    LdelemU2 = 0x93, "ldelem.u2", InlineNone, 2, 1;
    LdelemI4 = 0x94, "ldelem.i4", InlineNone, 2, 1;
    LdelemU4 = 0x95, "ldelem.u4", InlineNone, 2, 1;
    LdelemI8 = 0x96, "ldelem.i8", InlineNone, 2, 1;
    LdelemI = 0x97, "ldelem.i", InlineNone, 2, 1;
    LdelemR4 = 0x98, "ldelem.r4", InlineNone, 2, 1;
    LdelemR8 = 0x99, "ldelem.r8", InlineNone, 2, 1;
    LdelemRef = 0x9A, "ldelem.ref", InlineNone, 2, 1;
    StelemI = 0x9B, "stelem.i", InlineNone, 3, 0;
    StelemI1 = 0x9C, "stelem.i1", InlineNone, 3, 0;
    StelemI2 = 0x9D, "stelem.i2", InlineNone, 3, 0;
    StelemI4 = 0x9E, "stelem.i4", InlineNone, 3, 0;
    StelemI8 = 0x9F, "stelem.i8", InlineNone, 3, 0;
    StelemR4 = 0xA0, "stelem.r4", InlineNone, 3, 0;
    StelemR8 = 0xA1, "stelem.r8", InlineNone, 3, 0;
    StelemRef = 0xA2, "stelem.ref", InlineNone, 3, 0;
    Ldelem = 0xA3, "ldelem", InlineType, 2, 1;
    Stelem = 0xA4, "stelem", InlineType, 3, 0;
    UnboxAny = 0xA5, "unbox.any", InlineType, 1, 1;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", InlineNone, 1, 1;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", InlineNone, 1, 1;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", InlineNone, 1, 1;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", InlineNone, 1, 1;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", InlineNone, 1, 1;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", InlineNone, 1, 1;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", InlineNone, 1, 1;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", InlineNone, 1, 1;
    Refanyval = 0xC2, "refanyval", InlineType, 1, 1;
    Ckfinite = 0xC3, "ckfinite", InlineNone, 1, 1;
    Mkrefany = 0xC6, "mkrefany", InlineType, 1, 1;
    Ldtoken = 0xD0, "ldtoken", InlineTok, 0, 1;
    ConvU2 = 0xD1, "conv.u2", InlineNone, 1, 1;
    ConvU1 = 0xD2, "conv.u1", InlineNone, 1, 1;
    ConvI = 0xD3, "conv.i", InlineNone, 1, 1;
    ConvOvfI = 0xD4, "conv.ovf.i", InlineNone, 1, 1;
    ConvOvfU = 0xD5, "conv.ovf.u", InlineNone, 1, 1;
    AddOvf = 0xD6, "add.ovf", InlineNone, 2, 1;
    AddOvfUn = 0xD7, "add.ovf.un", InlineNone, 2, 1;
    MulOvf = 0xD8, "mul.ovf", InlineNone, 2, 1;
    MulOvfUn = 0xD9, "mul.ovf.un", InlineNone, 2, 1;
    SubOvf = 0xDA, "sub.ovf", InlineNone, 2, 1;
    SubOvfUn = 0xDB, "sub.ovf.un", InlineNone, 2, 1;
    Endfinally = 0xDC, "endfinally", InlineNone, 0, 0;
    Leave = 0xDD, "leave", InlineBrTarget, 0, 0;
    LeaveS = 0xDE, "leave.s", ShortInlineBrTarget, 0, 0;
    StindI = 0xDF, "stind.i", InlineNone, 2, 0;
    ConvU = 0xE0, "conv.u", InlineNone, 1, 1;
    Arglist = 0xFE00, "arglist", InlineNone, 0, 1;
    Ceq = 0xFE01, "ceq", InlineNone, 2, 1;
    Cgt = 0xFE02, "cgt", InlineNone, 2, 1;
    CgtUn = 0xFE03, "cgt.un", InlineNone, 2, 1;
    Clt = 0xFE04, "clt", InlineNone, 2, 1;
    CltUn = 0xFE05, "clt.un", InlineNone, 2, 1;
    Ldftn = 0xFE06, "ldftn", InlineMethod, 0, 1;
    Ldvirtftn = 0xFE07, "ldvirtftn", InlineMethod, 1, 1;
    Ldarg = 0xFE09, "ldarg", InlineVar, 0, 1;
    Ldarga = 0xFE0A, "ldarga", InlineVar, 0, 1;
    Starg = 0xFE0B, "starg", InlineVar, 1, 0;
    Ldloc = 0xFE0C, "ldloc", InlineVar, 0, 1;
    Ldloca = 0xFE0D, "ldloca", InlineVar, 0, 1;
    Stloc = 0xFE0E, "stloc", InlineVar, 1, 0;
    Localloc = 0xFE0F, "localloc", InlineNone, 1, 1;
    Endfilter = 0xFE11, "endfilter", InlineNone, 1, 0;
    Unaligned = 0xFE12, "unaligned.", ShortInlineI, 0, 0;
    Volatile = 0xFE13, "volatile.", InlineNone, 0, 0;
    Tail = 0xFE14, "tail.", InlineNone, 0, 0;
    Initobj = 0xFE15, "initobj", InlineType, 1, 0;
    Constrained = 0xFE16, "constrained.", InlineType, 0, 0;
    Cpblk = 0xFE17, "cpblk", InlineNone, 3, 0;
    Initblk = 0xFE18, "initblk", InlineNone, 3, 0;
    No = 0xFE19, "no.", ShortInlineI, 0, 0;
    Rethrow = 0xFE1A, "rethrow", InlineNone, 0, 0;
    Sizeof = 0xFE1C, "sizeof", InlineType, 0, 1;
    Refanytype = 0xFE1D, "refanytype", InlineNone, 1, 1;
    Readonly = 0xFE1E, "readonly.", InlineNone, 0, 0;
}

struct OpTables {
    primary: [Option<OpCode>; 256],
    extended: [Option<OpCode>; 256],
}

static TABLES: Lazy<OpTables> = Lazy::new(|| {
    let mut tables = OpTables {
        primary: [None; 256],
        extended: [None; 256],
    };
    for &op in OpCode::ALL {
        let value = op as u16;
        if value >> 8 == EXTENDED_PREFIX as u16 {
            tables.extended[(value & 0xFF) as usize] = Some(op);
        } else {
            tables.primary[value as usize] = Some(op);
        }
    }
    tables
});

impl OpCode {
    /// Look up a one-byte opcode.
    #[inline]
    pub fn from_primary(byte: u8) -> Option<OpCode> {
        TABLES.primary[byte as usize]
    }

    /// Look up the second byte of a `0xFE`-prefixed opcode.
    #[inline]
    pub fn from_extended(byte: u8) -> Option<OpCode> {
        TABLES.extended[byte as usize]
    }

    #[inline]
    pub fn value(self) -> u16 {
        self as u16
    }

    #[inline]
    pub fn is_two_byte(self) -> bool {
        self.value() >> 8 == EXTENDED_PREFIX as u16
    }

    /// Encoded width of the opcode itself.
    #[inline]
    pub fn encoded_len(self) -> usize {
        if self.is_two_byte() { 2 } else { 1 }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    #[inline]
    pub fn operand_type(self) -> OperandType {
        self.info().operand
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::ShortInlineBrTarget | OperandType::InlineBrTarget
        )
    }

    /// Opcodes that cannot be folded into a single expression tree.
    pub fn is_tree_disallowed(self) -> bool {
        matches!(self, OpCode::Switch | OpCode::Calli)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
