//! Descriptors produced by [`SignatureReader`](super::SignatureReader).

use std::fmt;

use crate::error::{DecodeError, SigError};
use crate::il::TokenResolver;
use crate::meta::{Primitive, TypeRef};

/// Element type tags of the signature format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    End = 0x00,
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0A,
    U8 = 0x0B,
    R4 = 0x0C,
    R8 = 0x0D,
    String = 0x0E,
    Ptr = 0x0F,
    ByRef = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    Array = 0x14,
    GenericInst = 0x15,
    TypedByRef = 0x16,
    I = 0x18,
    U = 0x19,
    FnPtr = 0x1B,
    Object = 0x1C,
    SzArray = 0x1D,
    MVar = 0x1E,
    CModReqd = 0x1F,
    CModOpt = 0x20,
    Internal = 0x21,
    Modifier = 0x40,
    Sentinel = 0x41,
    Pinned = 0x45,
}

impl TryFrom<u32> for ElementType {
    type Error = SigError;

    fn try_from(raw: u32) -> Result<Self, SigError> {
        use ElementType::*;
        Ok(match raw {
            0x00 => End,
            0x01 => Void,
            0x02 => Boolean,
            0x03 => Char,
            0x04 => I1,
            0x05 => U1,
            0x06 => I2,
            0x07 => U2,
            0x08 => I4,
            0x09 => U4,
            0x0A => I8,
            0x0B => U8,
            0x0C => R4,
            0x0D => R8,
            0x0E => String,
            0x0F => Ptr,
            0x10 => ByRef,
            0x11 => ValueType,
            0x12 => Class,
            0x13 => Var,
            0x14 => Array,
            0x15 => GenericInst,
            0x16 => TypedByRef,
            0x18 => I,
            0x19 => U,
            0x1B => FnPtr,
            0x1C => Object,
            0x1D => SzArray,
            0x1E => MVar,
            0x1F => CModReqd,
            0x20 => CModOpt,
            0x21 => Internal,
            0x40 => Modifier,
            0x41 => Sentinel,
            0x45 => Pinned,
            other => return Err(SigError::UnknownElementType(other)),
        })
    }
}

impl ElementType {
    /// Primitive kind of this tag, if it denotes a primitive value type.
    pub fn primitive(self) -> Option<Primitive> {
        Some(match self {
            ElementType::Boolean => Primitive::Bool,
            ElementType::Char => Primitive::Char,
            ElementType::I1 => Primitive::I1,
            ElementType::U1 => Primitive::U1,
            ElementType::I2 => Primitive::I2,
            ElementType::U2 => Primitive::U2,
            ElementType::I4 => Primitive::I4,
            ElementType::U4 => Primitive::U4,
            ElementType::I8 => Primitive::I8,
            ElementType::U8 => Primitive::U8,
            ElementType::R4 => Primitive::R4,
            ElementType::R8 => Primitive::R8,
            ElementType::I => Primitive::I,
            ElementType::U => Primitive::U,
            _ => return None,
        })
    }
}

/// Signature header flags (calling convention in the low nibble, attributes above).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigFlags(u32);

impl SigFlags {
    pub const DEFAULT: SigFlags = SigFlags(0x00);
    pub const C: SigFlags = SigFlags(0x01);
    pub const STDCALL: SigFlags = SigFlags(0x02);
    pub const THISCALL: SigFlags = SigFlags(0x03);
    pub const FASTCALL: SigFlags = SigFlags(0x04);
    pub const VARARG: SigFlags = SigFlags(0x05);
    pub const FIELD: SigFlags = SigFlags(0x06);
    pub const LOCAL_SIG: SigFlags = SigFlags(0x07);
    pub const PROPERTY: SigFlags = SigFlags(0x08);
    pub const GENERIC: SigFlags = SigFlags(0x10);
    pub const HAS_THIS: SigFlags = SigFlags(0x20);
    pub const EXPLICIT_THIS: SigFlags = SigFlags(0x40);
    pub const SENTINEL: SigFlags = SigFlags(0x41);

    const KIND_MASK: u32 = 0x0F;

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> SigFlags {
        SigFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: SigFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Calling convention / signature kind stored in the low nibble.
    #[inline]
    pub const fn kind(self) -> SigFlags {
        SigFlags(self.0 & Self::KIND_MASK)
    }

    #[inline]
    pub const fn has_this(self) -> bool {
        self.contains(SigFlags::HAS_THIS)
    }

    #[inline]
    pub const fn is_generic(self) -> bool {
        self.contains(SigFlags::GENERIC)
    }
}

/// Metadata table a `TypeDefOrRef` coded index points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTable {
    TypeDef,
    TypeRef,
    TypeSpec,
}

impl TypeTable {
    /// Table number used in the high byte of a metadata token.
    pub const fn token_table(self) -> u32 {
        match self {
            TypeTable::TypeDef => 0x02,
            TypeTable::TypeRef => 0x01,
            TypeTable::TypeSpec => 0x1B,
        }
    }
}

/// A decoded `TypeDefOrRef` coded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDefOrRef {
    pub table: TypeTable,
    pub index: u32,
}

impl TypeDefOrRef {
    /// Metadata token for this row, suitable for a [`TokenResolver`].
    pub const fn token(self) -> u32 {
        (self.table.token_table() << 24) | self.index
    }
}

/// A `modreq`/`modopt` custom modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomMod {
    pub required: bool,
    pub ty: TypeDefOrRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrayShape {
    pub rank: u32,
    pub sizes: Vec<u32>,
    pub lower_bounds: Vec<i32>,
}

/// A fully decoded type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSig {
    /// `void`, primitives, `string`, `object` and `typedref`.
    Primitive(ElementType),
    Class(TypeDefOrRef),
    ValueType(TypeDefOrRef),
    SzArray { mods: Vec<CustomMod>, elem: Box<TypeSig> },
    Array { elem: Box<TypeSig>, shape: ArrayShape },
    Ptr { mods: Vec<CustomMod>, elem: Box<TypeSig> },
    ByRef(Box<TypeSig>),
    GenericInst { value_type: bool, base: TypeDefOrRef, args: Vec<TypeSig> },
    Var(u32),
    MVar(u32),
    FnPtr(Box<MethodSig>),
}

impl TypeSig {
    pub fn element_type(&self) -> ElementType {
        match self {
            TypeSig::Primitive(et) => *et,
            TypeSig::Class(_) => ElementType::Class,
            TypeSig::ValueType(_) => ElementType::ValueType,
            TypeSig::SzArray { .. } => ElementType::SzArray,
            TypeSig::Array { .. } => ElementType::Array,
            TypeSig::Ptr { .. } => ElementType::Ptr,
            TypeSig::ByRef(_) => ElementType::ByRef,
            TypeSig::GenericInst { .. } => ElementType::GenericInst,
            TypeSig::Var(_) => ElementType::Var,
            TypeSig::MVar(_) => ElementType::MVar,
            TypeSig::FnPtr(_) => ElementType::FnPtr,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Primitive(ElementType::Void))
    }

    /// Map this descriptor onto the metadata model, resolving class and value
    /// type rows through `resolver`.
    pub fn to_type_ref(&self, resolver: &dyn TokenResolver) -> Result<TypeRef, DecodeError> {
        Ok(match self {
            TypeSig::Primitive(et) => match et {
                ElementType::Void => TypeRef::void(),
                ElementType::String => TypeRef::string(),
                ElementType::Object => TypeRef::object(),
                ElementType::TypedByRef => TypeRef::value_type("System.TypedReference"),
                other => match other.primitive() {
                    Some(prim) => TypeRef::primitive(prim),
                    None => return Err(SigError::UnexpectedElementType { found: *other as u32, context: "type" }.into()),
                },
            },
            TypeSig::Class(row) | TypeSig::ValueType(row) => resolve_row(resolver, *row)?,
            TypeSig::GenericInst { base, .. } => resolve_row(resolver, *base)?,
            TypeSig::SzArray { elem, .. } | TypeSig::Array { elem, .. } => TypeRef::array(elem.to_type_ref(resolver)?),
            TypeSig::ByRef(elem) => TypeRef::by_ref(elem.to_type_ref(resolver)?),
            TypeSig::Ptr { elem, .. } => TypeRef::pointer(elem.to_type_ref(resolver)?),
            TypeSig::Var(n) => TypeRef::generic_param(format!("!{n}")),
            TypeSig::MVar(n) => TypeRef::generic_param(format!("!!{n}")),
            TypeSig::FnPtr(_) => TypeRef::primitive(Primitive::I),
        })
    }
}

fn resolve_row(resolver: &dyn TokenResolver, row: TypeDefOrRef) -> Result<TypeRef, DecodeError> {
    let token = row.token();
    let resolved = resolver
        .resolve(token)
        .map_err(|source| DecodeError::Token { token, source })?;
    resolved.into_type(token)
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Primitive(et) => write!(f, "{et:?}"),
            TypeSig::Class(row) => write!(f, "class {:#010x}", row.token()),
            TypeSig::ValueType(row) => write!(f, "valuetype {:#010x}", row.token()),
            TypeSig::SzArray { elem, .. } => write!(f, "{elem}[]"),
            TypeSig::Array { elem, shape } => write!(f, "{elem}[rank {}]", shape.rank),
            TypeSig::Ptr { elem, .. } => write!(f, "{elem}*"),
            TypeSig::ByRef(elem) => write!(f, "{elem}&"),
            TypeSig::GenericInst { base, args, .. } => {
                write!(f, "{:#010x}<", base.token())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeSig::Var(n) => write!(f, "!{n}"),
            TypeSig::MVar(n) => write!(f, "!!{n}"),
            TypeSig::FnPtr(_) => write!(f, "method*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSig {
    pub mods: Vec<CustomMod>,
    pub ty: TypeSig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub mods: Vec<CustomMod>,
    pub ty: TypeSig,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySig {
    pub has_this: bool,
    pub mods: Vec<CustomMod>,
    pub ty: TypeSig,
    pub params: Vec<ParamSig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub flags: SigFlags,
    pub generic_params: u32,
    pub ret: ParamSig,
    pub params: Vec<ParamSig>,
    /// Parameters following the vararg sentinel (call sites only).
    pub varargs: Vec<ParamSig>,
}

impl MethodSig {
    pub fn has_this(&self) -> bool {
        self.flags.has_this() && !self.flags.contains(SigFlags::EXPLICIT_THIS)
    }

    /// Number of stack values a call through this signature consumes.
    pub fn stack_pops(&self) -> u32 {
        (self.params.len() + self.varargs.len()) as u32 + u32::from(self.has_this())
    }

    pub fn returns_value(&self) -> bool {
        !self.ret.ty.is_void()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVarSig {
    pub mods: Vec<CustomMod>,
    pub pinned: bool,
    pub by_ref: bool,
    pub ty: TypeSig,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalsSig {
    pub locals: Vec<LocalVarSig>,
}
