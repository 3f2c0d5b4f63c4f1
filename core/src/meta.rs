//! Metadata model shared by the decoder, the classifier and the rewriter.
//!
//! Tokens inside an instruction stream resolve to these descriptors. They
//! carry just enough information to compute stack arity, to decide whether a
//! constructor argument is a default value, and to drive the interpreter.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    I,
    U,
}

impl Primitive {
    pub fn type_name(self) -> &'static str {
        match self {
            Primitive::Bool => "System.Boolean",
            Primitive::Char => "System.Char",
            Primitive::I1 => "System.SByte",
            Primitive::U1 => "System.Byte",
            Primitive::I2 => "System.Int16",
            Primitive::U2 => "System.UInt16",
            Primitive::I4 => "System.Int32",
            Primitive::U4 => "System.UInt32",
            Primitive::I8 => "System.Int64",
            Primitive::U8 => "System.UInt64",
            Primitive::R4 => "System.Single",
            Primitive::R8 => "System.Double",
            Primitive::I => "System.IntPtr",
            Primitive::U => "System.UIntPtr",
        }
    }
}

/// Broad shape of a type as far as argument classification and execution care.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Primitive(Primitive),
    Decimal,
    /// Enumeration with the given underlying primitive.
    Enum(Primitive),
    ValueType,
    Class,
    Array(Box<TypeRef>),
    ByRef(Box<TypeRef>),
    Pointer(Box<TypeRef>),
    GenericParam,
}

/// A named type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: Arc<str>,
    kind: TypeKind,
}

impl TypeRef {
    pub fn new(name: impl Into<Arc<str>>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn void() -> Self {
        Self::new("System.Void", TypeKind::Void)
    }

    pub fn primitive(prim: Primitive) -> Self {
        Self::new(prim.type_name(), TypeKind::Primitive(prim))
    }

    pub fn decimal() -> Self {
        Self::new("System.Decimal", TypeKind::Decimal)
    }

    pub fn string() -> Self {
        Self::new("System.String", TypeKind::Class)
    }

    pub fn object() -> Self {
        Self::new("System.Object", TypeKind::Class)
    }

    pub fn class(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    pub fn value_type(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, TypeKind::ValueType)
    }

    pub fn enumeration(name: impl Into<Arc<str>>, underlying: Primitive) -> Self {
        Self::new(name, TypeKind::Enum(underlying))
    }

    pub fn array(elem: TypeRef) -> Self {
        Self::new(format!("{}[]", elem.name), TypeKind::Array(Box::new(elem)))
    }

    pub fn by_ref(elem: TypeRef) -> Self {
        Self::new(format!("{}&", elem.name), TypeKind::ByRef(Box::new(elem)))
    }

    pub fn pointer(elem: TypeRef) -> Self {
        Self::new(format!("{}*", elem.name), TypeKind::Pointer(Box::new(elem)))
    }

    pub fn generic_param(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, TypeKind::GenericParam)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    /// Whether values of this type live inline rather than behind a reference.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Primitive(_) | TypeKind::Decimal | TypeKind::Enum(_) | TypeKind::ValueType | TypeKind::Pointer(_)
        )
    }

    /// Primitive representation, looking through enumerations.
    pub fn underlying_primitive(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) | TypeKind::Enum(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Width and signedness of an integral constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntWidth {
    I8,
    U8,
    I16,
    U16,
    Char,
    I32,
    U32,
    I64,
    U64,
}

impl IntWidth {
    /// Truncate `raw` to this width and read it back with this signedness.
    pub fn normalize(self, raw: i64) -> i128 {
        match self {
            IntWidth::I8 => raw as i8 as i128,
            IntWidth::U8 => raw as u8 as i128,
            IntWidth::I16 => raw as i16 as i128,
            IntWidth::U16 | IntWidth::Char => raw as u16 as i128,
            IntWidth::I32 => raw as i32 as i128,
            IntWidth::U32 => raw as u32 as i128,
            IntWidth::I64 => raw as i128,
            IntWidth::U64 => raw as u64 as i128,
        }
    }
}

/// Fixed-point decimal: a 96-bit magnitude scaled by `10^-scale`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Decimal {
    pub lo: u32,
    pub mid: u32,
    pub hi: u32,
    pub negative: bool,
    pub scale: u8,
}

impl Decimal {
    pub const MAX_SCALE: u8 = 28;

    pub fn from_parts(lo: u32, mid: u32, hi: u32, negative: bool, scale: u8) -> Self {
        Self {
            lo,
            mid,
            hi,
            negative,
            scale,
        }
    }

    /// Build from a signed mantissa and scale; the mantissa must fit in 96 bits.
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        let magnitude = mantissa.unsigned_abs();
        if magnitude >> 96 != 0 || scale > Self::MAX_SCALE {
            return None;
        }
        Some(Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: (magnitude >> 64) as u32,
            negative: mantissa < 0,
            scale,
        })
    }

    #[inline]
    pub fn magnitude(&self) -> u128 {
        ((self.hi as u128) << 64) | ((self.mid as u128) << 32) | self.lo as u128
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude() == 0
    }

    /// Magnitude and scale with trailing decimal zeros removed.
    fn normalized(&self) -> (bool, u128, u8) {
        let mut magnitude = self.magnitude();
        let mut scale = self.scale;
        while scale > 0 && magnitude % 10 == 0 {
            magnitude /= 10;
            scale -= 1;
        }
        (self.negative && magnitude != 0, magnitude, scale)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, magnitude, scale) = self.normalized();
        let digits = magnitude.to_string();
        let scale = scale as usize;
        if negative {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

/// Declared default of an optional parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Int { value: i128, width: IntWidth },
    F32(f32),
    F64(f64),
    Decimal(Decimal),
}

impl DefaultValue {
    pub fn int(value: i128, width: IntWidth) -> Self {
        DefaultValue::Int { value, width }
    }
}

/// A method parameter, optionally carrying a declared default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: Arc<str>,
    pub ty: TypeRef,
    /// `None` for required parameters.
    pub default: Option<DefaultValue>,
}

impl ParamInfo {
    pub fn required(name: impl Into<Arc<str>>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn optional(name: impl Into<Arc<str>>, ty: TypeRef, default: DefaultValue) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// A resolved method or constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub name: Arc<str>,
    pub declaring: TypeRef,
    pub params: Vec<ParamInfo>,
    pub returns: TypeRef,
    pub has_this: bool,
}

impl MethodRef {
    pub const CTOR: &'static str = ".ctor";

    pub fn constructor(declaring: TypeRef, params: Vec<ParamInfo>) -> Self {
        Self {
            name: Self::CTOR.into(),
            declaring,
            params,
            returns: TypeRef::void(),
            has_this: true,
        }
    }

    pub fn is_constructor(&self) -> bool {
        &*self.name == Self::CTOR
    }

    /// Values consumed by `call`/`callvirt` (receiver included).
    pub fn call_pops(&self) -> u32 {
        self.params.len() as u32 + u32::from(self.has_this)
    }

    pub fn returns_value(&self) -> bool {
        !self.returns.is_void()
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.declaring, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p.ty)?;
        }
        f.write_str(")")
    }
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub name: Arc<str>,
    pub declaring: TypeRef,
    pub ty: TypeRef,
    pub is_static: bool,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring, self.name)
    }
}
