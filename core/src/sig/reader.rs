use crate::error::SigError;

use super::codec::{read_compressed, read_compressed_signed};
use super::types::{
    ArrayShape, CustomMod, ElementType, FieldSig, LocalVarSig, LocalsSig, MethodSig, ParamSig, PropertySig, SigFlags,
    TypeDefOrRef, TypeSig, TypeTable,
};

/// Cursor over a signature blob.
///
/// Every integer read remembers where it started so that one read can be
/// undone with [`SignatureReader::rollback`]. Only a single pending rollback
/// is tracked; a second rollback before the next read is an error.
#[derive(Debug, Clone)]
pub struct SignatureReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    last_read: Option<usize>,
}

impl<'a> SignatureReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            last_read: None,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Read one compressed integer.
    pub fn read_u32(&mut self) -> Result<u32, SigError> {
        let start = self.pos;
        let value = read_compressed(self.bytes, &mut self.pos)?;
        self.last_read = Some(start);
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32, SigError> {
        let start = self.pos;
        let value = read_compressed_signed(self.bytes, &mut self.pos)?;
        self.last_read = Some(start);
        Ok(value)
    }

    /// Pre-allocation for `count` upcoming elements. Every element takes at
    /// least one byte, so a count past the end of the blob is not trusted.
    fn capacity_for(&self, count: u32) -> usize {
        (count as usize).min(self.bytes.len().saturating_sub(self.pos))
    }

    /// Undo the most recent read.
    pub fn rollback(&mut self) -> Result<(), SigError> {
        let start = self.last_read.take().ok_or(SigError::DoubleRollback)?;
        self.pos = start;
        Ok(())
    }

    pub fn read_flags(&mut self) -> Result<SigFlags, SigError> {
        self.read_u32().map(SigFlags::from_bits)
    }

    pub fn read_element_type(&mut self) -> Result<ElementType, SigError> {
        let raw = self.read_u32()?;
        ElementType::try_from(raw)
    }

    /// Read a `TypeDefOrRef` coded index: the low two bits select the table.
    pub fn read_type_encoded(&mut self) -> Result<TypeDefOrRef, SigError> {
        let encoded = self.read_u32()?;
        let table = match encoded & 0b11 {
            0 => TypeTable::TypeDef,
            1 => TypeTable::TypeRef,
            2 => TypeTable::TypeSpec,
            _ => {
                return Err(SigError::UnexpectedElementType {
                    found: encoded,
                    context: "TypeDefOrRef coded index",
                });
            }
        };
        Ok(TypeDefOrRef {
            table,
            index: encoded >> 2,
        })
    }

    /// Read a custom modifier if one is next; otherwise leave the cursor untouched.
    pub fn read_custom_modifier(&mut self) -> Result<Option<CustomMod>, SigError> {
        if self.is_at_end() {
            return Ok(None);
        }
        let tag = self.read_u32()?;
        let required = if tag == ElementType::CModReqd as u32 {
            true
        } else if tag == ElementType::CModOpt as u32 {
            false
        } else {
            self.rollback()?;
            return Ok(None);
        };
        let ty = self.read_type_encoded()?;
        Ok(Some(CustomMod { required, ty }))
    }

    pub fn read_custom_modifiers(&mut self) -> Result<Vec<CustomMod>, SigError> {
        let mut mods = Vec::new();
        while let Some(m) = self.read_custom_modifier()? {
            mods.push(m);
        }
        Ok(mods)
    }

    pub fn read_type(&mut self) -> Result<TypeSig, SigError> {
        let et = self.read_element_type()?;
        self.read_type_after(et)
    }

    fn read_type_after(&mut self, et: ElementType) -> Result<TypeSig, SigError> {
        use ElementType as E;
        Ok(match et {
            E::Void
            | E::Boolean
            | E::Char
            | E::I1
            | E::U1
            | E::I2
            | E::U2
            | E::I4
            | E::U4
            | E::I8
            | E::U8
            | E::R4
            | E::R8
            | E::I
            | E::U
            | E::String
            | E::Object
            | E::TypedByRef => TypeSig::Primitive(et),
            E::Class => TypeSig::Class(self.read_type_encoded()?),
            E::ValueType => TypeSig::ValueType(self.read_type_encoded()?),
            E::SzArray => {
                let mods = self.read_custom_modifiers()?;
                TypeSig::SzArray {
                    mods,
                    elem: Box::new(self.read_type()?),
                }
            }
            E::Array => {
                let elem = Box::new(self.read_type()?);
                let shape = self.read_array_shape()?;
                TypeSig::Array { elem, shape }
            }
            E::Ptr => {
                let mods = self.read_custom_modifiers()?;
                TypeSig::Ptr {
                    mods,
                    elem: Box::new(self.read_type()?),
                }
            }
            E::ByRef => TypeSig::ByRef(Box::new(self.read_type()?)),
            E::GenericInst => {
                let value_type = match self.read_element_type()? {
                    E::ValueType => true,
                    E::Class => false,
                    other => {
                        return Err(SigError::UnexpectedElementType {
                            found: other as u32,
                            context: "generic instantiation",
                        });
                    }
                };
                let base = self.read_type_encoded()?;
                let count = self.read_u32()?;
                let mut args = Vec::with_capacity(self.capacity_for(count));
                for _ in 0..count {
                    args.push(self.read_type()?);
                }
                TypeSig::GenericInst { value_type, base, args }
            }
            E::Var => TypeSig::Var(self.read_u32()?),
            E::MVar => TypeSig::MVar(self.read_u32()?),
            E::FnPtr => TypeSig::FnPtr(Box::new(self.read_method()?)),
            other => {
                return Err(SigError::UnexpectedElementType {
                    found: other as u32,
                    context: "type",
                });
            }
        })
    }

    fn read_array_shape(&mut self) -> Result<ArrayShape, SigError> {
        let rank = self.read_u32()?;
        let num_sizes = self.read_u32()?;
        let mut sizes = Vec::with_capacity(self.capacity_for(num_sizes));
        for _ in 0..num_sizes {
            sizes.push(self.read_u32()?);
        }
        let num_bounds = self.read_u32()?;
        let mut lower_bounds = Vec::with_capacity(self.capacity_for(num_bounds));
        for _ in 0..num_bounds {
            lower_bounds.push(self.read_i32()?);
        }
        Ok(ArrayShape {
            rank,
            sizes,
            lower_bounds,
        })
    }

    pub fn read_field(&mut self) -> Result<FieldSig, SigError> {
        let flags = self.read_flags()?;
        if flags != SigFlags::FIELD {
            return Err(SigError::NotOnField(flags.bits()));
        }
        let mods = self.read_custom_modifiers()?;
        let ty = self.read_type()?;
        Ok(FieldSig { mods, ty })
    }

    pub fn read_property(&mut self) -> Result<PropertySig, SigError> {
        let flags = self.read_flags()?;
        if flags.kind() != SigFlags::PROPERTY || flags.bits() & !(SigFlags::PROPERTY.bits() | SigFlags::HAS_THIS.bits()) != 0 {
            return Err(SigError::NotOnProperty(flags.bits()));
        }
        let count = self.read_u32()?;
        let mods = self.read_custom_modifiers()?;
        let ty = self.read_type()?;
        let mut params = Vec::with_capacity(self.capacity_for(count));
        for _ in 0..count {
            params.push(self.read_param()?);
        }
        Ok(PropertySig {
            has_this: flags.has_this(),
            mods,
            ty,
            params,
        })
    }

    pub fn read_param(&mut self) -> Result<ParamSig, SigError> {
        let mods = self.read_custom_modifiers()?;
        let et = self.read_element_type()?;
        if et == ElementType::ByRef {
            return Ok(ParamSig {
                mods,
                ty: self.read_type()?,
                by_ref: true,
            });
        }
        Ok(ParamSig {
            mods,
            ty: self.read_type_after(et)?,
            by_ref: false,
        })
    }

    /// Read a method definition or call-site signature.
    pub fn read_method(&mut self) -> Result<MethodSig, SigError> {
        let flags = self.read_flags()?;
        let kind = flags.kind();
        if kind.bits() > SigFlags::VARARG.bits() {
            return Err(SigError::NotOnMethod(flags.bits()));
        }
        let generic_params = if flags.is_generic() { self.read_u32()? } else { 0 };
        let count = self.read_u32()?;
        let ret = self.read_param()?;
        let mut params = Vec::with_capacity(self.capacity_for(count));
        let mut varargs = Vec::new();
        let mut after_sentinel = false;
        for _ in 0..count {
            if !after_sentinel {
                let tag = self.read_u32()?;
                if tag == ElementType::Sentinel as u32 {
                    after_sentinel = true;
                } else {
                    self.rollback()?;
                }
            }
            let param = self.read_param()?;
            if after_sentinel {
                varargs.push(param);
            } else {
                params.push(param);
            }
        }
        Ok(MethodSig {
            flags,
            generic_params,
            ret,
            params,
            varargs,
        })
    }

    /// Read a `LocalSig` blob as referenced by a method body header.
    pub fn read_locals(&mut self) -> Result<LocalsSig, SigError> {
        let flags = self.read_flags()?;
        if flags != SigFlags::LOCAL_SIG {
            return Err(SigError::NotOnLocals(flags.bits()));
        }
        let count = self.read_u32()?;
        let mut locals = Vec::with_capacity(self.capacity_for(count));
        for _ in 0..count {
            let mods = self.read_custom_modifiers()?;
            let mut et = self.read_element_type()?;
            if et == ElementType::TypedByRef {
                locals.push(LocalVarSig {
                    mods,
                    pinned: false,
                    by_ref: false,
                    ty: TypeSig::Primitive(et),
                });
                continue;
            }
            let pinned = et == ElementType::Pinned;
            if pinned {
                et = self.read_element_type()?;
            }
            let by_ref = et == ElementType::ByRef;
            let ty = if by_ref { self.read_type()? } else { self.read_type_after(et)? };
            locals.push(LocalVarSig {
                mods,
                pinned,
                by_ref,
                ty,
            });
        }
        Ok(LocalsSig { locals })
    }
}
