use anyhow::{Result, bail};

use crate::meta::{Decimal, FieldRef, MethodRef, Primitive, TypeKind, TypeRef};

use super::value::Value;

/// Object model of the embedding runtime.
///
/// The interpreter never allocates objects or dispatches methods itself;
/// everything that touches host state goes through this trait.
pub trait Host: Send + Sync {
    /// Run constructor `ctor` over `args` and return the new instance.
    fn construct(&self, ctor: &MethodRef, args: Vec<Value>) -> Result<Value>;

    /// Invoke `method`. For instance methods the receiver is `args[0]`.
    fn call(&self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>>;

    /// Read a field; `target` is `None` for static fields.
    fn load_field(&self, field: &FieldRef, target: Option<&Value>) -> Result<Value>;

    fn store_field(&self, field: &FieldRef, target: Option<&Value>, value: Value) -> Result<()>;

    /// Zero value of `ty`, used for fresh locals and `initobj`.
    fn default_value(&self, ty: &TypeRef) -> Result<Value> {
        Ok(zero_value(ty))
    }

    fn box_value(&self, _ty: &TypeRef, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn unbox(&self, ty: &TypeRef, value: Value) -> Result<Value> {
        if value.is_null() && ty.is_value_type() {
            bail!("cannot unbox null to {ty}");
        }
        Ok(value)
    }

    /// Checked reference conversion. `Ok(None)` means the value is not an
    /// instance of `ty`.
    fn cast(&self, _ty: &TypeRef, value: Value) -> Result<Option<Value>> {
        Ok(Some(value))
    }
}

/// Resolution capability: produce an instance of `ty` for the active context.
///
/// `Ok(None)` reports that nothing can be resolved for `ty`; the routine
/// treats that as an error, not as a null argument.
pub trait Resolve: Send + Sync {
    fn resolve(&self, ty: &TypeRef, context: &Value) -> Result<Option<Value>>;
}

impl<F> Resolve for F
where
    F: Fn(&TypeRef, &Value) -> Result<Option<Value>> + Send + Sync,
{
    fn resolve(&self, ty: &TypeRef, context: &Value) -> Result<Option<Value>> {
        self(ty, context)
    }
}

/// Zero-initialized value for the inline representations the interpreter
/// knows about; everything else starts as null.
pub fn zero_value(ty: &TypeRef) -> Value {
    match ty.kind() {
        TypeKind::Primitive(p) | TypeKind::Enum(p) => match p {
            Primitive::I8 | Primitive::U8 => Value::I8(0),
            Primitive::R4 => Value::R4(0.0),
            Primitive::R8 => Value::R8(0.0),
            _ => Value::I4(0),
        },
        TypeKind::Decimal => Value::Decimal(Decimal::default()),
        _ => Value::Null,
    }
}
