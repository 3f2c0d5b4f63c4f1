use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::meta::Decimal;

/// Opaque handle to an object owned by the host.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Any + Send + Sync>);

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object@{:p}", Arc::as_ptr(&self.0))
    }
}

/// A slot on the evaluation stack, an argument or a local.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    Str(Arc<str>),
    Decimal(Decimal),
    Object(ObjectRef),
    /// Managed pointer to a local of the running routine.
    LocalAddr(u16),
    /// Managed pointer to an argument of the running routine.
    ArgAddr(u16),
}

impl Value {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(ObjectRef::new(value))
    }

    pub fn str(value: &str) -> Self {
        Value::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcast an object value to a concrete host type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_object().and_then(|o| o.downcast_ref::<T>())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I4(v) => Some(*v as i64),
            Value::I8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::I4(_) => "int32",
            Value::I8(_) => "int64",
            Value::R4(_) => "float32",
            Value::R8(_) => "float64",
            Value::Str(_) => "string",
            Value::Decimal(_) => "decimal",
            Value::Object(_) => "object",
            Value::LocalAddr(_) | Value::ArgAddr(_) => "managed pointer",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::I4(a), Value::I4(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::R4(a), Value::R4(b)) => a == b,
            (Value::R8(a), Value::R8(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::LocalAddr(a), Value::LocalAddr(b)) | (Value::ArgAddr(a), Value::ArgAddr(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::I4(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}L"),
            Value::R4(v) => write!(f, "{v}f"),
            Value::R8(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Decimal(d) => write!(f, "{d}m"),
            Value::Object(o) => write!(f, "{o:?}"),
            Value::LocalAddr(i) => write!(f, "&loc{i}"),
            Value::ArgAddr(i) => write!(f, "&arg{i}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I4(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I8(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::R8(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::I4(v as i32)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}
