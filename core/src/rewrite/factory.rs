use std::fmt;
use std::sync::Arc;

use crate::error::RewriteError;
use crate::exec::Value;
use crate::il::TokenResolver;
use crate::meta::{ParamInfo, TypeRef};
use crate::sig::SignatureReader;

/// Identity of a factory body.
///
/// Closures created from the same source share a key even when they capture
/// different state; the embedder typically derives it from the module and
/// method token of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryKey {
    pub module: u64,
    pub method: u32,
}

impl FactoryKey {
    pub const fn new(module: u64, method: u32) -> Self {
        Self { module, method }
    }
}

impl fmt::Display for FactoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#010x}", self.module, self.method)
    }
}

/// Everything needed to partially apply one factory.
#[derive(Clone)]
pub struct FactoryDefinition {
    pub(crate) key: FactoryKey,
    pub(crate) body: Arc<[u8]>,
    pub(crate) resolver: Arc<dyn TokenResolver>,
    pub(crate) has_this: bool,
    pub(crate) target: Option<Value>,
    pub(crate) params: Vec<ParamInfo>,
    pub(crate) returns: TypeRef,
    pub(crate) locals: Vec<TypeRef>,
    pub(crate) local_signature: Option<Arc<[u8]>>,
    pub(crate) is_async: bool,
}

impl FactoryDefinition {
    /// A static factory with the given body and return type and no parameters.
    pub fn new(key: FactoryKey, body: impl Into<Arc<[u8]>>, resolver: Arc<dyn TokenResolver>, returns: TypeRef) -> Self {
        Self {
            key,
            body: body.into(),
            resolver,
            has_this: false,
            target: None,
            params: Vec::new(),
            returns,
            locals: Vec::new(),
            local_signature: None,
            is_async: false,
        }
    }

    /// Make this an instance body bound to `target` (a closure).
    pub fn with_target(mut self, target: Value) -> Self {
        self.has_this = true;
        self.target = Some(target);
        self
    }

    pub fn with_params(mut self, params: Vec<ParamInfo>) -> Self {
        self.params = params;
        self
    }

    pub fn with_locals(mut self, locals: Vec<TypeRef>) -> Self {
        self.locals = locals;
        self
    }

    /// Declare locals through a `LocalSig` blob instead of explicit types.
    pub fn with_local_signature(mut self, blob: impl Into<Arc<[u8]>>) -> Self {
        self.local_signature = Some(blob.into());
        self
    }

    /// Mark the body as containing suspension points.
    pub fn suspending(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    #[inline]
    pub fn key(&self) -> &FactoryKey {
        &self.key
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn returns(&self) -> &TypeRef {
        &self.returns
    }

    /// Local variable types, read from the local signature when one is set.
    pub fn local_types(&self) -> Result<Vec<TypeRef>, RewriteError> {
        let Some(blob) = &self.local_signature else {
            return Ok(self.locals.clone());
        };
        let sig = SignatureReader::new(blob).read_locals()?;
        let mut out = Vec::with_capacity(sig.locals.len());
        for local in &sig.locals {
            let ty = local.ty.to_type_ref(self.resolver.as_ref())?;
            out.push(if local.by_ref { TypeRef::by_ref(ty) } else { ty });
        }
        Ok(out)
    }
}

impl fmt::Debug for FactoryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDefinition")
            .field("key", &self.key)
            .field("body_len", &self.body.len())
            .field("has_this", &self.has_this)
            .field("params", &self.params.len())
            .field("returns", &self.returns)
            .field("is_async", &self.is_async)
            .finish()
    }
}
