use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;

use crate::error::DecodeError;
use crate::meta::{FieldRef, MethodRef, TypeRef};
use crate::util::{FastHashMap, fast_hash_map_new};

/// Resolves metadata tokens embedded in an instruction stream.
///
/// Implemented by the embedding environment; failures surface as
/// [`DecodeError::Token`] on first access to the operand.
pub trait TokenResolver: Send + Sync {
    fn resolve(&self, token: u32) -> Result<Resolved>;
}

/// A member referenced by an `ldtoken` operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Type(TypeRef),
    Method(Arc<MethodRef>),
    Field(Arc<FieldRef>),
}

/// What a token resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Method(Arc<MethodRef>),
    Field(Arc<FieldRef>),
    Type(TypeRef),
    String(Arc<str>),
    Member(Member),
    /// Raw standalone signature bytes (`calli` call sites).
    Signature(Arc<[u8]>),
}

impl Resolved {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Resolved::Method(_) => "method",
            Resolved::Field(_) => "field",
            Resolved::Type(_) => "type",
            Resolved::String(_) => "string",
            Resolved::Member(_) => "member",
            Resolved::Signature(_) => "signature",
        }
    }

    pub(crate) fn into_type(self, token: u32) -> Result<TypeRef, DecodeError> {
        match self {
            Resolved::Type(ty) | Resolved::Member(Member::Type(ty)) => Ok(ty),
            other => Err(DecodeError::TokenKind {
                token,
                expected: "type",
                found: other.kind_name(),
            }),
        }
    }
}

/// Token operand that resolves lazily and remembers the result.
#[derive(Clone)]
pub struct TokenRef {
    token: u32,
    resolver: Arc<dyn TokenResolver>,
    resolved: OnceCell<Resolved>,
}

impl TokenRef {
    pub fn new(token: u32, resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            token,
            resolver,
            resolved: OnceCell::new(),
        }
    }

    #[inline]
    pub fn token(&self) -> u32 {
        self.token
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn resolve(&self) -> Result<&Resolved, DecodeError> {
        self.resolved.get_or_try_init(|| {
            self.resolver
                .resolve(self.token)
                .map_err(|source| DecodeError::Token { token: self.token, source })
        })
    }

    fn mismatch(&self, expected: &'static str, found: &Resolved) -> DecodeError {
        DecodeError::TokenKind {
            token: self.token,
            expected,
            found: found.kind_name(),
        }
    }

    pub fn method(&self) -> Result<&Arc<MethodRef>, DecodeError> {
        match self.resolve()? {
            Resolved::Method(m) | Resolved::Member(Member::Method(m)) => Ok(m),
            other => Err(self.mismatch("method", other)),
        }
    }

    pub fn field(&self) -> Result<&Arc<FieldRef>, DecodeError> {
        match self.resolve()? {
            Resolved::Field(f) | Resolved::Member(Member::Field(f)) => Ok(f),
            other => Err(self.mismatch("field", other)),
        }
    }

    pub fn type_ref(&self) -> Result<&TypeRef, DecodeError> {
        match self.resolve()? {
            Resolved::Type(t) | Resolved::Member(Member::Type(t)) => Ok(t),
            other => Err(self.mismatch("type", other)),
        }
    }

    pub fn string(&self) -> Result<&Arc<str>, DecodeError> {
        match self.resolve()? {
            Resolved::String(s) => Ok(s),
            other => Err(self.mismatch("string", other)),
        }
    }

    pub fn signature(&self) -> Result<&Arc<[u8]>, DecodeError> {
        match self.resolve()? {
            Resolved::Signature(s) => Ok(s),
            other => Err(self.mismatch("signature", other)),
        }
    }
}

impl fmt::Debug for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRef")
            .field("token", &format_args!("{:#010x}", self.token))
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved.get() {
            Some(Resolved::Method(m)) => write!(f, "{m}"),
            Some(Resolved::Field(fl)) => write!(f, "{fl}"),
            Some(Resolved::Type(t)) => write!(f, "{t}"),
            Some(Resolved::String(s)) => write!(f, "{s:?}"),
            _ => write!(f, "{:#010x}", self.token),
        }
    }
}

/// In-memory token table.
///
/// Tokens are allocated per metadata table in insertion order, so the same
/// sequence of inserts always yields the same tokens.
#[derive(Debug, Default)]
pub struct TokenTable {
    entries: FastHashMap<u32, Resolved>,
    next_row: FastHashMap<u8, u32>,
}

impl TokenTable {
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD: u8 = 0x06;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const STANDALONE_SIG: u8 = 0x11;
    pub const USER_STRING: u8 = 0x70;

    pub fn new() -> Self {
        Self {
            entries: fast_hash_map_new(),
            next_row: fast_hash_map_new(),
        }
    }

    /// Register `value` under the next free row of `table`.
    pub fn insert(&mut self, table: u8, value: Resolved) -> u32 {
        let row = self.next_row.entry(table).or_insert(0);
        *row += 1;
        let token = ((table as u32) << 24) | *row;
        self.entries.insert(token, value);
        token
    }

    /// Register `value` under an explicit token.
    pub fn insert_at(&mut self, token: u32, value: Resolved) {
        self.entries.insert(token, value);
    }

    pub fn method(&mut self, method: MethodRef) -> u32 {
        self.insert(Self::MEMBER_REF, Resolved::Method(Arc::new(method)))
    }

    pub fn field(&mut self, field: FieldRef) -> u32 {
        self.insert(Self::FIELD, Resolved::Field(Arc::new(field)))
    }

    pub fn type_ref(&mut self, ty: TypeRef) -> u32 {
        self.insert(Self::TYPE_REF, Resolved::Type(ty))
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.insert(Self::USER_STRING, Resolved::String(value.into()))
    }

    pub fn signature(&mut self, blob: &[u8]) -> u32 {
        self.insert(Self::STANDALONE_SIG, Resolved::Signature(blob.into()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenResolver for TokenTable {
    fn resolve(&self, token: u32) -> Result<Resolved> {
        self.entries
            .get(&token)
            .cloned()
            .ok_or_else(|| anyhow!("token {token:#010x} is not present in the table"))
    }
}
