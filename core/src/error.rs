//! Error taxonomy shared by the signature reader, the instruction decoder,
//! the packet builder, the rewriter and the routine interpreter.

use thiserror::Error;

use crate::il::OpCode;

/// Failures while reading a signature blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigError {
    #[error("signature truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("value {0:#x} does not fit the compressed integer encoding")]
    Overflow(u32),

    #[error("not on a field signature (flags {0:#04x})")]
    NotOnField(u32),

    #[error("not on a property signature (flags {0:#04x})")]
    NotOnProperty(u32),

    #[error("not on a method signature (flags {0:#04x})")]
    NotOnMethod(u32),

    #[error("not on a local variable signature (flags {0:#04x})")]
    NotOnLocals(u32),

    #[error("cannot roll back twice without an intervening read")]
    DoubleRollback,

    #[error("unknown element type {0:#04x}")]
    UnknownElementType(u32),

    #[error("unexpected element type {found:#04x} while reading {context}")]
    UnexpectedElementType { found: u32, context: &'static str },
}

/// Failures while turning an IL byte buffer into instructions.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("instruction stream truncated at offset {offset:#06x} (needed {needed} more bytes)")]
    Truncated { offset: u32, needed: usize },

    #[error("unknown opcode {byte:#04x} (two-byte table: {extended}) at offset {offset:#06x}")]
    UnknownOpcode { offset: u32, byte: u8, extended: bool },

    #[error("failed to resolve token {token:#010x}")]
    Token {
        token: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("token {token:#010x} resolved to {found}, expected {expected}")]
    TokenKind {
        token: u32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("decoded {consumed} bytes but the buffer holds {len}")]
    LengthMismatch { consumed: usize, len: usize },

    #[error("malformed call-site signature")]
    Signature(#[from] SigError),
}

/// Failures while replaying instructions over the abstract stack.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("{opcode} at offset {offset:#06x} cannot be represented as an expression tree")]
    Disallowed { offset: u32, opcode: OpCode },

    #[error("{opcode} at offset {offset:#06x} pops {needed} values but only {available} are available")]
    StackUnderflow {
        offset: u32,
        opcode: OpCode,
        needed: u32,
        available: usize,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures raised while classifying a constructor argument.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("decimal composite field `{field}` holds out-of-range literal {value}")]
    MalformedComposite { field: &'static str, value: i64 },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Reasons a factory cannot be partially applied.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("factories cannot use suspension points")]
    Suspension,

    #[error("unsupported operation in factory function: {opcode} at offset {offset:#06x}")]
    UnsupportedOperation { offset: u32, opcode: OpCode },

    #[error("factory must be a simple expression that constructs the desired type")]
    NotSimpleConstruction,

    #[error("argument {index} at offset {offset:#06x} is not declared by the factory")]
    ArgumentOutOfRange { offset: u32, index: u16 },

    #[error("malformed composite literal for parameter `{param}`")]
    MalformedComposite {
        param: String,
        #[source]
        source: ClassifyError,
    },

    #[error("failed to decode factory body")]
    Decode(#[from] DecodeError),

    #[error("failed to read factory local signature")]
    Signature(#[from] SigError),

    #[error("failed to rebuild factory expression")]
    Tree(TreeError),
}

impl From<TreeError> for RewriteError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Disallowed { offset, opcode } => RewriteError::UnsupportedOperation { offset, opcode },
            other => RewriteError::Tree(other),
        }
    }
}

/// Failures while running a synthesized routine.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to resolve {ty}")]
    Resolution {
        ty: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{ty} is not resolvable in this context")]
    NotResolvable { ty: String },

    #[error("host operation failed")]
    Host(#[from] anyhow::Error),

    #[error("evaluation stack underflow at {at}")]
    StackUnderflow { at: String },

    #[error("{opcode} is not supported by the routine interpreter")]
    Unsupported { opcode: OpCode },

    #[error("routine expects {expected} arguments, got {found}")]
    Arity { expected: usize, found: usize },

    #[error("{opcode} cannot operate on {found}")]
    TypeMismatch { opcode: OpCode, found: String },

    #[error("{kind} {index} is out of range")]
    SlotOutOfRange { kind: &'static str, index: u16 },

    #[error("routine finished without returning a value")]
    NoReturn,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
