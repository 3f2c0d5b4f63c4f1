//! Signature blob decoding.
//!
//! Signatures describe the declared types of fields, properties, methods,
//! parameters and locals. They are built from compressed integers (see
//! [`codec`]) read through a [`SignatureReader`].

pub mod codec;
mod reader;
mod types;

pub use reader::SignatureReader;
pub use types::*;
