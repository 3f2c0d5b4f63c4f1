pub mod error;
pub mod meta;
pub mod sig;
pub mod util;

// Instruction decoding and expression reconstruction
pub mod il;
pub mod tree;

// Default-argument recognition and factory rewriting
pub mod classify;
pub mod exec;
pub mod rewrite;

#[cfg(test)]
mod testing;

pub use error::{ClassifyError, DecodeError, ExecError, RewriteError, SigError, TreeError};
pub use rewrite::{BoundRoutine, FactoryDefinition, FactoryKey, PartialApplier, RewriteOptions, SynthesizedRoutine};
