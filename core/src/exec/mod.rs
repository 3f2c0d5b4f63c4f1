//! Interpreter that makes synthesized routines callable.

mod host;
mod interpreter;
mod value;

pub use host::{Host, Resolve, zero_value};
pub use interpreter::Interpreter;
pub use value::{ObjectRef, Value};
