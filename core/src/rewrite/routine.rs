use std::fmt;
use std::sync::Arc;

use crate::error::ExecError;
use crate::exec::{Host, Interpreter, Resolve, Value};
use crate::il::{Instruction, LABEL_WIDTH};
use crate::meta::{ParamInfo, TypeRef};

use super::factory::FactoryKey;

/// One step of a synthesized routine.
#[derive(Debug, Clone)]
pub enum RoutineOp {
    /// An instruction copied from the factory body.
    Replay(Instruction),
    /// Load an argument by its ordinal in the synthesized layout.
    LoadArg(u16),
    LoadArgAddr(u16),
    StoreArg(u16),
    /// Push the resolution context argument.
    LoadContext,
    /// Pop a resolution context and push an instance of the type.
    Resolve(TypeRef),
    /// Convert a resolved instance to the inline value type.
    Unbox(TypeRef),
}

impl fmt::Display for RoutineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let RoutineOp::Replay(instr) = self {
            return write!(f, "{instr}");
        }
        // Synthesized ops have no offset; line them up with replayed ones.
        write!(f, "{:width$}", "", width = LABEL_WIDTH)?;
        match self {
            RoutineOp::Replay(_) => Ok(()),
            RoutineOp::LoadArg(n) => write!(f, "ldarg {n}"),
            RoutineOp::LoadArgAddr(n) => write!(f, "ldarga {n}"),
            RoutineOp::StoreArg(n) => write!(f, "starg {n}"),
            RoutineOp::LoadContext => f.write_str("ldctx"),
            RoutineOp::Resolve(ty) => write!(f, "resolve {ty}"),
            RoutineOp::Unbox(ty) => write!(f, "unbox.any {ty}"),
        }
    }
}

/// Argument layout of a synthesized routine:
/// `[target,] resolution-context, original parameters...`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineLayout {
    pub has_this: bool,
    /// Parameters of the original factory.
    pub params: Vec<ParamInfo>,
}

impl RoutineLayout {
    #[inline]
    pub fn context_index(&self) -> u16 {
        u16::from(self.has_this)
    }

    pub fn arg_count(&self) -> usize {
        self.params.len() + 1 + usize::from(self.has_this)
    }

    /// Ordinal in this layout of argument `original` of the factory body, or
    /// `None` when the factory has no such argument.
    pub fn remap(&self, original: u16) -> Option<u16> {
        let declared = self.params.len() + usize::from(self.has_this);
        if usize::from(original) >= declared {
            return None;
        }
        if self.has_this && original == 0 { Some(0) } else { original.checked_add(1) }
    }
}

/// A partially applied factory.
#[derive(Debug)]
pub struct SynthesizedRoutine {
    pub(crate) key: FactoryKey,
    pub(crate) layout: RoutineLayout,
    pub(crate) locals: Vec<TypeRef>,
    pub(crate) ops: Vec<RoutineOp>,
    pub(crate) returns: TypeRef,
    /// Constructor parameters whose default argument is now resolved
    pub(crate) substituted: Vec<Arc<str>>,
}

impl SynthesizedRoutine {
    #[inline]
    pub fn key(&self) -> &FactoryKey {
        &self.key
    }

    #[inline]
    pub fn layout(&self) -> &RoutineLayout {
        &self.layout
    }

    pub fn locals(&self) -> &[TypeRef] {
        &self.locals
    }

    pub fn ops(&self) -> &[RoutineOp] {
        &self.ops
    }

    pub fn returns(&self) -> &TypeRef {
        &self.returns
    }

    /// Names of the constructor parameters routed through the resolver.
    pub fn substituted(&self) -> &[Arc<str>] {
        &self.substituted
    }
}

impl fmt::Display for SynthesizedRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "routine {} (", self.key)?;
        if self.layout.has_this {
            f.write_str("this, ")?;
        }
        f.write_str("ctx")?;
        for p in &self.layout.params {
            write!(f, ", {} {}", p.ty, p.name)?;
        }
        writeln!(f, ") -> {}", self.returns)?;
        for (i, local) in self.locals.iter().enumerate() {
            writeln!(f, "  .local {i} {local}")?;
        }
        for op in &self.ops {
            writeln!(f, "  {op}")?;
        }
        Ok(())
    }
}

/// A synthesized routine paired with the captured state of the factory it
/// came from.
#[derive(Debug, Clone)]
pub struct BoundRoutine {
    routine: Arc<SynthesizedRoutine>,
    target: Option<Value>,
}

impl BoundRoutine {
    pub(crate) fn new(routine: Arc<SynthesizedRoutine>, target: Option<Value>) -> Self {
        Self { routine, target }
    }

    pub fn routine(&self) -> &Arc<SynthesizedRoutine> {
        &self.routine
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    /// Run the routine for `context` with the factory's own arguments.
    pub fn invoke(&self, host: &dyn Host, resolver: &dyn Resolve, context: Value, args: Vec<Value>) -> Result<Value, ExecError> {
        let layout = self.routine.layout();
        if args.len() != layout.params.len() {
            return Err(ExecError::Arity {
                expected: layout.params.len(),
                found: args.len(),
            });
        }
        let mut full = Vec::with_capacity(layout.arg_count());
        if layout.has_this {
            full.push(self.target.clone().unwrap_or_default());
        }
        full.push(context);
        full.extend(args);
        Interpreter::new(host, resolver).run(&self.routine, full)
    }
}
