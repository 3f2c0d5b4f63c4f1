//! Partial application of factory bodies.
//!
//! A factory is a routine taking a resolution context and returning a newly
//! constructed instance. Rewriting replays its body into a new routine in
//! which every optional constructor argument left at its declared default is
//! replaced by a call to the resolution capability.

mod factory;
mod options;
mod routine;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::classify::DefaultClassifier;
use crate::error::{ClassifyError, RewriteError};
use crate::il::{Instruction, OpCode, decode};
use crate::tree::{LocalSlotIndex, PacketId, PacketTree, TreeBuilder};
use crate::util::{FastDashMap, fast_dash_map_new};

pub use factory::{FactoryDefinition, FactoryKey};
pub use options::RewriteOptions;
pub use routine::{BoundRoutine, RoutineLayout, RoutineOp, SynthesizedRoutine};

/// Synthesizes and memoizes partially applied factories.
///
/// The cache is shared between threads. Concurrent first requests for the
/// same key may each run the rewrite, but only the first routine inserted is
/// ever handed out.
pub struct PartialApplier {
    cache: FastDashMap<FactoryKey, Arc<SynthesizedRoutine>>,
    options: RewriteOptions,
}

impl Default for PartialApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialApplier {
    pub fn new() -> Self {
        Self::with_options(RewriteOptions::default())
    }

    pub fn with_options(options: RewriteOptions) -> Self {
        Self {
            cache: fast_dash_map_new(),
            options,
        }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Synthesize (or fetch) the routine for `def` and bind it to the
    /// factory's captured target.
    pub fn apply(&self, def: &FactoryDefinition) -> Result<BoundRoutine, RewriteError> {
        let routine = self.synthesize(def)?;
        Ok(BoundRoutine::new(routine, def.target.clone()))
    }

    /// The cached routine for `def`, synthesizing it on first request.
    pub fn synthesize(&self, def: &FactoryDefinition) -> Result<Arc<SynthesizedRoutine>, RewriteError> {
        if let Some(found) = self.cache.get(&def.key) {
            return Ok(found.value().clone());
        }
        let routine = Arc::new(self.rewrite(def)?);
        Ok(match self.cache.entry(def.key) {
            Entry::Vacant(v) => {
                v.insert(routine.clone());
                routine
            }
            Entry::Occupied(o) => {
                debug!(key = %def.key, "routine already cached by a concurrent request");
                o.get().clone()
            }
        })
    }

    pub fn cached(&self, key: &FactoryKey) -> Option<Arc<SynthesizedRoutine>> {
        self.cache.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn rewrite(&self, def: &FactoryDefinition) -> Result<SynthesizedRoutine, RewriteError> {
        if def.is_async {
            return Err(RewriteError::Suspension);
        }

        let instrs = self.replayable(decode(&def.body, def.resolver.clone())?)?;
        let tree = TreeBuilder::new(!def.returns.is_void())
            .trace_packets(self.options.trace_packets)
            .build(&instrs)?;
        let ctor = constructed(&tree)?;
        let slots = LocalSlotIndex::build(&tree);
        let classifier = DefaultClassifier::new(&tree, &slots).recognize_struct_defaults(self.options.recognize_struct_defaults);

        // Constructor arguments to replace, and every packet feeding them.
        let method = tree.instruction(ctor).token().map(|t| t.method()).transpose()?;
        let Some(method) = method else {
            return Err(RewriteError::NotSimpleConstruction);
        };
        let duplicated = duplicated_packets(&tree);
        let mut substitute: Vec<Option<usize>> = vec![None; tree.len()];
        let mut skip = vec![false; tree.len()];
        let mut substituted = Vec::new();
        for (i, (&arg, param)) in tree.children(ctor).iter().zip(&method.params).enumerate() {
            let Some(default) = &param.default else { continue };
            let hit = classifier.is_default(arg, &param.ty, default).map_err(|e| match e {
                ClassifyError::Decode(e) => RewriteError::Decode(e),
                source => RewriteError::MalformedComposite {
                    param: param.name.to_string(),
                    source,
                },
            })?;
            if !hit {
                continue;
            }
            let subtree = tree.post_order(arg);
            // A `dup` elsewhere still observes the literal value.
            if subtree.iter().any(|id| duplicated[id.index()]) {
                debug!(key = %def.key, param = %param.name, "default argument is duplicated, keeping it");
                continue;
            }
            for id in subtree {
                skip[id.index()] = true;
            }
            substitute[arg.index()] = Some(i);
            substituted.push(param.name.clone());
        }

        let layout = RoutineLayout {
            has_this: def.has_this,
            params: def.params.clone(),
        };
        let mut ops = Vec::with_capacity(tree.len() + 2 * substituted.len());
        for id in tree.ids() {
            if let Some(i) = substitute[id.index()] {
                let ty = &method.params[i].ty;
                ops.push(RoutineOp::LoadContext);
                ops.push(RoutineOp::Resolve(ty.clone()));
                if ty.is_value_type() {
                    ops.push(RoutineOp::Unbox(ty.clone()));
                }
            } else if !skip[id.index()] {
                ops.push(remap(tree.instruction(id), &layout)?);
            }
        }

        debug!(
            key = %def.key,
            ops = ops.len(),
            substituted = substituted.len(),
            "synthesized factory routine"
        );
        Ok(SynthesizedRoutine {
            key: def.key,
            locals: def.local_types()?,
            layout,
            ops,
            returns: def.returns.clone(),
            substituted,
        })
    }

    /// Drop fall-through branches and reject anything that cannot be replayed
    /// as straight-line code.
    fn replayable(&self, instrs: Vec<Instruction>) -> Result<Vec<Instruction>, RewriteError> {
        let mut out = Vec::with_capacity(instrs.len());
        for instr in instrs {
            let opcode = instr.opcode();
            let unsupported = RewriteError::UnsupportedOperation {
                offset: instr.offset(),
                opcode,
            };
            if opcode.is_branch() {
                let fallthrough = matches!(opcode, OpCode::Br | OpCode::BrS)
                    && instr.branch_target() == Some(instr.next_offset());
                if fallthrough && self.options.allow_fallthrough_branches {
                    continue;
                }
                return Err(unsupported);
            }
            if opcode.is_tree_disallowed()
                || matches!(
                    opcode,
                    OpCode::Jmp | OpCode::Throw | OpCode::Rethrow | OpCode::Endfinally | OpCode::Endfilter
                )
            {
                return Err(unsupported);
            }
            out.push(instr);
        }
        Ok(out)
    }
}

/// The `newobj` packet returned by the tail `ret`.
fn constructed(tree: &PacketTree) -> Result<PacketId, RewriteError> {
    let top = tree.top().ok_or(RewriteError::NotSimpleConstruction)?;
    if tree.instruction(top).opcode() != OpCode::Ret {
        return Err(RewriteError::NotSimpleConstruction);
    }
    let &[ctor] = tree.children(top) else {
        return Err(RewriteError::NotSimpleConstruction);
    };
    if tree.instruction(ctor).opcode() != OpCode::Newobj {
        return Err(RewriteError::NotSimpleConstruction);
    }
    // A duplicated instance is being initialized after construction.
    if tree.ids().any(|id| tree.get(id).dup_of() == Some(ctor)) {
        return Err(RewriteError::NotSimpleConstruction);
    }
    Ok(ctor)
}

/// Packets that some `dup` copies.
fn duplicated_packets(tree: &PacketTree) -> Vec<bool> {
    let mut out = vec![false; tree.len()];
    for id in tree.ids() {
        if let Some(source) = tree.get(id).dup_of() {
            out[source.index()] = true;
        }
    }
    out
}

/// Copy `instr` into the routine, moving argument accesses to the new layout.
fn remap(instr: &Instruction, layout: &RoutineLayout) -> Result<RoutineOp, RewriteError> {
    let Some(original) = instr.arg_index() else {
        return Ok(RoutineOp::Replay(instr.clone()));
    };
    let index = layout.remap(original).ok_or(RewriteError::ArgumentOutOfRange {
        offset: instr.offset(),
        index: original,
    })?;
    Ok(match instr.opcode() {
        OpCode::LdargaS | OpCode::Ldarga => RoutineOp::LoadArgAddr(index),
        OpCode::StargS | OpCode::Starg => RoutineOp::StoreArg(index),
        _ => RoutineOp::LoadArg(index),
    })
}

#[cfg(test)]
mod rewrite_test;
