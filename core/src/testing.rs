//! Fixtures shared by the unit tests.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use crate::exec::{Host, Resolve, Value, zero_value};
use crate::il::{IlWriter, Instruction, TokenTable, decode};
use crate::meta::{FieldRef, MethodRef, Primitive, TypeKind, TypeRef};
use crate::tree::{PacketId, PacketTree, TreeBuilder};
use crate::util::{FastHashMap, fast_hash_map_new};

pub fn int() -> TypeRef {
    TypeRef::primitive(Primitive::I4)
}

pub fn decode_with(table: TokenTable, w: &IlWriter) -> Vec<Instruction> {
    decode(w.as_bytes(), Arc::new(table)).expect("body decodes")
}

pub fn tree_of(table: TokenTable, w: &IlWriter, returns_value: bool) -> PacketTree {
    TreeBuilder::new(returns_value)
        .build(&decode_with(table, w))
        .expect("tree builds")
}

/// Argument packets of the `newobj` under the tail `ret`.
pub fn ctor_args(tree: &PacketTree) -> Vec<PacketId> {
    let ret = tree.top().expect("non-empty tree");
    let ctor = tree.children(ret)[0];
    tree.children(ctor).to_vec()
}

/// An object built by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub struct Constructed {
    pub ty: String,
    pub args: Vec<Value>,
}

/// Host that builds [`Constructed`] records and logs every operation.
#[derive(Default)]
pub struct RecordingHost {
    pub log: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn record(&self, entry: String) {
        self.log.lock().expect("log lock").push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().expect("log lock").clone()
    }
}

impl Host for RecordingHost {
    fn construct(&self, ctor: &MethodRef, args: Vec<Value>) -> Result<Value> {
        self.record(format!("new {}", ctor.declaring));
        Ok(Value::object(Constructed {
            ty: ctor.declaring.name().to_string(),
            args,
        }))
    }

    fn call(&self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>> {
        self.record(format!("call {}", method.name));
        Ok(method.returns_value().then(|| Value::I4(args.len() as i32)))
    }

    fn load_field(&self, field: &FieldRef, _target: Option<&Value>) -> Result<Value> {
        self.record(format!("ldfld {}", field.name));
        Ok(Value::Str(field.name.clone()))
    }

    fn store_field(&self, field: &FieldRef, _target: Option<&Value>, value: Value) -> Result<()> {
        self.record(format!("stfld {} = {value}", field.name));
        Ok(())
    }

    fn default_value(&self, ty: &TypeRef) -> Result<Value> {
        if matches!(ty.kind(), TypeKind::ValueType) {
            return Ok(Value::object(Constructed {
                ty: ty.name().to_string(),
                args: Vec::new(),
            }));
        }
        Ok(zero_value(ty))
    }
}

/// Resolver backed by a name-to-value map that records every request.
#[derive(Default)]
pub struct MapResolver {
    values: FastHashMap<String, Value>,
    failing: FastHashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self {
            values: fast_hash_map_new(),
            failing: fast_hash_map_new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, ty: &str, value: Value) -> Self {
        self.values.insert(ty.to_string(), value);
        self
    }

    /// Make requests for `ty` fail with `message`.
    pub fn failing(mut self, ty: &str, message: &str) -> Self {
        self.failing.insert(ty.to_string(), message.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Resolve for MapResolver {
    fn resolve(&self, ty: &TypeRef, _context: &Value) -> Result<Option<Value>> {
        self.requests.lock().expect("requests lock").push(ty.name().to_string());
        if let Some(message) = self.failing.get(ty.name()) {
            bail!("{message}");
        }
        Ok(self.values.get(ty.name()).cloned())
    }
}
