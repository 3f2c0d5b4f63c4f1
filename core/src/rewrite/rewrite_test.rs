use std::sync::Arc;

use super::*;
use crate::error::{ExecError, RewriteError};
use crate::exec::Value;
use crate::il::{IlWriter, OpCode, TokenTable};
use crate::meta::{Decimal, DefaultValue, FieldRef, IntWidth, MethodRef, ParamInfo, TypeRef};
use crate::testing::{Constructed, MapResolver, RecordingHost, int};

fn service() -> TypeRef {
    TypeRef::class("App.Service")
}

fn logger() -> TypeRef {
    TypeRef::class("App.Logger")
}

fn options() -> TypeRef {
    TypeRef::value_type("App.Options")
}

fn context() -> TypeRef {
    TypeRef::class("App.Context")
}

/// `Service(Logger logger = null, int retries = 3, Options options = default)`
fn service_ctor(table: &mut TokenTable) -> u32 {
    table.method(MethodRef::constructor(
        service(),
        vec![
            ParamInfo::optional("logger", logger(), DefaultValue::Null),
            ParamInfo::optional("retries", int(), DefaultValue::int(3, IntWidth::I32)),
            ParamInfo::optional("options", options(), DefaultValue::Null),
        ],
    ))
}

fn factory(method: u32, table: TokenTable, w: &IlWriter) -> FactoryDefinition {
    FactoryDefinition::new(FactoryKey::new(1, method), w.as_bytes().to_vec(), Arc::new(table), service())
        .with_params(vec![ParamInfo::required("ctx", context())])
}

/// `ctx => new Service()` as compiled: every argument at its default.
fn all_defaults(method: u32) -> FactoryDefinition {
    let mut table = TokenTable::new();
    let ctor = service_ctor(&mut table);
    let opts = table.type_ref(options());
    let mut w = IlWriter::new();
    w.op(OpCode::Ldnull)
        .ldc_i4(3)
        .ldloca(0)
        .op_token(OpCode::Initobj, opts)
        .ldloc(0)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    factory(method, table, &w).with_locals(vec![options()])
}

fn ops_summary(routine: &SynthesizedRoutine) -> Vec<String> {
    routine
        .ops()
        .iter()
        .map(|op| match op {
            RoutineOp::Replay(instr) => instr.opcode().name().to_string(),
            RoutineOp::LoadArg(n) => format!("arg {n}"),
            RoutineOp::LoadArgAddr(n) => format!("arga {n}"),
            RoutineOp::StoreArg(n) => format!("starg {n}"),
            RoutineOp::LoadContext => "ctx".to_string(),
            RoutineOp::Resolve(ty) => format!("resolve {ty}"),
            RoutineOp::Unbox(ty) => format!("unbox {ty}"),
        })
        .collect()
}

#[test]
fn defaults_are_replaced_by_resolution() {
    let applier = PartialApplier::new();
    let routine = applier.synthesize(&all_defaults(0x0600_0001)).expect("synthesize");

    assert_eq!(
        ops_summary(&routine),
        vec![
            "ctx",
            "resolve App.Logger",
            "ctx",
            "resolve System.Int32",
            "unbox System.Int32",
            "ldloca.s",
            "initobj",
            "ctx",
            "resolve App.Options",
            "unbox App.Options",
            "newobj",
            "ret",
        ]
    );
    let names: Vec<&str> = routine.substituted().iter().map(|n| &**n).collect();
    assert_eq!(names, vec!["logger", "retries", "options"]);
    assert_eq!(routine.locals(), &[options()]);
    assert!(routine.to_string().contains("resolve App.Logger"));
}

#[test]
fn synthesized_routine_runs_against_the_host() {
    let applier = PartialApplier::new();
    let bound = applier.apply(&all_defaults(0x0600_0001)).expect("apply");
    let host = RecordingHost::default();
    let resolver = MapResolver::new()
        .with("App.Logger", Value::str("logger"))
        .with("System.Int32", Value::I4(7))
        .with("App.Options", Value::str("options"));

    let result = bound
        .invoke(&host, &resolver, Value::str("request"), vec![Value::str("ctx")])
        .expect("invoke");
    let built = result.downcast_ref::<Constructed>().expect("constructed");
    assert_eq!(built.ty, "App.Service");
    assert_eq!(built.args, vec![Value::str("logger"), Value::I4(7), Value::str("options")]);
    assert_eq!(resolver.requested(), vec!["App.Logger", "System.Int32", "App.Options"]);
    assert_eq!(host.entries(), vec!["new App.Service"]);
}

#[test]
fn explicit_arguments_are_replayed_verbatim() {
    let mut table = TokenTable::new();
    let ctor = service_ctor(&mut table);
    let mut w = IlWriter::new();
    w.ldarg(0).ldc_i4(5).ldarg(0).op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
    let routine = PartialApplier::new()
        .synthesize(&factory(0x0600_0002, table, &w))
        .expect("synthesize");

    assert!(routine.substituted().is_empty());
    assert_eq!(ops_summary(&routine), vec!["arg 1", "ldc.i4.5", "arg 1", "newobj", "ret"]);
}

#[test]
fn required_parameters_are_never_substituted() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![ParamInfo::required("logger", logger())]));
    let mut w = IlWriter::new();
    w.op(OpCode::Ldnull).op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
    let routine = PartialApplier::new()
        .synthesize(&factory(0x0600_0003, table, &w))
        .expect("synthesize");
    assert_eq!(ops_summary(&routine), vec!["ldnull", "newobj", "ret"]);
}

#[test]
fn same_definition_yields_the_same_routine() {
    let applier = PartialApplier::new();
    let first = applier.synthesize(&all_defaults(0x0600_0001)).expect("first");
    let second = applier.synthesize(&all_defaults(0x0600_0001)).expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(applier.len(), 1);

    let other = applier.synthesize(&all_defaults(0x0600_0009)).expect("other");
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(applier.len(), 2);
    assert!(applier.cached(&FactoryKey::new(1, 0x0600_0009)).is_some());
}

#[test]
fn closures_share_the_routine_but_keep_their_target() {
    let applier = PartialApplier::new();
    let a = applier.apply(&all_defaults(0x0600_0001).with_target(Value::str("a"))).expect("a");
    let b = applier.apply(&all_defaults(0x0600_0001).with_target(Value::str("b"))).expect("b");
    assert!(Arc::ptr_eq(a.routine(), b.routine()));
    assert_eq!(a.target(), Some(&Value::str("a")));
    assert_eq!(b.target(), Some(&Value::str("b")));
}

#[test]
fn concurrent_first_requests_observe_one_routine() {
    let applier = PartialApplier::new();
    let def = all_defaults(0x0600_0001);
    let (shared, def_ref) = (&applier, &def);
    let routines: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(move || shared.synthesize(def_ref).expect("synthesize")))
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread")).collect()
    });
    let cached = applier.cached(def.key()).expect("cached");
    assert!(routines.iter().all(|r| Arc::ptr_eq(r, &cached)));
    assert_eq!(applier.len(), 1);
}

#[test]
fn suspension_is_rejected() {
    let err = PartialApplier::new()
        .synthesize(&all_defaults(0x0600_0001).suspending(true))
        .expect_err("async body");
    assert!(matches!(err, RewriteError::Suspension));
    assert_eq!(err.to_string(), "factories cannot use suspension points");
}

#[test]
fn non_constructor_tail_is_rejected() {
    let mut w = IlWriter::new();
    w.ldarg(0).op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_0004, TokenTable::new(), &w))
        .expect_err("returns its argument");
    assert!(matches!(err, RewriteError::NotSimpleConstruction));
    assert_eq!(
        err.to_string(),
        "factory must be a simple expression that constructs the desired type"
    );
}

#[test]
fn post_processing_after_construction_is_rejected() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![]));
    let wrap = table.method(MethodRef {
        name: "Wrap".into(),
        declaring: TypeRef::class("App.Decorators"),
        params: vec![ParamInfo::required("inner", service())],
        returns: service(),
        has_this: false,
    });
    let mut w = IlWriter::new();
    w.op_token(OpCode::Newobj, ctor).op_token(OpCode::Call, wrap).op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_0005, table, &w))
        .expect_err("decorated");
    assert!(matches!(err, RewriteError::NotSimpleConstruction));
}

#[test]
fn object_initializer_is_rejected() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![]));
    let field = table.field(FieldRef {
        name: "Retries".into(),
        declaring: service(),
        ty: int(),
        is_static: false,
    });
    let mut w = IlWriter::new();
    w.op_token(OpCode::Newobj, ctor)
        .op(OpCode::Dup)
        .ldc_i4(5)
        .op_token(OpCode::Stfld, field)
        .op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_0006, table, &w))
        .expect_err("initializer");
    assert!(matches!(err, RewriteError::NotSimpleConstruction));
}

#[test]
fn multi_way_branch_is_unsupported() {
    let mut w = IlWriter::new();
    w.ldarg(0).op_switch(&[]).op(OpCode::Ldnull).op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_0007, TokenTable::new(), &w))
        .expect_err("switch");
    assert!(matches!(
        err,
        RewriteError::UnsupportedOperation {
            opcode: OpCode::Switch,
            offset: 1
        }
    ));
    assert!(err.to_string().starts_with("unsupported operation in factory function"));
}

#[test]
fn fallthrough_branch_is_dropped_unless_disabled() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![]));
    let mut w = IlWriter::new();
    w.op_token(OpCode::Newobj, ctor).op_i1(OpCode::BrS, 0).op(OpCode::Ret);
    let def = factory(0x0600_0008, table, &w);

    let routine = PartialApplier::new().synthesize(&def).expect("synthesize");
    assert_eq!(ops_summary(&routine), vec!["newobj", "ret"]);

    let strict = PartialApplier::with_options(RewriteOptions {
        allow_fallthrough_branches: false,
        ..RewriteOptions::default()
    });
    assert!(matches!(
        strict.synthesize(&def),
        Err(RewriteError::UnsupportedOperation { opcode: OpCode::BrS, .. })
    ));
}

#[test]
fn real_branches_are_unsupported() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![]));
    let mut w = IlWriter::new();
    w.ldarg(0)
        .op_i1(OpCode::BrtrueS, 0)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_000A, table, &w))
        .expect_err("conditional");
    assert!(matches!(err, RewriteError::UnsupportedOperation { opcode: OpCode::BrtrueS, .. }));
}

#[test]
fn instance_factories_shift_original_arguments() {
    let mut table = TokenTable::new();
    let name = table.field(FieldRef {
        name: "name".into(),
        declaring: TypeRef::class("App.Closure"),
        ty: TypeRef::string(),
        is_static: false,
    });
    let ctor = table.method(MethodRef::constructor(
        TypeRef::class("App.Widget"),
        vec![
            ParamInfo::required("name", TypeRef::string()),
            ParamInfo::required("ctx", context()),
        ],
    ));
    let mut w = IlWriter::new();
    w.ldarg(0)
        .op_token(OpCode::Ldfld, name)
        .ldarg(1)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    let def = factory(0x0600_000B, table, &w).with_target(Value::str("closure"));

    let bound = PartialApplier::new().apply(&def).expect("apply");
    assert_eq!(bound.routine().layout().context_index(), 1);
    assert_eq!(ops_summary(bound.routine()), vec!["arg 0", "ldfld", "arg 2", "newobj", "ret"]);

    let host = RecordingHost::default();
    let result = bound
        .invoke(&host, &MapResolver::new(), Value::str("request"), vec![Value::str("ctx")])
        .expect("invoke");
    let built = result.downcast_ref::<Constructed>().expect("constructed");
    assert_eq!(built.args, vec![Value::str("name"), Value::str("ctx")]);
}

#[test]
fn static_factories_shift_every_argument() {
    let mut table = TokenTable::new();
    let ctor = table.method(MethodRef::constructor(service(), vec![ParamInfo::required("ctx", context())]));
    let mut w = IlWriter::new();
    w.ldarg(0).op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
    let routine = PartialApplier::new()
        .synthesize(&factory(0x0600_000C, table, &w))
        .expect("synthesize");
    assert_eq!(routine.layout().context_index(), 0);
    assert_eq!(ops_summary(&routine), vec!["arg 1", "newobj", "ret"]);
}

#[test]
fn unresolvable_type_fails_the_call() {
    let bound = PartialApplier::new().apply(&all_defaults(0x0600_0001)).expect("apply");
    let host = RecordingHost::default();
    let err = bound
        .invoke(&host, &MapResolver::new(), Value::Null, vec![Value::Null])
        .expect_err("nothing registered");
    assert!(matches!(err, ExecError::NotResolvable { ref ty } if ty == "App.Logger"));
}

#[test]
fn resolution_failure_is_not_masked() {
    let bound = PartialApplier::new().apply(&all_defaults(0x0600_0001)).expect("apply");
    let resolver = MapResolver::new().failing("App.Logger", "logger factory exploded");
    let err = bound
        .invoke(&RecordingHost::default(), &resolver, Value::Null, vec![Value::Null])
        .expect_err("resolver failed");
    let ExecError::Resolution { ty, source } = err else {
        panic!("expected a resolution failure");
    };
    assert_eq!(ty, "App.Logger");
    assert_eq!(source.to_string(), "logger factory exploded");
}

#[test]
fn wrong_argument_count_is_rejected() {
    let bound = PartialApplier::new().apply(&all_defaults(0x0600_0001)).expect("apply");
    let err = bound
        .invoke(&RecordingHost::default(), &MapResolver::new(), Value::Null, vec![])
        .expect_err("missing ctx");
    assert!(matches!(err, ExecError::Arity { expected: 1, found: 0 }));
}

#[test]
fn malformed_decimal_literal_names_the_parameter() {
    let mut table = TokenTable::new();
    let price = Decimal::new(10003, 1).expect("fits");
    let ctor = table.method(MethodRef::constructor(
        TypeRef::class("App.Pricing"),
        vec![ParamInfo::optional("price", TypeRef::decimal(), DefaultValue::Decimal(price))],
    ));
    let decimal_ctor = table.method(MethodRef::constructor(
        TypeRef::decimal(),
        (0..5).map(|i| ParamInfo::required(format!("f{i}"), int())).collect(),
    ));
    let mut w = IlWriter::new();
    w.ldc_i4(10003)
        .ldc_i4(0)
        .ldc_i4(0)
        .ldc_i4(0)
        .ldc_i4(40)
        .op_token(OpCode::Newobj, decimal_ctor)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    let err = PartialApplier::new()
        .synthesize(&factory(0x0600_000D, table, &w))
        .expect_err("scale 40");
    assert!(matches!(err, RewriteError::MalformedComposite { ref param, .. } if param == "price"));
}

#[test]
fn decimal_default_is_resolved() {
    let mut table = TokenTable::new();
    let price = Decimal::new(10003, 1).expect("fits");
    let ctor = table.method(MethodRef::constructor(
        TypeRef::class("App.Pricing"),
        vec![ParamInfo::optional("price", TypeRef::decimal(), DefaultValue::Decimal(price))],
    ));
    let decimal_ctor = table.method(MethodRef::constructor(
        TypeRef::decimal(),
        (0..5).map(|i| ParamInfo::required(format!("f{i}"), int())).collect(),
    ));
    let mut w = IlWriter::new();
    w.ldc_i4(10003)
        .ldc_i4(0)
        .ldc_i4(0)
        .ldc_i4(0)
        .ldc_i4(1)
        .op_token(OpCode::Newobj, decimal_ctor)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    let routine = PartialApplier::new()
        .synthesize(&factory(0x0600_000E, table, &w))
        .expect("synthesize");
    assert_eq!(
        ops_summary(&routine),
        vec!["ctx", "resolve System.Decimal", "unbox System.Decimal", "newobj", "ret"]
    );
}

#[test]
fn locals_can_come_from_a_signature_blob() {
    let mut table = TokenTable::new();
    let opts = table.type_ref(options());
    let ctor = service_ctor(&mut table);
    let mut w = IlWriter::new();
    w.op(OpCode::Ldnull)
        .ldc_i4(3)
        .ldloca(0)
        .op_token(OpCode::Initobj, opts)
        .ldloc(0)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    // LocalSig, one local: valuetype TypeRef #1
    let def = factory(0x0600_000F, table, &w).with_local_signature(vec![0x07, 0x01, 0x11, 0x05]);
    let routine = PartialApplier::new().synthesize(&def).expect("synthesize");
    assert_eq!(routine.locals(), &[options()]);
}

#[test]
fn traced_synthesis_matches_untraced() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("ilpartial=trace"))
        .with_test_writer()
        .try_init();
    let traced = PartialApplier::with_options(RewriteOptions {
        trace_packets: true,
        ..RewriteOptions::default()
    });
    let plain = PartialApplier::new();
    let a = traced.synthesize(&all_defaults(0x0600_0001)).expect("traced");
    let b = plain.synthesize(&all_defaults(0x0600_0001)).expect("plain");
    assert_eq!(ops_summary(&a), ops_summary(&b));
}

#[test]
fn duplicated_default_is_left_in_place() {
    let mut table = TokenTable::new();
    let ctor = service_ctor(&mut table);
    let opts = table.type_ref(options());
    let mut w = IlWriter::new();
    w.op(OpCode::Ldnull)
        .ldc_i4(3)
        .op(OpCode::Dup)
        .stloc(1)
        .ldloca(0)
        .op_token(OpCode::Initobj, opts)
        .ldloc(0)
        .op_token(OpCode::Newobj, ctor)
        .op(OpCode::Ret);
    let def = factory(0x0600_0010, table, &w).with_locals(vec![options(), int()]);

    let bound = PartialApplier::new().apply(&def).expect("apply");
    let names: Vec<&str> = bound.routine().substituted().iter().map(|n| &**n).collect();
    assert_eq!(names, vec!["logger", "options"]);
    assert_eq!(
        ops_summary(bound.routine()),
        vec![
            "ctx",
            "resolve App.Logger",
            "ldc.i4.3",
            "dup",
            "stloc.1",
            "ldloca.s",
            "initobj",
            "ctx",
            "resolve App.Options",
            "unbox App.Options",
            "newobj",
            "ret",
        ]
    );

    let resolver = MapResolver::new()
        .with("App.Logger", Value::str("logger"))
        .with("App.Options", Value::str("options"));
    let result = bound
        .invoke(&RecordingHost::default(), &resolver, Value::Null, vec![Value::Null])
        .expect("invoke");
    let built = result.downcast_ref::<Constructed>().expect("constructed");
    assert_eq!(built.args[1], Value::I4(3));
    assert_eq!(resolver.requested(), vec!["App.Logger", "App.Options"]);
}

#[test]
fn undeclared_argument_is_rejected() {
    // `new Service(arg)` where `arg` is the given ordinal.
    let passing = |ordinal: u16, method: u32| {
        let mut table = TokenTable::new();
        let ctor = table.method(MethodRef::constructor(service(), vec![ParamInfo::required("ctx", context())]));
        let mut w = IlWriter::new();
        w.ldarg(ordinal).op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
        factory(method, table, &w)
    };

    let err = PartialApplier::new()
        .synthesize(&passing(1, 0x0600_0011))
        .expect_err("static factory has one argument");
    assert!(matches!(err, RewriteError::ArgumentOutOfRange { offset: 0, index: 1 }));

    let err = PartialApplier::new()
        .synthesize(&passing(u16::MAX, 0x0600_0012).with_target(Value::str("closure")))
        .expect_err("ordinal past every layout");
    assert!(matches!(err, RewriteError::ArgumentOutOfRange { index: u16::MAX, .. }));
}

#[test]
fn layout_remap_stays_inside_the_declared_arguments() {
    let params = vec![ParamInfo::required("ctx", context())];
    let closure = RoutineLayout {
        has_this: true,
        params: params.clone(),
    };
    assert_eq!(closure.remap(0), Some(0));
    assert_eq!(closure.remap(1), Some(2));
    assert_eq!(closure.remap(2), None);

    let static_fn = RoutineLayout { has_this: false, params };
    assert_eq!(static_fn.remap(0), Some(1));
    assert_eq!(static_fn.remap(u16::MAX), None);
}

#[test]
fn listing_aligns_synthesized_ops_with_replayed_ones() {
    let routine = PartialApplier::new().synthesize(&all_defaults(0x0600_0001)).expect("synthesize");
    let text = routine.to_string();
    let column = |needle: &str| {
        text.lines()
            .find_map(|line| line.find(needle))
            .unwrap_or_else(|| panic!("{needle} missing from listing"))
    };
    assert_eq!(column("resolve App.Logger"), column("newobj"));
    assert_eq!(column("ldctx"), column("initobj"));
}
