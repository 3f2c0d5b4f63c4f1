use criterion::{Criterion, criterion_group, criterion_main};
use ilpartial_core::{
    FactoryDefinition, FactoryKey, PartialApplier,
    il::{IlWriter, OpCode, TokenTable},
    meta::{DefaultValue, IntWidth, MethodRef, ParamInfo, Primitive, TypeRef},
};
use std::hint::black_box;
use std::sync::Arc;

// ctx => new Service() where every one of `n` optional arguments is left at its default
fn defaulted_factory(n: usize, method: u32) -> FactoryDefinition {
    let mut table = TokenTable::new();
    let params = (0..n)
        .map(|i| {
            if i % 2 == 0 {
                ParamInfo::optional(format!("dep{i}"), TypeRef::class(format!("Bench.Dep{i}")), DefaultValue::Null)
            } else {
                ParamInfo::optional(
                    format!("n{i}"),
                    TypeRef::primitive(Primitive::I4),
                    DefaultValue::int(i as i128, IntWidth::I32),
                )
            }
        })
        .collect();
    let ctor = table.method(MethodRef::constructor(TypeRef::class("Bench.Service"), params));
    let mut w = IlWriter::new();
    for i in 0..n {
        if i % 2 == 0 {
            w.op(OpCode::Ldnull);
        } else {
            w.ldc_i4(i as i32);
        }
    }
    w.op_token(OpCode::Newobj, ctor).op(OpCode::Ret);
    FactoryDefinition::new(
        FactoryKey::new(1, method),
        w.finish(),
        Arc::new(table),
        TypeRef::class("Bench.Service"),
    )
    .with_params(vec![ParamInfo::required("ctx", TypeRef::class("Bench.Context"))])
}

fn bench_synthesize(c: &mut Criterion) {
    let def = defaulted_factory(16, 0x0600_0001);

    // Cold path: fresh cache every iteration
    c.bench_function("synthesize_cold_16_defaults", |b| {
        b.iter(|| {
            let applier = PartialApplier::new();
            let routine = applier.synthesize(black_box(&def)).unwrap();
            black_box(&routine);
        })
    });

    let applier = PartialApplier::new();
    let _ = applier.synthesize(&def).unwrap(); // Warm up cache
    c.bench_function("synthesize_cached_16_defaults", |b| {
        b.iter(|| {
            let routine = applier.synthesize(black_box(&def)).unwrap();
            black_box(&routine);
        })
    });
}

criterion_group!(benches, bench_synthesize);
criterion_main!(benches);
