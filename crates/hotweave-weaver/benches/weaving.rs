use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hotweave_bytecode::{Instruction, MethodBuilder, MethodRef, Module, TypeBuilder, TypeRef};
use hotweave_weaver::{ModuleResolver, WeaveOptions, WeavePolicy, Weaver};

/// `depth` classes in a single inheritance chain, each with `methods` virtual methods
fn hierarchy(depth: usize, methods: usize) -> Module {
    let mut module = Module::new("Bench");
    for level in 0..depth {
        let base = if level == 0 {
            TypeRef::object()
        } else {
            TypeRef::class(format!("Bench.T{}", level - 1))
        };
        let mut ty = TypeBuilder::class(format!("Bench.T{}", level))
            .extends(base.clone())
            .method(
                MethodBuilder::constructor()
                    .code(vec![
                        Instruction::ldarg(0),
                        Instruction::call(MethodRef::constructor(base, vec![])),
                        Instruction::ret(),
                    ])
                    .build(),
            );
        for m in 0..methods {
            ty = ty.method(
                MethodBuilder::new(format!("M{}_{}", level, m))
                    .virtual_slot()
                    .param("x", TypeRef::int32())
                    .returns(TypeRef::int32())
                    .code(vec![Instruction::ldarg(1), Instruction::ret()])
                    .build(),
            );
        }
        module.add_type(ty.build());
    }
    module
}

fn bench_weave_module(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_module");

    for (depth, methods) in [(4, 8), (16, 8), (16, 32)] {
        let module = hierarchy(depth, methods);
        group.throughput(Throughput::Elements((depth * methods) as u64));
        group.bench_with_input(
            BenchmarkId::new("hierarchy", format!("{}x{}", depth, methods)),
            &module,
            |b, module| {
                let weaver = Weaver::new(WeaveOptions::new("Bench.hwm"), WeavePolicy::default());
                let resolver = ModuleResolver::new(Vec::new());
                b.iter(|| {
                    let mut copy = module.clone();
                    weaver
                        .weave_module(black_box(&mut copy), &resolver, None)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_override_synthesis(c: &mut Criterion) {
    let module = hierarchy(16, 8);
    let mut options = WeaveOptions::new("Bench.hwm");
    options.allow_override = true;
    let weaver = Weaver::new(options, WeavePolicy::default());
    let resolver = ModuleResolver::new(Vec::new());

    c.bench_function("weave_with_overrides", |b| {
        b.iter(|| {
            let mut copy = module.clone();
            weaver
                .weave_module(black_box(&mut copy), &resolver, None)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_weave_module, bench_override_synthesis);
criterion_main!(benches);
