//! Policy and lowering benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fpc::config::CompileOptions;
use fpc::driver::compile_source;
use fpc::fp::{FloatingPointModePolicy, FpPragma, ScopeKind};

fn bench_policy_stack(c: &mut Criterion) {
    c.bench_function("policy_nested_scopes", |b| {
        b.iter(|| {
            let mut policy = FloatingPointModePolicy::default();
            for _ in 0..64 {
                policy.enter_function(ScopeKind::Function);
                for _ in 0..8 {
                    policy.enter_scope(ScopeKind::Block);
                    let _ = policy.apply_pragma(&FpPragma::Precise { on: false, push: false });
                    black_box(policy.query());
                    let _ = policy.exit_scope();
                }
                let _ = policy.exit_function();
            }
            black_box(policy.finish())
        })
    });

    c.bench_function("policy_push_pop", |b| {
        b.iter(|| {
            let mut policy = FloatingPointModePolicy::default();
            for _ in 0..256 {
                let _ = policy.apply_pragma(&FpPragma::Except { on: true, push: true });
                black_box(policy.current());
            }
            for _ in 0..256 {
                let _ = policy.apply_pragma(&FpPragma::Pop);
            }
            black_box(policy.depth())
        })
    });
}

fn bench_lowering(c: &mut Criterion) {
    let mut source = String::new();
    for i in 0..200 {
        if i % 10 == 0 {
            source.push_str("#pragma float_control(except, on, push)\n");
        }
        source.push_str(&format!(
            "fn f{i}(a: f32, b: f32, c: f64) -> f64 {{\n    let x: f32 = a * b + a;\n    return x / c - c;\n}}\n"
        ));
        if i % 10 == 0 {
            source.push_str("#pragma float_control(pop)\n");
        }
    }
    let options = CompileOptions::default();

    c.bench_function("compile_200_functions", |b| {
        b.iter(|| compile_source("bench.fp", black_box(&source), &options))
    });
}

criterion_group!(benches, bench_policy_stack, bench_lowering);
criterion_main!(benches);
