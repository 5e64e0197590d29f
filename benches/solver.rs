//! Solver benchmarks on a parametric arbiter.
//!
//! Run with:
//! ```bash
//! cargo bench --bench solver
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gr1_rs::bdd::Bdd;
use gr1_rs::config::SynthesisConfig;
use gr1_rs::encoding::Player;
use gr1_rs::formula::{compile_specification, Expr, Specification, Temporal};
use gr1_rs::game::{GameStructure, Selection};
use gr1_rs::solver::{system_wins_initially, Solver};
use gr1_rs::synthesis::Synthesizer;

/// `n` clients with mutually exclusive grants; with `strict`, grants must also be immediate.
fn arbiter(n: usize, strict: bool) -> Specification {
    let mut spec = Specification::new();
    for i in 0..n {
        spec = spec.input(&format!("r{}", i));
    }
    for i in 0..n {
        spec = spec.output(&format!("g{}", i));
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let both = Expr::next(Expr::var(format!("g{}", i))) & Expr::next(Expr::var(format!("g{}", j)));
            spec = spec.guarantee(&format!("mutex_{}_{}", i, j), Temporal::Always(!both));
        }
        let served = !Expr::var(format!("r{}", i)) | Expr::var(format!("g{}", i));
        spec = spec.guarantee(&format!("fair_{}", i), Temporal::AlwaysEventually(served));
        if strict {
            let prompt = Expr::next(Expr::var(format!("r{}", i))).implies(Expr::next(Expr::var(format!("g{}", i))));
            spec = spec.guarantee(&format!("prompt_{}", i), Temporal::Always(prompt));
        }
    }
    spec
}

fn bench_realizability(c: &mut Criterion) {
    let mut group = c.benchmark_group("realizability");
    for n in [2, 4, 6] {
        group.bench_with_input(BenchmarkId::new("arbiter", n), &n, |b, &n| {
            let spec = arbiter(n, false);
            b.iter(|| {
                let bdd = Bdd::new(16);
                let (vars, formulas) = compile_specification(&bdd, &spec).unwrap();
                let game = GameStructure::build(&bdd, &vars, &formulas, &Selection::all(formulas.len()));
                let solution = Solver::new(&bdd, &game, Player::System).solve();
                assert!(system_wins_initially(&bdd, &game, solution.winning));
            });
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    for n in [2, 3] {
        group.bench_with_input(BenchmarkId::new("controller", n), &n, |b, &n| {
            let spec = arbiter(n, false);
            b.iter(|| Synthesizer::new(SynthesisConfig::default()).run(&spec).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("diagnosis", n), &n, |b, &n| {
            let spec = arbiter(n, true);
            b.iter(|| Synthesizer::new(SynthesisConfig::default()).run(&spec).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_realizability, bench_pipeline);
criterion_main!(benches);
