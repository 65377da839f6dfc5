//! Performance benchmarks: evaluation strategies vs the ascent macro.
//!
//! Run with: cargo bench

#![allow(clippy::field_reassign_with_default)]

use ascent::ascent;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use deduce_eval::{EvalConfig, FunctionRegistry, SemiNaiveEvaluation};
use deduce_ir::{Atom, Literal, Program, Rule, Term};

fn run_evaluator(program: &Program, config: EvalConfig) -> SemiNaiveEvaluation {
    let mut eval =
        SemiNaiveEvaluation::from_program(program, FunctionRegistry::with_builtins(), config)
            .unwrap();
    eval.run().unwrap();
    eval
}

fn strategies() -> [(&'static str, EvalConfig); 3] {
    [
        ("sequential", EvalConfig::sequential()),
        ("parallel", EvalConfig::default()),
        ("eager", EvalConfig::default().with_eager(true)),
    ]
}

fn atom(program: &Program, name: &str, vars: &[&str]) -> Atom {
    let symbol = program.relation(name).unwrap().clone();
    Atom::new(symbol, vars.iter().map(|v| Term::var(v)).collect())
}

fn lit(program: &Program, name: &str, vars: &[&str]) -> Literal {
    Literal::Predicate(atom(program, name, vars))
}

fn lt(a: &str, b: &str) -> Literal {
    Literal::eq(
        Term::call("lt", vec![Term::var(a), Term::var(b)]),
        Term::Bool(true),
    )
}

// ─── Transitive Closure ─────────────────────────────────────────────

fn transitive_closure_program(n: i64) -> Program {
    let mut program = Program::new();
    let edge = program.declare("edge", 2).unwrap();
    program.declare("path", 2).unwrap();
    // Linear chain: 1→2→3→...→n
    for i in 1..n {
        program
            .add_fact(&edge, vec![Term::int(i), Term::int(i + 1)])
            .unwrap();
    }
    let base = Rule::new(
        atom(&program, "path", &["X", "Y"]),
        vec![lit(&program, "edge", &["X", "Y"])],
    );
    let step = Rule::new(
        atom(&program, "path", &["X", "Z"]),
        vec![
            lit(&program, "edge", &["X", "Y"]),
            lit(&program, "path", &["Y", "Z"]),
        ],
    );
    program.add_rule(base).unwrap();
    program.add_rule(step).unwrap();
    program
}

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");

    for &n in &[50, 100, 200] {
        let program = transitive_closure_program(n);
        for (name, config) in strategies() {
            group.bench_with_input(BenchmarkId::new(name, n), &n, |b, _| {
                b.iter(|| run_evaluator(&program, config.clone()));
            });
        }

        group.bench_with_input(BenchmarkId::new("ascent_macro", n), &n, |b, &n| {
            b.iter(|| {
                ascent! {
                    relation edge(i64, i64);
                    relation path(i64, i64);
                    path(x, y) <-- edge(x, y);
                    path(x, z) <-- edge(x, y), path(y, z);
                }
                let mut prog = AscentProgram::default();
                prog.edge = (1..n).map(|i| (i, i + 1)).collect();
                prog.run();
                prog
            });
        });
    }
    group.finish();
}

// ─── Triangle Detection ─────────────────────────────────────────────

fn triangle_program(n: i64) -> Program {
    let mut program = Program::new();
    let edge = program.declare("edge", 2).unwrap();
    program.declare("triangle", 3).unwrap();
    // Complete graph K_n
    for i in 1..=n {
        for j in (i + 1)..=n {
            program
                .add_fact(&edge, vec![Term::int(i), Term::int(j)])
                .unwrap();
        }
    }
    let rule = Rule::new(
        atom(&program, "triangle", &["A", "B", "C"]),
        vec![
            lit(&program, "edge", &["A", "B"]),
            lit(&program, "edge", &["B", "C"]),
            lit(&program, "edge", &["A", "C"]),
            lt("A", "B"),
            lt("B", "C"),
        ],
    );
    program.add_rule(rule).unwrap();
    program
}

fn bench_triangle(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangle_detection");

    for &n in &[10, 20, 30] {
        let program = triangle_program(n);
        for (name, config) in strategies() {
            group.bench_with_input(BenchmarkId::new(name, n), &n, |b, _| {
                b.iter(|| run_evaluator(&program, config.clone()));
            });
        }

        group.bench_with_input(BenchmarkId::new("ascent_macro", n), &n, |b, &n| {
            b.iter(|| {
                ascent! {
                    relation edge(i64, i64);
                    relation triangle(i64, i64, i64);
                    triangle(a, b, c) <-- edge(a, b), edge(b, c), edge(a, c),
                        if a < b, if b < c;
                }
                let mut prog = AscentProgram::default();
                prog.edge = (1..=n)
                    .flat_map(|i| ((i + 1)..=n).map(move |j| (i, j)))
                    .collect();
                prog.run();
                prog
            });
        });
    }
    group.finish();
}

// ─── Join Ordering ──────────────────────────────────────────────────

fn bench_optimization(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_ordering");
    let program = triangle_program(25);

    for level in 0..=4 {
        let Some(optimization) = deduce_eval::Optimization::from_level(level) else {
            continue;
        };
        let config = EvalConfig::default().with_optimization(optimization);
        group.bench_with_input(BenchmarkId::new("optimize", level), &level, |b, _| {
            b.iter(|| run_evaluator(&program, config.clone()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_transitive_closure,
    bench_triangle,
    bench_optimization
);
criterion_main!(benches);
