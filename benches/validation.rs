use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jib_gateway::security::{normalize_flag_for, validate_gh_api_path, validate_git_args};
use serde_json::{json, Value};

fn args(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| json!(v)).collect()
}

fn generate_paths(num_args: usize) -> Vec<Value> {
    (0..num_args).map(|i| json!(format!("src/file_{}.rs", i))).collect()
}

fn bench_validate_git_args(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_git_args");

    let simple = args(&["--short", "--branch"]);
    group.bench_with_input(BenchmarkId::new("status", "2_flags"), &simple, |b, a| {
        b.iter(|| validate_git_args(black_box("status"), black_box(a)))
    });

    let log = args(&["-20", "--oneline", "--graph", "--format=%h %s", "--", "src"]);
    group.bench_with_input(BenchmarkId::new("log", "mixed"), &log, |b, a| {
        b.iter(|| validate_git_args(black_box("log"), black_box(a)))
    });

    let blocked = args(&["--oneline", "--upload-pack=/tmp/evil"]);
    group.bench_with_input(BenchmarkId::new("log", "blocked"), &blocked, |b, a| {
        b.iter(|| validate_git_args(black_box("log"), black_box(a)))
    });

    for size in [10, 100, 1000] {
        let mut many = args(&["--"]);
        many.extend(generate_paths(size));
        group.bench_with_input(BenchmarkId::new("add_paths", size), &many, |b, a| {
            b.iter(|| validate_git_args(black_box("add"), black_box(a)))
        });
    }

    group.finish();
}

fn bench_normalize_flag(c: &mut Criterion) {
    c.bench_function("normalize_flag_for", |b| {
        b.iter(|| {
            for (op, flag) in [("status", "-s"), ("log", "-n"), ("push", "-u"), ("grep", "-E")] {
                black_box(normalize_flag_for(black_box(op), black_box(flag)));
            }
        })
    });
}

fn bench_gh_api_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_gh_api_path");

    let cases = [
        ("user", "GET"),
        ("repos/acme/widgets/pulls", "POST"),
        ("repos/acme/widgets/pulls/123/comments", "POST"),
        ("repos/acme/widgets/commits/0123abc/check-runs", "GET"),
        ("repos/acme/widgets/pulls/abc", "GET"),
        ("repos/acme/widgets/pulls/123", "DELETE"),
    ];

    for (path, method) in cases {
        group.bench_with_input(
            BenchmarkId::new(method, path),
            &(path, method),
            |b, (path, method)| b.iter(|| validate_gh_api_path(black_box(path), black_box(method))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_validate_git_args,
    bench_normalize_flag,
    bench_gh_api_paths
);
criterion_main!(benches);
