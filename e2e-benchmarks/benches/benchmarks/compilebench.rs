use criterion::{black_box, criterion_group, Criterion};

use common::condition::Restriction;
use common::query::{NodeRef, QueryNode};
use common::testutil::int_base;
use common::SqlLiteral;
use sqlgen::{build, BuildOptions};

fn deep_restriction(depth: usize) -> NodeRef {
    let mut node = int_base("t", &["x"], &["z"]);
    for i in 0..depth {
        node = QueryNode::restrict(&node, Restriction::eq("z", SqlLiteral::Int(i as i64)))
            .expect("restriction should build");
    }
    node
}

fn wide_join(width: usize) -> NodeRef {
    let mut node = int_base("t0", &["x"], &["a0"]);
    for i in 1..width {
        let table = format!("t{}", i);
        let attr = format!("a{}", i);
        let next = int_base(&table, &["x"], &[attr.as_str()]);
        node = QueryNode::join(&node, &next).expect("join should build");
    }
    node
}

fn nested_membership(depth: usize) -> NodeRef {
    let mut member = int_base("m0", &["x"], &[]);
    for i in 1..depth {
        let table = format!("m{}", i);
        let next = int_base(&table, &["x"], &[]);
        member = QueryNode::restrict(&next, Restriction::ByNode(member))
            .expect("membership should build");
    }
    member
}

fn bench_restriction_chain(c: &mut Criterion) {
    let node = deep_restriction(64);
    c.bench_function("compile_restriction_chain", |b| {
        b.iter(|| build(black_box(&node), &BuildOptions::default()).unwrap())
    });
}

fn bench_wide_join(c: &mut Criterion) {
    let node = wide_join(8);
    c.bench_function("compile_wide_join", |b| {
        b.iter(|| build(black_box(&node), &BuildOptions::default()).unwrap())
    });
}

fn bench_nested_membership(c: &mut Criterion) {
    let node = nested_membership(12);
    c.bench_function("compile_nested_membership", |b| {
        b.iter(|| build(black_box(&node), &BuildOptions::default()).unwrap())
    });
}

criterion_group! {
    name = compilebench;
    config = Criterion::default().sample_size(10);
    targets =
    bench_restriction_chain,
    bench_wide_join,
    bench_nested_membership,
}
