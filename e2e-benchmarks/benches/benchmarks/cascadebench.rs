use criterion::{black_box, criterion_group, Criterion};

use common::condition::Restriction;
use common::engine::{DependencyEdge, MetadataSource, TableRef};
use common::plan::SimpleCatalog;
use common::query::{NodeRef, QueryNode};
use common::testutil::int_heading;
use common::SqlLiteral;
use depgraph::{cascade_plan, DependencyGraph};

/// A chain of `length` tables, each referencing the previous one and sharing
/// the root key attribute.
fn chain_catalog(length: usize) -> SimpleCatalog {
    let mut catalog = SimpleCatalog::new();
    for i in 0..length {
        let own = format!("id{}", i);
        let keys: Vec<&str> = vec!["k", own.as_str()];
        catalog.add_table(&TableRef::new(&format!("t{}", i)), int_heading(&keys, &[]));
        if i > 0 {
            catalog.add_foreign_key(DependencyEdge {
                child: TableRef::new(&format!("t{}", i)),
                parent: TableRef::new(&format!("t{}", i - 1)),
                is_primary: true,
            });
        }
    }
    catalog
}

fn chain_seed(catalog: &SimpleCatalog) -> NodeRef {
    let root = QueryNode::base(
        TableRef::new("t0"),
        catalog
            .describe_table(&TableRef::new("t0"))
            .expect("root table is in the catalog"),
    )
    .expect("base should build");
    QueryNode::restrict(&root, Restriction::eq("k", SqlLiteral::Int(1)))
        .expect("restriction should build")
}

fn bench_cascade_plan(c: &mut Criterion) {
    let catalog = chain_catalog(24);
    let mut graph = DependencyGraph::new();
    graph.load(&catalog, "").expect("load should succeed");
    let seed = chain_seed(&catalog);
    c.bench_function("cascade_plan_chain", |b| {
        b.iter(|| cascade_plan(black_box(&graph), &seed, &catalog).unwrap())
    });
}

fn bench_descendants(c: &mut Criterion) {
    let catalog = chain_catalog(24);
    let mut graph = DependencyGraph::new();
    graph.load(&catalog, "").expect("load should succeed");
    let root = TableRef::new("t0");
    c.bench_function("descendants_chain", |b| {
        b.iter(|| black_box(&graph).descendants(&root))
    });
}

criterion_group! {
    name = cascadebench;
    config = Criterion::default().sample_size(10);
    targets =
    bench_cascade_plan,
    bench_descendants,
}
