use criterion::criterion_main;

mod benchmarks;

criterion_main! {
    benchmarks::compilebench::compilebench,
    benchmarks::cascadebench::cascadebench,
}
