#[macro_use]
extern crate criterion;

use criterion::Criterion;

mod membership;

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = membership::benchmark
}
criterion_main!(benches);
