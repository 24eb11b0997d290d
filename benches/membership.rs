use criterion::Criterion;

use georegistry_core::georegistry::*;
use test_utils::*;

/// A country covering every prefix that starts with `k`, with alternating 4th-level bits.
fn synthetic_country() -> Vec<(PrefixKey, CoverageBitmap)> {
    let mut builder = CoverageBuilder::new("CG".parse().unwrap());
    for level1 in COVERAGE_SYMBOLS.iter() {
        for level2 in COVERAGE_SYMBOLS.iter() {
            let prefix = PrefixKey::from_symbols('k', *level1 as char, *level2 as char).unwrap();
            let symbols = COVERAGE_SYMBOLS.iter().step_by(2).map(|b| *b as char);
            builder.insert(prefix, symbols).unwrap();
        }
    }
    builder.finish()
}

fn geohashes() -> Vec<String> {
    COVERAGE_SYMBOLS
        .iter()
        .flat_map(|a| {
            COVERAGE_SYMBOLS
                .iter()
                .map(move |b| format!("k{}{}{}zz", *a as char, *b as char, *a as char))
        })
        .collect()
}

pub fn benchmark(c: &mut Criterion) {
    let country: CountryCode = "CG".parse().unwrap();
    let pairs = synthetic_country();
    let queries = geohashes();

    let memory = MemoryRegistry::new();
    BatchLoader::new(&memory, LoadOptions::default()).unwrap().load(country, &pairs).unwrap();
    let mut cycle = queries.iter().cycle();
    c.bench_function("is_inside_memory", move |b| {
        b.iter(|| memory.is_inside(country, cycle.next().unwrap()).unwrap())
    });

    let test_registry = create_registry(Vec::new(), RegistryOptions::default());
    BatchLoader::new(&test_registry.registry, LoadOptions::default())
        .unwrap()
        .load(country, &pairs)
        .unwrap();
    let mut cycle = queries.iter().cycle();
    c.bench_function("is_inside_rocksdb", move |b| {
        b.iter(|| test_registry.registry.is_inside(country, cycle.next().unwrap()).unwrap())
    });

    c.bench_function("load_country_rocksdb", move |b| {
        b.iter(|| {
            let directory: tempfile::TempDir = tempfile::tempdir().unwrap();
            let registry = RocksRegistry::open(directory.path(), RegistryOptions::default()).unwrap();
            BatchLoader::new(&registry, LoadOptions::default())
                .unwrap()
                .load(country, &pairs)
                .unwrap()
        })
    });
}
