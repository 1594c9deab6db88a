use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use starcache::agg::{AggregationKey, CellRequest};
use starcache::cache::{DiskCacheConfig, DiskSegmentCache, MemorySegmentCache, SegmentCache};
use starcache::compound::{compile_predicate, CompoundPredicateInfo};
use starcache::member::{Level, Measure, Member, StaticMeasureGroup};
use starcache::segment::{SegmentBody, SegmentData, SegmentHeader};
use starcache::star::Star;
use starcache::value::Value;
use std::sync::Arc;

fn measure() -> (Arc<Star>, Measure) {
    let star = Star::builder("sales_fact")
        .column("store", "country")
        .column("store", "state")
        .column("store", "city")
        .column("customer", "gender")
        .build();
    let mg = StaticMeasureGroup::new("Sales", Arc::clone(&star))
        .link("Store", "country", "store", "country")
        .link("Store", "state", "store", "state")
        .link("Store", "city", "store", "city")
        .link("Gender", "gender", "customer", "gender");
    (star, Measure::stored("Unit Sales", Arc::new(mg)))
}

/// Mix of state tuples, city tuples and state-by-gender tuples
fn create_tuples(count: usize) -> Vec<Vec<Member>> {
    let state = Level::new("Store", "State", ["country", "state"]);
    let city = Level::new("Store", "City", ["country", "state", "city"]);
    let gender = Level::new("Gender", "Gender", ["gender"]);

    (0..count)
        .map(|i| {
            let country = format!("C{}", i % 7);
            let st = format!("S{}", i);
            match i % 3 {
                0 => vec![Member::regular(&state, st.clone(), [country, st])],
                1 => vec![Member::regular(&city, format!("T{}", i), [country, st, format!("T{}", i)])],
                _ => vec![
                    Member::regular(&state, st.clone(), [country, st]),
                    Member::regular(&gender, "F", ["F"]),
                ],
            }
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let (_, measure) = measure();
    let mut group = c.benchmark_group("compile_predicate");

    for size in [10, 100, 1000].iter() {
        let tuples = create_tuples(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(compile_predicate(&tuples, &measure)));
        });
    }

    group.finish();
}

fn bench_key_equality(c: &mut Criterion) {
    let (star, measure) = measure();
    let mut group = c.benchmark_group("aggregation_key_eq");

    for size in [10, 100, 1000].iter() {
        let tuples = create_tuples(*size);
        let mut reversed = tuples.clone();
        reversed.reverse();

        let key = |tuples: &[Vec<Member>]| {
            let mut request = CellRequest::new(Arc::clone(&star));
            request.add_compound(&CompoundPredicateInfo::new(tuples, &measure));
            AggregationKey::from_cell_request(&request)
        };
        let k1 = key(&tuples);
        let k2 = key(&reversed);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(k1 == k2));
        });
    }

    group.finish();
}

fn bench_cache_round_trip(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let disk: Arc<dyn SegmentCache> =
        Arc::new(DiskSegmentCache::new(DiskCacheConfig::new(temp_dir.path())).unwrap());
    let memory: Arc<dyn SegmentCache> = Arc::new(MemorySegmentCache::new());

    let (star, _) = measure();
    let header = SegmentHeader::builder("FoodMart", "Sales", star.fact_table(), Default::default())
        .measure_name("Unit Sales")
        .build();
    let body = SegmentBody::new(
        vec![(0..1000).map(Value::Int).collect()],
        vec![false],
        SegmentData::Dense((0..1000).map(|i| Some(i as f64)).collect()),
    );

    let mut group = c.benchmark_group("segment_cache_put_get");
    for (name, cache) in [("disk", &disk), ("memory", &memory)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                cache.put(&header, &body);
                black_box(cache.get(&header))
            });
        });
    }
    group.finish();
    disk.tear_down();
}

criterion_group!(benches, bench_compile, bench_key_equality, bench_cache_round_trip);
criterion_main!(benches);
