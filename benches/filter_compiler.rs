use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ride_insights::handlers::database::SqlDialect;
use ride_insights::{FilterCompiler, FilterSpec, RawFilterQuery};

fn full_spec() -> FilterSpec {
    FilterSpec::new()
        .with_boroughs(["Manhattan", "Brooklyn", "Queens"])
        .with_zone_ids([4, 132, 138, 161, 236, 237])
        .with_fare_range(Some(5.0), Some(80.0))
        .with_date_range(NaiveDate::from_ymd_opt(2019, 1, 1), NaiveDate::from_ymd_opt(2019, 1, 31))
        .with_time_of_day("evening")
}

fn benchmark_compile_empty(c: &mut Criterion) {
    let compiler = FilterCompiler::new(SqlDialect::Postgres);
    let spec = FilterSpec::new();

    c.bench_function("compile_empty_spec", |b| {
        b.iter(|| compiler.compile(black_box(&spec)))
    });
}

fn benchmark_compile_full(c: &mut Criterion) {
    let compiler = FilterCompiler::new(SqlDialect::Postgres);
    let spec = full_spec();

    c.bench_function("compile_full_spec", |b| {
        b.iter(|| {
            let filter = compiler.compile(black_box(&spec));
            black_box(filter.where_clause())
        })
    });
}

fn benchmark_raw_query_validation(c: &mut Criterion) {
    let raw = RawFilterQuery {
        boroughs: Some("Manhattan,Brooklyn".to_string()),
        zone_ids: Some("4, 132, x, -1, 161".to_string()),
        fare_min: Some("5".to_string()),
        fare_max: Some("80.5".to_string()),
        start_date: Some("2019-01-01".to_string()),
        end_date: Some("2019-01-31T00:00:00Z".to_string()),
        time_of_day: Some("morning".to_string()),
    };

    c.bench_function("raw_query_into_spec", |b| {
        b.iter(|| black_box(raw.clone()).into_spec())
    });
}

criterion_group!(
    benches,
    benchmark_compile_empty,
    benchmark_compile_full,
    benchmark_raw_query_validation
);
criterion_main!(benches);
