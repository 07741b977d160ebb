use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ride_insights::analytics::anomaly::rank_by_deviation;
use ride_insights::{AnomalyDetector, DetectorConfig, RideRecord};

/// 決定的な疑似乱数でスナップショットを生成
fn snapshot(size: usize) -> Vec<RideRecord> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 10_000) as f64 / 10_000.0
    };

    (0..size)
        .map(|i| {
            let zone = (i % 60) as i64 + 1;
            let distance = 0.5 + next() * 12.0;
            let speed = 4.0 + next() * 30.0;
            let fare = 2.5 + distance * 2.5 + next() * 6.0;
            RideRecord {
                trip_id: i as i64 + 1,
                pickup_zone_id: zone,
                pickup_zone: format!("Zone {}", zone),
                fare_amount: if i % 997 == 0 { fare * 8.0 } else { fare },
                trip_distance: distance,
                speed_mph: if i % 1499 == 0 { speed * 5.0 } else { speed },
                duration_minutes: distance / speed * 60.0,
            }
        })
        .collect()
}

fn benchmark_detect(c: &mut Criterion) {
    let detector = AnomalyDetector::new(DetectorConfig::default());
    let mut group = c.benchmark_group("detect_anomalies");

    for size in [1_000usize, 10_000] {
        let rides = snapshot(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &rides, |b, rides| {
            b.iter(|| detector.detect(black_box(rides)))
        });
    }

    group.finish();
}

fn benchmark_ranking(c: &mut Criterion) {
    let report = AnomalyDetector::new(DetectorConfig {
        z_threshold: 0.5,
        ..DetectorConfig::default()
    })
    .detect(&snapshot(10_000));
    let anomalies = report.fare_anomalies;

    c.bench_function("rank_fare_anomalies", |b| {
        b.iter(|| {
            let mut items = anomalies.clone();
            rank_by_deviation(black_box(&mut items));
            items
        })
    });
}

criterion_group!(benches, benchmark_detect, benchmark_ranking);
criterion_main!(benches);
