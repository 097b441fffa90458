//! Criterion benchmarks for FactorLab hot paths.
//!
//! Benchmarks:
//! 1. Monthly feature engine over multi-year daily tables
//! 2. Momentum 12-1 baseline (daily weights + returns)
//! 3. Return model fits at walk-forward training-set sizes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use factorlab_core::domain::PriceTable;
use factorlab_core::features::compute_monthly_features;
use factorlab_core::model::{BoostedStumps, BoostingParams, ReturnModel, RidgeRegression};
use factorlab_core::strategies::Momentum12_1;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_table(n: usize, num_symbols: usize) -> PriceTable {
    let base_date = chrono::NaiveDate::from_ymd_opt(2015, 1, 2).unwrap();
    let dates: Vec<_> = (0..n)
        .map(|i| base_date + chrono::Duration::days(i as i64))
        .collect();
    let tickers: Vec<String> = (0..num_symbols).map(|i| format!("SYM{i}")).collect();
    let rows = (0..n)
        .map(|i| {
            (0..num_symbols)
                .map(|si| 100.0 + (si as f64 * 10.0) + (i as f64 * 0.05 + si as f64).sin() * 10.0)
                .collect()
        })
        .collect();
    PriceTable::from_rows(dates, tickers, rows)
}

fn make_training_set(rows: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let x: Vec<Vec<f64>> = (0..rows)
        .map(|i| {
            let t = i as f64;
            vec![
                (t * 0.37).sin(),
                (t * 0.11).cos(),
                (t * 0.05).sin().abs(),
                1.0 + (t * 0.23).sin() * 0.3,
                -(t * 0.07).cos().abs() * 0.2,
            ]
        })
        .collect();
    let y = x.iter().map(|r| 0.01 * r[0] - 0.02 * r[1]).collect();
    (x, y)
}

// ── 1. Feature engine ───────────────────────────────────────────────

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("monthly_features");

    for &days in &[1260, 2520, 3780] {
        let table = make_table(days, 8);
        group.bench_with_input(BenchmarkId::new("8_symbols", days), &days, |b, _| {
            b.iter(|| compute_monthly_features(black_box(&table), "SYM0"))
        });
    }

    group.finish();
}

// ── 2. Momentum baseline ────────────────────────────────────────────

fn bench_momentum(c: &mut Criterion) {
    let mut group = c.benchmark_group("momentum_12_1");
    let strategy = Momentum12_1::default();

    for &symbols in &[8, 100] {
        let table = make_table(2520, symbols);
        group.bench_with_input(BenchmarkId::new("2520_days", symbols), &symbols, |b, _| {
            b.iter(|| strategy.compute(black_box(&table)))
        });
    }

    group.finish();
}

// ── 3. Model fits ───────────────────────────────────────────────────

fn bench_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_fit");
    let (x, y) = make_training_set(1_000);

    group.bench_function("ridge_1000_rows", |b| {
        b.iter(|| {
            let mut model = RidgeRegression::new(1.0);
            model.fit(black_box(&x), black_box(&y))
        })
    });

    group.bench_function("boosted_stumps_1000_rows", |b| {
        b.iter(|| {
            let mut model = BoostedStumps::new(BoostingParams::default());
            model.fit(black_box(&x), black_box(&y))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_features, bench_momentum, bench_models);
criterion_main!(benches);
