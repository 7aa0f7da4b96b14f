//! Performance benchmarks for the optimizer and backtester.
//!
//! Run with: cargo bench

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neutralbook::backtest::Backtester;
use neutralbook::optimizer::{ExposureRange, Optimizer, OptimizerConfig};
use neutralbook::runner::{Snapshot, StrategyRunner};
use neutralbook::schedule::{QuarterlySchedule, ScheduleProvider};
use neutralbook::signal::zscores;
use neutralbook::types::{AssetRecord, ReturnsTable, ScheduleEntry, WeightVector};
use std::collections::BTreeMap;

const SECTORS: [&str; 4] = ["Tech", "Energy", "Financials", "Utilities"];

/// Generate a synthetic universe with deterministic factor values.
fn generate_universe(count: usize, seed: usize) -> Vec<AssetRecord> {
    (0..count)
        .map(|i| {
            let x = (i + seed) as f64;
            AssetRecord::new(
                format!("T{:04}", i),
                0.6 + 0.8 * ((x * 0.37).sin() * 0.5 + 0.5),
                SECTORS[i % SECTORS.len()],
                1.0e6 * (1.0 + (x * 1.3).cos().abs() * 50.0),
                (x * 0.71).sin() * 0.1,
            )
        })
        .collect()
}

/// Generate daily returns for `tickers` over `days` calendar days.
fn generate_returns(tickers: usize, start: NaiveDate, days: usize) -> ReturnsTable {
    let dates = (0..days as i64).map(|i| start + Duration::days(i)).collect();
    let names = (0..tickers).map(|i| format!("T{:04}", i)).collect();
    let rows = (0..days)
        .map(|d| {
            (0..tickers)
                .map(|t| ((d * 31 + t * 17) as f64 * 0.13).sin() * 0.02)
                .collect()
        })
        .collect();
    ReturnsTable::new(dates, names, rows).unwrap()
}

fn bench_config() -> OptimizerConfig {
    OptimizerConfig {
        beta_range: ExposureRange::symmetric(0.05),
        sector_range: ExposureRange::symmetric(0.05),
        max_weight: 0.1,
        use_log_liquidity: true,
    }
}

/// Benchmark the single-date optimizer across universe sizes.
fn bench_optimizer(c: &mut Criterion) {
    let optimizer = Optimizer::new(bench_config()).unwrap();
    let mut group = c.benchmark_group("optimizer");
    group.sample_size(10);

    for size in [25, 50, 100].iter() {
        let universe = generate_universe(*size, 0);
        group.bench_with_input(BenchmarkId::new("optimize", size), &universe, |b, universe| {
            b.iter(|| optimizer.optimize(black_box(universe)))
        });
    }

    let signals: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.7).sin()).collect();
    group.bench_function("zscores_1000", |b| b.iter(|| zscores(black_box(&signals))));

    group.finish();
}

/// Benchmark the backtester over a ten-year quarterly schedule.
fn bench_backtest(c: &mut Criterion) {
    let schedule = QuarterlySchedule.schedule(2014, 2023).unwrap();
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();

    let mut group = c.benchmark_group("backtest");

    for tickers in [50, 200, 500].iter() {
        let table = generate_returns(*tickers, start, 3652);
        let weights: BTreeMap<NaiveDate, WeightVector> = schedule
            .iter()
            .map(|e| {
                let w = (0..*tickers).map(|i| {
                    let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                    (format!("T{:04}", i), sign * 2.0 / *tickers as f64)
                });
                (e.entry, WeightVector::from_pairs(w))
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("run", tickers), &table, |b, table| {
            let backtester = Backtester::default();
            b.iter(|| backtester.run(black_box(&weights), black_box(&schedule), black_box(table)))
        });
    }

    group.finish();
}

/// Compare parallel and sequential rebalancing over many dates.
fn bench_rebalance(c: &mut Criterion) {
    let start = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
    let snapshots: Vec<Snapshot> = (0..16)
        .map(|k| {
            let entry = start + Duration::weeks(13 * k as i64);
            Snapshot {
                entry: ScheduleEntry::window(entry, entry + Duration::weeks(1)),
                records: generate_universe(40, k),
            }
        })
        .collect();
    let config = bench_config();

    let mut group = c.benchmark_group("rebalance");
    group.sample_size(10);

    for parallel in [true, false] {
        let runner = StrategyRunner::default().parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| runner.rebalance(black_box(&snapshots), &config))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_optimizer, bench_backtest, bench_rebalance);
criterion_main!(benches);
