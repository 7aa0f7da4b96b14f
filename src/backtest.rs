//! Holding-window backtester.
//!
//! Walks the schedule in entry-date order and, for every window that has a
//! weight vector, writes the daily weighted return of the held book into a
//! zero-initialised series spanning the returns table. A later window
//! overwrites an earlier one on any shared date.

use crate::error::{NeutralBookError, Result};
use crate::types::{ReturnSeries, ReturnsTable, ScheduleEntry, WeightVector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Treatment of a missing (`NaN`) asset return inside a holding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingReturns {
    /// The asset contributes nothing that day.
    #[default]
    TreatAsZero,
    /// The portfolio return for the whole day is set to zero.
    InvalidateDay,
}

/// Backtester settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub missing_returns: MissingReturns,
}

/// Output of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutput {
    /// Daily portfolio returns, zero outside held windows.
    pub portfolio_returns: ReturnSeries,
    /// Running product of (1 + r).
    pub cumulative_returns: ReturnSeries,
    /// Entry dates in the schedule that had no weight vector.
    pub skipped: Vec<NaiveDate>,
}

/// Stateless backtester.
#[derive(Debug, Clone, Default)]
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    /// Run the weights over the schedule.
    ///
    /// Fails with [`NeutralBookError::InputMisalignment`] when the returns table
    /// does not span a window that has weights.
    pub fn run(
        &self,
        weights_by_date: &BTreeMap<NaiveDate, WeightVector>,
        schedule: &[ScheduleEntry],
        daily_returns: &ReturnsTable,
    ) -> Result<BacktestOutput> {
        let mut portfolio = ReturnSeries::zeros(daily_returns.dates());
        let mut skipped = Vec::new();

        let mut ordered: Vec<&ScheduleEntry> = schedule.iter().collect();
        ordered.sort_by_key(|e| e.entry);

        for entry in ordered {
            let Some(weights) = weights_by_date.get(&entry.entry) else {
                debug!("No weights for {}, skipping window", entry.entry);
                skipped.push(entry.entry);
                continue;
            };

            if !daily_returns.covers(entry.entry, entry.exit) {
                let (first, last) = match (daily_returns.first_date(), daily_returns.last_date()) {
                    (Some(f), Some(l)) => (f, l),
                    _ => (NaiveDate::MIN, NaiveDate::MIN),
                };
                return Err(NeutralBookError::InputMisalignment {
                    entry: entry.entry,
                    exit: entry.exit,
                    first,
                    last,
                });
            }

            let held = self.resolve_columns(weights, daily_returns, entry.entry);
            let window = daily_returns.window(entry.entry, entry.exit);
            debug!(
                "Window {} -> {}: {} days, {} positions",
                entry.entry,
                entry.exit,
                window.len(),
                held.len()
            );

            for idx in window {
                portfolio.values[idx] = self.day_return(daily_returns.row(idx), &held);
            }
        }

        for v in portfolio.values.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }

        let cumulative = portfolio.cumulative();
        info!(
            "Backtest over {} days, {} windows skipped, final cumulative {:.4}",
            portfolio.len(),
            skipped.len(),
            cumulative.last().unwrap_or(1.0)
        );

        Ok(BacktestOutput {
            portfolio_returns: portfolio,
            cumulative_returns: cumulative,
            skipped,
        })
    }

    /// Map weighted tickers to table columns, dropping zero weights.
    fn resolve_columns(
        &self,
        weights: &WeightVector,
        table: &ReturnsTable,
        entry: NaiveDate,
    ) -> Vec<(usize, f64)> {
        let mut held = Vec::with_capacity(weights.len());
        let mut unknown = 0usize;
        for (ticker, w) in weights.iter() {
            if w == 0.0 {
                continue;
            }
            match table.column(ticker) {
                Some(col) => held.push((col, w)),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            warn!(
                "{}: {} weighted tickers missing from returns table contribute zero",
                entry, unknown
            );
        }
        held
    }

    fn day_return(&self, row: &[f64], held: &[(usize, f64)]) -> f64 {
        let mut total = 0.0;
        for &(col, w) in held {
            let r = row[col];
            if r.is_finite() {
                total += w * r;
            } else if self.config.missing_returns == MissingReturns::InvalidateDay {
                return 0.0;
            }
        }
        total
    }
}

/// Run a backtest with default settings.
pub fn run(
    weights_by_date: &BTreeMap<NaiveDate, WeightVector>,
    schedule: &[ScheduleEntry],
    daily_returns: &ReturnsTable,
) -> Result<BacktestOutput> {
    Backtester::default().run(weights_by_date, schedule, daily_returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, day).unwrap()
    }

    /// Every calendar day in January and February with constant per-asset returns.
    fn constant_table(returns: [f64; 3]) -> ReturnsTable {
        let dates: Vec<NaiveDate> = (0..59).map(|i| d(1, 1) + Duration::days(i)).collect();
        let rows = vec![returns.to_vec(); dates.len()];
        ReturnsTable::new(
            dates,
            vec!["A".into(), "B".into(), "C".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_window_receives_dot_product() {
        let table = constant_table([0.01, -0.02, 0.005]);
        let schedule = vec![ScheduleEntry::window(d(1, 20), d(2, 3))];
        let weights = BTreeMap::from([(
            d(1, 20),
            WeightVector::from_pairs([("A", 0.5), ("B", -1.0), ("C", 0.5)]),
        )]);

        let out = run(&weights, &schedule, &table).unwrap();
        let expected = 0.5 * 0.01 + 1.0 * 0.02 + 0.5 * 0.005;

        for (date, r) in out.portfolio_returns.iter() {
            if date >= d(1, 20) && date <= d(2, 3) {
                assert!((r - expected).abs() < 1e-15);
            } else {
                assert_eq!(r, 0.0);
            }
        }
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn test_missing_weights_are_skipped() {
        let table = constant_table([0.01, 0.01, 0.01]);
        let schedule = vec![ScheduleEntry::window(d(1, 20), d(2, 3))];
        let out = run(&BTreeMap::new(), &schedule, &table).unwrap();
        assert!(out.portfolio_returns.values.iter().all(|r| *r == 0.0));
        assert_eq!(out.skipped, vec![d(1, 20)]);
        assert_eq!(out.cumulative_returns.last(), Some(1.0));
    }

    #[test]
    fn test_uncovered_window_fails() {
        let table = constant_table([0.01, 0.01, 0.01]);
        let schedule = vec![ScheduleEntry::window(d(2, 20), d(3, 3))];
        let weights = BTreeMap::from([(d(2, 20), WeightVector::from_pairs([("A", 1.0)]))]);
        assert!(matches!(
            run(&weights, &schedule, &table),
            Err(NeutralBookError::InputMisalignment { .. })
        ));
    }

    #[test]
    fn test_nan_policies() {
        let mut rows = vec![vec![0.01, 0.02]; 3];
        rows[1][1] = f64::NAN;
        let table = ReturnsTable::new(
            vec![d(1, 2), d(1, 3), d(1, 4)],
            vec!["A".into(), "B".into()],
            rows,
        )
        .unwrap();
        let schedule = vec![ScheduleEntry::window(d(1, 2), d(1, 4))];
        let weights = BTreeMap::from([(d(1, 2), WeightVector::from_pairs([("A", 1.0), ("B", -1.0)]))]);

        let zero = run(&weights, &schedule, &table).unwrap();
        assert!((zero.portfolio_returns.values[1] - 0.01).abs() < 1e-15);

        let invalidate = Backtester::new(BacktestConfig {
            missing_returns: MissingReturns::InvalidateDay,
        })
        .run(&weights, &schedule, &table)
        .unwrap();
        assert_eq!(invalidate.portfolio_returns.values[1], 0.0);
        assert!((invalidate.portfolio_returns.values[0] + 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_unknown_tickers_contribute_zero() {
        let table = constant_table([0.01, 0.0, 0.0]);
        let schedule = vec![ScheduleEntry::window(d(1, 10), d(1, 12))];
        let weights = BTreeMap::from([(d(1, 10), WeightVector::from_pairs([("A", 1.0), ("ZZZ", -1.0)]))]);
        let out = run(&weights, &schedule, &table).unwrap();
        assert_eq!(out.portfolio_returns.get(d(1, 11)), Some(0.01));
    }
}
