//! Strategy runner: schedule → per-date optimization → backtest.
//!
//! Snapshots are fetched once per schedule entry, optimized independently
//! (in parallel with rayon when enabled) and keyed by entry date. A date that
//! cannot be optimized is recorded as a [`RebalanceFailure`] and the run goes on;
//! only the backtest's coverage check can abort a run after snapshots are in.

use crate::backtest::{BacktestConfig, BacktestOutput, Backtester};
use crate::error::{NeutralBookError, Result};
use crate::optimizer::{OptimizedPortfolio, Optimizer, OptimizerConfig};
use crate::provider::{ReturnsProvider, UniverseProvider};
use crate::types::{AssetRecord, ReturnsTable, ScheduleEntry, WeightVector};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Universe records fetched for one schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entry: ScheduleEntry,
    pub records: Vec<AssetRecord>,
}

/// A rebalance date that produced no portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceFailure {
    pub date: NaiveDate,
    pub message: String,
    /// False when the failure points at bad inputs rather than an unsolvable date.
    pub skippable: bool,
}

/// Optimized portfolios keyed by entry date, plus the dates that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceBook {
    pub portfolios: BTreeMap<NaiveDate, OptimizedPortfolio>,
    pub failures: Vec<RebalanceFailure>,
}

impl RebalanceBook {
    /// Weight vectors in the shape the backtester consumes.
    pub fn weights(&self) -> BTreeMap<NaiveDate, WeightVector> {
        self.portfolios
            .iter()
            .map(|(date, p)| (*date, p.weights()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }
}

/// Result of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub book: RebalanceBook,
    pub backtest: BacktestOutput,
}

/// Drives the optimizer and backtester over a schedule.
#[derive(Debug, Clone)]
pub struct StrategyRunner {
    backtest: BacktestConfig,
    parallel: bool,
    show_progress: bool,
}

impl Default for StrategyRunner {
    fn default() -> Self {
        Self {
            backtest: BacktestConfig::default(),
            parallel: true,
            show_progress: false,
        }
    }
}

impl StrategyRunner {
    pub fn new(backtest: BacktestConfig) -> Self {
        Self {
            backtest,
            ..Self::default()
        }
    }

    /// Optimize dates on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Show a progress bar while fetching and optimizing.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn backtest_config(&self) -> &BacktestConfig {
        &self.backtest
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message);
        Some(pb)
    }

    /// Fetch the universe for every entry. A provider error aborts with the date attached.
    pub fn fetch_snapshots(
        &self,
        universe: &dyn UniverseProvider,
        schedule: &[ScheduleEntry],
    ) -> Result<Vec<Snapshot>> {
        let progress = self.progress_bar(schedule.len(), "snapshots");
        let mut snapshots = Vec::with_capacity(schedule.len());

        for entry in schedule {
            let records = universe
                .universe(entry)
                .map_err(|e| e.at(entry.entry))?;
            debug!("{}: {} universe records", entry.entry, records.len());
            snapshots.push(Snapshot {
                entry: entry.clone(),
                records,
            });
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("snapshots loaded");
        }
        Ok(snapshots)
    }

    /// Optimize every snapshot, keying results by entry date.
    ///
    /// An invalid configuration fails the whole call; per-date failures are collected.
    pub fn rebalance(&self, snapshots: &[Snapshot], config: &OptimizerConfig) -> Result<RebalanceBook> {
        let optimizer = Optimizer::new(*config)?;
        let progress = self.progress_bar(snapshots.len(), "rebalances");

        let solve = |snapshot: &Snapshot| {
            let date = snapshot.entry.entry;
            let outcome = optimizer
                .optimize(&snapshot.records)
                .map_err(|e| e.at(date));
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            (date, outcome)
        };

        let outcomes: Vec<(NaiveDate, Result<OptimizedPortfolio>)> = if self.parallel {
            snapshots.par_iter().map(solve).collect()
        } else {
            snapshots.iter().map(solve).collect()
        };

        if let Some(pb) = progress {
            pb.finish_with_message("rebalances done");
        }

        let mut book = RebalanceBook::default();
        for (date, outcome) in outcomes {
            match outcome {
                Ok(portfolio) => {
                    book.portfolios.insert(date, portfolio);
                }
                Err(e) => book.failures.push(record_failure(date, e)),
            }
        }

        info!(
            "Optimized {} of {} rebalance dates ({} failed)",
            book.len(),
            snapshots.len(),
            book.failures.len()
        );
        Ok(book)
    }

    /// Backtest a rebalance book against a returns table.
    pub fn backtest(
        &self,
        book: &RebalanceBook,
        schedule: &[ScheduleEntry],
        returns: &ReturnsTable,
    ) -> Result<BacktestOutput> {
        Backtester::new(self.backtest.clone()).run(&book.weights(), schedule, returns)
    }

    /// Rebalance and backtest with already loaded inputs.
    pub fn run_loaded(
        &self,
        snapshots: &[Snapshot],
        returns: &ReturnsTable,
        config: &OptimizerConfig,
    ) -> Result<RunOutcome> {
        let schedule: Vec<ScheduleEntry> = snapshots.iter().map(|s| s.entry.clone()).collect();
        let book = self.rebalance(snapshots, config)?;
        let backtest = self.backtest(&book, &schedule, returns)?;
        Ok(RunOutcome { book, backtest })
    }

    /// Fetch, rebalance and backtest.
    pub fn run(
        &self,
        universe: &dyn UniverseProvider,
        returns: &dyn ReturnsProvider,
        schedule: &[ScheduleEntry],
        config: &OptimizerConfig,
    ) -> Result<RunOutcome> {
        if schedule.is_empty() {
            return Err(NeutralBookError::InvalidInput("empty schedule".to_string()));
        }
        info!(
            "Running {} rebalances from {} to {}",
            schedule.len(),
            schedule[0].entry,
            schedule[schedule.len() - 1].exit
        );

        let snapshots = self.fetch_snapshots(universe, schedule)?;
        let table = returns.daily_returns()?;
        self.run_loaded(&snapshots, &table, config)
    }
}

fn record_failure(date: NaiveDate, error: NeutralBookError) -> RebalanceFailure {
    let skippable = error.is_skippable();
    if skippable {
        info!("No portfolio for {}", error);
    } else {
        warn!("Rebalance failed: {}", error);
    }
    RebalanceFailure {
        date,
        message: error.to_string(),
        skippable,
    }
}
