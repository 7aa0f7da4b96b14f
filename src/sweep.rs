//! Parameter sweep over the optimizer's constraint settings.
//!
//! Every combination of beta half-width, sector half-width, position cap and
//! liquidity transform is run through the full rebalance + backtest cycle and
//! summarised from an evaluation start date.
//!
//! # Example
//!
//! ```ignore
//! use neutralbook::sweep::{SweepConfig, SweepMetric, run_sweep};
//!
//! let config = SweepConfig::new()
//!     .beta_limits(vec![0.01, 0.05])
//!     .sector_limits(vec![0.01, 0.05])
//!     .max_weights(vec![0.01, 0.02]);
//!
//! let report = run_sweep(&runner, &snapshots, &returns, &config)?;
//! println!("{}", report);
//! println!("best: {:?}", report.best_by(SweepMetric::Sharpe));
//! ```

use crate::analytics::{ResultFormatter, SummaryStats};
use crate::error::{NeutralBookError, Result};
use crate::optimizer::{ExposureRange, OptimizerConfig};
use crate::runner::{Snapshot, StrategyRunner};
use crate::types::ReturnsTable;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::info;

/// Grid of constraint settings to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Half-widths of the beta band.
    pub beta_limits: Vec<f64>,
    /// Half-widths of every sector band.
    pub sector_limits: Vec<f64>,
    pub max_weights: Vec<f64>,
    pub log_liquidity: Vec<bool>,
    /// First date included in the summary statistics.
    pub start: Option<NaiveDate>,
    /// Evaluate combinations on the rayon pool.
    pub parallel: bool,
    #[serde(default)]
    pub show_progress: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            beta_limits: vec![0.01],
            sector_limits: vec![0.01],
            max_weights: vec![0.01],
            log_liquidity: vec![true],
            start: None,
            parallel: true,
            show_progress: false,
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beta_limits(mut self, values: Vec<f64>) -> Self {
        self.beta_limits = values;
        self
    }

    pub fn sector_limits(mut self, values: Vec<f64>) -> Self {
        self.sector_limits = values;
        self
    }

    pub fn max_weights(mut self, values: Vec<f64>) -> Self {
        self.max_weights = values;
        self
    }

    pub fn log_liquidity(mut self, values: Vec<bool>) -> Self {
        self.log_liquidity = values;
        self
    }

    pub fn start(mut self, start: Option<NaiveDate>) -> Self {
        self.start = start;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Cartesian product in (beta, sector, max_weight, log_liquidity) order, last axis fastest.
    pub fn combinations(&self) -> Vec<SweepPoint> {
        let mut points = Vec::with_capacity(self.num_combinations());
        for &beta_limit in &self.beta_limits {
            for &sector_limit in &self.sector_limits {
                for &max_weight in &self.max_weights {
                    for &use_log_liquidity in &self.log_liquidity {
                        points.push(SweepPoint {
                            beta_limit,
                            sector_limit,
                            max_weight,
                            use_log_liquidity,
                        });
                    }
                }
            }
        }
        points
    }

    pub fn num_combinations(&self) -> usize {
        self.beta_limits.len() * self.sector_limits.len() * self.max_weights.len() * self.log_liquidity.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_combinations() == 0 {
            return Err(NeutralBookError::ConfigError(
                "sweep grid has an empty axis".to_string(),
            ));
        }
        for point in self.combinations() {
            point.optimizer_config().validate()?;
        }
        Ok(())
    }
}

/// One combination of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub beta_limit: f64,
    pub sector_limit: f64,
    pub max_weight: f64,
    pub use_log_liquidity: bool,
}

impl SweepPoint {
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            beta_range: ExposureRange::symmetric(self.beta_limit),
            sector_range: ExposureRange::symmetric(self.sector_limit),
            max_weight: self.max_weight,
            use_log_liquidity: self.use_log_liquidity,
        }
    }
}

/// Metric used to rank combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMetric {
    CumulativeReturn,
    Sharpe,
    /// Ranked by the shallower drawdown.
    MaxDrawdown,
}

impl SweepMetric {
    pub fn extract(&self, stats: &SummaryStats) -> f64 {
        match self {
            Self::CumulativeReturn => stats.final_cumulative_return,
            Self::Sharpe => stats.sharpe_ratio,
            Self::MaxDrawdown => stats.max_drawdown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CumulativeReturn => "Cumulative Return",
            Self::Sharpe => "Sharpe Ratio",
            Self::MaxDrawdown => "Max Drawdown",
        }
    }
}

/// Outcome of one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub point: SweepPoint,
    pub stats: SummaryStats,
    /// Dates that produced a portfolio.
    pub rebalances: usize,
    /// Dates that failed to optimize.
    pub failures: usize,
}

/// All rows, in combination order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub rows: Vec<SweepRow>,
    pub start: Option<NaiveDate>,
}

impl SweepReport {
    /// Highest-ranked row; NaN metrics rank below every number.
    pub fn best_by(&self, metric: SweepMetric) -> Option<&SweepRow> {
        self.rows
            .iter()
            .max_by(|a, b| rank(metric.extract(&a.stats), metric.extract(&b.stats)))
    }

    /// Rows ordered best first.
    pub fn ranked(&self, metric: SweepMetric) -> Vec<&SweepRow> {
        let mut rows: Vec<&SweepRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| rank(metric.extract(&b.stats), metric.extract(&a.stats)));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as CSV text.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(
            "beta_limit,sector_limit,max_weight,use_log_liquidity,final_cumulative_return,sharpe_ratio,max_drawdown,rebalances,failures\n",
        );
        for row in &self.rows {
            csv.push_str(&format!(
                "{},{},{},{},{:.6},{:.6},{:.6},{},{}\n",
                row.point.beta_limit,
                row.point.sector_limit,
                row.point.max_weight,
                row.point.use_log_liquidity,
                row.stats.final_cumulative_return,
                row.stats.sharpe_ratio,
                row.stats.max_drawdown,
                row.rebalances,
                row.failures
            ));
        }
        csv
    }
}

fn rank(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.total_cmp(&b),
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows.iter().map(|row| {
            vec![
                format!("{}", row.point.beta_limit),
                format!("{}", row.point.sector_limit),
                format!("{}", row.point.max_weight),
                if row.point.use_log_liquidity { "log" } else { "raw" }.to_string(),
                format!("{:.4}", row.stats.final_cumulative_return),
                format!("{:.2}", row.stats.sharpe_ratio),
                format!("{:.2}%", row.stats.max_drawdown * 100.0),
                format!("{}/{}", row.rebalances, row.rebalances + row.failures),
            ]
        });
        let table = ResultFormatter::table(
            &[
                "Beta", "Sector", "Max W", "Liquidity", "Cumulative", "Sharpe", "Max DD", "Solved",
            ],
            rows,
        );
        write!(f, "{}", table)
    }
}

/// Run every combination against pre-fetched snapshots and returns.
///
/// A failure that would abort a single run (e.g. a returns table that does not
/// cover a held window) aborts the sweep.
pub fn run_sweep(
    runner: &StrategyRunner,
    snapshots: &[Snapshot],
    returns: &ReturnsTable,
    config: &SweepConfig,
) -> Result<SweepReport> {
    config.validate()?;
    let points = config.combinations();
    info!("Sweeping {} parameter combinations", points.len());

    let inner = runner.clone().show_progress(false);
    let progress = if config.show_progress {
        let pb = ProgressBar::new(points.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let evaluate = |point: &SweepPoint| -> Result<SweepRow> {
        let outcome = inner.run_loaded(snapshots, returns, &point.optimizer_config())?;
        if let Some(ref pb) = progress {
            pb.inc(1);
        }
        Ok(SweepRow {
            point: *point,
            stats: SummaryStats::from_output(&outcome.backtest, config.start),
            rebalances: outcome.book.len(),
            failures: outcome.book.failures.len(),
        })
    };

    let rows: Vec<SweepRow> = if config.parallel {
        points.par_iter().map(evaluate).collect::<Result<_>>()?
    } else {
        points.iter().map(evaluate).collect::<Result<_>>()?
    };

    if let Some(pb) = progress {
        pb.finish_with_message("Sweep complete");
    }

    Ok(SweepReport {
        rows,
        start: config.start,
    })
}
