//! neutralbook - beta- and sector-neutral long/short portfolios on a quarterly schedule.
//!
//! # Overview
//!
//! On every rebalance date the optimizer takes a point-in-time universe
//! (beta, sector, liquidity and a trailing holding-period return per name),
//! scores each name by its liquidity-scaled return and solves a mixed-integer
//! program for a fully invested long book and short book that are neutral in
//! beta and in every sector. The backtester then holds each book over its
//! window and produces daily and cumulative strategy returns.
//!
//! - **Optimizer**: MILP via `good_lp`, z-scored signal, per-name cap, disjoint books
//! - **Backtester**: event-driven over the schedule, later windows overwrite earlier ones
//! - **Runner**: parallel per-date optimization with failures collected per date
//! - **Sweep**: grid over constraint settings with Sharpe, drawdown and cumulative return
//! - **Providers and cache**: injected data ports, CSV implementations, JSON cache
//!
//! # Quick Start
//!
//! ```no_run
//! use neutralbook::{
//!     provider::{CsvPrices, CsvUniverse},
//!     runner::StrategyRunner,
//!     schedule::{QuarterlySchedule, ScheduleProvider},
//!     OptimizerConfig,
//! };
//!
//! let schedule = QuarterlySchedule.schedule(2020, 2023).unwrap();
//! let universe = CsvUniverse::load("data/universe.csv").unwrap();
//! let prices = CsvPrices::new("data/prices.csv");
//!
//! let outcome = StrategyRunner::default()
//!     .run(&universe, &prices, &schedule, &OptimizerConfig::default())
//!     .unwrap();
//!
//! println!("rebalances: {}", outcome.book.len());
//! println!("final: {:?}", outcome.backtest.cumulative_returns.last());
//! ```
//!
//! # Modules
//!
//! - [`types`]: asset records, schedule entries, weights, return series and tables
//! - [`signal`]: liquidity-scaled signal and z-scoring
//! - [`optimizer`]: the constrained long/short optimizer
//! - [`backtest`]: holding-window backtester
//! - [`schedule`]: quarterly rebalance calendar
//! - [`provider`]: universe and returns ports with CSV implementations
//! - [`cache`]: cache port, in-memory and directory stores
//! - [`runner`]: schedule → optimize → backtest orchestration
//! - [`sweep`]: parameter grid
//! - [`analytics`]: summary statistics and terminal formatting
//! - [`config`]: TOML configuration file support
//! - [`export`]: CSV and JSON writers

pub mod analytics;
pub mod backtest;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod optimizer;
pub mod provider;
pub mod runner;
pub mod schedule;
pub mod signal;
pub mod sweep;
pub mod types;

// Re-exports for convenience
pub use analytics::{ResultFormatter, SummaryStats};
pub use backtest::{BacktestConfig, BacktestOutput, Backtester, MissingReturns};
pub use cache::{CacheStore, DirCache, MemoryCache};
pub use config::NeutralBookConfig;
pub use error::{NeutralBookError, Result};
pub use optimizer::{
    optimize, ExposureRange, OptimizedPortfolio, Optimizer, OptimizerConfig, Position,
};
pub use provider::{CsvPrices, CsvUniverse, ReturnsProvider, UniverseProvider};
pub use runner::{RebalanceBook, RebalanceFailure, RunOutcome, Snapshot, StrategyRunner};
pub use schedule::{QuarterlySchedule, ScheduleProvider};
pub use sweep::{run_sweep, SweepConfig, SweepMetric, SweepReport};
pub use types::{
    Asset, AssetRecord, Quarter, ReturnSeries, ReturnsTable, ScheduleEntry, WeightVector,
};
