//! Command-line interface for the optimizer and backtester.

use neutralbook::analytics::{ResultFormatter, SummaryStats};
use neutralbook::cache::{CacheStore, CachedReturns, CachedUniverse, DirCache};
use neutralbook::config::NeutralBookConfig;
use neutralbook::error::{NeutralBookError, Result};
use neutralbook::export::Exporter;
use neutralbook::optimizer::Optimizer;
use neutralbook::provider::{parse_date, CsvPrices, CsvUniverse, ReturnsProvider, UniverseProvider};
use neutralbook::runner::StrategyRunner;
use neutralbook::schedule::{validate_schedule, QuarterlySchedule, ScheduleProvider};
use neutralbook::sweep::{run_sweep, SweepMetric};
use neutralbook::types::ScheduleEntry;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// neutralbook - beta- and sector-neutral long/short portfolios on a quarterly schedule.
#[derive(Parser)]
#[command(name = "neutralbook")]
#[command(version)]
#[command(about = "Optimize and backtest a beta- and sector-neutral long/short book")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "neutralbook.toml")]
        output: PathBuf,
    },

    /// Print the rebalance schedule
    Schedule {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the first year
        #[arg(long)]
        start_year: Option<i32>,

        /// Override the last year
        #[arg(long)]
        end_year: Option<i32>,
    },

    /// Optimize the portfolio for one rebalance
    Optimize {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Entry date of the rebalance (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Show zero-weight assets as well
        #[arg(long)]
        all: bool,
    },

    /// Optimize every rebalance and backtest the result
    Backtest {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write daily and cumulative returns to this CSV
        #[arg(long)]
        returns_out: Option<PathBuf>,

        /// Write the weight matrix to this CSV
        #[arg(long)]
        weights_out: Option<PathBuf>,

        /// Optimize dates one at a time
        #[arg(long)]
        sequential: bool,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Run the parameter grid from the configuration
    Sweep {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Metric used to pick the best combination
        #[arg(short, long, value_enum, default_value = "sharpe")]
        metric: MetricArg,

        /// Write all rows to this CSV
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove every cached snapshot and returns table
    Reset {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    Return,
    Sharpe,
    Drawdown,
}

impl From<MetricArg> for SweepMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Return => SweepMetric::CumulativeReturn,
            MetricArg::Sharpe => SweepMetric::Sharpe,
            MetricArg::Drawdown => SweepMetric::MaxDrawdown,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("tracing subscriber already installed");
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Init { output } => init_config(output),
        Commands::Schedule {
            config,
            start_year,
            end_year,
        } => print_schedule(config.as_deref(), *start_year, *end_year, cli.output),
        Commands::Optimize { config, date, all } => optimize_date(config, date, *all, cli.output),
        Commands::Backtest {
            config,
            returns_out,
            weights_out,
            sequential,
            quiet,
        } => run_backtest(
            config,
            returns_out.as_deref(),
            weights_out.as_deref(),
            !*sequential,
            !*quiet,
            cli.output,
        ),
        Commands::Sweep {
            config,
            metric,
            out,
        } => run_grid(config, (*metric).into(), out.as_deref(), cli.output),
        Commands::Reset { config } => reset_cache(config),
    }
}

fn init_config(output: &Path) -> Result<()> {
    if output.exists() {
        return Err(NeutralBookError::ConfigError(format!(
            "{} already exists",
            output.display()
        )));
    }
    fs::write(output, NeutralBookConfig::example())?;
    println!("Wrote example configuration to {}", output.display());
    Ok(())
}

fn load_schedule(config: &NeutralBookConfig) -> Result<Vec<ScheduleEntry>> {
    let schedule = QuarterlySchedule.schedule(config.schedule.start_year, config.schedule.end_year)?;
    validate_schedule(&schedule)?;
    Ok(schedule)
}

fn cache_store(config: &NeutralBookConfig) -> Result<Option<Arc<dyn CacheStore>>> {
    match &config.data.cache_dir {
        Some(dir) => {
            let store: Arc<dyn CacheStore> = Arc::new(DirCache::new(dir)?);
            Ok(Some(store))
        }
        None => Ok(None),
    }
}

fn universe_provider(config: &NeutralBookConfig) -> Result<Box<dyn UniverseProvider>> {
    let csv = CsvUniverse::load(&config.data.universe_path)?;
    let provider: Box<dyn UniverseProvider> = match cache_store(config)? {
        Some(store) => Box::new(CachedUniverse::new(csv, store)),
        None => Box::new(csv),
    };
    Ok(provider)
}

fn returns_provider(config: &NeutralBookConfig) -> Result<Box<dyn ReturnsProvider>> {
    let csv = CsvPrices::new(config.data.prices_path.clone());
    let provider: Box<dyn ReturnsProvider> = match cache_store(config)? {
        Some(store) => Box::new(CachedReturns::new(csv, store, "daily-returns")),
        None => Box::new(csv),
    };
    Ok(provider)
}

fn print_schedule(
    config_path: Option<&Path>,
    start_year: Option<i32>,
    end_year: Option<i32>,
    output: OutputFormat,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => NeutralBookConfig::load(path)?,
        None => NeutralBookConfig::default(),
    };
    if let Some(year) = start_year {
        config.schedule.start_year = year;
    }
    if let Some(year) = end_year {
        config.schedule.end_year = year;
    }
    let schedule = load_schedule(&config)?;

    match output {
        OutputFormat::Text => {
            let rows = schedule.iter().map(|e| {
                vec![
                    e.year.to_string(),
                    e.quarter.to_string(),
                    e.snapshot.to_string(),
                    e.entry.to_string(),
                    e.exit.to_string(),
                    e.signal_start.to_string(),
                ]
            });
            println!(
                "{}",
                ResultFormatter::table(
                    &["Year", "Quarter", "Snapshot", "Entry", "Exit", "Signal Start"],
                    rows
                )
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&schedule)?),
        OutputFormat::Csv => {
            println!("year,quarter,snapshot,entry,exit,signal_start");
            for e in &schedule {
                println!(
                    "{},{},{},{},{},{}",
                    e.year, e.quarter, e.snapshot, e.entry, e.exit, e.signal_start
                );
            }
        }
    }
    Ok(())
}

fn optimize_date(config_path: &Path, date: &str, all: bool, output: OutputFormat) -> Result<()> {
    let config = NeutralBookConfig::load(config_path)?;
    let date = parse_date(date)?;
    let schedule = load_schedule(&config)?;
    let entry = schedule.iter().find(|e| e.entry == date).ok_or_else(|| {
        NeutralBookError::InvalidInput(format!(
            "{} is not an entry date between {} and {}",
            date, config.schedule.start_year, config.schedule.end_year
        ))
    })?;

    let universe = universe_provider(&config)?;
    let records = universe.universe(entry)?;
    info!("{}: {} universe records", entry.entry, records.len());

    let portfolio = Optimizer::new(config.to_optimizer_config())?
        .optimize(&records)
        .map_err(|e| e.at(entry.entry))?;

    match output {
        OutputFormat::Text => {
            let rows = portfolio
                .positions
                .iter()
                .filter(|p| all || p.weight != 0.0)
                .map(|p| {
                    vec![
                        p.ticker.clone(),
                        p.sector.clone(),
                        format!("{:.3}", p.beta),
                        format!("{:+.3}", p.zscore),
                        format!("{:+.4}", p.weight),
                    ]
                });
            println!(
                "{}",
                ResultFormatter::table(&["Ticker", "Sector", "Beta", "Z-Score", "Weight"], rows)
            );
            println!();
            println!("{}", format!("Rebalance {}", entry.entry).bold());
            println!("  Objective:   {:>10.4}", portfolio.objective);
            println!("  Net beta:    {:>10.4}", portfolio.net_beta());
            println!(
                "  Long/short:  {:>4} / {:<4}",
                portfolio.num_long(),
                portfolio.num_short()
            );
            println!("  Dropped:     {:>10}", portfolio.dropped.len());
            for (sector, exposure) in portfolio.sector_exposures() {
                println!("  {:<24} {:+.4}", sector, exposure);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&portfolio)?),
        OutputFormat::Csv => {
            println!("ticker,sector,beta,liquidity,holding_return,signal,zscore,weight");
            for p in portfolio.positions.iter().filter(|p| all || p.weight != 0.0) {
                println!(
                    "{},{},{},{},{},{},{},{}",
                    p.ticker, p.sector, p.beta, p.liquidity, p.holding_return, p.signal, p.zscore, p.weight
                );
            }
        }
    }
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    returns_out: Option<&Path>,
    weights_out: Option<&Path>,
    parallel: bool,
    show_progress: bool,
    output: OutputFormat,
) -> Result<()> {
    let config = NeutralBookConfig::load(config_path)?;
    let schedule = load_schedule(&config)?;
    let universe = universe_provider(&config)?;
    let returns = returns_provider(&config)?;

    let runner = StrategyRunner::new(config.to_backtest_config())
        .parallel(parallel)
        .show_progress(show_progress && output == OutputFormat::Text);
    let outcome = runner.run(
        universe.as_ref(),
        returns.as_ref(),
        &schedule,
        &config.to_optimizer_config(),
    )?;

    let exporter = Exporter::new();
    if let Some(path) = returns_out {
        exporter.export_returns_csv(&outcome.backtest, path)?;
        info!("Wrote returns to {}", path.display());
    }
    if let Some(path) = weights_out {
        exporter.export_weights_csv(&outcome.book, path)?;
        info!("Wrote weights to {}", path.display());
    }

    let stats = SummaryStats::from_output(&outcome.backtest, config.evaluation_start()?);
    match output {
        OutputFormat::Text => {
            ResultFormatter::print_report("Backtest", &stats, outcome.backtest.skipped.len());
            for failure in &outcome.book.failures {
                let line = format!("  {}: {}", failure.date, failure.message);
                if failure.skippable {
                    println!("{}", line.yellow());
                } else {
                    println!("{}", line.red());
                }
            }
        }
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(&stats)),
        OutputFormat::Csv => {
            println!("date,portfolio_return,cumulative_return");
            for ((date, r), cum) in outcome
                .backtest
                .portfolio_returns
                .iter()
                .zip(outcome.backtest.cumulative_returns.values.iter())
            {
                println!("{},{},{}", date, r, cum);
            }
        }
    }
    Ok(())
}

fn run_grid(
    config_path: &Path,
    metric: SweepMetric,
    out: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let config = NeutralBookConfig::load(config_path)?;
    let sweep = config
        .to_sweep_config()?
        .show_progress(output == OutputFormat::Text);
    let schedule = load_schedule(&config)?;
    let universe = universe_provider(&config)?;
    let returns = returns_provider(&config)?;

    let runner = StrategyRunner::new(config.to_backtest_config());
    let snapshots = runner.fetch_snapshots(universe.as_ref(), &schedule)?;
    let table = returns.daily_returns()?;
    let report = run_sweep(&runner, &snapshots, &table, &sweep)?;

    if let Some(path) = out {
        Exporter::new().export_sweep_csv(&report, path)?;
        info!("Wrote sweep results to {}", path.display());
    }

    match output {
        OutputFormat::Text => {
            println!("{}", report);
            if let Some(best) = report.best_by(metric) {
                println!(
                    "{} beta {} / sector {} / max weight {} / {} liquidity ({} = {:.4})",
                    "Best:".bold().green(),
                    best.point.beta_limit,
                    best.point.sector_limit,
                    best.point.max_weight,
                    if best.point.use_log_liquidity { "log" } else { "raw" },
                    metric.display_name(),
                    metric.extract(&best.stats)
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.ranked(metric))?),
        OutputFormat::Csv => print!("{}", report.to_csv()),
    }
    Ok(())
}

fn reset_cache(config_path: &Path) -> Result<()> {
    let config = NeutralBookConfig::load(config_path)?;
    match cache_store(&config)? {
        Some(store) => {
            let removed = store.clear()?;
            println!("Removed {} cached entries", removed);
        }
        None => println!("No cache_dir configured"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "neutralbook",
            "-vv",
            "backtest",
            "-c",
            "neutralbook.toml",
            "--returns-out",
            "returns.csv",
        ]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Backtest { .. }));
    }

    #[test]
    fn test_optimize_requires_date() {
        assert!(Cli::try_parse_from(["neutralbook", "optimize", "-c", "x.toml"]).is_err());
        assert!(Cli::try_parse_from([
            "neutralbook",
            "-o",
            "json",
            "optimize",
            "-c",
            "x.toml",
            "-d",
            "2024-03-15"
        ])
        .is_ok());
    }

    #[test]
    fn test_sweep_metric() {
        let cli = Cli::try_parse_from(["neutralbook", "sweep", "-c", "x.toml", "-m", "drawdown"]).unwrap();
        match cli.command {
            Commands::Sweep { metric, .. } => {
                assert_eq!(SweepMetric::from(metric), SweepMetric::MaxDrawdown)
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn test_schedule_without_config() {
        let cli = Cli::try_parse_from(["neutralbook", "schedule", "--start-year", "2023", "--end-year", "2023"]);
        assert!(cli.is_ok());
    }
}
