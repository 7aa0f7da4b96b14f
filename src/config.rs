//! Configuration file support.
//!
//! A run is described by one TOML file: the schedule years, where the data
//! lives, the optimizer constraints, backtest policy and the sweep grid.

use crate::backtest::{BacktestConfig, MissingReturns};
use crate::error::{NeutralBookError, Result};
use crate::optimizer::{ExposureRange, OptimizerConfig};
use crate::provider::parse_date;
use crate::sweep::SweepConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeutralBookConfig {
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub sweep: SweepSettings,
}

/// Rebalance calendar range (inclusive years).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_end_year")]
    pub end_year: i32,
}

fn default_start_year() -> i32 { 2015 }
fn default_end_year() -> i32 { 2024 }

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: default_end_year(),
        }
    }
}

/// Input files and cache location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Long CSV of universe snapshots.
    #[serde(default = "default_universe_path")]
    pub universe_path: PathBuf,
    /// Wide CSV of daily prices.
    #[serde(default = "default_prices_path")]
    pub prices_path: PathBuf,
    /// Directory for cached snapshots and returns. No caching when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_universe_path() -> PathBuf { PathBuf::from("data/universe.csv") }
fn default_prices_path() -> PathBuf { PathBuf::from("data/prices.csv") }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            universe_path: default_universe_path(),
            prices_path: default_prices_path(),
            cache_dir: None,
        }
    }
}

/// Optimizer constraints. Limits are half-widths of symmetric bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    #[serde(default = "default_limit")]
    pub beta_limit: f64,
    #[serde(default = "default_limit")]
    pub sector_limit: f64,
    #[serde(default = "default_limit")]
    pub max_weight: f64,
    #[serde(default = "default_true")]
    pub use_log_liquidity: bool,
}

fn default_limit() -> f64 { 0.01 }
fn default_true() -> bool { true }

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            beta_limit: default_limit(),
            sector_limit: default_limit(),
            max_weight: default_limit(),
            use_log_liquidity: true,
        }
    }
}

/// Backtest policy and evaluation window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    #[serde(default)]
    pub missing_returns: MissingReturns,
    /// First date included in summary statistics (YYYY-MM-DD).
    #[serde(default)]
    pub evaluation_start: Option<String>,
}

/// Sweep grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_grid")]
    pub beta_limits: Vec<f64>,
    #[serde(default = "default_grid")]
    pub sector_limits: Vec<f64>,
    #[serde(default = "default_grid")]
    pub max_weights: Vec<f64>,
    #[serde(default = "default_log_grid")]
    pub log_liquidity: Vec<bool>,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_grid() -> Vec<f64> { vec![0.01] }
fn default_log_grid() -> Vec<bool> { vec![true] }

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            beta_limits: default_grid(),
            sector_limits: default_grid(),
            max_weights: default_grid(),
            log_liquidity: default_log_grid(),
            parallel: true,
        }
    }
}

impl NeutralBookConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: NeutralBookConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NeutralBookError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.start_year > self.schedule.end_year {
            return Err(NeutralBookError::ConfigError(format!(
                "schedule.start_year {} is after schedule.end_year {}",
                self.schedule.start_year, self.schedule.end_year
            )));
        }
        self.to_optimizer_config().validate()?;
        self.evaluation_start()?;
        Ok(())
    }

    pub fn to_optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            beta_range: ExposureRange::symmetric(self.optimizer.beta_limit),
            sector_range: ExposureRange::symmetric(self.optimizer.sector_limit),
            max_weight: self.optimizer.max_weight,
            use_log_liquidity: self.optimizer.use_log_liquidity,
        }
    }

    pub fn to_backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            missing_returns: self.backtest.missing_returns,
        }
    }

    pub fn evaluation_start(&self) -> Result<Option<NaiveDate>> {
        self.backtest
            .evaluation_start
            .as_deref()
            .map(parse_date)
            .transpose()
    }

    pub fn to_sweep_config(&self) -> Result<SweepConfig> {
        Ok(SweepConfig::new()
            .beta_limits(self.sweep.beta_limits.clone())
            .sector_limits(self.sweep.sector_limits.clone())
            .max_weights(self.sweep.max_weights.clone())
            .log_liquidity(self.sweep.log_liquidity.clone())
            .start(self.evaluation_start()?)
            .parallel(self.sweep.parallel))
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# neutralbook configuration

[schedule]
start_year = 2015
end_year = 2024

[data]
universe_path = "data/universe.csv"   # date,ticker,beta,sector,liquidity,holding_return
prices_path = "data/prices.csv"       # date,TICKER1,TICKER2,...
# cache_dir = ".neutralbook-cache"

[optimizer]
beta_limit = 0.01      # net beta in [-0.01, 0.01]
sector_limit = 0.01    # every sector's net weight in [-0.01, 0.01]
max_weight = 0.01      # |w| <= 1%
use_log_liquidity = true

[backtest]
missing_returns = "treat_as_zero"   # or "invalidate_day"
# evaluation_start = "2016-01-01"

[sweep]
beta_limits = [0.01, 0.05]
sector_limits = [0.01, 0.05]
max_weights = [0.01, 0.02]
log_liquidity = [true, false]
parallel = true
"#
        .to_string()
    }
}
