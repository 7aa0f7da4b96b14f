//! Beta- and sector-neutral long/short portfolio construction.
//!
//! The optimizer formulates a mixed-integer linear program over the filtered
//! universe and hands it to the [`good_lp`] modelling layer (pure-Rust `microlp`
//! backend). Per asset there is a long weight, a short weight and a binary
//! side indicator; the objective tilts the book against the liquidity-scaled
//! signal:
//!
//! ```text
//! minimise   Σ zᵢ (lᵢ − sᵢ)
//! subject to Σ lᵢ = 1,  Σ sᵢ = 1
//!            lᵢ ≤ cap · bᵢ,  sᵢ ≤ cap · (1 − bᵢ),  bᵢ ∈ {0, 1}
//!            β_lo ≤ Σ βᵢ (lᵢ − sᵢ) ≤ β_hi
//!            for each sector k: S_lo ≤ Σ_{i∈k} (lᵢ − sᵢ) ≤ S_hi
//! ```
//!
//! # Example
//!
//! ```no_run
//! use neutralbook::optimizer::{optimize, OptimizerConfig};
//! use neutralbook::types::AssetRecord;
//!
//! let universe = vec![
//!     AssetRecord::new("AAA", 1.0, "Energy", 2e7, 0.05),
//!     AssetRecord::new("BBB", 0.8, "Energy", 9e6, -0.02),
//!     // ...
//! ];
//! let portfolio = optimize(&universe, &OptimizerConfig::default()).unwrap();
//! println!("objective = {:.4}", portfolio.objective);
//! ```

use crate::error::{NeutralBookError, Result};
use crate::signal::{raw_signal, zscores, LiquidityTransform};
use crate::types::{Asset, AssetRecord, WeightVector};
use good_lp::{
    constraint, microlp, variable, variables, Expression, Solution, SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Solver output below this magnitude is reported as an exact zero.
const WEIGHT_EPSILON: f64 = 1e-10;

/// Inclusive bounds on a net exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureRange {
    pub lower: f64,
    pub upper: f64,
}

impl ExposureRange {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    /// `[-half_width, half_width]`
    pub fn symmetric(half_width: f64) -> Self {
        let h = half_width.abs();
        Self {
            lower: -h,
            upper: h,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.lower > self.upper {
            return Err(NeutralBookError::ConfigError(format!(
                "invalid exposure range [{}, {}]",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.lower - tolerance && value <= self.upper + tolerance
    }
}

/// Inputs that shape the optimization problem for every rebalance date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Bounds on Σ beta · weight.
    pub beta_range: ExposureRange,
    /// Bounds on the net weight of every sector.
    pub sector_range: ExposureRange,
    /// Cap on any single asset's absolute weight.
    pub max_weight: f64,
    /// Scale the signal by ln(liquidity) instead of raw liquidity.
    pub use_log_liquidity: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            beta_range: ExposureRange::symmetric(0.01),
            sector_range: ExposureRange::symmetric(0.01),
            max_weight: 0.01,
            use_log_liquidity: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        self.beta_range.validate()?;
        self.sector_range.validate()?;
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return Err(NeutralBookError::ConfigError(format!(
                "max_weight must be positive, got {}",
                self.max_weight
            )));
        }
        Ok(())
    }

    pub fn liquidity_transform(&self) -> LiquidityTransform {
        LiquidityTransform::from_flag(self.use_log_liquidity)
    }
}

/// An optimized asset: the signed weight alongside the factor data it was chosen from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    /// Long weight minus short weight.
    pub weight: f64,
    pub beta: f64,
    pub sector: String,
    pub liquidity: f64,
    pub holding_return: f64,
    pub signal: f64,
    pub zscore: f64,
}

/// Optimizer output for one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    /// One row per asset that entered the problem, in input order.
    pub positions: Vec<Position>,
    /// Objective value at the optimum.
    pub objective: f64,
    /// Tickers dropped before optimization for incomplete data.
    pub dropped: Vec<String>,
}

impl OptimizedPortfolio {
    pub fn weights(&self) -> WeightVector {
        WeightVector::from_pairs(self.positions.iter().map(|p| (p.ticker.clone(), p.weight)))
    }

    pub fn net_beta(&self) -> f64 {
        self.positions.iter().map(|p| p.beta * p.weight).sum()
    }

    /// Net weight per sector.
    pub fn sector_exposures(&self) -> BTreeMap<String, f64> {
        let mut exposures = BTreeMap::new();
        for p in &self.positions {
            *exposures.entry(p.sector.clone()).or_insert(0.0) += p.weight;
        }
        exposures
    }

    pub fn gross_long(&self) -> f64 {
        self.positions.iter().map(|p| p.weight.max(0.0)).sum()
    }

    pub fn gross_short(&self) -> f64 {
        self.positions.iter().map(|p| p.weight.min(0.0)).sum()
    }

    pub fn num_long(&self) -> usize {
        self.positions.iter().filter(|p| p.weight > 0.0).count()
    }

    pub fn num_short(&self) -> usize {
        self.positions.iter().filter(|p| p.weight < 0.0).count()
    }
}

/// Universe after dropping incomplete rows, with per-asset signal and z-score.
struct PreparedUniverse {
    assets: Vec<Asset>,
    signals: Vec<f64>,
    zscores: Vec<f64>,
    dropped: Vec<String>,
}

fn prepare(universe: &[AssetRecord], transform: LiquidityTransform) -> Result<PreparedUniverse> {
    let mut assets = Vec::with_capacity(universe.len());
    let mut signals = Vec::with_capacity(universe.len());
    let mut dropped = Vec::new();

    for record in universe {
        match record
            .validate()
            .and_then(|asset| raw_signal(&asset, transform).map(|s| (asset, s)))
        {
            Ok((asset, signal)) => {
                assets.push(asset);
                signals.push(signal);
            }
            Err(e) => {
                debug!("Dropping {}: {}", record.ticker, e);
                dropped.push(record.ticker.clone());
            }
        }
    }

    if !dropped.is_empty() {
        warn!(
            "Dropped {} of {} assets with incomplete data",
            dropped.len(),
            universe.len()
        );
    }
    if assets.is_empty() {
        return Err(NeutralBookError::EmptyUniverse);
    }

    let zscores = zscores(&signals)?;

    Ok(PreparedUniverse {
        assets,
        signals,
        zscores,
        dropped,
    })
}

/// Long/short optimizer bound to one configuration.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize one point-in-time universe.
    pub fn optimize(&self, universe: &[AssetRecord]) -> Result<OptimizedPortfolio> {
        let prepared = prepare(universe, self.config.liquidity_transform())?;
        let n = prepared.assets.len();
        let cap = self.config.max_weight;

        // Each book needs at least ceil(1 / cap) names and the two books are disjoint.
        if (n as f64) * cap < 2.0 - 1e-12 {
            return Err(NeutralBookError::OptimizationInfeasible {
                status: format!(
                    "Infeasible: {} assets with max_weight {} cannot fill both books",
                    n, cap
                ),
            });
        }

        debug!(
            "Optimizing {} assets ({} dropped), max_weight {}",
            n,
            prepared.dropped.len(),
            cap
        );

        let (weights, objective) = self.solve(&prepared)?;

        let positions = prepared
            .assets
            .into_iter()
            .zip(weights)
            .zip(prepared.signals.iter().zip(prepared.zscores.iter()))
            .map(|((asset, weight), (&signal, &zscore))| Position {
                ticker: asset.ticker,
                weight,
                beta: asset.beta,
                sector: asset.sector,
                liquidity: asset.liquidity,
                holding_return: asset.holding_return,
                signal,
                zscore,
            })
            .collect();

        Ok(OptimizedPortfolio {
            positions,
            objective,
            dropped: prepared.dropped,
        })
    }

    fn solve(&self, prepared: &PreparedUniverse) -> Result<(Vec<f64>, f64)> {
        let n = prepared.assets.len();
        let cap = self.config.max_weight;
        let beta_range = self.config.beta_range;
        let sector_range = self.config.sector_range;

        let mut vars = variables!();
        let longs: Vec<Variable> = (0..n)
            .map(|_| vars.add(variable().min(0.0).max(cap)))
            .collect();
        let shorts: Vec<Variable> = (0..n)
            .map(|_| vars.add(variable().min(0.0).max(cap)))
            .collect();
        let is_long: Vec<Variable> = (0..n).map(|_| vars.add(variable().binary())).collect();

        let net = |i: usize| -> Expression { longs[i] - shorts[i] };

        let objective: Expression = (0..n).map(|i| net(i) * prepared.zscores[i]).sum();
        let mut problem = vars.minimise(objective.clone()).using(microlp);

        let long_book: Expression = longs.iter().copied().sum();
        let short_book: Expression = shorts.iter().copied().sum();
        problem = problem
            .with(constraint!(long_book == 1.0))
            .with(constraint!(short_book == 1.0));

        for i in 0..n {
            problem = problem
                .with(constraint!(longs[i] - is_long[i] * cap <= 0.0))
                .with(constraint!(shorts[i] + is_long[i] * cap <= cap));
        }

        let beta_exposure: Expression = (0..n).map(|i| net(i) * prepared.assets[i].beta).sum();
        problem = problem
            .with(constraint!(beta_exposure.clone() >= beta_range.lower))
            .with(constraint!(beta_exposure <= beta_range.upper));

        let mut sectors: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, asset) in prepared.assets.iter().enumerate() {
            sectors.entry(asset.sector.as_str()).or_default().push(i);
        }
        for members in sectors.values() {
            let exposure: Expression = members.iter().map(|&i| net(i)).sum();
            problem = problem
                .with(constraint!(exposure.clone() >= sector_range.lower))
                .with(constraint!(exposure <= sector_range.upper));
        }

        let solution = problem
            .solve()
            .map_err(|e| NeutralBookError::OptimizationInfeasible {
                status: e.to_string(),
            })?;

        let weights = (0..n)
            .map(|i| {
                let w = solution.value(longs[i]) - solution.value(shorts[i]);
                if w.abs() < WEIGHT_EPSILON {
                    0.0
                } else {
                    w
                }
            })
            .collect();

        Ok((weights, objective.eval_with(&solution)))
    }
}

/// Optimize a universe with the given configuration.
pub fn optimize(universe: &[AssetRecord], config: &OptimizerConfig) -> Result<OptimizedPortfolio> {
    Optimizer::new(*config)?.optimize(universe)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    /// Two sectors with four names each, spread in beta and signal.
    fn balanced_universe() -> Vec<AssetRecord> {
        vec![
            AssetRecord::new("A1", 0.8, "Tech", 1e7, 0.12),
            AssetRecord::new("A2", 1.2, "Tech", 2e7, -0.05),
            AssetRecord::new("A3", 1.0, "Tech", 5e6, 0.03),
            AssetRecord::new("A4", 0.9, "Tech", 8e6, -0.10),
            AssetRecord::new("B1", 0.7, "Energy", 3e7, 0.08),
            AssetRecord::new("B2", 1.1, "Energy", 4e6, -0.02),
            AssetRecord::new("B3", 1.3, "Energy", 6e6, 0.15),
            AssetRecord::new("B4", 0.6, "Energy", 9e6, -0.07),
        ]
    }

    fn loose_config() -> OptimizerConfig {
        OptimizerConfig {
            beta_range: ExposureRange::symmetric(0.2),
            sector_range: ExposureRange::symmetric(0.2),
            max_weight: 0.5,
            use_log_liquidity: true,
        }
    }

    #[test]
    fn test_exposure_range_validation() {
        assert!(ExposureRange::new(0.1, -0.1).is_err());
        assert!(ExposureRange::new(-0.1, 0.1).is_ok());
        let r = ExposureRange::symmetric(-0.05);
        assert_eq!(r.lower, -0.05);
        assert_eq!(r.upper, 0.05);
        assert!(r.contains(0.0500000001, 1e-6));
    }

    #[test]
    fn test_config_rejects_non_positive_cap() {
        let config = OptimizerConfig {
            max_weight: 0.0,
            ..Default::default()
        };
        assert!(Optimizer::new(config).is_err());
    }

    #[test]
    fn test_books_and_caps_hold() {
        let config = loose_config();
        let portfolio = optimize(&balanced_universe(), &config).unwrap();

        assert!((portfolio.gross_long() - 1.0).abs() < TOL);
        assert!((portfolio.gross_short() + 1.0).abs() < TOL);
        for p in &portfolio.positions {
            assert!(p.weight.abs() <= config.max_weight + TOL);
        }
        assert!(config.beta_range.contains(portfolio.net_beta(), TOL));
        for exposure in portfolio.sector_exposures().values() {
            assert!(config.sector_range.contains(*exposure, TOL));
        }
    }

    #[test]
    fn test_objective_matches_weights() {
        let portfolio = optimize(&balanced_universe(), &loose_config()).unwrap();
        let recomputed: f64 = portfolio
            .positions
            .iter()
            .map(|p| p.weight * p.zscore)
            .sum();
        assert!((portfolio.objective - recomputed).abs() < 1e-6);
        // Tilting against the signal gives a non-positive objective.
        assert!(portfolio.objective <= TOL);
    }

    #[test]
    fn test_incomplete_rows_are_dropped() {
        let mut universe = balanced_universe();
        universe.push(AssetRecord {
            ticker: "GAP".into(),
            beta: None,
            sector: Some("Tech".into()),
            liquidity: Some(1e6),
            holding_return: Some(0.01),
        });

        let portfolio = optimize(&universe, &loose_config()).unwrap();
        assert_eq!(portfolio.dropped, vec!["GAP".to_string()]);
        assert_eq!(portfolio.positions.len(), 8);
    }

    #[test]
    fn test_empty_universe() {
        assert!(matches!(
            optimize(&[], &loose_config()),
            Err(NeutralBookError::EmptyUniverse)
        ));
    }

    #[test]
    fn test_capacity_precheck() {
        let config = OptimizerConfig {
            max_weight: 0.1,
            ..loose_config()
        };
        match optimize(&balanced_universe(), &config) {
            Err(NeutralBookError::OptimizationInfeasible { status }) => {
                assert!(status.contains("cannot fill both books"))
            }
            other => panic!("expected infeasible, got {:?}", other),
        }
    }

    #[test]
    fn test_tight_sector_range_still_neutral() {
        let config = OptimizerConfig {
            sector_range: ExposureRange::symmetric(0.0),
            ..loose_config()
        };
        let portfolio = optimize(&balanced_universe(), &config).unwrap();
        for exposure in portfolio.sector_exposures().values() {
            assert!(exposure.abs() < TOL);
        }
    }
}
