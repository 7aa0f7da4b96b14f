//! Liquidity-scaled signal and its cross-sectional z-score.

use crate::error::{NeutralBookError, Result};
use crate::types::Asset;
use serde::{Deserialize, Serialize};

/// How the liquidity proxy is transformed before scaling the holding-period return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LiquidityTransform {
    /// Natural log of the liquidity proxy.
    #[default]
    Log,
    /// Raw liquidity proxy.
    Identity,
}

impl LiquidityTransform {
    pub fn from_flag(use_log: bool) -> Self {
        if use_log {
            Self::Log
        } else {
            Self::Identity
        }
    }

    /// Transformed liquidity, or `None` when it cannot be used as a divisor.
    pub fn apply(self, liquidity: f64) -> Option<f64> {
        if liquidity <= 0.0 {
            return None;
        }
        let value = match self {
            Self::Log => liquidity.ln(),
            Self::Identity => liquidity,
        };
        (value.is_finite() && value != 0.0).then_some(value)
    }
}

/// Raw signal for one asset: holding-period return over transformed liquidity.
pub fn raw_signal(asset: &Asset, transform: LiquidityTransform) -> Result<f64> {
    let scale = transform
        .apply(asset.liquidity)
        .ok_or_else(|| NeutralBookError::DataIncomplete {
            ticker: asset.ticker.clone(),
            field: "liquidity",
        })?;
    Ok(asset.holding_return / scale)
}

/// Standardize with population mean and population standard deviation.
pub fn zscores(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(NeutralBookError::EmptyUniverse);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if !std_dev.is_finite() || std_dev <= f64::EPSILON * mean.abs().max(1.0) {
        return Err(NeutralBookError::DegenerateSignal {
            assets: values.len(),
        });
    }

    Ok(values.iter().map(|v| (v - mean) / std_dev).collect())
}
