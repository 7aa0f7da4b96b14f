//! Performance statistics and terminal reporting.
//!
//! All statistics follow the daily-series convention: 252 trading days per
//! year and no risk-free rate subtraction.

use crate::backtest::BacktestOutput;
use crate::types::ReturnSeries;
use chrono::NaiveDate;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Π(1 + r) over the series.
pub fn final_cumulative_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r))
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Annualized Sharpe ratio: mean · 252 / (std · √252).
///
/// Undefined (`NaN`) for fewer than two observations; a zero standard deviation
/// yields the IEEE result of the division.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    mean * TRADING_DAYS / (sample_std(returns) * TRADING_DAYS.sqrt())
}

/// Worst peak-to-trough drop of the compounded series, as a non-positive fraction.
///
/// The running peak starts at the first compounded value, not at 1.0.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        worst = worst.min(equity / peak - 1.0);
    }
    worst
}

/// Annualized volatility of daily returns.
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    sample_std(returns) * TRADING_DAYS.sqrt()
}

/// Summary of a return series over an evaluation period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub trading_days: usize,
    pub final_cumulative_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub annualized_volatility: f64,
    /// Days with a non-zero portfolio return.
    pub active_days: usize,
}

impl SummaryStats {
    /// Statistics of `series` from `start` (inclusive), or the whole series.
    pub fn from_series(series: &ReturnSeries, start: Option<NaiveDate>) -> Self {
        let tail = match start {
            Some(s) => series.since(s),
            None => series.clone(),
        };
        let r = &tail.values;

        Self {
            start: tail.dates.first().copied(),
            end: tail.dates.last().copied(),
            trading_days: r.len(),
            final_cumulative_return: final_cumulative_return(r),
            sharpe_ratio: sharpe_ratio(r),
            max_drawdown: max_drawdown(r),
            annualized_volatility: annualized_volatility(r),
            active_days: r.iter().filter(|v| **v != 0.0).count(),
        }
    }

    pub fn from_output(output: &BacktestOutput, start: Option<NaiveDate>) -> Self {
        Self::from_series(&output.portfolio_returns, start)
    }
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a summary report to stdout.
    pub fn print_report(title: &str, stats: &SummaryStats, skipped: usize) {
        let fmt_date =
            |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();

        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", format!(" {} ", title.to_uppercase()).bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!(
            "  Period:          {} to {}",
            fmt_date(stats.start),
            fmt_date(stats.end)
        );
        println!("  Trading Days:    {:>12}", stats.trading_days);
        println!("  Active Days:     {:>12}", stats.active_days);
        println!("  Skipped Windows: {:>12}", skipped);
        println!();

        println!("{}", "Performance".bold().underline());
        let growth = stats.final_cumulative_return;
        println!(
            "  Cumulative:      {:>12.4}  {}",
            growth,
            Self::format_pct_change((growth - 1.0) * 100.0)
        );
        println!("  Sharpe Ratio:    {:>12.2}", stats.sharpe_ratio);
        println!("  Volatility:      {:>11.2}%", stats.annualized_volatility * 100.0);
        println!("  Max Drawdown:    {:>11.2}%", stats.max_drawdown * 100.0);
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Render rows as a rounded table.
    pub fn table<I, R>(header: &[&str], rows: I) -> String
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = String>,
    {
        let mut builder = Builder::new();
        builder.push_record(header.iter().map(|h| h.to_string()));
        for row in rows {
            builder.push_record(row);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    /// Export stats to JSON.
    pub fn to_json(stats: &SummaryStats) -> String {
        serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_cumulative_return() {
        let r = [0.1, -0.1, 0.0];
        assert!((final_cumulative_return(&r) - 0.99).abs() < 1e-12);
        assert_eq!(final_cumulative_return(&[]), 1.0);
    }

    #[test]
    fn test_sharpe_uses_sample_std() {
        let r = [0.01, -0.02, 0.015, 0.005, -0.01, 0.02];
        let mean = r.iter().sum::<f64>() / 6.0;
        let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 5.0;
        let expected = mean * 252.0 / (var.sqrt() * 252.0f64.sqrt());
        assert!((sharpe_ratio(&r) - expected).abs() < 1e-12);
        assert!(sharpe_ratio(&[0.01]).is_nan());
    }

    #[test]
    fn test_max_drawdown() {
        // 1.1 -> 0.55 -> 0.605
        let r = [0.1, -0.5, 0.1];
        assert!((max_drawdown(&r) + 0.5).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_running_peak_starts_at_first_value() {
        // The peak is the first compounded value, so a first-day loss is not a drawdown.
        assert_eq!(max_drawdown(&[-0.2, 0.1]), 0.0);
        let dd = max_drawdown(&[0.0, -0.2]);
        assert!((dd + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_summary_since_start() {
        let dates: Vec<NaiveDate> = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let series = ReturnSeries {
            dates: dates.clone(),
            values: vec![0.5, 0.0, 0.1, -0.1],
        };
        let stats = SummaryStats::from_series(&series, Some(dates[2]));
        assert_eq!(stats.trading_days, 2);
        assert!((stats.final_cumulative_return - 0.99).abs() < 1e-12);
        assert_eq!(stats.active_days, 2);
        assert_eq!(stats.start, Some(dates[2]));
    }

    #[test]
    fn test_table_renders_header() {
        let table = ResultFormatter::table(&["a", "b"], vec![vec!["1".to_string(), "2".to_string()]]);
        assert!(table.contains('a'));
        assert!(table.contains('2'));
    }
}
