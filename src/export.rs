//! Export utilities for run results.
//!
//! | File | Contents |
//! |------|----------|
//! | returns CSV | date, daily portfolio return, cumulative return |
//! | weights CSV | entry date × ticker weight matrix |
//! | positions CSV | one row per optimized position per rebalance |
//! | sweep CSV | one row per parameter combination |
//! | summary JSON | [`SummaryStats`] |

use crate::analytics::SummaryStats;
use crate::backtest::BacktestOutput;
use crate::error::Result;
use crate::runner::RebalanceBook;
use crate::sweep::SweepReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Configuration for exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub date_format: String,
    /// Decimal places for returns and weights.
    pub precision: usize,
    pub include_headers: bool,
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            precision: 8,
            include_headers: true,
            delimiter: ',',
        }
    }
}

/// Writes run artefacts to disk.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Daily and cumulative returns.
    pub fn export_returns_csv(&self, output: &BacktestOutput, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let sep = self.config.delimiter;
        let prec = self.config.precision;

        if self.config.include_headers {
            writeln!(writer, "date{sep}portfolio_return{sep}cumulative_return")?;
        }
        for ((date, r), cum) in output
            .portfolio_returns
            .iter()
            .zip(output.cumulative_returns.values.iter())
        {
            writeln!(
                writer,
                "{}{sep}{:.prec$}{sep}{:.prec$}",
                date.format(&self.config.date_format),
                r,
                cum
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Weight matrix: one row per rebalance, one column per ticker ever held.
    pub fn export_weights_csv(&self, book: &RebalanceBook, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let sep = self.config.delimiter;
        let prec = self.config.precision;

        let tickers: BTreeSet<&str> = book
            .portfolios
            .values()
            .flat_map(|p| p.positions.iter().map(|pos| pos.ticker.as_str()))
            .collect();

        if self.config.include_headers {
            write!(writer, "entry_date")?;
            for ticker in &tickers {
                write!(writer, "{sep}{}", ticker)?;
            }
            writeln!(writer)?;
        }

        for (date, portfolio) in &book.portfolios {
            let weights = portfolio.weights();
            write!(writer, "{}", date.format(&self.config.date_format))?;
            for ticker in &tickers {
                write!(writer, "{sep}{:.prec$}", weights.get(ticker).unwrap_or(0.0))?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Long-format positions including the factor inputs and z-score.
    pub fn export_positions_csv(&self, book: &RebalanceBook, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let sep = self.config.delimiter;
        let prec = self.config.precision;

        if self.config.include_headers {
            writeln!(
                writer,
                "entry_date{sep}ticker{sep}weight{sep}beta{sep}sector{sep}liquidity{sep}holding_return{sep}signal{sep}zscore"
            )?;
        }
        for (date, portfolio) in &book.portfolios {
            for p in &portfolio.positions {
                writeln!(
                    writer,
                    "{}{sep}{}{sep}{:.prec$}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
                    date.format(&self.config.date_format),
                    p.ticker,
                    p.weight,
                    p.beta,
                    p.sector,
                    p.liquidity,
                    p.holding_return,
                    p.signal,
                    p.zscore
                )?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export_sweep_csv(&self, report: &SweepReport, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(report.to_csv().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn export_summary_json(&self, stats: &SummaryStats, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, stats)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{OptimizedPortfolio, Position};
    use crate::types::ReturnSeries;
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn position(ticker: &str, weight: f64) -> Position {
        Position {
            ticker: ticker.to_string(),
            weight,
            beta: 1.0,
            sector: "Energy".to_string(),
            liquidity: 1e6,
            holding_return: 0.01,
            signal: 0.0007,
            zscore: 0.5,
        }
    }

    fn book() -> RebalanceBook {
        let mut book = RebalanceBook::default();
        book.portfolios.insert(
            d(5),
            OptimizedPortfolio {
                positions: vec![position("AAA", 1.0), position("BBB", -1.0)],
                objective: -1.0,
                dropped: vec![],
            },
        );
        book.portfolios.insert(
            d(12),
            OptimizedPortfolio {
                positions: vec![position("CCC", 1.0), position("BBB", -1.0)],
                objective: -0.5,
                dropped: vec![],
            },
        );
        book
    }

    #[test]
    fn test_export_returns_csv() {
        let portfolio_returns = ReturnSeries {
            dates: vec![d(2), d(3)],
            values: vec![0.01, -0.02],
        };
        let output = BacktestOutput {
            cumulative_returns: portfolio_returns.cumulative(),
            portfolio_returns,
            skipped: vec![],
        };
        let file = NamedTempFile::new().unwrap();
        Exporter::new().export_returns_csv(&output, file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "date,portfolio_return,cumulative_return");
        assert_eq!(lines[1], "2024-01-02,0.01000000,1.01000000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_export_weights_csv_fills_missing_tickers() {
        let file = NamedTempFile::new().unwrap();
        Exporter::new().export_weights_csv(&book(), file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "entry_date,AAA,BBB,CCC");
        assert_eq!(lines[1], "2024-01-05,1.00000000,-1.00000000,0.00000000");
        assert_eq!(lines[2], "2024-01-12,0.00000000,-1.00000000,1.00000000");
    }

    #[test]
    fn test_export_positions_csv() {
        let file = NamedTempFile::new().unwrap();
        let exporter = Exporter::with_config(ExportConfig {
            delimiter: ';',
            ..Default::default()
        });
        exporter.export_positions_csv(&book(), file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("entry_date;ticker;weight"));
        assert_eq!(content.lines().count(), 5);
    }
}
