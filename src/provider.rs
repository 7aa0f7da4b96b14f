//! Data-provider ports and their CSV file implementations.
//!
//! The optimizer and backtester never fetch data themselves: the runner asks a
//! [`UniverseProvider`] for each point-in-time snapshot and a
//! [`ReturnsProvider`] for the daily return matrix.

use crate::error::{NeutralBookError, Result};
use crate::types::{AssetRecord, ReturnsTable, ScheduleEntry};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Supplies the constituent factor records for one rebalance.
///
/// An empty vector means "no data for this date".
pub trait UniverseProvider: Send + Sync {
    fn universe(&self, entry: &ScheduleEntry) -> Result<Vec<AssetRecord>>;
}

/// Supplies the dense daily-return table used by the backtester.
pub trait ReturnsProvider: Send + Sync {
    fn daily_returns(&self) -> Result<ReturnsTable>;
}

/// Snapshots held in memory, keyed by snapshot date.
impl UniverseProvider for BTreeMap<NaiveDate, Vec<AssetRecord>> {
    fn universe(&self, entry: &ScheduleEntry) -> Result<Vec<AssetRecord>> {
        Ok(self.get(&entry.snapshot).cloned().unwrap_or_default())
    }
}

impl ReturnsProvider for ReturnsTable {
    fn daily_returns(&self) -> Result<ReturnsTable> {
        Ok(self.clone())
    }
}

/// Parse a calendar date in ISO (`2024-03-15`) or compact (`20240315`) form.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|_| NeutralBookError::DataError(format!("Could not parse date: '{}'", s)))
}

/// Raw long-format universe row.
#[derive(Debug, Deserialize)]
struct UniverseRow {
    #[serde(alias = "Date", alias = "DATE", alias = "snapshot")]
    date: String,
    #[serde(alias = "Ticker", alias = "TICKER", alias = "symbol")]
    ticker: String,
    #[serde(
        default,
        alias = "BETA_RAW_OVERRIDABLE",
        alias = "Beta",
        deserialize_with = "csv::invalid_option"
    )]
    beta: Option<f64>,
    #[serde(default, alias = "GICS_SECTOR_NAME", alias = "Sector")]
    sector: Option<String>,
    #[serde(
        default,
        alias = "TURNOVER",
        alias = "Liquidity",
        deserialize_with = "csv::invalid_option"
    )]
    liquidity: Option<f64>,
    #[serde(
        default,
        alias = "CUST_TRR_RETURN_HOLDING_PER",
        alias = "HoldingReturn",
        deserialize_with = "csv::invalid_option"
    )]
    holding_return: Option<f64>,
}

/// Universe snapshots loaded from one long CSV file.
///
/// Columns: `date,ticker,beta,sector,liquidity,holding_return`; empty cells are
/// missing values. Rows are grouped by `date`, which must match a schedule
/// entry's snapshot date.
#[derive(Debug, Clone, Default)]
pub struct CsvUniverse {
    snapshots: BTreeMap<NaiveDate, Vec<AssetRecord>>,
}

impl CsvUniverse {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading universe snapshots from: {}", path.display());

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut snapshots: BTreeMap<NaiveDate, Vec<AssetRecord>> = BTreeMap::new();
        for (row_num, result) in reader.deserialize().enumerate() {
            let row: UniverseRow = result?;
            let date = parse_date(&row.date).map_err(|e| {
                NeutralBookError::DataError(format!("row {}: {}", row_num + 1, e))
            })?;
            snapshots.entry(date).or_default().push(AssetRecord {
                ticker: row.ticker,
                beta: row.beta,
                sector: row.sector.filter(|s| !s.is_empty()),
                liquidity: row.liquidity,
                holding_return: row.holding_return,
            });
        }

        info!(
            "Loaded {} snapshots, {} records",
            snapshots.len(),
            snapshots.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self { snapshots })
    }

    pub fn snapshot_dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.snapshots.keys()
    }
}

impl UniverseProvider for CsvUniverse {
    fn universe(&self, entry: &ScheduleEntry) -> Result<Vec<AssetRecord>> {
        let records = self.snapshots.universe(entry)?;
        if records.is_empty() {
            debug!("No universe snapshot for {}", entry.snapshot);
        }
        Ok(records)
    }
}

/// Daily returns computed from a wide price CSV (`date,TICKER1,TICKER2,...`).
///
/// Prices are forward-filled per ticker before taking percentage change.
#[derive(Debug, Clone)]
pub struct CsvPrices {
    path: PathBuf,
}

impl CsvPrices {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_prices(&self) -> Result<(Vec<NaiveDate>, Vec<String>, Vec<Vec<f64>>)> {
        info!("Loading prices from: {}", self.path.display());

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let tickers: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
        if tickers.is_empty() {
            return Err(NeutralBookError::DataError(format!(
                "{} has no ticker columns",
                self.path.display()
            )));
        }

        let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let date = parse_date(record.get(0).unwrap_or_default())?;
            let prices = (1..=tickers.len())
                .map(|i| {
                    record
                        .get(i)
                        .and_then(|cell| cell.parse::<f64>().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            rows.push((date, prices));
        }

        rows.sort_by_key(|(date, _)| *date);
        let original_len = rows.len();
        rows.dedup_by_key(|(date, _)| *date);
        if rows.len() < original_len {
            warn!("Removed {} duplicate price dates", original_len - rows.len());
        }
        if rows.is_empty() {
            return Err(NeutralBookError::DataError(format!(
                "{} has no price rows",
                self.path.display()
            )));
        }

        let (dates, prices) = rows.into_iter().unzip();
        Ok((dates, tickers, prices))
    }
}

impl ReturnsProvider for CsvPrices {
    fn daily_returns(&self) -> Result<ReturnsTable> {
        let (dates, tickers, prices) = self.read_prices()?;
        info!(
            "Loaded {} price rows for {} tickers from {} to {}",
            dates.len(),
            tickers.len(),
            dates.first().map(|d| d.to_string()).unwrap_or_default(),
            dates.last().map(|d| d.to_string()).unwrap_or_default()
        );
        ReturnsTable::from_prices(dates, tickers, prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date("2024-03-15").unwrap(), expected);
        assert_eq!(parse_date("20240315").unwrap(), expected);
        assert_eq!(parse_date("03/15/2024").unwrap(), expected);
        assert!(parse_date("15.03.2024").is_err());
    }

    #[test]
    fn test_load_universe_with_gaps() {
        let file = write_temp(
            "date,ticker,beta,sector,liquidity,holding_return\n\
             2024-03-14,AAA,1.1,Energy,2000000,0.05\n\
             2024-03-14,BBB,,Energy,1500000,0.01\n\
             2024-03-14,CCC,0.9,,1000000,n/a\n\
             2024-06-13,AAA,1.0,Energy,2100000,-0.02\n",
        );
        let universe = CsvUniverse::load(file.path()).unwrap();
        assert_eq!(universe.snapshot_dates().count(), 2);

        let mut entry = ScheduleEntry::window(
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 22).unwrap(),
        );
        entry.snapshot = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();

        let records = universe.universe(&entry).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].validate().is_ok());
        assert_eq!(records[1].beta, None);
        assert_eq!(records[2].sector, None);
        assert_eq!(records[2].holding_return, None);

        entry.snapshot = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(universe.universe(&entry).unwrap().is_empty());
    }

    #[test]
    fn test_prices_to_returns() {
        let file = write_temp(
            "date,AAA,BBB\n\
             2024-01-03,101,50\n\
             2024-01-02,100,\n\
             2024-01-04,,55\n",
        );
        let table = CsvPrices::new(file.path()).daily_returns().unwrap();
        assert_eq!(table.tickers(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(table.dates().len(), 3);
        assert!((table.row(1)[0] - 0.01).abs() < 1e-12);
        assert!(table.row(1)[1].is_nan());
        assert_eq!(table.row(2)[0], 0.0);
        assert!((table.row(2)[1] - 0.1).abs() < 1e-12);
    }
}
