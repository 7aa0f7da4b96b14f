//! Core data types: asset records, schedule entries, weights and return series.

use crate::error::{NeutralBookError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

/// One constituent at one point-in-time snapshot, as delivered by a universe provider.
///
/// Factor fields are optional at the boundary; [`AssetRecord::validate`] turns a
/// complete row into an [`Asset`] and rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub ticker: String,
    pub beta: Option<f64>,
    pub sector: Option<String>,
    /// Average daily traded value.
    pub liquidity: Option<f64>,
    /// Trailing holding-period return, the signal input.
    pub holding_return: Option<f64>,
}

impl AssetRecord {
    /// Create a fully populated record.
    pub fn new(
        ticker: impl Into<String>,
        beta: f64,
        sector: impl Into<String>,
        liquidity: f64,
        holding_return: f64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            beta: Some(beta),
            sector: Some(sector.into()),
            liquidity: Some(liquidity),
            holding_return: Some(holding_return),
        }
    }

    /// Check that every required field is present and finite.
    pub fn validate(&self) -> Result<Asset> {
        let missing = |field| NeutralBookError::DataIncomplete {
            ticker: self.ticker.clone(),
            field,
        };

        let beta = self.beta.filter(|b| b.is_finite()).ok_or_else(|| missing("beta"))?;
        let sector = self
            .sector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("sector"))?;
        let liquidity = self
            .liquidity
            .filter(|l| l.is_finite() && *l >= 0.0)
            .ok_or_else(|| missing("liquidity"))?;
        let holding_return = self
            .holding_return
            .filter(|r| r.is_finite())
            .ok_or_else(|| missing("holding_return"))?;

        Ok(Asset {
            ticker: self.ticker.clone(),
            beta,
            sector: sector.to_string(),
            liquidity,
            holding_return,
        })
    }
}

/// A validated asset record: every factor field present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub beta: f64,
    pub sector: String,
    pub liquidity: f64,
    pub holding_return: f64,
}

/// Calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Month in which the quarter ends.
    pub fn end_month(self) -> u32 {
        match self {
            Quarter::Q1 => 3,
            Quarter::Q2 => 6,
            Quarter::Q3 => 9,
            Quarter::Q4 => 12,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quarter::Q1 => write!(f, "Q1"),
            Quarter::Q2 => write!(f, "Q2"),
            Quarter::Q3 => write!(f, "Q3"),
            Quarter::Q4 => write!(f, "Q4"),
        }
    }
}

/// One rebalance in the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub year: i32,
    pub quarter: Quarter,
    /// First day of the holding window; weights are keyed by this date.
    pub entry: NaiveDate,
    /// Last day of the holding window (inclusive).
    pub exit: NaiveDate,
    /// Date of the universe membership and factor snapshot.
    pub snapshot: NaiveDate,
    /// Start of the trailing window the holding-period return is measured over.
    pub signal_start: NaiveDate,
}

impl ScheduleEntry {
    /// Build an entry from the two window dates, deriving the snapshot as the day before entry.
    pub fn window(entry: NaiveDate, exit: NaiveDate) -> Self {
        use chrono::Datelike;
        let quarter = match entry.month() {
            1..=3 => Quarter::Q1,
            4..=6 => Quarter::Q2,
            7..=9 => Quarter::Q3,
            _ => Quarter::Q4,
        };
        Self {
            year: entry.year(),
            quarter,
            entry,
            exit,
            snapshot: entry.pred_opt().unwrap_or(entry),
            signal_start: entry,
        }
    }
}

/// Signed target weights for one rebalance, ordered by ticker.
///
/// Built once by the optimizer (or by a caller) and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self { weights }
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self {
            weights: pairs.into_iter().map(|(t, w)| (t.into(), w)).collect(),
        }
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.weights.get(ticker).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(t, &w)| (t.as_str(), w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sum of positive weights.
    pub fn gross_long(&self) -> f64 {
        self.weights.values().filter(|w| **w > 0.0).sum()
    }

    /// Sum of negative weights (a non-positive number).
    pub fn gross_short(&self) -> f64 {
        self.weights.values().filter(|w| **w < 0.0).sum()
    }

    /// Largest absolute weight.
    pub fn max_abs(&self) -> f64 {
        self.weights.values().fold(0.0, |acc, w| acc.max(w.abs()))
    }
}

/// Daily date-indexed series of returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl ReturnSeries {
    /// A series of zeros over the given dates.
    pub fn zeros(dates: &[NaiveDate]) -> Self {
        Self {
            dates: dates.to_vec(),
            values: vec![0.0; dates.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Running product of (1 + r), starting from 1.0 before the first date.
    pub fn cumulative(&self) -> ReturnSeries {
        let mut acc = 1.0;
        let values = self
            .values
            .iter()
            .map(|r| {
                acc *= 1.0 + r;
                acc
            })
            .collect();
        ReturnSeries {
            dates: self.dates.clone(),
            values,
        }
    }

    /// The tail of the series from `start` (inclusive).
    pub fn since(&self, start: NaiveDate) -> ReturnSeries {
        let from = self.dates.partition_point(|d| *d < start);
        ReturnSeries {
            dates: self.dates[from..].to_vec(),
            values: self.values[from..].to_vec(),
        }
    }

    /// Last value, if any.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// Dense matrix of per-asset daily returns; `NaN` marks a missing observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    /// Row-major: `rows[date_idx][ticker_idx]`.
    #[serde(with = "nan_as_null")]
    rows: Vec<Vec<f64>>,
    #[serde(skip)]
    columns: HashMap<String, usize>,
}

impl ReturnsTable {
    /// Build a table, checking shape and that dates are strictly increasing.
    pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if dates.len() != rows.len() {
            return Err(NeutralBookError::InvalidInput(format!(
                "{} dates but {} rows",
                dates.len(),
                rows.len()
            )));
        }
        if let Some(i) = rows.iter().position(|r| r.len() != tickers.len()) {
            return Err(NeutralBookError::InvalidInput(format!(
                "row for {} has {} values, expected {}",
                dates[i],
                rows[i].len(),
                tickers.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(NeutralBookError::InvalidInput(format!(
                "dates not strictly increasing at {} -> {}",
                w[0], w[1]
            )));
        }

        let columns = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        Ok(Self {
            dates,
            tickers,
            rows,
            columns,
        })
    }

    /// Build daily returns from a price matrix.
    ///
    /// Prices are forward-filled per column, then converted to simple percentage change.
    /// The first row, and any row before a column's first price, is `NaN`.
    pub fn from_prices(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        prices: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let width = tickers.len();
        let mut last = vec![f64::NAN; width];
        let mut rows = Vec::with_capacity(prices.len());

        for row in &prices {
            if row.len() != width {
                return Err(NeutralBookError::InvalidInput(format!(
                    "price row has {} values, expected {}",
                    row.len(),
                    width
                )));
            }
            let mut returns = vec![f64::NAN; width];
            for (j, &p) in row.iter().enumerate() {
                let prev = last[j];
                let current = if p.is_finite() { p } else { prev };
                if prev.is_finite() && current.is_finite() && prev != 0.0 {
                    returns[j] = current / prev - 1.0;
                }
                last[j] = current;
            }
            rows.push(returns);
        }

        Self::new(dates, tickers, rows)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Column index of a ticker.
    pub fn column(&self, ticker: &str) -> Option<usize> {
        if self.columns.is_empty() && !self.tickers.is_empty() {
            return self.tickers.iter().position(|t| t == ticker);
        }
        self.columns.get(ticker).copied()
    }

    /// Row indices of the dates inside `[start, end]`.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end);
        from..to.max(from)
    }

    /// True if the table's date range spans `[start, end]`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => first <= start && last >= end,
            _ => false,
        }
    }
}

/// JSON has no NaN; missing returns travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(rows: &[Vec<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        let nullable: Vec<Vec<Option<f64>>> = rows
            .iter()
            .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
            .collect();
        nullable.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error> {
        let nullable = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
        Ok(nullable
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect())
    }
}
