//! Error types for the optimizer, backtester and the surrounding runner.

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum NeutralBookError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Incomplete data for {ticker}: missing or invalid {field}")]
    DataIncomplete { ticker: String, field: &'static str },

    #[error("No usable assets in universe")]
    EmptyUniverse,

    #[error("Signal has zero variance across {assets} assets")]
    DegenerateSignal { assets: usize },

    #[error("Optimization infeasible: {status}")]
    OptimizationInfeasible { status: String },

    #[error("{date}: {source}")]
    AtDate {
        date: NaiveDate,
        #[source]
        source: Box<NeutralBookError>,
    },

    #[error(
        "Returns table [{first}, {last}] does not cover holding window [{entry}, {exit}]"
    )]
    InputMisalignment {
        entry: NaiveDate,
        exit: NaiveDate,
        first: NaiveDate,
        last: NaiveDate,
    },

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NeutralBookError {
    /// Attach the rebalance date a failure belongs to.
    pub fn at(self, date: NaiveDate) -> Self {
        Self::AtDate {
            date,
            source: Box::new(self),
        }
    }

    /// True for failures that mean "no portfolio for this date" rather than a broken run.
    pub fn is_skippable(&self) -> bool {
        match self {
            Self::AtDate { source, .. } => source.is_skippable(),
            Self::EmptyUniverse
            | Self::DegenerateSignal { .. }
            | Self::OptimizationInfeasible { .. }
            | Self::DataIncomplete { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, NeutralBookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_date_message_names_date_and_status() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let err = NeutralBookError::OptimizationInfeasible {
            status: "Infeasible".to_string(),
        }
        .at(date);

        let msg = err.to_string();
        assert!(msg.contains("2024-03-08"));
        assert!(msg.contains("Infeasible"));
        assert!(err.is_skippable());
    }

    #[test]
    fn test_misalignment_is_not_skippable() {
        let d = |day| NaiveDate::from_ymd_opt(2023, 1, day).unwrap();
        let err = NeutralBookError::InputMisalignment {
            entry: d(20),
            exit: d(27),
            first: d(1),
            last: d(25),
        };
        assert!(!err.is_skippable());
    }
}
