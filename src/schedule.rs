//! Quarterly rebalance calendar.
//!
//! Positions are entered on the third-to-last Friday of each calendar quarter and
//! closed on the second-to-last Friday. The universe snapshot is taken the
//! Thursday before entry, and the signal's trailing return runs from the previous
//! quarter's exit date.

use crate::error::{NeutralBookError, Result};
use crate::types::{Quarter, ScheduleEntry};
use chrono::{Datelike, Duration, NaiveDate};

/// Supplies the ordered rebalance schedule for a range of years.
pub trait ScheduleProvider {
    fn schedule(&self, start_year: i32, end_year: i32) -> Result<Vec<ScheduleEntry>>;
}

/// Calendar arithmetic implementation of [`ScheduleProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QuarterlySchedule;

impl ScheduleProvider for QuarterlySchedule {
    fn schedule(&self, start_year: i32, end_year: i32) -> Result<Vec<ScheduleEntry>> {
        if start_year > end_year {
            return Err(NeutralBookError::ConfigError(format!(
                "start year {} after end year {}",
                start_year, end_year
            )));
        }

        let mut entries = Vec::with_capacity(((end_year - start_year + 1) * 4) as usize);
        for year in start_year..=end_year {
            for quarter in Quarter::ALL {
                entries.push(quarter_entry(year, quarter)?);
            }
        }
        Ok(entries)
    }
}

/// A fixed, caller-built schedule filtered by year.
impl ScheduleProvider for Vec<ScheduleEntry> {
    fn schedule(&self, start_year: i32, end_year: i32) -> Result<Vec<ScheduleEntry>> {
        let mut entries: Vec<ScheduleEntry> = self
            .iter()
            .filter(|e| e.year >= start_year && e.year <= end_year)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry);
        Ok(entries)
    }
}

fn quarter_end(year: i32, quarter: Quarter) -> Result<NaiveDate> {
    let month = quarter.end_month();
    let day = if month == 3 || month == 12 { 31 } else { 30 };
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        NeutralBookError::ConfigError(format!("year {} out of calendar range", year))
    })
}

/// Last Friday on or before `date`.
pub fn last_friday_on_or_before(date: NaiveDate) -> NaiveDate {
    let back = (date.weekday().num_days_from_monday() as i64 - 4).rem_euclid(7);
    date - Duration::days(back)
}

fn quarter_entry(year: i32, quarter: Quarter) -> Result<ScheduleEntry> {
    let last_friday = last_friday_on_or_before(quarter_end(year, quarter)?);
    let exit = last_friday - Duration::weeks(1);
    let entry = last_friday - Duration::weeks(2);
    let snapshot = entry - Duration::days(1);

    let previous_end = match quarter {
        Quarter::Q1 => quarter_end(year - 1, Quarter::Q4)?,
        Quarter::Q2 => quarter_end(year, Quarter::Q1)?,
        Quarter::Q3 => quarter_end(year, Quarter::Q2)?,
        Quarter::Q4 => quarter_end(year, Quarter::Q3)?,
    };
    let signal_start = last_friday_on_or_before(previous_end) - Duration::weeks(1);

    Ok(ScheduleEntry {
        year,
        quarter,
        entry,
        exit,
        snapshot,
        signal_start,
    })
}

/// Check the window invariants: entry before exit, no overlap with the next window.
pub fn validate_schedule(entries: &[ScheduleEntry]) -> Result<()> {
    for e in entries {
        if e.entry >= e.exit {
            return Err(NeutralBookError::InvalidInput(format!(
                "{} {}: entry {} not before exit {}",
                e.year, e.quarter, e.entry, e.exit
            )));
        }
    }
    for pair in entries.windows(2) {
        if pair[0].exit > pair[1].entry {
            return Err(NeutralBookError::InvalidInput(format!(
                "window ending {} overlaps window starting {}",
                pair[0].exit, pair[1].entry
            )));
        }
    }
    Ok(())
}
