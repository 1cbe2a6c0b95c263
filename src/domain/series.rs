//! Normalized, deduplicated record series.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Datelike;

use super::error::FxsweepError;
use super::record::PriceRecord;
use super::timestamp::Timestamp;

/// Whether runs cover each calendar year separately or the whole range at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    #[default]
    Yearly,
    All,
}

impl FromStr for ProcessMode {
    type Err = FxsweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yearly" => Ok(ProcessMode::Yearly),
            "all" => Ok(ProcessMode::All),
            other => Err(FxsweepError::invalid(
                "backtest",
                "process_mode",
                format!("unknown process mode '{other}', expected yearly or all"),
            )),
        }
    }
}

/// Records strictly increasing by timestamp with no duplicate instants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSeries {
    records: Vec<PriceRecord>,
}

impl NormalizedSeries {
    /// Sort and deduplicate records given in enumeration order.
    ///
    /// The sort is stable, so among records sharing an instant the one that
    /// appeared first in `records` survives.
    pub fn from_records(mut records: Vec<PriceRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        records.dedup_by_key(|r| r.timestamp);
        NormalizedSeries { records }
    }

    pub fn empty() -> Self {
        NormalizedSeries::default()
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.records.last().map(|r| r.timestamp)
    }

    /// Years present, in ascending order, on the destination clock.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.timestamp.year()).collect();
        years.dedup();
        years
    }

    /// Split into per-year partitions, each still normalized.
    pub fn partition_by_year(&self) -> BTreeMap<i32, NormalizedSeries> {
        let mut partitions: BTreeMap<i32, NormalizedSeries> = BTreeMap::new();
        for record in &self.records {
            partitions
                .entry(record.timestamp.year())
                .or_default()
                .records
                .push(record.clone());
        }
        partitions
    }
}

pub fn year_in_bounds(year: i32, start_year: Option<i32>, end_year: Option<i32>) -> bool {
    start_year.is_none_or(|s| year >= s) && end_year.is_none_or(|e| year <= e)
}

/// Years a per-year run covers: every year of a closed range, including
/// years without data, otherwise the years present in the series.
pub fn requested_years(
    series: &NormalizedSeries,
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> Vec<i32> {
    match (start_year, end_year) {
        (Some(start), Some(end)) => (start..=end).collect(),
        _ => series
            .years()
            .into_iter()
            .filter(|y| year_in_bounds(*y, start_year, end_year))
            .collect(),
    }
}
