//! Volatility statistics grouped by calendar period and time of day.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike};

use super::bar::{Bar, TimeBucket};
use super::error::FxsweepError;

/// A dimension bars can be grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Year,
    Month,
    Hour,
    TimeBucket,
}

impl GroupKey {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKey::Year => "year",
            GroupKey::Month => "month",
            GroupKey::Hour => "hour",
            GroupKey::TimeBucket => "time_bucket",
        }
    }

    fn value_of(&self, bar: &Bar) -> KeyValue {
        match self {
            GroupKey::Year => KeyValue::Year(bar.period_start.year()),
            GroupKey::Month => KeyValue::Month(bar.period_start.month()),
            GroupKey::Hour => KeyValue::Hour(bar.period_start.hour()),
            GroupKey::TimeBucket => KeyValue::Bucket(bar.time_bucket),
        }
    }
}

impl FromStr for GroupKey {
    type Err = FxsweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(GroupKey::Year),
            "month" => Ok(GroupKey::Month),
            "hour" => Ok(GroupKey::Hour),
            "bucket" | "time_bucket" => Ok(GroupKey::TimeBucket),
            other => Err(FxsweepError::invalid(
                "analysis",
                "groupings",
                format!("unknown grouping key '{other}'"),
            )),
        }
    }
}

/// Parse a `+`-joined key list such as `year+hour`.
pub fn parse_grouping(spec: &str) -> Result<Vec<GroupKey>, FxsweepError> {
    let keys = spec
        .split('+')
        .map(str::parse)
        .collect::<Result<Vec<GroupKey>, _>>()?;
    if keys.is_empty() {
        return Err(FxsweepError::invalid("analysis", "groupings", "empty grouping"));
    }
    Ok(keys)
}

/// One component of a group's key. Ordering follows the natural order of each dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Year(i32),
    Month(u32),
    Hour(u32),
    Bucket(TimeBucket),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Year(y) => write!(f, "{y}"),
            KeyValue::Month(m) => write!(f, "{m}"),
            KeyValue::Hour(h) => write!(f, "{h}"),
            KeyValue::Bucket(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatBucket {
    pub key: Vec<KeyValue>,
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// Mean, sample standard deviation and count of bar volatility per group.
///
/// Rows come back ordered by the keys in the order they were given. A group
/// holding a single bar reports a standard deviation of 0.
pub fn volatility_stats(bars: &[Bar], keys: &[GroupKey]) -> Vec<StatBucket> {
    let mut groups: BTreeMap<Vec<KeyValue>, Vec<f64>> = BTreeMap::new();
    for bar in bars {
        let key = keys.iter().map(|k| k.value_of(bar)).collect();
        groups.entry(key).or_default().push(bar.volatility);
    }

    groups
        .into_iter()
        .map(|(key, values)| {
            let (mean, std_dev) = mean_and_sample_std(&values);
            StatBucket {
                key,
                mean,
                std_dev,
                count: values.len(),
            }
        })
        .collect()
}

fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt())
}
