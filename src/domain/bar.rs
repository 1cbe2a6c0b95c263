//! Fixed-interval bar aggregation.
//!
//! Bars are aligned on the destination wall clock, counted from local
//! midnight. With a width that divides 60, every hour starts a bar. Intervals
//! without records produce no bar, so the output is not evenly spaced.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{TimeDelta, Timelike};

use super::error::FxsweepError;
use super::record::{Ohlc, PriceRecord};
use super::series::NormalizedSeries;
use super::timestamp::Timestamp;

pub const DEFAULT_INTERVAL_MINUTES: u32 = 6;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Bar width in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarInterval(u32);

impl BarInterval {
    pub fn minutes(minutes: u32) -> Result<Self, FxsweepError> {
        if minutes == 0 || minutes > MINUTES_PER_DAY {
            return Err(FxsweepError::invalid(
                "analysis",
                "interval_minutes",
                format!("interval must be between 1 and {MINUTES_PER_DAY} minutes, got {minutes}"),
            ));
        }
        Ok(BarInterval(minutes))
    }

    pub fn as_minutes(&self) -> u32 {
        self.0
    }

    /// Start of the interval containing `ts`.
    pub fn align(&self, ts: Timestamp) -> Timestamp {
        let minute_of_day = ts.hour() * 60 + ts.minute();
        let into_bar = TimeDelta::minutes(i64::from(minute_of_day % self.0))
            + TimeDelta::seconds(i64::from(ts.second()))
            + TimeDelta::nanoseconds(i64::from(ts.nanosecond()));
        ts - into_bar
    }
}

impl Default for BarInterval {
    fn default() -> Self {
        BarInterval(DEFAULT_INTERVAL_MINUTES)
    }
}

/// Time-of-day grouping key: hour plus the bar slot within the hour.
///
/// Rendered as `hour.slot`, so 16:12 with 6-minute bars is `16.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    pub hour: u32,
    pub slot: u32,
}

impl TimeBucket {
    pub fn of(ts: Timestamp, interval: BarInterval) -> Self {
        TimeBucket {
            hour: ts.hour(),
            slot: ts.minute() / interval.as_minutes(),
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hour, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub period_start: Timestamp,
    pub bid: Ohlc,
    pub ask: Ohlc,
    pub volatility: f64,
    pub time_bucket: TimeBucket,
}

struct Accumulator {
    bid: Ohlc,
    ask: Ohlc,
}

impl Accumulator {
    fn open(record: &PriceRecord) -> Self {
        Accumulator {
            bid: record.bid,
            ask: record.ask,
        }
    }

    fn absorb(&mut self, record: &PriceRecord) {
        merge(&mut self.bid, &record.bid);
        merge(&mut self.ask, &record.ask);
    }
}

fn merge(into: &mut Ohlc, next: &Ohlc) {
    into.high = into.high.max(next.high);
    into.low = into.low.min(next.low);
    into.close = next.close;
}

/// Resample a series into bars of `interval` width.
///
/// Fails with `DataIntegrity` if any bar ends up with bid high below bid low.
pub fn aggregate(series: &NormalizedSeries, interval: BarInterval) -> Result<Vec<Bar>, FxsweepError> {
    let mut buckets: BTreeMap<Timestamp, Accumulator> = BTreeMap::new();

    for record in series.records() {
        buckets
            .entry(interval.align(record.timestamp))
            .and_modify(|acc| acc.absorb(record))
            .or_insert_with(|| Accumulator::open(record));
    }

    buckets
        .into_iter()
        .map(|(period_start, acc)| {
            let volatility = acc.bid.range();
            if volatility < 0.0 {
                return Err(FxsweepError::DataIntegrity {
                    reason: format!(
                        "bar at {period_start} has bid high {} below bid low {}",
                        acc.bid.high, acc.bid.low
                    ),
                });
            }
            Ok(Bar {
                period_start,
                bid: acc.bid,
                ask: acc.ask,
                volatility,
                time_bucket: TimeBucket::of(period_start, interval),
            })
        })
        .collect()
}
