//! Strategy parameters and engine economics.

use std::fmt;

use chrono::{Timelike, Weekday};

use super::error::FxsweepError;
use super::timestamp::Timestamp;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Wall-clock time of day in the `HHMM` integer encoding (`1630`, `30` for 00:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn from_hhmm(hhmm: i64) -> Result<Self, FxsweepError> {
        let invalid = || FxsweepError::OptimizationInfeasible {
            reason: format!("{hhmm} is not a valid HHMM time of day"),
        };
        if hhmm < 0 {
            return Err(invalid());
        }
        let hour = u32::try_from(hhmm / 100).map_err(|_| invalid())?;
        let minute = (hhmm % 100) as u32;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(TimeOfDay { hour, minute })
    }

    pub fn hhmm(&self) -> u32 {
        self.hour * 100 + self.minute
    }

    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// Exact minute match on the record's local clock.
    pub fn matches(&self, ts: Timestamp) -> bool {
        ts.hour() == self.hour && ts.minute() == self.minute
    }

    /// True when `ts` is strictly less than `tolerance` minutes away, wrapping at midnight.
    pub fn within(&self, ts: Timestamp, tolerance: u32) -> bool {
        let at = ts.hour() * 60 + ts.minute();
        let diff = at.abs_diff(self.minute_of_day());
        let distance = diff.min(MINUTES_PER_DAY - diff);
        distance < tolerance
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour, self.minute)
    }
}

/// Parameters for one simulation run or grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    pub entry_time: TimeOfDay,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub close_time: TimeOfDay,
}

impl StrategyParams {
    /// Build from the raw encodings used in configuration and grids.
    pub fn from_raw(
        entry_time: i64,
        take_profit: f64,
        stop_loss: f64,
        close_time: i64,
    ) -> Result<Self, FxsweepError> {
        for (name, value) in [("take_profit", take_profit), ("stop_loss", stop_loss)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FxsweepError::OptimizationInfeasible {
                    reason: format!("{name} must be a positive distance, got {value}"),
                });
            }
        }
        Ok(StrategyParams {
            entry_time: TimeOfDay::from_hhmm(entry_time)?,
            take_profit,
            stop_loss,
            close_time: TimeOfDay::from_hhmm(close_time)?,
        })
    }
}

impl fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry Time: {}, Take Profit: {}, Stop Loss: {}, Close Time: {}",
            self.entry_time, self.take_profit, self.stop_loss, self.close_time
        )
    }
}

/// Economics and filters shared by every run of a backtest or sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub size: f64,
    /// Fraction of notional charged on entry and again on exit.
    pub commission_rate: f64,
    pub initial_cash: f64,
    pub close_tolerance_minutes: u32,
    pub excluded_weekdays: Vec<Weekday>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            size: 1.0,
            commission_rate: 0.0,
            initial_cash: 100.0,
            close_tolerance_minutes: 3,
            excluded_weekdays: vec![Weekday::Fri],
        }
    }
}

impl EngineConfig {
    pub fn commission(&self, price: f64, size: f64) -> f64 {
        price * size * self.commission_rate
    }

    pub fn allows_entry_on(&self, weekday: Weekday) -> bool {
        !self.excluded_weekdays.contains(&weekday)
    }
}

/// Parse a comma-separated weekday list (`fri`, `wed, fri`). `none` or blank means no exclusions.
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>, FxsweepError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }
    let mut days = Vec::new();
    for token in trimmed.split(',') {
        let day: Weekday = token.trim().parse().map_err(|_| {
            FxsweepError::invalid(
                "backtest",
                "excluded_weekdays",
                format!("unknown weekday '{}'", token.trim()),
            )
        })?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}
