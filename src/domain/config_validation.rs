//! Configuration validation.
//!
//! Validates all config fields before a run so a bad value fails fast with
//! its section and key instead of part-way through a sweep.

use std::str::FromStr;

use crate::domain::bar::BarInterval;
use crate::domain::error::FxsweepError;
use crate::domain::loader::ArchiveOrder;
use crate::domain::optimizer::{Metric, ParamRange, ParameterGrid};
use crate::domain::series::ProcessMode;
use crate::domain::stats::parse_grouping;
use crate::domain::strategy::{StrategyParams, TimeOfDay, parse_weekdays};
use crate::ports::config_port::ConfigPort;

/// Parse an optional key, rejecting values that are present but malformed.
pub fn read_parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, FxsweepError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            FxsweepError::invalid(section, key, format!("cannot parse '{}'", raw.trim()))
        }),
    }
}

/// Like [`read_parsed`] with a fallback for a missing key.
pub fn read_or<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, FxsweepError> {
    Ok(read_parsed(config, section, key)?.unwrap_or(default))
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), FxsweepError> {
    validate_data_config(config)?;
    validate_analysis_config(config)?;
    validate_backtest_config(config)?;
    validate_optimize_config(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), FxsweepError> {
    if let Some(order) = config.get_string("data", "archive_order") {
        order.parse::<ArchiveOrder>()?;
    }
    let start: Option<i32> = read_parsed(config, "data", "start_year")?;
    let end: Option<i32> = read_parsed(config, "data", "end_year")?;
    validate_year_bounds(start, end)
}

pub fn validate_year_bounds(start: Option<i32>, end: Option<i32>) -> Result<(), FxsweepError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(FxsweepError::invalid(
                "data",
                "start_year",
                format!("start_year {s} is after end_year {e}"),
            ));
        }
    }
    Ok(())
}

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), FxsweepError> {
    if let Some(minutes) = read_parsed::<u32>(config, "analysis", "interval_minutes")? {
        BarInterval::minutes(minutes)?;
    }
    if let Some(groupings) = config.get_string("analysis", "groupings") {
        for grouping in groupings.split(',').filter(|g| !g.trim().is_empty()) {
            parse_grouping(grouping)?;
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FxsweepError> {
    validate_time_of_day(config, "backtest", "entry_time")?;
    validate_time_of_day(config, "backtest", "close_time")?;
    validate_positive(config, "backtest", "take_profit")?;
    validate_positive(config, "backtest", "stop_loss")?;
    validate_positive(config, "backtest", "size")?;
    validate_positive(config, "backtest", "initial_cash")?;

    if let Some(commission) = read_parsed::<f64>(config, "backtest", "commission")? {
        if !(0.0..1.0).contains(&commission) {
            return Err(FxsweepError::invalid(
                "backtest",
                "commission",
                "commission must be a fraction in [0, 1)",
            ));
        }
    }
    read_parsed::<u32>(config, "backtest", "close_tolerance_minutes")?;
    if let Some(days) = config.get_string("backtest", "excluded_weekdays") {
        parse_weekdays(&days)?;
    }
    if let Some(mode) = config.get_string("backtest", "process_mode") {
        mode.parse::<ProcessMode>()?;
    }
    Ok(())
}

fn validate_time_of_day(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), FxsweepError> {
    if let Some(hhmm) = read_parsed::<i64>(config, section, key)? {
        TimeOfDay::from_hhmm(hhmm).map_err(|e| FxsweepError::invalid(section, key, e.to_string()))?;
    }
    Ok(())
}

fn validate_positive(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), FxsweepError> {
    if let Some(value) = read_parsed::<f64>(config, section, key)? {
        if !value.is_finite() || value <= 0.0 {
            return Err(FxsweepError::invalid(
                section,
                key,
                format!("{key} must be positive"),
            ));
        }
    }
    Ok(())
}

/// Check the `[optimize]` section and return the size of the grid it expands to.
pub fn validate_optimize_config(config: &dyn ConfigPort) -> Result<usize, FxsweepError> {
    if let Some(metric) = config.get_string("optimize", "maximize") {
        metric.parse::<Metric>()?;
    }
    let grid = optimize_grid(config, backtest_params(config)?)?;
    Ok(grid.len())
}

/// Strategy parameters from `[backtest]`, with the stock 16:30 entry, 0.005
/// target, 0.05 stop and 00:30 close for missing keys.
pub fn backtest_params(config: &dyn ConfigPort) -> Result<StrategyParams, FxsweepError> {
    let entry_time = read_or(config, "backtest", "entry_time", 1630i64)?;
    let take_profit = read_or(config, "backtest", "take_profit", 0.005)?;
    let stop_loss = read_or(config, "backtest", "stop_loss", 0.05)?;
    let close_time = read_or(config, "backtest", "close_time", 30i64)?;
    StrategyParams::from_raw(entry_time, take_profit, stop_loss, close_time)
        .map_err(|e| FxsweepError::invalid("backtest", "parameters", e.to_string()))
}

/// Expand the four `[optimize]` domains. A missing axis sweeps just the
/// corresponding value of `fallback`.
pub fn optimize_grid(
    config: &dyn ConfigPort,
    fallback: StrategyParams,
) -> Result<ParameterGrid, FxsweepError> {
    let axis = |key: &str, default: f64| -> Result<ParamRange, FxsweepError> {
        match config.get_string("optimize", key) {
            Some(raw) => ParamRange::parse(key, &raw),
            None => Ok(ParamRange::List(vec![default])),
        }
    };
    ParameterGrid::from_ranges(
        &axis("entry_time", f64::from(fallback.entry_time.hhmm()))?,
        &axis("take_profit", fallback.take_profit)?,
        &axis("stop_loss", fallback.stop_loss)?,
        &axis("close_time", f64::from(fallback.close_time.hhmm()))?,
    )
}
