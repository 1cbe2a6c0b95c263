//! Exhaustive grid search over strategy parameters.
//!
//! Parameter domains are written as `range(start, stop[, step])` with an
//! exclusive stop, as a bracketed list `[a, b, c]`, or as a bare
//! comma-separated list. Grid points are enumerated with entry time
//! outermost, then take profit, stop loss and close time; that order also
//! breaks ties between equally scored points.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::engine::{BacktestResult, run_strategy};
use super::error::FxsweepError;
use super::metrics::Metrics;
use super::series::NormalizedSeries;
use super::strategy::{EngineConfig, StrategyParams, TimeOfDay};

const MAX_AXIS_POINTS: usize = 100_000;

/// Largest grid a sweep will enumerate.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// A typed parameter domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamRange {
    Range { start: f64, stop: f64, step: f64 },
    List(Vec<f64>),
}

impl ParamRange {
    /// Parse a domain for `[optimize] key`.
    pub fn parse(key: &str, input: &str) -> Result<Self, FxsweepError> {
        let text = input.trim();
        let invalid = |reason: String| FxsweepError::invalid("optimize", key, reason);

        if let Some(args) = text
            .strip_prefix("range(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let nums = parse_numbers(args).map_err(&invalid)?;
            let (start, stop, step) = match nums.as_slice() {
                [start, stop] => (*start, *stop, 1.0),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(invalid(format!("range takes 2 or 3 arguments: {text}"))),
            };
            if step == 0.0 {
                return Err(invalid("range step must not be zero".to_string()));
            }
            let range = ParamRange::Range { start, stop, step };
            if range.len() > MAX_AXIS_POINTS {
                return Err(invalid(format!(
                    "range expands to more than {MAX_AXIS_POINTS} values"
                )));
            }
            return Ok(range);
        }

        let body = text
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(text);
        let values = parse_numbers(body).map_err(invalid)?;
        if values.is_empty() {
            return Err(FxsweepError::invalid("optimize", key, "empty value list"));
        }
        Ok(ParamRange::List(values))
    }

    pub fn len(&self) -> usize {
        match self {
            ParamRange::Range { start, stop, step } => {
                let n = ((stop - start) / step - 1e-9).ceil();
                if n.is_finite() && n > 0.0 { n as usize } else { 0 }
            }
            ParamRange::List(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expanded values in declaration order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            ParamRange::Range { start, step, .. } => (0..self.len())
                .map(|i| round_step(start + i as f64 * step))
                .collect(),
            ParamRange::List(values) => values.clone(),
        }
    }
}

fn round_step(value: f64) -> f64 {
    (value * 1e10).round() / 1e10
}

fn parse_numbers(input: &str) -> Result<Vec<f64>, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{s}' is not a number"))
        })
        .collect()
}

fn hhmm_values(key: &str, range: &ParamRange) -> Result<Vec<i64>, FxsweepError> {
    range
        .values()
        .into_iter()
        .map(|v| {
            let hhmm = v as i64;
            if v.fract() != 0.0 || TimeOfDay::from_hhmm(hhmm).is_err() {
                return Err(FxsweepError::invalid(
                    "optimize",
                    key,
                    format!("{v} is not a valid HHMM time of day"),
                ));
            }
            Ok(hhmm)
        })
        .collect()
}

/// One raw combination of parameter values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub entry_time: i64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub close_time: i64,
}

impl GridPoint {
    pub fn params(&self) -> Result<StrategyParams, FxsweepError> {
        StrategyParams::from_raw(
            self.entry_time,
            self.take_profit,
            self.stop_loss,
            self.close_time,
        )
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry Time: {:04}, Take Profit: {}, Stop Loss: {}, Close Time: {:04}",
            self.entry_time, self.take_profit, self.stop_loss, self.close_time
        )
    }
}

/// The four expanded parameter axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    pub entry_times: Vec<i64>,
    pub take_profits: Vec<f64>,
    pub stop_losses: Vec<f64>,
    pub close_times: Vec<i64>,
}

impl ParameterGrid {
    pub fn from_ranges(
        entry_time: &ParamRange,
        take_profit: &ParamRange,
        stop_loss: &ParamRange,
        close_time: &ParamRange,
    ) -> Result<Self, FxsweepError> {
        let grid = ParameterGrid {
            entry_times: hhmm_values("entry_time", entry_time)?,
            take_profits: take_profit.values(),
            stop_losses: stop_loss.values(),
            close_times: hhmm_values("close_time", close_time)?,
        };
        let axes = [
            ("entry_time", grid.entry_times.len()),
            ("take_profit", grid.take_profits.len()),
            ("stop_loss", grid.stop_losses.len()),
            ("close_time", grid.close_times.len()),
        ];
        for (key, len) in axes {
            if len == 0 {
                return Err(FxsweepError::invalid("optimize", key, "domain has no values"));
            }
        }
        match grid.checked_len() {
            Some(total) if total <= MAX_GRID_POINTS => Ok(grid),
            _ => Err(FxsweepError::invalid(
                "optimize",
                "grid",
                format!("grid expands to more than {MAX_GRID_POINTS} points"),
            )),
        }
    }

    fn checked_len(&self) -> Option<usize> {
        self.entry_times
            .len()
            .checked_mul(self.take_profits.len())?
            .checked_mul(self.stop_losses.len())?
            .checked_mul(self.close_times.len())
    }

    /// Number of grid points, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, entry time outermost.
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = Vec::with_capacity(self.len());
        for &entry_time in &self.entry_times {
            for &take_profit in &self.take_profits {
                for &stop_loss in &self.stop_losses {
                    for &close_time in &self.close_times {
                        points.push(GridPoint {
                            entry_time,
                            take_profit,
                            stop_loss,
                            close_time,
                        });
                    }
                }
            }
        }
        points
    }
}

/// Metric a sweep maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    WinRate,
    TotalReturn,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::WinRate => "win_rate",
            Metric::TotalReturn => "total_return",
        }
    }

    pub fn score(&self, metrics: &Metrics) -> f64 {
        match self {
            Metric::WinRate => metrics.win_rate,
            Metric::TotalReturn => metrics.total_return,
        }
    }
}

impl FromStr for Metric {
    type Err = FxsweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win_rate" => Ok(Metric::WinRate),
            "total_return" => Ok(Metric::TotalReturn),
            other => Err(FxsweepError::invalid(
                "optimize",
                "maximize",
                format!("unknown metric '{other}', expected win_rate or total_return"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridOutcome {
    Evaluated { result: BacktestResult, score: f64 },
    Infeasible { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridResult {
    pub point: GridPoint,
    pub outcome: GridOutcome,
}

impl GridResult {
    pub fn score(&self) -> Option<f64> {
        match &self.outcome {
            GridOutcome::Evaluated { score, .. } => Some(*score),
            GridOutcome::Infeasible { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub metric: Metric,
    /// Evaluated points in enumeration order.
    pub points: Vec<GridResult>,
    /// Index into `points` of the selected combination.
    pub best: Option<usize>,
    pub total_points: usize,
    pub cancelled: bool,
}

impl OptimizationResult {
    pub fn best_point(&self) -> Option<&GridResult> {
        self.best.and_then(|i| self.points.get(i))
    }

    pub fn infeasible_count(&self) -> usize {
        self.points.iter().filter(|p| p.score().is_none()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeOptions {
    pub metric: Metric,
    pub parallel: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            metric: Metric::default(),
            parallel: true,
        }
    }
}

/// Index of the highest-scoring feasible point. Only a strictly greater
/// score replaces the incumbent, so ties keep the earliest point.
pub fn select_best(points: &[GridResult]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, point) in points.iter().enumerate() {
        if let Some(score) = point.score() {
            if best.is_none_or(|(_, incumbent)| score > incumbent) {
                best = Some((i, score));
            }
        }
    }
    best.map(|(i, _)| i)
}

/// Run one grid point.
pub fn evaluate_point(
    series: &NormalizedSeries,
    point: GridPoint,
    config: &EngineConfig,
    metric: Metric,
) -> GridResult {
    let outcome = match point.params() {
        Err(err) => GridOutcome::Infeasible {
            reason: err.to_string(),
        },
        Ok(params) => {
            let result = run_strategy(series, &params, config);
            if result.trades.is_empty() {
                GridOutcome::Infeasible {
                    reason: "no trades".to_string(),
                }
            } else {
                let score = metric.score(&result.metrics);
                GridOutcome::Evaluated { result, score }
            }
        }
    };
    tracing::debug!(%point, feasible = matches!(outcome, GridOutcome::Evaluated { .. }), "grid point evaluated");
    GridResult { point, outcome }
}

/// Evaluate every grid point over `series` and pick the best.
///
/// `cancel` is checked before each point; once set, the remaining points
/// are skipped and the completed ones are returned in order.
pub fn optimize(
    series: &NormalizedSeries,
    grid: &ParameterGrid,
    config: &EngineConfig,
    options: &OptimizeOptions,
    cancel: &AtomicBool,
) -> OptimizationResult {
    let points = grid.points();
    tracing::info!(
        points = points.len(),
        records = series.len(),
        metric = options.metric.name(),
        parallel = options.parallel,
        "grid search started"
    );

    let run = |point: &GridPoint| -> Option<GridResult> {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        Some(evaluate_point(series, *point, config, options.metric))
    };

    let evaluated: Vec<Option<GridResult>> = if options.parallel {
        evaluate_parallel(&points, &run)
    } else {
        points.iter().map(&run).collect()
    };

    let cancelled = evaluated.iter().any(Option::is_none);
    let results: Vec<GridResult> = evaluated.into_iter().flatten().collect();
    let best = select_best(&results);

    if cancelled {
        tracing::warn!(completed = results.len(), total = points.len(), "grid search cancelled");
    }
    OptimizationResult {
        metric: options.metric,
        points: results,
        best,
        total_points: points.len(),
        cancelled,
    }
}

#[cfg(feature = "parallel")]
fn evaluate_parallel<F>(points: &[GridPoint], run: &F) -> Vec<Option<GridResult>>
where
    F: Fn(&GridPoint) -> Option<GridResult> + Sync,
{
    points.par_iter().map(run).collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_parallel<F>(points: &[GridPoint], run: &F) -> Vec<Option<GridResult>>
where
    F: Fn(&GridPoint) -> Option<GridResult>,
{
    points.iter().map(run).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum YearOutcome {
    /// The year had no records after filtering.
    NoData,
    Optimized(OptimizationResult),
}

/// Sweep each requested year on its own partition.
pub fn optimize_by_year(
    series: &NormalizedSeries,
    years: &[i32],
    grid: &ParameterGrid,
    config: &EngineConfig,
    options: &OptimizeOptions,
    cancel: &AtomicBool,
) -> BTreeMap<i32, YearOutcome> {
    let mut partitions = series.partition_by_year();
    let mut outcomes = BTreeMap::new();
    for &year in years {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let outcome = match partitions.remove(&year) {
            Some(partition) if !partition.is_empty() => {
                YearOutcome::Optimized(optimize(&partition, grid, config, options, cancel))
            }
            _ => {
                tracing::info!(year, "no records for year");
                YearOutcome::NoData
            }
        };
        outcomes.insert(year, outcome);
    }
    outcomes
}
