//! Report output port.

use std::fmt;

use crate::domain::engine::BacktestResult;
use crate::domain::error::FxsweepError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::stats::{GroupKey, StatBucket};

/// Instrument and period an artifact belongs to, e.g. `USDJPY` / `2023`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLabel {
    pub prefix: String,
    pub period: String,
}

impl ReportLabel {
    pub fn new(prefix: impl Into<String>, period: impl Into<String>) -> Self {
        ReportLabel {
            prefix: prefix.into(),
            period: period.into(),
        }
    }
}

impl fmt::Display for ReportLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.prefix, self.period)
    }
}

/// Port for writing run artifacts. Every write creates or overwrites its artifact.
pub trait ReportSink {
    fn write_trades(&self, label: &ReportLabel, result: &BacktestResult) -> Result<(), FxsweepError>;

    fn write_summary(&self, label: &ReportLabel, result: &BacktestResult) -> Result<(), FxsweepError>;

    fn write_optimization(
        &self,
        label: &ReportLabel,
        result: &OptimizationResult,
    ) -> Result<(), FxsweepError>;

    /// `name` distinguishes several tables for one label, e.g. `yearly`.
    fn write_stats(
        &self,
        label: &ReportLabel,
        name: &str,
        keys: &[GroupKey],
        stats: &[StatBucket],
    ) -> Result<(), FxsweepError>;

    /// Backtest trade log and summary together.
    fn write_backtest(&self, label: &ReportLabel, result: &BacktestResult) -> Result<(), FxsweepError> {
        self.write_trades(label, result)?;
        self.write_summary(label, result)
    }
}
