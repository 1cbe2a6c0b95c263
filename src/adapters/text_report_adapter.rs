//! Plain-text and CSV report adapter implementing ReportSink.
//!
//! Artifacts land in one output directory as `<PREFIX>_<kind>_<PERIOD>.<ext>`:
//! `trades` (csv), `backtest_results` (txt), `optimization_results` (txt) and
//! `volatility_<name>` (csv).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::engine::BacktestResult;
use crate::domain::error::FxsweepError;
use crate::domain::metrics::Metrics;
use crate::domain::optimizer::{GridOutcome, OptimizationResult};
use crate::domain::position::{ExitReason, Trade};
use crate::domain::stats::{GroupKey, StatBucket};
use crate::domain::timestamp::Timestamp;
use crate::ports::report_port::{ReportLabel, ReportSink};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

pub struct TextReportAdapter {
    dir: PathBuf,
}

impl TextReportAdapter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, label: &ReportLabel, kind: &str, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{kind}_{}.{ext}", label.prefix, label.period))
    }

    fn write_text(&self, path: &Path, lines: &[String]) -> Result<(), FxsweepError> {
        fs::create_dir_all(&self.dir)?;
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "artifact written");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct TradeRow {
    entry_time: String,
    exit_time: String,
    entry_price: f64,
    exit_price: f64,
    size: f64,
    pnl: f64,
    exit_reason: ExitReason,
}

impl From<&Trade> for TradeRow {
    fn from(t: &Trade) -> Self {
        TradeRow {
            entry_time: format_time(&t.entry_time),
            exit_time: format_time(&t.exit_time),
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            size: t.size,
            pnl: t.pnl,
            exit_reason: t.exit_reason,
        }
    }
}

fn format_time(ts: &Timestamp) -> String {
    ts.format(TIME_FORMAT).to_string()
}

/// Human-readable metric block shared by summaries and optimizer reports.
pub fn metrics_lines(metrics: &Metrics) -> Vec<String> {
    vec![
        format!("Total Trades:     {}", metrics.total_trades),
        format!(
            "Won/Lost/Even:    {}/{}/{}",
            metrics.trades_won, metrics.trades_lost, metrics.trades_breakeven
        ),
        format!("Win Rate:         {:.1}%", metrics.win_rate * 100.0),
        format!("Total PnL:        {:.5}", metrics.total_pnl),
        format!("Total Return:     {:.4}%", metrics.total_return * 100.0),
        format!("Final Equity:     {:.5}", metrics.final_equity),
        format!("Max Drawdown:     -{:.4}%", metrics.max_drawdown * 100.0),
        format!("Profit Factor:    {:.2}", metrics.profit_factor),
        format!("Avg Win:          {:.5}", metrics.avg_win),
        format!("Avg Loss:         {:.5}", metrics.avg_loss),
        format!("Largest Win:      {:.5}", metrics.largest_win),
        format!("Largest Loss:     {:.5}", metrics.largest_loss),
        format!("Avg Holding:      {:.1} min", metrics.avg_holding_minutes),
    ]
}

impl ReportSink for TextReportAdapter {
    fn write_trades(&self, label: &ReportLabel, result: &BacktestResult) -> Result<(), FxsweepError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.artifact_path(label, "trades", "csv");
        let mut writer = csv::Writer::from_path(&path)?;
        if result.trades.is_empty() {
            writer.write_record([
                "entry_time",
                "exit_time",
                "entry_price",
                "exit_price",
                "size",
                "pnl",
                "exit_reason",
            ])?;
        }
        for trade in &result.trades {
            writer.serialize(TradeRow::from(trade))?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), trades = result.trades.len(), "trade log written");
        Ok(())
    }

    fn write_summary(&self, label: &ReportLabel, result: &BacktestResult) -> Result<(), FxsweepError> {
        let mut lines = vec![
            format!("=== {label} ==="),
            result.params.to_string(),
            format!("Records:          {}", result.records_processed),
        ];
        lines.extend(metrics_lines(&result.metrics));
        self.write_text(&self.artifact_path(label, "backtest_results", "txt"), &lines)
    }

    fn write_optimization(
        &self,
        label: &ReportLabel,
        result: &OptimizationResult,
    ) -> Result<(), FxsweepError> {
        let mut lines = vec![
            format!("=== {label} ==="),
            format!("Maximize: {}", result.metric.name()),
            format!(
                "Evaluated: {} of {} ({} infeasible){}",
                result.points.len(),
                result.total_points,
                result.infeasible_count(),
                if result.cancelled { ", cancelled" } else { "" }
            ),
            String::new(),
        ];
        for grid_result in &result.points {
            let line = match &grid_result.outcome {
                GridOutcome::Evaluated { result: run, score } => format!(
                    "{} => {}: {:.6}, trades: {}, pnl: {:.5}",
                    grid_result.point,
                    result.metric.name(),
                    score,
                    run.metrics.total_trades,
                    run.metrics.total_pnl
                ),
                GridOutcome::Infeasible { reason } => {
                    format!("{} => infeasible: {}", grid_result.point, reason)
                }
            };
            lines.push(line);
        }
        lines.push(String::new());
        match result.best_point() {
            Some(best) => {
                lines.push(format!("Best: {}", best.point));
                if let GridOutcome::Evaluated { result: run, .. } = &best.outcome {
                    lines.extend(metrics_lines(&run.metrics));
                }
            }
            None => lines.push("Best: none (no feasible grid point)".to_string()),
        }
        self.write_text(&self.artifact_path(label, "optimization_results", "txt"), &lines)
    }

    fn write_stats(
        &self,
        label: &ReportLabel,
        name: &str,
        keys: &[GroupKey],
        stats: &[StatBucket],
    ) -> Result<(), FxsweepError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.artifact_path(label, &format!("volatility_{name}"), "csv");
        let mut writer = csv::Writer::from_path(&path)?;

        let mut header: Vec<String> = keys.iter().map(|k| k.name().to_string()).collect();
        header.extend(["mean", "std_dev", "count"].map(String::from));
        writer.write_record(&header)?;

        for bucket in stats {
            let mut row: Vec<String> = bucket.key.iter().map(|k| k.to_string()).collect();
            row.push(bucket.mean.to_string());
            row.push(bucket.std_dev.to_string());
            row.push(bucket.count.to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
