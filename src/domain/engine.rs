//! Tick-level simulation of the intraday entry/exit rule.
//!
//! The engine is a two-state machine driven record by record:
//!
//! - `Flat -> Open` when the record's local time equals the entry time, the
//!   weekday is allowed, the record is outside the scheduled-close window and
//!   `stop < entry < target`. Fills at the bid close.
//! - `Open -> Flat` on the first of, in priority order: bid high reaching the
//!   target, bid low reaching the stop, the scheduled-close window. Target and
//!   stop fill at their own level, a scheduled close at the bid close.
//!
//! A position still open when the records run out is closed at the last bid
//! close. Exits are only checked on ticks after the entry tick.

use chrono::Datelike;

use super::metrics::Metrics;
use super::position::{ExitReason, Position, Trade};
use super::record::PriceRecord;
use super::series::NormalizedSeries;
use super::strategy::{EngineConfig, StrategyParams};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Flat,
    Open(Position),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub params: StrategyParams,
    pub trades: Vec<Trade>,
    pub metrics: Metrics,
    pub records_processed: usize,
}

/// Run one backtest over `series`.
pub fn run_strategy(
    series: &NormalizedSeries,
    params: &StrategyParams,
    config: &EngineConfig,
) -> BacktestResult {
    let mut state = EngineState::Flat;
    let mut trades = Vec::new();

    for record in series.records() {
        let closing = params
            .close_time
            .within(record.timestamp, config.close_tolerance_minutes);

        state = match state {
            EngineState::Open(position) => match exit_signal(&position, record, closing) {
                Some((price, reason)) => {
                    trades.push(close_position(position, record, price, reason, config));
                    EngineState::Flat
                }
                None => EngineState::Open(position),
            },
            EngineState::Flat => match entry_signal(record, params, config) {
                // The scheduled close cancels an entry that would fill inside its window.
                Some(_) if closing => {
                    tracing::trace!(at = %record.timestamp, "entry cancelled by scheduled close");
                    EngineState::Flat
                }
                Some(position) => EngineState::Open(position),
                None => EngineState::Flat,
            },
        };
    }

    if let (EngineState::Open(position), Some(last)) = (state, series.records().last()) {
        let price = last.bid.close;
        trades.push(close_position(position, last, price, ExitReason::EndOfData, config));
    }

    let metrics = Metrics::compute(&trades, config.initial_cash);
    BacktestResult {
        params: *params,
        trades,
        metrics,
        records_processed: series.len(),
    }
}

/// Position to open on this record, if every entry guard passes.
pub fn entry_signal(
    record: &PriceRecord,
    params: &StrategyParams,
    config: &EngineConfig,
) -> Option<Position> {
    if !params.entry_time.matches(record.timestamp) {
        return None;
    }
    if !config.allows_entry_on(record.timestamp.weekday()) {
        return None;
    }

    let entry_price = record.bid.close;
    let stop_loss = entry_price - params.stop_loss;
    let take_profit = entry_price + params.take_profit;
    if !(stop_loss < entry_price && entry_price < take_profit) {
        return None;
    }

    Some(Position {
        entry_time: record.timestamp,
        entry_price,
        size: config.size,
        stop_loss,
        take_profit,
        entry_commission: config.commission(entry_price, config.size),
    })
}

/// Exit price and reason for an open position on this record.
pub fn exit_signal(
    position: &Position,
    record: &PriceRecord,
    closing: bool,
) -> Option<(f64, ExitReason)> {
    if position.should_take_profit(record.bid.high) {
        Some((position.take_profit, ExitReason::TakeProfit))
    } else if position.should_stop_loss(record.bid.low) {
        Some((position.stop_loss, ExitReason::StopLoss))
    } else if closing {
        Some((record.bid.close, ExitReason::ScheduledClose))
    } else {
        None
    }
}

fn close_position(
    position: Position,
    record: &PriceRecord,
    exit_price: f64,
    exit_reason: ExitReason,
    config: &EngineConfig,
) -> Trade {
    let exit_commission = config.commission(exit_price, position.size);
    let pnl = position.unrealized_pnl(exit_price) - position.entry_commission - exit_commission;
    tracing::trace!(
        entry = %position.entry_time,
        exit = %record.timestamp,
        reason = %exit_reason,
        pnl,
        "position closed"
    );
    Trade {
        entry_time: position.entry_time,
        exit_time: record.timestamp,
        entry_price: position.entry_price,
        exit_price,
        size: position.size,
        pnl,
        exit_reason,
    }
}
