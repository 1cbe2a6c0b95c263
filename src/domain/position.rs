//! Open position and closed trade records.

use std::fmt;

use serde::Serialize;

use super::timestamp::Timestamp;

/// Long position held by the engine between entry and exit.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_time: Timestamp,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_commission: f64,
}

impl Position {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size * (price - self.entry_price)
    }

    /// The tick's high reached the target.
    pub fn should_take_profit(&self, high: f64) -> bool {
        high >= self.take_profit
    }

    /// The tick's low reached the stop.
    pub fn should_stop_loss(&self, low: f64) -> bool {
        low <= self.stop_loss
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    ScheduledClose,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "TakeProfit",
            ExitReason::StopLoss => "StopLoss",
            ExitReason::ScheduledClose => "ScheduledClose",
            ExitReason::EndOfData => "EndOfData",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn holding_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}
