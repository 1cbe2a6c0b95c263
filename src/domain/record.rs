//! Price record representation.

use super::error::FxsweepError;
use super::timestamp::Timestamp;

/// One side (bid or ask) of an OHLC quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Ohlc {
            open,
            high,
            low,
            close,
        }
    }

    /// A flat quote where every field equals `price`.
    pub fn flat(price: f64) -> Self {
        Ohlc::new(price, price, price, price)
    }

    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// All fields finite, high the maximum and low the minimum.
    pub fn is_consistent(&self) -> bool {
        let fields = [self.open, self.high, self.low, self.close];
        fields.iter().all(|v| v.is_finite())
            && self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }
}

/// One raw quote line, normalized onto the destination clock.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub timestamp: Timestamp,
    pub bid: Ohlc,
    pub ask: Ohlc,
}

impl PriceRecord {
    /// Build a record, rejecting quotes that break the OHLC ordering.
    pub fn new(timestamp: Timestamp, bid: Ohlc, ask: Ohlc) -> Result<Self, FxsweepError> {
        for (side, quote) in [("bid", &bid), ("ask", &ask)] {
            if !quote.is_consistent() {
                return Err(FxsweepError::DataIntegrity {
                    reason: format!(
                        "{side} quote at {timestamp} is not a valid OHLC: {quote:?}"
                    ),
                });
            }
        }
        Ok(PriceRecord {
            timestamp,
            bid,
            ask,
        })
    }

    /// Bid-only feeds mirror the bid onto the ask side.
    pub fn bid_only(timestamp: Timestamp, bid: Ohlc) -> Result<Self, FxsweepError> {
        PriceRecord::new(timestamp, bid, bid)
    }
}
