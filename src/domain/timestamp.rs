//! Timestamp parsing and timezone normalization.
//!
//! Raw archives stamp every line with a Tokyo wall-clock time in one of two
//! encodings. Records are normalized onto the New York wall clock, resolving
//! daylight-saving rules of both zones through the IANA database.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use super::error::FxsweepError;

/// Zone the archives are authored in.
pub const SOURCE_TZ: Tz = chrono_tz::Asia::Tokyo;

/// Zone every record is normalized to.
pub const DESTINATION_TZ: Tz = chrono_tz::America::New_York;

/// A zoned instant. Ordering and equality compare instants, not wall clocks.
pub type Timestamp = DateTime<Tz>;

/// Source and destination zones for a load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimezonePair {
    pub source: Tz,
    pub destination: Tz,
}

impl Default for TimezonePair {
    fn default() -> Self {
        TimezonePair {
            source: SOURCE_TZ,
            destination: DESTINATION_TZ,
        }
    }
}

impl TimezonePair {
    /// Parse a raw timestamp and move it onto the destination clock.
    pub fn normalize(&self, raw: &str) -> Result<Timestamp, FxsweepError> {
        let naive = parse_timestamp(raw)?;
        self.convert(naive, raw)
    }

    fn convert(&self, naive: NaiveDateTime, raw: &str) -> Result<Timestamp, FxsweepError> {
        let local = match self.source.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            // A repeated wall-clock hour: keep the earlier instant.
            LocalResult::Ambiguous(earlier, _) => earlier,
            LocalResult::None => {
                return Err(FxsweepError::TimestampParse {
                    value: raw.trim().to_string(),
                });
            }
        };
        Ok(local.with_timezone(&self.destination))
    }
}

/// Auto-detect and parse `YYYY/MM/DD HH:MM:SS`, `YYYYMMDDHHMMSS` or `YYYYMMDDHHMM`.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, FxsweepError> {
    let value = raw.trim();
    let fail = || FxsweepError::TimestampParse {
        value: value.to_string(),
    };

    if value.contains('/') {
        return NaiveDateTime::parse_from_str(value, "%Y/%m/%d %H:%M:%S").map_err(|_| fail());
    }

    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(fail());
    }

    let format = match value.len() {
        14 => "%Y%m%d%H%M%S",
        12 => "%Y%m%d%H%M",
        _ => return Err(fail()),
    };
    NaiveDateTime::parse_from_str(value, format).map_err(|_| fail())
}
