#![allow(dead_code)]

use chrono::TimeZone;
use encoding_rs::SHIFT_JIS;
use fxsweep::domain::error::FxsweepError;
use fxsweep::domain::record::{Ohlc, PriceRecord};
use fxsweep::domain::series::NormalizedSeries;
use fxsweep::domain::strategy::{EngineConfig, StrategyParams};
use fxsweep::domain::timestamp::{DESTINATION_TZ, SOURCE_TZ, Timestamp};
use fxsweep::ports::record_source::RecordSource;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const HEADER_5: &str = "日時,始値,高値,安値,終値";
pub const HEADER_9: &str = "日時,始値(BID),高値(BID),安値(BID),終値(BID),始値(ASK),高値(ASK),安値(ASK),終値(ASK)";

/// In-memory archive directory.
pub struct MockSource {
    pub archives: Vec<(String, Vec<u8>)>,
    pub unreadable: HashSet<String>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            archives: Vec::new(),
            unreadable: HashSet::new(),
        }
    }

    pub fn with_archive(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.archives.push((name.to_string(), bytes));
        self
    }

    pub fn with_unreadable(mut self, name: &str) -> Self {
        self.archives.push((name.to_string(), Vec::new()));
        self.unreadable.insert(name.to_string());
        self
    }
}

impl RecordSource for MockSource {
    fn list_archives(&self, prefix: &str) -> Result<Vec<String>, FxsweepError> {
        Ok(self
            .archives
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    fn read_archive(&self, name: &str) -> Result<Vec<u8>, FxsweepError> {
        if self.unreadable.contains(name) {
            return Err(FxsweepError::Archive {
                path: name.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        self.archives
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| FxsweepError::Archive {
                path: name.to_string(),
                reason: "not found".to_string(),
            })
    }
}

/// New York wall-clock instant.
pub fn ny(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Timestamp {
    DESTINATION_TZ.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn flat_record(ts: Timestamp, close: f64) -> PriceRecord {
    PriceRecord::bid_only(ts, Ohlc::flat(close)).unwrap()
}

pub fn make_series(points: &[(Timestamp, f64)]) -> NormalizedSeries {
    NormalizedSeries::from_records(points.iter().map(|(ts, c)| flat_record(*ts, *c)).collect())
}

/// Minute ticks starting at `start`, one per close.
pub fn minute_ticks(start: Timestamp, closes: &[f64]) -> Vec<(Timestamp, f64)> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| (start + chrono::Duration::minutes(i as i64), *c))
        .collect()
}

/// Tokyo wall-clock stamp as written in the archives.
pub fn tokyo_stamp(ts: Timestamp) -> String {
    ts.with_timezone(&SOURCE_TZ)
        .format("%Y/%m/%d %H:%M:%S")
        .to_string()
}

/// A 5-column day file for flat bid quotes, Shift_JIS encoded.
pub fn day_file(points: &[(Timestamp, f64)]) -> Vec<u8> {
    let mut text = String::from(HEADER_5);
    text.push('\n');
    for (ts, close) in points {
        text.push_str(&format!(
            "{},{close},{close},{close},{close}\n",
            tokyo_stamp(*ts)
        ));
    }
    shift_jis(&text)
}

pub fn shift_jis(text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    assert!(!had_errors);
    bytes.into_owned()
}

pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(dir: &Path, name: &str, entries: &[(&str, Vec<u8>)]) {
    std::fs::write(dir.join(name), zip_bytes(entries)).unwrap();
}

pub fn params(entry: i64, tp: f64, sl: f64, close: i64) -> StrategyParams {
    StrategyParams::from_raw(entry, tp, sl, close).unwrap()
}

/// Defaults with no weekday excluded.
pub fn any_day_config() -> EngineConfig {
    EngineConfig {
        excluded_weekdays: Vec::new(),
        ..EngineConfig::default()
    }
}
