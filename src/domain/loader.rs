//! Archive ingestion into a normalized series.
//!
//! Each archive is a zip container of Shift_JIS encoded CSV files, one per
//! trading day, with a header line followed by rows of either
//! `timestamp, bid OHLC, ask OHLC` (9 columns) or `timestamp, bid OHLC`
//! (5 columns). A file that fails to parse is skipped and reported; the
//! load carries on with the rest.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::str::FromStr;

use chrono::Datelike;
use csv::StringRecord;
use encoding_rs::SHIFT_JIS;
use zip::ZipArchive;

use super::error::{FileError, FxsweepError};
use super::record::{Ohlc, PriceRecord};
use super::series::{NormalizedSeries, year_in_bounds};
use super::timestamp::TimezonePair;
use crate::ports::record_source::RecordSource;

pub const DEFAULT_EXCLUDED_SUFFIX: &str = "_EX";

/// Order archives are read in, which decides duplicate resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveOrder {
    /// Lexicographic by archive file name.
    #[default]
    Name,
    /// Whatever order the directory listing yields.
    Listing,
}

impl FromStr for ArchiveOrder {
    type Err = FxsweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(ArchiveOrder::Name),
            "listing" => Ok(ArchiveOrder::Listing),
            other => Err(FxsweepError::invalid(
                "data",
                "archive_order",
                format!("unknown archive order '{other}', expected name or listing"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub prefix: String,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub excluded_suffix: String,
    pub timezones: TimezonePair,
}

impl LoadOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        LoadOptions {
            prefix: prefix.into(),
            start_year: None,
            end_year: None,
            excluded_suffix: DEFAULT_EXCLUDED_SUFFIX.to_string(),
            timezones: TimezonePair::default(),
        }
    }

    /// Period label used in messages and artifact names.
    pub fn period_label(&self) -> String {
        match (self.start_year, self.end_year) {
            (Some(s), Some(e)) => format!("{s}-{e}"),
            (Some(s), None) => format!("{s}-"),
            (None, Some(e)) => format!("-{e}"),
            (None, None) => "all".to_string(),
        }
    }
}

/// A loaded series plus the files that were skipped along the way.
#[derive(Debug)]
pub struct LoadOutcome {
    pub series: NormalizedSeries,
    pub errors: Vec<FileError>,
    pub archives_read: usize,
    pub files_read: usize,
}

/// Read every archive for `options.prefix` and build the normalized series.
///
/// Only a failure to list the source is returned as an error. Records are
/// gathered in archive, entry and line order before the stable sort, so the
/// first-seen record wins among duplicates.
pub fn load_series(
    source: &dyn RecordSource,
    options: &LoadOptions,
) -> Result<LoadOutcome, FxsweepError> {
    let archives = source.list_archives(&options.prefix)?;
    tracing::info!(prefix = %options.prefix, archives = archives.len(), "loading archives");

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut archives_read = 0;
    let mut files_read = 0;

    for name in &archives {
        let mut archive = match source
            .read_archive(name)
            .and_then(|bytes| open_archive(name, bytes))
        {
            Ok(a) => a,
            Err(error) => {
                errors.push(FileError {
                    file: name.clone(),
                    error,
                });
                continue;
            }
        };
        archives_read += 1;

        for index in 0..archive.len() {
            let (entry_name, bytes) = match read_entry(&mut archive, index) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(error) => {
                    errors.push(FileError {
                        file: format!("{name}#{index}"),
                        error: FxsweepError::Archive {
                            path: name.clone(),
                            reason: error.to_string(),
                        },
                    });
                    continue;
                }
            };
            if !is_record_file(&entry_name, &options.excluded_suffix) {
                continue;
            }

            let file = format!("{name}/{entry_name}");
            match parse_entry(&file, &bytes, &options.timezones) {
                Ok(parsed) => {
                    files_read += 1;
                    records.extend(
                        parsed
                            .into_iter()
                            .filter(|r| year_in_bounds(year_of(r), options.start_year, options.end_year)),
                    );
                }
                Err(error) => errors.push(FileError { file, error }),
            }
        }
    }

    let series = NormalizedSeries::from_records(records);
    if !errors.is_empty() {
        tracing::warn!(skipped = errors.len(), "some files could not be read");
    }
    tracing::info!(
        archives = archives_read,
        files = files_read,
        records = series.len(),
        "load complete"
    );

    Ok(LoadOutcome {
        series,
        errors,
        archives_read,
        files_read,
    })
}

fn year_of(record: &PriceRecord) -> i32 {
    record.timestamp.year()
}

fn open_archive(name: &str, bytes: Vec<u8>) -> Result<ZipArchive<Cursor<Vec<u8>>>, FxsweepError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| FxsweepError::Archive {
        path: name.to_string(),
        reason: e.to_string(),
    })
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    index: usize,
) -> Result<Option<(String, Vec<u8>)>, Box<dyn std::error::Error>> {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() {
        return Ok(None);
    }
    let name = entry.name().to_string();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some((name, bytes)))
}

/// A `.csv` entry whose directories do not end in the excluded suffix.
pub fn is_record_file(entry_name: &str, excluded_suffix: &str) -> bool {
    let mut components: Vec<&str> = entry_name.split(['/', '\\']).collect();
    let file_name = components.pop().unwrap_or_default();
    if !file_name.to_lowercase().ends_with(".csv") {
        return false;
    }
    excluded_suffix.is_empty() || !components.iter().any(|dir| dir.ends_with(excluded_suffix))
}

/// Decode and parse one CSV entry.
pub fn parse_entry(
    file: &str,
    bytes: &[u8],
    timezones: &TimezonePair,
) -> Result<Vec<PriceRecord>, FxsweepError> {
    let (text, _, malformed) = SHIFT_JIS.decode(bytes);
    if malformed {
        return Err(FxsweepError::RecordParse {
            file: file.to_string(),
            line: 0,
            reason: "not valid Shift_JIS text".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = row.map_err(|e| FxsweepError::RecordParse {
            file: file.to_string(),
            line,
            reason: e.to_string(),
        })?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        records.push(parse_row(file, line, &row, timezones)?);
    }
    Ok(records)
}

fn parse_row(
    file: &str,
    line: usize,
    row: &StringRecord,
    timezones: &TimezonePair,
) -> Result<PriceRecord, FxsweepError> {
    let bad = |reason: String| FxsweepError::RecordParse {
        file: file.to_string(),
        line,
        reason,
    };
    let number = |idx: usize| -> Result<f64, FxsweepError> {
        let raw = row.get(idx).unwrap_or_default();
        raw.parse::<f64>()
            .map_err(|_| bad(format!("column {} is not a number: {raw:?}", idx + 1)))
    };
    let quote = |from: usize| -> Result<Ohlc, FxsweepError> {
        Ok(Ohlc::new(
            number(from)?,
            number(from + 1)?,
            number(from + 2)?,
            number(from + 3)?,
        ))
    };

    let timestamp = timezones.normalize(row.get(0).unwrap_or_default())?;
    match row.len() {
        9 => PriceRecord::new(timestamp, quote(1)?, quote(5)?),
        5 => PriceRecord::bid_only(timestamp, quote(1)?),
        n => Err(bad(format!("expected 9 or 5 columns, found {n}"))),
    }
}

/// Years named by the entries of every archive for `prefix`.
///
/// Entry names follow `<PREFIX>_<YYYYMMDD>.csv`; the year is the source-clock
/// trading day. Unreadable archives are skipped.
pub fn available_years(
    source: &dyn RecordSource,
    prefix: &str,
    excluded_suffix: &str,
) -> Result<Vec<i32>, FxsweepError> {
    let mut years = BTreeSet::new();
    for name in source.list_archives(prefix)? {
        let archive = match source
            .read_archive(&name)
            .and_then(|bytes| open_archive(&name, bytes))
        {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(archive = %name, error = %e, "skipping unreadable archive");
                continue;
            }
        };
        for entry_name in archive.file_names() {
            if !is_record_file(entry_name, excluded_suffix) {
                continue;
            }
            if let Some(year) = year_from_entry_name(entry_name, prefix) {
                years.insert(year);
            }
        }
    }
    Ok(years.into_iter().collect())
}

/// Distinct instrument prefixes among the archives, i.e. the text before the
/// first `_` of each `<PREFIX>_<PERIOD>.zip` name.
pub fn available_prefixes(source: &dyn RecordSource) -> Result<Vec<String>, FxsweepError> {
    let prefixes: BTreeSet<String> = source
        .list_archives("")?
        .iter()
        .filter_map(|name| {
            let file_name = name.rsplit(['/', '\\']).next()?;
            let (prefix, _) = file_name.split_once('_')?;
            Some(prefix)
        })
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect();
    Ok(prefixes.into_iter().collect())
}

fn year_from_entry_name(entry_name: &str, prefix: &str) -> Option<i32> {
    let file_name = entry_name.rsplit(['/', '\\']).next()?;
    let stem = file_name.get(..file_name.len().checked_sub(4)?)?;
    let date = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    date[..4].parse().ok()
}
