//! Canonical `timestamp,glucose` CSV input.

use std::{fs::File, io::Read, path::Path};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::series::{Reading, ReadingSeries};

const TIMESTAMP_COLUMNS: [&str; 3] = ["timestamp", "time", "datetime"];
const GLUCOSE_COLUMNS: [&str; 2] = ["glucose", "value"];
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Naive local timestamp in any of the accepted layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn read_readings_csv(path: &Path) -> Result<ReadingSeries> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_readings(file).with_context(|| format!("reading {}", path.display()))
}

/// Parse, sort and de-duplicate readings, then validate them as a series.
///
/// Rows whose glucose is empty or not a number are skipped with a warning;
/// a malformed timestamp fails the whole read.
pub fn read_readings<R: Read>(input: R) -> Result<ReadingSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers().context("reading header")?.clone();
    let ts_idx = locate_column(&headers, &TIMESTAMP_COLUMNS, "timestamp")?;
    let glucose_idx = locate_column(&headers, &GLUCOSE_COLUMNS, "glucose")?;

    let mut readings = Vec::new();
    let mut dropped = 0usize;
    for result in reader.records() {
        let record = result.context("reading record")?;
        let line = record.position().map_or(0, |p| p.line());
        let raw_ts = record
            .get(ts_idx)
            .ok_or_else(|| anyhow!("line {line}: missing timestamp"))?;
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| anyhow!("line {line}: unparseable timestamp {raw_ts:?}"))?;
        match record.get(glucose_idx).and_then(|v| v.parse::<f64>().ok()) {
            Some(glucose) if glucose.is_finite() => readings.push(Reading::new(timestamp, glucose)),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        log::warn!("dropped {dropped} row(s) without a numeric glucose value");
    }

    readings.sort_by_key(|r| r.timestamp);
    let before = readings.len();
    readings.dedup_by_key(|r| r.timestamp);
    if readings.len() < before {
        log::warn!(
            "dropped {} row(s) with a duplicate timestamp",
            before - readings.len()
        );
    }
    log::debug!("read {} readings", readings.len());
    Ok(ReadingSeries::new(readings)?)
}

fn locate_column(headers: &StringRecord, candidates: &[&str], hint: &str) -> Result<usize> {
    candidates
        .iter()
        .find_map(|wanted| {
            headers
                .iter()
                .position(|name| name.eq_ignore_ascii_case(wanted))
        })
        .ok_or_else(|| anyhow!("missing {} column (one of {})", hint, candidates.join(", ")))
}
