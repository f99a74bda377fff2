use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    metrics::stats::{linear_slope, mean},
    series::{shift, slice_open_end, ReadingSeries},
};

/// An extreme glucose value and when it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub value: f64,
    pub at: NaiveDateTime,
}

pub(crate) fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 60.0
}

/// Mean glucose over `[anchor - lookback, anchor)`.
pub fn baseline(series: &ReadingSeries, anchor: NaiveDateTime, lookback: Duration) -> Option<f64> {
    let window = slice_open_end(series, shift(anchor, -lookback), anchor);
    mean(&window.values())
}

/// Highest reading; the earliest one wins a tie.
pub fn peak(window: &ReadingSeries) -> Option<Extremum> {
    let mut best: Option<Extremum> = None;
    for r in window {
        if best.map_or(true, |b| r.glucose > b.value) {
            best = Some(Extremum {
                value: r.glucose,
                at: r.timestamp,
            });
        }
    }
    best
}

/// Lowest reading; the earliest one wins a tie.
pub fn trough(window: &ReadingSeries) -> Option<Extremum> {
    let mut best: Option<Extremum> = None;
    for r in window {
        if best.map_or(true, |b| r.glucose < b.value) {
            best = Some(Extremum {
                value: r.glucose,
                at: r.timestamp,
            });
        }
    }
    best
}

pub fn time_to_extremum(anchor: NaiveDateTime, extremum_time: NaiveDateTime) -> Duration {
    extremum_time - anchor
}

/// Rise rate in mg/dL per minute at the first post-anchor sample above baseline.
///
/// `None` when nothing after the anchor exceeds the baseline.
pub fn rate_of_change(window: &ReadingSeries, anchor: NaiveDateTime, baseline: f64) -> Option<f64> {
    window
        .iter()
        .filter(|r| r.timestamp > anchor)
        .find(|r| r.glucose > baseline)
        .map(|r| (r.glucose - baseline) / minutes_between(anchor, r.timestamp))
}

/// Regression slope (mg/dL per minute) of the samples strictly after the peak.
pub fn decline_rate(window: &ReadingSeries, peak_time: NaiveDateTime) -> Option<f64> {
    let points: Vec<(f64, f64)> = window
        .iter()
        .filter(|r| r.timestamp > peak_time)
        .map(|r| (minutes_between(peak_time, r.timestamp), r.glucose))
        .collect();
    linear_slope(&points)
}

/// First-crossing half-life estimate.
///
/// Finds the first post-peak sample at or below `(peak + baseline) / 2` and
/// returns twice the elapsed time from the peak. This is not a fitted
/// exponential decay. `None` when the curve never comes back down that far,
/// or when the peak does not rise above the baseline.
pub fn half_life(
    window: &ReadingSeries,
    peak_time: NaiveDateTime,
    baseline: f64,
    peak: f64,
) -> Option<Duration> {
    if peak <= baseline {
        return None;
    }
    let half_value = (peak + baseline) / 2.0;
    window
        .iter()
        .filter(|r| r.timestamp > peak_time)
        .find(|r| r.glucose <= half_value)
        .map(|r| (r.timestamp - peak_time) * 2)
}
