//! Trapezoidal area under the glucose curve.
//!
//! All areas are in mg/dL·min. Use [`to_mgdl_hours`] when a caller wants
//! mg/dL·h instead.

use chrono::{Duration, NaiveDateTime};

use crate::{
    metrics::kinetics::minutes_between,
    series::{shift, slice, ReadingSeries},
};

fn trapezoid<F>(window: &ReadingSeries, height: F) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let readings = window.readings();
    if readings.len() < 2 {
        return None;
    }
    let area = readings
        .windows(2)
        .map(|w| {
            let dt = minutes_between(w[0].timestamp, w[1].timestamp);
            (height(w[0].glucose) + height(w[1].glucose)) * dt / 2.0
        })
        .sum();
    Some(area)
}

/// Raw area under the curve; needs at least two samples.
pub fn total_auc(window: &ReadingSeries) -> Option<f64> {
    trapezoid(window, |g| g)
}

/// Area above `baseline` only: each sample is clamped to `max(0, g - baseline)`.
pub fn incremental_auc(window: &ReadingSeries, baseline: f64) -> Option<f64> {
    trapezoid(window, |g| (g - baseline).max(0.0))
}

/// Incremental area over `[anchor + from, anchor + to]`.
pub fn phase_auc(
    series: &ReadingSeries,
    anchor: NaiveDateTime,
    from: Duration,
    to: Duration,
    baseline: f64,
) -> Option<f64> {
    let window = slice(series, shift(anchor, from), shift(anchor, to));
    incremental_auc(&window, baseline)
}

/// Incremental area over the first 30 minutes after the anchor.
pub fn early_phase_auc(series: &ReadingSeries, anchor: NaiveDateTime, baseline: f64) -> Option<f64> {
    phase_auc(series, anchor, Duration::zero(), Duration::minutes(30), baseline)
}

/// Incremental area from 60 to 120 minutes after the anchor.
pub fn late_phase_auc(series: &ReadingSeries, anchor: NaiveDateTime, baseline: f64) -> Option<f64> {
    phase_auc(
        series,
        anchor,
        Duration::minutes(60),
        Duration::minutes(120),
        baseline,
    )
}

pub fn to_mgdl_hours(auc_mgdl_min: f64) -> f64 {
    auc_mgdl_min / 60.0
}
