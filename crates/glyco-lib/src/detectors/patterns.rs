//! Bucketed comparisons over time of day and calendar days.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    detectors::episodes::{segment_episodes, EpisodeKind, EpisodeRule, ExtremumKind},
    metrics::{
        kinetics::peak,
        stats::{self, mean, population_std, sample_std},
    },
    series::{shift, slice_open_start, Reading, ReadingSeries},
};

/// Descriptive statistics of one group of readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub tir: f64,
}

impl GroupStats {
    pub fn from_values(values: &[f64], low: f64, high: f64) -> Option<Self> {
        let in_range = values.iter().filter(|&&g| g >= low && g <= high).count();
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            median: stats::median(values)?,
            std: sample_std(values),
            min: stats::min(values)?,
            max: stats::max(values)?,
            tir: in_range as f64 / values.len() as f64 * 100.0,
        })
    }

    pub fn of_series(series: &ReadingSeries, cfg: &AnalysisConfig) -> Option<Self> {
        Self::from_values(&series.values(), cfg.target_low, cfg.target_high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourOfDay {
    pub hour: u32,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: GroupStats,
}

/// One clock hour (`[start, start + 1h)`) of a specific day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub start: NaiveDateTime,
    pub mean: f64,
    pub std: Option<f64>,
    pub count: usize,
}

fn group_values<K, F>(series: &ReadingSeries, key: F) -> BTreeMap<K, Vec<f64>>
where
    K: Ord,
    F: Fn(&Reading) -> K,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for r in series {
        groups.entry(key(r)).or_default().push(r.glucose);
    }
    groups
}

pub(crate) fn hour_floor(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t)
}

/// Statistics per hour of day (0-23), pooled across days. Empty hours are omitted.
pub fn hourly_pattern(series: &ReadingSeries, cfg: &AnalysisConfig) -> Vec<HourOfDay> {
    group_values(series, |r| r.timestamp.hour())
        .into_iter()
        .filter_map(|(hour, values)| {
            GroupStats::from_values(&values, cfg.target_low, cfg.target_high)
                .map(|stats| HourOfDay { hour, stats })
        })
        .collect()
}

/// Statistics per calendar day.
pub fn daily_summaries(series: &ReadingSeries, cfg: &AnalysisConfig) -> Vec<DaySummary> {
    group_values(series, |r| r.timestamp.date())
        .into_iter()
        .filter_map(|(date, values)| {
            GroupStats::from_values(&values, cfg.target_low, cfg.target_high)
                .map(|stats| DaySummary { date, stats })
        })
        .collect()
}

/// Readings grouped by hour floor, one bucket per clock hour that has data.
pub fn hourly_buckets(series: &ReadingSeries) -> Vec<HourBucket> {
    group_values(series, |r| hour_floor(r.timestamp))
        .into_iter()
        .filter_map(|(start, values)| {
            Some(HourBucket {
                start,
                mean: mean(&values)?,
                std: sample_std(&values),
                count: values.len(),
            })
        })
        .collect()
}

/// Hourly bucket means as a series stamped at each bucket start.
pub fn hourly_means(series: &ReadingSeries) -> ReadingSeries {
    ReadingSeries::from_ordered(
        hourly_buckets(series)
            .into_iter()
            .map(|b| Reading::new(b.start, b.mean))
            .collect(),
    )
}

fn mean_between_hours(series: &ReadingSeries, from: u32, to: u32) -> Option<f64> {
    let values: Vec<f64> = series
        .iter()
        .filter(|r| (from..to).contains(&r.timestamp.hour()))
        .map(|r| r.glucose)
        .collect();
    mean(&values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DawnSeverity {
    None,
    Mild,
    Marked,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DawnPhenomenon {
    /// Mean over 00:00-04:00.
    pub night_mean: f64,
    /// Mean over 04:00-08:00.
    pub dawn_mean: f64,
    pub rise: f64,
    pub severity: DawnSeverity,
}

impl DawnPhenomenon {
    pub fn detected(&self) -> bool {
        self.severity != DawnSeverity::None
    }
}

/// Dawn rise with the usual 10 / 20 mg/dL tiers.
pub fn dawn_phenomenon(series: &ReadingSeries) -> Option<DawnPhenomenon> {
    let cfg = AnalysisConfig::default();
    dawn_phenomenon_with_tiers(series, cfg.dawn_mild_rise, cfg.dawn_marked_rise)
}

/// `None` unless both the early-night and the dawn bucket hold readings.
pub fn dawn_phenomenon_with_tiers(
    series: &ReadingSeries,
    mild: f64,
    marked: f64,
) -> Option<DawnPhenomenon> {
    let night_mean = mean_between_hours(series, 0, 4)?;
    let dawn_mean = mean_between_hours(series, 4, 8)?;
    let rise = dawn_mean - night_mean;
    let severity = if rise > marked {
        DawnSeverity::Marked
    } else if rise > mild {
        DawnSeverity::Mild
    } else {
        DawnSeverity::None
    };
    Some(DawnPhenomenon {
        night_mean,
        dawn_mean,
        rise,
        severity,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SomogyiRebound {
    /// Start of the nocturnal low.
    pub low_at: NaiveDateTime,
    pub low_value: f64,
    pub rebound_peak: f64,
    pub rebound_at: NaiveDateTime,
}

/// Readings before this clock hour count as nocturnal.
pub(crate) const NOCTURNAL_END_HOUR: u32 = 6;

/// First nocturnal low followed by a high within `horizon` of its last low
/// reading, with 70 / 180 mg/dL limits.
pub fn somogyi(series: &ReadingSeries, horizon: Duration) -> Option<SomogyiRebound> {
    somogyi_with_limits(series, horizon, 70.0, 180.0)
}

pub fn somogyi_with_limits(
    series: &ReadingSeries,
    horizon: Duration,
    low: f64,
    high: f64,
) -> Option<SomogyiRebound> {
    let rule = EpisodeRule::new(
        EpisodeKind::Hypoglycemia,
        ExtremumKind::Min,
        Duration::minutes(30),
    );
    let nocturnal = |r: &Reading| r.glucose < low && r.timestamp.hour() < NOCTURNAL_END_HOUR;
    segment_episodes(series, nocturnal, &rule)
        .into_iter()
        .find_map(|ep| {
            let after = slice_open_start(series, ep.start, shift(ep.end, horizon));
            let top = peak(&after)?;
            (top.value > high).then_some(SomogyiRebound {
                low_at: ep.start,
                low_value: ep.extremum,
                rebound_peak: top.value,
                rebound_at: top.at,
            })
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityLevel {
    Stable,
    Moderate,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircadianStability {
    /// Population std of the hour-of-day means.
    pub within_day_variability: f64,
    /// Sample std of the calendar-day means.
    pub between_day_variability: f64,
    pub stability_score: f64,
    pub level: StabilityLevel,
}

const MIN_HOURS_FOR_STABILITY: usize = 12;

/// Needs at least 12 populated hours of day and two calendar days.
pub fn circadian_stability(series: &ReadingSeries) -> Option<CircadianStability> {
    let hour_means: Vec<f64> = group_values(series, |r| r.timestamp.hour())
        .values()
        .filter_map(|v| mean(v))
        .collect();
    if hour_means.len() < MIN_HOURS_FOR_STABILITY {
        return None;
    }
    let day_means: Vec<f64> = group_values(series, |r| r.timestamp.date())
        .values()
        .filter_map(|v| mean(v))
        .collect();
    let within = population_std(&hour_means)?;
    let between = sample_std(&day_means)?;
    let score = (100.0 - 0.5 * within - 0.5 * between).clamp(0.0, 100.0);
    let level = if score > 70.0 {
        StabilityLevel::Stable
    } else if score > 50.0 {
        StabilityLevel::Moderate
    } else {
        StabilityLevel::Unstable
    };
    Some(CircadianStability {
        within_day_variability: within,
        between_day_variability: between,
        stability_score: score,
        level,
    })
}

pub(crate) fn is_weekend(t: NaiveDateTime) -> bool {
    matches!(t.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::*;

    fn flat_between(day: u32, from_hour: u32, to_hour: u32, value: f64) -> Vec<(NaiveDateTime, f64)> {
        (from_hour * 12..to_hour * 12)
            .map(|i| (on_day(day, i / 12, (i % 12) * 5), value))
            .collect()
    }

    #[test]
    fn dawn_rise_is_marked() {
        let mut pts = flat_between(15, 0, 4, 100.0);
        pts.extend(flat_between(15, 4, 8, 130.0));
        let dawn = dawn_phenomenon(&series(&pts)).unwrap();
        assert_close(dawn.rise, 30.0, 1e-12);
        assert_eq!(dawn.severity, DawnSeverity::Marked);
        assert!(dawn.detected());
    }

    #[test]
    fn dawn_tiers_are_strict() {
        let mut pts = flat_between(15, 0, 4, 100.0);
        pts.extend(flat_between(15, 4, 8, 110.0));
        let dawn = dawn_phenomenon(&series(&pts)).unwrap();
        assert_eq!(dawn.severity, DawnSeverity::None);

        let mut pts = flat_between(15, 0, 4, 100.0);
        pts.extend(flat_between(15, 4, 8, 115.0));
        assert_eq!(
            dawn_phenomenon(&series(&pts)).unwrap().severity,
            DawnSeverity::Mild
        );
    }

    #[test]
    fn dawn_needs_both_buckets() {
        let pts = flat_between(15, 4, 8, 130.0);
        assert_eq!(dawn_phenomenon(&series(&pts)), None);
    }

    #[test]
    fn somogyi_finds_rebound_within_horizon() {
        let s = series(&[
            (at(1, 0), 90.0),
            (at(2, 0), 65.0),
            (at(2, 15), 60.0),
            (at(2, 30), 75.0),
            (at(4, 0), 150.0),
            (at(5, 0), 195.0),
            (at(5, 30), 185.0),
        ]);
        let hit = somogyi(&s, Duration::hours(4)).unwrap();
        assert_eq!(hit.low_at, at(2, 0));
        assert_eq!(hit.low_value, 60.0);
        assert_eq!((hit.rebound_peak, hit.rebound_at), (195.0, at(5, 0)));

        assert_eq!(somogyi(&s, Duration::hours(2)), None);
    }

    #[test]
    fn somogyi_horizon_runs_from_the_last_low() {
        let mut pts: Vec<_> = (0..=10)
            .map(|i| (at(1, 0) + Duration::minutes(15 * i), 60.0))
            .collect();
        pts.push((at(4, 30), 120.0));
        pts.push((at(6, 0), 200.0));
        let hit = somogyi(&series(&pts), Duration::hours(4)).unwrap();
        // the low runs 01:00-03:30, so 06:00 is inside 03:30 + 4h
        assert_eq!(hit.low_at, at(1, 0));
        assert_eq!((hit.rebound_peak, hit.rebound_at), (200.0, at(6, 0)));
    }

    #[test]
    fn somogyi_survives_an_unbounded_horizon() {
        let s = series(&[(at(2, 0), 60.0), (at(5, 0), 220.0)]);
        let hit = somogyi(&s, Duration::MAX).unwrap();
        assert_eq!(hit.rebound_at, at(5, 0));
    }

    #[test]
    fn somogyi_ignores_daytime_lows() {
        let s = series(&[(at(13, 0), 60.0), (at(14, 0), 220.0)]);
        assert_eq!(somogyi(&s, Duration::hours(4)), None);
    }

    #[test]
    fn hourly_buckets_floor_to_the_hour() {
        let s = series(&[
            (at(7, 5), 100.0),
            (at(7, 55), 120.0),
            (at(8, 0), 200.0),
            (at(10, 30), 150.0),
        ]);
        let buckets = hourly_buckets(&s);
        assert_eq!(buckets.len(), 3);
        assert_eq!((buckets[0].start, buckets[0].mean), (at(7, 0), 110.0));
        assert_eq!(buckets[1].std, None);
        let means = hourly_means(&s);
        assert_eq!(means.values(), vec![110.0, 200.0, 150.0]);
    }

    #[test]
    fn hourly_pattern_pools_days() {
        let cfg = AnalysisConfig::default();
        let s = series(&[(on_day(15, 7, 0), 100.0), (on_day(16, 7, 30), 140.0)]);
        let pattern = hourly_pattern(&s, &cfg);
        assert_eq!(pattern.len(), 1);
        assert_eq!(pattern[0].hour, 7);
        assert_eq!(pattern[0].stats.mean, 120.0);
        assert_eq!(daily_summaries(&s, &cfg).len(), 2);
    }

    #[test]
    fn circadian_needs_half_a_day_and_two_days() {
        let day_one: Vec<_> = (0..24).map(|h| (on_day(15, h, 0), 100.0 + h as f64)).collect();
        assert_eq!(circadian_stability(&series(&day_one)), None);

        let mut pts = day_one.clone();
        pts.extend((0..24).map(|h| (on_day(16, h, 0), 110.0 + h as f64)));
        let c = circadian_stability(&series(&pts)).unwrap();
        // hour means 105..128 step 1 -> population std of 0..23
        assert_close(c.within_day_variability, 6.922186552431729, 1e-9);
        // day means 111.5 and 121.5
        assert_close(c.between_day_variability, 7.0710678118654755, 1e-9);
        assert_close(c.stability_score, 100.0 - 0.5 * (6.922186552431729 + 7.0710678118654755), 1e-9);
        assert_eq!(c.level, StabilityLevel::Stable);

        let sparse = series(&[(on_day(15, 1, 0), 100.0), (on_day(16, 1, 0), 110.0)]);
        assert_eq!(circadian_stability(&sparse), None);
    }

    #[test]
    fn weekend_detection() {
        // 2026-02-15 is a Sunday
        assert!(is_weekend(at(12, 0)));
        assert!(!is_weekend(on_day(16, 12, 0)));
    }
}
