use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::PhaseStats,
    config::AnalysisConfig,
    detectors::{
        episodes::{segment_episodes, EpisodeKind, EpisodeRule, ExtremumKind},
        patterns::{hourly_buckets, hourly_means, HourBucket},
    },
    metrics::{kinetics::baseline, stats::mean},
    series::{clamped_days, clamped_minutes, shift, slice, ReadingSeries},
};

const ALCOHOL_LOOKBACK_MIN: i64 = 60;
const ALCOHOL_WINDOW_MIN: i64 = 360;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlcoholResponse {
    pub drink_at: NaiveDateTime,
    /// Mean over the hour before drinking.
    pub baseline: Option<f64>,
    /// Readings over the six hours after drinking.
    pub after: Option<PhaseStats>,
    /// Baseline minus the lowest reading after drinking.
    pub drop: Option<f64>,
    pub delayed_hypo_risk: bool,
}

pub fn alcohol_response(
    series: &ReadingSeries,
    drink_at: NaiveDateTime,
    cfg: &AnalysisConfig,
) -> AlcoholResponse {
    let base = baseline(series, drink_at, Duration::minutes(ALCOHOL_LOOKBACK_MIN));
    let after = PhaseStats::of(&slice(
        series,
        drink_at,
        shift(drink_at, Duration::minutes(ALCOHOL_WINDOW_MIN)),
    ));
    AlcoholResponse {
        drink_at,
        baseline: base,
        after,
        drop: base.zip(after).map(|(b, a)| b - a.min),
        delayed_hypo_risk: after.is_some_and(|a| a.min < cfg.target_low),
    }
}

/// Fall between consecutive readings steep enough to suggest drinking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RapidDrop {
    pub at: NaiveDateTime,
    pub delta: f64,
}

/// Consecutive-reading drops between 30 and 80 mg/dL.
pub fn rapid_drops(series: &ReadingSeries) -> Vec<RapidDrop> {
    series
        .readings()
        .windows(2)
        .map(|w| RapidDrop {
            at: w[1].timestamp,
            delta: w[1].glucose - w[0].glucose,
        })
        .filter(|d| d.delta < -30.0 && d.delta > -80.0)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressPeriod {
    pub start: NaiveDateTime,
    /// End of the last qualifying hour.
    pub end: NaiveDateTime,
    pub hours: i64,
    pub mean_glucose: f64,
}

/// Runs of consecutive clock hours whose mean exceeds `stress_threshold`,
/// at least `stress_min_hours` long.
pub fn stress_periods(series: &ReadingSeries, cfg: &AnalysisConfig) -> Vec<StressPeriod> {
    let hourly = hourly_means(series);
    let rule = EpisodeRule::new(EpisodeKind::Stress, ExtremumKind::Max, Duration::hours(1))
        .with_min_duration(clamped_minutes(
            cfg.stress_min_hours.saturating_sub(1).max(0).saturating_mul(60),
        ));
    segment_episodes(&hourly, |r| r.glucose > cfg.stress_threshold, &rule)
        .into_iter()
        .filter_map(|ep| {
            let end = shift(ep.end, Duration::hours(1));
            Some(StressPeriod {
                start: ep.start,
                end,
                hours: (end - ep.start).num_hours(),
                mean_glucose: mean(&slice(&hourly, ep.start, ep.end).values())?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IllnessVolatility {
    pub unusual_volatility: bool,
    pub volatile_hours: Vec<HourBucket>,
}

/// Clock hours whose sample std exceeds `illness_hourly_std`.
pub fn illness_volatility(series: &ReadingSeries, cfg: &AnalysisConfig) -> IllnessVolatility {
    let volatile_hours: Vec<HourBucket> = hourly_buckets(series)
        .into_iter()
        .filter(|b| b.std.is_some_and(|sd| sd > cfg.illness_hourly_std))
        .collect();
    log::debug!("{} volatile hour(s)", volatile_hours.len());
    IllnessVolatility {
        unusual_volatility: !volatile_hours.is_empty(),
        volatile_hours,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentChange {
    pub days: i64,
    pub recent_mean: f64,
    pub previous_mean: f64,
    pub change: f64,
}

/// Mean of the last `days` days of data against the `days` before them,
/// measured back from the final reading.
pub fn recent_change(series: &ReadingSeries, days: i64) -> Option<RecentChange> {
    let last = series.last()?.timestamp;
    let split = shift(last, -clamped_days(days));
    let from = shift(split, -clamped_days(days));
    let recent: Vec<f64> = series
        .iter()
        .filter(|r| r.timestamp > split)
        .map(|r| r.glucose)
        .collect();
    let previous: Vec<f64> = series
        .iter()
        .filter(|r| r.timestamp > from && r.timestamp <= split)
        .map(|r| r.glucose)
        .collect();
    let recent_mean = mean(&recent)?;
    let previous_mean = mean(&previous)?;
    Some(RecentChange {
        days,
        recent_mean,
        previous_mean,
        change: recent_mean - previous_mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::*;

    #[test]
    fn alcohol_delayed_low() {
        let cfg = AnalysisConfig::default();
        let s = series(&[
            (at(20, 0), 130.0),
            (at(20, 40), 140.0),
            (at(21, 30), 120.0),
            (at(23, 0), 90.0),
            (on_day(16, 2, 0), 65.0),
            (on_day(16, 4, 0), 80.0),
        ]);
        let r = alcohol_response(&s, at(21, 0), &cfg);
        assert_eq!(r.baseline, Some(135.0));
        let after = r.after.unwrap();
        // 21:00..03:00 covers 21:30, 23:00, 02:00
        assert_eq!(after.count, 3);
        assert_eq!(r.drop, Some(70.0));
        assert!(r.delayed_hypo_risk);
    }

    #[test]
    fn alcohol_without_data() {
        let cfg = AnalysisConfig::default();
        let r = alcohol_response(&ReadingSeries::empty(), at(21, 0), &cfg);
        assert_eq!(r.baseline, None);
        assert_eq!(r.after, None);
        assert_eq!(r.drop, None);
        assert!(!r.delayed_hypo_risk);
    }

    #[test]
    fn rapid_drop_band() {
        let s = every_5_min(at(22, 0), &[200.0, 160.0, 150.0, 60.0, 25.0]);
        let drops = rapid_drops(&s);
        assert_eq!(drops.len(), 2);
        assert_eq!((drops[0].at, drops[0].delta), (at(22, 5), -40.0));
        // -90 is outside the band
        assert_eq!(drops[1].at, at(22, 20));
    }

    #[test]
    fn stress_needs_consecutive_hours() {
        let cfg = AnalysisConfig::default();
        // hourly means: 08 -> 150, 09 -> 170, 10 -> 180, 11 -> 120, 12 -> 190, 14 -> 200, 15 -> 170
        let s = series(&[
            (at(8, 0), 150.0),
            (at(9, 0), 160.0),
            (at(9, 30), 180.0),
            (at(10, 15), 180.0),
            (at(11, 0), 120.0),
            (at(12, 0), 190.0),
            (at(14, 0), 200.0),
            (at(15, 0), 170.0),
        ]);
        let periods = stress_periods(&s, &cfg);
        assert_eq!(periods.len(), 2);
        assert_eq!((periods[0].start, periods[0].end), (at(9, 0), at(11, 0)));
        assert_eq!(periods[0].hours, 2);
        assert_eq!(periods[0].mean_glucose, 175.0);
        // 12:00 stands alone; 14:00-16:00 qualifies
        assert_eq!((periods[1].start, periods[1].hours), (at(14, 0), 2));

        let strict = AnalysisConfig {
            stress_min_hours: i64::MAX,
            ..AnalysisConfig::default()
        };
        assert!(stress_periods(&s, &strict).is_empty());
    }

    #[test]
    fn volatile_hours() {
        let cfg = AnalysisConfig::default();
        let s = series(&[
            (at(10, 0), 100.0),
            (at(10, 20), 180.0),
            (at(10, 40), 110.0),
            (at(11, 0), 120.0),
            (at(11, 30), 125.0),
        ]);
        let v = illness_volatility(&s, &cfg);
        assert!(v.unusual_volatility);
        assert_eq!(v.volatile_hours.len(), 1);
        assert_eq!(v.volatile_hours[0].start, at(10, 0));
    }

    #[test]
    fn recent_versus_previous_days() {
        let pts: Vec<_> = (10..=23)
            .map(|d| (on_day(d, 12, 0), if d > 16 { 160.0 } else { 130.0 }))
            .collect();
        let s = series(&pts);
        let c = recent_change(&s, 7).unwrap();
        assert_eq!((c.recent_mean, c.previous_mean, c.change), (160.0, 130.0, 30.0));
        assert_eq!(recent_change(&s, 30), None);
        // absurd spans clamp instead of overflowing
        assert_eq!(recent_change(&s, i64::MAX), None);
        assert_eq!(recent_change(&s, -1), None);
    }
}
