use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::PhaseStats,
    config::AnalysisConfig,
    detectors::{
        episodes::{hypoglycemia_episodes, Episode},
        patterns::{dawn_phenomenon_with_tiers, somogyi_with_limits, DawnPhenomenon, SomogyiRebound},
    },
    metrics::{
        stats::{self, mean, sample_std},
        variability::{consecutive_change, time_in_range},
    },
    series::{shift, slice, slice_open_end, slice_open_start, ReadingSeries},
};

const EXERCISE_BEFORE_MIN: i64 = 30;
const EXERCISE_AFTER_MIN: i64 = 60;

/// Hypoglycemia risk graded from the lowest reading during exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypoRisk {
    Low,
    Moderate,
    Elevated,
    VeryHigh,
}

impl HypoRisk {
    pub fn from_min_glucose(min: f64) -> Self {
        if min < 70.0 {
            HypoRisk::VeryHigh
        } else if min < 80.0 {
            HypoRisk::Elevated
        } else if min < 100.0 {
            HypoRisk::Moderate
        } else {
            HypoRisk::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseResponse {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Mean over the 30 minutes before the start.
    pub baseline: Option<f64>,
    pub before: Option<PhaseStats>,
    pub during: Option<PhaseStats>,
    /// Up to 60 minutes after the end.
    pub after: Option<PhaseStats>,
    /// Mean after minus baseline.
    pub change_from_baseline: Option<f64>,
    pub hypo_risk: Option<HypoRisk>,
}

pub fn exercise_response(
    series: &ReadingSeries,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> ExerciseResponse {
    let before = PhaseStats::of(&slice_open_end(
        series,
        shift(start, -Duration::minutes(EXERCISE_BEFORE_MIN)),
        start,
    ));
    let during = PhaseStats::of(&slice(series, start, end));
    let after = PhaseStats::of(&slice_open_start(
        series,
        end,
        shift(end, Duration::minutes(EXERCISE_AFTER_MIN)),
    ));
    let baseline = before.map(|p| p.mean);
    ExerciseResponse {
        start,
        end,
        baseline,
        before,
        during,
        after,
        change_from_baseline: baseline.zip(after).map(|(b, a)| a.mean - b),
        hypo_risk: during.map(|d| HypoRisk::from_min_glucose(d.min)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepIssue {
    LowTimeInRange,
    NocturnalHypoglycemia,
    ProlongedHyperglycemia,
    HighFluctuation,
    DawnPhenomenon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepAnalysis {
    pub sleep: NaiveDateTime,
    pub wake: NaiveDateTime,
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub tir: f64,
    pub low_count: usize,
    pub high_count: usize,
    pub mean_fluctuation: Option<f64>,
    pub max_fluctuation: Option<f64>,
    pub hypo_episodes: Vec<Episode>,
    pub dawn: Option<DawnPhenomenon>,
    pub somogyi: Option<SomogyiRebound>,
    pub quality_score: f64,
    pub quality: SleepQuality,
    pub issues: Vec<SleepIssue>,
}

/// Overnight profile over `[sleep, wake]`; `None` when the window is empty.
pub fn sleep_analysis(
    series: &ReadingSeries,
    sleep: NaiveDateTime,
    wake: NaiveDateTime,
    cfg: &AnalysisConfig,
) -> Option<SleepAnalysis> {
    let window = slice(series, sleep, wake);
    let values = window.values();
    let mean_g = mean(&values)?;
    let low_count = values.iter().filter(|&&g| g < cfg.target_low).count();
    let high_count = values.iter().filter(|&&g| g > cfg.target_high).count();
    let tir = time_in_range(&window, cfg.target_low, cfg.target_high);
    let change = consecutive_change(&window);
    let dawn = dawn_phenomenon_with_tiers(&window, cfg.dawn_mild_rise, cfg.dawn_marked_rise);
    log::debug!("sleep {sleep} -> {wake}: {} readings", window.len());

    let mut score = 100.0;
    let mut issues = Vec::new();
    if tir < 60.0 {
        score -= 25.0;
        issues.push(SleepIssue::LowTimeInRange);
    } else if tir < 80.0 {
        score -= 10.0;
        issues.push(SleepIssue::LowTimeInRange);
    }
    if low_count > 0 {
        score -= 30.0;
        issues.push(SleepIssue::NocturnalHypoglycemia);
    }
    if high_count as f64 > values.len() as f64 * 0.3 {
        score -= 15.0;
        issues.push(SleepIssue::ProlongedHyperglycemia);
    }
    if change.is_some_and(|(avg, _)| avg > 20.0) {
        score -= 15.0;
        issues.push(SleepIssue::HighFluctuation);
    }
    if dawn.is_some_and(|d| d.rise > 20.0) {
        score -= 10.0;
        issues.push(SleepIssue::DawnPhenomenon);
    }
    let score = f64::max(score, 0.0);
    let quality = if score >= 85.0 {
        SleepQuality::Excellent
    } else if score >= 70.0 {
        SleepQuality::Good
    } else if score >= 50.0 {
        SleepQuality::Fair
    } else {
        SleepQuality::Poor
    };

    Some(SleepAnalysis {
        sleep,
        wake,
        count: values.len(),
        mean: mean_g,
        std: sample_std(&values),
        min: stats::min(&values)?,
        max: stats::max(&values)?,
        tir,
        low_count,
        high_count,
        mean_fluctuation: change.map(|c| c.0),
        max_fluctuation: change.map(|c| c.1),
        hypo_episodes: hypoglycemia_episodes(&window, cfg),
        dawn,
        somogyi: somogyi_with_limits(
            &window,
            cfg.somogyi_horizon(),
            cfg.target_low,
            cfg.target_high,
        ),
        quality_score: score,
        quality,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::*;

    #[test]
    fn exercise_phases() {
        let s = series(&[
            (at(16, 35), 140.0),
            (at(16, 50), 150.0),
            (at(17, 0), 145.0),
            (at(17, 20), 110.0),
            (at(17, 45), 78.0),
            (at(18, 0), 85.0),
            (at(18, 30), 95.0),
            (at(19, 5), 200.0),
        ]);
        let r = exercise_response(&s, at(17, 0), at(18, 0));
        assert_eq!(r.baseline, Some(145.0));
        let during = r.during.unwrap();
        assert_eq!((during.count, during.min, during.max), (4, 78.0, 145.0));
        // after is (18:00, 19:00], so only 18:30
        assert_eq!(r.after.unwrap().count, 1);
        assert_eq!(r.change_from_baseline, Some(95.0 - 145.0));
        assert_eq!(r.hypo_risk, Some(HypoRisk::Elevated));
    }

    #[test]
    fn exercise_without_data_before() {
        let s = every_5_min(at(17, 0), &[120.0, 110.0, 95.0]);
        let r = exercise_response(&s, at(17, 0), at(17, 10));
        assert_eq!(r.baseline, None);
        assert_eq!(r.change_from_baseline, None);
        assert_eq!(r.hypo_risk, Some(HypoRisk::Moderate));
    }

    #[test]
    fn risk_tiers() {
        assert_eq!(HypoRisk::from_min_glucose(65.0), HypoRisk::VeryHigh);
        assert_eq!(HypoRisk::from_min_glucose(70.0), HypoRisk::Elevated);
        assert_eq!(HypoRisk::from_min_glucose(99.9), HypoRisk::Moderate);
        assert_eq!(HypoRisk::from_min_glucose(100.0), HypoRisk::Low);
    }

    #[test]
    fn quiet_night_scores_full_marks() {
        let cfg = AnalysisConfig::default();
        let s = every_5_min(at(0, 0), &[110.0; 96]);
        let r = sleep_analysis(&s, at(0, 0), at(7, 0), &cfg).unwrap();
        assert_eq!(r.count, 85);
        assert_eq!(r.quality_score, 100.0);
        assert_eq!(r.quality, SleepQuality::Excellent);
        assert!(r.issues.is_empty());
        assert!(r.hypo_episodes.is_empty());
        assert_eq!(r.dawn.unwrap().rise, 0.0);
    }

    #[test]
    fn low_then_rebound_night() {
        let cfg = AnalysisConfig::default();
        // 00:00-02:00 at 100, 02:00-03:00 at 60, then 200 until 07:00
        let values: Vec<f64> = (0..84)
            .map(|i| match i {
                0..=23 => 100.0,
                24..=35 => 60.0,
                _ => 200.0,
            })
            .collect();
        let s = every_5_min(at(0, 0), &values);
        let r = sleep_analysis(&s, at(0, 0), at(7, 0), &cfg).unwrap();
        assert_eq!(r.low_count, 12);
        assert_eq!(r.hypo_episodes.len(), 1);
        let rebound = r.somogyi.unwrap();
        assert_eq!(rebound.low_at, at(2, 0));
        assert_eq!(rebound.rebound_peak, 200.0);
        assert!(r.issues.contains(&SleepIssue::NocturnalHypoglycemia));
        assert!(r.issues.contains(&SleepIssue::ProlongedHyperglycemia));
        assert!(r.issues.contains(&SleepIssue::DawnPhenomenon));
        assert!(r.issues.contains(&SleepIssue::LowTimeInRange));
        // 100 - 25 - 30 - 15 - 10
        assert_eq!(r.quality_score, 20.0);
        assert_eq!(r.quality, SleepQuality::Poor);
    }

    #[test]
    fn empty_night_is_absent() {
        let cfg = AnalysisConfig::default();
        let s = every_5_min(at(12, 0), &[110.0, 120.0]);
        assert_eq!(sleep_analysis(&s, at(0, 0), at(7, 0), &cfg), None);
    }
}
