use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    detectors::{
        episodes::{hyperglycemia_episodes, hypoglycemia_episodes, Episode},
        patterns::{
            daily_summaries, dawn_phenomenon_with_tiers, hourly_pattern, is_weekend, DaySummary,
            GroupStats, HourOfDay, NOCTURNAL_END_HOUR,
        },
    },
    metrics::variability::{glycemic_summary, GlycemicSummary},
    series::{Reading, ReadingSeries},
};

const HIGH_VARIABILITY_DAY_STD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Night,
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
    ];

    /// `[start, end)` hours of the block.
    pub fn hours(self) -> (u32, u32) {
        match self {
            TimeOfDay::Night => (0, 6),
            TimeOfDay::Morning => (6, 12),
            TimeOfDay::Afternoon => (12, 18),
            TimeOfDay::Evening => (18, 24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockStats {
    pub block: TimeOfDay,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeekdayStats {
    pub weekday: Weekday,
    #[serde(flatten)]
    pub stats: GroupStats,
}

/// ISO week (`2026-W07`) or calendar month (`2026-02`) roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: String,
    pub days: usize,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub days: Vec<DaySummary>,
    pub weeks: Vec<PeriodSummary>,
    pub months: Vec<PeriodSummary>,
    pub hourly: Vec<HourOfDay>,
    pub time_of_day: Vec<BlockStats>,
    pub by_weekday: Vec<WeekdayStats>,
    pub weekday: Option<GroupStats>,
    pub weekend: Option<GroupStats>,
    /// Weekday mean minus weekend mean.
    pub weekday_effect: Option<f64>,
    pub high_variability_days: usize,
    pub hyper_episodes: Vec<Episode>,
    pub hypo_episodes: Vec<Episode>,
}

fn stats_where<F>(series: &ReadingSeries, cfg: &AnalysisConfig, keep: F) -> Option<GroupStats>
where
    F: Fn(&Reading) -> bool,
{
    GroupStats::of_series(&series.filter(keep), cfg)
}

fn period_summaries<K, F>(series: &ReadingSeries, cfg: &AnalysisConfig, key: F) -> Vec<PeriodSummary>
where
    K: Ord,
    F: Fn(NaiveDate) -> (K, String),
{
    let mut groups: BTreeMap<K, (String, Vec<f64>, Vec<NaiveDate>)> = BTreeMap::new();
    for r in series {
        let date = r.timestamp.date();
        let (k, label) = key(date);
        let entry = groups.entry(k).or_insert_with(|| (label, Vec::new(), Vec::new()));
        entry.1.push(r.glucose);
        if entry.2.last() != Some(&date) {
            entry.2.push(date);
        }
    }
    groups
        .into_values()
        .filter_map(|(period, values, dates)| {
            Some(PeriodSummary {
                period,
                days: dates.len(),
                stats: GroupStats::from_values(&values, cfg.target_low, cfg.target_high)?,
            })
        })
        .collect()
}

/// Day, week, month, hour-of-day and weekday roll-ups plus sustained episodes.
pub fn trend_report(series: &ReadingSeries, cfg: &AnalysisConfig) -> TrendReport {
    let days = daily_summaries(series, cfg);
    let high_variability_days = days
        .iter()
        .filter(|d| d.stats.std.is_some_and(|sd| sd > HIGH_VARIABILITY_DAY_STD))
        .count();
    let weeks = period_summaries(series, cfg, |d| {
        let w = d.iso_week();
        ((w.year(), w.week()), format!("{}-W{:02}", w.year(), w.week()))
    });
    let months = period_summaries(series, cfg, |d| {
        ((d.year(), d.month()), format!("{}-{:02}", d.year(), d.month()))
    });
    let time_of_day = TimeOfDay::ALL
        .iter()
        .filter_map(|&block| {
            let (from, to) = block.hours();
            let stats = stats_where(series, cfg, |r| (from..to).contains(&r.timestamp.hour()))?;
            Some(BlockStats { block, stats })
        })
        .collect();
    let by_weekday = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .filter_map(|weekday| {
        let stats = stats_where(series, cfg, |r| r.timestamp.weekday() == weekday)?;
        Some(WeekdayStats { weekday, stats })
    })
    .collect();
    let weekday = stats_where(series, cfg, |r| !is_weekend(r.timestamp));
    let weekend = stats_where(series, cfg, |r| is_weekend(r.timestamp));
    log::debug!("trend over {} day(s), {} week(s)", days.len(), weeks.len());

    TrendReport {
        weeks,
        months,
        hourly: hourly_pattern(series, cfg),
        time_of_day,
        by_weekday,
        weekday_effect: weekday.zip(weekend).map(|(a, b)| a.mean - b.mean),
        weekday,
        weekend,
        high_variability_days,
        hyper_episodes: hyperglycemia_episodes(series, cfg),
        hypo_episodes: hypoglycemia_episodes(series, cfg),
        days,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    LowTimeInRange,
    HypoglycemiaExposure,
    HyperglycemiaExposure,
    HighVariability,
    HighMage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phenotype {
    GoodControl,
    ModerateControl,
    PoorControl,
    Stable,
    Variable,
    HighlyVariable,
    DawnPhenomenon,
    NocturnalHypoglycemia,
}

/// Consensus targets: TIR at least 70 %, TBR under 4 %, TAR under 25 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalCheck {
    pub tir_met: bool,
    pub tbr_met: bool,
    pub tar_met: bool,
}

impl GoalCheck {
    pub fn of(summary: &GlycemicSummary) -> Self {
        Self {
            tir_met: summary.tir >= 70.0,
            tbr_met: summary.tbr < 4.0,
            tar_met: summary.tar < 25.0,
        }
    }

    pub fn all_met(&self) -> bool {
        self.tir_met && self.tbr_met && self.tar_met
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerProfile {
    pub summary: GlycemicSummary,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub goals: GoalCheck,
    pub phenotypes: Vec<Phenotype>,
}

/// Additive 0-100 risk from time in ranges and variability.
pub fn risk_score(summary: &GlycemicSummary) -> f64 {
    let mut score: f64 = 0.0;
    if summary.tir < 50.0 {
        score += 30.0;
    } else if summary.tir < 70.0 {
        score += 15.0;
    }
    if summary.tbr > 5.0 {
        score += 20.0;
    } else if summary.tbr > 1.0 {
        score += 10.0;
    }
    if summary.tar > 50.0 {
        score += 20.0;
    } else if summary.tar > 25.0 {
        score += 10.0;
    }
    match summary.cv {
        Some(cv) if cv > 40.0 => score += 20.0,
        Some(cv) if cv > 25.0 => score += 10.0,
        _ => {}
    }
    score.min(100.0)
}

fn risk_factors(summary: &GlycemicSummary) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    if summary.tir < 70.0 {
        factors.push(RiskFactor::LowTimeInRange);
    }
    if summary.tbr > 1.0 {
        factors.push(RiskFactor::HypoglycemiaExposure);
    }
    if summary.tar > 25.0 {
        factors.push(RiskFactor::HyperglycemiaExposure);
    }
    if summary.cv.is_some_and(|cv| cv > 25.0) {
        factors.push(RiskFactor::HighVariability);
    }
    if summary.mage.is_some_and(|m| m > 40.0) {
        factors.push(RiskFactor::HighMage);
    }
    factors
}

fn phenotypes(
    series: &ReadingSeries,
    summary: &GlycemicSummary,
    cfg: &AnalysisConfig,
) -> Vec<Phenotype> {
    let mut out = vec![if summary.tir >= 70.0 {
        Phenotype::GoodControl
    } else if summary.tir >= 50.0 {
        Phenotype::ModerateControl
    } else {
        Phenotype::PoorControl
    }];
    match summary.cv {
        Some(cv) if cv < 20.0 => out.push(Phenotype::Stable),
        Some(cv) if cv < 35.0 => out.push(Phenotype::Variable),
        Some(_) => out.push(Phenotype::HighlyVariable),
        None => {}
    }
    if dawn_phenomenon_with_tiers(series, cfg.dawn_mild_rise, cfg.dawn_marked_rise)
        .is_some_and(|d| d.rise > 15.0)
    {
        out.push(Phenotype::DawnPhenomenon);
    }
    if series
        .iter()
        .any(|r| r.timestamp.hour() < NOCTURNAL_END_HOUR && r.glucose < cfg.target_low)
    {
        out.push(Phenotype::NocturnalHypoglycemia);
    }
    out
}

/// Summary metrics with a risk grading; `None` for an empty series.
pub fn biomarker_profile(series: &ReadingSeries, cfg: &AnalysisConfig) -> Option<BiomarkerProfile> {
    let summary = glycemic_summary(series, cfg)?;
    let risk_score = risk_score(&summary);
    let risk_level = if risk_score > 60.0 {
        RiskLevel::High
    } else if risk_score > 30.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };
    Some(BiomarkerProfile {
        risk_factors: risk_factors(&summary),
        goals: GoalCheck::of(&summary),
        phenotypes: phenotypes(series, &summary, cfg),
        risk_score,
        risk_level,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::*;

    fn two_days() -> ReadingSeries {
        // Sunday the 15th steady at 120, Monday the 16th swinging 80 <-> 200 hourly
        let mut pts: Vec<_> = (0..24).map(|h| (on_day(15, h, 0), 120.0)).collect();
        pts.extend((0..24).map(|h| (on_day(16, h, 0), if h % 2 == 0 { 80.0 } else { 200.0 })));
        series(&pts)
    }

    #[test]
    fn trend_rollups() {
        let cfg = AnalysisConfig::default();
        let t = trend_report(&two_days(), &cfg);
        assert_eq!(t.days.len(), 2);
        assert_eq!(t.high_variability_days, 1);
        // the 15th is the last day of ISO week 7, the 16th opens week 8
        let labels: Vec<_> = t.weeks.iter().map(|w| w.period.as_str()).collect();
        assert_eq!(labels, vec!["2026-W07", "2026-W08"]);
        assert_eq!(t.months.len(), 1);
        assert_eq!(t.months[0].days, 2);
        assert_eq!(t.hourly.len(), 24);
        assert_eq!(t.time_of_day.len(), 4);
        assert_eq!(t.time_of_day[0].stats.count, 12);
        assert_eq!(t.by_weekday.len(), 2);
        assert_eq!(t.weekend.unwrap().mean, 120.0);
        assert_eq!(t.weekday.unwrap().mean, 140.0);
        assert_eq!(t.weekday_effect, Some(20.0));
        // highs recur every 2h, wider than the 1h gap allowance
        assert!(t.hyper_episodes.is_empty());
        assert!(t.hypo_episodes.is_empty());
    }

    #[test]
    fn empty_trend_has_no_rollups() {
        let t = trend_report(&ReadingSeries::empty(), &AnalysisConfig::default());
        assert!(t.days.is_empty());
        assert_eq!(t.weekday_effect, None);
    }

    #[test]
    fn biomarker_risk_grading() {
        let cfg = AnalysisConfig::default();
        let b = biomarker_profile(&two_days(), &cfg).unwrap();
        // 36 of 48 in range, nothing below 70, 12 above 180
        assert_close(b.summary.tir, 75.0, 1e-9);
        assert_close(b.summary.tar, 25.0, 1e-9);
        assert!(b.summary.cv.unwrap() > 25.0);
        assert_eq!(b.risk_score, 10.0);
        assert_eq!(b.risk_level, RiskLevel::Low);
        assert_eq!(
            b.risk_factors,
            vec![RiskFactor::HighVariability, RiskFactor::HighMage]
        );
        assert_eq!(b.phenotypes[0], Phenotype::GoodControl);
        // TAR of exactly 25 misses the under-25 goal
        assert_eq!(
            b.goals,
            GoalCheck {
                tir_met: true,
                tbr_met: true,
                tar_met: false
            }
        );
        assert!(!b.goals.all_met());
        assert!(biomarker_profile(&ReadingSeries::empty(), &cfg).is_none());
    }

    #[test]
    fn steady_day_meets_every_goal() {
        let cfg = AnalysisConfig::default();
        let s = every_5_min(at(8, 0), &[110.0, 120.0, 130.0, 125.0]);
        let b = biomarker_profile(&s, &cfg).unwrap();
        assert!(b.goals.all_met());
    }

    #[test]
    fn nocturnal_low_follows_the_configured_target() {
        let mut pts: Vec<_> = (0..24).map(|h| (at(h, 0), 120.0)).collect();
        pts[2].1 = 66.0;
        let s = series(&pts);

        let default = biomarker_profile(&s, &AnalysisConfig::default()).unwrap();
        assert!(default.phenotypes.contains(&Phenotype::NocturnalHypoglycemia));

        let tight = AnalysisConfig {
            target_low: 63.0,
            ..AnalysisConfig::default()
        };
        let b = biomarker_profile(&s, &tight).unwrap();
        assert!(!b.phenotypes.contains(&Phenotype::NocturnalHypoglycemia));

        let raised = AnalysisConfig {
            target_low: 125.0,
            target_high: 180.0,
            ..AnalysisConfig::default()
        };
        // 06:00 onwards is not nocturnal even when every reading sits below target
        let day_only = series(&(6..24).map(|h| (at(h, 0), 120.0)).collect::<Vec<_>>());
        let b = biomarker_profile(&day_only, &raised).unwrap();
        assert!(!b.phenotypes.contains(&Phenotype::NocturnalHypoglycemia));
    }

    #[test]
    fn dawn_phenotype_needs_a_rise_over_15() {
        let cfg = AnalysisConfig {
            dawn_mild_rise: 5.0,
            dawn_marked_rise: 8.0,
            ..AnalysisConfig::default()
        };
        // night 100, dawn 112: rise 12 is marked under these tiers but under 15
        let mut pts: Vec<_> = (0..4).map(|h| (at(h, 0), 100.0)).collect();
        pts.extend((4..8).map(|h| (at(h, 0), 112.0)));
        let b = biomarker_profile(&series(&pts), &cfg).unwrap();
        assert!(!b.phenotypes.contains(&Phenotype::DawnPhenomenon));

        let mut pts: Vec<_> = (0..4).map(|h| (at(h, 0), 100.0)).collect();
        pts.extend((4..8).map(|h| (at(h, 0), 120.0)));
        let b = biomarker_profile(&series(&pts), &cfg).unwrap();
        assert!(b.phenotypes.contains(&Phenotype::DawnPhenomenon));
    }

    #[test]
    fn risk_score_tiers() {
        let cfg = AnalysisConfig::default();
        let s = every_5_min(at(8, 0), &[50.0, 60.0, 250.0, 300.0, 65.0]);
        let summary = glycemic_summary(&s, &cfg).unwrap();
        // TIR 0, TBR 60, TAR 40, CV > 40
        assert_eq!(risk_score(&summary), 30.0 + 20.0 + 10.0 + 20.0);
    }
}
