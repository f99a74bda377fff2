//! Gap-tolerant run-length grouping of threshold-crossing readings.
//!
//! One segmenter serves every episode flavour: hyperglycemia, hypoglycemia
//! and stress periods differ only in their predicate and [`EpisodeRule`].

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    metrics::kinetics::minutes_between,
    series::{clamped_minutes, Reading, ReadingSeries},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    Hyperglycemia,
    Hypoglycemia,
    Stress,
    Custom,
}

/// Which extreme of an episode is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    Max,
    Min,
}

/// Maximal run of predicate-true readings with no gap wider than the rule allows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub kind: EpisodeKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub extremum: f64,
    pub extremum_at: NaiveDateTime,
    pub duration_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeRule {
    pub kind: EpisodeKind,
    pub extremum: ExtremumKind,
    /// A longer pause between two predicate-true readings closes the episode.
    pub max_gap: Duration,
    /// Episodes spanning less than this are discarded.
    pub min_duration: Duration,
}

impl EpisodeRule {
    pub fn new(kind: EpisodeKind, extremum: ExtremumKind, max_gap: Duration) -> Self {
        Self {
            kind,
            extremum,
            max_gap,
            min_duration: Duration::zero(),
        }
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    /// Sustained hyperglycemia above `target_high`.
    pub fn hyper(cfg: &AnalysisConfig) -> Self {
        Self::new(
            EpisodeKind::Hyperglycemia,
            ExtremumKind::Max,
            clamped_minutes(cfg.hyper_max_gap_min),
        )
        .with_min_duration(clamped_minutes(cfg.hyper_min_duration_min))
    }

    /// Hypoglycemia below `target_low`.
    pub fn hypo(cfg: &AnalysisConfig) -> Self {
        Self::new(
            EpisodeKind::Hypoglycemia,
            ExtremumKind::Min,
            clamped_minutes(cfg.hypo_max_gap_min),
        )
        .with_min_duration(clamped_minutes(cfg.hypo_min_duration_min))
    }

    fn more_extreme(&self, candidate: f64, current: f64) -> bool {
        match self.extremum {
            ExtremumKind::Max => candidate > current,
            ExtremumKind::Min => candidate < current,
        }
    }
}

struct OpenRun {
    start: NaiveDateTime,
    last: NaiveDateTime,
    extremum: f64,
    extremum_at: NaiveDateTime,
}

impl OpenRun {
    fn begin(r: &Reading) -> Self {
        Self {
            start: r.timestamp,
            last: r.timestamp,
            extremum: r.glucose,
            extremum_at: r.timestamp,
        }
    }

    fn close(self, rule: &EpisodeRule) -> Option<Episode> {
        if self.last - self.start < rule.min_duration {
            return None;
        }
        Some(Episode {
            kind: rule.kind,
            start: self.start,
            end: self.last,
            extremum: self.extremum,
            extremum_at: self.extremum_at,
            duration_min: minutes_between(self.start, self.last),
        })
    }
}

/// Group predicate-true readings into episodes.
pub fn segment_episodes<P>(series: &ReadingSeries, predicate: P, rule: &EpisodeRule) -> Vec<Episode>
where
    P: Fn(&Reading) -> bool,
{
    let mut episodes = Vec::new();
    let mut open: Option<OpenRun> = None;
    for r in series.iter().filter(|r| predicate(r)) {
        match open.as_mut() {
            Some(run) if r.timestamp - run.last <= rule.max_gap => {
                run.last = r.timestamp;
                if rule.more_extreme(r.glucose, run.extremum) {
                    run.extremum = r.glucose;
                    run.extremum_at = r.timestamp;
                }
            }
            _ => {
                if let Some(run) = open.replace(OpenRun::begin(r)) {
                    episodes.extend(run.close(rule));
                }
            }
        }
    }
    if let Some(run) = open {
        episodes.extend(run.close(rule));
    }
    log::debug!(
        "segmented {} {:?} episode(s) from {} readings",
        episodes.len(),
        rule.kind,
        series.len()
    );
    episodes
}

/// Readings above `cfg.target_high`, grouped by [`EpisodeRule::hyper`].
pub fn hyperglycemia_episodes(series: &ReadingSeries, cfg: &AnalysisConfig) -> Vec<Episode> {
    segment_episodes(series, |r| r.glucose > cfg.target_high, &EpisodeRule::hyper(cfg))
}

/// Readings below `cfg.target_low`, grouped by [`EpisodeRule::hypo`].
pub fn hypoglycemia_episodes(series: &ReadingSeries, cfg: &AnalysisConfig) -> Vec<Episode> {
    segment_episodes(series, |r| r.glucose < cfg.target_low, &EpisodeRule::hypo(cfg))
}

/// Merge two episode lists produced from overlapping parts of one series.
///
/// Episodes closer than `rule.max_gap` (or overlapping) are joined, so the
/// result matches segmenting the combined series in one pass.
pub fn merge_episodes(first: &[Episode], second: &[Episode], rule: &EpisodeRule) -> Vec<Episode> {
    let mut all: Vec<Episode> = first.iter().chain(second).copied().collect();
    all.sort_by_key(|e| e.start);

    let mut merged: Vec<Episode> = Vec::with_capacity(all.len());
    for next in all {
        match merged.last_mut() {
            Some(cur) if next.start - cur.end <= rule.max_gap => {
                cur.end = cur.end.max(next.end);
                let replace = rule.more_extreme(next.extremum, cur.extremum)
                    || (next.extremum == cur.extremum && next.extremum_at < cur.extremum_at);
                if replace {
                    cur.extremum = next.extremum;
                    cur.extremum_at = next.extremum_at;
                }
                cur.duration_min = minutes_between(cur.start, cur.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}
