use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    detectors::patterns::daily_summaries,
    metrics::stats::{mean, population_std},
    series::ReadingSeries,
};

/// Mean difference beyond which the menstrual phase counts as shifted.
const PHASE_SHIFT_MG_DL: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Cycle days 1-5.
    Menstrual,
    /// Cycle days 6-14.
    Follicular,
    /// Cycle days 15-28.
    Luteal,
}

impl CyclePhase {
    pub const ALL: [CyclePhase; 3] = [
        CyclePhase::Menstrual,
        CyclePhase::Follicular,
        CyclePhase::Luteal,
    ];

    /// Inclusive day offsets from the cycle start. Neighbouring phases share
    /// their boundary day.
    pub fn day_offsets(self) -> (u64, u64) {
        match self {
            CyclePhase::Menstrual => (0, 5),
            CyclePhase::Follicular => (5, 14),
            CyclePhase::Luteal => (14, 28),
        }
    }
}

/// Spread of daily means falling in one phase, pooled over every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseGlucose {
    pub phase: CyclePhase,
    pub mean: f64,
    /// Population standard deviation of the daily means.
    pub std: f64,
    /// Days with at least one reading.
    pub days: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseShift {
    Elevated,
    Lowered,
    NoClearDifference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleImpact {
    /// Only phases with data, in cycle order.
    pub phases: Vec<PhaseGlucose>,
    /// Menstrual mean minus follicular mean.
    pub menstrual_vs_follicular: Option<f64>,
    pub shift: Option<PhaseShift>,
}

impl CycleImpact {
    pub fn phase(&self, phase: CyclePhase) -> Option<&PhaseGlucose> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Glucose by menstrual-cycle phase given the first day of each logged cycle.
///
/// Returns `None` without any cycle starts.
pub fn cycle_phase_impact(
    series: &ReadingSeries,
    cycle_starts: &[NaiveDate],
    cfg: &AnalysisConfig,
) -> Option<CycleImpact> {
    if cycle_starts.is_empty() {
        return None;
    }
    let daily: BTreeMap<NaiveDate, f64> = daily_summaries(series, cfg)
        .into_iter()
        .map(|d| (d.date, d.stats.mean))
        .collect();

    let phases: Vec<PhaseGlucose> = CyclePhase::ALL
        .into_iter()
        .filter_map(|phase| {
            let (first, last) = phase.day_offsets();
            let means: Vec<f64> = cycle_starts
                .iter()
                .flat_map(|&start| {
                    (first..=last)
                        .filter_map(move |offset| start.checked_add_days(Days::new(offset)))
                })
                .filter_map(|day| daily.get(&day).copied())
                .collect();
            Some(PhaseGlucose {
                phase,
                mean: mean(&means)?,
                std: population_std(&means)?,
                days: means.len(),
            })
        })
        .collect();

    let mean_of = |phase: CyclePhase| phases.iter().find(|p| p.phase == phase).map(|p| p.mean);
    let diff = mean_of(CyclePhase::Menstrual)
        .zip(mean_of(CyclePhase::Follicular))
        .map(|(menstrual, follicular)| menstrual - follicular);
    log::debug!(
        "{} cycle starts, {} phases with data",
        cycle_starts.len(),
        phases.len()
    );

    Some(CycleImpact {
        menstrual_vs_follicular: diff,
        shift: diff.map(|d| {
            if d > PHASE_SHIFT_MG_DL {
                PhaseShift::Elevated
            } else if d < -PHASE_SHIFT_MG_DL {
                PhaseShift::Lowered
            } else {
                PhaseShift::NoClearDifference
            }
        }),
        phases,
    })
}
