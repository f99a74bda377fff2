use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::PhaseStats,
    config::AnalysisConfig,
    metrics::kinetics::{baseline, trough, Extremum},
    series::{
        clamped_minutes, slice_open_end, slice_window, ReadingSeries, SeriesError, Window,
    },
};

/// Onset, peak and total duration of a glucose-lowering drug, in minutes after the dose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionProfile {
    pub onset_min: i64,
    pub peak_min: i64,
    pub duration_min: i64,
}

impl ActionProfile {
    /// Generic 1h / 2h / 6h placeholder used when the caller has no profile.
    pub const PLACEHOLDER: ActionProfile = ActionProfile {
        onset_min: 60,
        peak_min: 120,
        duration_min: 360,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Efficacy {
    Marked,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationResponse {
    pub dose_at: NaiveDateTime,
    pub profile: ActionProfile,
    /// Set when [`ActionProfile::PLACEHOLDER`] stood in for a caller profile.
    pub profile_defaulted: bool,
    pub baseline: Option<f64>,
    pub onset: Option<PhaseStats>,
    pub peak: Option<PhaseStats>,
    pub duration: Option<PhaseStats>,
    pub overall: Option<PhaseStats>,
    /// Overall mean minus baseline.
    pub change_from_baseline: Option<f64>,
    /// Baseline minus the lowest reading.
    pub max_drop: Option<f64>,
    pub lowest: Option<Extremum>,
    /// Max drop divided by the dose, when units were given.
    pub drop_per_unit: Option<f64>,
    pub efficacy_score: Option<f64>,
    pub efficacy: Option<Efficacy>,
}

/// 50 base; rewards a falling mean and a deep drop, penalises a rising mean.
pub fn efficacy_score(change: f64, max_drop: f64) -> f64 {
    let mut score: f64 = 50.0;
    if change < -30.0 {
        score += 30.0;
    } else if change < -15.0 {
        score += 20.0;
    } else if change < 0.0 {
        score += 10.0;
    } else if change > 20.0 {
        score -= 20.0;
    }
    if max_drop > 50.0 {
        score += 20.0;
    } else if max_drop > 30.0 {
        score += 10.0;
    }
    score.clamp(0.0, 100.0)
}

fn efficacy_level(score: f64) -> Efficacy {
    if score >= 80.0 {
        Efficacy::Marked
    } else if score >= 60.0 {
        Efficacy::Good
    } else if score >= 40.0 {
        Efficacy::Fair
    } else {
        Efficacy::Poor
    }
}

/// Response to a dose over `[dose_at, dose_at + duration]`, split into onset,
/// peak and duration phases.
///
/// Fails only for a profile with negative offsets.
pub fn medication_response(
    series: &ReadingSeries,
    dose_at: NaiveDateTime,
    profile: Option<ActionProfile>,
    units: Option<f64>,
    cfg: &AnalysisConfig,
) -> Result<MedicationResponse, SeriesError> {
    let profile_defaulted = profile.is_none();
    let profile = profile.unwrap_or_else(|| {
        log::warn!("no action profile supplied for dose at {dose_at}, using the 1h/2h/6h placeholder");
        ActionProfile::PLACEHOLDER
    });
    let after_dose =
        |minutes: i64| Window::around(dose_at, Duration::zero(), clamped_minutes(minutes));
    let onset_at = after_dose(profile.onset_min)?.end;
    let peak_at = after_dose(profile.peak_min)?.end;
    let full = after_dose(profile.duration_min)?;

    let window = slice_window(series, &full);
    let base = baseline(series, dose_at, cfg.baseline_lookback());
    let overall = PhaseStats::of(&window);
    let lowest = trough(&window);
    let max_drop = base.zip(lowest).map(|(b, low)| b - low.value);
    let change = base.zip(overall).map(|(b, o)| o.mean - b);
    let score = change.zip(max_drop).map(|(c, d)| efficacy_score(c, d));
    log::debug!(
        "dose at {dose_at}: {} readings over {} min",
        window.len(),
        profile.duration_min
    );

    Ok(MedicationResponse {
        dose_at,
        profile,
        profile_defaulted,
        baseline: base,
        onset: PhaseStats::of(&slice_open_end(series, dose_at, onset_at)),
        peak: PhaseStats::of(&slice_open_end(series, onset_at, peak_at)),
        duration: PhaseStats::of(&slice_window(series, &Window::new(peak_at, full.end))),
        overall,
        change_from_baseline: change,
        max_drop,
        lowest,
        drop_per_unit: max_drop
            .zip(units.filter(|u| *u > 0.0))
            .map(|(d, u)| d / u),
        efficacy_score: score,
        efficacy: score.map(efficacy_level),
    })
}
