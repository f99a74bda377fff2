use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    metrics::{
        auc::{early_phase_auc, incremental_auc, late_phase_auc},
        kinetics::{
            baseline, decline_rate, half_life, minutes_between, peak, rate_of_change,
        },
        stats::Aggregate,
    },
    series::{shift, slice, ReadingSeries},
};

/// Length of the post-meal observation window.
pub const MEAL_WINDOW_MIN: i64 = 120;

/// Caller-supplied description of the meal; both fields are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MealParams {
    pub carbs_g: Option<f64>,
    pub gi: Option<f64>,
}

impl MealParams {
    /// `gi * carbs / 100` when both are known.
    pub fn glycemic_load(&self) -> Option<f64> {
        Some(self.gi? * self.carbs_g? / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealResponse {
    pub meal_at: NaiveDateTime,
    pub baseline: Option<f64>,
    pub peak: Option<f64>,
    pub peak_at: Option<NaiveDateTime>,
    pub time_to_peak_min: Option<f64>,
    /// Peak minus baseline.
    pub response_magnitude: Option<f64>,
    /// Incremental AUC over the whole window (mg/dL·min).
    pub iauc: Option<f64>,
    pub early_iauc: Option<f64>,
    pub late_iauc: Option<f64>,
    pub rise_rate: Option<f64>,
    pub decline_rate: Option<f64>,
    pub half_life_min: Option<f64>,
    pub sample_count: usize,
    pub glycemic_load: Option<f64>,
}

/// Glucose response to a meal over `[meal_at, meal_at + 2h]`.
pub fn meal_response(
    series: &ReadingSeries,
    meal_at: NaiveDateTime,
    params: &MealParams,
    cfg: &AnalysisConfig,
) -> MealResponse {
    let window = slice(series, meal_at, shift(meal_at, Duration::minutes(MEAL_WINDOW_MIN)));
    let base = baseline(series, meal_at, cfg.baseline_lookback());
    let top = peak(&window);
    log::debug!(
        "meal at {meal_at}: {} readings in window, baseline {:?}",
        window.len(),
        base
    );
    if base.is_none() {
        log::warn!("meal at {meal_at}: no readings before the meal, baseline metrics skipped");
    }

    let peak_value = top.map(|p| p.value);
    let peak_at = top.map(|p| p.at);
    MealResponse {
        meal_at,
        baseline: base,
        peak: peak_value,
        peak_at,
        time_to_peak_min: peak_at.map(|t| minutes_between(meal_at, t)),
        response_magnitude: base.zip(peak_value).map(|(b, p)| p - b),
        iauc: base.and_then(|b| incremental_auc(&window, b)),
        early_iauc: base.and_then(|b| early_phase_auc(series, meal_at, b)),
        late_iauc: base.and_then(|b| late_phase_auc(series, meal_at, b)),
        rise_rate: base.and_then(|b| rate_of_change(&window, meal_at, b)),
        decline_rate: peak_at.and_then(|t| decline_rate(&window, t)),
        half_life_min: base
            .zip(top)
            .and_then(|(b, p)| half_life(&window, p.at, b, p.value))
            .map(|d| d.num_seconds() as f64 / 60.0),
        sample_count: window.len(),
        glycemic_load: params.glycemic_load(),
    }
}

/// The same meal eaten at several times, each response reduced to `{mean, std, values}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedMealResponse {
    pub meals: usize,
    pub baseline: Aggregate,
    pub peak: Aggregate,
    pub time_to_peak_min: Aggregate,
    pub response_magnitude: Aggregate,
    pub iauc: Aggregate,
    pub rise_rate: Aggregate,
    pub half_life_min: Aggregate,
    pub responses: Vec<MealResponse>,
}

pub fn repeated_meal_response(
    series: &ReadingSeries,
    meal_times: &[NaiveDateTime],
    params: &MealParams,
    cfg: &AnalysisConfig,
) -> RepeatedMealResponse {
    let responses: Vec<MealResponse> = meal_times
        .iter()
        .map(|&t| meal_response(series, t, params, cfg))
        .collect();
    let agg = |f: fn(&MealResponse) -> Option<f64>| Aggregate::from_options(responses.iter().map(f));
    RepeatedMealResponse {
        meals: responses.len(),
        baseline: agg(|r| r.baseline),
        peak: agg(|r| r.peak),
        time_to_peak_min: agg(|r| r.time_to_peak_min),
        response_magnitude: agg(|r| r.response_magnitude),
        iauc: agg(|r| r.iauc),
        rise_rate: agg(|r| r.rise_rate),
        half_life_min: agg(|r| r.half_life_min),
        responses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::*;

    // 06:30..07:00 flat at 100, then a 30-minute rise to 160 and a decline
    fn breakfast() -> ReadingSeries {
        every_5_min(
            at(6, 30),
            &[
                100.0, 100.0, 100.0, 100.0, 100.0, 100.0, // 06:30..06:55
                100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, // 07:00..07:30
                150.0, 140.0, 130.0, 120.0, 110.0, 100.0, // 07:35..08:00
                100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0,
                100.0, // 08:05..09:05
            ],
        )
    }

    #[test]
    fn single_meal_kinetics() {
        let cfg = AnalysisConfig::default();
        let params = MealParams {
            carbs_g: Some(50.0),
            gi: Some(70.0),
        };
        let r = meal_response(&breakfast(), at(7, 0), &params, &cfg);
        assert_eq!(r.baseline, Some(100.0));
        assert_eq!((r.peak, r.peak_at), (Some(160.0), Some(at(7, 30))));
        assert_eq!(r.time_to_peak_min, Some(30.0));
        assert_eq!(r.response_magnitude, Some(60.0));
        // triangle 0 -> 60 -> 0 over 60 minutes
        assert_close(r.iauc.unwrap(), 1800.0, 1e-9);
        // 0..30 min ramps from 0 to 60
        assert_close(r.early_iauc.unwrap(), 900.0, 1e-9);
        assert_close(r.late_iauc.unwrap(), 0.0, 1e-9);
        assert_close(r.rise_rate.unwrap(), 2.0, 1e-12);
        assert!(r.decline_rate.unwrap() < 0.0);
        // half value 130 reached at 07:45
        assert_eq!(r.half_life_min, Some(30.0));
        assert_eq!(r.sample_count, 25);
        assert_close(r.glycemic_load.unwrap(), 35.0, 1e-12);
    }

    #[test]
    fn missing_baseline_propagates() {
        let cfg = AnalysisConfig::default();
        let s = every_5_min(at(7, 0), &[100.0, 130.0, 160.0, 140.0]);
        let r = meal_response(&s, at(7, 0), &MealParams::default(), &cfg);
        assert_eq!(r.baseline, None);
        assert_eq!(r.peak, Some(160.0));
        assert_eq!(r.iauc, None);
        assert_eq!(r.response_magnitude, None);
        assert_eq!(r.rise_rate, None);
        assert_eq!(r.half_life_min, None);
        assert_eq!(r.glycemic_load, None);
    }

    #[test]
    fn repeated_meals_skip_absent_values() {
        let cfg = AnalysisConfig::default();
        let s = breakfast();
        let rep = repeated_meal_response(
            &s,
            &[at(7, 0), at(12, 0), at(6, 30)],
            &MealParams::default(),
            &cfg,
        );
        assert_eq!(rep.meals, 3);
        assert_eq!(rep.responses.len(), 3);
        // 12:00 has no data at all; 06:30 has no baseline
        assert_eq!(rep.baseline.values, vec![100.0]);
        assert_eq!(rep.baseline.std, None);
        assert_eq!(rep.peak.values, vec![160.0, 160.0]);
        assert_eq!(rep.peak.mean, Some(160.0));
        assert_eq!(rep.peak.std, Some(0.0));
    }
}
