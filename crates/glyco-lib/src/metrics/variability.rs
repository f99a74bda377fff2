use serde::{Deserialize, Serialize};

use crate::{
    config::AnalysisConfig,
    metrics::{
        kinetics::minutes_between,
        stats::{self, mean, sample_std},
    },
    series::ReadingSeries,
};

fn percent_where<F>(series: &ReadingSeries, pred: F) -> f64
where
    F: Fn(f64) -> bool,
{
    if series.is_empty() {
        return 0.0;
    }
    let hits = series.iter().filter(|r| pred(r.glucose)).count();
    hits as f64 / series.len() as f64 * 100.0
}

/// Percentage of samples with `low <= g <= high`; 0 for an empty series.
pub fn time_in_range(series: &ReadingSeries, low: f64, high: f64) -> f64 {
    percent_where(series, |g| g >= low && g <= high)
}

/// Percentage of samples strictly below `threshold`.
pub fn time_below(series: &ReadingSeries, threshold: f64) -> f64 {
    percent_where(series, |g| g < threshold)
}

/// Percentage of samples strictly above `threshold`.
pub fn time_above(series: &ReadingSeries, threshold: f64) -> f64 {
    percent_where(series, |g| g > threshold)
}

/// `std / mean * 100` using the sample standard deviation.
pub fn coefficient_of_variation(series: &ReadingSeries) -> Option<f64> {
    let values = series.values();
    let m = mean(&values)?;
    let sd = sample_std(&values)?;
    if m <= 0.0 {
        return None;
    }
    Some(sd / m * 100.0)
}

/// Mean Amplitude of Glycemic Excursions.
///
/// Every consecutive-sample change whose magnitude reaches
/// `sd_multiplier * std` counts as an excursion; MAGE is their mean.
/// Zero-size changes never count, so a flat trace has no MAGE.
pub fn mage(series: &ReadingSeries, sd_multiplier: f64) -> Option<f64> {
    let values = series.values();
    let sd = sample_std(&values)?;
    let threshold = sd * sd_multiplier;
    let excursions: Vec<f64> = values
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|&d| d > 0.0 && d >= threshold)
        .collect();
    mean(&excursions)
}

/// Estimated average glucose, `(mean + 2.63) / 1.0464`.
pub fn eag(series: &ReadingSeries) -> Option<f64> {
    mean(&series.values()).map(|m| (m + 2.63) / 1.0464)
}

/// Estimated HbA1c (%), `(mean + 46.7) / 28.7`.
pub fn ea1c(series: &ReadingSeries) -> Option<f64> {
    mean(&series.values()).map(|m| (m + 46.7) / 28.7)
}

/// Glucose Management Indicator (%), `3.31 + 0.02392 * mean`.
pub fn gmi(series: &ReadingSeries) -> Option<f64> {
    mean(&series.values()).map(|m| 3.31 + 0.02392 * m)
}

/// Personal glycemic stability, `clamp(100 - cv, 0, 100)`.
pub fn pgs(series: &ReadingSeries) -> Option<f64> {
    coefficient_of_variation(series).map(|cv| (100.0 - cv).clamp(0.0, 100.0))
}

/// Glycemic Risk Assessment Diabetes Equation score and its partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub score: f64,
    /// Share of the total score contributed by samples below 70 mg/dL.
    pub hypo_pct: f64,
    /// Share contributed by samples within 70-140 mg/dL.
    pub eu_pct: f64,
    /// Share contributed by samples above 140 mg/dL.
    pub hyper_pct: f64,
}

const GRADE_HYPO: f64 = 70.0;
const GRADE_HYPER: f64 = 140.0;

fn grade_value(glucose_mgdl: f64) -> Option<f64> {
    let mmol = glucose_mgdl / 18.0;
    if mmol <= 1.0 {
        return None;
    }
    let inner = mmol.log10().log10() + 0.16;
    Some((425.0 * inner * inner).min(50.0))
}

pub fn grade(series: &ReadingSeries) -> Option<Grade> {
    let scored: Vec<(f64, f64)> = series
        .iter()
        .filter_map(|r| grade_value(r.glucose).map(|v| (r.glucose, v)))
        .collect();
    if scored.is_empty() {
        return None;
    }
    let total: f64 = scored.iter().map(|(_, v)| v).sum();
    let share = |pred: &dyn Fn(f64) -> bool| {
        if total <= 0.0 {
            return 0.0;
        }
        scored
            .iter()
            .filter(|(g, _)| pred(*g))
            .map(|(_, v)| v)
            .sum::<f64>()
            / total
            * 100.0
    };
    Some(Grade {
        score: total / scored.len() as f64,
        hypo_pct: share(&|g| g < GRADE_HYPO),
        eu_pct: share(&|g| (GRADE_HYPO..=GRADE_HYPER).contains(&g)),
        hyper_pct: share(&|g| g > GRADE_HYPER),
    })
}

/// Glycemic Variability Index: trace length over the straight-line length.
/// Time is measured in minutes.
pub fn gvi(series: &ReadingSeries) -> Option<f64> {
    let readings = series.readings();
    let (first, last) = (readings.first()?, readings.last()?);
    if readings.len() < 2 {
        return None;
    }
    let actual: f64 = readings
        .windows(2)
        .map(|w| {
            let dt = minutes_between(w[0].timestamp, w[1].timestamp);
            dt.hypot(w[1].glucose - w[0].glucose)
        })
        .sum();
    let ideal = minutes_between(first.timestamp, last.timestamp).hypot(last.glucose - first.glucose);
    if ideal <= 0.0 {
        return None;
    }
    Some(actual / ideal)
}

/// Direction reversals between consecutive changes larger than `threshold`.
pub fn excursion_count(series: &ReadingSeries, threshold: f64) -> usize {
    let mut last_rising: Option<bool> = None;
    let mut count = 0;
    for w in series.readings().windows(2) {
        let delta = w[1].glucose - w[0].glucose;
        if delta.abs() <= threshold {
            continue;
        }
        let rising = delta > 0.0;
        if last_rising.is_some_and(|prev| prev != rising) {
            count += 1;
        }
        last_rising = Some(rising);
    }
    count
}

/// Mean and max absolute change between consecutive samples.
pub fn consecutive_change(series: &ReadingSeries) -> Option<(f64, f64)> {
    let diffs: Vec<f64> = series
        .readings()
        .windows(2)
        .map(|w| (w[1].glucose - w[0].glucose).abs())
        .collect();
    Some((mean(&diffs)?, stats::max(&diffs)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlycemicSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub cv: Option<f64>,
    pub tir: f64,
    pub tbr: f64,
    pub tbr_severe: f64,
    pub tar: f64,
    pub tar_severe: f64,
    pub mage: Option<f64>,
    pub eag: f64,
    pub ea1c: f64,
    pub gmi: f64,
    pub grade: Option<Grade>,
    pub pgs: Option<f64>,
    pub gvi: Option<f64>,
    pub mean_abs_change: Option<f64>,
    pub max_abs_change: Option<f64>,
    pub excursions: usize,
}

/// Every variability metric for one window; `None` for an empty window.
pub fn glycemic_summary(series: &ReadingSeries, cfg: &AnalysisConfig) -> Option<GlycemicSummary> {
    let values = series.values();
    let mean_g = mean(&values)?;
    let change = consecutive_change(series);
    Some(GlycemicSummary {
        count: values.len(),
        mean: mean_g,
        median: stats::median(&values)?,
        std: sample_std(&values),
        min: stats::min(&values)?,
        max: stats::max(&values)?,
        cv: coefficient_of_variation(series),
        tir: time_in_range(series, cfg.target_low, cfg.target_high),
        tbr: time_below(series, cfg.target_low),
        tbr_severe: time_below(series, cfg.very_low),
        tar: time_above(series, cfg.target_high),
        tar_severe: time_above(series, cfg.very_high),
        mage: mage(series, cfg.mage_sd_multiplier),
        eag: (mean_g + 2.63) / 1.0464,
        ea1c: (mean_g + 46.7) / 28.7,
        gmi: 3.31 + 0.02392 * mean_g,
        grade: grade(series),
        pgs: pgs(series),
        gvi: gvi(series),
        mean_abs_change: change.map(|c| c.0),
        max_abs_change: change.map(|c| c.1),
        excursions: excursion_count(series, cfg.excursion_delta),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{test_support::*, Reading};
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    fn sample() -> ReadingSeries {
        every_5_min(
            at(8, 0),
            &[100.0, 130.0, 90.0, 160.0, 110.0, 115.0, 180.0, 120.0],
        )
    }

    #[test]
    fn range_percentages() {
        let s = every_5_min(
            at(0, 0),
            &[80.0, 90.0, 100.0, 110.0, 120.0, 130.0, 150.0, 160.0, 170.0, 180.0],
        );
        assert_close(time_in_range(&s, 70.0, 140.0), 60.0, 1e-12);
        assert_close(time_above(&s, 140.0), 40.0, 1e-12);
        assert_close(time_below(&s, 90.0), 10.0, 1e-12);
        assert_close(time_in_range(&s, 70.0, 180.0), 100.0, 1e-12);
        assert_eq!(time_in_range(&ReadingSeries::empty(), 70.0, 180.0), 0.0);
    }

    #[test]
    fn time_in_range_ignores_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let base = sample();
        let mut values = base.values();
        let expected = time_in_range(&base, 95.0, 150.0);
        for _ in 0..10 {
            values.shuffle(&mut rng);
            let shuffled = every_5_min(at(8, 0), &values);
            assert_close(time_in_range(&shuffled, 95.0, 150.0), expected, 1e-12);
        }
    }

    #[test]
    fn closed_form_metrics() {
        let s = sample();
        assert_close(coefficient_of_variation(&s).unwrap(), 24.20415723402708, 1e-9);
        assert_close(eag(&s).unwrap(), 122.56785168195718, 1e-9);
        assert_close(ea1c(&s).unwrap(), 6.004355400696864, 1e-9);
        assert_close(gmi(&s).unwrap(), 6.31495, 1e-9);
        assert_close(pgs(&s).unwrap(), 100.0 - 24.20415723402708, 1e-9);
        assert_close(gvi(&s).unwrap(), 8.028120623229391, 1e-9);
    }

    #[test]
    fn grade_partitions() {
        let g = grade(&sample()).unwrap();
        assert_close(g.score, 3.5841322889565945, 1e-9);
        assert_close(g.hypo_pct, 0.0, 1e-12);
        assert_close(g.eu_pct, 34.15521696344053, 1e-9);
        assert_close(g.hyper_pct, 65.84478303655948, 1e-9);
        assert_eq!(grade(&ReadingSeries::empty()), None);
    }

    #[test]
    fn mage_uses_sd_threshold() {
        // sd = 30.41, so 30 and 5 fall short; 40 70 50 65 60 remain
        assert_close(mage(&sample(), 1.0).unwrap(), 57.0, 1e-9);
        // a huge multiplier leaves nothing to average
        assert_eq!(mage(&sample(), 10.0), None);
    }

    #[test]
    fn mage_absent_for_flat_trace() {
        let flat = every_5_min(at(8, 0), &[110.0; 12]);
        assert_eq!(mage(&flat, 1.0), None);
        assert_eq!(mage(&every_5_min(at(8, 0), &[110.0]), 1.0), None);
    }

    #[test]
    fn counts_direction_reversals() {
        // +30 -40 +70 -50 (+5 ignored) +65 -60
        assert_eq!(excursion_count(&sample(), 10.0), 5);
        assert_eq!(excursion_count(&sample(), 100.0), 0);
    }

    #[test]
    fn empty_inputs_are_absent() {
        let empty = ReadingSeries::empty();
        assert_eq!(coefficient_of_variation(&empty), None);
        assert_eq!(mage(&empty, 1.0), None);
        assert_eq!(eag(&empty), None);
        assert_eq!(pgs(&empty), None);
        assert_eq!(gvi(&empty), None);
        assert_eq!(consecutive_change(&empty), None);
        assert_eq!(glycemic_summary(&empty, &AnalysisConfig::default()), None);
    }

    #[test]
    fn summary_of_single_reading() {
        let s = ReadingSeries::new(vec![Reading::new(at(8, 0), 120.0)]).unwrap();
        let summary = glycemic_summary(&s, &AnalysisConfig::default()).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.std, None);
        assert_eq!(summary.cv, None);
        assert_eq!(summary.mean_abs_change, None);
        assert_close(summary.tir, 100.0, 1e-12);
    }

    #[test]
    fn summary_serializes() {
        let summary = glycemic_summary(&sample(), &AnalysisConfig::default()).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["count"], 8);
        assert_close(json["tar"].as_f64().unwrap(), 0.0, 1e-12);
        assert_close(json["max_abs_change"].as_f64().unwrap(), 70.0, 1e-12);
    }
}
