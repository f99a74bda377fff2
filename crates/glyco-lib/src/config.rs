use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::series::clamped_minutes;

/// Thresholds shared by every analyzer. Glucose values are mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub target_low: f64,
    pub target_high: f64,
    /// Severe hypoglycemia threshold (TBR level 2).
    pub very_low: f64,
    /// Severe hyperglycemia threshold (TAR level 2).
    pub very_high: f64,
    /// Lookback before an anchor used for its baseline (minutes).
    pub baseline_lookback_min: i64,
    pub mage_sd_multiplier: f64,
    pub hyper_max_gap_min: i64,
    pub hyper_min_duration_min: i64,
    pub hypo_max_gap_min: i64,
    pub hypo_min_duration_min: i64,
    /// Hourly mean above which an hour counts towards a stress period.
    pub stress_threshold: f64,
    pub stress_min_hours: i64,
    /// Hourly sample std above which an hour is flagged as volatile.
    pub illness_hourly_std: f64,
    /// How far past the last reading of a nocturnal low a rebound high is searched for (minutes).
    pub somogyi_horizon_min: i64,
    pub dawn_mild_rise: f64,
    pub dawn_marked_rise: f64,
    /// Minimum consecutive change counted by the excursion counter.
    pub excursion_delta: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_low: 70.0,
            target_high: 180.0,
            very_low: 54.0,
            very_high: 250.0,
            baseline_lookback_min: 30,
            mage_sd_multiplier: 1.0,
            hyper_max_gap_min: 60,
            hyper_min_duration_min: 120,
            hypo_max_gap_min: 30,
            hypo_min_duration_min: 0,
            stress_threshold: 160.0,
            stress_min_hours: 2,
            illness_hourly_std: 30.0,
            somogyi_horizon_min: 240,
            dawn_mild_rise: 10.0,
            dawn_marked_rise: 20.0,
            excursion_delta: 10.0,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: AnalysisConfig = toml::from_str(contents).context("parsing analysis config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: AnalysisConfig = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Rejects thresholds that are non-finite, negative where a span or count
    /// is expected, or ordered against each other the wrong way round.
    pub fn validate(&self) -> Result<()> {
        let levels = [
            ("target_low", self.target_low),
            ("target_high", self.target_high),
            ("very_low", self.very_low),
            ("very_high", self.very_high),
            ("mage_sd_multiplier", self.mage_sd_multiplier),
            ("stress_threshold", self.stress_threshold),
            ("illness_hourly_std", self.illness_hourly_std),
            ("dawn_mild_rise", self.dawn_mild_rise),
            ("dawn_marked_rise", self.dawn_marked_rise),
            ("excursion_delta", self.excursion_delta),
        ];
        for (name, value) in levels {
            if !value.is_finite() {
                bail!("{name} must be finite, got {value}");
            }
        }
        for (name, value) in [
            ("mage_sd_multiplier", self.mage_sd_multiplier),
            ("illness_hourly_std", self.illness_hourly_std),
            ("excursion_delta", self.excursion_delta),
        ] {
            if value < 0.0 {
                bail!("{name} must not be negative, got {value}");
            }
        }
        let spans = [
            ("baseline_lookback_min", self.baseline_lookback_min),
            ("hyper_max_gap_min", self.hyper_max_gap_min),
            ("hyper_min_duration_min", self.hyper_min_duration_min),
            ("hypo_max_gap_min", self.hypo_max_gap_min),
            ("hypo_min_duration_min", self.hypo_min_duration_min),
            ("stress_min_hours", self.stress_min_hours),
            ("somogyi_horizon_min", self.somogyi_horizon_min),
        ];
        for (name, value) in spans {
            if value < 0 {
                bail!("{name} must not be negative, got {value}");
            }
        }
        if self.target_low <= 0.0 {
            bail!("target_low must be positive, got {}", self.target_low);
        }
        if self.target_low >= self.target_high {
            bail!(
                "target_low ({}) must be below target_high ({})",
                self.target_low,
                self.target_high
            );
        }
        if self.very_low > self.target_low {
            bail!(
                "very_low ({}) must not exceed target_low ({})",
                self.very_low,
                self.target_low
            );
        }
        if self.very_high < self.target_high {
            bail!(
                "very_high ({}) must not be below target_high ({})",
                self.very_high,
                self.target_high
            );
        }
        if self.dawn_mild_rise > self.dawn_marked_rise {
            bail!(
                "dawn_mild_rise ({}) must not exceed dawn_marked_rise ({})",
                self.dawn_mild_rise,
                self.dawn_marked_rise
            );
        }
        Ok(())
    }

    pub fn baseline_lookback(&self) -> Duration {
        clamped_minutes(self.baseline_lookback_min)
    }

    pub fn somogyi_horizon(&self) -> Duration {
        clamped_minutes(self.somogyi_horizon_min)
    }
}
