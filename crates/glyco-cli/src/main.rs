use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use glyco_lib::{
    analysis::{
        activity::{exercise_response, sleep_analysis},
        cycle::cycle_phase_impact,
        lifestyle::{
            alcohol_response, illness_volatility, rapid_drops, recent_change, stress_periods,
            AlcoholResponse, IllnessVolatility, RapidDrop, RecentChange, StressPeriod,
        },
        meal::{meal_response, repeated_meal_response, MealParams},
        medication::{medication_response, ActionProfile},
        trend::{biomarker_profile, trend_report},
    },
    config::AnalysisConfig,
    detectors::{
        episodes::{hyperglycemia_episodes, hypoglycemia_episodes, Episode},
        patterns::{
            circadian_stability, dawn_phenomenon_with_tiers, hourly_pattern, somogyi_with_limits,
            CircadianStability, DawnPhenomenon, HourOfDay, SomogyiRebound,
        },
    },
    io::readings::{parse_timestamp, read_readings, read_readings_csv},
    metrics::{
        auc::total_auc,
        kinetics::{peak, trough, Extremum},
        variability::{glycemic_summary, GlycemicSummary},
    },
    series::{slice_window, AnchorEvent, AnchorKind, ReadingSeries, Window},
};
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "glyco",
    version,
    about = "Glyco: continuous glucose monitor analytics"
)]
struct Cli {
    /// `timestamp,glucose` CSV; read from stdin when omitted
    #[arg(long, global = true)]
    input: Option<PathBuf>,
    /// TOML file overriding analysis thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EventKind {
    Meal,
    Exercise,
    Sleep,
    Medication,
    Alcohol,
    Other,
}

impl From<EventKind> for AnchorKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Meal => AnchorKind::Meal,
            EventKind::Exercise => AnchorKind::Exercise,
            EventKind::Sleep => AnchorKind::Sleep,
            EventKind::Medication => AnchorKind::Medication,
            EventKind::Alcohol => AnchorKind::Alcohol,
            EventKind::Other => AnchorKind::Other,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Whole-series metrics, risk score and phenotypes
    Summary,
    /// Sustained hyper- and hypoglycemic episodes
    Episodes,
    /// Post-meal response; repeat --at to aggregate several meals
    Meal {
        #[arg(long = "at", required = true, value_parser = parse_time)]
        at: Vec<NaiveDateTime>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        gi: Option<f64>,
    },
    /// Glucose before, during and after an exercise session
    Exercise {
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,
    },
    /// Overnight profile and sleep quality score
    Sleep {
        #[arg(long, value_parser = parse_time)]
        sleep: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        wake: NaiveDateTime,
    },
    /// Phase-wise response to a glucose-lowering dose
    Medication {
        #[arg(long, value_parser = parse_time)]
        at: NaiveDateTime,
        /// Minutes to onset; all three offsets must be given together
        #[arg(long, requires_all = ["peak", "duration"], allow_negative_numbers = true)]
        onset: Option<i64>,
        #[arg(long, requires_all = ["onset", "duration"])]
        peak: Option<i64>,
        #[arg(long, requires_all = ["onset", "peak"])]
        duration: Option<i64>,
        #[arg(long)]
        units: Option<f64>,
    },
    /// Delayed response to a drink plus steep drops across the series
    Alcohol {
        #[arg(long, value_parser = parse_time)]
        at: Option<NaiveDateTime>,
    },
    /// Sustained elevated clock hours
    Stress,
    /// Volatile hours and the recent shift in mean glucose
    Illness {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Daily-mean glucose by menstrual-cycle phase; repeat --start per logged cycle
    Cycle {
        /// First day of a cycle, YYYY-MM-DD
        #[arg(long = "start", required = true, value_parser = parse_date)]
        start: Vec<NaiveDate>,
    },
    /// Dawn phenomenon, Somogyi rebound, day-to-day stability and hourly pattern
    Circadian,
    /// Daily, weekly, monthly, time-of-day and weekday roll-ups
    Trend,
    /// Metrics over an arbitrary window around an event
    Window {
        #[arg(long, value_parser = parse_time)]
        at: NaiveDateTime,
        /// Minutes before the event
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        before: i64,
        /// Minutes after the event
        #[arg(long, default_value_t = 120, allow_negative_numbers = true)]
        after: i64,
        #[arg(long, default_value = "other")]
        kind: EventKind,
    },
}

#[derive(Serialize)]
struct EpisodesReport {
    hyperglycemia: Vec<Episode>,
    hypoglycemia: Vec<Episode>,
}

#[derive(Serialize)]
struct AlcoholReport {
    response: Option<AlcoholResponse>,
    rapid_drops: Vec<RapidDrop>,
}

#[derive(Serialize)]
struct StressReport {
    periods: Vec<StressPeriod>,
}

#[derive(Serialize)]
struct IllnessReport {
    #[serde(flatten)]
    volatility: IllnessVolatility,
    recent_change: Option<RecentChange>,
}

#[derive(Serialize)]
struct CircadianReport {
    dawn: Option<DawnPhenomenon>,
    somogyi: Option<SomogyiRebound>,
    stability: Option<CircadianStability>,
    hourly: Vec<HourOfDay>,
}

#[derive(Serialize)]
struct WindowReport {
    kind: AnchorKind,
    window: Window,
    summary: Option<GlycemicSummary>,
    peak: Option<Extremum>,
    trough: Option<Extremum>,
    /// Trapezoidal area under the curve, mg/dL·min.
    auc: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;
    let series = read_series(cli.input.as_deref())?;
    match cli.command {
        Commands::Summary => {
            let profile =
                biomarker_profile(&series, &cfg).ok_or_else(|| anyhow!("no readings in input"))?;
            print_json(&profile)?
        }
        Commands::Episodes => print_json(&EpisodesReport {
            hyperglycemia: hyperglycemia_episodes(&series, &cfg),
            hypoglycemia: hypoglycemia_episodes(&series, &cfg),
        })?,
        Commands::Meal { at, carbs, gi } => {
            let params = MealParams { carbs_g: carbs, gi };
            match at.as_slice() {
                [single] => print_json(&meal_response(&series, *single, &params, &cfg))?,
                many => print_json(&repeated_meal_response(&series, many, &params, &cfg))?,
            }
        }
        Commands::Exercise { start, end } => {
            print_json(&exercise_response(&series, start, end))?
        }
        Commands::Sleep { sleep, wake } => {
            let report = sleep_analysis(&series, sleep, wake, &cfg)
                .ok_or_else(|| anyhow!("no readings between {sleep} and {wake}"))?;
            print_json(&report)?
        }
        Commands::Medication {
            at,
            onset,
            peak,
            duration,
            units,
        } => {
            let profile = match (onset, peak, duration) {
                (Some(onset_min), Some(peak_min), Some(duration_min)) => Some(ActionProfile {
                    onset_min,
                    peak_min,
                    duration_min,
                }),
                _ => None,
            };
            print_json(&medication_response(&series, at, profile, units, &cfg)?)?
        }
        Commands::Alcohol { at } => print_json(&AlcoholReport {
            response: at.map(|t| alcohol_response(&series, t, &cfg)),
            rapid_drops: rapid_drops(&series),
        })?,
        Commands::Stress => print_json(&StressReport {
            periods: stress_periods(&series, &cfg),
        })?,
        Commands::Illness { days } => print_json(&IllnessReport {
            volatility: illness_volatility(&series, &cfg),
            recent_change: recent_change(&series, days),
        })?,
        Commands::Cycle { start } => {
            let impact = cycle_phase_impact(&series, &start, &cfg)
                .ok_or_else(|| anyhow!("no cycle start dates given"))?;
            print_json(&impact)?
        }
        Commands::Circadian => print_json(&CircadianReport {
            dawn: dawn_phenomenon_with_tiers(&series, cfg.dawn_mild_rise, cfg.dawn_marked_rise),
            somogyi: somogyi_with_limits(
                &series,
                cfg.somogyi_horizon(),
                cfg.target_low,
                cfg.target_high,
            ),
            stability: circadian_stability(&series),
            hourly: hourly_pattern(&series, &cfg),
        })?,
        Commands::Trend => print_json(&trend_report(&series, &cfg))?,
        Commands::Window {
            at,
            before,
            after,
            kind,
        } => {
            let before = Duration::try_minutes(before)
                .ok_or_else(|| anyhow!("--before {before} minutes is out of range"))?;
            let after = Duration::try_minutes(after)
                .ok_or_else(|| anyhow!("--after {after} minutes is out of range"))?;
            let event = AnchorEvent::new(at, kind.into(), before, after)?;
            let window = event.window();
            let readings = slice_window(&series, &window);
            print_json(&WindowReport {
                kind: event.kind,
                window,
                summary: glycemic_summary(&readings, &cfg),
                peak: peak(&readings),
                trough: trough(&readings),
                auc: total_auc(&readings),
            })?
        }
    }
    Ok(())
}

fn parse_time(raw: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(raw).ok_or_else(|| format!("expected YYYY-MM-DD HH:MM[:SS], got {raw:?}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got {raw:?}: {e}"))
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_series(input: Option<&Path>) -> Result<ReadingSeries> {
    match input {
        Some(path) => read_readings_csv(path),
        None => read_readings(io::stdin().lock()).context("reading stdin"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
