//! Continuous glucose monitor time-series analytics.
//!
//! Everything operates on a validated [`series::ReadingSeries`]; windows are
//! cut with the `slice*` queries and fed to the metric, detector and analysis
//! layers. Missing data surfaces as `None`, never as zero.

pub mod analysis;
pub mod config;
pub mod detectors;
pub mod io;
pub mod metrics;
pub mod series;

pub use config::AnalysisConfig;
pub use detectors::*;
pub use metrics::*;
pub use series::*;
