//! Event-anchored analyzers composed from the series, metric and detector primitives.

use serde::{Deserialize, Serialize};

use crate::{
    metrics::stats::{self, mean},
    series::ReadingSeries,
};

pub mod activity;
pub mod cycle;
pub mod lifestyle;
pub mod meal;
pub mod medication;
pub mod trend;

/// Min, max and mean of one phase of an event window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl PhaseStats {
    pub fn of(window: &ReadingSeries) -> Option<Self> {
        let values = window.values();
        Some(Self {
            count: values.len(),
            min: stats::min(&values)?,
            max: stats::max(&values)?,
            mean: mean(&values)?,
        })
    }
}
