use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures raised at the series boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("reading {index}: glucose is not a finite number")]
    NonFiniteGlucose { index: usize },
    #[error("reading {index}: glucose {value} mg/dL is not positive")]
    NonPositiveGlucose { index: usize, value: f64 },
    #[error("reading {index}: timestamp is earlier than the previous reading")]
    OutOfOrder { index: usize },
    #[error("reading {index}: timestamp duplicates the previous reading")]
    DuplicateTimestamp { index: usize },
    #[error("window offset must not be negative (got {minutes} min)")]
    NegativeOffset { minutes: i64 },
}

/// One CGM sample, glucose in mg/dL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub glucose: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, glucose: f64) -> Self {
        Self { timestamp, glucose }
    }
}

/// Time-ordered glucose samples with unique timestamps and positive values.
///
/// The only way to build one is through [`ReadingSeries::new`] (or
/// deserialization, which routes through it), so every function taking a
/// `&ReadingSeries` can rely on the ordering invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Reading>", into = "Vec<Reading>")]
pub struct ReadingSeries {
    readings: Vec<Reading>,
}

impl ReadingSeries {
    pub fn new(readings: Vec<Reading>) -> Result<Self, SeriesError> {
        for (index, reading) in readings.iter().enumerate() {
            if !reading.glucose.is_finite() {
                return Err(SeriesError::NonFiniteGlucose { index });
            }
            if reading.glucose <= 0.0 {
                return Err(SeriesError::NonPositiveGlucose {
                    index,
                    value: reading.glucose,
                });
            }
            if index > 0 {
                let prev = readings[index - 1].timestamp;
                if reading.timestamp < prev {
                    return Err(SeriesError::OutOfOrder { index });
                }
                if reading.timestamp == prev {
                    return Err(SeriesError::DuplicateTimestamp { index });
                }
            }
        }
        Ok(Self { readings })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// Glucose values in time order.
    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.glucose).collect()
    }

    /// Window spanning the first through the last reading.
    pub fn span(&self) -> Option<Window> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(Window::new(first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Sub-series of readings satisfying `keep`, order preserved.
    pub fn filter<F>(&self, keep: F) -> ReadingSeries
    where
        F: Fn(&Reading) -> bool,
    {
        Self {
            readings: self.readings.iter().copied().filter(|r| keep(r)).collect(),
        }
    }

    /// Derived series (bucket means and the like) built from readings the
    /// caller already produced in order from a valid series.
    pub(crate) fn from_ordered(readings: Vec<Reading>) -> ReadingSeries {
        debug_assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { readings }
    }

    // Sub-ranges of a valid series are valid, so no re-validation.
    fn from_range(&self, lo: usize, hi: usize) -> ReadingSeries {
        if lo >= hi {
            return Self::empty();
        }
        Self {
            readings: self.readings[lo..hi].to_vec(),
        }
    }
}

impl TryFrom<Vec<Reading>> for ReadingSeries {
    type Error = SeriesError;

    fn try_from(readings: Vec<Reading>) -> Result<Self, Self::Error> {
        Self::new(readings)
    }
}

impl From<ReadingSeries> for Vec<Reading> {
    fn from(series: ReadingSeries) -> Self {
        series.readings
    }
}

impl<'a> IntoIterator for &'a ReadingSeries {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// `[anchor - before, anchor + after]`.
    pub fn around(
        anchor: NaiveDateTime,
        before: Duration,
        after: Duration,
    ) -> Result<Self, SeriesError> {
        check_offset(before)?;
        check_offset(after)?;
        Ok(Self::new(shift(anchor, -before), shift(anchor, after)))
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// What kind of external event an anchor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Meal,
    Exercise,
    Sleep,
    Medication,
    Alcohol,
    Other,
}

/// Timestamped trigger plus the offsets used to build its analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorEvent {
    pub timestamp: NaiveDateTime,
    pub kind: AnchorKind,
    pub before: Duration,
    pub after: Duration,
}

impl AnchorEvent {
    pub fn new(
        timestamp: NaiveDateTime,
        kind: AnchorKind,
        before: Duration,
        after: Duration,
    ) -> Result<Self, SeriesError> {
        check_offset(before)?;
        check_offset(after)?;
        Ok(Self {
            timestamp,
            kind,
            before,
            after,
        })
    }

    pub fn window(&self) -> Window {
        Window::new(
            shift(self.timestamp, -self.before),
            shift(self.timestamp, self.after),
        )
    }
}

fn check_offset(offset: Duration) -> Result<(), SeriesError> {
    if offset < Duration::zero() {
        return Err(SeriesError::NegativeOffset {
            minutes: offset.num_minutes(),
        });
    }
    Ok(())
}

/// `t + offset`, clamped to the representable range instead of overflowing.
pub fn shift(t: NaiveDateTime, offset: Duration) -> NaiveDateTime {
    t.checked_add_signed(offset).unwrap_or(if offset < Duration::zero() {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    })
}

/// `Duration::minutes` saturating at the `Duration` bounds.
pub fn clamped_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(if minutes < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// `Duration::days` saturating at the `Duration` bounds.
pub fn clamped_days(days: i64) -> Duration {
    Duration::try_days(days).unwrap_or(if days < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// Readings with `start <= timestamp <= end`. Empty when `start > end`.
pub fn slice(series: &ReadingSeries, start: NaiveDateTime, end: NaiveDateTime) -> ReadingSeries {
    let lo = series.readings.partition_point(|r| r.timestamp < start);
    let hi = series.readings.partition_point(|r| r.timestamp <= end);
    series.from_range(lo, hi)
}

/// Readings inside `[anchor - before, anchor + after]`.
pub fn slice_relative(
    series: &ReadingSeries,
    anchor: NaiveDateTime,
    before: Duration,
    after: Duration,
) -> ReadingSeries {
    slice(series, shift(anchor, -before), shift(anchor, after))
}

pub fn slice_window(series: &ReadingSeries, window: &Window) -> ReadingSeries {
    slice(series, window.start, window.end)
}

/// Readings with `start <= timestamp < end`.
pub fn slice_open_end(
    series: &ReadingSeries,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> ReadingSeries {
    let lo = series.readings.partition_point(|r| r.timestamp < start);
    let hi = series.readings.partition_point(|r| r.timestamp < end);
    series.from_range(lo, hi)
}

/// Readings with `start < timestamp <= end`.
pub fn slice_open_start(
    series: &ReadingSeries,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> ReadingSeries {
    let lo = series.readings.partition_point(|r| r.timestamp <= start);
    let hi = series.readings.partition_point(|r| r.timestamp <= end);
    series.from_range(lo, hi)
}
