//! Step series: points, step ranges and windowing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, FileRef, Histogram};
use crate::{Error, Result};

/// Value logged at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SeriesValue {
    /// Numeric metric
    Float(f64),
    /// Log line
    String(String),
    /// Histogram
    Histogram(Histogram),
    /// File
    File(FileRef),
}

impl SeriesValue {
    /// Series type holding this value.
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Float(_) => AttributeType::FloatSeries,
            Self::String(_) => AttributeType::StringSeries,
            Self::Histogram(_) => AttributeType::HistogramSeries,
            Self::File(_) => AttributeType::FileSeries,
        }
    }

    /// Numeric value, if any.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text rendering for non-numeric columns.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Float(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Histogram(h) => serde_json::to_string(h).unwrap_or_default(),
            Self::File(f) => f.path.clone(),
        }
    }
}

/// One logged point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint<V = SeriesValue> {
    /// Step (unique within a merged series)
    pub step: f64,
    /// Logged value
    pub value: V,
    /// Absolute time the point was logged
    pub timestamp: Option<DateTime<Utc>>,
    /// Provisional value not yet finalized
    pub is_preview: bool,
    /// Completion ratio of a preview in `[0, 1]`; 1.0 for final points
    pub preview_completion: f64,
}

impl<V> SeriesPoint<V> {
    /// Final (non-preview) point without a timestamp.
    #[must_use]
    pub const fn new(step: f64, value: V) -> Self {
        Self {
            step,
            value,
            timestamp: None,
            is_preview: false,
            preview_completion: 1.0,
        }
    }

    /// Attach an absolute timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Mark as a preview with the given completion (clamped to `[0, 1]`).
    #[must_use]
    pub fn preview(mut self, completion: f64) -> Self {
        self.is_preview = true;
        self.preview_completion = completion.clamp(0.0, 1.0);
        self
    }
}

/// Inclusive step range; open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepRange {
    from: Option<f64>,
    to: Option<f64>,
}

impl StepRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for NaN bounds or `from > to`.
    pub fn new(from: Option<f64>, to: Option<f64>) -> Result<Self> {
        if from.is_some_and(f64::is_nan) || to.is_some_and(f64::is_nan) {
            return Err(Error::InvalidArgument(
                "step_range bounds must be numbers".to_string(),
            ));
        }
        if let (Some(a), Some(b)) = (from, to) {
            if a > b {
                return Err(Error::InvalidArgument(format!(
                    "step_range start ({a}) must not exceed its end ({b})"
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// Unbounded range.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// Lower bound.
    #[must_use]
    pub const fn start(&self) -> Option<f64> {
        self.from
    }

    /// Upper bound.
    #[must_use]
    pub const fn end(&self) -> Option<f64> {
        self.to
    }

    /// Whether `step` lies in the range.
    #[must_use]
    pub fn contains(&self, step: f64) -> bool {
        self.from.map_or(true, |a| step >= a) && self.to.map_or(true, |b| step <= b)
    }
}

/// Post-merge windowing applied to every series of a query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeriesWindow {
    /// Steps to keep
    pub step_range: StepRange,
    /// Keep only the last `n` points
    pub tail_limit: Option<usize>,
    /// Keep preview points
    pub include_previews: bool,
    /// Keep absolute timestamps
    pub include_time: bool,
}

impl SeriesWindow {
    /// Validate option values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for `tail_limit == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.tail_limit == Some(0) {
            return Err(Error::InvalidArgument(
                "tail_limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply range, previews, tail limit and timestamp options to a step-ordered series.
    #[must_use]
    pub fn apply<V>(&self, points: Vec<SeriesPoint<V>>) -> Vec<SeriesPoint<V>> {
        let mut kept: Vec<SeriesPoint<V>> = points
            .into_iter()
            .filter(|p| self.step_range.contains(p.step))
            .filter(|p| self.include_previews || !p.is_preview)
            .collect();

        if let Some(n) = self.tail_limit {
            let skip = kept.len().saturating_sub(n);
            kept.drain(..skip);
        }
        if !self.include_time {
            for p in &mut kept {
                p.timestamp = None;
            }
        }
        kept
    }
}
