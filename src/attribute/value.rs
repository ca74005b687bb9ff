//! Attribute values - one variant per attribute type

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttributeType;

/// Reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Storage path of the file
    pub path: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// MIME type
    pub mime_type: String,
}

/// A logged histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram kind (e.g. "COUNTING")
    pub histogram_type: String,
    /// Bin edges (`values.len() + 1` entries)
    pub edges: Vec<f64>,
    /// Bin values
    pub values: Vec<f64>,
}

/// Last logged value of a non-numeric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesLast<T> {
    /// Last logged value
    pub last: T,
    /// Step of the last logged value
    pub last_step: f64,
}

/// Aggregates of a numeric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatSeriesAggregates {
    /// Last logged value
    pub last: f64,
    /// Step of the last logged value
    pub last_step: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean value
    pub average: f64,
    /// Population variance
    pub variance: f64,
}

impl FloatSeriesAggregates {
    /// Aggregate `(step, value)` pairs given in step order.
    ///
    /// Returns `None` for an empty series.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut last = None;

        for (step, value) in points {
            count += 1;
            sum += value;
            sum_sq += value * value;
            min = min.min(value);
            max = max.max(value);
            last = Some((step, value));
        }

        let (last_step, last) = last?;
        let n = count as f64;
        let average = sum / n;
        Some(Self {
            last,
            last_step,
            min,
            max,
            average,
            variance: (sum_sq / n - average * average).max(0.0),
        })
    }
}

/// Borrowed scalar view of a value, as compared by filters and sorting.
///
/// Series collapse to their last logged value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarRef<'a> {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Timestamp
    Datetime(DateTime<Utc>),
    /// String
    Str(&'a str),
}

impl ScalarRef<'_> {
    /// Total order between scalars of compatible kinds.
    ///
    /// Ints and floats compare numerically; other kind mixes are unordered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Self::Float(a), Self::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Datetime(a), Self::Datetime(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Value of one attribute on one entity.
///
/// Decoded at the service boundary; the variant always matches the
/// definition's [`AttributeType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Boolean
    Bool(bool),
    /// Timestamp
    Datetime(DateTime<Utc>),
    /// File reference
    File(FileRef),
    /// Float
    Float(f64),
    /// Integer
    Int(i64),
    /// String
    String(String),
    /// String set
    StringSet(BTreeSet<String>),
    /// Numeric series aggregates
    FloatSeries(FloatSeriesAggregates),
    /// Last histogram
    HistogramSeries(SeriesLast<Histogram>),
    /// Last string
    StringSeries(SeriesLast<String>),
    /// Last file
    FileSeries(SeriesLast<FileRef>),
}

impl AttributeValue {
    /// The attribute type this value belongs to.
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Datetime(_) => AttributeType::Datetime,
            Self::File(_) => AttributeType::File,
            Self::Float(_) => AttributeType::Float,
            Self::Int(_) => AttributeType::Int,
            Self::String(_) => AttributeType::String,
            Self::StringSet(_) => AttributeType::StringSet,
            Self::FloatSeries(_) => AttributeType::FloatSeries,
            Self::HistogramSeries(_) => AttributeType::HistogramSeries,
            Self::StringSeries(_) => AttributeType::StringSeries,
            Self::FileSeries(_) => AttributeType::FileSeries,
        }
    }

    /// Scalar view used for comparisons; series yield their last value.
    ///
    /// Files, histograms and string sets have no scalar view.
    #[must_use]
    pub fn last_scalar(&self) -> Option<ScalarRef<'_>> {
        match self {
            Self::Bool(v) => Some(ScalarRef::Bool(*v)),
            Self::Datetime(v) => Some(ScalarRef::Datetime(*v)),
            Self::Float(v) => Some(ScalarRef::Float(*v)),
            Self::Int(v) => Some(ScalarRef::Int(*v)),
            Self::String(v) => Some(ScalarRef::Str(v)),
            Self::FloatSeries(agg) => Some(ScalarRef::Float(agg.last)),
            Self::StringSeries(last) => Some(ScalarRef::Str(&last.last)),
            Self::File(_) | Self::StringSet(_) | Self::HistogramSeries(_) | Self::FileSeries(_) => {
                None
            }
        }
    }

    /// Strings a `matches` predicate is applied to.
    #[must_use]
    pub fn match_targets(&self) -> Vec<&str> {
        match self {
            Self::String(v) => vec![v.as_str()],
            Self::StringSeries(last) => vec![last.last.as_str()],
            Self::StringSet(set) => set.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Human-readable rendering used for text columns.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Bool(v) => v.to_string(),
            Self::Datetime(v) => v.to_rfc3339(),
            Self::File(f) => f.path.clone(),
            Self::Float(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::StringSet(set) => set.iter().cloned().collect::<Vec<_>>().join(","),
            Self::FloatSeries(agg) => agg.last.to_string(),
            Self::HistogramSeries(last) => {
                serde_json::to_string(&last.last).unwrap_or_default()
            }
            Self::StringSeries(last) => last.last.clone(),
            Self::FileSeries(last) => last.last.path.clone(),
        }
    }
}
