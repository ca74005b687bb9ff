//! Attribute types, definitions and references

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declared type of an attribute.
///
/// The same path may carry different types on different entities; the
/// resolver picks one (or fails) per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Boolean
    Bool,
    /// UTC timestamp
    Datetime,
    /// Uploaded file reference
    File,
    /// 64-bit float
    Float,
    /// 64-bit integer
    Int,
    /// UTF-8 string
    String,
    /// Set of strings (tags)
    StringSet,
    /// Numeric series (metrics)
    FloatSeries,
    /// Histogram series
    HistogramSeries,
    /// String series (logs)
    StringSeries,
    /// File series
    FileSeries,
}

impl AttributeType {
    /// Every attribute type, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Bool,
        Self::Datetime,
        Self::File,
        Self::Float,
        Self::Int,
        Self::String,
        Self::StringSet,
        Self::FloatSeries,
        Self::HistogramSeries,
        Self::StringSeries,
        Self::FileSeries,
    ];

    /// Series types that hold non-numeric values.
    pub const NON_NUMERIC_SERIES: [Self; 3] =
        [Self::StringSeries, Self::HistogramSeries, Self::FileSeries];

    /// Name used in column suffixes (`path:float_series`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Datetime => "datetime",
            Self::File => "file",
            Self::Float => "float",
            Self::Int => "int",
            Self::String => "string",
            Self::StringSet => "string_set",
            Self::FloatSeries => "float_series",
            Self::HistogramSeries => "histogram_series",
            Self::StringSeries => "string_series",
            Self::FileSeries => "file_series",
        }
    }

    /// Name used by the remote predicate language.
    #[must_use]
    pub const fn backend_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Datetime => "datetime",
            Self::File => "fileRef",
            Self::Float => "float",
            Self::Int => "int",
            Self::String => "string",
            Self::StringSet => "stringSet",
            Self::FloatSeries => "floatSeries",
            Self::HistogramSeries => "histogramSeries",
            Self::StringSeries => "stringSeries",
            Self::FileSeries => "fileRefSeries",
        }
    }

    /// Whether values of this type are logged per step.
    #[must_use]
    pub const fn is_series(self) -> bool {
        matches!(
            self,
            Self::FloatSeries | Self::HistogramSeries | Self::StringSeries | Self::FileSeries
        )
    }

    /// Whether comparisons read a number (series compare their last value).
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::FloatSeries)
    }

    /// Whether comparisons read a string (series compare their last value).
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::StringSeries)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s || t.backend_name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown attribute type: {s}")))
    }
}

/// A concrete (path, type) pair.
///
/// Within one resolved query every output column corresponds to exactly one
/// definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeDefinition {
    path: String,
    attribute_type: AttributeType,
}

impl AttributeDefinition {
    /// Create a new definition.
    #[must_use]
    pub fn new(path: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            path: path.into(),
            attribute_type,
        }
    }

    /// Slash-delimited attribute path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Attribute type.
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Column name with a type suffix (`config/lr:float`).
    #[must_use]
    pub fn suffixed_name(&self) -> String {
        format!("{}:{}", self.path, self.attribute_type)
    }
}

impl fmt::Display for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.attribute_type)
    }
}

/// Reference to an attribute with an optional declared type.
///
/// Undeclared types are inferred from the population by
/// [`resolve_reference`](super::resolve_reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    path: String,
    declared_type: Option<AttributeType>,
}

impl AttributeRef {
    /// Reference a path; its type will be inferred.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            declared_type: None,
        }
    }

    /// Reference a path with an explicit type.
    #[must_use]
    pub fn typed(path: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            path: path.into(),
            declared_type: Some(attribute_type),
        }
    }

    /// Return a copy with the given declared type.
    #[must_use]
    pub fn with_type(&self, attribute_type: AttributeType) -> Self {
        Self::typed(self.path.clone(), attribute_type)
    }

    /// Attribute path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared type, if any.
    #[must_use]
    pub const fn declared_type(&self) -> Option<AttributeType> {
        self.declared_type
    }

    /// The definition this reference points to, once typed.
    #[must_use]
    pub fn definition(&self) -> Option<AttributeDefinition> {
        self.declared_type
            .map(|t| AttributeDefinition::new(self.path.clone(), t))
    }
}

impl From<&str> for AttributeRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<AttributeDefinition> for AttributeRef {
    fn from(definition: AttributeDefinition) -> Self {
        Self::typed(definition.path, definition.attribute_type)
    }
}
