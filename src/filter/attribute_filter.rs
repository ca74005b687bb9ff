//! Attribute selection - which (path, type) pairs a query returns

use super::ExtendedRegex;
use crate::attribute::{AttributeDefinition, AttributeRef, AttributeType};
use crate::Result;

/// Selects attribute definitions by name and type.
///
/// An empty filter selects every attribute. Name pattern, exact names and
/// types are combined with AND.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeFilter {
    pattern: Option<ExtendedRegex>,
    names: Option<Vec<String>>,
    types: Vec<AttributeType>,
}

impl AttributeFilter {
    /// Filter that selects every attribute.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to paths matching an extended regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the pattern does not compile.
    pub fn name_matches(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(ExtendedRegex::parse(pattern)?);
        Ok(self)
    }

    /// Restrict to the given exact paths.
    #[must_use]
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given types.
    #[must_use]
    pub fn types(mut self, types: impl IntoIterator<Item = AttributeType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Name pattern, if set.
    #[must_use]
    pub const fn pattern(&self) -> Option<&ExtendedRegex> {
        self.pattern.as_ref()
    }

    /// Exact names, if set.
    #[must_use]
    pub fn exact_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Type restriction (empty means all types).
    #[must_use]
    pub fn type_restriction(&self) -> &[AttributeType] {
        &self.types
    }

    /// Whether a definition is selected.
    #[must_use]
    pub fn matches(&self, definition: &AttributeDefinition) -> bool {
        let name_ok = self
            .pattern
            .as_ref()
            .map_or(true, |p| p.is_match(definition.path()));
        let exact_ok = self
            .names
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == definition.path()));
        let type_ok = self.types.is_empty() || self.types.contains(&definition.attribute_type());
        name_ok && exact_ok && type_ok
    }
}

/// Attribute selector accepted by the query entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSelector {
    /// Paths matching an extended regex
    Pattern(ExtendedRegex),
    /// Exact paths (any type)
    Exact(Vec<String>),
    /// One attribute; an untyped reference must resolve to a single type
    Attribute(AttributeRef),
    /// Name + type filter
    Filter(AttributeFilter),
    /// Union of selectors
    Any(Vec<AttributeSelector>),
}

impl AttributeSelector {
    /// Selector from an extended regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::Pattern(ExtendedRegex::parse(pattern)?))
    }

    /// Selector for exact paths.
    #[must_use]
    pub fn exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exact(names.into_iter().map(Into::into).collect())
    }

    /// Union of two selectors, flattening nested unions.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let mut parts = self.split();
        parts.extend(other.split());
        Self::Any(parts)
    }

    /// Flatten into non-union selectors.
    ///
    /// Each part is resolved on its own; results are de-duplicated by the caller.
    #[must_use]
    pub fn split(self) -> Vec<Self> {
        match self {
            Self::Any(parts) => parts.into_iter().flat_map(Self::split).collect(),
            other => vec![other],
        }
    }

    /// Whether a definition is selected.
    #[must_use]
    pub fn matches(&self, definition: &AttributeDefinition) -> bool {
        match self {
            Self::Pattern(p) => p.is_match(definition.path()),
            Self::Exact(names) => names.iter().any(|n| n == definition.path()),
            Self::Attribute(r) => {
                r.path() == definition.path()
                    && r
                        .declared_type()
                        .map_or(true, |t| t == definition.attribute_type())
            }
            Self::Filter(f) => f.matches(definition),
            Self::Any(parts) => parts.iter().any(|p| p.matches(definition)),
        }
    }
}

impl From<AttributeRef> for AttributeSelector {
    fn from(attribute: AttributeRef) -> Self {
        Self::Attribute(attribute)
    }
}

impl From<AttributeFilter> for AttributeSelector {
    fn from(filter: AttributeFilter) -> Self {
        Self::Filter(filter)
    }
}
