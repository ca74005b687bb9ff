//! Boolean predicates over entity names and attributes
//!
//! A [`Filter`] is an immutable tree. Combinators ([`Filter::and`],
//! [`Filter::or`], [`Filter::not`]) share their operands and return a new
//! tree; nothing is ever mutated in place.
//!
//! Filters are evaluated by the metadata service. [`Filter::compile`]
//! serializes a fully-typed tree to the remote predicate language; the
//! [`eval`] module holds a local evaluator used by the in-memory service.
//!
//! ## Series comparisons
//!
//! Comparing a series-typed attribute always compares its **last logged
//! value**. The compiled query makes this explicit with `last(...)`.
//!
//! ## Example
//!
//! ```rust
//! use trueno_fetch::attribute::{AttributeRef, AttributeType};
//! use trueno_fetch::entity::EntityKind;
//! use trueno_fetch::filter::Filter;
//!
//! # fn main() -> trueno_fetch::Result<()> {
//! let lr = AttributeRef::typed("config/lr", AttributeType::Float);
//! let loss = AttributeRef::typed("metrics/loss", AttributeType::FloatSeries);
//!
//! let filter = Filter::gt(lr, 0.01)?.and(&Filter::lt(loss, 0.5)?);
//! let compiled = filter.compile(EntityKind::Experiment)?;
//! assert_eq!(
//!     compiled.query(),
//!     "((`config/lr`:float > 0.01) AND (last(`metrics/loss`:floatSeries) < 0.5))"
//! );
//! # Ok(())
//! # }
//! ```

mod attribute_filter;
pub mod eval;
mod pattern;

pub use attribute_filter::{AttributeFilter, AttributeSelector};
pub use pattern::{ExtendedRegex, PatternTerm};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::attribute::{AttributeRef, AttributeType};
use crate::entity::EntityKind;
use crate::{Error, Result};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater or equal
    Ge,
    /// Less than
    Lt,
    /// Less or equal
    Le,
}

impl CompareOp {
    /// Operator symbol in the remote predicate language.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Whether the operator needs an ordering (not just equality).
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

/// Literal operand of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float (non-finite values are rejected by the service, not locally)
    Float(f64),
    /// String
    String(String),
    /// Timestamp
    Datetime(DateTime<Utc>),
}

impl Literal {
    /// Attribute type a literal implies when the attribute type is unknown.
    #[must_use]
    pub const fn implied_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Int(_) => AttributeType::Int,
            Self::Float(_) => AttributeType::Float,
            Self::String(_) => AttributeType::String,
            Self::Datetime(_) => AttributeType::Datetime,
        }
    }

    /// Whether an attribute of type `attribute_type` can be compared with this literal.
    #[must_use]
    pub const fn is_comparable_with(&self, attribute_type: AttributeType) -> bool {
        match self {
            Self::Int(_) | Self::Float(_) => attribute_type.is_numeric(),
            Self::String(_) => attribute_type.is_textual(),
            Self::Bool(_) => matches!(attribute_type, AttributeType::Bool),
            Self::Datetime(_) => matches!(attribute_type, AttributeType::Datetime),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) if v.is_nan() => f.write_str("NaN"),
            Self::Float(v) if v.is_infinite() && *v > 0.0 => f.write_str("Infinity"),
            Self::Float(v) if v.is_infinite() => f.write_str("-Infinity"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::String(v) => f.write_str(&quote(v)),
            Self::Datetime(v) => f.write_str(&quote(&v.to_rfc3339_opts(SecondsFormat::Millis, true))),
        }
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Datetime(v)
    }
}

/// Entity-name predicate
#[derive(Debug, Clone, PartialEq)]
pub enum NameMatch {
    /// Label matches an extended regex
    Pattern(ExtendedRegex),
    /// Label is one of the given names
    Exact(Vec<String>),
}

/// Node of a predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Entity label predicate
    Name(NameMatch),
    /// `attribute <op> literal`
    Compare {
        /// Compared attribute
        attribute: AttributeRef,
        /// Operator
        op: CompareOp,
        /// Right-hand side
        literal: Literal,
    },
    /// String attribute matches an extended regex
    Match {
        /// Matched attribute
        attribute: AttributeRef,
        /// Pattern
        pattern: ExtendedRegex,
    },
    /// String set contains every value
    ContainsAll {
        /// String-set attribute
        attribute: AttributeRef,
        /// Required values
        values: Vec<String>,
    },
    /// String set contains none of the values
    ContainsNone {
        /// String-set attribute
        attribute: AttributeRef,
        /// Forbidden values
        values: Vec<String>,
    },
    /// Attribute is present
    Exists(AttributeRef),
    /// Negation
    Not(Filter),
    /// Conjunction
    And(Filter, Filter),
    /// Disjunction
    Or(Filter, Filter),
}

impl FilterNode {
    /// Attribute referenced by a leaf, if any.
    #[must_use]
    pub const fn attribute(&self) -> Option<&AttributeRef> {
        match self {
            Self::Compare { attribute, .. }
            | Self::Match { attribute, .. }
            | Self::ContainsAll { attribute, .. }
            | Self::ContainsNone { attribute, .. }
            | Self::Exists(attribute) => Some(attribute),
            Self::Name(_) | Self::Not(_) | Self::And(..) | Self::Or(..) => None,
        }
    }

    /// Type a leaf implies for its attribute when nothing is known about it.
    #[must_use]
    pub const fn implied_type(&self) -> Option<AttributeType> {
        match self {
            Self::Compare { literal, .. } => Some(literal.implied_type()),
            Self::Match { .. } | Self::Exists(_) => Some(AttributeType::String),
            Self::ContainsAll { .. } | Self::ContainsNone { .. } => Some(AttributeType::StringSet),
            Self::Name(_) | Self::Not(_) | Self::And(..) | Self::Or(..) => None,
        }
    }
}

/// Immutable predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(Arc<FilterNode>);

impl Filter {
    fn from_node(node: FilterNode) -> Self {
        Self(Arc::new(node))
    }

    /// Root node.
    #[must_use]
    pub fn node(&self) -> &FilterNode {
        &self.0
    }

    /// Entity label matches an extended regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the pattern does not compile.
    pub fn name_matches(pattern: &str) -> Result<Self> {
        Ok(Self::from_node(FilterNode::Name(NameMatch::Pattern(
            ExtendedRegex::parse(pattern)?,
        ))))
    }

    /// Entity label is one of `names`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if `names` is empty.
    pub fn name_in<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::InvalidFilter(
                "name list must contain at least one name".to_string(),
            ));
        }
        Ok(Self::from_node(FilterNode::Name(NameMatch::Exact(names))))
    }

    /// `attribute <op> literal`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the literal cannot be ordered (booleans with
    /// `<`, `>`, ...) or the attribute's declared type is not comparable with
    /// the literal.
    pub fn compare(
        attribute: impl Into<AttributeRef>,
        op: CompareOp,
        literal: impl Into<Literal>,
    ) -> Result<Self> {
        let attribute = attribute.into();
        let literal = literal.into();

        if op.is_ordering() && matches!(literal, Literal::Bool(_)) {
            return Err(Error::InvalidFilter(format!(
                "operator '{}' cannot be applied to a boolean literal",
                op.symbol()
            )));
        }
        if let Some(declared) = attribute.declared_type() {
            if !literal.is_comparable_with(declared) {
                return Err(Error::InvalidFilter(format!(
                    "attribute '{}' of type {declared} is not comparable with {literal}",
                    attribute.path()
                )));
            }
        }

        Ok(Self::from_node(FilterNode::Compare {
            attribute,
            op,
            literal,
        }))
    }

    /// `attribute = literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn eq(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Eq, literal)
    }

    /// `attribute != literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn ne(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Ne, literal)
    }

    /// `attribute > literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn gt(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Gt, literal)
    }

    /// `attribute >= literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn ge(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Ge, literal)
    }

    /// `attribute < literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn lt(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Lt, literal)
    }

    /// `attribute <= literal`.
    ///
    /// # Errors
    ///
    /// See [`Filter::compare`].
    pub fn le(attribute: impl Into<AttributeRef>, literal: impl Into<Literal>) -> Result<Self> {
        Self::compare(attribute, CompareOp::Le, literal)
    }

    /// String attribute matches an extended regex.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` for a bad pattern or a non-string attribute type.
    pub fn matches(attribute: impl Into<AttributeRef>, pattern: &str) -> Result<Self> {
        let attribute = attribute.into();
        check_matchable(&attribute)?;
        Ok(Self::from_node(FilterNode::Match {
            attribute,
            pattern: ExtendedRegex::parse(pattern)?,
        }))
    }

    /// String set contains every value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` for an empty value list or a non-set attribute type.
    pub fn contains_all<I, S>(attribute: impl Into<AttributeRef>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (attribute, values) = validate_contains(attribute.into(), values)?;
        Ok(Self::from_node(FilterNode::ContainsAll { attribute, values }))
    }

    /// String set contains none of the values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` for an empty value list or a non-set attribute type.
    pub fn contains_none<I, S>(attribute: impl Into<AttributeRef>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (attribute, values) = validate_contains(attribute.into(), values)?;
        Ok(Self::from_node(FilterNode::ContainsNone { attribute, values }))
    }

    /// Attribute exists.
    #[must_use]
    pub fn exists(attribute: impl Into<AttributeRef>) -> Self {
        Self::from_node(FilterNode::Exists(attribute.into()))
    }

    /// Conjunction of `self` and `other`.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        Self::from_node(FilterNode::And(self.clone(), other.clone()))
    }

    /// Disjunction of `self` and `other`.
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        Self::from_node(FilterNode::Or(self.clone(), other.clone()))
    }

    /// Negation of `self`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Self {
        Self::from_node(FilterNode::Not(self.clone()))
    }

    /// Conjunction of every filter, `None` for an empty input.
    #[must_use]
    pub fn all(filters: impl IntoIterator<Item = Self>) -> Option<Self> {
        filters.into_iter().reduce(|acc, f| acc.and(&f))
    }

    /// Every attribute reference in the tree, in depth-first order.
    #[must_use]
    pub fn attributes(&self) -> Vec<&AttributeRef> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a AttributeRef>) {
        match self.node() {
            FilterNode::Not(inner) => inner.collect_attributes(out),
            FilterNode::And(a, b) | FilterNode::Or(a, b) => {
                a.collect_attributes(out);
                b.collect_attributes(out);
            }
            leaf => out.extend(leaf.attribute()),
        }
    }

    /// Rebuild the tree with every leaf attribute passed through `f`.
    ///
    /// Leaves are re-validated against their new attribute type. Subtrees
    /// whose attributes come back unchanged are shared with `self`.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from leaf re-validation.
    pub fn map_attributes<F>(&self, f: &mut F) -> Result<Self>
    where
        F: FnMut(&FilterNode, &AttributeRef) -> Result<AttributeRef>,
    {
        let node = self.node();
        let rebuilt = match node {
            FilterNode::Name(_) => return Ok(self.clone()),
            FilterNode::Not(inner) => {
                let mapped = inner.map_attributes(f)?;
                if mapped.ptr_eq(inner) {
                    return Ok(self.clone());
                }
                FilterNode::Not(mapped)
            }
            FilterNode::And(a, b) | FilterNode::Or(a, b) => {
                let (ma, mb) = (a.map_attributes(f)?, b.map_attributes(f)?);
                if ma.ptr_eq(a) && mb.ptr_eq(b) {
                    return Ok(self.clone());
                }
                if matches!(node, FilterNode::And(..)) {
                    FilterNode::And(ma, mb)
                } else {
                    FilterNode::Or(ma, mb)
                }
            }
            FilterNode::Compare {
                attribute,
                op,
                literal,
            } => {
                let mapped = f(node, attribute)?;
                if mapped == *attribute {
                    return Ok(self.clone());
                }
                return Self::compare(mapped, *op, literal.clone());
            }
            FilterNode::Match { attribute, pattern } => {
                let mapped = f(node, attribute)?;
                if mapped == *attribute {
                    return Ok(self.clone());
                }
                check_matchable(&mapped)?;
                FilterNode::Match {
                    attribute: mapped,
                    pattern: pattern.clone(),
                }
            }
            FilterNode::ContainsAll { attribute, values } => {
                let mapped = f(node, attribute)?;
                if mapped == *attribute {
                    return Ok(self.clone());
                }
                let (attribute, values) = validate_contains(mapped, values.iter().cloned())?;
                FilterNode::ContainsAll { attribute, values }
            }
            FilterNode::ContainsNone { attribute, values } => {
                let mapped = f(node, attribute)?;
                if mapped == *attribute {
                    return Ok(self.clone());
                }
                let (attribute, values) = validate_contains(mapped, values.iter().cloned())?;
                FilterNode::ContainsNone { attribute, values }
            }
            FilterNode::Exists(attribute) => {
                let mapped = f(node, attribute)?;
                if mapped == *attribute {
                    return Ok(self.clone());
                }
                FilterNode::Exists(mapped)
            }
        };
        Ok(Self::from_node(rebuilt))
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether any comparison uses a NaN or infinite literal.
    #[must_use]
    pub fn has_non_finite_literal(&self) -> bool {
        match self.node() {
            FilterNode::Compare {
                literal: Literal::Float(v),
                ..
            } => !v.is_finite(),
            FilterNode::Not(inner) => inner.has_non_finite_literal(),
            FilterNode::And(a, b) | FilterNode::Or(a, b) => {
                a.has_non_finite_literal() || b.has_non_finite_literal()
            }
            _ => false,
        }
    }

    /// Serialize to the remote predicate language.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if a leaf attribute has no resolved type.
    pub fn compile(&self, kind: EntityKind) -> Result<CompiledFilter> {
        let mut query = String::new();
        write_filter(self, kind, &mut query)?;
        Ok(CompiledFilter {
            kind,
            tree: self.clone(),
            query,
        })
    }
}

/// A typed filter together with its serialized form.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    kind: EntityKind,
    tree: Filter,
    query: String,
}

impl CompiledFilter {
    /// Entity kind the predicate was compiled for.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The typed tree.
    #[must_use]
    pub const fn tree(&self) -> &Filter {
        &self.tree
    }

    /// Serialized predicate.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

fn check_matchable(attribute: &AttributeRef) -> Result<()> {
    match attribute.declared_type() {
        Some(declared) if !declared.is_textual() && declared != AttributeType::StringSet => {
            Err(Error::InvalidFilter(format!(
                "attribute '{}' of type {declared} cannot be matched against a regex",
                attribute.path()
            )))
        }
        _ => Ok(()),
    }
}

fn validate_contains<I, S>(attribute: AttributeRef, values: I) -> Result<(AttributeRef, Vec<String>)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if let Some(declared) = attribute.declared_type() {
        if declared != AttributeType::StringSet {
            return Err(Error::InvalidFilter(format!(
                "attribute '{}' of type {declared} is not a string set",
                attribute.path()
            )));
        }
    }
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "containment check on '{}' needs at least one value",
            attribute.path()
        )));
    }
    Ok((attribute, values))
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn typed_path(attribute: &AttributeRef) -> Result<String> {
    let attribute_type = attribute.declared_type().ok_or_else(|| {
        Error::InvalidFilter(format!(
            "attribute '{}' has no resolved type; resolve the filter before compiling",
            attribute.path()
        ))
    })?;
    let path = format!("`{}`:{}", attribute.path(), attribute_type.backend_name());
    if attribute_type.is_series() {
        Ok(format!("last({path})"))
    } else {
        Ok(path)
    }
}

fn write_pattern(subject: &str, pattern: &ExtendedRegex, out: &mut String) {
    let term = |t: &PatternTerm| {
        let op = if t.is_negated() { "NOT MATCHES" } else { "MATCHES" };
        format!("({subject} {op} {})", quote(t.regex()))
    };

    if let [single] = pattern.alternatives() {
        if let [only] = single.as_slice() {
            out.push_str(&term(only));
            return;
        }
    }

    let alternatives: Vec<String> = pattern
        .alternatives()
        .iter()
        .map(|terms| {
            let joined: Vec<String> = terms.iter().map(term).collect();
            format!("({})", joined.join(" AND "))
        })
        .collect();
    out.push('(');
    out.push_str(&alternatives.join(" OR "));
    out.push(')');
}

fn write_filter(filter: &Filter, kind: EntityKind, out: &mut String) -> Result<()> {
    match filter.node() {
        FilterNode::Name(NameMatch::Pattern(pattern)) => {
            let subject = format!("`{}`:string", kind.label_attribute());
            write_pattern(&subject, pattern, out);
        }
        FilterNode::Name(NameMatch::Exact(names)) => {
            let subject = format!("`{}`:string", kind.label_attribute());
            let clauses: Vec<String> = names
                .iter()
                .map(|n| format!("{subject} = {}", quote(n)))
                .collect();
            out.push('(');
            out.push_str(&clauses.join(" OR "));
            out.push(')');
        }
        FilterNode::Compare {
            attribute,
            op,
            literal,
        } => {
            out.push_str(&format!(
                "({} {} {literal})",
                typed_path(attribute)?,
                op.symbol()
            ));
        }
        FilterNode::Match { attribute, pattern } => {
            write_pattern(&typed_path(attribute)?, pattern, out);
        }
        FilterNode::ContainsAll { attribute, values } | FilterNode::ContainsNone { attribute, values } => {
            let op = if matches!(filter.node(), FilterNode::ContainsAll { .. }) {
                "CONTAINS"
            } else {
                "NOT CONTAINS"
            };
            let subject = typed_path(attribute)?;
            let clauses: Vec<String> = values
                .iter()
                .map(|v| format!("{subject} {op} {}", quote(v)))
                .collect();
            out.push('(');
            out.push_str(&clauses.join(" AND "));
            out.push(')');
        }
        FilterNode::Exists(attribute) => {
            out.push_str(&format!("({} EXISTS)", typed_path(attribute)?));
        }
        FilterNode::Not(inner) => {
            out.push_str("(NOT ");
            write_filter(inner, kind, out)?;
            out.push(')');
        }
        FilterNode::And(a, b) | FilterNode::Or(a, b) => {
            let op = if matches!(filter.node(), FilterNode::And(..)) {
                " AND "
            } else {
                " OR "
            };
            out.push('(');
            write_filter(a, kind, out)?;
            out.push_str(op);
            write_filter(b, kind, out)?;
            out.push(')');
        }
    }
    Ok(())
}
