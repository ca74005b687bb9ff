//! Local predicate evaluation
//!
//! The query path never evaluates filters itself; the metadata service does.
//! This evaluator gives the in-memory service (and the property tests) the
//! same semantics the remote service applies:
//!
//! - a leaf on a missing attribute is `false`;
//! - series attributes compare their last logged value;
//! - `Not` is plain negation, so De Morgan's laws hold.

use std::cmp::Ordering;

use super::{CompareOp, Filter, FilterNode, Literal, NameMatch};
use crate::attribute::{AttributeRef, AttributeValue, ScalarRef};

/// Something a filter can be evaluated against.
pub trait Record {
    /// Entity label (experiment name or custom run id).
    fn label(&self) -> &str;

    /// Value of the referenced attribute, if present.
    ///
    /// An untyped reference matches any type at the path.
    fn attribute(&self, attribute: &AttributeRef) -> Option<&AttributeValue>;
}

/// Evaluate `filter` against `record`.
#[must_use]
pub fn evaluate<R: Record + ?Sized>(filter: &Filter, record: &R) -> bool {
    match filter.node() {
        FilterNode::Name(NameMatch::Pattern(pattern)) => pattern.is_match(record.label()),
        FilterNode::Name(NameMatch::Exact(names)) => names.iter().any(|n| n == record.label()),
        FilterNode::Compare {
            attribute,
            op,
            literal,
        } => record
            .attribute(attribute)
            .and_then(AttributeValue::last_scalar)
            .and_then(|value| value.compare(&literal_scalar(literal)))
            .is_some_and(|ordering| op_holds(*op, ordering)),
        FilterNode::Match { attribute, pattern } => record
            .attribute(attribute)
            .is_some_and(|value| value.match_targets().into_iter().any(|t| pattern.is_match(t))),
        FilterNode::ContainsAll { attribute, values } => match record.attribute(attribute) {
            Some(AttributeValue::StringSet(set)) => values.iter().all(|v| set.contains(v)),
            _ => false,
        },
        FilterNode::ContainsNone { attribute, values } => match record.attribute(attribute) {
            Some(AttributeValue::StringSet(set)) => !values.iter().any(|v| set.contains(v)),
            _ => false,
        },
        FilterNode::Exists(attribute) => record.attribute(attribute).is_some(),
        FilterNode::Not(inner) => !evaluate(inner, record),
        FilterNode::And(a, b) => evaluate(a, record) && evaluate(b, record),
        FilterNode::Or(a, b) => evaluate(a, record) || evaluate(b, record),
    }
}

fn literal_scalar(literal: &Literal) -> ScalarRef<'_> {
    match literal {
        Literal::Bool(v) => ScalarRef::Bool(*v),
        Literal::Int(v) => ScalarRef::Int(*v),
        Literal::Float(v) => ScalarRef::Float(*v),
        Literal::String(v) => ScalarRef::Str(v),
        Literal::Datetime(v) => ScalarRef::Datetime(*v),
    }
}

const fn op_holds(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => matches!(ordering, Ordering::Equal),
        CompareOp::Ne => !matches!(ordering, Ordering::Equal),
        CompareOp::Gt => matches!(ordering, Ordering::Greater),
        CompareOp::Ge => !matches!(ordering, Ordering::Less),
        CompareOp::Lt => matches!(ordering, Ordering::Less),
        CompareOp::Le => !matches!(ordering, Ordering::Greater),
    }
}
