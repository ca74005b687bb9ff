//! Attribute type resolution
//!
//! Pure functions of a reference (or selector, or filter tree) and the
//! definitions observed in the population. The caller does the single
//! schema round-trip; nothing here performs I/O.

use std::collections::BTreeSet;

use tracing::warn;

use super::{AttributeDefinition, AttributeRef, AttributeType};
use crate::filter::{AttributeSelector, Filter};
use crate::{Error, Result};

fn observed_types(path: &str, observed: &[AttributeDefinition]) -> BTreeSet<AttributeType> {
    observed
        .iter()
        .filter(|d| d.path() == path)
        .map(AttributeDefinition::attribute_type)
        .collect()
}

fn inference_error(path: &str, types: &BTreeSet<AttributeType>) -> Error {
    Error::AttributeTypeInference {
        path: path.to_string(),
        types: types.iter().map(ToString::to_string).collect(),
    }
}

/// Resolve a single attribute reference.
///
/// - A declared type is used as is; `observed` is not inspected.
/// - Exactly one observed type is inferred.
/// - Two or more observed types fail with `AttributeTypeInference`.
/// - No observed type yields `None`.
///
/// # Errors
///
/// Returns `AttributeTypeInference` when the type is ambiguous.
pub fn resolve_reference(
    reference: &AttributeRef,
    observed: &[AttributeDefinition],
) -> Result<Option<AttributeDefinition>> {
    if let Some(definition) = reference.definition() {
        return Ok(Some(definition));
    }

    let types = observed_types(reference.path(), observed);
    match types.len() {
        0 => Ok(None),
        1 => Ok(types
            .into_iter()
            .next()
            .map(|t| AttributeDefinition::new(reference.path(), t))),
        _ => Err(inference_error(reference.path(), &types)),
    }
}

/// Resolve a selector to every matching observed definition, sorted and unique.
///
/// `Attribute` parts follow the strict rules of [`resolve_reference`]; every
/// other part keeps all observed (path, type) pairs.
///
/// # Errors
///
/// Returns `AttributeTypeInference` for an ambiguous `Attribute` part.
pub fn resolve_selector(
    selector: &AttributeSelector,
    observed: &[AttributeDefinition],
) -> Result<Vec<AttributeDefinition>> {
    let mut resolved = BTreeSet::new();
    for part in selector.clone().split() {
        match &part {
            AttributeSelector::Attribute(reference) => {
                resolved.extend(resolve_reference(reference, observed)?);
            }
            other => {
                resolved.extend(observed.iter().filter(|d| other.matches(d)).cloned());
            }
        }
    }
    Ok(resolved.into_iter().collect())
}

/// Whether resolving `selector` needs the population's schema.
///
/// Only fully-typed `Attribute` selectors can skip the round-trip.
#[must_use]
pub fn selector_needs_schema(selector: &AttributeSelector) -> bool {
    selector.clone().split().iter().any(|part| {
        !matches!(part, AttributeSelector::Attribute(r) if r.declared_type().is_some())
    })
}

/// Paths of filter leaves without a declared type, sorted and unique.
#[must_use]
pub fn unresolved_paths(filter: &Filter) -> Vec<String> {
    filter
        .attributes()
        .into_iter()
        .filter(|a| a.declared_type().is_none())
        .map(|a| a.path().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Return a copy of `filter` with every leaf typed.
///
/// Untyped leaves follow [`resolve_reference`]. A path nobody logged falls
/// back to the type implied by its leaf (the literal's type, `string` for
/// regex matches and existence checks, `string_set` for containment).
///
/// # Errors
///
/// Returns `AttributeTypeInference` for ambiguous paths and `InvalidFilter`
/// when the inferred type does not fit the leaf.
pub fn resolve_filter(filter: &Filter, observed: &[AttributeDefinition]) -> Result<Filter> {
    filter.map_attributes(&mut |node, attribute| {
        if attribute.declared_type().is_some() {
            return Ok(attribute.clone());
        }
        if let Some(definition) = resolve_reference(attribute, observed)? {
            return Ok(AttributeRef::from(definition));
        }
        let fallback = node.implied_type().ok_or_else(|| {
            Error::InvalidFilter(format!("cannot type attribute '{}'", attribute.path()))
        })?;
        warn!(
            path = attribute.path(),
            fallback = %fallback,
            "attribute not found in the population, typing filter leaf from its operand"
        );
        Ok(attribute.with_type(fallback))
    })
}
