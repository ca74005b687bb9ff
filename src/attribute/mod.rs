//! Attributes: typed, path-named metadata attached to entities
//!
//! - [`AttributeType`] - the closed set of eleven attribute types
//! - [`AttributeDefinition`] - a concrete (path, type) pair
//! - [`AttributeRef`] - a path with an optional declared type
//! - [`AttributeValue`] - one variant per type, decoded at the service boundary
//!
//! The resolver functions turn references, selectors and filter trees into
//! concrete definitions given the definitions observed in the population.

mod resolver;
mod types;
mod value;

pub use resolver::{
    resolve_filter, resolve_reference, resolve_selector, selector_needs_schema, unresolved_paths,
};
pub use types::{AttributeDefinition, AttributeRef, AttributeType};
pub use value::{
    AttributeValue, FileRef, FloatSeriesAggregates, Histogram, ScalarRef, SeriesLast,
};
