//! Result tables
//!
//! Three shapes, all exportable to Arrow:
//!
//! - [`Table`]: one row per entity, one column per resolved attribute.
//! - [`SeriesTable`]: one row per (entity, attribute, step).
//! - [`BucketTable`]: one row per (entity, metric, bucket).
//!
//! Column names are attribute paths, or `path:type` when type suffixes are
//! requested. Without suffixes, two types under one path is an error
//! ([`Error::ConflictingAttributeTypes`](crate::Error::ConflictingAttributeTypes)).

mod assembler;
mod export;

pub use assembler::{
    assemble_buckets, assemble_series, assemble_table, column_names, SortDirection, TableOptions,
};

use crate::attribute::{AttributeDefinition, AttributeValue};
use crate::buckets::Bucket;
use crate::entity::{EntityId, EntityKind};
use crate::series::SeriesPoint;

/// An output column bound to one (path, type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Output name
    pub name: String,
    /// Attribute behind the column
    pub definition: AttributeDefinition,
}

/// One entity's row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Entity id
    pub entity: EntityId,
    /// Entity label
    pub label: String,
    /// Cells aligned with [`Table::columns`]; `None` where the attribute is absent
    pub cells: Vec<Option<AttributeValue>>,
}

/// Scalar attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    kind: EntityKind,
    columns: Vec<Column>,
    rows: Vec<TableRow>,
}

impl Table {
    pub(crate) fn new(kind: EntityKind, columns: Vec<Column>, rows: Vec<TableRow>) -> Self {
        Self {
            kind,
            columns,
            rows,
        }
    }

    /// Entity kind of the rows.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Columns in name order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows in output order.
    #[must_use]
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Row labels in output order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (row label, column name).
    #[must_use]
    pub fn get(&self, label: &str, column: &str) -> Option<&AttributeValue> {
        let index = self.columns.iter().position(|c| c.name == column)?;
        self.rows
            .iter()
            .find(|r| r.label == label)
            .and_then(|r| r.cells.get(index))
            .and_then(Option::as_ref)
    }
}

/// One series point of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    /// Entity id
    pub entity: EntityId,
    /// Entity label
    pub label: String,
    /// Output column name of the series
    pub column: String,
    /// Series attribute
    pub definition: AttributeDefinition,
    /// The point
    pub point: SeriesPoint,
}

/// Series table, ordered by (label, column, step).
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    kind: EntityKind,
    numeric: bool,
    rows: Vec<SeriesRow>,
}

impl SeriesTable {
    pub(crate) fn new(kind: EntityKind, numeric: bool, rows: Vec<SeriesRow>) -> Self {
        Self {
            kind,
            numeric,
            rows,
        }
    }

    /// Entity kind of the rows.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Whether values are numeric.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.numeric
    }

    /// Rows in output order.
    #[must_use]
    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Points of one (label, column) series in step order.
    #[must_use]
    pub fn series(&self, label: &str, column: &str) -> Vec<&SeriesPoint> {
        self.rows
            .iter()
            .filter(|r| r.label == label && r.column == column)
            .map(|r| &r.point)
            .collect()
    }
}

/// One bucket of one (entity, metric) series.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRow {
    /// Entity id
    pub entity: EntityId,
    /// Entity label
    pub label: String,
    /// Output column name of the metric
    pub column: String,
    /// The bucket
    pub bucket: Bucket<f64>,
}

/// Bucketed metric table, ordered by (label, column, bucket index).
#[derive(Debug, Clone, PartialEq)]
pub struct BucketTable {
    kind: EntityKind,
    rows: Vec<BucketRow>,
}

impl BucketTable {
    pub(crate) fn new(kind: EntityKind, rows: Vec<BucketRow>) -> Self {
        Self { kind, rows }
    }

    /// Entity kind of the rows.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Rows in output order.
    #[must_use]
    pub fn rows(&self) -> &[BucketRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Buckets of one (label, column) series in index order.
    #[must_use]
    pub fn buckets(&self, label: &str, column: &str) -> Vec<&Bucket<f64>> {
        self.rows
            .iter()
            .filter(|r| r.label == label && r.column == column)
            .map(|r| &r.bucket)
            .collect()
    }
}
