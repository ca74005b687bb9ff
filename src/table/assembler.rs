//! Assembly of fetched records into tables

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};

use super::{BucketRow, BucketTable, Column, SeriesRow, SeriesTable, Table, TableRow};
use crate::attribute::{AttributeDefinition, AttributeValue};
use crate::buckets::Bucket;
use crate::entity::{EntityEntry, EntityId, EntityKind};
use crate::series::SeriesPoint;
use crate::service::ValueRecord;
use crate::{Error, Result};

/// Row order of a sorted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest values first
    Ascending,
    /// Largest values first
    #[default]
    Descending,
}

/// Options of a scalar table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableOptions {
    /// Name columns `path:type` instead of `path`
    pub type_suffix_in_column_names: bool,
    /// Resolved attribute to sort rows by; rows are ordered by label otherwise
    pub sort_by: Option<AttributeDefinition>,
    /// Sort direction
    pub sort_direction: SortDirection,
    /// Keep at most this many rows after sorting
    pub limit: Option<usize>,
}

/// Output columns for a set of definitions, sorted by name.
///
/// # Errors
///
/// Returns `ConflictingAttributeTypes` when a path carries several types and
/// `type_suffix` is off.
pub fn column_names(definitions: &[AttributeDefinition], type_suffix: bool) -> Result<Vec<Column>> {
    let unique: BTreeSet<&AttributeDefinition> = definitions.iter().collect();

    if !type_suffix {
        let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for definition in &unique {
            by_path
                .entry(definition.path())
                .or_default()
                .push(definition.attribute_type().name());
        }
        if let Some((path, types)) = by_path.into_iter().find(|(_, types)| types.len() > 1) {
            let mut types: Vec<String> = types.into_iter().map(str::to_string).collect();
            types.sort();
            return Err(Error::ConflictingAttributeTypes {
                path: path.to_string(),
                types,
            });
        }
    }

    let mut columns: Vec<Column> = unique
        .into_iter()
        .map(|definition| Column {
            name: if type_suffix {
                definition.suffixed_name()
            } else {
                definition.path().to_string()
            },
            definition: definition.clone(),
        })
        .collect();
    columns.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(columns)
}

fn compare_sort_keys(
    a: Option<&AttributeValue>,
    b: Option<&AttributeValue>,
    direction: SortDirection,
) -> Ordering {
    let a = a.and_then(AttributeValue::last_scalar);
    let b = b.and_then(AttributeValue::last_scalar);
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.compare(&b).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
        // missing values go last in either direction
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Build a scalar table: one row per entity, one column per definition.
///
/// # Errors
///
/// Returns `ConflictingAttributeTypes` (see [`column_names`]).
pub fn assemble_table(
    kind: EntityKind,
    entities: &[EntityEntry],
    definitions: &[AttributeDefinition],
    values: Vec<ValueRecord>,
    options: &TableOptions,
) -> Result<Table> {
    let columns = column_names(definitions, options.type_suffix_in_column_names)?;

    let mut by_entity: FxHashMap<EntityId, FxHashMap<AttributeDefinition, AttributeValue>> =
        FxHashMap::default();
    for record in values {
        by_entity
            .entry(record.entity)
            .or_default()
            .insert(record.definition, record.value);
    }

    let empty = FxHashMap::default();
    let mut seen = FxHashSet::default();
    let mut keyed: Vec<(TableRow, Option<AttributeValue>)> = entities
        .iter()
        .filter(|entry| seen.insert(&entry.id))
        .map(|entry| {
            let values = by_entity.get(&entry.id).unwrap_or(&empty);
            let cells = columns
                .iter()
                .map(|c| values.get(&c.definition).cloned())
                .collect();
            let sort_key = options
                .sort_by
                .as_ref()
                .and_then(|d| values.get(d))
                .cloned();
            let row = TableRow {
                entity: entry.id.clone(),
                label: entry.label.clone(),
                cells,
            };
            (row, sort_key)
        })
        .collect();

    keyed.sort_by(|(a, ka), (b, kb)| {
        compare_sort_keys(ka.as_ref(), kb.as_ref(), options.sort_direction)
            .then_with(|| a.label.cmp(&b.label))
    });

    let mut rows: Vec<TableRow> = keyed.into_iter().map(|(row, _)| row).collect();
    if let Some(limit) = options.limit {
        rows.truncate(limit);
    }
    Ok(Table::new(kind, columns, rows))
}

fn column_lookup(
    definitions: impl Iterator<Item = AttributeDefinition>,
    type_suffix: bool,
) -> Result<FxHashMap<AttributeDefinition, String>> {
    let definitions: Vec<AttributeDefinition> = definitions.collect();
    Ok(column_names(&definitions, type_suffix)?
        .into_iter()
        .map(|c| (c.definition, c.name))
        .collect())
}

/// Build a series table from per-(entity, attribute) point lists.
///
/// Rows are ordered by (label, column, step).
///
/// # Errors
///
/// Returns `ConflictingAttributeTypes` (see [`column_names`]).
pub fn assemble_series(
    kind: EntityKind,
    numeric: bool,
    series: Vec<(EntityEntry, AttributeDefinition, Vec<SeriesPoint>)>,
    type_suffix: bool,
) -> Result<SeriesTable> {
    let names = column_lookup(series.iter().map(|(_, d, _)| d.clone()), type_suffix)?;

    let mut rows: Vec<SeriesRow> = Vec::new();
    for (entry, definition, points) in series {
        let column = names.get(&definition).cloned().unwrap_or_default();
        rows.extend(points.into_iter().map(|point| SeriesRow {
            entity: entry.id.clone(),
            label: entry.label.clone(),
            column: column.clone(),
            definition: definition.clone(),
            point,
        }));
    }
    rows.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then_with(|| a.column.cmp(&b.column))
            .then_with(|| a.point.step.total_cmp(&b.point.step))
    });
    Ok(SeriesTable::new(kind, numeric, rows))
}

/// Build a bucket table from per-(entity, metric) buckets.
///
/// Rows are ordered by (label, column, bucket index).
///
/// # Errors
///
/// Returns `ConflictingAttributeTypes` (see [`column_names`]).
pub fn assemble_buckets(
    kind: EntityKind,
    series: Vec<(EntityEntry, AttributeDefinition, Vec<Bucket<f64>>)>,
    type_suffix: bool,
) -> Result<BucketTable> {
    let names = column_lookup(series.iter().map(|(_, d, _)| d.clone()), type_suffix)?;

    let mut rows: Vec<BucketRow> = Vec::new();
    for (entry, definition, buckets) in series {
        let column = names.get(&definition).cloned().unwrap_or_default();
        rows.extend(buckets.into_iter().map(|bucket| BucketRow {
            entity: entry.id.clone(),
            label: entry.label.clone(),
            column: column.clone(),
            bucket,
        }));
    }
    rows.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then_with(|| a.column.cmp(&b.column))
            .then_with(|| a.bucket.index.cmp(&b.bucket.index))
    });
    Ok(BucketTable::new(kind, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeType, FloatSeriesAggregates};
    use crate::series::SeriesValue;

    fn entry(id: &str, label: &str) -> EntityEntry {
        EntityEntry {
            id: EntityId::new(id),
            label: label.to_string(),
        }
    }

    fn def(path: &str, t: AttributeType) -> AttributeDefinition {
        AttributeDefinition::new(path, t)
    }

    fn value(entity: &str, definition: &AttributeDefinition, value: AttributeValue) -> ValueRecord {
        ValueRecord {
            entity: EntityId::new(entity),
            definition: definition.clone(),
            value,
        }
    }

    #[test]
    fn test_conflicting_types_without_suffix() {
        let defs = [
            def("config/batch_size", AttributeType::Int),
            def("config/batch_size", AttributeType::Float),
            def("config/lr", AttributeType::Float),
        ];
        let err = column_names(&defs, false).unwrap_err();
        match err {
            Error::ConflictingAttributeTypes { path, types } => {
                assert_eq!(path, "config/batch_size");
                assert_eq!(types, vec!["float".to_string(), "int".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let names: Vec<String> = column_names(&defs, true)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec!["config/batch_size:float", "config/batch_size:int", "config/lr:float"]
        );
    }

    #[test]
    fn test_duplicate_definitions_collapse() {
        let defs = [
            def("config/lr", AttributeType::Float),
            def("config/lr", AttributeType::Float),
        ];
        assert_eq!(column_names(&defs, false).unwrap().len(), 1);
    }

    #[test]
    fn test_sort_missing_last_ties_by_label() {
        let acc = def("metrics/acc", AttributeType::Float);
        let entities = [
            entry("1", "d"),
            entry("2", "b"),
            entry("3", "a"),
            entry("4", "c"),
        ];
        let values = vec![
            value("1", &acc, AttributeValue::Float(0.5)),
            value("2", &acc, AttributeValue::Float(0.9)),
            value("4", &acc, AttributeValue::Float(0.5)),
        ];
        let mut options = TableOptions {
            sort_by: Some(acc.clone()),
            ..TableOptions::default()
        };

        let table =
            assemble_table(EntityKind::Run, &entities, &[acc.clone()], values.clone(), &options)
                .unwrap();
        assert_eq!(table.labels(), vec!["b", "c", "d", "a"]);

        options.sort_direction = SortDirection::Ascending;
        options.limit = Some(3);
        let table = assemble_table(EntityKind::Run, &entities, &[acc], values, &options).unwrap();
        assert_eq!(table.labels(), vec!["c", "d", "b"]);
    }

    #[test]
    fn test_sort_by_series_uses_last_value() {
        let loss = def("metrics/loss", AttributeType::FloatSeries);
        let series = |points: &[(f64, f64)]| {
            AttributeValue::FloatSeries(
                FloatSeriesAggregates::from_points(points.iter().copied()).unwrap(),
            )
        };
        let values = vec![
            value("1", &loss, series(&[(1.0, 0.1), (2.0, 0.9)])),
            value("2", &loss, series(&[(1.0, 0.8), (2.0, 0.2)])),
        ];
        let options = TableOptions {
            sort_by: Some(loss.clone()),
            sort_direction: SortDirection::Ascending,
            ..TableOptions::default()
        };
        let table = assemble_table(
            EntityKind::Experiment,
            &[entry("1", "x"), entry("2", "y")],
            &[loss],
            values,
            &options,
        )
        .unwrap();
        assert_eq!(table.labels(), vec!["y", "x"]);
    }

    #[test]
    fn test_table_cells() {
        let lr = def("config/lr", AttributeType::Float);
        let name = def("sys/name", AttributeType::String);
        let table = assemble_table(
            EntityKind::Experiment,
            &[entry("1", "exp-b"), entry("2", "exp-a")],
            &[name.clone(), lr.clone()],
            vec![
                value("1", &lr, AttributeValue::Float(0.01)),
                value("2", &name, AttributeValue::String("exp-a".into())),
            ],
            &TableOptions::default(),
        )
        .unwrap();

        assert_eq!(table.column_names(), vec!["config/lr", "sys/name"]);
        assert_eq!(table.labels(), vec!["exp-a", "exp-b"]);
        assert_eq!(table.get("exp-b", "config/lr"), Some(&AttributeValue::Float(0.01)));
        assert_eq!(table.get("exp-a", "config/lr"), None);
    }

    #[test]
    fn test_series_rows_canonical_order() {
        let loss = def("metrics/loss", AttributeType::FloatSeries);
        let acc = def("metrics/acc", AttributeType::FloatSeries);
        let points = |steps: &[f64]| -> Vec<SeriesPoint> {
            steps
                .iter()
                .map(|&s| SeriesPoint::new(s, SeriesValue::Float(s)))
                .collect()
        };
        let table = assemble_series(
            EntityKind::Run,
            true,
            vec![
                (entry("2", "run-b"), loss.clone(), points(&[2.0, 1.0])),
                (entry("1", "run-a"), loss, points(&[1.0])),
                (entry("1", "run-a"), acc, points(&[5.0])),
            ],
            false,
        )
        .unwrap();

        let order: Vec<(&str, &str, f64)> = table
            .rows()
            .iter()
            .map(|r| (r.label.as_str(), r.column.as_str(), r.point.step))
            .collect();
        assert_eq!(
            order,
            vec![
                ("run-a", "metrics/acc", 5.0),
                ("run-a", "metrics/loss", 1.0),
                ("run-b", "metrics/loss", 1.0),
                ("run-b", "metrics/loss", 2.0),
            ]
        );
        assert_eq!(table.series("run-b", "metrics/loss").len(), 2);
    }
}
