//! Query descriptions accepted by [`Client`](super::Client)

use crate::attribute::{AttributeRef, AttributeType};
use crate::buckets::MAX_BUCKETS;
use crate::entity::{EntityKind, EntityList};
use crate::filter::{AttributeSelector, Filter};
use crate::series::SeriesWindow;
use crate::table::SortDirection;
use crate::{Error, Result};

/// Series types returned by `fetch_series_nonnumeric`.
pub const NON_NUMERIC_SERIES: [AttributeType; 3] = [
    AttributeType::StringSeries,
    AttributeType::HistogramSeries,
    AttributeType::FileSeries,
];

/// Which entities a query covers.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    kind: EntityKind,
    filter: Option<Filter>,
    within: Option<Vec<String>>,
}

impl EntityQuery {
    /// All entities of `kind`.
    #[must_use]
    pub const fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filter: None,
            within: None,
        }
    }

    /// All experiments.
    #[must_use]
    pub const fn experiments() -> Self {
        Self::new(EntityKind::Experiment)
    }

    /// All runs.
    #[must_use]
    pub const fn runs() -> Self {
        Self::new(EntityKind::Run)
    }

    /// Restrict to entities matching `filter`; repeated calls AND the filters.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(&filter),
            None => filter,
        });
        self
    }

    /// Restrict to a previously listed population.
    ///
    /// # Errors
    ///
    /// Returns `UserMisuse` if the list holds another entity kind.
    pub fn within(mut self, list: &EntityList) -> Result<Self> {
        if list.kind() != self.kind {
            return Err(Error::UserMisuse(format!(
                "cannot restrict a {} query to a list of {} entities",
                self.kind,
                list.kind()
            )));
        }
        self.within = Some(list.labels().to_vec());
        Ok(self)
    }

    /// Entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Caller filter, if any.
    #[must_use]
    pub const fn filter_expr(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Population restriction, if any.
    #[must_use]
    pub fn within_labels(&self) -> Option<&[String]> {
        self.within.as_deref()
    }
}

/// Scalar table query.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    /// Rows
    pub entities: EntityQuery,
    /// Columns
    pub attributes: AttributeSelector,
    /// Attribute to sort rows by
    pub sort_by: Option<AttributeRef>,
    /// Sort direction
    pub sort_direction: SortDirection,
    /// Keep at most this many rows
    pub limit: Option<usize>,
    /// Name columns `path:type`
    pub type_suffix_in_column_names: bool,
}

impl TableQuery {
    /// Query `attributes` of `entities`, rows ordered by label.
    #[must_use]
    pub fn new(entities: EntityQuery, attributes: AttributeSelector) -> Self {
        Self {
            entities,
            attributes,
            sort_by: None,
            sort_direction: SortDirection::default(),
            limit: None,
            type_suffix_in_column_names: false,
        }
    }

    /// Sort rows by an attribute.
    #[must_use]
    pub fn sort_by(mut self, attribute: impl Into<AttributeRef>, direction: SortDirection) -> Self {
        self.sort_by = Some(attribute.into());
        self.sort_direction = direction;
        self
    }

    /// Keep at most `limit` rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Name columns `path:type`.
    #[must_use]
    pub const fn type_suffix_in_column_names(mut self, enabled: bool) -> Self {
        self.type_suffix_in_column_names = enabled;
        self
    }
}

/// Series query.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    /// Entities
    pub entities: EntityQuery,
    /// Series attributes
    pub attributes: AttributeSelector,
    /// Step range, tail limit, previews and timestamps
    pub window: SeriesWindow,
    /// Include ancestors' history up to each fork point
    pub lineage_to_root: bool,
    /// Name series `path:type`
    pub type_suffix_in_column_names: bool,
}

impl SeriesQuery {
    /// Query `attributes` of `entities` with lineage merging on.
    #[must_use]
    pub fn new(entities: EntityQuery, attributes: AttributeSelector) -> Self {
        Self {
            entities,
            attributes,
            window: SeriesWindow::default(),
            lineage_to_root: true,
            type_suffix_in_column_names: false,
        }
    }

    /// Set the series window.
    #[must_use]
    pub const fn window(mut self, window: SeriesWindow) -> Self {
        self.window = window;
        self
    }

    /// Merge ancestor history or not.
    #[must_use]
    pub const fn lineage_to_root(mut self, enabled: bool) -> Self {
        self.lineage_to_root = enabled;
        self
    }

    /// Name series `path:type`.
    #[must_use]
    pub const fn type_suffix_in_column_names(mut self, enabled: bool) -> Self {
        self.type_suffix_in_column_names = enabled;
        self
    }
}

/// Bucketed metric query.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketQuery {
    /// Series to bucket
    pub series: SeriesQuery,
    /// Number of buckets
    pub limit: usize,
    /// Fixed `[min_step, max_step]` domain
    pub domain: Option<(f64, f64)>,
}

impl BucketQuery {
    /// Bucket `series` into the default number of buckets.
    #[must_use]
    pub const fn new(series: SeriesQuery) -> Self {
        Self {
            series,
            limit: MAX_BUCKETS,
            domain: None,
        }
    }

    /// Set the number of buckets.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Use a fixed step domain.
    #[must_use]
    pub const fn domain(mut self, min_step: f64, max_step: f64) -> Self {
        self.domain = Some((min_step, max_step));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_rejects_kind_mix() {
        let runs = EntityList::new(EntityKind::Run, vec!["run-1".into()]);
        let err = EntityQuery::experiments().within(&runs).unwrap_err();
        assert!(matches!(err, Error::UserMisuse(_)));

        let query = EntityQuery::runs().within(&runs).unwrap();
        assert_eq!(query.within_labels(), Some(&["run-1".to_string()][..]));
    }

    #[test]
    fn test_filters_are_anded() {
        let a = Filter::exists("config/lr");
        let b = Filter::exists("config/epochs");
        let query = EntityQuery::runs().filter(a.clone()).filter(b.clone());
        assert_eq!(query.filter_expr(), Some(&a.and(&b)));
    }
}
