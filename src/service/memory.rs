//! In-memory metadata service using `DashMap`.
//!
//! Holds a synthetic population of experiments and runs, evaluates filters
//! locally with [`crate::filter::eval`] and pages every listing. Failures and
//! latency can be injected per method to exercise the retry machinery.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use dashmap::DashMap;
use rustc_hash::FxHashSet;

use super::{
    Cursor, DefinitionsRequest, LineageRequest, MetadataService, Page, SearchRequest,
    SeriesRecord, SeriesRequest, ServiceError, ServiceResult, ValueRecord, ValuesRequest,
};
use crate::attribute::{
    AttributeDefinition, AttributeRef, AttributeType, AttributeValue, FloatSeriesAggregates,
    SeriesLast,
};
use crate::entity::{EntityEntry, EntityId, EntityKind};
use crate::filter::eval::{self, Record};
use crate::lineage::{Lineage, LineageLink};
use crate::metadata::RequestContext;
use crate::series::{SeriesPoint, SeriesValue};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Service method, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMethod {
    /// `search_entities`
    SearchEntities,
    /// `list_attribute_definitions`
    ListAttributeDefinitions,
    /// `fetch_attribute_values`
    FetchAttributeValues,
    /// `fetch_series`
    FetchSeries,
    /// `fetch_lineage`
    FetchLineage,
}

/// One stored experiment or run.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    id: EntityId,
    kind: EntityKind,
    label: String,
    values: BTreeMap<AttributeDefinition, AttributeValue>,
    series: BTreeMap<AttributeDefinition, Vec<SeriesPoint>>,
    parent: Option<(EntityId, f64)>,
}

impl EntityRecord {
    fn new(kind: EntityKind, id: &str, label: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            AttributeDefinition::new("sys/id", AttributeType::String),
            AttributeValue::String(id.to_string()),
        );
        values.insert(
            AttributeDefinition::new(kind.label_attribute(), AttributeType::String),
            AttributeValue::String(label.to_string()),
        );
        Self {
            id: EntityId::new(id),
            kind,
            label: label.to_string(),
            values,
            series: BTreeMap::new(),
            parent: None,
        }
    }

    /// Experiment identified by `name`.
    #[must_use]
    pub fn experiment(id: &str, name: &str) -> Self {
        Self::new(EntityKind::Experiment, id, name)
    }

    /// Run identified by `custom_run_id`.
    #[must_use]
    pub fn run(id: &str, custom_run_id: &str) -> Self {
        Self::new(EntityKind::Run, id, custom_run_id)
    }

    /// Set a scalar attribute; its type is the value's type.
    #[must_use]
    pub fn with_value(mut self, path: &str, value: AttributeValue) -> Self {
        self.values
            .insert(AttributeDefinition::new(path, value.attribute_type()), value);
        self
    }

    /// Set a series attribute; its type follows the first point's value.
    ///
    /// The series' scalar view (aggregates or last value) is derived from
    /// the points.
    #[must_use]
    pub fn with_series(mut self, path: &str, points: Vec<SeriesPoint>) -> Self {
        let points = crate::lineage::normalize(points);
        let attribute_type = points
            .first()
            .map_or(AttributeType::FloatSeries, |p| p.value.attribute_type());
        let definition = AttributeDefinition::new(path, attribute_type);

        if let Some(value) = series_scalar(&points) {
            self.values.insert(definition.clone(), value);
        }
        self.series.insert(definition, points);
        self
    }

    /// Float series from `(step, value)` pairs.
    #[must_use]
    pub fn with_float_series(self, path: &str, points: &[(f64, f64)]) -> Self {
        let points = points
            .iter()
            .map(|&(step, v)| SeriesPoint::new(step, SeriesValue::Float(v)))
            .collect();
        self.with_series(path, points)
    }

    /// Mark the entity as forked from `parent` at `step` (inclusive on the parent side).
    #[must_use]
    pub fn forked_from(mut self, parent: &str, step: f64) -> Self {
        self.parent = Some((EntityId::new(parent), step));
        self
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    /// Kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }
}

fn series_scalar(points: &[SeriesPoint]) -> Option<AttributeValue> {
    let last = points.last()?;
    let value = match &last.value {
        SeriesValue::Float(_) => AttributeValue::FloatSeries(FloatSeriesAggregates::from_points(
            points
                .iter()
                .filter_map(|p| p.value.as_f64().map(|v| (p.step, v))),
        )?),
        SeriesValue::String(s) => AttributeValue::StringSeries(SeriesLast {
            last: s.clone(),
            last_step: last.step,
        }),
        SeriesValue::Histogram(h) => AttributeValue::HistogramSeries(SeriesLast {
            last: h.clone(),
            last_step: last.step,
        }),
        SeriesValue::File(f) => AttributeValue::FileSeries(SeriesLast {
            last: f.clone(),
            last_step: last.step,
        }),
    };
    Some(value)
}

impl Record for EntityRecord {
    fn label(&self) -> &str {
        &self.label
    }

    fn attribute(&self, attribute: &AttributeRef) -> Option<&AttributeValue> {
        match attribute.definition() {
            Some(definition) => self.values.get(&definition),
            None => self
                .values
                .iter()
                .find(|(d, _)| d.path() == attribute.path())
                .map(|(_, v)| v),
        }
    }
}

/// In-memory metadata service.
///
/// # Example
///
/// ```rust
/// use trueno_fetch::service::{EntityRecord, InMemoryService};
///
/// let service = InMemoryService::with_page_size(2);
/// service.insert(
///     EntityRecord::run("RUN-1", "warm-start").with_float_series("metrics/loss", &[(1.0, 0.5)]),
/// );
/// assert_eq!(service.len(), 1);
/// ```
pub struct InMemoryService {
    entities: DashMap<EntityId, EntityRecord>,
    page_size: usize,
    failures: DashMap<ServiceMethod, VecDeque<ServiceError>>,
    latency: DashMap<ServiceMethod, Duration>,
    calls: DashMap<ServiceMethod, usize>,
    contexts: DashMap<ServiceMethod, Vec<RequestContext>>,
}

impl InMemoryService {
    /// Create an empty service with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty service delivering at most `page_size` items per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entities: DashMap::new(),
            page_size: page_size.max(1),
            failures: DashMap::new(),
            latency: DashMap::new(),
            calls: DashMap::new(),
            contexts: DashMap::new(),
        }
    }

    /// Insert or replace an entity.
    pub fn insert(&self, record: EntityRecord) {
        self.entities.insert(record.id.clone(), record);
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Fail the next call of `method` with `error` (queued, FIFO).
    pub fn fail_next(&self, method: ServiceMethod, error: ServiceError) {
        self.failures.entry(method).or_default().push_back(error);
    }

    /// Delay every call of `method` by `latency`.
    pub fn set_latency(&self, method: ServiceMethod, latency: Duration) {
        self.latency.insert(method, latency);
    }

    /// Number of calls made to `method`, including failed ones.
    #[must_use]
    pub fn calls(&self, method: ServiceMethod) -> usize {
        self.calls.get(&method).map_or(0, |c| *c)
    }

    /// Contexts received by `method`, in call order.
    #[must_use]
    pub fn contexts(&self, method: ServiceMethod) -> Vec<RequestContext> {
        self.contexts
            .get(&method)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    async fn enter(&self, method: ServiceMethod, ctx: &RequestContext) -> ServiceResult<()> {
        *self.calls.entry(method).or_insert(0) += 1;
        self.contexts.entry(method).or_default().push(ctx.clone());

        let latency = self.latency.get(&method).map(|d| *d);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failures
            .get_mut(&method)
            .and_then(|mut queue| queue.pop_front());
        failure.map_or(Ok(()), Err)
    }

    fn paginate<T>(&self, items: Vec<T>, cursor: Option<&Cursor>) -> ServiceResult<Page<T>> {
        let offset = match cursor {
            None => 0,
            Some(c) => c
                .as_str()
                .parse::<usize>()
                .map_err(|_| ServiceError::UnexpectedResponse(format!("invalid cursor '{c}'")))?,
        };
        let total = items.len();
        let end = offset.saturating_add(self.page_size).min(total);
        let page: Vec<T> = items
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .collect();

        if end < total {
            Ok(Page::with_next(page, Cursor::new(end.to_string())))
        } else {
            Ok(Page::last(page))
        }
    }

    fn matching_entries(&self, request: &SearchRequest) -> ServiceResult<Vec<EntityEntry>> {
        if let Some(filter) = &request.filter {
            if filter.tree().has_non_finite_literal() {
                return Err(ServiceError::UnexpectedResponse(
                    "NaN and infinite values are not supported in filter comparisons".to_string(),
                ));
            }
        }

        let mut entries: Vec<EntityEntry> = self
            .entities
            .iter()
            .filter(|e| e.kind == request.kind)
            .filter(|e| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |f| eval::evaluate(f.tree(), e.value()))
            })
            .map(|e| EntityEntry {
                id: e.id.clone(),
                label: e.label.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn definitions(&self, request: &DefinitionsRequest) -> Vec<AttributeDefinition> {
        let scope: Option<FxHashSet<&EntityId>> =
            request.entities.as_ref().map(|ids| ids.iter().collect());

        let found: BTreeSet<AttributeDefinition> = self
            .entities
            .iter()
            .filter(|e| e.kind == request.kind)
            .filter(|e| scope.as_ref().map_or(true, |s| s.contains(&e.id)))
            .flat_map(|e| {
                e.values
                    .keys()
                    .filter(|d| request.selector.matches(d))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        found.into_iter().collect()
    }

    fn values(&self, request: &ValuesRequest) -> Vec<ValueRecord> {
        let mut out = Vec::new();
        for id in &request.entities {
            let Some(record) = self.entities.get(id) else {
                continue;
            };
            if record.kind != request.kind {
                continue;
            }
            for definition in &request.attributes {
                if let Some(value) = record.values.get(definition) {
                    out.push(ValueRecord {
                        entity: id.clone(),
                        definition: definition.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        out.sort_by(|a, b| (&a.entity, &a.definition).cmp(&(&b.entity, &b.definition)));
        out
    }

    fn series_points(&self, request: &SeriesRequest) -> Vec<SeriesRecord> {
        let mut ids = request.entities.clone();
        ids.sort();
        ids.dedup();

        let mut out = Vec::new();
        for id in &ids {
            let Some(record) = self.entities.get(id) else {
                continue;
            };
            if record.kind != request.kind {
                continue;
            }
            let mut definitions = request.attributes.clone();
            definitions.sort();
            definitions.dedup();
            for definition in &definitions {
                if let Some(points) = record.series.get(definition) {
                    out.extend(points.iter().map(|p| SeriesRecord {
                        entity: id.clone(),
                        definition: definition.clone(),
                        point: p.clone(),
                    }));
                }
            }
        }
        out
    }

    fn lineages(&self, request: &LineageRequest) -> Vec<Lineage> {
        let mut out = Vec::new();
        for id in &request.entities {
            let Some(leaf) = self.entities.get(id) else {
                continue;
            };
            if leaf.kind != request.kind {
                continue;
            }

            let mut links = vec![LineageLink {
                entity: id.clone(),
                forked_at: leaf.parent.as_ref().map(|(_, step)| *step),
            }];
            let mut parent = leaf.parent.clone();
            drop(leaf);

            let mut visited: FxHashSet<EntityId> = FxHashSet::default();
            visited.insert(id.clone());
            while let Some((parent_id, _)) = parent.take() {
                if !visited.insert(parent_id.clone()) {
                    break;
                }
                let Some(record) = self.entities.get(&parent_id) else {
                    break;
                };
                links.push(LineageLink {
                    entity: parent_id.clone(),
                    forked_at: record.parent.as_ref().map(|(_, step)| *step),
                });
                parent = record.parent.clone();
            }

            links.reverse();
            out.push(Lineage {
                entity: id.clone(),
                links,
            });
        }
        out
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataService for InMemoryService {
    async fn search_entities(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
        cursor: Option<&Cursor>,
    ) -> ServiceResult<Page<EntityEntry>> {
        self.enter(ServiceMethod::SearchEntities, ctx).await?;
        let entries = self.matching_entries(request)?;
        self.paginate(entries, cursor)
    }

    async fn list_attribute_definitions(
        &self,
        ctx: &RequestContext,
        request: &DefinitionsRequest,
        cursor: Option<&Cursor>,
    ) -> ServiceResult<Page<AttributeDefinition>> {
        self.enter(ServiceMethod::ListAttributeDefinitions, ctx)
            .await?;
        let definitions = self.definitions(request);
        self.paginate(definitions, cursor)
    }

    async fn fetch_attribute_values(
        &self,
        ctx: &RequestContext,
        request: &ValuesRequest,
        cursor: Option<&Cursor>,
    ) -> ServiceResult<Page<ValueRecord>> {
        self.enter(ServiceMethod::FetchAttributeValues, ctx).await?;
        let values = self.values(request);
        self.paginate(values, cursor)
    }

    async fn fetch_series(
        &self,
        ctx: &RequestContext,
        request: &SeriesRequest,
        cursor: Option<&Cursor>,
    ) -> ServiceResult<Page<SeriesRecord>> {
        self.enter(ServiceMethod::FetchSeries, ctx).await?;
        let points = self.series_points(request);
        self.paginate(points, cursor)
    }

    async fn fetch_lineage(
        &self,
        ctx: &RequestContext,
        request: &LineageRequest,
        cursor: Option<&Cursor>,
    ) -> ServiceResult<Page<Lineage>> {
        self.enter(ServiceMethod::FetchLineage, ctx).await?;
        let lineages = self.lineages(request);
        self.paginate(lineages, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    fn ctx() -> RequestContext {
        RequestContext::anonymous()
    }

    fn population() -> InMemoryService {
        let service = InMemoryService::with_page_size(2);
        for i in 0..5 {
            service.insert(
                EntityRecord::experiment(&format!("EXP-{i}"), &format!("exp-{i}"))
                    .with_value("config/lr", AttributeValue::Float(0.1 * f64::from(i))),
            );
        }
        service.insert(EntityRecord::run("RUN-1", "r1"));
        service
    }

    #[tokio::test]
    async fn test_search_paginates_in_id_order() {
        let service = population();
        let request = SearchRequest {
            kind: EntityKind::Experiment,
            filter: None,
        };
        let mut cursor = None;
        let mut ids = Vec::new();
        loop {
            let page = service
                .search_entities(&ctx(), &request, cursor.as_ref())
                .await
                .unwrap();
            ids.extend(page.items.into_iter().map(|e| e.id.to_string()));
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(ids, vec!["EXP-0", "EXP-1", "EXP-2", "EXP-3", "EXP-4"]);
        assert_eq!(service.calls(ServiceMethod::SearchEntities), 3);
    }

    #[tokio::test]
    async fn test_search_evaluates_filter() {
        let service = population();
        let filter = Filter::gt(
            AttributeRef::typed("config/lr", AttributeType::Float),
            0.25,
        )
        .unwrap()
        .compile(EntityKind::Experiment)
        .unwrap();
        let request = SearchRequest {
            kind: EntityKind::Experiment,
            filter: Some(filter),
        };
        let page = service.search_entities(&ctx(), &request, None).await.unwrap();
        let labels: Vec<_> = page.items.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["exp-3", "exp-4"]);
    }

    #[tokio::test]
    async fn test_non_finite_literal_rejected() {
        let service = population();
        let filter = Filter::lt(
            AttributeRef::typed("config/lr", AttributeType::Float),
            f64::INFINITY,
        )
        .unwrap()
        .compile(EntityKind::Experiment)
        .unwrap();
        let request = SearchRequest {
            kind: EntityKind::Experiment,
            filter: Some(filter),
        };
        let err = service
            .search_entities(&ctx(), &request, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_once() {
        let service = population();
        service.fail_next(ServiceMethod::FetchLineage, ServiceError::status(503, "busy"));
        let request = LineageRequest {
            kind: EntityKind::Run,
            entities: vec![EntityId::new("RUN-1")],
        };
        assert!(service.fetch_lineage(&ctx(), &request, None).await.is_err());
        let page = service.fetch_lineage(&ctx(), &request, None).await.unwrap();
        assert_eq!(page.items[0].links.len(), 1);
        assert_eq!(service.calls(ServiceMethod::FetchLineage), 2);
    }

    #[tokio::test]
    async fn test_lineage_chain_root_first() {
        let service = InMemoryService::new();
        service.insert(EntityRecord::run("A", "a"));
        service.insert(EntityRecord::run("B", "b").forked_from("A", 10.0));
        service.insert(EntityRecord::run("C", "c").forked_from("B", 20.0));
        let request = LineageRequest {
            kind: EntityKind::Run,
            entities: vec![EntityId::new("C")],
        };
        let page = service.fetch_lineage(&ctx(), &request, None).await.unwrap();
        let lineage = &page.items[0];
        assert_eq!(
            lineage.links,
            vec![
                LineageLink::root("A"),
                LineageLink::forked("B", 10.0),
                LineageLink::forked("C", 20.0)
            ]
        );
        assert!(lineage.validate().is_ok());
    }

    #[tokio::test]
    async fn test_definitions_include_system_and_series() {
        let service = InMemoryService::new();
        service.insert(
            EntityRecord::run("R", "r").with_float_series("metrics/loss", &[(1.0, 0.5)]),
        );
        let request = DefinitionsRequest {
            kind: EntityKind::Run,
            entities: None,
            selector: crate::filter::AttributeSelector::pattern(".*").unwrap(),
        };
        let page = service
            .list_attribute_definitions(&ctx(), &request, None)
            .await
            .unwrap();
        let names: Vec<String> = page.items.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "metrics/loss:float_series",
                "sys/custom_run_id:string",
                "sys/id:string"
            ]
        );
    }
}
