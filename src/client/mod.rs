//! Query entry points
//!
//! A [`Client`] owns the service handle, the configuration, the fetch
//! orchestrator and the per-client warning throttle. Every entry point:
//!
//! 1. validates its arguments locally (no request is sent for a bad query);
//! 2. resolves untyped filter leaves and attribute selectors against the
//!    observed schema (one round-trip, only when needed);
//! 3. splits the work into fetch tasks and runs them on the orchestrator;
//! 4. merges lineage, windows series and assembles the result table.
//!
//! Each call carries its own [`QueryMetadata`] in every request.
//!
//! # Example
//!
//! ```rust
//! use trueno_fetch::client::{Client, EntityQuery, TableQuery};
//! use trueno_fetch::config::FetchConfig;
//! use trueno_fetch::filter::{AttributeSelector, Filter};
//! use trueno_fetch::service::{EntityRecord, InMemoryService};
//! use trueno_fetch::attribute::AttributeValue;
//!
//! # #[tokio::main]
//! # async fn main() -> trueno_fetch::Result<()> {
//! let service = InMemoryService::new();
//! service.insert(EntityRecord::experiment("1", "exp-a").with_value("config/lr", AttributeValue::Float(0.1)));
//! service.insert(EntityRecord::experiment("2", "exp-b").with_value("config/lr", AttributeValue::Float(0.001)));
//!
//! let client = Client::new(service, FetchConfig::default());
//! let query = TableQuery::new(
//!     EntityQuery::experiments().filter(Filter::gt("config/lr", 0.01)?),
//!     AttributeSelector::exact(["config/lr"]),
//! );
//! let table = client.fetch_table(query).await?;
//! assert_eq!(table.labels(), vec!["exp-a"]);
//! # Ok(())
//! # }
//! ```

mod query;

pub use query::{BucketQuery, EntityQuery, SeriesQuery, TableQuery, NON_NUMERIC_SERIES};

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::attribute::{
    resolve_filter, resolve_reference, resolve_selector, selector_needs_schema, unresolved_paths,
    AttributeDefinition, AttributeType,
};
use crate::buckets::BucketAggregator;
use crate::config::FetchConfig;
use crate::entity::{EntityEntry, EntityId, EntityKind, EntityList};
use crate::filter::{AttributeSelector, Filter};
use crate::lineage::{self, Lineage};
use crate::metadata::{QueryMetadata, RequestContext};
use crate::orchestrator::{FetchOrchestrator, WarningThrottle};
use crate::series::{SeriesPoint, SeriesWindow};
use crate::service::{
    Cursor, DefinitionsRequest, LineageRequest, MetadataService, Page, SearchRequest,
    SeriesRecord, SeriesRequest, ServiceResult, ValuesRequest,
};
use crate::split::{split_entities, split_tasks};
use crate::table::{
    assemble_buckets, assemble_series, assemble_table, BucketTable, SeriesTable, Table,
    TableOptions,
};
use crate::{Error, Result};

type SeriesSet = Vec<(EntityEntry, AttributeDefinition, Vec<SeriesPoint>)>;

/// Session object for querying a metadata service.
#[derive(Debug)]
pub struct Client<S> {
    service: Arc<S>,
    config: FetchConfig,
    orchestrator: FetchOrchestrator,
}

impl<S: MetadataService> Client<S> {
    /// Create a client owning `service`.
    #[must_use]
    pub fn new(service: S, config: FetchConfig) -> Self {
        Self::with_shared(Arc::new(service), config)
    }

    /// Create a client over a shared service handle.
    #[must_use]
    pub fn with_shared(service: Arc<S>, config: FetchConfig) -> Self {
        let orchestrator = FetchOrchestrator::new(config.retry_policy(), config.max_workers)
            .with_warnings(Arc::new(WarningThrottle::new()));
        Self {
            service,
            config,
            orchestrator,
        }
    }

    /// Service handle.
    #[must_use]
    pub const fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn context(&self, api_function: &str) -> RequestContext {
        if self.config.send_query_metadata {
            RequestContext::with_metadata(QueryMetadata::for_call(
                api_function,
                self.config.query_user_data.as_deref(),
            ))
        } else {
            RequestContext::anonymous()
        }
    }

    /// Run `requests` on the orchestrator and flatten the pages.
    async fn gather<R, T, F, Fut>(&self, ctx: &RequestContext, requests: Vec<R>, call: F) -> Result<Vec<T>>
    where
        R: Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(Arc<S>, RequestContext, Arc<R>, Option<Cursor>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<Page<T>>> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let ctx = ctx.clone();
        let results = self
            .orchestrator
            .run(requests, move |request, cursor| {
                call(Arc::clone(&service), ctx.clone(), request, cursor)
            })
            .await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn observed_definitions(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        entities: Option<&[EntityId]>,
        selector: &AttributeSelector,
    ) -> Result<Vec<AttributeDefinition>> {
        let entity_batches: Vec<Option<Vec<EntityId>>> = match entities {
            Some([]) => return Ok(Vec::new()),
            Some(ids) => split_entities(ids, self.config.max_request_size)
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None],
        };

        let parts = selector.clone().split();
        let requests: Vec<DefinitionsRequest> = entity_batches
            .iter()
            .flat_map(|batch| {
                parts.iter().map(move |part| DefinitionsRequest {
                    kind,
                    entities: batch.clone(),
                    selector: part.clone(),
                })
            })
            .collect();

        let definitions = self
            .gather(ctx, requests, |service, ctx, request, cursor| async move {
                service
                    .list_attribute_definitions(&ctx, &request, cursor.as_ref())
                    .await
            })
            .await?;

        let unique: BTreeSet<AttributeDefinition> = definitions.into_iter().collect();
        Ok(unique.into_iter().collect())
    }

    /// Type untyped leaves and apply the population restriction.
    async fn search_filter(&self, ctx: &RequestContext, query: &EntityQuery) -> Result<Option<Filter>> {
        let mut filter = query.filter_expr().cloned();

        if let Some(expr) = &filter {
            let paths = unresolved_paths(expr);
            if !paths.is_empty() {
                debug!(paths = ?paths, "resolving filter attribute types");
                let observed = self
                    .observed_definitions(ctx, query.kind(), None, &AttributeSelector::exact(paths))
                    .await?;
                filter = Some(resolve_filter(expr, &observed)?);
            }
        }

        if let Some(labels) = query.within_labels() {
            let names = Filter::name_in(labels.iter().cloned())?;
            filter = Some(match filter {
                Some(expr) => expr.and(&names),
                None => names,
            });
        }
        Ok(filter)
    }

    async fn search(&self, ctx: &RequestContext, query: &EntityQuery) -> Result<Vec<EntityEntry>> {
        if query.within_labels().is_some_and(<[String]>::is_empty) {
            return Ok(Vec::new());
        }
        let compiled = match self.search_filter(ctx, query).await? {
            Some(filter) => Some(filter.compile(query.kind())?),
            None => None,
        };
        let request = SearchRequest {
            kind: query.kind(),
            filter: compiled,
        };

        let entities = self
            .gather(ctx, vec![request], |service, ctx, request, cursor| async move {
                service.search_entities(&ctx, &request, cursor.as_ref()).await
            })
            .await?;
        debug!(kind = %query.kind(), matched = entities.len(), "entity search finished");
        Ok(entities)
    }

    async fn resolve_columns(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        ids: &[EntityId],
        selector: &AttributeSelector,
    ) -> Result<Vec<AttributeDefinition>> {
        let observed = if selector_needs_schema(selector) {
            self.observed_definitions(ctx, kind, Some(ids), selector).await?
        } else {
            Vec::new()
        };
        resolve_selector(selector, &observed)
    }

    /// Labels of the entities matching `query`, sorted.
    ///
    /// # Errors
    ///
    /// Filter resolution and fetch errors.
    pub async fn list_entities(&self, query: EntityQuery) -> Result<EntityList> {
        let ctx = self.context("list_entities");
        let entities = self.search(&ctx, &query).await?;
        let list = EntityList::new(query.kind(), entities.into_iter().map(|e| e.label).collect());
        info!(kind = %query.kind(), count = list.len(), "listed entities");
        Ok(list)
    }

    /// Sorted unique attribute paths present on the entities matching `query`.
    ///
    /// # Errors
    ///
    /// Filter resolution and fetch errors.
    pub async fn list_attributes(
        &self,
        query: EntityQuery,
        selector: AttributeSelector,
    ) -> Result<Vec<String>> {
        let ctx = self.context("list_attributes");
        let entities = self.search(&ctx, &query).await?;
        let ids: Vec<EntityId> = entities.into_iter().map(|e| e.id).collect();
        let definitions = self
            .observed_definitions(&ctx, query.kind(), Some(&ids), &selector)
            .await?;

        let paths: BTreeSet<String> = definitions
            .into_iter()
            .filter(|d| selector.matches(d))
            .map(|d| d.path().to_string())
            .collect();
        info!(kind = %query.kind(), count = paths.len(), "listed attributes");
        Ok(paths.into_iter().collect())
    }

    /// One row per matching entity, one column per resolved attribute.
    ///
    /// # Errors
    ///
    /// - `AttributeTypeInference` for an ambiguous untyped reference
    /// - `ConflictingAttributeTypes` for a path with several types and no suffixes
    /// - `InvalidArgument` for a sort attribute absent from the population
    /// - fetch errors
    pub async fn fetch_table(&self, query: TableQuery) -> Result<Table> {
        let ctx = self.context("fetch_table");
        let kind = query.entities.kind();
        let entities = self.search(&ctx, &query.entities).await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id.clone()).collect();

        let definitions = self.resolve_columns(&ctx, kind, &ids, &query.attributes).await?;

        let sort_by = match &query.sort_by {
            None => None,
            Some(reference) if reference.declared_type().is_some() => reference.definition(),
            Some(reference) => {
                let observed = self
                    .observed_definitions(
                        &ctx,
                        kind,
                        Some(&ids),
                        &AttributeSelector::Attribute(reference.clone()),
                    )
                    .await?;
                let resolved = resolve_reference(reference, &observed)?;
                if resolved.is_none() && !ids.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "sort attribute '{}' was not found on any {kind}",
                        reference.path()
                    )));
                }
                resolved
            }
        };

        let mut fetched: Vec<AttributeDefinition> = definitions.clone();
        if let Some(sort) = &sort_by {
            if !fetched.contains(sort) {
                fetched.push(sort.clone());
            }
        }

        let requests: Vec<ValuesRequest> = split_tasks(
            &ids,
            &fetched,
            self.config.max_request_size,
            self.config.values_batch_size,
        )
        .into_iter()
        .map(|task| ValuesRequest {
            kind,
            entities: task.entities,
            attributes: task.attributes,
        })
        .collect();
        let tasks = requests.len();

        let values = self
            .gather(&ctx, requests, |service, ctx, request, cursor| async move {
                service
                    .fetch_attribute_values(&ctx, &request, cursor.as_ref())
                    .await
            })
            .await?;

        let options = TableOptions {
            type_suffix_in_column_names: query.type_suffix_in_column_names,
            sort_by,
            sort_direction: query.sort_direction,
            limit: query.limit,
        };
        let table = assemble_table(kind, &entities, &definitions, values, &options)?;
        info!(
            kind = %kind,
            rows = table.len(),
            columns = table.columns().len(),
            tasks,
            "fetched table"
        );
        Ok(table)
    }

    async fn lineages(
        &self,
        ctx: &RequestContext,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> Result<FxHashMap<EntityId, Lineage>> {
        let requests: Vec<LineageRequest> = split_entities(ids, self.config.max_request_size)
            .into_iter()
            .map(|entities| LineageRequest { kind, entities })
            .collect();
        let chains = self
            .gather(ctx, requests, |service, ctx, request, cursor| async move {
                service.fetch_lineage(&ctx, &request, cursor.as_ref()).await
            })
            .await?;
        Ok(chains
            .into_iter()
            .map(|chain| (chain.entity.clone(), chain))
            .collect())
    }

    /// Fetch, merge and window every (entity, series) pair of `query`
    /// whose type is in `types`.
    async fn collect_series(
        &self,
        ctx: &RequestContext,
        query: &SeriesQuery,
        types: &[AttributeType],
        window: &SeriesWindow,
    ) -> Result<SeriesSet> {
        window.validate()?;
        let kind = query.entities.kind();
        let entities = self.search(ctx, &query.entities).await?;
        let ids: Vec<EntityId> = entities.iter().map(|e| e.id.clone()).collect();

        let definitions: Vec<AttributeDefinition> = self
            .resolve_columns(ctx, kind, &ids, &query.attributes)
            .await?
            .into_iter()
            .filter(|d| types.contains(&d.attribute_type()))
            .collect();
        if entities.is_empty() || definitions.is_empty() {
            return Ok(Vec::new());
        }

        let chains = if query.lineage_to_root {
            self.lineages(ctx, kind, &ids).await?
        } else {
            FxHashMap::default()
        };

        // leaves first, then every ancestor not already queried
        let mut fetch_ids = ids.clone();
        let mut seen: FxHashSet<EntityId> = ids.iter().cloned().collect();
        for chain in chains.values() {
            for link in &chain.links {
                if seen.insert(link.entity.clone()) {
                    fetch_ids.push(link.entity.clone());
                }
            }
        }
        fetch_ids[ids.len()..].sort();

        let requests: Vec<SeriesRequest> = split_tasks(
            &fetch_ids,
            &definitions,
            self.config.max_request_size,
            self.config.values_batch_size,
        )
        .into_iter()
        .map(|task| SeriesRequest {
            kind,
            entities: task.entities,
            attributes: task.attributes,
        })
        .collect();

        let records: Vec<SeriesRecord> = self
            .gather(ctx, requests, |service, ctx, request, cursor| async move {
                service.fetch_series(&ctx, &request, cursor.as_ref()).await
            })
            .await?;

        let mut by_definition: FxHashMap<AttributeDefinition, FxHashMap<EntityId, Vec<SeriesPoint>>> =
            FxHashMap::default();
        for record in records {
            by_definition
                .entry(record.definition)
                .or_default()
                .entry(record.entity)
                .or_default()
                .push(record.point);
        }

        let empty = FxHashMap::default();
        let mut out = Vec::new();
        for entry in &entities {
            for definition in &definitions {
                let points = by_definition.get(definition).unwrap_or(&empty);
                let merged = match chains.get(&entry.id) {
                    Some(chain) if query.lineage_to_root => lineage::merge(chain, points)?,
                    _ => lineage::normalize(points.get(&entry.id).cloned().unwrap_or_default()),
                };
                let windowed = window.apply(merged);
                if !windowed.is_empty() {
                    out.push((entry.clone(), definition.clone(), windowed));
                }
            }
        }
        debug!(series = out.len(), "collected series");
        Ok(out)
    }

    /// Per-step values of float series.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad window, resolution and fetch errors.
    pub async fn fetch_series_numeric(&self, query: SeriesQuery) -> Result<SeriesTable> {
        let ctx = self.context("fetch_series_numeric");
        let series = self
            .collect_series(&ctx, &query, &[AttributeType::FloatSeries], &query.window)
            .await?;
        let table = assemble_series(
            query.entities.kind(),
            true,
            series,
            query.type_suffix_in_column_names,
        )?;
        info!(rows = table.len(), "fetched numeric series");
        Ok(table)
    }

    /// Per-step values of string, histogram and file series.
    ///
    /// Preview filtering does not apply to these series.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad window, resolution and fetch errors.
    pub async fn fetch_series_nonnumeric(&self, query: SeriesQuery) -> Result<SeriesTable> {
        let ctx = self.context("fetch_series_nonnumeric");
        let window = SeriesWindow {
            include_previews: true,
            ..query.window
        };
        let series = self
            .collect_series(&ctx, &query, &NON_NUMERIC_SERIES, &window)
            .await?;
        let table = assemble_series(
            query.entities.kind(),
            false,
            series,
            query.type_suffix_in_column_names,
        )?;
        info!(rows = table.len(), "fetched non-numeric series");
        Ok(table)
    }

    /// Float series reduced to at most `limit` buckets each.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad limit, domain or window; resolution and
    /// fetch errors.
    pub async fn fetch_buckets(&self, query: BucketQuery) -> Result<BucketTable> {
        let mut aggregator = BucketAggregator::new(query.limit)?;
        if let Some((min_step, max_step)) = query.domain {
            aggregator = aggregator.with_domain(min_step, max_step)?;
        }

        let ctx = self.context("fetch_buckets");
        let series = self
            .collect_series(&ctx, &query.series, &[AttributeType::FloatSeries], &query.series.window)
            .await?;

        let numeric: Vec<((EntityEntry, AttributeDefinition), Vec<SeriesPoint<f64>>)> = series
            .into_iter()
            .map(|(entry, definition, points)| {
                let points = points
                    .into_iter()
                    .filter_map(|p| {
                        p.value.as_f64().map(|value| SeriesPoint {
                            step: p.step,
                            value,
                            timestamp: p.timestamp,
                            is_preview: p.is_preview,
                            preview_completion: p.preview_completion,
                        })
                    })
                    .collect();
                ((entry, definition), points)
            })
            .collect();

        let bucketed = aggregator
            .aggregate_many(numeric)
            .into_iter()
            .map(|((entry, definition), buckets)| (entry, definition, buckets))
            .collect();
        let table = assemble_buckets(
            query.series.entities.kind(),
            bucketed,
            query.series.type_suffix_in_column_names,
        )?;
        info!(rows = table.len(), limit = aggregator.limit(), "fetched buckets");
        Ok(table)
    }
}
