//! Metadata service collaborator
//!
//! The query engine talks to the remote metadata service only through the
//! [`MetadataService`] trait. Every method takes the query's
//! [`RequestContext`], a typed request and an optional continuation
//! [`Cursor`], and returns one [`Page`].
//!
//! Transport details (HTTP, protobuf, authentication) belong to the
//! implementation. [`InMemoryService`] is a complete in-process
//! implementation used by tests and demos.
//!
//! # Example
//!
//! ```rust
//! use trueno_fetch::entity::{EntityId, EntityKind};
//! use trueno_fetch::metadata::RequestContext;
//! use trueno_fetch::service::{EntityRecord, InMemoryService, MetadataService, SearchRequest};
//!
//! # async fn example() -> Result<(), trueno_fetch::service::ServiceError> {
//! let service = InMemoryService::new();
//! service.insert(EntityRecord::experiment("EXP-1", "baseline"));
//!
//! let request = SearchRequest { kind: EntityKind::Experiment, filter: None };
//! let page = service
//!     .search_entities(&RequestContext::anonymous(), &request, None)
//!     .await?;
//! assert_eq!(page.items[0].id, EntityId::new("EXP-1"));
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::{EntityRecord, InMemoryService, ServiceMethod};

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribute::{AttributeDefinition, AttributeValue};
use crate::entity::{EntityEntry, EntityId, EntityKind};
use crate::filter::{AttributeSelector, CompiledFilter};
use crate::lineage::Lineage;
use crate::metadata::RequestContext;
use crate::series::SeriesPoint;

/// Opaque continuation token for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items in service-delivered order
    pub items: Vec<T>,
    /// Cursor of the next page; `None` at end of data
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// Final page.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// Page followed by another one.
    #[must_use]
    pub const fn with_next(items: Vec<T>, next: Cursor) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }
}

/// Failure reported by a service call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Connection-level failure (retryable)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP status failure; 429 and 5xx are retryable
    #[error("HTTP {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Service-provided message
        message: String,
        /// Server-mandated wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// The service rejected a well-formed-looking request (not retried)
    #[error("{0}")]
    UnexpectedResponse(String),
}

impl ServiceError {
    /// Status error without a server wait.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 429 with a server-mandated wait.
    #[must_use]
    pub fn too_many_requests(retry_after: Duration) -> Self {
        Self::Status {
            code: 429,
            message: "Too Many Requests".to_string(),
            retry_after: Some(retry_after),
        }
    }
}

/// Result of a service call.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Search for entities matching a compiled filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Entity kind
    pub kind: EntityKind,
    /// Predicate; `None` matches every entity of the kind
    pub filter: Option<CompiledFilter>,
}

/// List attribute definitions present on entities.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionsRequest {
    /// Entity kind
    pub kind: EntityKind,
    /// Entities to inspect; `None` inspects the whole population of the kind
    pub entities: Option<Vec<EntityId>>,
    /// Selected attributes
    pub selector: AttributeSelector,
}

/// Fetch scalar attribute values (series reduce to aggregates).
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesRequest {
    /// Entity kind
    pub kind: EntityKind,
    /// Entities
    pub entities: Vec<EntityId>,
    /// Resolved attributes
    pub attributes: Vec<AttributeDefinition>,
}

/// Fetch per-step series points.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    /// Entity kind
    pub kind: EntityKind,
    /// Entities
    pub entities: Vec<EntityId>,
    /// Resolved series attributes
    pub attributes: Vec<AttributeDefinition>,
}

/// Fetch ancestor chains.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageRequest {
    /// Entity kind
    pub kind: EntityKind,
    /// Leaf entities
    pub entities: Vec<EntityId>,
}

/// One (entity, attribute, value) tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    /// Owning entity
    pub entity: EntityId,
    /// Attribute
    pub definition: AttributeDefinition,
    /// Value
    pub value: AttributeValue,
}

/// One (entity, attribute, point) tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    /// Owning entity
    pub entity: EntityId,
    /// Series attribute
    pub definition: AttributeDefinition,
    /// Logged point
    pub point: SeriesPoint,
}

/// Remote metadata service.
pub trait MetadataService: Send + Sync + 'static {
    /// Entities matching a predicate, ordered by id.
    fn search_entities(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ServiceResult<Page<EntityEntry>>> + Send;

    /// Attribute definitions present on the requested entities.
    fn list_attribute_definitions(
        &self,
        ctx: &RequestContext,
        request: &DefinitionsRequest,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ServiceResult<Page<AttributeDefinition>>> + Send;

    /// Scalar values of the requested attributes.
    fn fetch_attribute_values(
        &self,
        ctx: &RequestContext,
        request: &ValuesRequest,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ServiceResult<Page<ValueRecord>>> + Send;

    /// Points of the requested series, each entity's own points only.
    fn fetch_series(
        &self,
        ctx: &RequestContext,
        request: &SeriesRequest,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ServiceResult<Page<SeriesRecord>>> + Send;

    /// Ancestor chains of the requested entities.
    fn fetch_lineage(
        &self,
        ctx: &RequestContext,
        request: &LineageRequest,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = ServiceResult<Page<Lineage>>> + Send;
}
