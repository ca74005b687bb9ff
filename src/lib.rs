//! # Trueno-Fetch: Experiment-Metadata Query Engine
//!
//! **Version**: 0.1.0
//!
//! Trueno-Fetch retrieves experiment-tracking metadata (configs, metrics,
//! series, files) from a remote metadata service and assembles it into
//! tables.
//!
//! ## Pipeline
//!
//! ```text
//! criteria ─► Filter ─► resolver ─► FetchOrchestrator ─► lineage ─► buckets ─► table
//!            (compiled)  (typed)     (paged, retried)    (merged)   (optional)
//! ```
//!
//! - [`filter`]: immutable boolean predicates over entities and attributes
//! - [`attribute`]: attribute types, values and type resolution
//! - [`orchestrator`]: bounded worker pool with soft/hard retry budgets
//! - [`lineage`]: merging forked run histories
//! - [`buckets`]: step bucketing for trend summaries
//! - [`table`]: result tables and Arrow export
//! - [`client`]: query entry points
//!
//! ## Example
//!
//! ```rust
//! use trueno_fetch::client::{Client, EntityQuery};
//! use trueno_fetch::config::FetchConfig;
//! use trueno_fetch::filter::Filter;
//! use trueno_fetch::service::{EntityRecord, InMemoryService};
//!
//! # #[tokio::main]
//! # async fn main() -> trueno_fetch::Result<()> {
//! let service = InMemoryService::new();
//! service.insert(EntityRecord::experiment("1", "baseline"));
//! service.insert(EntityRecord::experiment("2", "sweep-lr"));
//!
//! let client = Client::new(service, FetchConfig::default());
//! let sweeps = client
//!     .list_entities(EntityQuery::experiments().filter(Filter::name_matches("^sweep")?))
//!     .await?;
//! assert_eq!(sweeps.labels(), &["sweep-lr".to_string()]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod attribute;
pub mod buckets;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod lineage;
pub mod logging;
pub mod metadata;
pub mod orchestrator;
pub mod series;
pub mod service;
pub mod split;
pub mod table;

pub use client::Client;
pub use error::{Error, Result};
