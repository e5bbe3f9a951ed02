//! Storage for the pipeline services.
//!
//! Two stores per service:
//! - [`EventStore`]: the append-only, per-aggregate event log used for audit
//!   and rebuild
//! - [`ReadModelStore`]: latest-state documents with revision-based
//!   compare-and-swap, queried by the read side
//!
//! Both come with an in-memory implementation and a PostgreSQL one.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod read_model;
pub mod store;
pub mod tables;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventId, EventRecord, Version};
pub use memory::{InMemoryEventStore, InMemoryReadModelStore};
pub use postgres::{PostgresEventStore, PostgresReadModelStore, run_migrations};
pub use query::{DEFAULT_QUERY_LIMIT, EventQuery};
pub use read_model::{Document, PutOptions, ReadModelStore, Versioned};
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
