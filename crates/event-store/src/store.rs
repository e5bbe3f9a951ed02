use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventQuery, EventRecord, EventStoreError, Result, Version};

/// Options for appending events to the log.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current version of the aggregate. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the aggregate to currently be at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the aggregate to have no events yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventRecord>> + Send>>;

/// Append-only, per-aggregate event log.
///
/// Implementations must be thread-safe; one store is shared by every worker
/// of a service.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events atomically and returns the aggregate's new version.
    ///
    /// Fails with `ConcurrencyConflict` when `options.expected_version` is set
    /// and does not match, or when a version is already taken.
    async fn append(&self, events: Vec<EventRecord>, options: AppendOptions) -> Result<Version>;

    /// All events of an aggregate in version order.
    async fn get_events_for_aggregate(&self, aggregate_id: &AggregateId)
    -> Result<Vec<EventRecord>>;

    /// Events matching the filter, ordered by timestamp then version.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventRecord>>;

    /// Current version of an aggregate, `None` when it has no events.
    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;

    /// Streams the whole log in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> Result<()>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event.
    async fn append_event(&self, event: EventRecord, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }

    /// Version the next event of `aggregate_id` must carry.
    async fn next_version(&self, aggregate_id: &AggregateId) -> Result<Version> {
        Ok(self
            .get_aggregate_version(aggregate_id)
            .await?
            .unwrap_or_default()
            .next())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch targets one aggregate with consecutive versions.
pub fn validate_events_for_append(events: &[EventRecord]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    if first.version < Version::first() {
        return Err(EventStoreError::InvalidAppend(format!(
            "event versions start at {}, got {}",
            Version::first(),
            first.version
        )));
    }

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}
