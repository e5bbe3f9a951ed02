//! Event recording shared by the command processors.

use common::{AggregateId, CorrelationContext};
use event_store::{AppendOptions, EventRecord, EventStore, EventStoreExt, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Appends domain events to an aggregate's log with version checks.
///
/// Versions are a true per-aggregate sequence: the first event is `1` and
/// each later one is the previous version plus one.
#[derive(Clone)]
pub struct EventRecorder<S: EventStore> {
    store: S,
}

impl<S: EventStore> EventRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records the first event of a new aggregate.
    ///
    /// Fails with a concurrency conflict when the aggregate already has events,
    /// which is how a replayed creation is detected.
    pub async fn record_first<A: Aggregate>(
        &self,
        aggregate_id: &AggregateId,
        event: &A::Event,
        ctx: &CorrelationContext,
    ) -> Result<Version, DomainError> {
        let record = Self::build_record::<A>(aggregate_id, event, Version::first(), ctx)?;
        Ok(self
            .store
            .append_event(record, AppendOptions::expect_new())
            .await?)
    }

    /// Records an event after the aggregate's current last event.
    pub async fn record_next<A: Aggregate>(
        &self,
        aggregate_id: &AggregateId,
        event: &A::Event,
        ctx: &CorrelationContext,
    ) -> Result<Version, DomainError> {
        let current = self
            .store
            .get_aggregate_version(aggregate_id)
            .await?
            .unwrap_or(Version::initial());
        let record = Self::build_record::<A>(aggregate_id, event, current.next(), ctx)?;
        Ok(self
            .store
            .append_event(record, AppendOptions::expect_version(current))
            .await?)
    }

    fn build_record<A: Aggregate>(
        aggregate_id: &AggregateId,
        event: &A::Event,
        version: Version,
        ctx: &CorrelationContext,
    ) -> Result<EventRecord, DomainError> {
        Ok(EventRecord::new(
            aggregate_id.clone(),
            A::aggregate_type(),
            event.event_type(),
            serde_json::to_value(event)?,
            version,
            ctx,
        ))
    }
}
