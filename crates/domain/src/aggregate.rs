//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Document;
use serde::Serialize;

/// A fact recorded in an aggregate's event log.
///
/// The serialized form is stored as the record's `event_data`; the type name
/// goes into its own column.
pub trait DomainEvent: Serialize + Send + Sync {
    fn event_type(&self) -> &'static str;
}

/// A consistency boundary with its own identity, stored as a read-model
/// document and audited through its event log.
pub trait Aggregate: Document {
    type Event: DomainEvent;

    /// Name stored in the `aggregate_type` column.
    fn aggregate_type() -> &'static str;

    fn id(&self) -> AggregateId {
        self.document_id()
    }
}
