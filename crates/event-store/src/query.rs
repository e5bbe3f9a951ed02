use chrono::{DateTime, Utc};

use crate::AggregateId;

/// Default number of rows returned by list-style queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Filter criteria for reading the event log.
///
/// Every field is optional; unset fields do not constrain the result.
/// Results are ordered by timestamp, then version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<String>,
    pub event_type: Option<String>,
    /// Inclusive lower bound on the event timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EventQuery {
    /// All events of one aggregate.
    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    /// All events of one type.
    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, event: &crate::EventRecord) -> bool {
        if let Some(ref id) = self.aggregate_id
            && &event.aggregate_id != id
        {
            return false;
        }
        if let Some(ref aggregate_type) = self.aggregate_type
            && &event.aggregate_type != aggregate_type
        {
            return false;
        }
        if let Some(ref event_type) = self.event_type
            && &event.event_type != event_type
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && event.timestamp > to
        {
            return false;
        }
        true
    }
}
