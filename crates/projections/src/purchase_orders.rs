//! Query engine over the purchase-order read model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, DomainError, Outcome, PurchaseOrder, PurchaseOrderStatus};
use event_store::{EventQuery, EventRecord, EventStore, ReadModelStore};
use serde::Serialize;

use crate::filter::{DateRange, EventHistoryFilter, PurchaseOrderFilter};

/// Counts over the purchase orders created in a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurchaseOrderStats {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub completed_orders: usize,
    pub overdue_orders: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_urgency: BTreeMap<String, usize>,
    pub by_supplier: BTreeMap<String, usize>,
}

impl PurchaseOrderStats {
    fn add(&mut self, order: &PurchaseOrder, now: DateTime<Utc>) {
        self.total_orders += 1;
        *self
            .by_status
            .entry(order.status.as_str().to_string())
            .or_default() += 1;
        *self
            .by_urgency
            .entry(order.urgency_level.as_str().to_string())
            .or_default() += 1;
        *self
            .by_supplier
            .entry(order.supplier_id.clone())
            .or_default() += 1;

        if order.status == PurchaseOrderStatus::Pending {
            self.pending_orders += 1;
        }
        if order.is_completed() {
            self.completed_orders += 1;
        }
        if order.is_overdue_at(now) {
            self.overdue_orders += 1;
        }
    }
}

/// Read-only access to purchase orders and their event history.
///
/// Results are eventually consistent with the write side.
#[derive(Clone)]
pub struct PurchaseOrderQueries<R, E>
where
    R: ReadModelStore<PurchaseOrder>,
    E: EventStore,
{
    read_model: R,
    events: E,
}

impl<R, E> PurchaseOrderQueries<R, E>
where
    R: ReadModelStore<PurchaseOrder>,
    E: EventStore,
{
    pub fn new(read_model: R, events: E) -> Self {
        Self { read_model, events }
    }

    pub fn read_model(&self) -> &R {
        &self.read_model
    }

    pub fn event_store(&self) -> &E {
        &self.events
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_purchase_order(&self, id: &AggregateId) -> Outcome<PurchaseOrder> {
        match self.read_model.get(id).await {
            Ok(Some(found)) => Outcome::Ok(found.document),
            Ok(None) => Outcome::not_found(PurchaseOrder::aggregate_type(), id.as_str()),
            Err(err) => Outcome::StoreError(err.into()),
        }
    }

    /// Orders matching the filter, oldest first, capped at the filter's limit.
    #[tracing::instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        filter: PurchaseOrderFilter,
    ) -> Outcome<Vec<PurchaseOrder>> {
        self.scan()
            .await
            .map(|orders| {
                let mut matching: Vec<PurchaseOrder> =
                    orders.into_iter().filter(|o| filter.matches(o)).collect();
                matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                matching.truncate(filter.effective_limit());
                matching
            })
            .into()
    }

    /// Event history of one order in append order.
    ///
    /// An order with no events is reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_purchase_order_events(
        &self,
        id: &AggregateId,
        filter: EventHistoryFilter,
    ) -> Outcome<Vec<EventRecord>> {
        let query = EventQuery {
            event_type: filter.event_type.clone(),
            from_timestamp: filter.window.start,
            to_timestamp: filter.window.end,
            ..EventQuery::for_aggregate(id.clone())
        };
        let limit = filter.effective_limit();

        let events = match self.events.query_events(query).await {
            Ok(events) => events,
            Err(err) => return Outcome::StoreError(err.into()),
        };
        if events.is_empty() {
            match self.events.get_aggregate_version(id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Outcome::not_found(PurchaseOrder::aggregate_type(), id.as_str());
                }
                Err(err) => return Outcome::StoreError(err.into()),
            }
        }

        let mut events: Vec<EventRecord> =
            events.into_iter().filter(|e| filter.matches(e)).collect();
        events.sort_by_key(|e| e.version);
        events.truncate(limit);
        Outcome::Ok(events)
    }

    pub async fn get_overdue_purchase_orders(&self) -> Outcome<Vec<PurchaseOrder>> {
        self.get_overdue_purchase_orders_at(Utc::now()).await
    }

    /// Open orders whose expected date is before `now`.
    #[tracing::instrument(skip(self))]
    pub async fn get_overdue_purchase_orders_at(
        &self,
        now: DateTime<Utc>,
    ) -> Outcome<Vec<PurchaseOrder>> {
        self.scan()
            .await
            .map(|orders| {
                let mut overdue: Vec<PurchaseOrder> = orders
                    .into_iter()
                    .filter(|o| o.is_overdue_at(now))
                    .collect();
                overdue.sort_by(|a, b| a.expected_date.cmp(&b.expected_date));
                overdue
            })
            .into()
    }

    pub async fn get_statistics(&self, created: DateRange) -> Outcome<PurchaseOrderStats> {
        self.get_statistics_at(created, Utc::now()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_statistics_at(
        &self,
        created: DateRange,
        now: DateTime<Utc>,
    ) -> Outcome<PurchaseOrderStats> {
        self.scan()
            .await
            .map(|orders| {
                let mut stats = PurchaseOrderStats::default();
                for order in orders.iter().filter(|o| created.contains(o.created_at)) {
                    stats.add(order, now);
                }
                stats
            })
            .into()
    }

    async fn scan(&self) -> Result<Vec<PurchaseOrder>, DomainError> {
        Ok(self
            .read_model
            .scan()
            .await?
            .into_iter()
            .map(|v| v.document)
            .collect())
    }
}
