//! Filter criteria for read-side queries.
//!
//! Each query takes one of these by value. A `None` field does not filter.

use chrono::{DateTime, Utc};
use common::UrgencyLevel;
use domain::{PurchaseOrder, PurchaseOrderStatus};
use event_store::{DEFAULT_QUERY_LIMIT, EventRecord};
use serde::Deserialize;

/// Inclusive time window; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at <= end)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseOrderFilter {
    pub product_id: Option<String>,
    pub supplier_id: Option<String>,
    pub status: Option<PurchaseOrderStatus>,
    pub urgency_level: Option<UrgencyLevel>,
    /// Window on `created_at`.
    pub created: DateRange,
    /// Result cap; defaults to 100.
    pub limit: Option<usize>,
}

impl PurchaseOrderFilter {
    pub fn matches(&self, order: &PurchaseOrder) -> bool {
        if let Some(product_id) = &self.product_id
            && &order.product_id != product_id
        {
            return false;
        }
        if let Some(supplier_id) = &self.supplier_id
            && &order.supplier_id != supplier_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(urgency) = &self.urgency_level
            && &order.urgency_level != urgency
        {
            return false;
        }
        self.created.contains(order.created_at)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

/// Narrows one aggregate's event history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHistoryFilter {
    pub event_type: Option<String>,
    pub window: DateRange,
    pub limit: Option<usize>,
}

impl EventHistoryFilter {
    pub fn matches(&self, event: &EventRecord) -> bool {
        if let Some(event_type) = &self.event_type
            && &event.event_type != event_type
        {
            return false;
        }
        self.window.contains(event.timestamp)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub location: Option<String>,
    pub low_stock_only: bool,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_range_contains_everything() {
        assert!(DateRange::default().contains(Utc::now()));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let now = Utc::now();
        let range = DateRange::new(Some(now), Some(now + Duration::hours(1)));
        assert!(range.contains(now));
        assert!(range.contains(now + Duration::hours(1)));
        assert!(!range.contains(now - Duration::seconds(1)));
        assert!(!range.contains(now + Duration::hours(2)));
    }

    #[test]
    fn default_limit_is_one_hundred() {
        assert_eq!(PurchaseOrderFilter::default().effective_limit(), 100);
        assert_eq!(EventHistoryFilter::default().effective_limit(), 100);
        let capped = PurchaseOrderFilter {
            limit: Some(5),
            ..Default::default()
        };
        assert_eq!(capped.effective_limit(), 5);
    }
}
