use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, StockLowEvent, UrgencyLevel};
use event_store::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::{PurchaseOrderEvent, StatusChange};
use super::policy::{EXPECTED_LEAD_TIME_DAYS, reorder_quantity};
use super::{PurchaseOrderError, PurchaseOrderStatus};
use crate::aggregate::Aggregate;
use crate::supplier::Supplier;

/// Metadata key linking an order to the stock-low event that caused it.
pub(crate) const STOCK_LOW_EVENT_ID_KEY: &str = "stock_low_event_id";
/// Metadata key flagging goods that need refrigerated handling.
pub(crate) const TEMPERATURE_CONTROLLED_KEY: &str = "temperature_controlled";

/// Latest state of a purchase order.
///
/// Stored whole as the read-model document and embedded as a snapshot in
/// every event of its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: AggregateId,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub supplier_id: String,
    pub supplier_name: String,
    pub location: String,
    pub status: PurchaseOrderStatus,
    pub urgency_level: UrgencyLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PurchaseOrder {
    /// Builds a pending order with the standard lead time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AggregateId,
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i64,
        supplier: &Supplier,
        location: impl Into<String>,
        urgency_level: UrgencyLevel,
        now: DateTime<Utc>,
    ) -> Result<Self, PurchaseOrderError> {
        let product_id = product_id.into();
        if product_id.trim().is_empty() {
            return Err(PurchaseOrderError::ProductIdRequired);
        }
        if quantity <= 0 {
            return Err(PurchaseOrderError::InvalidQuantity(quantity));
        }

        Ok(Self {
            id,
            product_id,
            product_name: product_name.into(),
            quantity,
            supplier_id: supplier.id.clone(),
            supplier_name: supplier.name.clone(),
            location: location.into(),
            status: PurchaseOrderStatus::Pending,
            urgency_level,
            created_at: now,
            updated_at: now,
            expected_date: Some(now + Duration::days(EXPECTED_LEAD_TIME_DAYS)),
            actual_date: None,
            metadata: Map::new(),
        })
    }

    /// Derives the reorder for a stock-low event.
    ///
    /// The id is derived from the event id, so the same event always maps to
    /// the same order.
    pub fn from_stock_low(
        event: &StockLowEvent,
        supplier: &Supplier,
        now: DateTime<Utc>,
    ) -> Result<Self, PurchaseOrderError> {
        let quantity = reorder_quantity(event.minimum_stock, &event.urgency_level)
            .ok_or(PurchaseOrderError::QuantityOutOfRange(event.minimum_stock))?;
        let mut order = Self::new(
            Self::id_for_stock_low(&event.id),
            &event.product_id,
            &event.product_name,
            quantity,
            supplier,
            &event.location,
            event.urgency_level.clone(),
            now,
        )?;
        order.metadata.insert(
            STOCK_LOW_EVENT_ID_KEY.to_string(),
            Value::String(event.id.clone()),
        );
        if let Some(flag) = event.metadata.get(TEMPERATURE_CONTROLLED_KEY) {
            order
                .metadata
                .insert(TEMPERATURE_CONTROLLED_KEY.to_string(), flag.clone());
        }
        Ok(order)
    }

    pub fn id_for_stock_low(stock_low_event_id: &str) -> AggregateId {
        AggregateId::derived_from("purchase-order", stock_low_event_id)
    }

    /// Moves the order to `status`.
    ///
    /// Arriving at `received` stamps `actual_date`. Re-applying the current
    /// status leaves the dates untouched apart from `updated_at`.
    pub fn update_status(
        &mut self,
        status: PurchaseOrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, PurchaseOrderError> {
        if !self.status.can_transition_to(status) {
            return Err(PurchaseOrderError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        let change = StatusChange {
            old_status: self.status,
            new_status: status,
        };
        if status == PurchaseOrderStatus::Received && self.actual_date.is_none() {
            self.actual_date = Some(now);
        }
        self.status = status;
        self.updated_at = now;
        Ok(change)
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// True while not completed and `now` is past the expected date.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.expected_date {
            Some(expected) => now > expected && !self.is_completed(),
            None => false,
        }
    }

    pub fn stock_low_event_id(&self) -> Option<&str> {
        self.metadata
            .get(STOCK_LOW_EVENT_ID_KEY)
            .and_then(Value::as_str)
    }
}

impl Document for PurchaseOrder {
    fn document_id(&self) -> AggregateId {
        self.id.clone()
    }
}

impl Aggregate for PurchaseOrder {
    type Event = PurchaseOrderEvent;

    fn aggregate_type() -> &'static str {
        "PurchaseOrder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supplier() -> Supplier {
        Supplier::new("supplier-001", "Default Supplier")
    }

    fn stock_low(urgency: &str) -> StockLowEvent {
        StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::from(urgency))
    }

    #[test]
    fn stock_low_creates_pending_order() {
        let now = Utc::now();
        let event = stock_low("high");
        let order = PurchaseOrder::from_stock_low(&event, &supplier(), now).unwrap();

        assert_eq!(order.quantity, 40);
        assert_eq!(order.status, PurchaseOrderStatus::Pending);
        assert_eq!(order.expected_date, Some(order.created_at + Duration::days(7)));
        assert_eq!(order.supplier_id, "supplier-001");
        assert_eq!(order.stock_low_event_id(), Some(event.id.as_str()));
    }

    #[test]
    fn same_stock_low_event_gives_same_id() {
        let event = stock_low("low");
        let a = PurchaseOrder::from_stock_low(&event, &supplier(), Utc::now()).unwrap();
        let b = PurchaseOrder::from_stock_low(&event, &supplier(), Utc::now()).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, PurchaseOrder::id_for_stock_low("other"));
    }

    #[test]
    fn zero_minimum_stock_is_invalid() {
        let mut event = stock_low("high");
        event.minimum_stock = 0;
        let err = PurchaseOrder::from_stock_low(&event, &supplier(), Utc::now()).unwrap_err();
        assert!(matches!(err, PurchaseOrderError::InvalidQuantity(0)));
    }

    #[test]
    fn oversized_minimum_stock_is_out_of_range() {
        let mut event = stock_low("high");
        event.minimum_stock = i64::MAX / 2 + 1;
        let err = PurchaseOrder::from_stock_low(&event, &supplier(), Utc::now()).unwrap_err();
        assert!(matches!(err, PurchaseOrderError::QuantityOutOfRange(m) if m == i64::MAX / 2 + 1));
    }

    #[test]
    fn receiving_sets_actual_date_and_completes() {
        let now = Utc::now();
        let mut order = PurchaseOrder::from_stock_low(&stock_low("medium"), &supplier(), now).unwrap();

        let change = order
            .update_status(PurchaseOrderStatus::Received, now)
            .unwrap();

        assert_eq!(change.old_status, PurchaseOrderStatus::Pending);
        assert_eq!(change.new_status, PurchaseOrderStatus::Received);
        assert!(order.actual_date.is_some());
        assert!(order.is_completed());
    }

    #[test]
    fn regression_is_rejected() {
        let now = Utc::now();
        let mut order = PurchaseOrder::from_stock_low(&stock_low("low"), &supplier(), now).unwrap();
        order
            .update_status(PurchaseOrderStatus::Completed, now)
            .unwrap();

        let err = order
            .update_status(PurchaseOrderStatus::Pending, now)
            .unwrap_err();
        assert!(matches!(err, PurchaseOrderError::InvalidTransition { .. }));
        assert_eq!(order.status, PurchaseOrderStatus::Completed);
    }

    #[test]
    fn overdue_only_while_open_and_late() {
        let created = Utc::now() - Duration::days(10);
        let mut order = PurchaseOrder::from_stock_low(&stock_low("low"), &supplier(), created).unwrap();

        assert!(order.is_overdue_at(Utc::now()));
        assert!(!order.is_overdue_at(created + Duration::days(6)));

        order
            .update_status(PurchaseOrderStatus::Received, Utc::now())
            .unwrap();
        assert!(!order.is_overdue_at(Utc::now()));
    }

    #[test]
    fn no_expected_date_is_never_overdue() {
        let mut order = PurchaseOrder::from_stock_low(&stock_low("low"), &supplier(), Utc::now()).unwrap();
        order.expected_date = None;
        assert!(!order.is_overdue_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn document_roundtrips_through_json() {
        let order = PurchaseOrder::from_stock_low(&stock_low("critical"), &supplier(), Utc::now()).unwrap();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["urgency_level"], "critical");
        assert!(json.get("actual_date").is_none());

        let back: PurchaseOrder = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
