//! Queries over product stock and movement history.

use common::AggregateId;
use domain::{
    Aggregate, DomainError, InventoryEvent, InventoryMovement, Outcome, Product,
    inventory::INVENTORY_MOVEMENT_RECORDED,
};
use event_store::{EventQuery, EventStore, ReadModelStore};

use crate::filter::ProductFilter;

#[derive(Clone)]
pub struct InventoryQueries<R, E>
where
    R: ReadModelStore<Product>,
    E: EventStore,
{
    products: R,
    events: E,
}

impl<R, E> InventoryQueries<R, E>
where
    R: ReadModelStore<Product>,
    E: EventStore,
{
    pub fn new(products: R, events: E) -> Self {
        Self { products, events }
    }

    pub async fn get_product(&self, product_id: &str) -> Outcome<Product> {
        match self.products.get(&AggregateId::from(product_id)).await {
            Ok(Some(found)) => Outcome::Ok(found.document),
            Ok(None) => Outcome::not_found(Product::aggregate_type(), product_id),
            Err(err) => Outcome::StoreError(err.into()),
        }
    }

    pub async fn list_products(&self, filter: ProductFilter) -> Outcome<Vec<Product>> {
        let scanned = match self.products.scan().await {
            Ok(scanned) => scanned,
            Err(err) => return Outcome::StoreError(err.into()),
        };
        let limit = filter.limit.unwrap_or(event_store::DEFAULT_QUERY_LIMIT);
        Outcome::Ok(
            scanned
                .into_iter()
                .map(|v| v.document)
                .filter(|p| filter.location.as_ref().is_none_or(|l| &p.location == l))
                .filter(|p| !filter.low_stock_only || p.is_low())
                .take(limit)
                .collect(),
        )
    }

    /// Stock movements of one product, oldest first.
    pub async fn get_movements(&self, product_id: &str) -> Outcome<Vec<InventoryMovement>> {
        self.movements(product_id).await.into()
    }

    async fn movements(&self, product_id: &str) -> Result<Vec<InventoryMovement>, DomainError> {
        let records = self
            .events
            .query_events(EventQuery {
                event_type: Some(INVENTORY_MOVEMENT_RECORDED.to_string()),
                ..EventQuery::for_aggregate(AggregateId::from(product_id))
            })
            .await?;

        records
            .iter()
            .map(|record| match InventoryEvent::from_record(record)? {
                InventoryEvent::MovementRecorded(recorded) => Ok(recorded.movement),
                _ => Err(DomainError::Validation(format!(
                    "event {} is not a movement",
                    record.id
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{CorrelationContext, InventoryReceivedEvent, event_types};
    use domain::{InventoryProcessor, MovementType};
    use event_store::{InMemoryEventStore, InMemoryReadModelStore};
    use serde_json::Map;

    fn product(id: &str, stock: i64, location: &str) -> Product {
        Product {
            id: id.into(),
            name: format!("Product {id}"),
            current_stock: stock,
            minimum_stock: 10,
            maximum_stock: 100,
            location: location.into(),
            temperature_controlled: false,
            last_updated: Utc::now(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn lists_low_stock_by_location() {
        let events = InMemoryEventStore::new();
        let products: InMemoryReadModelStore<Product> = InMemoryReadModelStore::new();
        let processor = InventoryProcessor::new(events.clone(), products.clone());
        let ctx = CorrelationContext::default();
        for p in [
            product("P1", 5, "warehouse-a"),
            product("P2", 50, "warehouse-a"),
            product("P3", 2, "warehouse-b"),
        ] {
            processor.register_product(p, &ctx).await.ok().unwrap();
        }

        let queries = InventoryQueries::new(products, events);
        let low = queries
            .list_products(ProductFilter {
                location: Some("warehouse-a".into()),
                low_stock_only: true,
                limit: None,
            })
            .await
            .ok()
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "P1");

        assert!(matches!(
            queries.get_product("P9").await,
            Outcome::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn movement_history_follows_receipts() {
        let events = InMemoryEventStore::new();
        let products: InMemoryReadModelStore<Product> = InMemoryReadModelStore::new();
        let processor = InventoryProcessor::new(events.clone(), products.clone());
        let ctx = CorrelationContext::default();
        processor
            .register_product(product("P1", 5, "warehouse-a"), &ctx)
            .await
            .ok()
            .unwrap();

        let received = InventoryReceivedEvent {
            id: "ir-1".into(),
            timestamp: Utc::now(),
            event_type: event_types::INVENTORY_RECEIVED.into(),
            purchase_order_id: "po-1".into(),
            product_id: "P1".into(),
            product_name: "Product P1".into(),
            quantity: 30,
            supplier_id: "supplier-001".into(),
            supplier_name: "Default Supplier".into(),
            location: "warehouse-a".into(),
            status: "received".into(),
            received_at: Utc::now(),
            quality_check: "passed".into(),
            temperature: None,
            batch_number: "BATCH-00000000".into(),
            expiry_date: None,
            metadata: Map::new(),
        };
        processor
            .process_inventory_received(&received, &ctx)
            .await
            .ok()
            .unwrap();

        let queries = InventoryQueries::new(products, events);
        let movements = queries.get_movements("P1").await.ok().unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::In);
        assert_eq!(movements[0].quantity, 30);
        assert_eq!(queries.get_product("P1").await.ok().unwrap().current_stock, 35);
    }
}
