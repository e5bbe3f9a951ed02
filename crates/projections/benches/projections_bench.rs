use common::{CorrelationContext, StockLowEvent, UrgencyLevel};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{PurchaseOrder, PurchaseOrderProcessor, StaticSupplierDirectory};
use event_store::{InMemoryEventStore, InMemoryReadModelStore};
use projections::{
    DateRange, PurchaseOrderFilter, PurchaseOrderProjection, PurchaseOrderQueries,
    ReadModelRebuilder,
};

/// Populate a store and read model with N purchase orders.
async fn populate(
    events: &InMemoryEventStore,
    read_model: &InMemoryReadModelStore<PurchaseOrder>,
    n: usize,
) {
    let processor = PurchaseOrderProcessor::new(
        events.clone(),
        read_model.clone(),
        StaticSupplierDirectory::default(),
    );
    let ctx = CorrelationContext::default();
    let urgencies = [
        UrgencyLevel::Low,
        UrgencyLevel::Medium,
        UrgencyLevel::High,
        UrgencyLevel::Critical,
    ];
    for i in 0..n {
        let event = StockLowEvent::new(
            format!("P{i}"),
            "Vaccine",
            1,
            10,
            "warehouse-a",
            urgencies[i % urgencies.len()].clone(),
        );
        processor.process_stock_low(&event, &ctx).await.ok().unwrap();
    }
}

fn bench_rebuild_1000_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let events = InMemoryEventStore::new();
    rt.block_on(populate(&events, &InMemoryReadModelStore::new(), 1000));

    c.bench_function("projections/rebuild_1000_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                let fresh: InMemoryReadModelStore<PurchaseOrder> = InMemoryReadModelStore::new();
                ReadModelRebuilder::new(events.clone())
                    .register(PurchaseOrderProjection::new(fresh))
                    .rebuild()
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_queries(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let events = InMemoryEventStore::new();
    let read_model = InMemoryReadModelStore::new();
    rt.block_on(populate(&events, &read_model, 1000));
    let queries = PurchaseOrderQueries::new(read_model, events);

    c.bench_function("projections/list_critical_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                queries
                    .list_purchase_orders(PurchaseOrderFilter {
                        urgency_level: Some(UrgencyLevel::Critical),
                        ..Default::default()
                    })
                    .await
                    .ok()
                    .unwrap()
            })
        });
    });

    c.bench_function("projections/statistics_1000_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                queries
                    .get_statistics(DateRange::default())
                    .await
                    .ok()
                    .unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_rebuild_1000_orders, bench_queries);
criterion_main!(benches);
