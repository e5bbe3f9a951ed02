//! Integration tests: encoded domain events through the in-memory broker.

use broker::{Broker, Destination, InMemoryBroker, Message, Topology, headers};
use common::{CorrelationContext, StockLowEvent, UrgencyLevel};

#[tokio::test]
async fn event_survives_publish_and_consume() {
    let broker = InMemoryBroker::named("b");
    let destination = Destination::new("stock-bajo-exchange", "stock.bajo");
    broker
        .declare(&Topology::new().route("stock-bajo-queue", &destination))
        .await
        .unwrap();

    let event = StockLowEvent::new("P1", "Vaccine", 2, 10, "warehouse-a", UrgencyLevel::High);
    let ctx = CorrelationContext::new("corr-1", "failure-1");
    broker
        .publish(&destination, Message::from_event(&event, &ctx).unwrap())
        .await
        .unwrap();

    let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();
    let delivery = sub.next().await.unwrap().unwrap();

    assert_eq!(delivery.message.id, event.id);
    assert_eq!(delivery.message.correlation_context(), ctx);
    assert_eq!(delivery.message.header(headers::EVENT_TYPE), Some("StockBajo"));
    assert_eq!(delivery.message.decode::<StockLowEvent>().unwrap(), event);
    delivery.ack().await.unwrap();
}

#[tokio::test]
async fn fanout_to_every_bound_queue() {
    let broker = InMemoryBroker::new();
    let destination = Destination::new("inventario-recibido-exchange", "inventario.recibido");
    let topology = Topology::new()
        .route("inventario-recibido-bridge", &destination)
        .route("inventario-recibido-audit", &destination);
    broker.declare(&topology).await.unwrap();
    broker.declare(&topology).await.unwrap();

    broker
        .publish(&destination, Message::new("evt-1", b"{}".to_vec()))
        .await
        .unwrap();

    assert_eq!(broker.queue_depth("inventario-recibido-bridge"), 1);
    assert_eq!(broker.queue_depth("inventario-recibido-audit"), 1);
}

#[tokio::test]
async fn competing_consumers_share_a_queue() {
    let broker = InMemoryBroker::new();
    let destination = Destination::new("x", "k");
    broker
        .declare(&Topology::new().route("q", &destination))
        .await
        .unwrap();
    for id in ["m-1", "m-2"] {
        broker
            .publish(&destination, Message::new(id, Vec::new()))
            .await
            .unwrap();
    }

    let mut a = broker.subscribe("q", 1).await.unwrap();
    let mut b = broker.subscribe("q", 1).await.unwrap();
    let first = a.next().await.unwrap().unwrap();
    let second = b.next().await.unwrap().unwrap();

    let mut ids = vec![first.message.id.clone(), second.message.id.clone()];
    ids.sort();
    assert_eq!(ids, vec!["m-1", "m-2"]);
}
