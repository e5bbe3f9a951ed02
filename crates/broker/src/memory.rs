use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::message::Message;
use crate::topology::{Binding, Destination, ExchangeKind, Topology};
use crate::transport::{Acknowledger, Broker, Delivery, Subscription};
use crate::{BrokerError, Result};

/// In-process broker with AMQP semantics, used by tests and the local profile.
///
/// Topic exchanges route by pattern, queues hold messages until a consumer
/// settles them, and a nacked or abandoned delivery goes back to the head of
/// its queue flagged as redelivered. The default exchange (`""`) routes
/// straight to the queue named by the routing key.
#[derive(Clone)]
pub struct InMemoryBroker {
    name: Arc<str>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
}

struct MemoryQueue {
    ready: Mutex<VecDeque<Pending>>,
    notify: Notify,
}

struct Pending {
    message: Message,
    redelivered: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryQueue {
    fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, pending: Pending) {
        lock(&self.ready).push_back(pending);
        self.notify.notify_one();
    }

    fn requeue(&self, mut pending: Pending) {
        pending.redelivered = true;
        lock(&self.ready).push_front(pending);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Pending> {
        lock(&self.ready).pop_front()
    }

    fn len(&self) -> usize {
        lock(&self.ready).len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::named("default")
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: Arc::from(format!("memory://{name}")),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Makes every subsequent call fail with `Unavailable` (for testing).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages waiting in a queue, not counting unsettled deliveries.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.find_queue(queue).map_or(0, |q| q.len())
    }

    /// Removes and returns every waiting message of a queue.
    pub fn drain(&self, queue: &str) -> Vec<Message> {
        let Ok(queue) = self.find_queue(queue) else {
            return Vec::new();
        };
        std::iter::from_fn(|| queue.pop())
            .map(|p| p.message)
            .collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(format!(
                "{} switched off",
                self.name
            )));
        }
        Ok(())
    }

    fn find_queue(&self, queue: &str) -> Result<Arc<MemoryQueue>> {
        lock(&self.shared.state)
            .queues
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))
    }

    fn route(&self, destination: &Destination) -> Result<Vec<Arc<MemoryQueue>>> {
        let state = lock(&self.shared.state);
        if destination.exchange.is_empty() {
            return state
                .queues
                .get(&destination.routing_key)
                .map(|q| vec![Arc::clone(q)])
                .ok_or_else(|| BrokerError::UnknownQueue(destination.routing_key.clone()));
        }

        let kind = state
            .exchanges
            .get(&destination.exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(destination.exchange.clone()))?;
        Ok(state
            .bindings
            .iter()
            .filter(|b| {
                b.exchange == destination.exchange
                    && kind.routes(&b.routing_key, &destination.routing_key)
            })
            .filter_map(|b| state.queues.get(&b.queue).cloned())
            .collect())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn declare(&self, topology: &Topology) -> Result<()> {
        self.check_available()?;
        let mut state = lock(&self.shared.state);

        for exchange in &topology.exchanges {
            state
                .exchanges
                .entry(exchange.name.clone())
                .or_insert(exchange.kind);
        }
        for queue in &topology.queues {
            state
                .queues
                .entry(queue.name.clone())
                .or_insert_with(|| Arc::new(MemoryQueue::new()));
        }
        for binding in &topology.bindings {
            if !state.exchanges.contains_key(&binding.exchange) {
                return Err(BrokerError::UnknownExchange(binding.exchange.clone()));
            }
            if !state.queues.contains_key(&binding.queue) {
                return Err(BrokerError::UnknownQueue(binding.queue.clone()));
            }
            if !state.bindings.contains(binding) {
                state.bindings.push(binding.clone());
            }
        }
        Ok(())
    }

    async fn publish(&self, destination: &Destination, message: Message) -> Result<()> {
        self.check_available()?;
        let targets = self.route(destination)?;
        if targets.is_empty() {
            tracing::debug!(%destination, message_id = %message.id, "Unroutable message dropped");
        }
        for queue in targets {
            queue.push(Pending {
                message: message.clone(),
                redelivered: false,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Subscription>> {
        self.check_available()?;
        Ok(Box::new(MemorySubscription {
            name: queue.to_string(),
            queue: self.find_queue(queue)?,
            permits: Arc::new(Semaphore::new(usize::from(prefetch.max(1)))),
            closed: false,
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemorySubscription {
    name: String,
    queue: Arc<MemoryQueue>,
    permits: Arc<Semaphore>,
    closed: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn queue(&self) -> &str {
        &self.name
    }

    async fn next(&mut self) -> Option<Result<Delivery>> {
        if self.closed {
            return None;
        }
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok()?;
        loop {
            if let Some(pending) = self.queue.pop() {
                let message = pending.message.clone();
                let redelivered = pending.redelivered;
                let acker = MemoryAcker {
                    queue: Arc::clone(&self.queue),
                    pending: Mutex::new(Some(pending)),
                    _permit: permit,
                };
                return Some(Ok(Delivery::new(message, redelivered, Box::new(acker))));
            }
            self.queue.notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.permits.close();
        Ok(())
    }
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    pending: Mutex<Option<Pending>>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        lock(&self.pending).take();
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        let pending = lock(&self.pending).take();
        if requeue && let Some(pending) = pending {
            self.queue.requeue(pending);
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.pending).take() {
            self.queue.requeue(pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stock_low_topology() -> Topology {
        Topology::new().route(
            "stock-bajo-queue",
            &Destination::new("stock-bajo-exchange", "stock.bajo"),
        )
    }

    async fn broker() -> InMemoryBroker {
        let broker = InMemoryBroker::named("test");
        broker.declare(&stock_low_topology()).await.unwrap();
        broker
    }

    fn destination() -> Destination {
        Destination::new("stock-bajo-exchange", "stock.bajo")
    }

    #[tokio::test]
    async fn published_message_reaches_bound_queue() {
        let broker = broker().await;
        broker
            .publish(&destination(), Message::new("m-1", b"{}".to_vec()))
            .await
            .unwrap();
        assert_eq!(broker.queue_depth("stock-bajo-queue"), 1);

        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();
        let delivery = sub.next().await.unwrap().unwrap();
        assert_eq!(delivery.message.id, "m-1");
        assert!(!delivery.redelivered);
        delivery.ack().await.unwrap();
        assert_eq!(broker.queue_depth("stock-bajo-queue"), 0);
    }

    #[tokio::test]
    async fn unmatched_routing_key_is_dropped() {
        let broker = broker().await;
        broker
            .publish(
                &Destination::new("stock-bajo-exchange", "stock.alto"),
                Message::new("m-1", Vec::new()),
            )
            .await
            .unwrap();
        assert_eq!(broker.queue_depth("stock-bajo-queue"), 0);
    }

    #[tokio::test]
    async fn unknown_exchange_is_an_error() {
        let broker = broker().await;
        let err = broker
            .publish(&Destination::new("nope", "x"), Message::new("m", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::UnknownExchange(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers_first() {
        let broker = broker().await;
        for id in ["m-1", "m-2"] {
            broker
                .publish(&destination(), Message::new(id, Vec::new()))
                .await
                .unwrap();
        }
        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();

        let first = sub.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();

        let again = sub.next().await.unwrap().unwrap();
        assert_eq!(again.message.id, "m-1");
        assert!(again.redelivered);
        again.reject().await.unwrap();

        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.message.id, "m-2");
        second.ack().await.unwrap();
        assert_eq!(broker.queue_depth("stock-bajo-queue"), 0);
    }

    #[tokio::test]
    async fn dropped_delivery_returns_to_queue() {
        let broker = broker().await;
        broker
            .publish(&destination(), Message::new("m-1", Vec::new()))
            .await
            .unwrap();
        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();
        drop(sub.next().await.unwrap().unwrap());

        assert_eq!(broker.drain("stock-bajo-queue")[0].id, "m-1");
    }

    #[tokio::test]
    async fn prefetch_bounds_unsettled_deliveries() {
        let broker = broker().await;
        for id in ["m-1", "m-2"] {
            broker
                .publish(&destination(), Message::new(id, Vec::new()))
                .await
                .unwrap();
        }
        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();
        let first = sub.next().await.unwrap().unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(blocked.is_err());

        first.ack().await.unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.message.id, "m-2");
    }

    #[tokio::test]
    async fn next_waits_for_publish() {
        let broker = broker().await;
        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher
                .publish(&destination(), Message::new("late", Vec::new()))
                .await
                .unwrap();
        });

        let delivery = sub.next().await.unwrap().unwrap();
        assert_eq!(delivery.message.id, "late");
    }

    #[tokio::test]
    async fn default_exchange_targets_queue_by_name() {
        let broker = broker().await;
        broker
            .publish(
                &Destination::new("", "stock-bajo-queue"),
                Message::new("direct", Vec::new()),
            )
            .await
            .unwrap();
        assert_eq!(broker.queue_depth("stock-bajo-queue"), 1);
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let broker = broker().await;
        broker.set_unavailable(true);
        let err = broker
            .publish(&destination(), Message::new("m", Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(broker.ping().await.is_err());

        broker.set_unavailable(false);
        assert!(broker.ping().await.is_ok());
    }

    #[tokio::test]
    async fn closed_subscription_ends() {
        let broker = broker().await;
        let mut sub = broker.subscribe("stock-bajo-queue", 1).await.unwrap();
        sub.close().await.unwrap();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn binding_to_undeclared_queue_fails() {
        let broker = InMemoryBroker::new();
        let topology = Topology::new()
            .exchange("x")
            .bind("missing", "x", "#");
        assert!(matches!(
            broker.declare(&topology).await,
            Err(BrokerError::UnknownQueue(_))
        ));
    }
}
