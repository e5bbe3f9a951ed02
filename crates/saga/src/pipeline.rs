//! Wires processors, consumers and bridges into running worker loops.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use broker::{Destination, SharedBroker, Topology};
use common::event_types;
use domain::{
    InventoryProcessor, Product, PurchaseOrder, PurchaseOrderProcessor, ReceptionProcessor,
    SupplierDirectory, SupplierReception,
};
use event_store::{EventStore, ReadModelStore};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::bridge::{Bridge, BridgeRoute};
use crate::consumer::{ConsumerConfig, IdempotentConsumer, MessageHandler};
use crate::handlers::{
    ColdChainHandler, EventPublisher, InventoryReceivedHandler, ReceptionHandler, StockLowHandler,
};
use crate::retry::RetryPolicy;
use crate::shutdown::Shutdown;
use crate::topology::{self, StockLowBinding};
use crate::worker::Worker;
use crate::{Result, SagaError};

/// A group of workers that can run in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Cold-chain failures and inventory receipts.
    Inventory,
    PurchaseOrder,
    Supplier,
    /// Both cross-broker relays.
    Bridge,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Inventory,
        Stage::PurchaseOrder,
        Stage::Supplier,
        Stage::Bridge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Inventory => "inventory",
            Stage::PurchaseOrder => "purchase-order",
            Stage::Supplier => "supplier",
            Stage::Bridge => "bridge",
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub stages: BTreeSet<Stage>,
    pub prefetch: u16,
    /// Attempts per message before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub dead_letter_exchange: Option<String>,
    pub stock_low: StockLowBinding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.into_iter().collect(),
            prefetch: 1,
            max_attempts: None,
            dead_letter_exchange: None,
            stock_low: StockLowBinding::default(),
        }
    }
}

impl PipelineConfig {
    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Retry policy for a consumer of `queue`; dead letters are routed by queue name.
    pub fn retry_for(&self, queue: &str) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            dead_letter: self
                .dead_letter_exchange
                .as_ref()
                .map(|exchange| Destination::new(exchange.as_str(), queue)),
        }
    }
}

/// The three broker connections. They may point at the same broker.
#[derive(Clone)]
pub struct Brokers {
    /// Stock depletion.
    pub a: SharedBroker,
    /// Purchase orders and supplier receptions.
    pub b: SharedBroker,
    /// Inventory receipts.
    pub c: SharedBroker,
}

impl Brokers {
    pub fn new(a: SharedBroker, b: SharedBroker, c: SharedBroker) -> Self {
        Self { a, b, c }
    }

    fn all(&self) -> [&SharedBroker; 3] {
        [&self.a, &self.b, &self.c]
    }

    async fn close(&self) {
        for broker in self.all() {
            if let Err(err) = broker.close().await {
                error!(broker = broker.name(), error = %err, "Broker close failed");
            }
        }
    }
}

/// Builder for the set of worker loops this process runs.
///
/// Only workers of configured [`Stage`]s are added; the rest of the chain is
/// expected to run elsewhere.
pub struct Pipeline {
    config: PipelineConfig,
    brokers: Brokers,
    workers: Vec<Arc<dyn Worker>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, brokers: Brokers) -> Self {
        let mut pipeline = Self {
            config,
            brokers,
            workers: Vec::new(),
        };
        if pipeline.config.runs(Stage::Bridge) {
            pipeline.add_bridges();
        }
        pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn brokers(&self) -> &Brokers {
        &self.brokers
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    pub fn with_inventory<E, R>(mut self, processor: Arc<InventoryProcessor<E, R>>) -> Self
    where
        E: EventStore + 'static,
        R: ReadModelStore<Product> + 'static,
    {
        if !self.config.runs(Stage::Inventory) {
            return self;
        }
        let a = self.brokers.a.clone();
        let c = self.brokers.c.clone();
        let stock_low = EventPublisher::new(a.clone(), topology::stock_low_source());
        self.add_consumer(
            a,
            topology::COLD_CHAIN_QUEUE,
            ColdChainHandler::new(Arc::clone(&processor), stock_low),
        );
        self.add_consumer(
            c,
            topology::INVENTORY_RECEIVED_QUEUE,
            InventoryReceivedHandler::new(processor),
        );
        self
    }

    pub fn with_purchase_orders<E, R, D>(
        mut self,
        processor: Arc<PurchaseOrderProcessor<E, R, D>>,
    ) -> Self
    where
        E: EventStore + 'static,
        R: ReadModelStore<PurchaseOrder> + 'static,
        D: SupplierDirectory + 'static,
    {
        if !self.config.runs(Stage::PurchaseOrder) {
            return self;
        }
        let b = self.brokers.b.clone();
        let receptions = EventPublisher::new(b.clone(), topology::reception_target());
        let queue = self.config.stock_low.queue.clone();
        self.add_consumer(b, &queue, StockLowHandler::new(processor, receptions));
        self
    }

    pub fn with_supplier<E, R>(mut self, processor: Arc<ReceptionProcessor<E, R>>) -> Self
    where
        E: EventStore + 'static,
        R: ReadModelStore<SupplierReception> + 'static,
    {
        if !self.config.runs(Stage::Supplier) {
            return self;
        }
        let b = self.brokers.b.clone();
        let received = EventPublisher::new(b.clone(), topology::inventory_received_source());
        self.add_consumer(
            b,
            topology::RECEPTION_QUEUE,
            ReceptionHandler::new(processor, received),
        );
        self
    }

    fn add_consumer<H: MessageHandler>(&mut self, broker: SharedBroker, queue: &str, handler: H) {
        let config = ConsumerConfig::new(queue)
            .with_prefetch(self.config.prefetch)
            .with_retry(self.config.retry_for(queue));
        self.workers
            .push(Arc::new(IdempotentConsumer::new(broker, config, handler)));
    }

    fn add_bridges(&mut self) {
        let routes = [
            (
                self.brokers.a.clone(),
                self.brokers.b.clone(),
                BridgeRoute {
                    name: "stock_bajo_a_to_b".into(),
                    event_type: event_types::STOCK_LOW.into(),
                    source_queue: topology::STOCK_LOW_BRIDGE_QUEUE.into(),
                    target: self.config.stock_low.destination(),
                },
            ),
            (
                self.brokers.b.clone(),
                self.brokers.c.clone(),
                BridgeRoute {
                    name: "inventario_recibido_b_to_c".into(),
                    event_type: event_types::INVENTORY_RECEIVED.into(),
                    source_queue: topology::INVENTORY_RECEIVED_BRIDGE_QUEUE.into(),
                    target: topology::inventory_received_target(),
                },
            ),
        ];
        for (source, target, route) in routes {
            self.workers.push(Arc::new(
                Bridge::new(source, target, route).with_prefetch(self.config.prefetch),
            ));
        }
    }

    /// Declares the full topology on all three brokers.
    ///
    /// Every queue is declared even when its consumer runs in another
    /// process, so nothing published before that process starts is lost.
    pub async fn declare(&self) -> Result<()> {
        let dead_letter = self
            .config
            .dead_letter_exchange
            .as_deref()
            .map(topology::dead_letter)
            .unwrap_or_default();

        let declarations = [
            (&self.brokers.a, topology::broker_a()),
            (&self.brokers.b, topology::broker_b(&self.config.stock_low)),
            (&self.brokers.c, topology::broker_c()),
        ];
        for (broker, declared) in declarations {
            let declared: Topology = declared.merge(dead_letter.clone());
            broker.declare(&declared).await?;
            info!(
                broker = broker.name(),
                exchanges = declared.exchanges.len(),
                queues = declared.queues.len(),
                "Topology declared"
            );
        }
        Ok(())
    }

    /// Declares topology and spawns every worker.
    pub async fn start(self, shutdown: Shutdown) -> Result<PipelineHandle> {
        self.declare().await?;

        let mut tasks = JoinSet::new();
        for worker in self.workers {
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let name = worker.name();
                let result = worker.run(shutdown).await;
                (name, result)
            });
        }
        info!(workers = tasks.len(), "Pipeline started");

        Ok(PipelineHandle {
            tasks,
            brokers: self.brokers,
        })
    }
}

/// Running workers. Join after triggering shutdown.
pub struct PipelineHandle {
    tasks: JoinSet<(String, Result<()>)>,
    brokers: Brokers,
}

impl PipelineHandle {
    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every worker to stop, then closes the brokers.
    ///
    /// Returns the first worker error, if any.
    pub async fn join(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(worker = %name, "Worker finished"),
                Ok((name, Err(err))) => {
                    error!(worker = %name, error = %err, "Worker failed");
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    error!(error = %err, "Worker task aborted");
                    first_error.get_or_insert(SagaError::WorkerFailed {
                        worker: "unknown".into(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.brokers.close().await;
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_parse_from_names() {
        assert_eq!("purchase-order".parse::<Stage>(), Ok(Stage::PurchaseOrder));
        assert_eq!(" bridge ".parse::<Stage>(), Ok(Stage::Bridge));
        assert!("billing".parse::<Stage>().is_err());
    }

    #[test]
    fn retry_policy_routes_dead_letters_by_queue() {
        let config = PipelineConfig {
            max_attempts: Some(5),
            dead_letter_exchange: Some("pipeline-dlx".into()),
            ..Default::default()
        };
        let policy = config.retry_for("stock-bajo-queue");
        assert_eq!(policy.max_attempts, Some(5));
        assert_eq!(
            policy.dead_letter,
            Some(Destination::new("pipeline-dlx", "stock-bajo-queue"))
        );
        assert_eq!(PipelineConfig::default().retry_for("q"), RetryPolicy::default());
    }
}
