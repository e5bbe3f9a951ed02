//! Message-driven side of the cold-chain pipeline.
//!
//! A cold-chain failure on broker A travels through three services and
//! three brokers before stock is replenished:
//!
//! 1. inventory consumes `FallaCadenaFrio` and may emit `StockBajo` (A)
//! 2. a bridge relays `StockBajo` from A to B
//! 3. purchasing turns it into a purchase order and a `RecepcionProveedor` (B)
//! 4. the supplier service checks the delivery in and emits `InventarioRecibido` (B)
//! 5. a bridge relays `InventarioRecibido` from B to C
//! 6. inventory consumes it and restocks (C)
//!
//! Every consumer is an [`IdempotentConsumer`] wrapping a [`MessageHandler`];
//! every relay is a [`Bridge`]. [`Pipeline`] wires them and runs them until
//! shutdown.

pub mod bridge;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod retry;
pub mod shutdown;
pub mod state;
pub mod topology;
pub mod worker;

pub use bridge::{Bridge, BridgeRoute, transform};
pub use consumer::{ConsumerConfig, Disposition, IdempotentConsumer, MessageHandler};
pub use error::{HandlerError, Result, SagaError, expect_ok};
pub use handlers::{
    ColdChainHandler, EventPublisher, InventoryReceivedHandler, ReceptionHandler, StockLowHandler,
};
pub use pipeline::{Brokers, Pipeline, PipelineConfig, PipelineHandle, Stage};
pub use retry::{RetryPolicy, RetryTracker};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use state::RelayState;
pub use topology::StockLowBinding;
pub use worker::Worker;
