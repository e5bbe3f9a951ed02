//! Names of the exchanges, queues and routing keys the pipeline uses.
//!
//! Broker A carries stock depletion, broker B purchase orders and supplier
//! receptions, broker C inventory receipts.

use broker::{Destination, Topology};
use common::event_types;

/// Stage-2 inbound queue on broker B. Configurable per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLowBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

impl Default for StockLowBinding {
    fn default() -> Self {
        Self {
            queue: "stock-bajo-queue".into(),
            exchange: "stock-bajo-exchange".into(),
            routing_key: "stock.bajo".into(),
        }
    }
}

impl StockLowBinding {
    pub fn destination(&self) -> Destination {
        Destination::new(self.exchange.as_str(), self.routing_key.as_str())
    }
}

pub const COLD_CHAIN_QUEUE: &str = "movimiento-inventario-group";
pub const STOCK_LOW_BRIDGE_QUEUE: &str = "stock-bajo-bridge";
pub const RECEPTION_QUEUE: &str = "recepcion-proveedor";
pub const INVENTORY_RECEIVED_BRIDGE_QUEUE: &str = "inventario-recibido-bridge";
pub const INVENTORY_RECEIVED_QUEUE: &str = "inventario-recibido-queue";

/// Cold-chain failures arrive here on broker A.
pub fn cold_chain_source() -> Destination {
    Destination::new(event_types::COLD_CHAIN_FAILURE, "falla.cadena.frio")
}

/// Stock-low signals leave stage 1 here on broker A.
pub fn stock_low_source() -> Destination {
    Destination::new(event_types::STOCK_LOW, "stock.bajo")
}

/// Pending receptions leave stage 2 here on broker B.
pub fn reception_target() -> Destination {
    Destination::new("recepcion-proveedor-exchange", "recepcion.proveedor")
}

/// Received inventory leaves stage 3 here on broker B.
pub fn inventory_received_source() -> Destination {
    Destination::new("inventario-recibido-exchange", "inventario.recibido")
}

/// Received inventory arrives for stage 4 here on broker C.
pub fn inventory_received_target() -> Destination {
    Destination::new(event_types::INVENTORY_RECEIVED, "inventario.recibido")
}

pub fn broker_a() -> Topology {
    Topology::new()
        .route(COLD_CHAIN_QUEUE, &cold_chain_source())
        .route(STOCK_LOW_BRIDGE_QUEUE, &stock_low_source())
}

pub fn broker_b(stock_low: &StockLowBinding) -> Topology {
    Topology::new()
        .route(&stock_low.queue, &stock_low.destination())
        .route(RECEPTION_QUEUE, &reception_target())
        .route(INVENTORY_RECEIVED_BRIDGE_QUEUE, &inventory_received_source())
}

pub fn broker_c() -> Topology {
    Topology::new().route(INVENTORY_RECEIVED_QUEUE, &inventory_received_target())
}

/// Dead-letter exchange plus a catch-all queue that keeps what lands there.
pub fn dead_letter(exchange: &str) -> Topology {
    Topology::new().route(
        &format!("{exchange}-queue"),
        &Destination::new(exchange, "#"),
    )
}
