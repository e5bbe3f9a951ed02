//! Table names created by `migrations/001_create_service_tables.sql`.

pub const INVENTORY_EVENTS: &str = "inventory_events";
pub const INVENTORY_READ_MODEL: &str = "inventory_read_model";

pub const PURCHASE_ORDER_EVENTS: &str = "purchase_order_events";
pub const PURCHASE_ORDER_READ_MODEL: &str = "purchase_order_read_model";

pub const SUPPLIER_EVENTS: &str = "supplier_events";
pub const SUPPLIER_READ_MODEL: &str = "supplier_read_model";

/// Every table, in creation order.
pub const ALL: [&str; 6] = [
    INVENTORY_EVENTS,
    INVENTORY_READ_MODEL,
    PURCHASE_ORDER_EVENTS,
    PURCHASE_ORDER_READ_MODEL,
    SUPPLIER_EVENTS,
    SUPPLIER_READ_MODEL,
];
