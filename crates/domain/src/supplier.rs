//! Supplier lookup for new purchase orders.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
}

impl Supplier {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Resolves the preferred supplier for a product.
#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn supplier_for_product(&self, product_id: &str) -> Result<Supplier, DomainError>;
}

/// Fixed product-to-supplier table with a fallback supplier.
#[derive(Debug, Clone)]
pub struct StaticSupplierDirectory {
    default: Supplier,
    by_product: HashMap<String, Supplier>,
}

impl StaticSupplierDirectory {
    pub const DEFAULT_SUPPLIER_ID: &'static str = "supplier-001";
    pub const DEFAULT_SUPPLIER_NAME: &'static str = "Default Supplier";

    pub fn new(default: Supplier) -> Self {
        Self {
            default,
            by_product: HashMap::new(),
        }
    }

    pub fn with_supplier(mut self, product_id: impl Into<String>, supplier: Supplier) -> Self {
        self.by_product.insert(product_id.into(), supplier);
        self
    }
}

impl Default for StaticSupplierDirectory {
    fn default() -> Self {
        Self::new(Supplier::new(
            Self::DEFAULT_SUPPLIER_ID,
            Self::DEFAULT_SUPPLIER_NAME,
        ))
    }
}

#[async_trait]
impl SupplierDirectory for StaticSupplierDirectory {
    async fn supplier_for_product(&self, product_id: &str) -> Result<Supplier, DomainError> {
        Ok(self
            .by_product
            .get(product_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
