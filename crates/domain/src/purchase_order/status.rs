//! Purchase order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PurchaseOrderError;

/// Lifecycle status of a purchase order.
///
/// Transitions only move forward:
/// ```text
/// pending ──► received ──► completed
///    └─────────────────────────▲
/// ```
/// Re-applying the current status is allowed so that replayed updates are
/// harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    #[default]
    Pending,
    Received,
    Completed,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Pending => "pending",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Completed => "completed",
        }
    }

    /// Goods have arrived; the order no longer counts as outstanding.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Completed
        )
    }

    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        next >= *self
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseOrderStatus {
    type Err = PurchaseOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseOrderStatus::Pending),
            "received" => Ok(PurchaseOrderStatus::Received),
            "completed" => Ok(PurchaseOrderStatus::Completed),
            other => Err(PurchaseOrderError::UnknownStatus(other.to_string())),
        }
    }
}
