//! Stock-loss and urgency rules.

use common::{Severity, UrgencyLevel};

/// Share of stock written off after a cold-chain failure.
pub fn loss_factor(severity: &Severity) -> f64 {
    match severity {
        Severity::Low => 0.05,
        Severity::Medium => 0.15,
        Severity::High => 0.30,
        Severity::Critical => 0.50,
        Severity::Other(_) => 0.10,
    }
}

/// Units lost, truncated toward zero.
pub fn loss_quantity(current_stock: i64, severity: &Severity) -> i64 {
    (current_stock as f64 * loss_factor(severity)) as i64
}

/// How urgently a depleted product needs restocking.
pub fn classify_urgency(current_stock: i64, minimum_stock: i64) -> UrgencyLevel {
    if current_stock == 0 {
        UrgencyLevel::Critical
    } else if (current_stock as f64) <= minimum_stock as f64 * 0.5 {
        UrgencyLevel::High
    } else if current_stock <= minimum_stock {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    }
}
