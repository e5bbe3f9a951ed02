//! Reorder policy: how much to buy and when it should arrive.

use common::UrgencyLevel;

/// Days between placing an order and its expected arrival.
pub const EXPECTED_LEAD_TIME_DAYS: i64 = 7;

/// Factor applied to the base quantity for each urgency level.
///
/// Unknown urgencies fall back to `1.0`.
pub fn urgency_multiplier(urgency: &UrgencyLevel) -> f64 {
    match urgency {
        UrgencyLevel::Low => 1.0,
        UrgencyLevel::Medium => 1.5,
        UrgencyLevel::High => 2.0,
        UrgencyLevel::Critical => 3.0,
        UrgencyLevel::Other(_) => 1.0,
    }
}

/// Order quantity for a product that dropped to its minimum stock.
///
/// `2 × minimum_stock × multiplier`, truncated toward zero. `None` when the
/// result does not fit an `i64`.
pub fn reorder_quantity(minimum_stock: i64, urgency: &UrgencyLevel) -> Option<i64> {
    scale(minimum_stock.checked_mul(2)?, urgency_multiplier(urgency))
}

fn scale(base: i64, multiplier: f64) -> Option<i64> {
    let quantity = base as f64 * multiplier;
    if quantity >= i64::MAX as f64 || quantity < i64::MIN as f64 {
        return None;
    }
    Some(quantity.trunc() as i64)
}
