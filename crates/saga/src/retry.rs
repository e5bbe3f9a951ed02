//! Retry cap and dead-letter routing for transient failures.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use broker::Destination;

/// What happens to a message whose processing keeps failing transiently.
///
/// The default retries forever and never dead-letters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up. `None` means unbounded.
    pub max_attempts: Option<u32>,
    /// Where exhausted messages are published before being rejected.
    pub dead_letter: Option<Destination>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn capped(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            dead_letter: None,
        }
    }

    pub fn with_dead_letter(mut self, destination: Destination) -> Self {
        self.dead_letter = Some(destination);
        self
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Failed attempts per message identity, local to one consumer.
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a failed attempt and returns the total so far.
    ///
    /// `seen_elsewhere` is the count the transport carried, for messages
    /// that were retried by another process before reaching this one.
    pub fn record_failure(&self, message_id: &str, seen_elsewhere: u32) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = attempts.entry(message_id.to_string()).or_insert(0);
        *count = (*count).max(seen_elsewhere) + 1;
        *count
    }

    pub fn clear(&self, message_id: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message_id);
    }

    pub fn attempts(&self, message_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
            .copied()
            .unwrap_or(0)
    }
}
