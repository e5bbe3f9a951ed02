//! Relay state machine of the cross-broker bridge.

use serde::{Deserialize, Serialize};

/// Where one relayed message stands.
///
/// State transitions:
/// ```text
/// Received ──► Transformed ──► Published ──► SourceAcked
///    │  ▲            │              │
///    │  └────────────┴──────────────┘  (failure: requeued at the source)
///    └──► Rejected                     (payload does not parse)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RelayState {
    #[default]
    Received,
    Transformed,
    Published,
    SourceAcked,
    Rejected,
}

impl RelayState {
    /// Returns the state a successful step leads to.
    pub fn advance(&self) -> RelayState {
        match self {
            RelayState::Received => RelayState::Transformed,
            RelayState::Transformed => RelayState::Published,
            RelayState::Published => RelayState::SourceAcked,
            terminal => *terminal,
        }
    }

    /// Returns the state a failed step falls back to.
    ///
    /// Only a malformed payload is final; everything else is retried.
    pub fn fail(&self, malformed: bool) -> RelayState {
        match self {
            RelayState::Received if malformed => RelayState::Rejected,
            RelayState::SourceAcked | RelayState::Rejected => *self,
            _ => RelayState::Received,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::SourceAcked | RelayState::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Received => "received",
            RelayState::Transformed => "transformed",
            RelayState::Published => "published",
            RelayState::SourceAcked => "source_acked",
            RelayState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_ends_source_acked() {
        let mut state = RelayState::default();
        for _ in 0..3 {
            assert!(!state.is_terminal());
            state = state.advance();
        }
        assert_eq!(state, RelayState::SourceAcked);
        assert!(state.is_terminal());
        assert_eq!(state.advance(), RelayState::SourceAcked);
    }

    #[test]
    fn failures_return_to_received() {
        assert_eq!(RelayState::Transformed.fail(false), RelayState::Received);
        assert_eq!(RelayState::Published.fail(false), RelayState::Received);
        assert_eq!(RelayState::Received.fail(false), RelayState::Received);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert_eq!(RelayState::Received.fail(true), RelayState::Rejected);
        assert!(RelayState::Rejected.is_terminal());
    }

    #[test]
    fn display_uses_metric_labels() {
        assert_eq!(RelayState::SourceAcked.to_string(), "source_acked");
    }
}
