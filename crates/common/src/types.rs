use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for identifiers derived from other identifiers.
const DERIVED_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c0f_a6f1_2b7e_4d8a_9e3c_01c4_c01d_c4a1);

/// Unique identifier for an aggregate instance.
///
/// Aggregates in this system are keyed by plain strings: purchase orders
/// use UUIDs, products use whatever id the catalogue assigns (`"P1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Derives a stable ID from a source identifier.
    ///
    /// The same `(kind, source)` pair always yields the same ID, which is
    /// what makes replays of an inbound event land on the same aggregate.
    pub fn derived_from(kind: &str, source: &str) -> Self {
        let name = format!("{kind}:{source}");
        Self(Uuid::new_v5(&DERIVED_ID_NAMESPACE, name.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AggregateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AggregateId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
