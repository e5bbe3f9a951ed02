use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{AggregateId, Result, Version};

/// A latest-state document kept in a read-model table.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Partition key of the document.
    fn document_id(&self) -> AggregateId;
}

/// A document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<D> {
    pub revision: Version,
    pub document: D,
}

/// Write condition for [`ReadModelStore::put`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Revision the stored document must currently have. `Version::initial()`
    /// means the document must not exist; `None` overwrites unconditionally.
    pub expected_revision: Option<Version>,
}

impl PutOptions {
    /// Overwrite whatever is stored.
    pub fn unconditional() -> Self {
        Self::default()
    }

    /// Insert only; fails if the document already exists.
    pub fn expect_new() -> Self {
        Self {
            expected_revision: Some(Version::initial()),
        }
    }

    /// Compare-and-swap against the revision previously read.
    pub fn expect_revision(revision: Version) -> Self {
        Self {
            expected_revision: Some(revision),
        }
    }
}

/// Latest-state store for one document type.
///
/// Every successful `put` bumps the document's revision by one, so a writer
/// that read revision `n` can detect a concurrent update by expecting `n`.
#[async_trait]
pub trait ReadModelStore<D: Document>: Send + Sync {
    async fn get(&self, id: &AggregateId) -> Result<Option<Versioned<D>>>;

    /// Writes the document and returns its new revision.
    ///
    /// Fails with `ConcurrencyConflict` when the write condition does not hold.
    async fn put(&self, document: D, options: PutOptions) -> Result<Version>;

    /// Every stored document. Callers filter client-side.
    async fn scan(&self) -> Result<Vec<Versioned<D>>>;

    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> Result<()>;
}
