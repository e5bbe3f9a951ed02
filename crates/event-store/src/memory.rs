use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventQuery, EventRecord, EventStoreError, Result, Version,
    read_model::{Document, PutOptions, ReadModelStore, Versioned},
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// In-memory event store used by tests and the local profile.
///
/// Behaves like the PostgreSQL store: versions are unique per aggregate and
/// appends are checked against the expected version.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Makes every subsequent call fail with `Unavailable` (for testing).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory event store switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn current_version(events: &[EventRecord], aggregate_id: &AggregateId) -> Version {
        events
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventRecord>, options: AppendOptions) -> Result<Version> {
        self.check_available()?;
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id.clone();
        let first_new_version = events[0].version;

        let mut store = self.events.write().await;
        let current_version = Self::current_version(&store, &aggregate_id);

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // Unique (aggregate_id, version), same as the table constraint.
        if first_new_version <= current_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial());
        store.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventRecord>> {
        self.check_available()?;
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventRecord>> {
        self.check_available()?;
        let store = self.events.read().await;
        let mut events: Vec<_> = store.iter().filter(|e| query.matches(e)).cloned().collect();

        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.version.cmp(&b.version))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        self.check_available()?;
        let store = self.events.read().await;
        let version = store
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max();
        Ok(version)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        self.check_available()?;
        let events = self.events.read().await.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

/// In-memory read-model table.
pub struct InMemoryReadModelStore<D> {
    documents: Arc<RwLock<BTreeMap<AggregateId, Versioned<D>>>>,
    unavailable: Arc<AtomicBool>,
}

impl<D> Clone for InMemoryReadModelStore<D> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
            unavailable: Arc::clone(&self.unavailable),
        }
    }
}

impl<D> Default for InMemoryReadModelStore<D> {
    fn default() -> Self {
        Self {
            documents: Arc::new(RwLock::new(BTreeMap::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<D> InMemoryReadModelStore<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Removes a document, simulating a lost write (for testing).
    pub async fn remove(&self, id: &AggregateId) {
        self.documents.write().await.remove(id);
    }

    /// Makes every subsequent call fail with `Unavailable` (for testing).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory read model switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<D: Document> ReadModelStore<D> for InMemoryReadModelStore<D> {
    async fn get(&self, id: &AggregateId) -> Result<Option<Versioned<D>>> {
        self.check_available()?;
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn put(&self, document: D, options: PutOptions) -> Result<Version> {
        self.check_available()?;
        let id = document.document_id();
        let mut documents = self.documents.write().await;

        let current = documents
            .get(&id)
            .map(|stored| stored.revision)
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_revision
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: id,
                expected,
                actual: current,
            });
        }

        let revision = current.next();
        documents.insert(id, Versioned { revision, document });
        Ok(revision)
    }

    async fn scan(&self) -> Result<Vec<Versioned<D>>> {
        self.check_available()?;
        Ok(self.documents.read().await.values().cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
