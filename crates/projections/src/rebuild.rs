//! Replays an event log into read models.

use event_store::EventStore;
use futures_util::StreamExt;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

/// Streams every event of a service's log through its projections.
///
/// Run against an empty read model to recover from lost or inconsistent
/// read-model writes.
pub struct ReadModelRebuilder<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ReadModelRebuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(mut self, projection: impl Projection + 'static) -> Self {
        self.projections.push(Box::new(projection));
        self
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Replays the whole log. Returns how many events were read.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<ProjectionPosition> {
        let mut stream = self.store.stream_all_events().await?;
        let mut position = ProjectionPosition::zero();

        while let Some(result) = stream.next().await {
            let event = result?;
            position = position.advance();

            for projection in &self.projections {
                if projection.apply(&event).await? {
                    metrics::counter!("read_model_events_replayed_total", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        tracing::info!(events_processed = position.events_processed, "Read model rebuilt");
        Ok(position)
    }
}
