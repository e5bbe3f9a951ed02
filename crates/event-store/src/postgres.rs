use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventId, EventQuery, EventRecord, EventStoreError, Result, Version,
    read_model::{Document, PutOptions, ReadModelStore, Versioned},
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// Runs the workspace migrations, creating every service's tables.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Store migrations applied");
    Ok(())
}

/// PostgreSQL-backed event log.
///
/// Each service owns one events table; the table name is fixed at
/// construction and never comes from user input.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    table: &'static str,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool, table: &'static str) -> Self {
        Self { pool, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, aggregate_id, aggregate_type, event_type, event_data, timestamp, version, \
             correlation_id, causation_id FROM {}",
            self.table
        )
    }

    fn row_to_event(row: PgRow) -> Result<EventRecord> {
        Ok(EventRecord {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: AggregateId::from(row.try_get::<String, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            event_data: row.try_get("event_data")?,
            timestamp: row.try_get("timestamp")?,
            version: Version::new(row.try_get("version")?),
            correlation_id: row.try_get("correlation_id")?,
            causation_id: row.try_get("causation_id")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, events: Vec<EventRecord>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id.clone();

        let mut tx = self.pool.begin().await?;

        if let Some(expected) = options.expected_version {
            let current: Option<i64> = sqlx::query_scalar(&format!(
                "SELECT MAX(version) FROM {} WHERE aggregate_id = $1",
                self.table
            ))
            .bind(aggregate_id.as_str())
            .fetch_one(&mut *tx)
            .await?;

            let actual = Version::new(current.unwrap_or(0));
            if actual != expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let insert = format!(
            "INSERT INTO {} (id, aggregate_id, aggregate_type, event_type, event_data, timestamp, \
             version, correlation_id, causation_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.table
        );

        let mut last_version = Version::initial();
        for event in &events {
            sqlx::query(&insert)
                .bind(event.id.as_uuid())
                .bind(event.aggregate_id.as_str())
                .bind(&event.aggregate_type)
                .bind(&event.event_type)
                .bind(&event.event_data)
                .bind(event.timestamp)
                .bind(event.version.as_i64())
                .bind(&event.correlation_id)
                .bind(&event.causation_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    // (aggregate_id, version) is unique: a racing writer got there first.
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.is_unique_violation()
                    {
                        return EventStoreError::ConcurrencyConflict {
                            aggregate_id: aggregate_id.clone(),
                            expected: options.expected_version.unwrap_or(Version::initial()),
                            actual: event.version,
                        };
                    }
                    EventStoreError::Database(e)
                })?;

            last_version = event.version;
        }

        tx.commit().await?;
        tracing::debug!(
            table = self.table,
            aggregate_id = %aggregate_id,
            version = %last_version,
            count = events.len(),
            "Events appended"
        );
        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventRecord>> {
        let sql = format!(
            "{} WHERE aggregate_id = $1 ORDER BY version ASC",
            self.select_columns()
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventRecord>> {
        let mut sql = format!("{} WHERE 1=1", self.select_columns());
        let mut param_count = 0;

        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.aggregate_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ${param_count}"));
        }
        if query.event_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp <= ${param_count}"));
        }

        sql.push_str(" ORDER BY timestamp ASC, version ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.into_string());
        }
        if let Some(aggregate_type) = query.aggregate_type {
            sqlx_query = sqlx_query.bind(aggregate_type);
        }
        if let Some(event_type) = query.event_type {
            sqlx_query = sqlx_query.bind(event_type);
        }
        if let Some(from) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(version) FROM {} WHERE aggregate_id = $1",
            self.table
        ))
        .bind(aggregate_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        // Materialized first so the stream does not borrow the pool.
        let sql = format!("{} ORDER BY seq ASC", self.select_columns());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let events: Vec<Result<EventRecord>> = rows.into_iter().map(Self::row_to_event).collect();

        Ok(Box::pin(stream::iter(events)))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query(&format!("SELECT 1 FROM {} LIMIT 1", self.table))
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed read-model table storing documents as JSONB.
pub struct PostgresReadModelStore<D> {
    pool: PgPool,
    table: &'static str,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for PostgresReadModelStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table,
            _document: PhantomData,
        }
    }
}

impl<D: Document> PostgresReadModelStore<D> {
    pub fn new(pool: PgPool, table: &'static str) -> Self {
        Self {
            pool,
            table,
            _document: PhantomData,
        }
    }

    fn row_to_document(row: PgRow) -> Result<Versioned<D>> {
        let document: serde_json::Value = row.try_get("document")?;
        Ok(Versioned {
            revision: Version::new(row.try_get("revision")?),
            document: serde_json::from_value(document)?,
        })
    }

    async fn current_revision(&self, id: &AggregateId) -> Result<Version> {
        let revision: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT revision FROM {} WHERE id = $1",
            self.table
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(Version::new(revision.unwrap_or(0)))
    }
}

#[async_trait]
impl<D: Document> ReadModelStore<D> for PostgresReadModelStore<D> {
    async fn get(&self, id: &AggregateId) -> Result<Option<Versioned<D>>> {
        let row = sqlx::query(&format!(
            "SELECT revision, document FROM {} WHERE id = $1",
            self.table
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn put(&self, document: D, options: PutOptions) -> Result<Version> {
        let id = document.document_id();
        let json = serde_json::to_value(&document)?;

        let written: Option<i64> = match options.expected_revision {
            None => {
                sqlx::query_scalar(&format!(
                    "INSERT INTO {table} (id, revision, document, updated_at) VALUES ($1, 1, $2, now()) \
                     ON CONFLICT (id) DO UPDATE SET revision = {table}.revision + 1, \
                     document = EXCLUDED.document, updated_at = now() RETURNING revision",
                    table = self.table
                ))
                .bind(id.as_str())
                .bind(&json)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) if expected == Version::initial() => {
                sqlx::query_scalar(&format!(
                    "INSERT INTO {} (id, revision, document, updated_at) VALUES ($1, 1, $2, now()) \
                     ON CONFLICT (id) DO NOTHING RETURNING revision",
                    self.table
                ))
                .bind(id.as_str())
                .bind(&json)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query_scalar(&format!(
                    "UPDATE {} SET revision = revision + 1, document = $2, updated_at = now() \
                     WHERE id = $1 AND revision = $3 RETURNING revision",
                    self.table
                ))
                .bind(id.as_str())
                .bind(&json)
                .bind(expected.as_i64())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match written {
            Some(revision) => Ok(Version::new(revision)),
            None => {
                let actual = self.current_revision(&id).await?;
                Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: id,
                    expected: options.expected_revision.unwrap_or(actual),
                    actual,
                })
            }
        }
    }

    async fn scan(&self) -> Result<Vec<Versioned<D>>> {
        let rows = sqlx::query(&format!(
            "SELECT revision, document FROM {} ORDER BY id ASC",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query(&format!("SELECT 1 FROM {} LIMIT 1", self.table))
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}
