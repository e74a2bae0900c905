//! Raw event log repository implementation
//!
//! Append-only; rows are never updated or deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{EventLog, NewEventLog},
    traits::EventLogRepository,
    AppError, AppResult,
};
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use tracing::{error, instrument};

/// PostgreSQL implementation of EventLogRepository
pub struct PgEventLogRepository {
    pool: PgPool,
}

impl PgEventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for PgEventLogRepository {
    #[instrument(skip(self, entry), fields(event = %entry.event))]
    async fn append(&self, entry: &NewEventLog) -> AppResult<EventLog> {
        let row = sqlx::query_as::<Postgres, EventLogRow>(
            r#"
            INSERT INTO event_logs (event, provider_call_id, payload)
            VALUES ($1, $2, $3)
            RETURNING id, event, provider_call_id, payload, created_at
            "#,
        )
        .bind(&entry.event)
        .bind(&entry.provider_call_id)
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error appending {} to event log: {}", entry.event, e);
            AppError::Database(format!("Failed to append event log: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_by_provider_call_id(&self, provider_call_id: &str) -> AppResult<Vec<EventLog>> {
        let rows = sqlx::query_as::<Postgres, EventLogRow>(
            r#"
            SELECT id, event, provider_call_id, payload, created_at
            FROM event_logs
            WHERE provider_call_id = $1
            ORDER BY id
            "#,
        )
        .bind(provider_call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error reading event log for {}: {}", provider_call_id, e);
            AppError::Database(format!("Failed to read event log: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct EventLogRow {
    id: i64,
    event: String,
    provider_call_id: Option<String>,
    payload: Value,
    created_at: DateTime<Utc>,
}

impl From<EventLogRow> for EventLog {
    fn from(row: EventLogRow) -> Self {
        Self {
            id: row.id,
            event: row.event,
            provider_call_id: row.provider_call_id,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}
