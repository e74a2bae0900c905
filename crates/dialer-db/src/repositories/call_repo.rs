//! Call repository implementation
//!
//! Status changes are applied with conditional updates so that a late or
//! duplicated event can never move a call backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{Call, CallCompletion, CallStatus, CampaignProgress, NewCall, StatusChange},
    traits::CallRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, instrument};

use super::decode_column;

const CALL_COLUMNS: &str = r#"
    id, client_id, lead_id, campaign_id, provider_call_id, status,
    customer_number, assistant_id, created_at, dispatched_at, started_at, ended_at,
    duration_seconds, billable_seconds, cost, final_cost, cost_deducted,
    ended_reason, failure_reason, transcript, recording_url, stereo_recording_url,
    summary, analysis, cost_breakdown, updated_at
"#;

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn status_names(statuses: &[CallStatus]) -> Vec<String> {
        statuses.iter().map(ToString::to_string).collect()
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, call), fields(client_id = call.client_id))]
    async fn create(&self, call: &NewCall) -> AppResult<Call> {
        let sql = format!(
            r#"
            INSERT INTO calls (client_id, lead_id, campaign_id, customer_number, assistant_id, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(call.client_id)
            .bind(call.lead_id)
            .bind(call.campaign_id)
            .bind(&call.customer_number)
            .bind(&call.assistant_id)
            .bind(call.status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call: {}", e);
                AppError::Database(format!("Failed to create call: {}", e))
            })?;

        debug!("Created call {}", row.id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Call>> {
        let sql = format!("SELECT {} FROM calls WHERE id = $1", CALL_COLUMNS);

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call {}: {}", id, e);
                AppError::Database(format!("Failed to find call: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<Call>> {
        let sql = format!(
            "SELECT {} FROM calls WHERE provider_call_id = $1",
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(provider_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call {}: {}", provider_call_id, e);
                AppError::Database(format!("Failed to find call: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn advance_status(
        &self,
        provider_call_id: &str,
        status: CallStatus,
    ) -> AppResult<StatusChange> {
        let sql = format!(
            r#"
            UPDATE calls
            SET status = $2, updated_at = NOW()
            WHERE provider_call_id = $1 AND status = ANY($3)
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let advanced = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(provider_call_id)
            .bind(status.to_string())
            .bind(Self::status_names(&CallStatus::predecessors_of(status)))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error advancing call {}: {}", provider_call_id, e);
                AppError::Database(format!("Failed to update call status: {}", e))
            })?;

        if let Some(row) = advanced {
            debug!("Call {} advanced to {}", provider_call_id, status);
            return Ok(StatusChange::Advanced(row.into()));
        }

        Ok(match self.find_by_provider_id(provider_call_id).await? {
            Some(call) => StatusChange::Ignored(call),
            None => StatusChange::NotFound,
        })
    }

    #[instrument(skip(self, completion), fields(provider_call_id = %completion.provider_call_id))]
    async fn upsert_completed(&self, completion: &CallCompletion) -> AppResult<Call> {
        let sql = format!(
            r#"
            INSERT INTO calls (
                client_id, provider_call_id, status, customer_number, assistant_id,
                started_at, ended_at, duration_seconds, billable_seconds, cost, final_cost,
                ended_reason, transcript, recording_url, stereo_recording_url,
                summary, analysis, cost_breakdown
            )
            VALUES ($1, $2, 'Completed', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (provider_call_id) DO UPDATE SET
                status = 'Completed',
                customer_number = COALESCE(calls.customer_number, EXCLUDED.customer_number),
                assistant_id = COALESCE(calls.assistant_id, EXCLUDED.assistant_id),
                started_at = COALESCE(EXCLUDED.started_at, calls.started_at),
                ended_at = COALESCE(EXCLUDED.ended_at, calls.ended_at),
                duration_seconds = CASE WHEN calls.cost_deducted
                    THEN calls.duration_seconds ELSE EXCLUDED.duration_seconds END,
                billable_seconds = CASE WHEN calls.cost_deducted
                    THEN calls.billable_seconds ELSE EXCLUDED.billable_seconds END,
                cost = CASE WHEN calls.cost_deducted
                    THEN calls.cost ELSE COALESCE(EXCLUDED.cost, calls.cost) END,
                final_cost = CASE WHEN calls.cost_deducted
                    THEN calls.final_cost ELSE COALESCE(EXCLUDED.final_cost, calls.final_cost) END,
                ended_reason = COALESCE(EXCLUDED.ended_reason, calls.ended_reason),
                transcript = COALESCE(EXCLUDED.transcript, calls.transcript),
                recording_url = COALESCE(EXCLUDED.recording_url, calls.recording_url),
                stereo_recording_url = COALESCE(EXCLUDED.stereo_recording_url, calls.stereo_recording_url),
                summary = COALESCE(EXCLUDED.summary, calls.summary),
                analysis = COALESCE(EXCLUDED.analysis, calls.analysis),
                cost_breakdown = COALESCE(EXCLUDED.cost_breakdown, calls.cost_breakdown),
                updated_at = NOW()
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(completion.client_id)
            .bind(&completion.provider_call_id)
            .bind(&completion.customer_number)
            .bind(&completion.assistant_id)
            .bind(completion.started_at)
            .bind(completion.ended_at)
            .bind(completion.duration_seconds)
            .bind(completion.billable_seconds)
            .bind(completion.cost)
            .bind(completion.final_cost)
            .bind(&completion.ended_reason)
            .bind(&completion.transcript)
            .bind(&completion.recording_url)
            .bind(&completion.stereo_recording_url)
            .bind(&completion.summary)
            .bind(&completion.analysis)
            .bind(&completion.cost_breakdown)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Database error upserting call {}: {}",
                    completion.provider_call_id, e
                );
                AppError::Database(format!("Failed to upsert call: {}", e))
            })?;

        info!("Call {} completed", completion.provider_call_id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn mark_initiated(
        &self,
        id: i64,
        provider_call_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> AppResult<Call> {
        let sql = format!(
            r#"
            UPDATE calls
            SET provider_call_id = $2,
                dispatched_at = $3,
                status = CASE WHEN status IN ('NotInitiated', 'Pending') THEN 'Initiated' ELSE status END,
                failure_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(id)
            .bind(provider_call_id)
            .bind(dispatched_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if Self::is_unique_violation(&e) {
                    error!("Provider call id {} already recorded", provider_call_id);
                    AppError::Conflict(format!(
                        "Provider call {} is already attached to another call",
                        provider_call_id
                    ))
                } else {
                    error!("Database error marking call {} initiated: {}", id, e);
                    AppError::Database(format!("Failed to update call: {}", e))
                }
            })?
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn mark_failed(&self, id: i64, reason: &str) -> AppResult<Call> {
        let sql = format!(
            r#"
            UPDATE calls
            SET status = CASE WHEN status IN ('Pending', 'Initiated') THEN 'Failed' ELSE status END,
                failure_reason = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(id)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error marking call {} failed: {}", id, e);
                AppError::Database(format!("Failed to update call: {}", e))
            })?
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_by_campaign(&self, campaign_id: i64) -> AppResult<Vec<Call>> {
        let sql = format!(
            "SELECT {} FROM calls WHERE campaign_id = $1 ORDER BY id",
            CALL_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing calls of campaign {}: {}", campaign_id, e);
                AppError::Database(format!("Failed to list calls: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn pending_for_campaign(&self, campaign_id: i64) -> AppResult<Vec<Call>> {
        let sql = format!(
            "SELECT {} FROM calls WHERE campaign_id = $1 AND status = 'Pending' ORDER BY id",
            CALL_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, CallRow>(&sql)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing pending calls: {}", e);
                AppError::Database(format!("Failed to list pending calls: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn campaign_progress(&self, campaign_id: i64) -> AppResult<CampaignProgress> {
        let row: (i64, Decimal, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('Initiated', 'InProgress', 'Ended', 'Completed')),
                COALESCE(SUM(duration_seconds) FILTER (WHERE status = 'Completed'), 0),
                COUNT(*) FILTER (WHERE status IN ('Pending', 'Initiated', 'InProgress', 'Ended'))
            FROM calls
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error aggregating campaign {}: {}", campaign_id, e);
            AppError::Database(format!("Failed to aggregate campaign: {}", e))
        })?;

        Ok(CampaignProgress {
            processed_leads: row.0,
            actual_seconds: row.1,
            outstanding: row.2,
        })
    }

    #[instrument(skip(self))]
    async fn completed_totals(&self, client_id: i64) -> AppResult<(i64, Decimal)> {
        let row: (i64, Decimal) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(duration_seconds), 0)
            FROM calls
            WHERE client_id = $1 AND status = 'Completed'
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error aggregating calls of client {}: {}", client_id, e);
            AppError::Database(format!("Failed to aggregate calls: {}", e))
        })?;

        Ok(row)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: i64,
    client_id: i64,
    lead_id: Option<i64>,
    campaign_id: Option<i64>,
    provider_call_id: Option<String>,
    status: String,
    customer_number: Option<String>,
    assistant_id: Option<String>,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<Decimal>,
    billable_seconds: Option<Decimal>,
    cost: Option<Decimal>,
    final_cost: Option<Decimal>,
    cost_deducted: bool,
    ended_reason: Option<String>,
    failure_reason: Option<String>,
    transcript: Option<String>,
    recording_url: Option<String>,
    stereo_recording_url: Option<String>,
    summary: Option<String>,
    analysis: Option<Value>,
    cost_breakdown: Option<Value>,
    updated_at: DateTime<Utc>,
}

impl From<CallRow> for Call {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            lead_id: row.lead_id,
            campaign_id: row.campaign_id,
            provider_call_id: row.provider_call_id,
            status: decode_column(
                "calls.status",
                &row.status,
                CallStatus::from_str(&row.status),
                CallStatus::default(),
            ),
            customer_number: row.customer_number,
            assistant_id: row.assistant_id,
            created_at: row.created_at,
            dispatched_at: row.dispatched_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_seconds: row.duration_seconds,
            billable_seconds: row.billable_seconds,
            cost: row.cost,
            final_cost: row.final_cost,
            cost_deducted: row.cost_deducted,
            ended_reason: row.ended_reason,
            failure_reason: row.failure_reason,
            transcript: row.transcript,
            recording_url: row.recording_url,
            stereo_recording_url: row.stereo_recording_url,
            summary: row.summary,
            analysis: row.analysis,
            cost_breakdown: row.cost_breakdown,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_for_conditional_update() {
        let names = PgCallRepository::status_names(&CallStatus::predecessors_of(CallStatus::Ended));
        assert!(names.contains(&"InProgress".to_string()));
        assert!(names.contains(&"Initiated".to_string()));
        assert!(!names.contains(&"Completed".to_string()));
        assert!(!names.contains(&"Failed".to_string()));
    }
}
