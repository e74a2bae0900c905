//! Lead repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{CallStatus, Lead},
    traits::LeadRepository,
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, instrument};

use super::decode_column;

const LEAD_COLUMNS: &str =
    "id, client_id, name, phone_number, campaign_id, status, response, created_at, updated_at";

/// PostgreSQL implementation of LeadRepository
pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    #[instrument(skip(self))]
    async fn upsert(
        &self,
        client_id: i64,
        phone_number: &str,
        name: Option<&str>,
        campaign_id: Option<i64>,
    ) -> AppResult<Lead> {
        let sql = format!(
            r#"
            INSERT INTO leads (client_id, phone_number, name, campaign_id, status)
            VALUES ($1, $2, $3, $4, 'NotInitiated')
            ON CONFLICT (client_id, phone_number) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, leads.name),
                campaign_id = COALESCE(EXCLUDED.campaign_id, leads.campaign_id),
                updated_at = NOW()
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, LeadRow>(&sql)
            .bind(client_id)
            .bind(phone_number)
            .bind(name)
            .bind(campaign_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error upserting lead {}: {}", phone_number, e);
                AppError::Database(format!("Failed to upsert lead: {}", e))
            })?;

        debug!("Lead {} ready for client {}", row.id, client_id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Lead>> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);

        let row = sqlx::query_as::<Postgres, LeadRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding lead {}: {}", id, e);
                AppError::Database(format!("Failed to find lead: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn record_outcome(
        &self,
        id: i64,
        status: CallStatus,
        response: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE leads
            SET status = $2,
                response = COALESCE($3, response),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(response)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating lead {}: {}", id, e);
            AppError::Database(format!("Failed to update lead: {}", e))
        })?;

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: i64,
    client_id: i64,
    name: Option<String>,
    phone_number: String,
    campaign_id: Option<i64>,
    status: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            name: row.name,
            phone_number: row.phone_number,
            campaign_id: row.campaign_id,
            status: decode_column(
                "leads.status",
                &row.status,
                CallStatus::from_str(&row.status),
                CallStatus::default(),
            ),
            response: row.response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
