//! Campaign repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{Campaign, CampaignProgress, CampaignStatus, NewCampaign},
    traits::CampaignRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, instrument};

use super::decode_column;

const CAMPAIGN_COLUMNS: &str = r#"
    id, client_id, name, kind, total_leads, processed_leads,
    estimated_seconds, actual_seconds, status, created_at, updated_at
"#;

/// PostgreSQL implementation of CampaignRepository
pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    #[instrument(skip(self, campaign), fields(client_id = campaign.client_id))]
    async fn create(&self, campaign: &NewCampaign) -> AppResult<Campaign> {
        let sql = format!(
            r#"
            INSERT INTO campaigns (client_id, name, kind, total_leads, estimated_seconds, status)
            VALUES ($1, $2, $3, $4, $5, 'Draft')
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CampaignRow>(&sql)
            .bind(campaign.client_id)
            .bind(&campaign.name)
            .bind(&campaign.kind)
            .bind(campaign.total_leads)
            .bind(campaign.estimated_seconds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating campaign: {}", e);
                AppError::Database(format!("Failed to create campaign: {}", e))
            })?;

        info!("Created campaign {} ({} leads)", row.id, row.total_leads);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Campaign>> {
        let sql = format!("SELECT {} FROM campaigns WHERE id = $1", CAMPAIGN_COLUMNS);

        let row = sqlx::query_as::<Postgres, CampaignRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding campaign {}: {}", id, e);
                AppError::Database(format!("Failed to find campaign: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> AppResult<Option<Campaign>> {
        let sql = format!(
            r#"
            UPDATE campaigns
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );

        let from: Vec<String> = from.iter().map(ToString::to_string).collect();

        let row = sqlx::query_as::<Postgres, CampaignRow>(&sql)
            .bind(id)
            .bind(to.to_string())
            .bind(from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating campaign {} status: {}", id, e);
                AppError::Database(format!("Failed to update campaign: {}", e))
            })?;

        if row.is_some() {
            info!("Campaign {} moved to {}", id, to);
        }

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn apply_progress(&self, id: i64, progress: &CampaignProgress) -> AppResult<Campaign> {
        debug!("Applying progress to campaign {}", id);

        let sql = format!(
            r#"
            UPDATE campaigns
            SET processed_leads = $2,
                actual_seconds = $3,
                status = CASE
                    WHEN $4 = 0 AND status IN ('Running', 'Initiated') THEN 'Completed'
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, CampaignRow>(&sql)
            .bind(id)
            .bind(progress.processed_leads)
            .bind(progress.actual_seconds)
            .bind(progress.outstanding)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating campaign {} progress: {}", id, e);
                AppError::Database(format!("Failed to update campaign progress: {}", e))
            })?
            .ok_or_else(|| AppError::CampaignNotFound(id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_by_client(&self, client_id: i64) -> AppResult<Vec<Campaign>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM campaigns
            WHERE client_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
            CAMPAIGN_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, CampaignRow>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing campaigns of client {}: {}", client_id, e);
                AppError::Database(format!("Failed to list campaigns: {}", e))
            })?;

        debug!("Client {} has {} campaigns", client_id, rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    client_id: i64,
    name: String,
    kind: String,
    total_leads: i64,
    processed_leads: i64,
    estimated_seconds: Decimal,
    actual_seconds: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            name: row.name,
            kind: row.kind,
            total_leads: row.total_leads,
            processed_leads: row.processed_leads,
            estimated_seconds: row.estimated_seconds,
            actual_seconds: row.actual_seconds,
            status: decode_column(
                "campaigns.status",
                &row.status,
                CampaignStatus::from_str(&row.status),
                CampaignStatus::default(),
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
