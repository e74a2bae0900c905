//! Client repository implementation
//!
//! PostgreSQL-backed storage for tenants. The balance column is never
//! written here; see the ledger repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{Client, ClientStatus, NewClient, ProviderSettings},
    traits::ClientRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use super::decode_column;

const CLIENT_COLUMNS: &str = r#"
    id, name, balance_seconds, api_key, assistant_id, phone_number_id,
    estimated_seconds_per_call, status, created_at, updated_at
"#;

/// PostgreSQL implementation of ClientRepository
pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    #[instrument(skip(self, client), fields(name = %client.name))]
    async fn create(&self, client: &NewClient) -> AppResult<Client> {
        debug!("Creating client");

        let sql = format!(
            r#"
            INSERT INTO clients (name, api_key, assistant_id, phone_number_id, estimated_seconds_per_call)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(&client.name)
            .bind(&client.api_key)
            .bind(&client.assistant_id)
            .bind(&client.phone_number_id)
            .bind(client.estimated_seconds_per_call)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating client: {}", e);
                AppError::Database(format!("Failed to create client: {}", e))
            })?;

        info!("Created client {}", row.id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Client>> {
        debug!("Finding client by id: {}", id);

        let sql = format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding client {}: {}", id, e);
                AppError::Database(format!("Failed to find client: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_assistant_id(&self, assistant_id: &str) -> AppResult<Option<Client>> {
        debug!("Finding client by assistant: {}", assistant_id);

        let sql = format!(
            r#"
            SELECT {}
            FROM clients
            WHERE assistant_id = $1 AND status = 'active'
            ORDER BY id
            LIMIT 1
            "#,
            CLIENT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(assistant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding client by assistant: {}", e);
                AppError::Database(format!("Failed to find client: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, settings))]
    async fn update_provider(&self, id: i64, settings: &ProviderSettings) -> AppResult<Client> {
        debug!("Updating provider settings for client {}", id);

        let sql = format!(
            r#"
            UPDATE clients
            SET api_key = COALESCE($2, api_key),
                assistant_id = COALESCE($3, assistant_id),
                phone_number_id = COALESCE($4, phone_number_id),
                estimated_seconds_per_call = COALESCE($5, estimated_seconds_per_call),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(id)
            .bind(&settings.api_key)
            .bind(&settings.assistant_id)
            .bind(&settings.phone_number_id)
            .bind(settings.estimated_seconds_per_call)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating client {}: {}", id, e);
                AppError::Database(format!("Failed to update client: {}", e))
            })?
            .ok_or_else(|| AppError::ClientNotFound(id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn set_status(&self, id: i64, status: ClientStatus) -> AppResult<Client> {
        info!("Setting client {} status to {}", id, status);

        let sql = format!(
            r#"
            UPDATE clients
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(id)
            .bind(status.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating client {} status: {}", id, e);
                AppError::Database(format!("Failed to update client status: {}", e))
            })?
            .ok_or_else(|| AppError::ClientNotFound(id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<Client>, i64)> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting clients: {}", e);
                AppError::Database(format!("Failed to count clients: {}", e))
            })?;

        let sql = format!(
            r#"
            SELECT {}
            FROM clients
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
            CLIENT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, ClientRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing clients: {}", e);
                AppError::Database(format!("Failed to list clients: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    id: i64,
    name: String,
    balance_seconds: Decimal,
    api_key: Option<String>,
    assistant_id: Option<String>,
    phone_number_id: Option<String>,
    estimated_seconds_per_call: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            balance_seconds: row.balance_seconds,
            api_key: row.api_key,
            assistant_id: row.assistant_id,
            phone_number_id: row.phone_number_id,
            estimated_seconds_per_call: row.estimated_seconds_per_call,
            status: decode_column(
                "clients.status",
                &row.status,
                ClientStatus::from_str(&row.status),
                ClientStatus::Inactive,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
