//! Settings repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{models::Setting, traits::SettingsRepository, AppError, AppResult};
use serde_json::Value;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, instrument};

/// PostgreSQL implementation of SettingsRepository
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> AppResult<Option<Setting>> {
        debug!("Reading setting {}", key);

        let row = sqlx::query_as::<Postgres, SettingRow>(
            "SELECT key, value, updated_at FROM settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error reading setting {}: {}", key, e);
            AppError::Database(format!("Failed to read setting: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: &Value) -> AppResult<Setting> {
        let row = sqlx::query_as::<Postgres, SettingRow>(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error writing setting {}: {}", key, e);
            AppError::Database(format!("Failed to write setting: {}", e))
        })?;

        info!("Setting {} updated", key);
        Ok(row.into())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: Value,
    updated_at: DateTime<Utc>,
}

impl From<SettingRow> for Setting {
    fn from(row: SettingRow) -> Self {
        Self {
            key: row.key,
            value: row.value,
            updated_at: row.updated_at,
        }
    }
}
