//! Ledger repository implementation
//!
//! Every balance change is an insert into `transactions` plus an update of
//! `clients.balance_seconds` inside one database transaction. Call
//! settlement additionally locks the call row so the `cost_deducted` check
//! and flip are serialized per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{CallSettlement, SettlementOutcome, Transaction, TransactionType},
    traits::LedgerRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, instrument, warn};

use super::decode_column;

const TRANSACTION_COLUMNS: &str =
    "id, client_id, seconds, transaction_type, reason, reference, processed, created_at";

/// PostgreSQL implementation of LedgerRepository
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a transaction and apply it to the balance in one unit
    async fn apply(
        &self,
        client_id: i64,
        transaction_type: TransactionType,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        Transaction::validate_amount(seconds)?;
        let signed = transaction_type.signed(seconds);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE clients
            SET balance_seconds = balance_seconds + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(client_id)
        .bind(signed)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to update balance for client {}: {}", client_id, e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::ClientNotFound(client_id.to_string()));
        }

        let sql = format!(
            r#"
            INSERT INTO transactions (client_id, seconds, transaction_type, reason, reference, processed)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(client_id)
            .bind(signed)
            .bind(transaction_type.to_string())
            .bind(reason)
            .bind(reference)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert transaction: {}", e);
                AppError::Database(format!("Failed to insert transaction: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "{} of {}s for client {} ({})",
            transaction_type, seconds, client_id, reason
        );

        Ok(row.into())
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    #[instrument(skip(self))]
    async fn credit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        self.apply(client_id, TransactionType::Credit, seconds, reason, reference)
            .await
    }

    #[instrument(skip(self))]
    async fn debit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        self.apply(client_id, TransactionType::Debit, seconds, reason, reference)
            .await
    }

    #[instrument(skip(self))]
    async fn balance_of(&self, client_id: i64) -> AppResult<Decimal> {
        debug!("Reading balance for client {}", client_id);

        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance_seconds FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error reading balance: {}", e);
                    AppError::Database(format!("Failed to read balance: {}", e))
                })?;

        row.map(|r| r.0)
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn transaction_sum(&self, client_id: i64) -> AppResult<Decimal> {
        let row: (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(seconds), 0) FROM transactions WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error summing transactions: {}", e);
            AppError::Database(format!("Failed to sum transactions: {}", e))
        })?;

        Ok(row.0)
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        client_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Transaction>, i64)> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE client_id = $1")
                .bind(client_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting transactions: {}", e);
                    AppError::Database(format!("Failed to count transactions: {}", e))
                })?;

        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE client_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(client_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing transactions: {}", e);
                AppError::Database(format!("Failed to list transactions: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self), fields(call_id = settlement.call_id))]
    async fn settle_call(&self, settlement: &CallSettlement) -> AppResult<SettlementOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock the call row; concurrent settlements for this call queue here
        let deducted: Option<(bool,)> =
            sqlx::query_as("SELECT cost_deducted FROM calls WHERE id = $1 FOR UPDATE")
                .bind(settlement.call_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to lock call {}: {}", settlement.call_id, e);
                    AppError::Database(format!("Failed to lock call: {}", e))
                })?;

        match deducted {
            None => return Err(AppError::CallNotFound(settlement.call_id.to_string())),
            Some((true,)) => {
                debug!("Call {} already settled", settlement.call_id);
                tx.rollback().await.map_err(|e| {
                    AppError::Transaction(format!("Failed to release call lock: {}", e))
                })?;
                return Ok(SettlementOutcome::AlreadySettled);
            }
            Some((false,)) => {}
        }

        let signed = TransactionType::Debit.signed(settlement.seconds);
        let reference = settlement.call_id.to_string();

        let sql = format!(
            r#"
            INSERT INTO transactions (client_id, seconds, transaction_type, reason, reference, processed)
            VALUES ($1, $2, 'DEBIT', $3, $4, FALSE)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(settlement.client_id)
            .bind(signed)
            .bind(&settlement.reason)
            .bind(&reference)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert debit for call {}: {}", settlement.call_id, e);
                AppError::Database(format!("Failed to insert debit: {}", e))
            })?;

        let updated = sqlx::query(
            r#"
            UPDATE clients
            SET balance_seconds = balance_seconds + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(settlement.client_id)
        .bind(signed)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to decrement balance: {}", e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::ClientNotFound(settlement.client_id.to_string()));
        }

        sqlx::query("UPDATE calls SET cost_deducted = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(settlement.call_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to flag call {} as billed: {}", settlement.call_id, e);
                AppError::Database(format!("Failed to flag call: {}", e))
            })?;

        sqlx::query("UPDATE transactions SET processed = TRUE WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to mark transaction {} processed: {}", row.id, e);
                AppError::Database(format!("Failed to mark transaction processed: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement: {}", e);
            AppError::Transaction(format!("Failed to commit settlement: {}", e))
        })?;

        info!(
            "Settled call {}: debited {}s from client {}",
            settlement.call_id, settlement.seconds, settlement.client_id
        );

        let mut transaction: Transaction = row.into();
        transaction.processed = true;
        Ok(SettlementOutcome::Debited(transaction))
    }

    #[instrument(skip(self))]
    async fn unprocessed_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Transaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE processed = FALSE AND created_at < $1
            ORDER BY created_at
            "#,
            TRANSACTION_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, TransactionRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error scanning unprocessed transactions: {}", e);
                AppError::Database(format!("Failed to scan transactions: {}", e))
            })?;

        if !rows.is_empty() {
            warn!("{} unprocessed transactions older than {}", rows.len(), cutoff);
        }

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    client_id: i64,
    seconds: Decimal,
    transaction_type: String,
    reason: String,
    reference: Option<String>,
    processed: bool,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        // the sign of the amount decides an unreadable type
        let transaction_type = decode_column(
            "transactions.transaction_type",
            &row.transaction_type,
            TransactionType::from_str(&row.transaction_type),
            if row.seconds < Decimal::ZERO {
                TransactionType::Debit
            } else {
                TransactionType::Credit
            },
        );

        Self {
            id: row.id,
            client_id: row.client_id,
            seconds: row.seconds,
            transaction_type,
            reason: row.reason,
            reference: row.reference,
            processed: row.processed,
            created_at: row.created_at,
        }
    }
}
