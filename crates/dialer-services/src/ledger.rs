//! Ledger service
//!
//! Admin-facing ledger operations on top of `LedgerRepository`: top-ups,
//! balance reads, paginated transaction listing and balance audits.

use dialer_core::{
    models::{Client, LedgerAudit, Transaction},
    traits::{ClientRepository, LedgerRepository, PaginatedResponse, Pagination, PaginationMeta},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Reason recorded on admin top-ups without an explicit reason
pub const DEFAULT_CREDIT_REASON: &str = "Admin credit";

pub struct LedgerService {
    ledger: Arc<dyn LedgerRepository>,
    clients: Arc<dyn ClientRepository>,
}

impl LedgerService {
    pub fn new(ledger: Arc<dyn LedgerRepository>, clients: Arc<dyn ClientRepository>) -> Self {
        Self { ledger, clients }
    }

    async fn client(&self, client_id: i64) -> AppResult<Client> {
        self.clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))
    }

    /// Top up a client's balance
    ///
    /// # Errors
    ///
    /// - `Validation` if `seconds` is not positive
    /// - `ClientNotFound` if the client does not exist
    #[instrument(skip(self))]
    pub async fn credit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: Option<&str>,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        Transaction::validate_amount(seconds)?;
        self.client(client_id).await?;

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CREDIT_REASON);

        let transaction = self
            .ledger
            .credit(client_id, seconds, reason, reference)
            .await?;

        info!(
            "Credited {}s to client {} (transaction {})",
            seconds, client_id, transaction.id
        );
        Ok(transaction)
    }

    #[instrument(skip(self))]
    pub async fn balance(&self, client_id: i64) -> AppResult<Decimal> {
        self.client(client_id).await?;
        self.ledger.balance_of(client_id).await
    }

    /// Transactions newest first
    #[instrument(skip(self))]
    pub async fn transactions(
        &self,
        client_id: i64,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Transaction>> {
        self.client(client_id).await?;

        let (data, total) = self
            .ledger
            .list_transactions(client_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }

    /// Compare the cached balance with the transaction sum
    #[instrument(skip(self))]
    pub async fn audit(&self, client_id: i64) -> AppResult<LedgerAudit> {
        self.client(client_id).await?;

        let balance = self.ledger.balance_of(client_id).await?;
        let sum = self.ledger.transaction_sum(client_id).await?;
        let audit = LedgerAudit::new(client_id, balance, sum);

        if audit.consistent {
            info!("Ledger for client {} is consistent", client_id);
        } else {
            error!(
                "Ledger mismatch for client {}: balance {} vs sum {}",
                client_id, balance, sum
            );
        }

        Ok(audit)
    }

    /// Fail with `LedgerInconsistency` when the audit does not balance
    pub async fn ensure_consistent(&self, client_id: i64) -> AppResult<()> {
        let audit = self.audit(client_id).await?;
        if !audit.consistent {
            warn!("Client {} ledger off by {}", client_id, audit.difference);
            return Err(AppError::LedgerInconsistency(format!(
                "client {} balance {} differs from transaction sum {}",
                client_id, audit.balance_seconds, audit.transaction_sum
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dialer_core::models::{NewClient, TransactionType};
    use dialer_db::InMemoryStore;
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<InMemoryStore>, LedgerService, i64) {
        let store = Arc::new(InMemoryStore::new());
        let client = ClientRepository::create(
            store.as_ref(),
            &NewClient {
                name: "Acme".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let service = LedgerService::new(store.clone(), store.clone());
        (store, service, client.id)
    }

    #[tokio::test]
    async fn test_credit_and_balance() {
        let (_store, service, client_id) = setup().await;

        let tx = service
            .credit(client_id, dec!(600), None, Some("invoice-1"))
            .await
            .unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Credit);
        assert_eq!(tx.reason, DEFAULT_CREDIT_REASON);
        assert_eq!(tx.reference.as_deref(), Some("invoice-1"));

        assert_eq!(service.balance(client_id).await.unwrap(), dec!(600));
    }

    #[tokio::test]
    async fn test_credit_rejects_bad_input() {
        let (_store, service, client_id) = setup().await;

        assert!(matches!(
            service.credit(client_id, dec!(0), None, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.credit(999, dec!(10), None, None).await,
            Err(AppError::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transactions_paginated_newest_first() {
        let (_store, service, client_id) = setup().await;
        for i in 1..=3 {
            service
                .credit(client_id, Decimal::from(i * 10), Some("top-up"), None)
                .await
                .unwrap();
        }

        let page = service
            .transactions(client_id, &Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.data[0].seconds, dec!(30));
    }

    #[tokio::test]
    async fn test_audit_detects_drift() {
        let (store, service, client_id) = setup().await;
        service.credit(client_id, dec!(100), None, None).await.unwrap();
        assert!(service.audit(client_id).await.unwrap().consistent);
        assert!(service.ensure_consistent(client_id).await.is_ok());

        // a row written without touching the balance
        store.insert_raw_transaction(Transaction {
            id: 10_000,
            client_id,
            seconds: dec!(-40),
            transaction_type: TransactionType::Debit,
            reason: "manual".to_string(),
            reference: None,
            processed: false,
            created_at: Utc::now(),
        });

        let audit = service.audit(client_id).await.unwrap();
        assert!(!audit.consistent);
        assert_eq!(audit.difference, dec!(40));
        assert!(matches!(
            service.ensure_consistent(client_id).await,
            Err(AppError::LedgerInconsistency(_))
        ));
    }
}
