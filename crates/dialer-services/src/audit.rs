//! Ledger auditor
//!
//! Reports transactions still marked unprocessed after the grace period.
//! These are never retried automatically; they are logged for an operator.

use chrono::{Duration, Utc};
use dialer_core::{models::Transaction, traits::LedgerRepository, AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::constants::LEDGER_GRACE_PERIOD_SECS;

pub struct LedgerAuditor {
    ledger: Arc<dyn LedgerRepository>,
    grace_period: Duration,
}

impl LedgerAuditor {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self {
            ledger,
            grace_period: Duration::seconds(LEDGER_GRACE_PERIOD_SECS),
        }
    }

    pub fn with_grace_period(mut self, secs: i64) -> Self {
        self.grace_period = Duration::seconds(secs.max(0));
        self
    }

    /// Unprocessed transactions older than the grace period
    #[instrument(skip(self))]
    pub async fn dangling(&self) -> AppResult<Vec<Transaction>> {
        let cutoff = Utc::now() - self.grace_period;
        let dangling = self.ledger.unprocessed_older_than(cutoff).await?;

        for tx in &dangling {
            error!(
                "Ledger inconsistency: transaction {} for client {} ({}s, ref {:?}) unprocessed since {}",
                tx.id, tx.client_id, tx.seconds, tx.reference, tx.created_at
            );
        }

        if dangling.is_empty() {
            debug!("No dangling transactions before {}", cutoff);
        }
        Ok(dangling)
    }

    /// Fail with `LedgerInconsistency` when anything dangles
    pub async fn check(&self) -> AppResult<()> {
        let dangling = self.dangling().await?;
        if dangling.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = dangling.iter().map(|t| t.id.to_string()).collect();
        Err(AppError::LedgerInconsistency(format!(
            "{} unprocessed transactions: {}",
            dangling.len(),
            ids.join(", ")
        )))
    }

    /// Check on a fixed interval until the task is dropped
    pub async fn run(self: Arc<Self>, every: std::time::Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check().await {
                error!("Ledger audit: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::{NewClient, TransactionType};
    use dialer_core::traits::ClientRepository;
    use dialer_db::InMemoryStore;
    use rust_decimal_macros::dec;

    fn unprocessed(id: i64, client_id: i64, age_secs: i64) -> Transaction {
        Transaction {
            id,
            client_id,
            seconds: dec!(-30),
            transaction_type: TransactionType::Debit,
            reason: "Call completed".to_string(),
            reference: Some("7".to_string()),
            processed: false,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn test_reports_only_old_unprocessed_rows() {
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
        store.credit(client.id, dec!(100), "seed", None).await.unwrap();

        let auditor = LedgerAuditor::new(store.clone()).with_grace_period(300);
        assert!(auditor.dangling().await.unwrap().is_empty());
        assert!(auditor.check().await.is_ok());

        store.insert_raw_transaction(unprocessed(500, client.id, 10));
        assert!(auditor.dangling().await.unwrap().is_empty());

        store.insert_raw_transaction(unprocessed(501, client.id, 3_600));
        let dangling = auditor.dangling().await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].id, 501);

        match auditor.check().await {
            Err(AppError::LedgerInconsistency(msg)) => assert!(msg.contains("501")),
            other => panic!("expected LedgerInconsistency, got {:?}", other),
        }
    }
}
