//! Provider call sync
//!
//! Pulls a client's calls from the provider and feeds each one through the
//! reconciliation engine, so calls whose webhooks never arrived still get
//! their terminal fields and their single debit.

use dialer_core::{
    models::CallListQuery,
    traits::{CallProvider, ClientRepository},
    AppError, AppResult,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::reconciliation::{ReconciliationEngine, ReconciliationOutcome};

/// Tally of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub client_id: i64,
    pub fetched: usize,
    /// Ended calls debited by this run
    pub billed: usize,
    /// Ended calls that had been debited before
    pub already_billed: usize,
    /// Live calls moved forward
    pub advanced: usize,
    /// Records that changed nothing
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncReport {
    fn count(&mut self, outcome: &ReconciliationOutcome) {
        match outcome {
            ReconciliationOutcome::Billed { .. } => self.billed += 1,
            ReconciliationOutcome::AlreadyBilled { .. } => self.already_billed += 1,
            ReconciliationOutcome::StatusAdvanced { .. } => self.advanced += 1,
            ReconciliationOutcome::StatusUnchanged { .. }
            | ReconciliationOutcome::Orphaned { .. }
            | ReconciliationOutcome::Ignored { .. } => self.unchanged += 1,
        }
    }
}

pub struct CallSync {
    clients: Arc<dyn ClientRepository>,
    provider: Arc<dyn CallProvider>,
    engine: Arc<ReconciliationEngine>,
    page_size: Option<u32>,
}

impl CallSync {
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        provider: Arc<dyn CallProvider>,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            clients,
            provider,
            engine,
            page_size: None,
        }
    }

    /// Cap the number of calls requested from the provider per run
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Fetch the client's calls with its own API key and apply them
    ///
    /// # Errors
    ///
    /// - `ClientNotFound` for an unknown client
    /// - `ConfigurationMissing` when the client has no API key
    /// - `DispatchFailed` when the provider listing fails
    #[instrument(skip(self))]
    pub async fn sync_client(&self, client_id: i64) -> AppResult<SyncReport> {
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))?;

        let api_key = client
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::ConfigurationMissing("api_key".to_string()))?;

        let records = self
            .provider
            .list_calls(&CallListQuery {
                api_key: api_key.to_string(),
                assistant_id: client.assistant_id.clone(),
                limit: self.page_size,
            })
            .await?;

        self.apply(client.id, &records).await
    }

    /// Apply call records already fetched from the provider
    ///
    /// A record that fails is logged and counted; the rest still apply.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn apply(&self, client_id: i64, records: &[Value]) -> AppResult<SyncReport> {
        if self.clients.find_by_id(client_id).await?.is_none() {
            return Err(AppError::ClientNotFound(client_id.to_string()));
        }

        let mut report = SyncReport {
            client_id,
            fetched: records.len(),
            ..Default::default()
        };

        for record in records {
            match self.engine.sync_record(client_id, record).await {
                Ok(outcome) => report.count(&outcome),
                Err(e) => {
                    warn!(
                        "Skipping provider call {:?} for client {}: {}",
                        record.get("id"),
                        client_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Synced {} calls for client {}: {} billed, {} already billed, {} failed",
            report.fetched, client_id, report.billed, report.already_billed, report.failed
        );
        Ok(report)
    }
}
