//! Reconciliation engine
//!
//! Applies provider webhook events to call records and bills completed
//! calls against the client's ledger.
//!
//! # Guarantees
//!
//! - Every inbound body is appended to the raw-event log before it is applied
//! - Status updates only ever move a call forward
//! - An end-of-call report debits the client at most once per call, no matter
//!   how often or how concurrently it is delivered; the check and flip of
//!   `cost_deducted` happen inside `LedgerRepository::settle_call`
//! - Failures are recorded as `<event>_error` log entries and the logged
//!   events can be replayed

use dialer_core::{
    models::{
        CallCompletion, CallSettlement, CallStatus, CampaignStatus, EventType, NewEventLog, ProviderEvent,
        SettlementOutcome, StatusChange,
    },
    traits::{
        CallRepository, CampaignRepository, ClientRepository, EventLogRepository,
        LeadRepository, LedgerRepository, RatePolicy,
    },
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::campaign::refresh_progress;
use crate::constants::{BILLABLE_SECONDS_SCALE, CALL_DEBIT_REASON};

/// Event name logged for bodies whose type cannot be read
const UNKNOWN_EVENT: &str = "unknown";

/// What applying one event did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Event type not applied to state
    Ignored { event: String },
    /// Status update for a call that does not exist yet
    Orphaned { provider_call_id: String },
    StatusUnchanged { call_id: i64, status: CallStatus },
    StatusAdvanced { call_id: i64, status: CallStatus },
    Billed {
        call_id: i64,
        transaction_id: i64,
        billable_seconds: Decimal,
    },
    AlreadyBilled { call_id: i64 },
}

/// Result of replaying the logged events of one call
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub provider_call_id: String,
    pub replayed: usize,
    pub failed: usize,
    pub outcomes: Vec<ReconciliationOutcome>,
}

pub struct ReconciliationEngine {
    calls: Arc<dyn CallRepository>,
    ledger: Arc<dyn LedgerRepository>,
    clients: Arc<dyn ClientRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    leads: Arc<dyn LeadRepository>,
    events: Arc<dyn EventLogRepository>,
    rate_policy: Arc<dyn RatePolicy>,
}

impl ReconciliationEngine {
    pub fn new(
        calls: Arc<dyn CallRepository>,
        ledger: Arc<dyn LedgerRepository>,
        clients: Arc<dyn ClientRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        leads: Arc<dyn LeadRepository>,
        events: Arc<dyn EventLogRepository>,
        rate_policy: Arc<dyn RatePolicy>,
    ) -> Self {
        Self {
            calls,
            ledger,
            clients,
            campaigns,
            leads,
            events,
            rate_policy,
        }
    }

    /// Log and apply one webhook body
    ///
    /// # Errors
    ///
    /// - `MalformedEvent` when the body has no type or provider call id
    /// - `ClientNotFound` when a report for an unknown call cannot be attributed
    /// - storage errors, after which the provider is expected to redeliver
    #[instrument(skip(self, body))]
    pub async fn handle(&self, body: &Value) -> AppResult<ReconciliationOutcome> {
        let event = match ProviderEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed provider event: {}", e);
                let entry = NewEventLog {
                    event: event_name(body),
                    provider_call_id: ProviderEvent::peek_call_id(body),
                    payload: body.clone(),
                };
                if let Err(log_err) = self.events.append(&entry).await {
                    error!("Failed to log malformed event: {}", log_err);
                }
                return Err(e);
            }
        };

        self.log_and_apply(&event, None).await
    }

    /// Log and apply one call object read back from the provider's listing
    ///
    /// The record goes through the same path as a webhook: ended calls are
    /// upserted and settled at most once, live calls only move forward.
    /// Calls this system never created are attributed to `client_id`.
    ///
    /// # Errors
    ///
    /// - `MalformedEvent` when the record is not an object or has no id
    /// - `Conflict` when the call belongs to another client
    #[instrument(skip(self, record))]
    pub async fn sync_record(
        &self,
        client_id: i64,
        record: &Value,
    ) -> AppResult<ReconciliationOutcome> {
        let body = ProviderEvent::call_record_body(record)?;
        let event = ProviderEvent::parse(&body)?;

        if let Some(call) = self.calls.find_by_provider_id(&event.provider_call_id).await? {
            if call.client_id != client_id {
                warn!(
                    "Provider call {} belongs to client {}, not {}",
                    event.provider_call_id, call.client_id, client_id
                );
                return Err(AppError::Conflict(format!(
                    "call {} belongs to another client",
                    event.provider_call_id
                )));
            }
        }

        self.log_and_apply(&event, Some(client_id)).await
    }

    /// Apply an already parsed event without logging it
    pub async fn process(&self, event: &ProviderEvent) -> AppResult<ReconciliationOutcome> {
        self.apply(event, None).await
    }

    async fn log_and_apply(
        &self,
        event: &ProviderEvent,
        owner: Option<i64>,
    ) -> AppResult<ReconciliationOutcome> {
        self.events
            .append(&NewEventLog {
                event: event.event_type.to_string(),
                provider_call_id: Some(event.provider_call_id.clone()),
                payload: event.raw.clone(),
            })
            .await?;

        match self.apply(event, owner).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.log_failure(event, &e).await;
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        event: &ProviderEvent,
        owner: Option<i64>,
    ) -> AppResult<ReconciliationOutcome> {
        match &event.event_type {
            EventType::StatusUpdate => self.apply_status_update(event).await,
            EventType::EndOfCallReport => self.apply_end_of_call_report(event, owner).await,
            EventType::Other(name) => {
                debug!(
                    "Acknowledging {} for call {} without changes",
                    name, event.provider_call_id
                );
                Ok(ReconciliationOutcome::Ignored { event: name.clone() })
            }
        }
    }

    /// Re-apply every logged event for a provider call, in arrival order
    ///
    /// Failure entries are skipped. Safe to run repeatedly.
    #[instrument(skip(self))]
    pub async fn replay(&self, provider_call_id: &str) -> AppResult<ReplayReport> {
        let entries = self.events.list_by_provider_call_id(provider_call_id).await?;
        let entries: Vec<_> = entries.into_iter().filter(|e| !e.is_error_entry()).collect();

        if entries.is_empty() {
            return Err(AppError::NotFound(format!(
                "No logged events for provider call {}",
                provider_call_id
            )));
        }

        let mut report = ReplayReport {
            provider_call_id: provider_call_id.to_string(),
            replayed: 0,
            failed: 0,
            outcomes: Vec::with_capacity(entries.len()),
        };

        for entry in entries {
            let result = match ProviderEvent::parse(&entry.payload) {
                Ok(event) => self.process(&event).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    report.replayed += 1;
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    warn!("Replay of event log {} failed: {}", entry.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Replayed {} events for {} ({} failed)",
            report.replayed, provider_call_id, report.failed
        );
        Ok(report)
    }

    async fn apply_status_update(&self, event: &ProviderEvent) -> AppResult<ReconciliationOutcome> {
        let ignored = || ReconciliationOutcome::Ignored {
            event: event.event_type.to_string(),
        };

        let Some(raw_status) = event.status.as_deref() else {
            warn!("status-update for {} carries no status", event.provider_call_id);
            return Ok(ignored());
        };

        let Some(status) = CallStatus::from_provider_status(raw_status) else {
            debug!(
                "Ignoring provider status {:?} for {}",
                raw_status, event.provider_call_id
            );
            return Ok(ignored());
        };

        match self.calls.advance_status(&event.provider_call_id, status).await? {
            StatusChange::NotFound => {
                warn!(
                    "status-update {} for unknown call {}, dropping",
                    raw_status, event.provider_call_id
                );
                Ok(ReconciliationOutcome::Orphaned {
                    provider_call_id: event.provider_call_id.clone(),
                })
            }
            StatusChange::Ignored(call) => {
                debug!("Call {} stays {} (got {})", call.id, call.status, status);
                Ok(ReconciliationOutcome::StatusUnchanged {
                    call_id: call.id,
                    status: call.status,
                })
            }
            StatusChange::Advanced(call) => {
                info!("Call {} advanced to {}", call.id, call.status);
                if let Some(lead_id) = call.lead_id {
                    self.leads.record_outcome(lead_id, call.status, None).await?;
                }
                Ok(ReconciliationOutcome::StatusAdvanced {
                    call_id: call.id,
                    status: call.status,
                })
            }
        }
    }

    async fn apply_end_of_call_report(
        &self,
        event: &ProviderEvent,
        owner: Option<i64>,
    ) -> AppResult<ReconciliationOutcome> {
        let existing = self.calls.find_by_provider_id(&event.provider_call_id).await?;

        let client_id = match (&existing, owner) {
            (Some(call), _) => call.client_id,
            (None, Some(owner)) => owner,
            (None, None) => self.attribute(event).await?,
        };

        let multiplier = self.rate_policy.multiplier(Some(client_id)).await;
        let raw_seconds = event.raw_duration();
        let mut billable_seconds = (raw_seconds * multiplier).round_dp(BILLABLE_SECONDS_SCALE);
        let mut final_cost = event.cost.map(|c| c * multiplier);

        // A settled call keeps the amounts it was billed for
        if let Some(call) = existing.as_ref().filter(|c| c.cost_deducted) {
            billable_seconds = call.billable_seconds.unwrap_or(billable_seconds);
            final_cost = call.final_cost.or(final_cost);
        }

        let completion = CallCompletion {
            provider_call_id: event.provider_call_id.clone(),
            client_id,
            assistant_id: event.assistant_id.clone(),
            customer_number: event.customer_number.clone(),
            started_at: event.started_at,
            ended_at: event.ended_at,
            duration_seconds: raw_seconds,
            billable_seconds,
            cost: event.cost,
            final_cost,
            ended_reason: event.ended_reason.clone(),
            transcript: event.transcript.clone(),
            recording_url: event.recording_url.clone(),
            stereo_recording_url: event.stereo_recording_url.clone(),
            summary: event.summary.clone(),
            analysis: event.analysis.clone(),
            cost_breakdown: event.cost_breakdown.clone(),
        };

        let call = self.calls.upsert_completed(&completion).await?;

        let settlement = CallSettlement {
            call_id: call.id,
            client_id: call.client_id,
            seconds: billable_seconds,
            reason: format!("{}: {}s x {}", CALL_DEBIT_REASON, raw_seconds, multiplier),
        };

        let outcome = match self.ledger.settle_call(&settlement).await? {
            SettlementOutcome::Debited(transaction) => {
                info!(
                    "Billed call {} for client {}: {}s (transaction {})",
                    call.id, call.client_id, billable_seconds, transaction.id
                );
                ReconciliationOutcome::Billed {
                    call_id: call.id,
                    transaction_id: transaction.id,
                    billable_seconds,
                }
            }
            SettlementOutcome::AlreadySettled => {
                info!("Call {} already billed, skipping debit", call.id);
                ReconciliationOutcome::AlreadyBilled { call_id: call.id }
            }
        };

        if let Some(lead_id) = call.lead_id {
            self.leads
                .record_outcome(lead_id, CallStatus::Completed, None)
                .await?;
        }

        if let Some(campaign_id) = call.campaign_id {
            let campaign =
                refresh_progress(self.calls.as_ref(), self.campaigns.as_ref(), campaign_id).await?;
            if campaign.status == CampaignStatus::Completed {
                info!("Campaign {} has no outstanding calls", campaign_id);
            }
        }

        Ok(outcome)
    }

    /// Owner of a report for a call this system never created
    async fn attribute(&self, event: &ProviderEvent) -> AppResult<i64> {
        if let Some(assistant_id) = event.assistant_id.as_deref() {
            if let Some(client) = self.clients.find_by_assistant_id(assistant_id).await? {
                debug!(
                    "Attributed call {} to client {} via assistant {}",
                    event.provider_call_id, client.id, assistant_id
                );
                return Ok(client.id);
            }
        }

        warn!(
            "Cannot attribute report for unknown call {} (assistant {:?})",
            event.provider_call_id, event.assistant_id
        );
        Err(AppError::ClientNotFound(format!(
            "no client for call {}",
            event.provider_call_id
        )))
    }

    async fn log_failure(&self, event: &ProviderEvent, err: &AppError) {
        let entry = NewEventLog {
            event: event.event_type.error_event(),
            provider_call_id: Some(event.provider_call_id.clone()),
            payload: json!({
                "error": err.to_string(),
                "code": err.error_code(),
                "body": event.raw,
            }),
        };

        if let Err(e) = self.events.append(&entry).await {
            error!(
                "Failed to record {} for {}: {}",
                entry.event, event.provider_call_id, e
            );
        }
    }
}

fn event_name(body: &Value) -> String {
    let msg = body.get("message").unwrap_or(body);
    msg.get("type")
        .or_else(|| msg.get("eventType"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_EVENT)
        .to_string()
}
