//! In-memory store implementation
//!
//! [`InMemoryStore`] implements every repository trait over a single
//! mutex-guarded state. Each trait method runs inside one critical section,
//! which gives call settlement the same all-or-nothing behavior as the
//! Postgres transaction.
//!
//! Not durable; intended for tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{
        Call, CallCompletion, CallSettlement, CallStatus, Campaign, CampaignProgress,
        CampaignStatus, Client, ClientStatus, EventLog, Lead, NewCall, NewCampaign, NewClient,
        NewEventLog, ProviderSettings, Setting, SettlementOutcome, StatusChange, Transaction,
        TransactionType,
    },
    traits::{
        CallRepository, CampaignRepository, ClientRepository, EventLogRepository,
        LeadRepository, LedgerRepository, SettingsRepository,
    },
    AppError, AppResult,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    clients: BTreeMap<i64, Client>,
    transactions: BTreeMap<i64, Transaction>,
    calls: BTreeMap<i64, Call>,
    calls_by_provider_id: HashMap<String, i64>,
    campaigns: BTreeMap<i64, Campaign>,
    leads: BTreeMap<i64, Lead>,
    leads_by_phone: HashMap<(i64, String), i64>,
    event_logs: Vec<EventLog>,
    settings: HashMap<String, Setting>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn client_mut(&mut self, id: i64) -> AppResult<&mut Client> {
        self.clients
            .get_mut(&id)
            .ok_or_else(|| AppError::ClientNotFound(id.to_string()))
    }

    /// Insert a transaction and apply it to the balance
    fn post(
        &mut self,
        client_id: i64,
        transaction_type: TransactionType,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        let signed = transaction_type.signed(seconds);
        let now = Utc::now();

        let client = self.client_mut(client_id)?;
        client.balance_seconds += signed;
        client.updated_at = now;

        let transaction = Transaction {
            id: self.next_id(),
            client_id,
            seconds: signed,
            transaction_type,
            reason: reason.to_string(),
            reference: reference.map(str::to_string),
            processed: true,
            created_at: now,
        };
        self.transactions.insert(transaction.id, transaction.clone());

        Ok(transaction)
    }
}

/// In-memory store for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction row verbatim, bypassing the balance
    ///
    /// Used to simulate rows left behind by an interrupted writer.
    pub fn insert_raw_transaction(&self, transaction: Transaction) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(transaction.id);
        state.transactions.insert(transaction.id, transaction);
    }

    /// Number of transactions recorded for a client
    pub fn transaction_count(&self, client_id: i64) -> usize {
        self.state
            .lock()
            .transactions
            .values()
            .filter(|t| t.client_id == client_id)
            .count()
    }

    /// Every call owned by a client, oldest first
    pub fn calls_of_client(&self, client_id: i64) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .values()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClientRepository for InMemoryStore {
    async fn create(&self, client: &NewClient) -> AppResult<Client> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let created = Client {
            id: state.next_id(),
            name: client.name.clone(),
            balance_seconds: Decimal::ZERO,
            api_key: client.api_key.clone(),
            assistant_id: client.assistant_id.clone(),
            phone_number_id: client.phone_number_id.clone(),
            estimated_seconds_per_call: client.estimated_seconds_per_call,
            status: ClientStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.clients.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Client>> {
        Ok(self.state.lock().clients.get(&id).cloned())
    }

    async fn find_by_assistant_id(&self, assistant_id: &str) -> AppResult<Option<Client>> {
        Ok(self
            .state
            .lock()
            .clients
            .values()
            .find(|c| c.is_active() && c.assistant_id.as_deref() == Some(assistant_id))
            .cloned())
    }

    async fn update_provider(&self, id: i64, settings: &ProviderSettings) -> AppResult<Client> {
        let mut state = self.state.lock();
        let client = state.client_mut(id)?;

        if let Some(key) = &settings.api_key {
            client.api_key = Some(key.clone());
        }
        if let Some(assistant) = &settings.assistant_id {
            client.assistant_id = Some(assistant.clone());
        }
        if let Some(phone) = &settings.phone_number_id {
            client.phone_number_id = Some(phone.clone());
        }
        if let Some(estimate) = settings.estimated_seconds_per_call {
            client.estimated_seconds_per_call = estimate;
        }
        client.updated_at = Utc::now();

        Ok(client.clone())
    }

    async fn set_status(&self, id: i64, status: ClientStatus) -> AppResult<Client> {
        let mut state = self.state.lock();
        let client = state.client_mut(id)?;
        client.status = status;
        client.updated_at = Utc::now();
        Ok(client.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<Client>, i64)> {
        let state = self.state.lock();
        let total = state.clients.len() as i64;
        let page = state
            .clients
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn credit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        Transaction::validate_amount(seconds)?;
        self.state
            .lock()
            .post(client_id, TransactionType::Credit, seconds, reason, reference)
    }

    async fn debit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<Transaction> {
        Transaction::validate_amount(seconds)?;
        self.state
            .lock()
            .post(client_id, TransactionType::Debit, seconds, reason, reference)
    }

    async fn balance_of(&self, client_id: i64) -> AppResult<Decimal> {
        self.state
            .lock()
            .clients
            .get(&client_id)
            .map(|c| c.balance_seconds)
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))
    }

    async fn transaction_sum(&self, client_id: i64) -> AppResult<Decimal> {
        Ok(self
            .state
            .lock()
            .transactions
            .values()
            .filter(|t| t.client_id == client_id)
            .map(|t| t.seconds)
            .sum())
    }

    async fn list_transactions(
        &self,
        client_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Transaction>, i64)> {
        let state = self.state.lock();
        let all: Vec<&Transaction> = state
            .transactions
            .values()
            .rev()
            .filter(|t| t.client_id == client_id)
            .collect();

        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn settle_call(&self, settlement: &CallSettlement) -> AppResult<SettlementOutcome> {
        let mut state = self.state.lock();

        let already = state
            .calls
            .get(&settlement.call_id)
            .map(|c| c.cost_deducted)
            .ok_or_else(|| AppError::CallNotFound(settlement.call_id.to_string()))?;

        if already {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let reference = settlement.call_id.to_string();
        let transaction = state.post(
            settlement.client_id,
            TransactionType::Debit,
            settlement.seconds,
            &settlement.reason,
            Some(&reference),
        )?;

        if let Some(call) = state.calls.get_mut(&settlement.call_id) {
            call.cost_deducted = true;
            call.updated_at = Utc::now();
        }

        Ok(SettlementOutcome::Debited(transaction))
    }

    async fn unprocessed_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Transaction>> {
        Ok(self
            .state
            .lock()
            .transactions
            .values()
            .filter(|t| t.is_dangling(cutoff))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CallRepository for InMemoryStore {
    async fn create(&self, call: &NewCall) -> AppResult<Call> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let created = Call {
            id: state.next_id(),
            client_id: call.client_id,
            lead_id: call.lead_id,
            campaign_id: call.campaign_id,
            customer_number: call.customer_number.clone(),
            assistant_id: call.assistant_id.clone(),
            status: call.status,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        state.calls.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Call>> {
        Ok(self.state.lock().calls.get(&id).cloned())
    }

    async fn find_by_provider_id(&self, provider_call_id: &str) -> AppResult<Option<Call>> {
        let state = self.state.lock();
        Ok(state
            .calls_by_provider_id
            .get(provider_call_id)
            .and_then(|id| state.calls.get(id))
            .cloned())
    }

    async fn advance_status(
        &self,
        provider_call_id: &str,
        status: CallStatus,
    ) -> AppResult<StatusChange> {
        let mut state = self.state.lock();

        let Some(id) = state.calls_by_provider_id.get(provider_call_id).copied() else {
            return Ok(StatusChange::NotFound);
        };
        let Some(call) = state.calls.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };

        if call.status.can_advance_to(status) {
            call.status = status;
            call.updated_at = Utc::now();
            Ok(StatusChange::Advanced(call.clone()))
        } else {
            Ok(StatusChange::Ignored(call.clone()))
        }
    }

    async fn upsert_completed(&self, completion: &CallCompletion) -> AppResult<Call> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let id = match state
            .calls_by_provider_id
            .get(&completion.provider_call_id)
            .copied()
        {
            Some(id) => id,
            None => {
                let id = state.next_id();
                let call = Call {
                    id,
                    client_id: completion.client_id,
                    provider_call_id: Some(completion.provider_call_id.clone()),
                    created_at: now,
                    ..Default::default()
                };
                state.calls.insert(id, call);
                state
                    .calls_by_provider_id
                    .insert(completion.provider_call_id.clone(), id);
                id
            }
        };

        let call = state
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(completion.provider_call_id.clone()))?;

        call.status = CallStatus::Completed;
        if call.customer_number.is_none() {
            call.customer_number = completion.customer_number.clone();
        }
        if call.assistant_id.is_none() {
            call.assistant_id = completion.assistant_id.clone();
        }
        call.started_at = completion.started_at.or(call.started_at);
        call.ended_at = completion.ended_at.or(call.ended_at);
        // Billing fields of a settled call match its DEBIT
        if !call.cost_deducted {
            call.duration_seconds = Some(completion.duration_seconds);
            call.billable_seconds = Some(completion.billable_seconds);
            call.cost = completion.cost.or(call.cost);
            call.final_cost = completion.final_cost.or(call.final_cost);
        }
        call.ended_reason = completion.ended_reason.clone().or(call.ended_reason.take());
        call.transcript = completion.transcript.clone().or(call.transcript.take());
        call.recording_url = completion.recording_url.clone().or(call.recording_url.take());
        call.stereo_recording_url = completion
            .stereo_recording_url
            .clone()
            .or(call.stereo_recording_url.take());
        call.summary = completion.summary.clone().or(call.summary.take());
        call.analysis = completion.analysis.clone().or(call.analysis.take());
        call.cost_breakdown = completion
            .cost_breakdown
            .clone()
            .or(call.cost_breakdown.take());
        call.updated_at = now;

        Ok(call.clone())
    }

    async fn mark_initiated(
        &self,
        id: i64,
        provider_call_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> AppResult<Call> {
        let mut state = self.state.lock();

        if let Some(owner) = state.calls_by_provider_id.get(provider_call_id) {
            if *owner != id {
                return Err(AppError::Conflict(format!(
                    "Provider call {} is already attached to another call",
                    provider_call_id
                )));
            }
        }

        let call = state
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        call.provider_call_id = Some(provider_call_id.to_string());
        call.dispatched_at = Some(dispatched_at);
        call.failure_reason = None;
        if matches!(call.status, CallStatus::NotInitiated | CallStatus::Pending) {
            call.status = CallStatus::Initiated;
        }
        call.updated_at = Utc::now();
        let updated = call.clone();

        state
            .calls_by_provider_id
            .insert(provider_call_id.to_string(), id);

        Ok(updated)
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> AppResult<Call> {
        let mut state = self.state.lock();
        let call = state
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        if call.status.can_advance_to(CallStatus::Failed) {
            call.status = CallStatus::Failed;
        }
        call.failure_reason = Some(reason.to_string());
        call.updated_at = Utc::now();

        Ok(call.clone())
    }

    async fn list_by_campaign(&self, campaign_id: i64) -> AppResult<Vec<Call>> {
        Ok(self
            .state
            .lock()
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id))
            .cloned()
            .collect())
    }

    async fn pending_for_campaign(&self, campaign_id: i64) -> AppResult<Vec<Call>> {
        Ok(self
            .state
            .lock()
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id) && c.status == CallStatus::Pending)
            .cloned()
            .collect())
    }

    async fn campaign_progress(&self, campaign_id: i64) -> AppResult<CampaignProgress> {
        let state = self.state.lock();
        let mut progress = CampaignProgress::default();

        for call in state
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id))
        {
            if call.status.is_dispatched() {
                progress.processed_leads += 1;
            }
            if call.status.is_outstanding() {
                progress.outstanding += 1;
            }
            if call.status == CallStatus::Completed {
                progress.actual_seconds += call.duration_seconds.unwrap_or_default();
            }
        }

        Ok(progress)
    }

    async fn completed_totals(&self, client_id: i64) -> AppResult<(i64, Decimal)> {
        let state = self.state.lock();
        Ok(state
            .calls
            .values()
            .filter(|c| c.client_id == client_id && c.status == CallStatus::Completed)
            .fold((0, Decimal::ZERO), |(count, seconds), call| {
                (count + 1, seconds + call.duration_seconds.unwrap_or_default())
            }))
    }
}

#[async_trait]
impl CampaignRepository for InMemoryStore {
    async fn create(&self, campaign: &NewCampaign) -> AppResult<Campaign> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let created = Campaign {
            id: state.next_id(),
            client_id: campaign.client_id,
            name: campaign.name.clone(),
            kind: campaign.kind.clone(),
            total_leads: campaign.total_leads,
            processed_leads: 0,
            estimated_seconds: campaign.estimated_seconds,
            actual_seconds: Decimal::ZERO,
            status: CampaignStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        state.campaigns.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Campaign>> {
        Ok(self.state.lock().campaigns.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> AppResult<Option<Campaign>> {
        let mut state = self.state.lock();

        match state.campaigns.get_mut(&id) {
            Some(campaign) if from.contains(&campaign.status) => {
                campaign.status = to;
                campaign.updated_at = Utc::now();
                Ok(Some(campaign.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn apply_progress(&self, id: i64, progress: &CampaignProgress) -> AppResult<Campaign> {
        let mut state = self.state.lock();
        let campaign = state
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AppError::CampaignNotFound(id.to_string()))?;

        campaign.processed_leads = progress.processed_leads;
        campaign.actual_seconds = progress.actual_seconds;
        if progress.outstanding == 0 && campaign.status.awaits_completion() {
            campaign.status = CampaignStatus::Completed;
        }
        campaign.updated_at = Utc::now();

        Ok(campaign.clone())
    }

    async fn list_by_client(&self, client_id: i64) -> AppResult<Vec<Campaign>> {
        Ok(self
            .state
            .lock()
            .campaigns
            .values()
            .rev()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LeadRepository for InMemoryStore {
    async fn upsert(
        &self,
        client_id: i64,
        phone_number: &str,
        name: Option<&str>,
        campaign_id: Option<i64>,
    ) -> AppResult<Lead> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let key = (client_id, phone_number.to_string());

        if let Some(id) = state.leads_by_phone.get(&key).copied() {
            let lead = state
                .leads
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("lead {}", id)))?;
            if name.is_some() {
                lead.name = name.map(str::to_string);
            }
            if campaign_id.is_some() {
                lead.campaign_id = campaign_id;
            }
            lead.updated_at = now;
            return Ok(lead.clone());
        }

        let lead = Lead {
            id: state.next_id(),
            client_id,
            name: name.map(str::to_string),
            phone_number: phone_number.to_string(),
            campaign_id,
            status: CallStatus::NotInitiated,
            response: None,
            created_at: now,
            updated_at: now,
        };
        state.leads_by_phone.insert(key, lead.id);
        state.leads.insert(lead.id, lead.clone());

        Ok(lead)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Lead>> {
        Ok(self.state.lock().leads.get(&id).cloned())
    }

    async fn record_outcome(
        &self,
        id: i64,
        status: CallStatus,
        response: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(lead) = state.leads.get_mut(&id) {
            lead.status = status;
            if let Some(text) = response {
                lead.response = Some(text.to_string());
            }
            lead.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl EventLogRepository for InMemoryStore {
    async fn append(&self, entry: &NewEventLog) -> AppResult<EventLog> {
        let mut state = self.state.lock();
        let log = EventLog {
            id: state.next_id(),
            event: entry.event.clone(),
            provider_call_id: entry.provider_call_id.clone(),
            payload: entry.payload.clone(),
            created_at: Utc::now(),
        };
        state.event_logs.push(log.clone());
        Ok(log)
    }

    async fn list_by_provider_call_id(&self, provider_call_id: &str) -> AppResult<Vec<EventLog>> {
        Ok(self
            .state
            .lock()
            .event_logs
            .iter()
            .filter(|e| e.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<Setting>> {
        Ok(self.state.lock().settings.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> AppResult<Setting> {
        let setting = Setting {
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        };
        self.state
            .lock()
            .settings
            .insert(key.to_string(), setting.clone());
        Ok(setting)
    }
}
