//! Common traits for repositories and services
//!
//! Defines abstractions for storage, the calling provider and the rate
//! policy. Services hold these as `Arc<dyn Trait>` so Postgres and the
//! in-memory store are interchangeable.

use crate::error::AppError;
use crate::models::{
    Call, CallCompletion, CallListQuery, CallSettlement, CallStatus, Campaign, CampaignProgress, CampaignStatus,
    Client, ClientStatus, EventLog, Lead, NewCall, NewCampaign, NewClient, NewEventLog,
    OutboundCallRequest, ProviderCall, ProviderSettings, Setting, SettlementOutcome, StatusChange,
    Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Client storage
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, client: &NewClient) -> Result<Client, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Client>, AppError>;

    /// Find the active client that owns a provider assistant
    async fn find_by_assistant_id(&self, assistant_id: &str) -> Result<Option<Client>, AppError>;

    /// Update calling credentials; `None` fields are left unchanged
    async fn update_provider(
        &self,
        id: i64,
        settings: &ProviderSettings,
    ) -> Result<Client, AppError>;

    async fn set_status(&self, id: i64, status: ClientStatus) -> Result<Client, AppError>;

    /// Newest first, with the total count
    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Client>, i64), AppError>;
}

/// Ledger storage
///
/// Every balance mutation and its transaction row are written in one
/// atomic unit.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Insert a CREDIT and increment the balance
    async fn credit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<Transaction, AppError>;

    /// Insert a DEBIT and decrement the balance, which may go negative
    async fn debit(
        &self,
        client_id: i64,
        seconds: Decimal,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<Transaction, AppError>;

    /// Cached balance counter
    async fn balance_of(&self, client_id: i64) -> Result<Decimal, AppError>;

    /// Sum of all transaction amounts for the client
    async fn transaction_sum(&self, client_id: i64) -> Result<Decimal, AppError>;

    /// Newest first, with the total count
    async fn list_transactions(
        &self,
        client_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// Bill a completed call at most once
    ///
    /// Reads and flips the call's `cost_deducted` flag in the same atomic
    /// unit as the debit insert and balance decrement.
    async fn settle_call(&self, settlement: &CallSettlement)
        -> Result<SettlementOutcome, AppError>;

    /// Transactions still unprocessed that were created before `cutoff`
    async fn unprocessed_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, AppError>;
}

/// Call record storage
#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn create(&self, call: &NewCall) -> Result<Call, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Call>, AppError>;

    async fn find_by_provider_id(&self, provider_call_id: &str)
        -> Result<Option<Call>, AppError>;

    /// Move a call forward; backward transitions leave it untouched
    async fn advance_status(
        &self,
        provider_call_id: &str,
        status: CallStatus,
    ) -> Result<StatusChange, AppError>;

    /// Write terminal fields and mark `Completed`, creating the call if missing
    ///
    /// Never touches `cost_deducted`. Duration, billable seconds and costs of a
    /// call that is already settled are kept.
    async fn upsert_completed(&self, completion: &CallCompletion) -> Result<Call, AppError>;

    /// Record a successful dispatch
    async fn mark_initiated(
        &self,
        id: i64,
        provider_call_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<Call, AppError>;

    /// Record a failed dispatch
    async fn mark_failed(&self, id: i64, reason: &str) -> Result<Call, AppError>;

    async fn list_by_campaign(&self, campaign_id: i64) -> Result<Vec<Call>, AppError>;

    /// Calls of the campaign still waiting to be dispatched, oldest first
    async fn pending_for_campaign(&self, campaign_id: i64) -> Result<Vec<Call>, AppError>;

    /// Aggregates over the campaign's calls
    async fn campaign_progress(&self, campaign_id: i64) -> Result<CampaignProgress, AppError>;

    /// Number of the client's `Completed` calls and the sum of their durations
    async fn completed_totals(&self, client_id: i64) -> Result<(i64, Decimal), AppError>;
}

/// Campaign storage
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, campaign: &NewCampaign) -> Result<Campaign, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Campaign>, AppError>;

    /// Compare-and-set the status; `None` when the current status is not in `from`
    async fn transition(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, AppError>;

    /// Store recomputed aggregates and complete the campaign when nothing is outstanding
    async fn apply_progress(
        &self,
        id: i64,
        progress: &CampaignProgress,
    ) -> Result<Campaign, AppError>;

    /// The client's campaigns, newest first
    async fn list_by_client(&self, client_id: i64) -> Result<Vec<Campaign>, AppError>;
}

/// Lead storage
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Insert or reuse the lead for (client, phone number)
    async fn upsert(
        &self,
        client_id: i64,
        phone_number: &str,
        name: Option<&str>,
        campaign_id: Option<i64>,
    ) -> Result<Lead, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Lead>, AppError>;

    /// Mirror a call status onto the lead; `response` is kept when `None`
    async fn record_outcome(
        &self,
        id: i64,
        status: CallStatus,
        response: Option<&str>,
    ) -> Result<(), AppError>;
}

/// Raw event log storage
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn append(&self, entry: &NewEventLog) -> Result<EventLog, AppError>;

    /// Entries for one provider call in insertion order
    async fn list_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Vec<EventLog>, AppError>;
}

/// Key/value settings storage
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>, AppError>;

    async fn put(&self, key: &str, value: &Value) -> Result<Setting, AppError>;
}

/// Source of the billing multiplier
#[async_trait]
pub trait RatePolicy: Send + Sync {
    /// Multiplier for `client_id`; never fails, falls back to the default
    async fn multiplier(&self, client_id: Option<i64>) -> Decimal;
}

/// Outbound calling provider
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// Create a call; errors map to `DispatchFailed`
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<ProviderCall, AppError>;

    /// Raw call objects the provider holds for the account, newest first
    async fn list_calls(&self, query: &CallListQuery) -> Result<Vec<Value>, AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
