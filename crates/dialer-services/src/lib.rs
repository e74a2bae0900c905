//! Business logic services for the dialer
//!
//! This crate holds everything between the HTTP surface and storage:
//! webhook reconciliation, the ledger, the rate policy, call dispatch and
//! campaign orchestration.
//!
//! # Architecture
//!
//! Services hold their collaborators as `Arc<dyn Trait>` from dialer-core,
//! so the same service runs against Postgres in production and against the
//! in-memory store in tests.
//!
//! # Services
//!
//! - `ReconciliationEngine` - applies provider webhook events and bills calls once
//! - `LedgerService` - credits, balances, transaction listing and audits
//! - `SettingsRatePolicy` - billing multiplier from settings, cached in Redis
//! - `CallDispatcher` - places single calls through the provider
//! - `CampaignService` - builds campaigns from lead lists
//! - `CampaignOrchestrator` - runs a campaign's pending calls
//! - `LedgerAuditor` - surfaces transactions left unprocessed
//! - `CallSync` - pulls a client's calls from the provider and reconciles them

pub mod audit;
pub mod campaign;
pub mod dispatcher;
pub mod ledger;
pub mod orchestrator;
pub mod rate_policy;
pub mod reconciliation;
pub mod sync;

pub use audit::LedgerAuditor;
pub use campaign::{CampaignService, LeadInput, NewCampaignRequest};
pub use dispatcher::CallDispatcher;
pub use ledger::LedgerService;
pub use orchestrator::CampaignOrchestrator;
pub use rate_policy::{FixedRatePolicy, SettingsRatePolicy};
pub use reconciliation::{ReconciliationEngine, ReconciliationOutcome, ReplayReport};
pub use sync::{CallSync, SyncReport};

/// Business logic constants
pub mod constants {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Multiplier applied when no setting and no configuration value exist
    pub const DEFAULT_RATE_MULTIPLIER: Decimal = dec!(2);

    /// Decimal places kept on billable seconds
    pub const BILLABLE_SECONDS_SCALE: u32 = 2;

    /// Rate multiplier cache TTL in seconds
    pub const RATE_CACHE_TTL: u64 = 60;

    /// Default provider request timeout in milliseconds
    pub const DISPATCH_TIMEOUT_MS: u64 = 10_000;

    /// Default grace period before an unprocessed transaction is reported
    pub const LEDGER_GRACE_PERIOD_SECS: i64 = 300;

    /// Failure recorded on a campaign call without a destination
    pub const MISSING_NUMBER_REASON: &str = "No phone number on call";

    /// Reason written on the DEBIT for a completed call
    pub const CALL_DEBIT_REASON: &str = "Call completed";
}
