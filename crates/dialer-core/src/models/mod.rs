//! Domain models for the dialer
//!
//! This module contains all the core domain models used throughout the application.

pub mod call;
pub mod campaign;
pub mod client;
pub mod dispatch;
pub mod event;
pub mod event_log;
pub mod lead;
pub mod setting;
pub mod transaction;

pub use call::{Call, CallCompletion, CallStatus, NewCall, StatusChange};
pub use campaign::{
    Campaign, CampaignProgress, CampaignRunReport, CampaignStats, CampaignStatus, NewCampaign,
};
pub use client::{Client, ClientStatus, NewClient, ProviderCredentials, ProviderSettings};
pub use dispatch::{CallListQuery, OutboundCallRequest, ProviderCall};
pub use event::{EventType, ProviderEvent};
pub use event_log::{EventLog, NewEventLog};
pub use lead::{normalize_phone, Lead};
pub use setting::Setting;
pub use transaction::{
    CallSettlement, LedgerAudit, SettlementOutcome, Transaction, TransactionType,
};
