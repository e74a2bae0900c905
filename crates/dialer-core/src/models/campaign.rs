//! Campaign model
//!
//! Campaigns move forward only: `Draft -> Running -> Initiated -> Completed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CampaignStatus {
    /// Created, not yet started
    #[default]
    Draft,
    /// Orchestrator is dispatching calls
    Running,
    /// All calls dispatched, waiting for reports
    Initiated,
    /// No outstanding calls remain
    Completed,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "Draft"),
            CampaignStatus::Running => write!(f, "Running"),
            CampaignStatus::Initiated => write!(f, "Initiated"),
            CampaignStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl CampaignStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(CampaignStatus::Draft),
            "running" => Some(CampaignStatus::Running),
            "initiated" => Some(CampaignStatus::Initiated),
            "completed" => Some(CampaignStatus::Completed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CampaignStatus::Draft => 0,
            CampaignStatus::Running => 1,
            CampaignStatus::Initiated => 2,
            CampaignStatus::Completed => 3,
        }
    }

    pub fn can_advance_to(&self, next: CampaignStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Whether the campaign may flip to `Completed` once its calls settle
    pub fn awaits_completion(&self) -> bool {
        matches!(self, CampaignStatus::Running | CampaignStatus::Initiated)
    }
}

/// Campaign entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub client_id: i64,
    pub name: String,

    /// Free-form label, e.g. `outbound`
    pub kind: String,

    pub total_leads: i64,

    /// Calls successfully handed to the provider
    pub processed_leads: i64,

    /// `estimated_seconds_per_call` × leads at creation time
    pub estimated_seconds: Decimal,

    /// Sum of raw durations over completed calls
    pub actual_seconds: Decimal,

    pub status: CampaignStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Campaign {
    fn default() -> Self {
        Self {
            id: 0,
            client_id: 0,
            name: String::new(),
            kind: "outbound".to_string(),
            total_leads: 0,
            processed_leads: 0,
            estimated_seconds: Decimal::ZERO,
            actual_seconds: Decimal::ZERO,
            status: CampaignStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Data for creating a campaign in `Draft`
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub client_id: i64,
    pub name: String,
    pub kind: String,
    pub total_leads: i64,
    pub estimated_seconds: Decimal,
}

/// Aggregates derived from a campaign's calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignProgress {
    pub processed_leads: i64,
    pub actual_seconds: Decimal,
    /// Calls in Pending, Initiated, InProgress or Ended
    pub outstanding: i64,
}

/// Summary returned by a campaign run
#[derive(Debug, Clone, Serialize)]
pub struct CampaignRunReport {
    pub campaign_id: i64,
    pub dispatched: usize,
    pub failed: usize,
    pub status: CampaignStatus,
}

/// Per-client totals over campaigns and completed calls
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignStats {
    pub client_id: i64,
    pub total_campaigns: i64,
    /// Calls that reached `Completed`, inside or outside a campaign
    pub completed_calls: i64,
    /// Sum of raw durations over those calls
    pub total_duration_seconds: Decimal,
}
