//! Call model and lifecycle
//!
//! Calls move forward through
//! `NotInitiated -> Pending -> Initiated -> InProgress -> Ended -> Completed`.
//! `Failed` is only reachable from `Pending` or `Initiated`. Billing happens
//! only once a call is `Completed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Call lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CallStatus {
    #[default]
    NotInitiated,
    Pending,
    Initiated,
    InProgress,
    Ended,
    Completed,
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::NotInitiated => "NotInitiated",
            CallStatus::Pending => "Pending",
            CallStatus::Initiated => "Initiated",
            CallStatus::InProgress => "InProgress",
            CallStatus::Ended => "Ended",
            CallStatus::Completed => "Completed",
            CallStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

impl CallStatus {
    pub const ALL: [CallStatus; 7] = [
        CallStatus::NotInitiated,
        CallStatus::Pending,
        CallStatus::Initiated,
        CallStatus::InProgress,
        CallStatus::Ended,
        CallStatus::Completed,
        CallStatus::Failed,
    ];

    /// Parse from string, ignoring case, spaces, dashes and underscores
    pub fn from_str(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "notinitiated" => Some(CallStatus::NotInitiated),
            "pending" => Some(CallStatus::Pending),
            "initiated" => Some(CallStatus::Initiated),
            "inprogress" => Some(CallStatus::InProgress),
            "ended" => Some(CallStatus::Ended),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Map a provider `status-update` status onto the lifecycle
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "queued" | "ringing" => Some(CallStatus::Initiated),
            "in-progress" | "forwarding" => Some(CallStatus::InProgress),
            "ended" => Some(CallStatus::Ended),
            _ => None,
        }
    }

    /// Position on the forward path; `Failed` sits outside it
    fn rank(&self) -> Option<u8> {
        match self {
            CallStatus::NotInitiated => Some(0),
            CallStatus::Pending => Some(1),
            CallStatus::Initiated => Some(2),
            CallStatus::InProgress => Some(3),
            CallStatus::Ended => Some(4),
            CallStatus::Completed => Some(5),
            CallStatus::Failed => None,
        }
    }

    /// Whether a transition from `self` to `next` moves the call forward
    pub fn can_advance_to(&self, next: CallStatus) -> bool {
        match (self, next) {
            (CallStatus::Completed, _) => false,
            (current, CallStatus::Completed) => *current != CallStatus::Completed,
            (CallStatus::Failed, _) => false,
            (current, CallStatus::Failed) => {
                matches!(current, CallStatus::Pending | CallStatus::Initiated)
            }
            (current, next) => match (current.rank(), next.rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Statuses from which `target` is a forward move
    pub fn predecessors_of(target: CallStatus) -> Vec<CallStatus> {
        CallStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.can_advance_to(target))
            .collect()
    }

    /// Calls a campaign is still waiting on
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            CallStatus::Pending | CallStatus::Initiated | CallStatus::InProgress | CallStatus::Ended
        )
    }

    /// Calls that reached the provider
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            CallStatus::Initiated | CallStatus::InProgress | CallStatus::Ended | CallStatus::Completed
        )
    }
}

/// Call entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: i64,
    pub client_id: i64,
    pub lead_id: Option<i64>,
    pub campaign_id: Option<i64>,

    /// Provider-assigned id, unique once set
    pub provider_call_id: Option<String>,

    pub status: CallStatus,

    /// Destination number in E.164 form
    pub customer_number: Option<String>,
    pub assistant_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Raw talk time reported by the provider
    pub duration_seconds: Option<Decimal>,

    /// Seconds charged to the client's balance
    pub billable_seconds: Option<Decimal>,

    /// Provider cost as reported
    pub cost: Option<Decimal>,

    /// Provider cost after the rate multiplier
    pub final_cost: Option<Decimal>,

    /// True once the single debit for this call has been written
    pub cost_deducted: bool,

    pub ended_reason: Option<String>,
    pub failure_reason: Option<String>,

    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub stereo_recording_url: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<Value>,
    pub cost_breakdown: Option<Value>,

    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// Whether a debit is still owed for this call
    pub fn is_billable(&self) -> bool {
        self.status == CallStatus::Completed && !self.cost_deducted
    }
}

impl Default for Call {
    fn default() -> Self {
        Self {
            id: 0,
            client_id: 0,
            lead_id: None,
            campaign_id: None,
            provider_call_id: None,
            status: CallStatus::NotInitiated,
            customer_number: None,
            assistant_id: None,
            created_at: Utc::now(),
            dispatched_at: None,
            started_at: None,
            ended_at: None,
            duration_seconds: None,
            billable_seconds: None,
            cost: None,
            final_cost: None,
            cost_deducted: false,
            ended_reason: None,
            failure_reason: None,
            transcript: None,
            recording_url: None,
            stereo_recording_url: None,
            summary: None,
            analysis: None,
            cost_breakdown: None,
            updated_at: Utc::now(),
        }
    }
}

/// Data for creating a call record
#[derive(Debug, Clone, Default)]
pub struct NewCall {
    pub client_id: i64,
    pub lead_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub customer_number: Option<String>,
    pub assistant_id: Option<String>,
    pub status: CallStatus,
}

/// Terminal fields carried by an end-of-call report
///
/// Applied as an upsert keyed by `provider_call_id`.
#[derive(Debug, Clone, Default)]
pub struct CallCompletion {
    pub provider_call_id: String,
    /// Owner used when the call has to be created
    pub client_id: i64,
    pub assistant_id: Option<String>,
    pub customer_number: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Decimal,
    pub billable_seconds: Decimal,
    pub cost: Option<Decimal>,
    pub final_cost: Option<Decimal>,
    pub ended_reason: Option<String>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub stereo_recording_url: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<Value>,
    pub cost_breakdown: Option<Value>,
}

/// Outcome of a monotonic status update
#[derive(Debug, Clone)]
pub enum StatusChange {
    /// No call carries this provider id
    NotFound,
    /// The call moved forward
    Advanced(Call),
    /// The update would have moved the call backwards
    Ignored(Call),
}
