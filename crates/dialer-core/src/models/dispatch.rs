//! Outbound dispatch request and provider acknowledgement

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ProviderCredentials;

/// A single call to hand to the provider
#[derive(Debug, Clone)]
pub struct OutboundCallRequest {
    /// Normalized destination, `+` followed by digits
    pub destination_number: String,
    pub credentials: ProviderCredentials,
}

/// Provider acknowledgement of a created call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    pub provider_call_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Filter for reading back a client's calls from the provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallListQuery {
    pub api_key: String,
    /// Restrict the listing to one assistant
    pub assistant_id: Option<String>,
    pub limit: Option<u32>,
}
