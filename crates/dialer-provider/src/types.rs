//! Wire types for the provider REST API

use chrono::{DateTime, Utc};
use dialer_core::models::{OutboundCallRequest, ProviderCall};
use serde::{Deserialize, Serialize};

/// Call type sent for every outbound dispatch
pub const OUTBOUND_CALL_TYPE: &str = "outboundPhoneCall";

/// Body of `POST /call`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub assistant_id: String,
    pub phone_number_id: String,
    pub customer: Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub number: String,
}

impl CreateCallRequest {
    pub fn from_request(name: &str, request: &OutboundCallRequest) -> Self {
        Self {
            name: name.to_string(),
            call_type: OUTBOUND_CALL_TYPE.to_string(),
            assistant_id: request.credentials.assistant_id.clone(),
            phone_number_id: request.credentials.phone_number_id.clone(),
            customer: Customer {
                number: request.destination_number.clone(),
            },
        }
    }
}

/// Relevant subset of the provider's call object
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallResponse {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<CreateCallResponse> for ProviderCall {
    fn from(response: CreateCallResponse) -> Self {
        Self {
            provider_call_id: response.id,
            created_at: response.created_at,
            status: response.status,
        }
    }
}
