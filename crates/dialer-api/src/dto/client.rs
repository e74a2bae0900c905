//! Client DTOs
//!
//! Request and response types for client provisioning and ledger endpoints.

use chrono::{DateTime, Utc};
use dialer_core::models::{Client, ClientStatus, NewClient, ProviderSettings};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Client creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Client name is required"))]
    pub name: String,

    #[validate(length(min = 1))]
    pub api_key: Option<String>,

    #[validate(length(min = 1))]
    pub assistant_id: Option<String>,

    #[validate(length(min = 1))]
    pub phone_number_id: Option<String>,

    /// Advisory per-call estimate in seconds
    #[serde(default)]
    pub estimated_seconds_per_call: Decimal,

    /// Opening balance, recorded as a ledger credit
    pub initial_balance_seconds: Option<Decimal>,
}

impl CreateClientRequest {
    pub fn to_new_client(&self) -> NewClient {
        NewClient {
            name: self.name.trim().to_string(),
            api_key: self.api_key.clone(),
            assistant_id: self.assistant_id.clone(),
            phone_number_id: self.phone_number_id.clone(),
            estimated_seconds_per_call: self.estimated_seconds_per_call,
        }
    }
}

/// Calling configuration update; absent fields stay unchanged
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProviderRequest {
    #[validate(length(min = 1))]
    pub api_key: Option<String>,

    #[validate(length(min = 1))]
    pub assistant_id: Option<String>,

    #[validate(length(min = 1))]
    pub phone_number_id: Option<String>,

    pub estimated_seconds_per_call: Option<Decimal>,
}

impl From<UpdateProviderRequest> for ProviderSettings {
    fn from(req: UpdateProviderRequest) -> Self {
        Self {
            api_key: req.api_key,
            assistant_id: req.assistant_id,
            phone_number_id: req.phone_number_id,
            estimated_seconds_per_call: req.estimated_seconds_per_call,
        }
    }
}

/// Admin top-up
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreditRequest {
    /// Seconds to add (must be positive, checked by the ledger)
    pub seconds: Decimal,

    #[validate(length(max = 500))]
    pub reason: Option<String>,

    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

/// Client as exposed by the API; the API key never leaves the service
#[derive(Debug, Clone, Serialize)]
pub struct ClientResponse {
    pub id: i64,
    pub name: String,
    pub balance_seconds: Decimal,
    pub assistant_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub has_api_key: bool,
    pub estimated_seconds_per_call: Decimal,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        Self {
            id: client.id,
            name: client.name,
            balance_seconds: client.balance_seconds,
            assistant_id: client.assistant_id,
            phone_number_id: client.phone_number_id,
            has_api_key: client.api_key.map(|k| !k.trim().is_empty()).unwrap_or(false),
            estimated_seconds_per_call: client.estimated_seconds_per_call,
            status: client.status,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub client_id: i64,
    pub balance_seconds: Decimal,
}

/// Provider call objects pushed for reconciliation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SyncCallsRequest {
    #[validate(length(min = 1, max = 1000, message = "Between 1 and 1000 calls per request"))]
    pub calls: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_request_validation() {
        let req: CreateClientRequest = serde_json::from_value(serde_json::json!({
            "name": "Acme",
            "api_key": "key",
            "estimated_seconds_per_call": "90"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.to_new_client().estimated_seconds_per_call, dec!(90));

        let blank: CreateClientRequest =
            serde_json::from_value(serde_json::json!({"name": ""})).unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_response_hides_api_key() {
        let response = ClientResponse::from(Client {
            id: 3,
            api_key: Some("secret".to_string()),
            ..Default::default()
        });
        assert!(response.has_api_key);

        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_sync_request_needs_calls() {
        let empty: SyncCallsRequest =
            serde_json::from_value(serde_json::json!({"calls": []})).unwrap();
        assert!(empty.validate().is_err());

        let one: SyncCallsRequest =
            serde_json::from_value(serde_json::json!({"calls": [{"id": "pc-1"}]})).unwrap();
        assert!(one.validate().is_ok());
    }
}
