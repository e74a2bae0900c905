//! Client model
//!
//! A client is a tenant with a prepaid balance expressed in seconds and the
//! credentials used to place calls through the calling provider.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// Client status enumeration
///
/// Clients are never deleted, only deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Active => write!(f, "active"),
            ClientStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl ClientStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ClientStatus::Active),
            "inactive" => Some(ClientStatus::Inactive),
            _ => None,
        }
    }
}

/// Credentials for a single outbound dispatch
///
/// Built from the owning client every time a call is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub assistant_id: String,
    pub phone_number_id: String,
}

impl ProviderCredentials {
    /// Build credentials, failing with `ConfigurationMissing` when any part is blank
    pub fn new(
        api_key: Option<&str>,
        assistant_id: Option<&str>,
        phone_number_id: Option<&str>,
    ) -> Result<Self, AppError> {
        let mut missing = Vec::new();

        let mut take = |value: Option<&str>, name: &'static str| -> String {
            match value.map(str::trim).filter(|v| !v.is_empty()) {
                Some(v) => v.to_string(),
                None => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let api_key = take(api_key, "api_key");
        let assistant_id = take(assistant_id, "assistant_id");
        let phone_number_id = take(phone_number_id, "phone_number_id");

        if !missing.is_empty() {
            return Err(AppError::ConfigurationMissing(missing.join(", ")));
        }

        Ok(Self {
            api_key,
            assistant_id,
            phone_number_id,
        })
    }
}

/// Client entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier
    pub id: i64,

    /// Display name
    pub name: String,

    /// Prepaid balance in seconds; may go negative after billing
    pub balance_seconds: Decimal,

    /// Provider API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Provider assistant used for this client's calls
    pub assistant_id: Option<String>,

    /// Provider phone number the calls originate from
    pub phone_number_id: Option<String>,

    /// Advisory per-call estimate used by the campaign balance check
    pub estimated_seconds_per_call: Decimal,

    pub status: ClientStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    /// Credentials for dispatching a call on behalf of this client
    pub fn credentials(&self) -> Result<ProviderCredentials, AppError> {
        ProviderCredentials::new(
            self.api_key.as_deref(),
            self.assistant_id.as_deref(),
            self.phone_number_id.as_deref(),
        )
    }

    /// Seconds a campaign with `lead_count` leads is expected to consume
    pub fn estimated_seconds_for(&self, lead_count: usize) -> Decimal {
        self.estimated_seconds_per_call * Decimal::from(lead_count as u64)
    }

    /// Whether the balance covers the estimate for `lead_count` calls
    pub fn can_afford(&self, lead_count: usize) -> bool {
        self.balance_seconds >= self.estimated_seconds_for(lead_count)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            balance_seconds: Decimal::ZERO,
            api_key: None,
            assistant_id: None,
            phone_number_id: None,
            estimated_seconds_per_call: Decimal::ZERO,
            status: ClientStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Data for provisioning a client
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub estimated_seconds_per_call: Decimal,
}

/// Partial update of a client's calling configuration
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub phone_number_id: Option<String>,
    pub estimated_seconds_per_call: Option<Decimal>,
}
