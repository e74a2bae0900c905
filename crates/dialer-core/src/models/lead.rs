//! Lead model
//!
//! A lead is a phone number owned by a client. Leads are unique per
//! (client, phone number) and mirror the status of their latest call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::call::CallStatus;

/// Lead entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub client_id: i64,
    pub name: Option<String>,

    /// Normalized destination number
    pub phone_number: String,

    /// Campaign the lead was last enrolled in
    pub campaign_id: Option<i64>,

    /// Mirror of the latest call's status
    pub status: CallStatus,

    /// Free-text outcome of the last dispatch attempt
    pub response: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Lead {
    fn default() -> Self {
        Self {
            id: 0,
            client_id: 0,
            name: None,
            phone_number: String::new(),
            campaign_id: None,
            status: CallStatus::NotInitiated,
            response: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Normalize a phone number to `+` followed by digits
///
/// Returns `None` when the input has no digits at all.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("+{}", digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("15551234567"), Some("+15551234567".into()));
        assert_eq!(normalize_phone("+1 (555) 123-4567"), Some("+15551234567".into()));
        assert_eq!(normalize_phone("  +44 20 7946 0958 "), Some("+442079460958".into()));
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("n/a"), None);
    }

    #[test]
    fn test_default_lead_status() {
        let lead = Lead::default();
        assert_eq!(lead.status, CallStatus::NotInitiated);
        assert!(lead.response.is_none());
    }
}
