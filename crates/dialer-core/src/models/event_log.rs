//! Raw event log
//!
//! Append-only record of every inbound provider event and every processing
//! failure. Events can be replayed from here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::ERROR_EVENT_SUFFIX;

/// A logged event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    pub id: i64,
    /// Event type, or `<type>_error` for failure entries
    pub event: String,
    pub provider_call_id: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventLog {
    /// Whether this entry records a processing failure rather than an inbound event
    pub fn is_error_entry(&self) -> bool {
        self.event.ends_with(ERROR_EVENT_SUFFIX)
    }
}

/// Data for appending to the log
#[derive(Debug, Clone)]
pub struct NewEventLog {
    pub event: String,
    pub provider_call_id: Option<String>,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_entry() {
        let entry = EventLog {
            id: 1,
            event: "end-of-call-report_error".to_string(),
            provider_call_id: Some("c1".to_string()),
            payload: json!({"error": "boom"}),
            created_at: Utc::now(),
        };
        assert!(entry.is_error_entry());

        let inbound = EventLog {
            event: "end-of-call-report".to_string(),
            ..entry
        };
        assert!(!inbound.is_error_entry());
    }
}
