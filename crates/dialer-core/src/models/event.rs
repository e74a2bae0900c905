//! Provider webhook events
//!
//! Parses the JSON bodies the calling provider posts to the webhook
//! endpoint. Bodies arrive either flat or wrapped in a `message` envelope.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::fmt;

use crate::error::AppError;

/// Suffix appended to an event name when its processing fails
pub const ERROR_EVENT_SUFFIX: &str = "_error";

/// Provider call status after which a call record carries its final fields
pub const ENDED_CALL_STATUS: &str = "ended";

/// Webhook event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    StatusUpdate,
    EndOfCallReport,
    /// Acknowledged and logged, never applied
    Other(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::StatusUpdate => write!(f, "status-update"),
            EventType::EndOfCallReport => write!(f, "end-of-call-report"),
            EventType::Other(name) => write!(f, "{}", name),
        }
    }
}

impl EventType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "status-update" => EventType::StatusUpdate,
            "end-of-call-report" => EventType::EndOfCallReport,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Name of the raw-log entry written when processing this event fails
    pub fn error_event(&self) -> String {
        format!("{}{}", self, ERROR_EVENT_SUFFIX)
    }
}

/// A parsed provider event
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub event_type: EventType,
    pub provider_call_id: String,

    /// Provider status string carried by status updates
    pub status: Option<String>,

    pub assistant_id: Option<String>,
    pub customer_number: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub ended_reason: Option<String>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub stereo_recording_url: Option<String>,
    pub summary: Option<String>,
    pub analysis: Option<Value>,
    pub cost_breakdown: Option<Value>,

    /// The body exactly as received
    pub raw: Value,
}

impl ProviderEvent {
    /// Parse a webhook body
    ///
    /// Fails with `MalformedEvent` when the body is not an object or lacks an
    /// event type or provider call id.
    pub fn parse(body: &Value) -> Result<Self, AppError> {
        let msg = body.get("message").filter(|m| m.is_object()).unwrap_or(body);

        if !msg.is_object() {
            return Err(AppError::MalformedEvent(
                "event body is not a JSON object".to_string(),
            ));
        }

        let event_type = str_at(msg, &["type"])
            .or_else(|| str_at(msg, &["eventType"]))
            .map(|t| EventType::from_str(&t))
            .ok_or_else(|| AppError::MalformedEvent("missing event type".to_string()))?;

        let provider_call_id = str_at(msg, &["call", "id"])
            .or_else(|| str_at(msg, &["providerCallId"]))
            .ok_or_else(|| AppError::MalformedEvent("missing provider call id".to_string()))?;

        let payload = msg.get("payload").filter(|p| p.is_object()).unwrap_or(msg);

        let duration_seconds = decimal_at(payload, &["durationSeconds"])
            .or_else(|| decimal_at(payload, &["duration"]))
            .or_else(|| decimal_at(payload, &["durationMs"]).map(|ms| ms / Decimal::ONE_THOUSAND))
            .filter(|d| *d >= Decimal::ZERO);

        Ok(Self {
            event_type,
            provider_call_id,
            status: str_at(payload, &["status"]).or_else(|| str_at(msg, &["call", "status"])),
            assistant_id: str_at(msg, &["call", "assistantId"])
                .or_else(|| str_at(payload, &["assistantId"]))
                .or_else(|| str_at(msg, &["assistant", "id"])),
            customer_number: str_at(payload, &["customer", "number"])
                .or_else(|| str_at(msg, &["call", "customer", "number"])),
            started_at: time_at(payload, &["startedAt"]),
            ended_at: time_at(payload, &["endedAt"]),
            duration_seconds,
            cost: decimal_at(payload, &["cost"]),
            ended_reason: str_at(payload, &["endedReason"]),
            transcript: str_at(payload, &["transcript"])
                .or_else(|| str_at(payload, &["artifact", "transcript"])),
            recording_url: str_at(payload, &["recordingUrl"])
                .or_else(|| str_at(payload, &["artifact", "recordingUrl"])),
            stereo_recording_url: str_at(payload, &["stereoRecordingUrl"])
                .or_else(|| str_at(payload, &["artifact", "stereoRecordingUrl"])),
            summary: str_at(payload, &["analysis", "summary"])
                .or_else(|| str_at(payload, &["summary"])),
            analysis: payload.get("analysis").filter(|v| !v.is_null()).cloned(),
            cost_breakdown: payload.get("costBreakdown").filter(|v| !v.is_null()).cloned(),
            raw: body.clone(),
        })
    }

    /// Rewrite a call object from the provider's call listing as a webhook body
    ///
    /// Ended calls become an end-of-call report, anything else a status
    /// update carrying the call's status. The record's own fields stay at the
    /// top level so `parse` reads them as the payload.
    pub fn call_record_body(record: &Value) -> Result<Value, AppError> {
        let Some(fields) = record.as_object() else {
            return Err(AppError::MalformedEvent(
                "call record is not a JSON object".to_string(),
            ));
        };

        let id = str_at(record, &["id"])
            .ok_or_else(|| AppError::MalformedEvent("call record has no id".to_string()))?;
        let status = str_at(record, &["status"]);

        let event_type = match status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case(ENDED_CALL_STATUS) => EventType::EndOfCallReport,
            _ => EventType::StatusUpdate,
        };

        let mut body = fields.clone();
        body.insert("type".to_string(), json!(event_type.to_string()));
        body.insert(
            "call".to_string(),
            json!({
                "id": id,
                "assistantId": record.get("assistantId").cloned().unwrap_or(Value::Null),
                "status": status,
            }),
        );
        Ok(Value::Object(body))
    }

    /// Best-effort extraction of the provider call id for logging unparseable bodies
    pub fn peek_call_id(body: &Value) -> Option<String> {
        let msg = body.get("message").unwrap_or(body);
        str_at(msg, &["call", "id"]).or_else(|| str_at(msg, &["providerCallId"]))
    }

    /// Raw talk time
    ///
    /// Uses the reported duration when present, else the timestamp delta
    /// rounded up to whole seconds, else zero.
    pub fn raw_duration(&self) -> Decimal {
        if let Some(d) = self.duration_seconds {
            return d;
        }

        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end >= start => {
                let ms = (end - start).num_milliseconds();
                Decimal::from((ms + 999) / 1000)
            }
            _ => Decimal::ZERO,
        }
    }
}

fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    value_at(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn decimal_at(value: &Value, path: &[&str]) -> Option<Decimal> {
    match value_at(value, path)? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

fn time_at(value: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    str_at(value, path)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_flat_report() {
        let body = json!({
            "type": "end-of-call-report",
            "call": {"id": "call-1", "status": "ended", "assistantId": "asst-1"},
            "durationSeconds": 100,
            "cost": 0.25,
            "transcript": "hello",
            "analysis": {"summary": "short call", "successEvaluation": "true"},
            "customer": {"number": "+15550001111"}
        });

        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.event_type, EventType::EndOfCallReport);
        assert_eq!(event.provider_call_id, "call-1");
        assert_eq!(event.assistant_id.as_deref(), Some("asst-1"));
        assert_eq!(event.raw_duration(), dec!(100));
        assert_eq!(event.cost, Some(dec!(0.25)));
        assert_eq!(event.summary.as_deref(), Some("short call"));
        assert_eq!(event.customer_number.as_deref(), Some("+15550001111"));
    }

    #[test]
    fn test_parse_enveloped_report() {
        let body = json!({
            "message": {
                "type": "end-of-call-report",
                "call": {"id": "call-2", "assistantId": "asst-9"},
                "startedAt": "2024-05-01T10:00:00.000Z",
                "endedAt": "2024-05-01T10:01:40.200Z",
                "artifact": {
                    "recordingUrl": "https://rec/1.wav",
                    "stereoRecordingUrl": "https://rec/1-stereo.wav",
                    "transcript": "hi there"
                }
            }
        });

        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.provider_call_id, "call-2");
        assert_eq!(event.recording_url.as_deref(), Some("https://rec/1.wav"));
        assert_eq!(
            event.stereo_recording_url.as_deref(),
            Some("https://rec/1-stereo.wav")
        );
        assert_eq!(event.transcript.as_deref(), Some("hi there"));
        // 100.2s rounds up
        assert_eq!(event.raw_duration(), dec!(101));
        assert_eq!(event.raw, body);
    }

    #[test]
    fn test_parse_status_update() {
        let body = json!({
            "message": {
                "type": "status-update",
                "status": "in-progress",
                "call": {"id": "call-3", "status": "queued"}
            }
        });

        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.event_type, EventType::StatusUpdate);
        assert_eq!(event.status.as_deref(), Some("in-progress"));
    }

    #[test]
    fn test_parse_spec_shape() {
        let body = json!({
            "providerCallId": "call-4",
            "eventType": "end-of-call-report",
            "payload": {"duration": "42.5"}
        });

        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.provider_call_id, "call-4");
        assert_eq!(event.raw_duration(), dec!(42.5));
    }

    #[test]
    fn test_missing_call_id_is_malformed() {
        let body = json!({"type": "status-update", "status": "ended"});
        assert!(matches!(
            ProviderEvent::parse(&body),
            Err(AppError::MalformedEvent(_))
        ));

        assert!(matches!(
            ProviderEvent::parse(&json!("not an object")),
            Err(AppError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let body = json!({"call": {"id": "call-5"}});
        assert!(ProviderEvent::parse(&body).is_err());
        assert_eq!(ProviderEvent::peek_call_id(&body).as_deref(), Some("call-5"));
    }

    #[test]
    fn test_other_event_types() {
        let body = json!({"type": "transcript", "call": {"id": "call-6"}});
        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.event_type, EventType::Other("transcript".to_string()));
        assert_eq!(event.event_type.error_event(), "transcript_error");
    }

    #[test]
    fn test_duration_without_timestamps_is_zero() {
        let body = json!({"type": "end-of-call-report", "call": {"id": "c"}});
        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.raw_duration(), Decimal::ZERO);
    }

    #[test]
    fn test_ended_call_record_reads_as_report() {
        let record = json!({
            "id": "call-7",
            "type": "outboundPhoneCall",
            "assistantId": "asst-1",
            "status": "ended",
            "startedAt": "2024-05-01T10:00:00Z",
            "endedAt": "2024-05-01T10:01:00Z",
            "cost": 0.3,
            "summary": "left a message",
            "endedReason": "customer-ended-call",
            "customer": {"number": "+15550001111"}
        });

        let body = ProviderEvent::call_record_body(&record).unwrap();
        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.event_type, EventType::EndOfCallReport);
        assert_eq!(event.provider_call_id, "call-7");
        assert_eq!(event.assistant_id.as_deref(), Some("asst-1"));
        assert_eq!(event.raw_duration(), dec!(60));
        assert_eq!(event.cost, Some(dec!(0.3)));
        assert_eq!(event.summary.as_deref(), Some("left a message"));
        assert_eq!(event.ended_reason.as_deref(), Some("customer-ended-call"));
        assert_eq!(event.customer_number.as_deref(), Some("+15550001111"));
    }

    #[test]
    fn test_live_call_record_reads_as_status_update() {
        let record = json!({"id": "call-8", "status": "in-progress"});

        let event = ProviderEvent::parse(&ProviderEvent::call_record_body(&record).unwrap()).unwrap();
        assert_eq!(event.event_type, EventType::StatusUpdate);
        assert_eq!(event.status.as_deref(), Some("in-progress"));
    }

    #[test]
    fn test_call_record_without_id_is_malformed() {
        assert!(matches!(
            ProviderEvent::call_record_body(&json!({"status": "ended"})),
            Err(AppError::MalformedEvent(_))
        ));
        assert!(ProviderEvent::call_record_body(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_negative_duration_falls_back_to_timestamps() {
        let body = json!({
            "type": "end-of-call-report",
            "call": {"id": "c"},
            "durationSeconds": -5,
            "startedAt": "2024-05-01T10:00:00Z",
            "endedAt": "2024-05-01T10:00:30Z"
        });
        let event = ProviderEvent::parse(&body).unwrap();
        assert_eq!(event.raw_duration(), dec!(30));
    }
}
