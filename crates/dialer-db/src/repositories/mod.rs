//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in dialer-core, using sqlx for PostgreSQL access.

pub mod call_repo;
pub mod campaign_repo;
pub mod client_repo;
pub mod event_log_repo;
pub mod lead_repo;
pub mod ledger_repo;
pub mod settings_repo;

pub use call_repo::PgCallRepository;
pub use campaign_repo::PgCampaignRepository;
pub use client_repo::PgClientRepository;
pub use event_log_repo::PgEventLogRepository;
pub use lead_repo::PgLeadRepository;
pub use ledger_repo::PgLedgerRepository;
pub use settings_repo::PgSettingsRepository;

use std::fmt;
use tracing::warn;

/// Decode a stored enum column, logging values that match no variant
pub(crate) fn decode_column<T: fmt::Debug>(
    column: &str,
    raw: &str,
    parsed: Option<T>,
    fallback: T,
) -> T {
    match parsed {
        Some(value) => value,
        None => {
            warn!(
                "Unrecognized {} {:?} in storage, reading it as {:?}",
                column, raw, fallback
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::{CallStatus, TransactionType};

    #[test]
    fn test_decode_known_value() {
        let status = decode_column(
            "calls.status",
            "Completed",
            CallStatus::from_str("Completed"),
            CallStatus::NotInitiated,
        );
        assert_eq!(status, CallStatus::Completed);
    }

    #[test]
    fn test_decode_unknown_value_falls_back() {
        let status = decode_column(
            "calls.status",
            "Voicemail",
            CallStatus::from_str("Voicemail"),
            CallStatus::NotInitiated,
        );
        assert_eq!(status, CallStatus::NotInitiated);

        let kind = decode_column(
            "transactions.transaction_type",
            "REFUND",
            TransactionType::from_str("REFUND"),
            TransactionType::Credit,
        );
        assert_eq!(kind, TransactionType::Credit);
    }
}
