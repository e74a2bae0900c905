//! Ledger transaction model
//!
//! Every change to a client's balance is recorded as an immutable
//! transaction. The only field that may change after insert is `processed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Balance top-up, positive seconds
    Credit,
    /// Usage charge, negative seconds
    Debit,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Credit => write!(f, "CREDIT"),
            TransactionType::Debit => write!(f, "DEBIT"),
        }
    }
}

impl TransactionType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREDIT" => Some(TransactionType::Credit),
            "DEBIT" => Some(TransactionType::Debit),
            _ => None,
        }
    }

    /// Signed amount for a positive magnitude
    pub fn signed(&self, seconds: Decimal) -> Decimal {
        match self {
            TransactionType::Credit => seconds,
            TransactionType::Debit => -seconds,
        }
    }
}

/// Ledger transaction entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub client_id: i64,

    /// Signed amount: positive for credits, negative for debits
    pub seconds: Decimal,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    pub reason: String,

    /// Call id for usage debits, free text for admin actions
    pub reference: Option<String>,

    /// Set once the balance mutation tied to this row has been applied
    pub processed: bool,

    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Reject zero and negative magnitudes for plain credits and debits
    pub fn validate_amount(seconds: Decimal) -> Result<(), AppError> {
        if seconds <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Transaction amount must be positive, got {}",
                seconds
            )));
        }
        Ok(())
    }

    /// Whether this row has been left unprocessed past `cutoff`
    pub fn is_dangling(&self, cutoff: DateTime<Utc>) -> bool {
        !self.processed && self.created_at < cutoff
    }
}

/// Debit request for a completed call
#[derive(Debug, Clone)]
pub struct CallSettlement {
    pub call_id: i64,
    pub client_id: i64,
    /// Billable seconds, non-negative
    pub seconds: Decimal,
    pub reason: String,
}

/// Result of an idempotent call settlement
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// A new debit was written and the call flagged as billed
    Debited(Transaction),
    /// The call had already been billed; nothing changed
    AlreadySettled,
}

impl SettlementOutcome {
    pub fn is_debited(&self) -> bool {
        matches!(self, SettlementOutcome::Debited(_))
    }
}

/// Comparison of a client's cached balance against its ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAudit {
    pub client_id: i64,
    pub balance_seconds: Decimal,
    pub transaction_sum: Decimal,
    pub difference: Decimal,
    pub consistent: bool,
}

impl LedgerAudit {
    pub fn new(client_id: i64, balance_seconds: Decimal, transaction_sum: Decimal) -> Self {
        let difference = balance_seconds - transaction_sum;
        Self {
            client_id,
            balance_seconds,
            transaction_sum,
            difference,
            consistent: difference.is_zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_amount() {
        assert_eq!(TransactionType::Credit.signed(dec!(60)), dec!(60));
        assert_eq!(TransactionType::Debit.signed(dec!(60)), dec!(-60));
    }

    #[test]
    fn test_validate_amount() {
        assert!(Transaction::validate_amount(dec!(0.5)).is_ok());
        assert!(matches!(
            Transaction::validate_amount(Decimal::ZERO),
            Err(AppError::Validation(_))
        ));
        assert!(Transaction::validate_amount(dec!(-10)).is_err());
    }

    #[test]
    fn test_dangling() {
        let now = Utc::now();
        let tx = Transaction {
            id: 1,
            client_id: 1,
            seconds: dec!(-200),
            transaction_type: TransactionType::Debit,
            reason: "call".to_string(),
            reference: Some("7".to_string()),
            processed: false,
            created_at: now - Duration::minutes(10),
        };

        assert!(tx.is_dangling(now - Duration::minutes(5)));
        assert!(!tx.is_dangling(now - Duration::minutes(15)));

        let processed = Transaction {
            processed: true,
            ..tx
        };
        assert!(!processed.is_dangling(now));
    }

    #[test]
    fn test_audit() {
        let ok = LedgerAudit::new(1, dec!(400), dec!(400));
        assert!(ok.consistent);

        let drift = LedgerAudit::new(1, dec!(400), dec!(600));
        assert!(!drift.consistent);
        assert_eq!(drift.difference, dec!(-200));
    }

    #[test]
    fn test_type_serialization() {
        let json = serde_json::to_string(&TransactionType::Debit).unwrap();
        assert_eq!(json, "\"DEBIT\"");
        assert_eq!(
            TransactionType::from_str("credit"),
            Some(TransactionType::Credit)
        );
    }
}
