//! Unified error handling for the dialer
//!
//! This module provides a single error type covering storage, provider,
//! ledger and campaign failures, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Webhook Errors ====================
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    // ==================== Dispatch Errors ====================
    #[error("Provider configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    // ==================== Business Logic Errors ====================
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("Client inactive: {0}")]
    ClientInactive(String),

    #[error("Insufficient balance: required {required}s, available {available}s")]
    InsufficientBalance { required: String, available: String },

    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("Invalid campaign state: {0}")]
    InvalidCampaignState(String),

    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MalformedEvent(_)
            | AppError::ConfigurationMissing(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::ClientInactive(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::ClientNotFound(_)
            | AppError::CallNotFound(_)
            | AppError::CampaignNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_) | AppError::InvalidCampaignState(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::DispatchFailed(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::MalformedEvent(_) => "malformed_event",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::ConfigurationMissing(_) => "configuration_missing",
            AppError::DispatchFailed(_) => "dispatch_failed",
            AppError::ClientNotFound(_) => "client_not_found",
            AppError::ClientInactive(_) => "client_inactive",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::CampaignNotFound(_) => "campaign_not_found",
            AppError::InvalidCampaignState(_) => "invalid_campaign_state",
            AppError::LedgerInconsistency(_) => "ledger_inconsistency",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the failure came from storage and a redelivery may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::Cache(_)
                | AppError::CacheConnection(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::MalformedEvent("missing call id".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ClientNotFound("7".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InsufficientBalance {
                required: "600".to_string(),
                available: "120".to_string()
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::InvalidCampaignState("Running".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database("down".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::ConfigurationMissing("api key".to_string()).error_code(),
            "configuration_missing"
        );
        assert_eq!(
            AppError::LedgerInconsistency("tx 4".to_string()).error_code(),
            "ledger_inconsistency"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(AppError::Database("timeout".to_string()).is_transient());
        assert!(!AppError::MalformedEvent("no id".to_string()).is_transient());
        assert!(!AppError::ClientNotFound("x".to_string()).is_transient());
    }
}
