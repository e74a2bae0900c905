//! HTTP request handlers

pub mod call;
pub mod campaign;
pub mod client;
pub mod health;
pub mod ledger;
pub mod settings;
pub mod webhook;

use actix_web::{error::InternalError, web, HttpResponse};
use dialer_core::AppError;
use tracing::warn;

pub use call::configure as configure_calls;
pub use campaign::configure as configure_campaigns;
pub use client::configure as configure_clients;
pub use health::health_check;
pub use ledger::configure as configure_ledger;
pub use settings::configure as configure_settings;
pub use webhook::configure as configure_webhooks;

/// Webhook bodies can carry full transcripts
pub const MAX_JSON_PAYLOAD: usize = 2 * 1024 * 1024;

/// Mount every route under `/api/v1`
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_webhooks)
            .configure(configure_clients)
            .configure(configure_campaigns)
            .configure(configure_calls)
            .configure(configure_ledger)
            .configure(configure_settings),
    );
}

/// JSON extractor config answering bad bodies in the API error format
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_PAYLOAD)
        .error_handler(|err, _req| {
            let message = err.to_string();
            warn!("Rejected request body: {}", message);
            InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_body",
                    "message": message,
                    "status": 400
                })),
            )
            .into()
        })
}

/// Query extractor config answering bad query strings in the API error format
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_query",
                "message": message,
                "status": 400
            })),
        )
        .into()
    })
}

/// Run `validator` checks, mapping failures to `AppError::Validation`
pub(crate) fn validate<T: validator::Validate>(req: &T) -> Result<(), AppError> {
    req.validate().map_err(|e| {
        warn!("Request validation failed: {}", e);
        AppError::from(e)
    })
}
