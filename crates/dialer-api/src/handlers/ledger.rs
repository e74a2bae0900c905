//! Ledger-wide handlers

use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::instrument;

/// Transactions left unprocessed past the grace period
///
/// GET /api/v1/ledger/inconsistencies
#[instrument(skip(state))]
pub async fn list_inconsistencies(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let dangling = state.auditor.dangling().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(dangling)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ledger").route("/inconsistencies", web::get().to(list_inconsistencies)),
    );
}
