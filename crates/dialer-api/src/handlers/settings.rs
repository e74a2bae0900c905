//! Billing settings handlers

use super::validate;
use crate::dto::settings::{MultiplierQuery, RateMultiplierRequest, RateMultiplierResponse};
use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::{info, instrument};

/// Effective multiplier, read from storage
///
/// GET /api/v1/settings/rate-multiplier
#[instrument(skip(state))]
pub async fn get_rate_multiplier(
    state: web::Data<AppState>,
    query: web::Query<MultiplierQuery>,
) -> Result<HttpResponse, AppError> {
    let multiplier = state.rate_policy.resolve(query.client_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(RateMultiplierResponse {
        multiplier,
        client_id: query.client_id,
    })))
}

/// PUT /api/v1/settings/rate-multiplier
#[instrument(skip(state, req))]
pub async fn update_rate_multiplier(
    state: web::Data<AppState>,
    req: web::Json<RateMultiplierRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    if let Some(client_id) = req.client_id {
        if state.clients.find_by_id(client_id).await?.is_none() {
            return Err(AppError::ClientNotFound(client_id.to_string()));
        }
    }

    let multiplier = state
        .rate_policy
        .set_multiplier(req.client_id, req.multiplier)
        .await?;
    info!(%multiplier, client_id = ?req.client_id, "Rate multiplier updated");

    Ok(HttpResponse::Ok().json(ApiResponse::success(RateMultiplierResponse {
        multiplier,
        client_id: req.client_id,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/settings")
            .route("/rate-multiplier", web::get().to(get_rate_multiplier))
            .route("/rate-multiplier", web::put().to(update_rate_multiplier)),
    );
}
