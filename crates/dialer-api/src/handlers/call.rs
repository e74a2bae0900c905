//! Call handlers

use super::validate;
use crate::dto::call::DispatchCallRequest;
use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::instrument;

/// Place a single call
///
/// POST /api/v1/calls
#[instrument(skip(state, req))]
pub async fn dispatch_call(
    state: web::Data<AppState>,
    req: web::Json<DispatchCallRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    let call = state
        .dispatcher
        .dispatch_new(req.client_id, &req.phone_number, req.lead_id)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(call)))
}

/// GET /api/v1/calls/{id}
#[instrument(skip(state))]
pub async fn get_call(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let call = state
        .calls
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::post().to(dispatch_call))
            .route("/{id}", web::get().to(get_call)),
    );
}
