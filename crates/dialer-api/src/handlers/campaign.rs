//! Campaign handlers

use super::validate;
use crate::dto::campaign::CreateCampaignRequest;
use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::{info, instrument};

/// Create a Draft campaign from a lead list
///
/// POST /api/v1/campaigns
#[instrument(skip(state, req))]
pub async fn create_campaign(
    state: web::Data<AppState>,
    req: web::Json<CreateCampaignRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    let campaign = state.campaigns.create_campaign(&req.to_request()).await?;
    info!(id = campaign.id, leads = campaign.total_leads, "Campaign created");

    Ok(HttpResponse::Created().json(ApiResponse::success(campaign)))
}

/// GET /api/v1/campaigns/{id}
#[instrument(skip(state))]
pub async fn get_campaign(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let campaign = state.campaigns.get_campaign(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(campaign)))
}

/// GET /api/v1/campaigns/{id}/calls
#[instrument(skip(state))]
pub async fn list_campaign_calls(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let calls = state.campaigns.list_calls(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(calls)))
}

/// Dispatch every pending call of a Draft campaign
///
/// POST /api/v1/campaigns/{id}/run
#[instrument(skip(state))]
pub async fn run_campaign(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let report = state.orchestrator.run_campaign(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns")
            .route("", web::post().to(create_campaign))
            .route("/{id}", web::get().to(get_campaign))
            .route("/{id}/calls", web::get().to(list_campaign_calls))
            .route("/{id}/run", web::post().to(run_campaign)),
    );
}
