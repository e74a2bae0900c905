//! Client handlers
//!
//! Provisioning, calling configuration and per-client ledger endpoints.

use super::validate;
use crate::dto::client::{
    BalanceResponse, ClientResponse, CreateClientRequest, CreditRequest, SyncCallsRequest,
    UpdateProviderRequest,
};
use crate::dto::{ApiResponse, PaginationParams};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::models::{ClientStatus, ProviderSettings};
use dialer_core::traits::{PaginatedResponse, PaginationMeta};
use dialer_core::AppError;
use tracing::{debug, info, instrument};

/// Reason recorded for the opening balance credit
const OPENING_BALANCE_REASON: &str = "Opening balance";

/// Provision a client
///
/// POST /api/v1/clients
#[instrument(skip(state, req))]
pub async fn create_client(
    state: web::Data<AppState>,
    req: web::Json<CreateClientRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    if req.initial_balance_seconds.is_some_and(|s| s.is_sign_negative()) {
        return Err(AppError::Validation(
            "initial_balance_seconds cannot be negative".to_string(),
        ));
    }

    let client = state.clients.create(&req.to_new_client()).await?;
    info!(id = client.id, name = %client.name, "Client created");

    if let Some(seconds) = req.initial_balance_seconds.filter(|s| !s.is_zero()) {
        state
            .ledger
            .credit(client.id, seconds, Some(OPENING_BALANCE_REASON), None)
            .await?;
    }

    let client = state
        .clients
        .find_by_id(client.id)
        .await?
        .ok_or_else(|| AppError::ClientNotFound(client.id.to_string()))?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        ClientResponse::from(client),
        "Client created successfully",
    )))
}

/// Newest first
///
/// GET /api/v1/clients
#[instrument(skip(state))]
pub async fn list_clients(
    state: web::Data<AppState>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    validate(&*query)?;

    let pagination = query.to_pagination();
    let (clients, total) = state
        .clients
        .list(pagination.limit(), pagination.offset())
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: clients.into_iter().map(ClientResponse::from).collect::<Vec<_>>(),
        pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
    }))
}

/// GET /api/v1/clients/{id}
#[instrument(skip(state))]
pub async fn get_client(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let client = state
        .clients
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::ClientNotFound(id.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(ClientResponse::from(client))))
}

/// Set calling credentials and the per-call estimate
///
/// PUT /api/v1/clients/{id}/provider
#[instrument(skip(state, req))]
pub async fn update_provider(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<UpdateProviderRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    if let Some(estimate) = req.estimated_seconds_per_call {
        if estimate.is_sign_negative() {
            return Err(AppError::Validation(
                "estimated_seconds_per_call cannot be negative".to_string(),
            ));
        }
    }

    let id = path.into_inner();
    let settings: ProviderSettings = req.into_inner().into();
    let client = state.clients.update_provider(id, &settings).await?;

    info!(id, "Client calling configuration updated");
    Ok(HttpResponse::Ok().json(ApiResponse::success(ClientResponse::from(client))))
}

/// POST /api/v1/clients/{id}/deactivate
#[instrument(skip(state))]
pub async fn deactivate_client(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let client = state.clients.set_status(id, ClientStatus::Inactive).await?;

    info!(id, "Client deactivated");
    Ok(HttpResponse::Ok().json(ApiResponse::success(ClientResponse::from(client))))
}

/// Admin top-up
///
/// POST /api/v1/clients/{id}/credit
#[instrument(skip(state, req))]
pub async fn credit_client(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<CreditRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    let id = path.into_inner();
    debug!(id, seconds = %req.seconds, "Processing credit");

    let transaction = state
        .ledger
        .credit(id, req.seconds, req.reason.as_deref(), req.reference.as_deref())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(transaction)))
}

/// GET /api/v1/clients/{id}/balance
#[instrument(skip(state))]
pub async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let client_id = path.into_inner();
    let balance_seconds = state.ledger.balance(client_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse {
        client_id,
        balance_seconds,
    })))
}

/// GET /api/v1/clients/{id}/transactions
#[instrument(skip(state))]
pub async fn list_transactions(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    validate(&*query)?;

    let page = state
        .ledger
        .transactions(path.into_inner(), &query.to_pagination())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Compare the cached balance with the ledger
///
/// GET /api/v1/clients/{id}/audit
#[instrument(skip(state))]
pub async fn audit_client(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let audit = state.ledger.audit(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(audit)))
}

/// GET /api/v1/clients/{id}/campaigns
#[instrument(skip(state))]
pub async fn list_client_campaigns(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let campaigns = state.campaigns.list_for_client(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(campaigns)))
}

/// GET /api/v1/clients/{id}/campaign-stats
#[instrument(skip(state))]
pub async fn campaign_stats(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let stats = state.campaigns.stats(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Pull the client's calls from the provider and reconcile them
///
/// POST /api/v1/clients/{id}/sync
#[instrument(skip(state))]
pub async fn sync_calls(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let report = state.sync.sync_client(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

/// Reconcile provider call objects supplied by the caller
///
/// POST /api/v1/clients/{id}/sync/records
#[instrument(skip(state, req))]
pub async fn sync_call_records(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<SyncCallsRequest>,
) -> Result<HttpResponse, AppError> {
    validate(&*req)?;

    let report = state.sync.apply(path.into_inner(), &req.calls).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/clients")
            .route("", web::post().to(create_client))
            .route("", web::get().to(list_clients))
            .route("/{id}", web::get().to(get_client))
            .route("/{id}/provider", web::put().to(update_provider))
            .route("/{id}/deactivate", web::post().to(deactivate_client))
            .route("/{id}/credit", web::post().to(credit_client))
            .route("/{id}/balance", web::get().to(get_balance))
            .route("/{id}/transactions", web::get().to(list_transactions))
            .route("/{id}/audit", web::get().to(audit_client))
            .route("/{id}/campaigns", web::get().to(list_client_campaigns))
            .route("/{id}/campaign-stats", web::get().to(campaign_stats))
            .route("/{id}/sync", web::post().to(sync_calls))
            .route("/{id}/sync/records", web::post().to(sync_call_records)),
    );
}
