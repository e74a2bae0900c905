//! Provider webhook handlers
//!
//! The provider retries deliveries that do not receive a 2xx, so storage
//! failures surface as 500 while malformed and unattributable events are
//! answered with 400 and 404.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use serde_json::{json, Value};
use tracing::{debug, instrument};

/// Receive one provider event
///
/// POST /api/v1/webhooks/provider
#[instrument(skip(state, body))]
pub async fn receive_event(
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    let outcome = state.engine.handle(&body).await?;
    debug!(?outcome, "Provider event applied");

    Ok(HttpResponse::Ok().json(json!({
        "received": true,
        "result": outcome,
    })))
}

/// Re-apply the logged events of one provider call
///
/// POST /api/v1/webhooks/provider/replay/{provider_call_id}
#[instrument(skip(state))]
pub async fn replay_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let provider_call_id = path.into_inner();
    let report = state.engine.replay(&provider_call_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks/provider")
            .route("", web::post().to(receive_event))
            .route("/replay/{provider_call_id}", web::post().to(replay_events)),
    );
}
