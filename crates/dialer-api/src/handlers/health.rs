//! Liveness endpoint

use actix_web::HttpResponse;

/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "dialer",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
