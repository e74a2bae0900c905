//! Provider REST client

use crate::types::{CreateCallRequest, CreateCallResponse};
use async_trait::async_trait;
use dialer_core::error::AppError;
use dialer_core::models::{CallListQuery, OutboundCallRequest, ProviderCall};
use dialer_core::traits::CallProvider;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::DispatchFailed(err.to_string())
    }
}

/// HTTP client for the calling provider
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    call_name: String,
    timeout_ms: u64,
}

impl ProviderClient {
    pub fn new(base_url: &str, timeout_ms: u64, call_name: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        info!(
            "Provider client initialized for {} (timeout {}ms)",
            base_url, timeout_ms
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            call_name: call_name.to_string(),
            timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Place one outbound call
    #[instrument(skip(self, request), fields(destination = %request.destination_number))]
    pub async fn create(&self, request: &OutboundCallRequest) -> Result<ProviderCall, ProviderError> {
        let url = format!("{}/call", self.base_url);
        let body = CreateCallRequest::from_request(&self.call_name, request);

        debug!("POST {} for assistant {}", url, body.assistant_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Provider rejected call: HTTP {} {}", status.as_u16(), body);
            return Err(ProviderError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CreateCallResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_ms)
            } else {
                error!("Failed to parse provider response: {}", e);
                ProviderError::Parse(e.to_string())
            }
        })?;

        info!("Provider accepted call {}", parsed.id);
        Ok(parsed.into())
    }

    /// Read back the account's calls
    #[instrument(skip(self, query), fields(assistant = ?query.assistant_id))]
    pub async fn list(&self, query: &CallListQuery) -> Result<Vec<Value>, ProviderError> {
        let url = format!("{}/call", self.base_url);

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(assistant_id) = &query.assistant_id {
            params.push(("assistantId", assistant_id.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        debug!("GET {} with {} filters", url, params.len());

        let response = self
            .client
            .get(&url)
            .bearer_auth(&query.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Provider refused call listing: HTTP {} {}", status.as_u16(), body);
            return Err(ProviderError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let calls: Vec<Value> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_ms)
            } else {
                error!("Failed to parse call listing: {}", e);
                ProviderError::Parse(e.to_string())
            }
        })?;

        info!("Provider listed {} calls", calls.len());
        Ok(calls)
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            warn!("Provider request timed out after {}ms", self.timeout_ms);
            ProviderError::Timeout(self.timeout_ms)
        } else {
            error!("Provider connection error: {}", e);
            ProviderError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl CallProvider for ProviderClient {
    async fn create_call(&self, request: &OutboundCallRequest) -> Result<ProviderCall, AppError> {
        Ok(self.create(request).await?)
    }

    async fn list_calls(&self, query: &CallListQuery) -> Result<Vec<Value>, AppError> {
        Ok(self.list(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use dialer_core::models::ProviderCredentials;
    use serde_json::json;
    use std::collections::HashMap;

    fn request() -> OutboundCallRequest {
        OutboundCallRequest {
            destination_number: "+15550001111".to_string(),
            credentials: ProviderCredentials {
                api_key: "test-key".to_string(),
                assistant_id: "asst-1".to_string(),
                phone_number_id: "pn-1".to_string(),
            },
        }
    }

    async fn accept(req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer test-key" {
            return HttpResponse::Unauthorized().body("bad key");
        }
        if body["customer"]["number"] != "+15550001111" {
            return HttpResponse::BadRequest().body("bad customer");
        }
        HttpResponse::Created().json(json!({
            "id": "call-abc",
            "status": "queued",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
    }

    async fn reject() -> HttpResponse {
        HttpResponse::BadRequest().body("phoneNumberId is invalid")
    }

    async fn stall() -> HttpResponse {
        actix_rt::time::sleep(Duration::from_millis(500)).await;
        HttpResponse::Ok().json(json!({"id": "late"}))
    }

    async fn garbage() -> HttpResponse {
        HttpResponse::Ok().body("not json")
    }

    async fn listing(req: HttpRequest, query: web::Query<HashMap<String, String>>) -> HttpResponse {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer test-key" {
            return HttpResponse::Unauthorized().body("bad key");
        }
        if query.get("assistantId").map(String::as_str) != Some("asst-1")
            || query.get("limit").map(String::as_str) != Some("50")
        {
            return HttpResponse::BadRequest().body("bad filters");
        }
        HttpResponse::Ok().json(json!([
            {"id": "call-2", "status": "ended", "cost": 0.1},
            {"id": "call-1", "status": "in-progress"}
        ]))
    }

    fn list_query(api_key: &str) -> CallListQuery {
        CallListQuery {
            api_key: api_key.to_string(),
            assistant_id: Some("asst-1".to_string()),
            limit: Some(50),
        }
    }

    /// Serve a single handler on an ephemeral port and return its base URL
    fn serve<F, R>(handler: F) -> String
    where
        F: actix_web::Handler<R> + Clone + Send + 'static,
        R: actix_web::FromRequest + 'static,
        F::Output: actix_web::Responder + 'static,
    {
        serve_route(web::post, handler)
    }

    fn serve_route<F, R>(route: fn() -> actix_web::Route, handler: F) -> String
    where
        F: actix_web::Handler<R> + Clone + Send + 'static,
        R: actix_web::FromRequest + 'static,
        F::Output: actix_web::Responder + 'static,
    {
        let server = HttpServer::new(move || {
            App::new().route("/call", route().to(handler.clone()))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_rt::spawn(server.run());
        format!("http://{}", addr)
    }

    #[test]
    fn test_client_creation() {
        let client = ProviderClient::new("https://api.vapi.ai/", 10_000, "Outbound Campaign");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url(), "https://api.vapi.ai");
    }

    #[actix_web::test]
    async fn test_create_call_success() {
        let base = serve(accept);
        let client = ProviderClient::new(&base, 2_000, "Outbound Campaign").unwrap();

        let call = client.create_call(&request()).await.unwrap();
        assert_eq!(call.provider_call_id, "call-abc");
        assert_eq!(call.status.as_deref(), Some("queued"));
    }

    #[actix_web::test]
    async fn test_create_call_http_error() {
        let base = serve(reject);
        let client = ProviderClient::new(&base, 2_000, "Outbound Campaign").unwrap();

        match client.create(&request()).await {
            Err(ProviderError::HttpError { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("phoneNumberId"));
            }
            other => panic!("expected HttpError, got {:?}", other.map(|c| c.provider_call_id)),
        }
    }

    #[actix_web::test]
    async fn test_create_call_timeout() {
        let base = serve(stall);
        let client = ProviderClient::new(&base, 100, "Outbound Campaign").unwrap();

        let err = client.create(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(100)));
    }

    #[actix_web::test]
    async fn test_unparseable_response_is_dispatch_failure() {
        let base = serve(garbage);
        let client = ProviderClient::new(&base, 2_000, "Outbound Campaign").unwrap();

        let err = client.create_call(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::DispatchFailed(_)));
    }

    #[actix_web::test]
    async fn test_list_calls_sends_key_and_filters() {
        let base = serve_route(web::get, listing);
        let client = ProviderClient::new(&base, 2_000, "Outbound Campaign").unwrap();

        let calls = client.list_calls(&list_query("test-key")).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["id"], "call-2");
        assert_eq!(calls[1]["status"], "in-progress");
    }

    #[actix_web::test]
    async fn test_list_calls_rejected_key() {
        let base = serve_route(web::get, listing);
        let client = ProviderClient::new(&base, 2_000, "Outbound Campaign").unwrap();

        match client.list(&list_query("wrong")).await {
            Err(ProviderError::HttpError { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected HttpError, got {:?}", other.map(|c| c.len())),
        }
    }

    #[actix_web::test]
    async fn test_unreachable_provider() {
        // nothing listens on port 9 locally
        let client = ProviderClient::new("http://127.0.0.1:9", 1_000, "Outbound Campaign").unwrap();

        let err = client.create(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Connection(_) | ProviderError::Timeout(_)
        ));
    }
}
