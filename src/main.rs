//! Dialer billing server
//!
//! Places outbound calls through the provider, reconciles its webhooks and
//! keeps each client's prepaid seconds ledger.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use dialer_api::{configure_api, handlers, AppState, Repositories};
use dialer_cache::RedisCache;
use dialer_core::config::AppConfig;
use dialer_db::{create_pool, run_migrations};
use dialer_provider::ProviderClient;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dialer={lvl},dialer_api={lvl},dialer_services={lvl},dialer_db={lvl},\
             dialer_provider={lvl},dialer_cache={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

async fn connect_cache(url: Option<&str>) -> Option<Arc<RedisCache>> {
    let url = url?;
    match RedisCache::new(url).await {
        Ok(cache) => {
            info!("Rate multiplier cache enabled");
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!("Redis unavailable, multipliers will be read from storage: {}", e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting dialer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("Failed to create database pool")?;
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let cache = connect_cache(config.redis.url.as_deref()).await;

    let provider = ProviderClient::new(
        &config.provider.base_url,
        config.provider.timeout_ms,
        &config.provider.call_name,
    )
    .context("Failed to build provider client")?;
    info!("Provider endpoint: {}", provider.base_url());

    let state = web::Data::new(AppState::new(
        Repositories::postgres(pool),
        Arc::new(provider),
        cache,
        &config.billing,
        &config.provider,
    ));

    let auditor = state.auditor.clone();
    let audit_every = Duration::from_secs(config.billing.audit_interval_secs.max(1));
    actix_rt::spawn(auditor.run(audit_every));

    let bind_addr = config.server_addr();
    let workers = config.server.workers.max(1);
    let cors_origins = config.server.cors_origins.clone();
    info!("Starting HTTP server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(handlers::json_config())
            .app_data(handlers::query_config())
            .wrap(cors)
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_api)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
