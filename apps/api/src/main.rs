mod auth;
mod config;
mod db;
mod errors;
mod extract;
mod llm_client;
mod report;
mod reports;
mod routes;
mod screening;
mod state;
mod storage;
mod users;

#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::{ensure_bootstrap_admin, PgIdentityStore, RedisSessionStore};
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::llm_client::{LlmClient, LlmSettings};
use crate::reports::PgReportStore;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Screening API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Initialize Redis (sessions)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let files = S3FileStore::new(
        s3,
        &config.s3_bucket,
        &config.reports_prefix,
        Duration::from_secs(config.storage_link_ttl_secs),
    );
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = LlmClient::new(LlmSettings {
        api_key: config.openai_api_key.clone(),
        base_url: config.openai_base_url.clone(),
        model: config.llm_model.clone(),
        temperature: config.llm_temperature,
    })?;
    info!("LLM client initialized (model: {})", llm.model());

    let identity = PgIdentityStore::new(db.clone());
    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(&identity, admin)
            .await
            .map_err(|e| anyhow::anyhow!("bootstrap admin setup failed: {e}"))?;
    }

    // Build app state
    let state = AppState {
        llm: Arc::new(llm),
        files: Arc::new(files),
        reports: Arc::new(PgReportStore::new(db)),
        identity: Arc::new(identity),
        sessions: Arc::new(RedisSessionStore::new(redis, config.session_ttl_secs)),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins to the deployed frontend

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "screening-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // MinIO serves buckets on the path, not as subdomains.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
