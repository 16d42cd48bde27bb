use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use image_insight::{
    app_state::AppState,
    auth::{verifier::cognito_issuer, TokenVerifier},
    config::AppConfig,
    db::{self, PgMetadataStore},
    routes,
    services::{identity::CognitoIdentityProvider, queue::RedisJobQueue, storage::BucketClient},
};

#[tokio::main]
async fn main() -> ExitCode {
    image_insight::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment
    let config = AppConfig::from_env()?;

    tracing::info!("Initializing image-insight server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);

    metrics::describe_counter!("uploads_total", "Images accepted for analysis");
    metrics::describe_counter!("uploads_rejected_total", "Uploads rejected by validation");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url).await?;

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool).await?;

    tracing::info!("Initializing object storage client");
    let storage = BucketClient::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
    )?;

    tracing::info!("Connecting to Redis job queue");
    let queue = RedisJobQueue::new(
        &config.redis_url,
        config.queue_max_deliveries,
        config.queue_visibility_timeout(),
    )?;

    let region = config.identity_region();
    tracing::info!(region = %region, "Initializing identity provider");
    let identity = CognitoIdentityProvider::from_env(
        Some(&region),
        &config.cognito_user_pool_id,
        &config.cognito_client_id,
    )
    .await;

    let tokens = match &config.auth_hmac_secret {
        Some(secret) => {
            tracing::warn!("Using HMAC token verification; do not use in production");
            TokenVerifier::with_hmac_secret(secret)
        }
        None => TokenVerifier::discover(
            &cognito_issuer(&region, &config.cognito_user_pool_id),
            &config.cognito_client_id,
        )
        .await?,
    };

    let state = AppState::new(
        Arc::new(PgMetadataStore::new(db_pool)),
        Arc::new(storage),
        Arc::new(queue),
        Arc::new(identity),
        tokens,
        config.settings(),
    );

    let app = routes::router_with_metrics(state, prometheus_handle)
        .layer(CompressionLayer::new());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
