//! HTTP surface. The whole route table is declared in [`router`].

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::auth::require_auth;

pub mod analysis;
pub mod auth;
pub mod extract;
pub mod health;
pub mod images;
pub mod metrics;
pub mod upload;

/// Transport-level body ceiling. Sits above the 10 MiB file limit so oversized
/// files still reach validation and get a 400 rather than a 413.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    with_layers(api_routes(state))
}

/// API router plus the Prometheus scrape endpoint, under the same layers.
pub fn router_with_metrics(state: AppState, handle: Arc<PrometheusHandle>) -> Router {
    with_layers(api_routes(state).route(
        "/metrics",
        get(metrics::prometheus_metrics).with_state(handle),
    ))
}

fn api_routes(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route(
            "/api/auth/confirm-forgot-password",
            post(auth::confirm_forgot_password),
        );

    let protected = Router::new()
        .route("/api/upload", post(upload::upload_image))
        .route("/api/images", get(images::list_images))
        .route(
            "/api/images/{id}",
            get(images::download_image).delete(images::delete_image),
        )
        .route("/api/images/{id}/info", get(images::image_info))
        .route("/api/analysis", get(analysis::list_analyses))
        .route("/api/analysis/{id}", get(analysis::get_analysis))
        .route("/api/auth/me", get(auth::me).delete(auth::delete_me))
        .route("/api/auth/upgrade", patch(auth::upgrade))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
