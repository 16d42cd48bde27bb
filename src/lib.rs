//! Image upload and analysis service
//!
//! Accepts image uploads over HTTP, stores them in an S3-compatible bucket,
//! and queues them for analysis by a hosted vision-language model. A separate
//! worker binary consumes the queue and persists the parsed results.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

/// Install the JSON tracing subscriber shared by both binaries.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}
