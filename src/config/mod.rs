use serde::Deserialize;
use std::time::Duration;

use crate::app_state::Settings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the analysis queue
    pub redis_url: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Workers AI image-to-text model
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Bucket name
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Cognito user pool ID (e.g. "eu-west-1_AbCdEf")
    pub cognito_user_pool_id: String,

    /// Cognito app client ID (public client, no secret)
    pub cognito_client_id: String,

    /// Region of the user pool. Defaults to the pool ID prefix.
    pub cognito_region: Option<String>,

    /// HS256 secret for local development tokens. Replaces JWKS verification when set.
    pub auth_hmac_secret: Option<String>,

    #[serde(default = "default_admin_group")]
    pub admin_group: String,

    /// Group joined by `PATCH /api/auth/upgrade`
    #[serde(default = "default_upgrade_group")]
    pub upgrade_group: String,

    /// Lifetime of presigned download URLs
    #[serde(default = "default_download_url_ttl_secs")]
    pub download_url_ttl_secs: u64,

    /// Deliveries before a job is moved to the dead-letter list
    #[serde(default = "default_queue_max_deliveries")]
    pub queue_max_deliveries: u32,

    /// Seconds a received job may stay in flight before it is redelivered
    #[serde(default = "default_queue_visibility_timeout_secs")]
    pub queue_visibility_timeout_secs: u64,

    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Prometheus scrape address served by the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_vision_model() -> String {
    "@cf/llava-hf/llava-1.5-7b-hf".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_admin_group() -> String {
    "admin".to_string()
}

fn default_upgrade_group() -> String {
    "premium".to_string()
}

fn default_download_url_ttl_secs() -> u64 {
    3600
}

fn default_queue_max_deliveries() -> u32 {
    3
}

fn default_queue_visibility_timeout_secs() -> u64 {
    300
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Region hosting the user pool.
    pub fn identity_region(&self) -> String {
        self.cognito_region.clone().unwrap_or_else(|| {
            self.cognito_user_pool_id
                .split('_')
                .next()
                .unwrap_or_default()
                .to_string()
        })
    }

    pub fn queue_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_visibility_timeout_secs)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            admin_group: self.admin_group.clone(),
            upgrade_group: self.upgrade_group.clone(),
            download_url_ttl: Duration::from_secs(self.download_url_ttl_secs),
            ..Settings::default()
        }
    }
}
