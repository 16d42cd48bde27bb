use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenVerifier;
use crate::db::MetadataStore;
use crate::services::{identity::IdentityProvider, queue::JobQueue, storage::ObjectStore};

/// Request-handling policy knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    pub admin_group: String,
    pub upgrade_group: String,
    pub download_url_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            admin_group: "admin".to_string(),
            upgrade_group: "premium".to_string(),
            download_url_ttl: Duration::from_secs(3600),
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobQueue>,
    pub identity: Arc<dyn IdentityProvider>,
    pub tokens: Arc<TokenVerifier>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        identity: Arc<dyn IdentityProvider>,
        tokens: TokenVerifier,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            storage,
            queue,
            identity,
            tokens: Arc::new(tokens),
            settings: Arc::new(settings),
        }
    }
}
