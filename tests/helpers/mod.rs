//! In-memory collaborators and request builders shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image_insight::app_state::{AppState, Settings};
use image_insight::auth::{Claims, TokenVerifier};
use image_insight::db::{MetadataStore, StoreError};
use image_insight::models::analysis::AnalysisRecord;
use image_insight::models::auth::{AuthTokens, SignUpOutcome, UserProfile};
use image_insight::models::image::{ImageRecord, ImageStatus};
use image_insight::models::job::AnalysisJob;
use image_insight::services::identity::{IdentityError, IdentityProvider};
use image_insight::services::queue::{redelivery_for, Delivery, JobQueue, QueueError, Redelivery};
use image_insight::services::storage::{ObjectStore, StorageError};
use image_insight::services::vision::{ModelError, VisionModel};

pub const TOKEN_SECRET: &str = "test-secret";
pub const BOUNDARY: &str = "XyZboundary123";

// ── Metadata store ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub images: Mutex<HashMap<String, ImageRecord>>,
    pub analyses: Mutex<HashMap<String, AnalysisRecord>>,
    /// Every analysis write, in order.
    pub analysis_writes: Mutex<Vec<AnalysisRecord>>,
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert_image(&self, image: &ImageRecord) -> Result<(), StoreError> {
        self.images
            .lock()
            .unwrap()
            .insert(image.id.clone(), image.clone());
        Ok(())
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.images.lock().unwrap().get(id).cloned())
    }

    async fn list_images(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        let mut images: Vec<_> = self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|i| owner.map_or(true, |o| i.user_id == o))
            .cloned()
            .collect();
        images.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(images)
    }

    async fn update_image_status(&self, id: &str, status: ImageStatus) -> Result<(), StoreError> {
        if let Some(image) = self.images.lock().unwrap().get_mut(id) {
            image.status = status;
        }
        Ok(())
    }

    async fn delete_image(&self, id: &str) -> Result<(), StoreError> {
        self.images.lock().unwrap().remove(id);
        Ok(())
    }

    async fn put_analysis(&self, analysis: &AnalysisRecord) -> Result<(), StoreError> {
        self.analysis_writes.lock().unwrap().push(analysis.clone());
        self.analyses
            .lock()
            .unwrap()
            .insert(analysis.id.clone(), analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.analyses.lock().unwrap().get(id).cloned())
    }

    async fn list_analyses(&self, owner: Option<&str>) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self
            .analyses
            .lock()
            .unwrap()
            .values()
            .filter(|a| owner.map_or(true, |o| a.user_id == o))
            .cloned()
            .collect())
    }

    async fn delete_analysis(&self, id: &str) -> Result<(), StoreError> {
        self.analyses.lock().unwrap().remove(id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ── Object storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub puts: Mutex<usize>,
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        *self.puts.lock().unwrap() += 1;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presigned_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        Ok(format!(
            "https://bucket.test/{key}?X-Amz-Expires={}",
            expires_in.as_secs()
        ))
    }
}

// ── Queue ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryQueue {
    pub pending: Mutex<Vec<(u32, AnalysisJob)>>,
    pub acked: Mutex<Vec<AnalysisJob>>,
    pub dead_letter: Mutex<Vec<AnalysisJob>>,
    pub max_deliveries: u32,
}

impl MemoryQueue {
    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            max_deliveries,
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(_, job)| job.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError> {
        self.pending.lock().unwrap().push((0, job.clone()));
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Ok(None);
        }
        let (attempts, job) = pending.remove(0);
        Ok(Some(Delivery {
            receipt: job.image_id.clone(),
            job,
            attempts,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(delivery.job.clone());
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<Redelivery, QueueError> {
        let attempt = delivery.attempts + 1;
        let outcome = redelivery_for(attempt, self.max_deliveries);
        match outcome {
            Redelivery::Requeued { .. } => self
                .pending
                .lock()
                .unwrap()
                .push((attempt, delivery.job.clone())),
            _ => self.dead_letter.lock().unwrap().push(delivery.job.clone()),
        }
        Ok(outcome)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.pending.lock().unwrap().len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

// ── Vision model ─────────────────────────────────────────────────────

/// Replays canned completions; an `Err` entry simulates an endpoint failure.
pub struct ScriptedModel {
    pub responses: Mutex<Vec<Result<String, u16>>>,
    pub calls: Mutex<Vec<(usize, String)>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, u16>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn describe(&self, image: &[u8], content_type: &str) -> Result<String, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((image.len(), content_type.to_string()));
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(500)
            } else {
                responses.remove(0)
            }
        };
        next.map_err(|status| ModelError::Status {
            status,
            body: "scripted failure".to_string(),
        })
    }
}

// ── Identity provider ────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIdentity {
    /// email → password
    pub users: Mutex<HashMap<String, String>>,
    pub groups: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(email) {
            return Err(IdentityError::UserExists);
        }
        users.insert(email.to_string(), password.to_string());
        Ok(SignUpOutcome {
            user_sub: format!("sub-{email}"),
            confirmed: false,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError> {
        match self.users.lock().unwrap().get(email) {
            Some(stored) if stored == password => Ok(AuthTokens {
                access_token: format!("access-{email}"),
                id_token: Some(format!("id-{email}")),
                refresh_token: Some(format!("refresh-{email}")),
                expires_in: 3600,
                token_type: "Bearer".to_string(),
            }),
            _ => Err(IdentityError::InvalidCredentials),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError> {
        let email = refresh_token
            .strip_prefix("refresh-")
            .ok_or(IdentityError::InvalidCredentials)?;
        Ok(AuthTokens {
            access_token: format!("access-{email}"),
            id_token: None,
            refresh_token: Some(refresh_token.to_string()),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        })
    }

    async fn forgot_password(&self, email: &str) -> Result<(), IdentityError> {
        if self.users.lock().unwrap().contains_key(email) {
            Ok(())
        } else {
            Err(IdentityError::UserNotFound)
        }
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        if code != "123456" {
            return Err(IdentityError::InvalidInput(
                "invalid or expired confirmation code".to_string(),
            ));
        }
        self.users
            .lock()
            .unwrap()
            .insert(email.to_string(), new_password.to_string());
        Ok(())
    }

    async fn profile(&self, _access_token: &str) -> Result<UserProfile, IdentityError> {
        Ok(UserProfile {
            username: "ada".to_string(),
            email: Some("ada@example.com".to_string()),
            name: Some("Ada".to_string()),
            email_verified: true,
        })
    }

    async fn delete_self(&self, access_token: &str) -> Result<(), IdentityError> {
        self.deleted.lock().unwrap().push(access_token.to_string());
        Ok(())
    }

    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), IdentityError> {
        self.groups
            .lock()
            .unwrap()
            .push((username.to_string(), group.to_string()));
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub queue: Arc<MemoryQueue>,
    pub identity: Arc<FakeIdentity>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MemoryStorage::default());
        let queue = Arc::new(MemoryQueue::with_max_deliveries(3));
        let identity = Arc::new(FakeIdentity::default());

        let state = AppState::new(
            store.clone(),
            storage.clone(),
            queue.clone(),
            identity.clone(),
            TokenVerifier::with_hmac_secret(TOKEN_SECRET),
            Settings::default(),
        );

        Self {
            state,
            store,
            storage,
            queue,
            identity,
        }
    }

    pub fn router(&self) -> axum::Router {
        image_insight::routes::router(self.state.clone())
    }
}

/// Signed bearer token for `sub` with the given groups.
pub fn token_for(sub: &str, groups: &[&str]) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        email: Some(format!("{sub}@example.com")),
        username: Some(sub.to_string()),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        iss: None,
        token_use: None,
        client_id: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TOKEN_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Multipart body with one file part and optional text fields.
pub fn multipart_body(
    field: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
    text_fields: &[(&str, &str)],
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in text_fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Minimal JPEG header followed by filler.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0x42);
    bytes
}
