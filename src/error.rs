use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::auth::AuthError;
use crate::db::StoreError;
use crate::models::api::ApiResponse;
use crate::services::identity::IdentityError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

/// Error returned by HTTP handlers.
///
/// Client-facing variants carry their message verbatim; `Internal` is logged
/// and replaced with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{message}")]
    Internal { message: String, retryable: bool },
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            retryable: false,
        }
    }

    /// Infrastructure failure that may succeed if repeated.
    pub fn unavailable(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Internal { retryable, .. } => *retryable,
            AppError::TooManyRequests(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal { message, retryable } => {
                tracing::error!(error = %message, retryable, "Internal server error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object not found: {key}")),
            StorageError::Config(_) => AppError::internal(err.to_string()),
            other => AppError::unavailable(other.to_string()),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Redis(_) => AppError::unavailable(err.to_string()),
            QueueError::Serialize(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::unavailable(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Keys(_) => AppError::internal(err.to_string()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::UserExists => AppError::Conflict(err.to_string()),
            IdentityError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            IdentityError::UserNotFound => AppError::NotFound(err.to_string()),
            IdentityError::NotConfirmed | IdentityError::ChallengeRequired(_) => {
                AppError::Forbidden(err.to_string())
            }
            IdentityError::InvalidInput(msg) => AppError::BadRequest(msg),
            IdentityError::RateLimited => AppError::TooManyRequests(err.to_string()),
            IdentityError::Provider(_) => AppError::unavailable(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::BadRequest(report.to_string())
    }
}
