use axum::extract::{FromRequest, Request};
use axum::Json;
use garde::Validate;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body that is deserialized and validated before the handler runs.
/// Malformed or invalid bodies are answered with a 400 envelope.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}
