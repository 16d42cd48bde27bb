use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::app_state::AppState;
use crate::auth::{authorize_owner, AuthContext};
use crate::error::AppError;
use crate::models::api::ApiResponse;
use crate::models::image::{ImageRecord, ImageView};

async fn owned_image(state: &AppState, auth: &AuthContext, id: &str) -> Result<ImageRecord, AppError> {
    let image = state
        .store
        .get_image(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    authorize_owner(auth, &image.user_id)?;
    Ok(image)
}

/// GET /api/images: the caller's images, or every image for admins.
pub async fn list_images(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<ImageView>>>, AppError> {
    let owner = (!auth.is_admin()).then(|| auth.user_id());
    let images = state.store.list_images(owner).await?;
    Ok(Json(ApiResponse::ok(
        images.iter().map(ImageView::from).collect(),
    )))
}

/// GET /api/images/{id}: redirect to a time-limited download URL.
pub async fn download_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let image = owned_image(&state, &auth, &id).await?;
    let url = state
        .storage
        .presigned_get(&image.path, state.settings.download_url_ttl)
        .await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// GET /api/images/{id}/info
pub async fn image_info(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ImageView>>, AppError> {
    let image = owned_image(&state, &auth, &id).await?;
    Ok(Json(ApiResponse::ok(ImageView::from(&image))))
}

/// DELETE /api/images/{id}: removes the object, the image record and its analysis.
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), AppError> {
    let image = owned_image(&state, &auth, &id).await?;

    state.storage.delete(&image.path).await?;
    state.store.delete_analysis(&image.id).await?;
    state.store.delete_image(&image.id).await?;

    tracing::info!(image_id = %image.id, user_id = %auth.user_id(), "Image deleted");

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("Image deleted successfully")),
    ))
}
