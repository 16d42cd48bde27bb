use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::{Extension, Json};

use crate::app_state::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;
use crate::models::api::ApiResponse;
use crate::models::image::ImageView;
use crate::services::upload::{self, UploadRequest};

/// POST /api/upload: store an image and queue it for analysis.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<ImageView>>), AppError> {
    let request = UploadRequest {
        user_id: auth.user_id(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        base64_body: is_base64_encoded(&headers),
        body: &body,
    };

    match upload::ingest(&state, request).await {
        Ok(record) => {
            metrics::counter!("uploads_total").increment(1);
            tracing::info!(image_id = %record.id, user_id = %record.user_id, "Upload accepted");
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::ok(ImageView::from(&record)).with_message("Image uploaded successfully")),
            ))
        }
        Err(e) => {
            if matches!(e, AppError::BadRequest(_)) {
                metrics::counter!("uploads_rejected_total").increment(1);
                tracing::info!(user_id = %auth.user_id(), reason = %e, "Upload rejected");
            }
            Err(e)
        }
    }
}

fn is_base64_encoded(headers: &HeaderMap) -> bool {
    ["content-transfer-encoding", "x-body-encoding"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.trim().eq_ignore_ascii_case("base64"))
}
