//! Upload ingestion: validate the extracted file, store it, record it, queue it.

use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::image::{GeoPoint, ImageRecord, ImageStatus};
use crate::models::job::AnalysisJob;
use crate::services::multipart::{self, UploadedFile};

/// Largest accepted image, in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Raw upload request as received by the route.
pub struct UploadRequest<'a> {
    pub user_id: &'a str,
    pub content_type: Option<&'a str>,
    /// Set when the transport delivered the body base64-encoded.
    pub base64_body: bool,
    pub body: &'a [u8],
}

/// Check declared type and size against the upload policy.
pub fn validate_file(file: &UploadedFile) -> Result<(), AppError> {
    if !ALLOWED_CONTENT_TYPES.contains(&file.content_type.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Invalid file type '{}'. Allowed types: {}",
            file.content_type,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }
    if file.content.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    if file.content.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest(format!(
            "File too large: {} bytes (max {} bytes)",
            file.content.len(),
            MAX_UPLOAD_BYTES
        )));
    }
    Ok(())
}

/// File extension for an allowed content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Parse and store an upload, then queue it for analysis.
pub async fn ingest(state: &AppState, request: UploadRequest<'_>) -> Result<ImageRecord, AppError> {
    let content_type = request
        .content_type
        .filter(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
        .ok_or_else(|| AppError::BadRequest("Expected a multipart/form-data body".to_string()))?;

    let decoded;
    let body = if request.base64_body {
        decoded = base64::engine::general_purpose::STANDARD
            .decode(request.body)
            .map_err(|_| AppError::BadRequest("Body is not valid base64".to_string()))?;
        decoded.as_slice()
    } else {
        request.body
    };

    let file = multipart::extract_file(body, content_type).ok_or_else(|| {
        AppError::BadRequest("No file uploaded. Use field 'image' or 'file'".to_string())
    })?;
    validate_file(&file)?;

    let location = read_location(body, content_type)?;
    let taken_at = read_taken_at(body, content_type)?;

    let id = Uuid::new_v4().to_string();
    let correlation_id = Uuid::new_v4().to_string();
    let filename = format!("{}.{}", id, extension_for(&file.content_type));
    let path = format!("uploads/{}/{}", request.user_id, filename);

    tracing::info!(
        image_id = %id,
        user_id = %request.user_id,
        correlation_id = %correlation_id,
        original_name = %file.filename,
        size = file.content.len(),
        "Storing upload"
    );

    state
        .storage
        .put(&path, &file.content, &file.content_type)
        .await?;

    let record = ImageRecord {
        id,
        user_id: request.user_id.to_string(),
        filename,
        original_name: file.filename,
        mimetype: file.content_type,
        size: file.content.len() as i64,
        uploaded_at: Utc::now(),
        path,
        status: ImageStatus::Uploaded,
        location,
        taken_at,
    };
    state.store.insert_image(&record).await?;

    state
        .queue
        .enqueue(&AnalysisJob::for_image(&record, correlation_id))
        .await?;

    Ok(record)
}

fn read_location(body: &[u8], content_type: &str) -> Result<Option<GeoPoint>, AppError> {
    let latitude = multipart::extract_text_field(body, content_type, "latitude");
    let longitude = multipart::extract_text_field(body, content_type, "longitude");

    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };

    let parse = |value: &str, limit: f64, field: &str| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.abs() <= limit)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {field}: {value}")))
    };

    Ok(Some(GeoPoint {
        latitude: parse(&latitude, 90.0, "latitude")?,
        longitude: parse(&longitude, 180.0, "longitude")?,
    }))
}

fn read_taken_at(body: &[u8], content_type: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    multipart::extract_text_field(body, content_type, "takenAt")
        .map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| AppError::BadRequest(format!("Invalid takenAt: {value}")))
        })
        .transpose()
}
