use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle of an uploaded image as seen by the analysis pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageStatus {
    Uploaded,
    Processing,
    Analyzed,
    Failed,
}

/// Optional geolocation supplied alongside an upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Metadata row for an uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub user_id: String,
    /// Name the object was stored under (`<id>.<ext>`).
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    /// Object storage key.
    pub path: String,
    pub status: ImageStatus,
    pub location: Option<GeoPoint>,
    pub taken_at: Option<DateTime<Utc>>,
}

/// Public projection of an [`ImageRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub path: String,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

impl From<&ImageRecord> for ImageView {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            filename: record.filename.clone(),
            original_name: record.original_name.clone(),
            mimetype: record.mimetype.clone(),
            size: record.size,
            uploaded_at: record.uploaded_at,
            path: record.path.clone(),
            status: record.status,
            latitude: record.location.map(|l| l.latitude),
            longitude: record.location.map(|l| l.longitude),
            taken_at: record.taken_at,
        }
    }
}
