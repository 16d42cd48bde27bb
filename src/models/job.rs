use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::image::{GeoPoint, ImageRecord};

/// Message placed on the analysis queue after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub image_id: String,
    pub user_id: String,
    pub filename: String,
    /// Object storage key of the uploaded bytes.
    pub path: String,
    pub mimetype: String,
    pub uploaded_at: DateTime<Utc>,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn for_image(record: &ImageRecord, correlation_id: impl Into<String>) -> Self {
        Self {
            image_id: record.id.clone(),
            user_id: record.user_id.clone(),
            filename: record.filename.clone(),
            path: record.path.clone(),
            mimetype: record.mimetype.clone(),
            uploaded_at: record.uploaded_at,
            correlation_id: correlation_id.into(),
            location: record.location,
            taken_at: record.taken_at,
        }
    }
}
