use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::job::AnalysisJob;

/// Status of an image analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Structured fields pulled out of a vision-model completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedAnalysis {
    pub description: String,
    pub keywords: Vec<String>,
    pub detected_text: Vec<String>,
}

/// Analysis row. Shares its id with the owning [`ImageRecord`](crate::models::image::ImageRecord).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub detected_text: Vec<String>,
    pub status: AnalysisStatus,
    pub error: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// Placeholder written when a job starts.
    pub fn processing(job: &AnalysisJob) -> Self {
        Self {
            id: job.image_id.clone(),
            user_id: job.user_id.clone(),
            filename: job.filename.clone(),
            description: String::new(),
            keywords: Vec::new(),
            detected_text: Vec::new(),
            status: AnalysisStatus::Processing,
            error: None,
            analyzed_at: None,
        }
    }

    pub fn completed(job: &AnalysisJob, extracted: ExtractedAnalysis) -> Self {
        Self {
            description: extracted.description,
            keywords: extracted.keywords,
            detected_text: extracted.detected_text,
            status: AnalysisStatus::Completed,
            analyzed_at: Some(Utc::now()),
            ..Self::processing(job)
        }
    }

    pub fn failed(job: &AnalysisJob, error: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            error: Some(error.into()),
            analyzed_at: Some(Utc::now()),
            ..Self::processing(job)
        }
    }
}

/// Public projection of an [`AnalysisRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub detected_text: Vec<String>,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisRecord> for AnalysisView {
    fn from(record: &AnalysisRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            filename: record.filename.clone(),
            description: record.description.clone(),
            keywords: record.keywords.clone(),
            detected_text: record.detected_text.clone(),
            status: record.status,
            error: record.error.clone(),
            analyzed_at: record.analyzed_at,
        }
    }
}
